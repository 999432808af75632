use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone)]
pub enum PerfSection {
    /// Projected primal update
    Primal,
    /// Forward projections (A x, ∇x)
    Forward,
    /// Back projections (Aᵀ, ∇ᵀ)
    Adjoint,
    /// Dual proximal maps
    Prox,
    /// Block selection
    Schedule,
    Other,
}

#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerfTimers {
    pub primal: Duration,
    pub forward: Duration,
    pub adjoint: Duration,
    pub prox: Duration,
    pub schedule: Duration,
    pub other: Duration,
}

impl PerfTimers {
    pub fn scoped<'a>(&'a mut self, section: PerfSection) -> PerfGuard<'a> {
        PerfGuard { section, start: Instant::now(), timers: self }
    }

    pub fn add(&mut self, section: PerfSection, dt: Duration) {
        match section {
            PerfSection::Primal => self.primal += dt,
            PerfSection::Forward => self.forward += dt,
            PerfSection::Adjoint => self.adjoint += dt,
            PerfSection::Prox => self.prox += dt,
            PerfSection::Schedule => self.schedule += dt,
            PerfSection::Other => self.other += dt,
        }
    }

    pub fn total(&self) -> Duration {
        self.primal + self.forward + self.adjoint + self.prox + self.schedule + self.other
    }
}

pub struct PerfGuard<'a> {
    section: PerfSection,
    start: Instant,
    timers: &'a mut PerfTimers,
}

impl Drop for PerfGuard<'_> {
    fn drop(&mut self) {
        self.timers.add(self.section, self.start.elapsed());
    }
}
