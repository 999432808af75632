//! Detected events and their multiplicities.

use std::collections::HashMap;

/// A single detected coincidence: line-of-response end points and TOF bin.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub start: [f64; 3],
    pub end: [f64; 3],
    pub tof_bin: i32,
}

impl Event {
    pub fn new(start: [f64; 3], end: [f64; 3], tof_bin: i32) -> Self {
        Self { start, end, tof_bin }
    }

    /// Bit-exact identity key; two events are duplicates iff their keys match.
    fn key(&self) -> ([u64; 3], [u64; 3], i32) {
        (
            self.start.map(f64::to_bits),
            self.end.map(f64::to_bits),
            self.tof_bin,
        )
    }
}

/// Ordered list of events.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventList {
    events: Vec<Event>,
}

impl EventList {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }
}

impl From<Vec<Event>> for EventList {
    fn from(events: Vec<Event>) -> Self {
        Self::new(events)
    }
}

impl FromIterator<Event> for EventList {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Multiplicity of every event: how often its (start, end, tof_bin) tuple
/// occurs in the list.
///
/// Each occurrence of a tuple repeated k times gets multiplicity k, so for
/// every unique tuple the multiplicity equals its occurrence count.
pub fn multiplicities(events: &EventList) -> Vec<u32> {
    let mut counts: HashMap<([u64; 3], [u64; 3], i32), u32> = HashMap::with_capacity(events.len());
    for event in events.iter() {
        *counts.entry(event.key()).or_insert(0) += 1;
    }
    events.iter().map(|event| counts[&event.key()]).collect()
}
