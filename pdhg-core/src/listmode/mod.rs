//! List-mode data: events, multiplicities, subset partitions.

pub mod events;
pub mod partition;

pub use events::{multiplicities, Event, EventList};
pub use partition::{Partition, SubsetProbabilities};
