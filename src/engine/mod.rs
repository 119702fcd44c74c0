//! Work engine: the director facade over storage and handlers, and the
//! timer-driven polling loop.

pub mod director;
pub mod poller;

pub use director::WorkerDirector;
pub use poller::{Poller, PollerConfig};
