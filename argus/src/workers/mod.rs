// argus/src/workers/mod.rs
//
// Periodic background work. Each worker implements Cycle and is driven by
// its own scheduler loop; collection and detection never wait on each other.

pub mod collector;
pub mod detector;
pub mod scheduler;

pub use collector::Collector;
pub use detector::Detector;
pub use scheduler::{run_periodic, Cycle};
