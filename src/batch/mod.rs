//! Batch Loop Controller: one device at a time until the operator stops.

mod outcome;
mod serial;
mod wireless;

pub use outcome::{RunCounters, TransferOutcome};
pub use serial::SerialBatch;
pub use wireless::WirelessBatch;
