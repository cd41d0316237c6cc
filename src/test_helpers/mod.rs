//! Shared test utilities. Compiled only for tests.

mod fakes;
mod fixtures;
mod temp;

pub use fakes::{recording_progress, FakeNetwork, RecordingReporter};
pub use fixtures::ChipProfileBuilder;
pub use temp::TestContext;
