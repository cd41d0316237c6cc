//! Ports to the outside world: external processes, the wireless radio and
//! the device's HTTP server. Each is a trait so sessions can be driven by
//! scripted test doubles without touching real OS state.

pub mod network;
pub mod process;
pub mod transfer;

pub use network::NetworkControl;
pub use process::{ProcessExecutor, ProcessOutput, TokioProcessExecutor};
pub use transfer::{HttpReply, ProgressFn, TransferClient, UploadRequest};

#[cfg(test)]
pub use network::MockNetworkControl;
#[cfg(test)]
pub use process::MockProcessExecutor;
#[cfg(test)]
pub use transfer::MockTransferClient;
