//! Over-the-air transfer to a device's own web updater.

mod client;
mod form;
mod progress;
mod session;
pub mod template;

pub use client::ReqwestTransferClient;
pub use form::{detect_upload_form, UploadForm};
pub use progress::{ProgressStream, ProgressTracker};
pub use session::{OtaReport, OtaSession};
