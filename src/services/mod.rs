pub mod gate;
pub mod hasher;
pub mod mail;
pub mod reaper;
pub mod store;
pub mod upload;

pub use gate::{AccessGate, AuthorizedDownload, DenyReason, DownloadDecision};
pub use hasher::ContentHasher;
pub use mail::Mailer;
pub use reaper::ExpiryReaper;
pub use store::FileStore;
pub use upload::{UploadService, UploadSource};
