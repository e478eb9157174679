//! mdl core: job model, Job Store, Dispatcher, Worker and RPC transport of
//! the media download queue server.

pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod logging;
pub mod progress;
pub mod rpc;
pub mod store;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use error::JobError;
pub use job::{DownloadRequest, Job, JobId, JobKind, JobStatus, Progress};
pub use store::JobStore;
