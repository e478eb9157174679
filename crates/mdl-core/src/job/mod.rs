//! Job records: one requested download (single item, playlist or livestream)
//! tracked through its lifecycle.

pub mod request;
pub mod types;

pub use request::DownloadRequest;
pub use types::*;
