pub mod codec;
pub mod config;
pub mod error;
pub mod types;

pub mod facade;
pub mod ledger;
pub mod mirror;
pub mod observer;
pub mod query;
pub mod reactive;
pub mod storage;
pub mod sync;

pub use config::MirrorOptions;
pub use error::{MirrorError, Result};
pub use facade::OfflineCollection;
pub use mirror::MirrorCollection;
pub use types::{ConnectionState, ConnectionStatus, Document, Origin, RemoveRequest, Runtime};
