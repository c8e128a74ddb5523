pub mod engine;
pub mod types;

pub use engine::SyncEngine;
pub use types::{
    SharedErrorCallback, SyncErrorCallback, SyncErrorEvent, SyncErrorKind, SyncPhase, SyncResult,
    SyncTransport, SyncTransportError,
};
