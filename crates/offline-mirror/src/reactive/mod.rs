//! Reactive primitives used by the in-memory collection.
//!
//! - [`event`]: [`CollectionEvent`] raised on every primitive mutation.
//! - [`event_emitter`]: typed pub/sub ([`EventEmitter<T>`]).

pub mod event;
pub mod event_emitter;

pub use event::CollectionEvent;
pub use event_emitter::{EventEmitter, ListenerId};
