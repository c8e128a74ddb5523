//! Connectivity-aware facade over a mirrored collection.
//!
//! - [`traits`]: the collaborator traits [`Connectivity`], [`RemoteMethods`],
//!   [`CanonicalCollection`], [`LiveSubscription`], and the settable
//!   [`ConnectivityProbe`].
//! - [`transport`]: [`MethodTransport`], outbound replay over remote methods.
//! - [`collection`]: [`OfflineCollection`] and [`SubscriptionHandle`].

pub mod collection;
pub mod traits;
pub mod transport;

pub use collection::{OfflineCollection, SubscriptionHandle};
pub use traits::{CanonicalCollection, Connectivity, ConnectivityProbe, LiveSubscription, RemoteMethods};
pub use transport::MethodTransport;
