//! The remote (shared, authoritative) tier.
//!
//! - [`traits`]: the narrow [`RemoteStore`] contract and the [`Connector`]
//!   that establishes connections
//! - [`client`]: [`RemoteTierClient`], which adds timeout, retry and
//!   circuit breaking to every call
//! - [`memory`]: an in-process store for tests and demos

pub mod client;
pub mod memory;
pub mod traits;

pub use client::RemoteTierClient;
pub use memory::{InMemoryConnector, InMemoryRemoteStore};
pub use traits::{Connector, RemoteError, RemoteStore};
