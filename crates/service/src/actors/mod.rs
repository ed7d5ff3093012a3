//! Long-lived streaming tasks.
//!
//! Each actor owns one event source for one endpoint and writes to the
//! cache through the storage layer. Actors observe the shared cancellation
//! token at every suspension point and return promptly once it fires.

use async_trait::async_trait;

/// An actor-like long-running service task.
///
/// Actors are built with everything they need, then consumed by `start`,
/// which runs until the source drains, a fatal error occurs, or the
/// cancellation token fires. Cancellation is a clean return, not an error.
#[async_trait]
pub trait Actor: Send + 'static {
    /// The error type for the actor.
    type Error: std::fmt::Debug;

    /// Starts the actor.
    async fn start(self) -> Result<(), Self::Error>;
}

mod ingest;
pub use ingest::{IngestActor, IngestError};

mod resolver;
pub use resolver::{ResolverActor, ResolverError};

mod inclusion;
pub use inclusion::{InclusionStreamActor, InclusionStreamError};

mod reconciler;
pub use reconciler::{ReconcilerActor, ReconcilerError};
