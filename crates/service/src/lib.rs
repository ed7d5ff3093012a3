//! Streaming and lifecycle engine for the txscope mempool observatory.
//!
//! One task runs per endpoint per role, all under a shared cancellation
//! token handed out by the [`Supervisor`]:
//!
//! - [`IngestActor`] subscribes to an execution client's pending-transaction
//!   websocket and writes arrival records.
//! - [`ResolverActor`] drains the per-client queue, classifies each hash
//!   through the client's RPC, and writes lifecycle updates.
//! - [`InclusionStreamActor`] consumes a beacon node's SSE stream and keeps
//!   the best-known inclusion list per slot.
//! - [`ReconcilerActor`] follows new block headers and reconciles mined
//!   blocks against stored inclusion lists.

pub mod config;
pub use config::{BeaconEndpoint, Config, ConfigError, Endpoint};

mod client;
pub use client::{
    AlloyExecutionClient, BlockDetails, ClientError, ExecutionClient, ReceiptInfo, RpcTransaction,
};

pub mod actors;
pub use actors::{Actor, IngestActor, InclusionStreamActor, ReconcilerActor, ResolverActor};

mod supervisor;
pub use supervisor::{Supervisor, SupervisorError};

mod util;
pub(crate) use util::unix_now;
