//! Task lifecycle supervision.

use crate::{
    Actor, AlloyExecutionClient, ClientError, Config, ConfigError, IngestActor,
    InclusionStreamActor, ReconcilerActor, ResolverActor,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use txscope_storage::Store;

/// Errors raised while assembling the task set.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The configuration did not validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An execution-client handle could not be built.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Starts every streaming task under one cancellation token and waits for
/// all of them to return.
///
/// Per execution endpoint: an ingest task and a resolver task; when the
/// inclusion-list feature is enabled, additionally a reconciler task per
/// execution endpoint and an SSE consumer per beacon endpoint. A task that
/// fails is logged and not restarted in-process; remaining tasks keep
/// running until shutdown.
#[derive(Debug)]
pub struct Supervisor<S> {
    config: Config,
    store: Arc<S>,
    cancel_token: CancellationToken,
}

impl<S: Store + 'static> Supervisor<S> {
    /// Creates a supervisor over `store` for the given configuration.
    pub fn new(config: Config, store: Arc<S>, cancel_token: CancellationToken) -> Self {
        Self { config, store, cancel_token }
    }

    /// Spawns all tasks and blocks until every one has returned.
    pub async fn run(self) -> Result<(), SupervisorError> {
        let interval = self.config.poll_interval()?;
        let timeout = self.config.rpc_timeout()?;

        let mut tasks = JoinSet::new();

        for endpoint in &self.config.endpoints {
            let ingest = IngestActor::new(
                endpoint.clone(),
                self.store.clone(),
                self.cancel_token.clone(),
            );
            let name = endpoint.name.clone();
            tasks.spawn(async move {
                if let Err(err) = ingest.start().await {
                    error!(target: "txscope::supervisor", client = %name, ?err, "Ingest task exited");
                }
            });

            let rpc = Arc::new(AlloyExecutionClient::new(&endpoint.rpc_url, timeout)?);
            let resolver = ResolverActor::new(
                &endpoint.name,
                rpc.clone(),
                self.store.clone(),
                interval,
                self.cancel_token.clone(),
            );
            let name = endpoint.name.clone();
            tasks.spawn(async move {
                if let Err(err) = resolver.start().await {
                    error!(target: "txscope::supervisor", client = %name, ?err, "Resolver task exited");
                }
            });

            if self.config.focil_enabled() {
                let reconciler = ReconcilerActor::new(
                    endpoint.clone(),
                    rpc,
                    self.store.clone(),
                    self.cancel_token.clone(),
                );
                let name = endpoint.name.clone();
                tasks.spawn(async move {
                    if let Err(err) = reconciler.start().await {
                        error!(target: "txscope::supervisor", client = %name, ?err, "Reconciler task exited");
                    }
                });
            }
        }

        if self.config.focil_enabled() {
            for beacon in &self.config.beacon_urls {
                let stream = InclusionStreamActor::new(
                    beacon.clone(),
                    self.store.clone(),
                    self.cancel_token.clone(),
                );
                let name = beacon.name.clone();
                tasks.spawn(async move {
                    if let Err(err) = stream.start().await {
                        error!(target: "txscope::supervisor", beacon = %name, ?err, "Inclusion stream task exited");
                    }
                });
            }
        }

        info!(
            target: "txscope::supervisor",
            tasks = tasks.len(),
            endpoints = self.config.endpoints.len(),
            focil = self.config.focil_enabled(),
            "All tasks started"
        );

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(target: "txscope::supervisor", %err, "Task panicked");
            }
        }

        info!(target: "txscope::supervisor", "All tasks stopped");
        Ok(())
    }
}
