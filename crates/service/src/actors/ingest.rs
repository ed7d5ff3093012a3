//! Pending-transaction hash ingest.

use crate::{Actor, config::Endpoint, unix_now};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::header::{HeaderName, HeaderValue};
use std::sync::Arc;
use thiserror::Error;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use txscope_storage::{ClientStorage, StorageError, Store, keys};
use txscope_types::{JsonRpcRequest, SubscriptionFrame};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors that end an ingest task.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The websocket upgrade request could not be built.
    #[error("invalid websocket request: {0}")]
    Request(String),

    /// Dialing or the subscription handshake failed.
    #[error("websocket connect failed")]
    Connect(#[source] tungstenite::Error),

    /// The subscription confirmation never arrived.
    #[error("subscription handshake failed: {0}")]
    Subscribe(String),

    /// The stream failed or closed other than by normal closure.
    #[error("websocket stream failed")]
    Stream(#[source] tungstenite::Error),

    /// The peer closed the stream abnormally.
    #[error("websocket closed: {0}")]
    Closed(String),

    /// A cache write failed; the task exits and supervision records it.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One ingest task per execution endpoint.
///
/// Dials the endpoint's websocket, subscribes to
/// `newPendingTransactions`, and for every notification frame writes, in
/// order: the first-seen arrival entry in the universal sorted set, the
/// per-client received record, and the queue entry for the resolver. The
/// arrival timestamp is captured before the frame is parsed.
#[derive(Debug)]
pub struct IngestActor<S> {
    endpoint: Endpoint,
    store: Arc<S>,
    storage: ClientStorage<S>,
    cancel_token: CancellationToken,
}

impl<S: Store + 'static> IngestActor<S> {
    /// Creates the ingest actor for `endpoint`.
    pub fn new(endpoint: Endpoint, store: Arc<S>, cancel_token: CancellationToken) -> Self {
        let storage = ClientStorage::new(&endpoint.name, store.clone());
        Self { endpoint, store, storage, cancel_token }
    }

    async fn dial(&self) -> Result<WsStream, IngestError> {
        let mut request = self
            .endpoint
            .websocket_url
            .as_str()
            .into_client_request()
            .map_err(|err| IngestError::Request(err.to_string()))?;
        for (name, value) in &self.endpoint.auth_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| IngestError::Request(err.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| IngestError::Request(err.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        let (mut ws, response) = connect_async(request).await.map_err(IngestError::Connect)?;
        debug!(
            target: "txscope::ingest",
            client = %self.endpoint.name,
            status = %response.status(),
            "Websocket connected"
        );

        let subscribe = serde_json::to_string(&JsonRpcRequest::subscribe_pending_transactions())
            .map_err(|err| IngestError::Subscribe(err.to_string()))?;
        ws.send(Message::text(subscribe)).await.map_err(IngestError::Connect)?;

        // The first frame confirms the subscription; its id is not needed.
        match ws.next().await {
            Some(Ok(frame)) => {
                debug!(
                    target: "txscope::ingest",
                    client = %self.endpoint.name,
                    ?frame,
                    "Subscription confirmed"
                );
            }
            Some(Err(err)) => return Err(IngestError::Connect(err)),
            None => return Err(IngestError::Subscribe("stream closed during handshake".into())),
        }

        info!(target: "txscope::ingest", client = %self.endpoint.name, "Subscribed to pending transactions");
        Ok(ws)
    }

    async fn handle_frame(&self, raw: &str, arrival_ts: i64) -> Result<(), IngestError> {
        let frame: SubscriptionFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                error!(target: "txscope::ingest", client = %self.endpoint.name, %err, "Frame parse error");
                return Ok(());
            }
        };
        let Some(params) = frame.params else {
            // Responses and keepalives carry no params.
            return Ok(());
        };
        if params.result.is_empty() {
            return Ok(());
        }
        let hash = params.result.to_lowercase();

        // First-seen-wins global arrival order, then the per-client record,
        // then the resolution queue entry, in frame order.
        self.store.sorted_add_if_absent(keys::universal(), &hash, arrival_ts as f64).await?;
        self.storage.store_received(&hash, arrival_ts).await?;
        self.storage.enqueue(&hash).await?;

        debug!(target: "txscope::ingest", client = %self.endpoint.name, %hash, "Hash ingested");
        Ok(())
    }
}

#[async_trait]
impl<S: Store + 'static> Actor for IngestActor<S> {
    type Error = IngestError;

    async fn start(self) -> Result<(), Self::Error> {
        let mut ws = self.dial().await?;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!(target: "txscope::ingest", client = %self.endpoint.name, "Cancellation requested, stopping...");
                    let _ = ws
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "stream shutdown".into(),
                        })))
                        .await;
                    return Ok(());
                }
                frame = ws.next() => {
                    // Arrival time is captured before any parsing.
                    let arrival_ts = unix_now();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(text.as_str(), arrival_ts).await?;
                        }
                        Some(Ok(Message::Close(close))) => {
                            let normal = close
                                .as_ref()
                                .is_none_or(|frame| frame.code == CloseCode::Normal);
                            if normal {
                                info!(target: "txscope::ingest", client = %self.endpoint.name, "Stream closed normally");
                                return Ok(());
                            }
                            let reason = close
                                .map(|frame| frame.reason.to_string())
                                .unwrap_or_default();
                            warn!(target: "txscope::ingest", client = %self.endpoint.name, %reason, "Stream closed abnormally");
                            return Err(IngestError::Closed(reason));
                        }
                        Some(Ok(_)) => {
                            // Binary and ping/pong frames carry no hashes.
                        }
                        Some(Err(err)) => {
                            error!(target: "txscope::ingest", client = %self.endpoint.name, %err, "Error reading stream");
                            return Err(IngestError::Stream(err));
                        }
                        None => {
                            warn!(target: "txscope::ingest", client = %self.endpoint.name, "Stream ended");
                            return Err(IngestError::Closed("stream ended".into()));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txscope_storage::MemoryStore;
    use txscope_types::TransactionStatus;

    fn actor() -> (Arc<MemoryStore>, IngestActor<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let endpoint = Endpoint {
            name: "alpha".into(),
            rpc_url: "http://localhost:8545".into(),
            websocket_url: "ws://localhost:8546".into(),
            auth_headers: Default::default(),
        };
        let actor = IngestActor::new(endpoint, store.clone(), CancellationToken::new());
        (store, actor)
    }

    fn notification(hash: &str) -> String {
        format!(
            r#"{{"jsonrpc":"2.0","method":"eth_subscription","params":{{"subscription":"0x9c","result":"{hash}"}}}}"#
        )
    }

    #[tokio::test]
    async fn frame_writes_arrival_record_and_queue_entry() {
        let (store, actor) = actor();
        actor.handle_frame(&notification("0xAA"), 100).await.unwrap();

        assert_eq!(store.sorted_score(keys::universal(), "0xaa").await.unwrap(), Some(100.0));
        let storage = ClientStorage::new("alpha", store.clone());
        let record = storage.read("0xaa").await.unwrap().unwrap();
        assert_eq!(record.metadata.status, TransactionStatus::Received);
        assert_eq!(record.metadata.time_received, 100);
        assert_eq!(storage.dequeue().await.unwrap(), Some("alpha:0xaa".into()));
    }

    #[tokio::test]
    async fn arrival_score_is_first_seen_wins() {
        let (store, actor) = actor();
        actor.handle_frame(&notification("0xaa"), 100).await.unwrap();
        actor.handle_frame(&notification("0xaa"), 90).await.unwrap();
        actor.handle_frame(&notification("0xaa"), 300).await.unwrap();

        assert_eq!(store.sorted_score(keys::universal(), "0xaa").await.unwrap(), Some(100.0));
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let (store, actor) = actor();
        actor.handle_frame("not json", 100).await.unwrap();
        actor.handle_frame(r#"{"jsonrpc":"2.0","id":1,"result":"0x9c"}"#, 100).await.unwrap();

        assert!(store.hash_get_all(&keys::meta("alpha")).await.unwrap().is_empty());
        assert_eq!(store.queue_len(&keys::stream("alpha")).await.unwrap(), 0);
    }
}
