//! JSON-RPC frames exchanged over execution-client websockets.

use serde::{Deserialize, Serialize};

/// Outbound JSON-RPC 2.0 request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request id.
    pub id: u64,
    /// Method name.
    pub method: &'static str,
    /// Positional string parameters.
    pub params: Vec<&'static str>,
}

impl JsonRpcRequest {
    /// The `eth_subscribe("newPendingTransactions")` request.
    pub fn subscribe_pending_transactions() -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_subscribe",
            params: vec!["newPendingTransactions"],
        }
    }
}

/// Inbound subscription notification frame.
///
/// Subscription confirmations and unrelated responses deserialize with
/// `params: None`; readers skip those.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubscriptionFrame {
    /// Notification method, `eth_subscription` for data frames.
    #[serde(default)]
    pub method: Option<String>,
    /// Subscription payload.
    #[serde(default)]
    pub params: Option<SubscriptionParams>,
}

/// Payload of a subscription notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubscriptionParams {
    /// Server-assigned subscription id.
    #[serde(default)]
    pub subscription: String,
    /// The notification body; a transaction hash for pending-tx streams.
    #[serde(default)]
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_shape() {
        let encoded =
            serde_json::to_string(&JsonRpcRequest::subscribe_pending_transactions()).unwrap();
        assert_eq!(
            encoded,
            r#"{"jsonrpc":"2.0","id":1,"method":"eth_subscribe","params":["newPendingTransactions"]}"#
        );
    }

    #[test]
    fn parses_notification_frame() {
        let frame: SubscriptionFrame = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0x9c","result":"0xAA"}}"#,
        )
        .unwrap();
        assert_eq!(frame.params.unwrap().result, "0xAA");
    }

    #[test]
    fn confirmation_frame_has_no_params() {
        let frame: SubscriptionFrame =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":"0x9c"}"#).unwrap();
        assert!(frame.params.is_none());
    }
}
