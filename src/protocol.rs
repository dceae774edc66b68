use crate::device::EntityId;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const ENTITY_TYPE_DEVICE: &str = "DEVICE";
pub const SCOPE_LATEST_TELEMETRY: &str = "LATEST_TELEMETRY";
pub const RPC_METHOD_SET_DEVICE_STATE: &str = "setDeviceState";

/// Connection-scoped handle binding a subscribe request to its inbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u32);

impl SubscriptionId {
    pub const FIRST: SubscriptionId = SubscriptionId(1);

    /// `None` once ids are exhausted; ids never repeat within a connection.
    pub fn next(self) -> Option<SubscriptionId> {
        self.0.checked_add(1).map(SubscriptionId)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub entity_type: String,
    pub entity_id: EntityId,
    pub scope: String,
    pub subscription_id: SubscriptionId,
}

/// Outbound subscribe frame; one per configured device per connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeFrame {
    pub subscriptions: Vec<Subscription>,
}

impl SubscribeFrame {
    pub fn latest_telemetry(entity_id: EntityId, subscription_id: SubscriptionId) -> Self {
        Self {
            subscriptions: vec![Subscription {
                entity_type: ENTITY_TYPE_DEVICE.to_string(),
                entity_id,
                scope: SCOPE_LATEST_TELEMETRY.to_string(),
                subscription_id,
            }],
        }
    }
}

/// Inbound telemetry frame.
///
/// Both fields are optional on the wire: brokers also push status and
/// error frames that carry neither.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryFrame {
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl TelemetryFrame {
    /// Current value per key: the value half of the first `[ts, value]` pair.
    ///
    /// Keys whose payload is not a non-empty array of pairs are skipped.
    pub fn latest_values(&self) -> BTreeMap<String, Value> {
        let Some(data) = &self.data else {
            return BTreeMap::new();
        };

        data.iter()
            .filter_map(|(key, samples)| {
                let value = samples.as_array()?.first()?.as_array()?.get(1)?;
                Some((key.clone(), value.clone()))
            })
            .collect()
    }
}

/// Body of a one-way RPC command call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCommand {
    pub method: String,
    pub params: Map<String, Value>,
}

impl RpcCommand {
    pub fn set_device_state(params: Map<String, Value>) -> Self {
        Self {
            method: RPC_METHOD_SET_DEVICE_STATE.to_string(),
            params,
        }
    }
}

/// Outbound fire-and-forget request addressed by entity id.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    Command { entity_id: EntityId, body: RpcCommand },
    Telemetry { entity_id: EntityId, payload: Map<String, Value> },
}

impl OutboundRequest {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            OutboundRequest::Command { entity_id, .. } | OutboundRequest::Telemetry { entity_id, .. } => {
                entity_id
            }
        }
    }

    /// Path relative to the broker's HTTP API base.
    pub fn path(&self) -> String {
        match self {
            OutboundRequest::Command { entity_id, .. } => {
                format!("/api/plugins/rpc/twoway/{}", entity_id)
            }
            OutboundRequest::Telemetry { entity_id, .. } => {
                format!("/api/plugins/telemetry/DEVICE/{}/timeseries/ANY", entity_id)
            }
        }
    }

    pub fn body(&self) -> Result<Value, ProtocolError> {
        match self {
            OutboundRequest::Command { body, .. } => {
                serde_json::to_value(body).map_err(ProtocolError::SerializationError)
            }
            OutboundRequest::Telemetry { payload, .. } => Ok(Value::Object(payload.clone())),
        }
    }
}

/// Stateless encoder/decoder for broker frames.
#[derive(Debug, Default)]
pub struct ProtocolHandler;

impl ProtocolHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_frame(&self, text: &str) -> Result<TelemetryFrame, ProtocolError> {
        serde_json::from_str::<TelemetryFrame>(text).map_err(ProtocolError::InvalidJson)
    }

    pub fn serialize_subscribe(&self, frame: &SubscribeFrame) -> Result<String, ProtocolError> {
        serde_json::to_string(frame).map_err(ProtocolError::SerializationError)
    }
}

/// Broker websocket endpoint with the auth token in the query string.
pub fn websocket_endpoint(ws_url: &str, token: &str) -> String {
    format!("{}?token={}", ws_url, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_ids_never_wrap() {
        assert_eq!(SubscriptionId::FIRST.next(), Some(SubscriptionId(2)));
        assert_eq!(SubscriptionId(u32::MAX).next(), None);
    }

    #[test]
    fn test_subscribe_frame_wire_shape() {
        let frame = SubscribeFrame::latest_telemetry(EntityId::new("dev-1").unwrap(), SubscriptionId(3));
        let encoded = ProtocolHandler::new().serialize_subscribe(&frame).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(
            value,
            json!({
                "subscriptions": [{
                    "entityType": "DEVICE",
                    "entityId": "dev-1",
                    "scope": "LATEST_TELEMETRY",
                    "subscriptionId": 3
                }]
            })
        );
    }

    #[test]
    fn test_latest_values_takes_first_sample() {
        let frame = ProtocolHandler::new()
            .parse_frame(r#"{"subscriptionId":2,"data":{"level":[[1700,"42"],[1600,"40"]],"status":[[1700,true]]}}"#)
            .unwrap();

        assert_eq!(frame.subscription_id, Some(SubscriptionId(2)));
        let values = frame.latest_values();
        assert_eq!(values["level"], json!("42"));
        assert_eq!(values["status"], json!(true));
    }

    #[test]
    fn test_latest_values_skips_malformed_samples() {
        let frame = ProtocolHandler::new()
            .parse_frame(r#"{"subscriptionId":1,"data":{"empty":[],"scalar":5,"short":[[1700]],"ok":[[1,2]]}}"#)
            .unwrap();

        let values = frame.latest_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values["ok"], json!(2));
    }

    #[test]
    fn test_frame_without_id_parses() {
        let frame = ProtocolHandler::new().parse_frame(r#"{"errorCode":0}"#).unwrap();
        assert!(frame.subscription_id.is_none());
        assert!(frame.latest_values().is_empty());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let result = ProtocolHandler::new().parse_frame("{not json");
        assert!(matches!(result, Err(ProtocolError::InvalidJson(_))));
    }

    #[test]
    fn test_request_paths() {
        let id = EntityId::new("abc").unwrap();
        let command = OutboundRequest::Command {
            entity_id: id.clone(),
            body: RpcCommand::set_device_state(Map::new()),
        };
        let telemetry = OutboundRequest::Telemetry { entity_id: id, payload: Map::new() };

        assert_eq!(command.path(), "/api/plugins/rpc/twoway/abc");
        assert_eq!(telemetry.path(), "/api/plugins/telemetry/DEVICE/abc/timeseries/ANY");
        assert_eq!(command.body().unwrap(), json!({"method": "setDeviceState", "params": {}}));
    }

    #[test]
    fn test_websocket_endpoint() {
        assert_eq!(
            websocket_endpoint("ws://broker/api/ws", "t0k"),
            "ws://broker/api/ws?token=t0k"
        );
    }
}
