//! JSON-RPC 2.0 framing for the event endpoint.
//!
//! Outbound requests:
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"subscribe","params":{"event":"NewBlock"}}
//! {"jsonrpc":"2.0","id":2,"method":"unsubscribe","params":{"subscriptionId":"0x1"}}
//! ```
//!
//! Inbound frames are responses (`result` / `error`, correlated by `id`) or
//! event pushes:
//! ```json
//! {"jsonrpc":"2.0","method":"event","params":{"event":"NewBlock","data":{"type":"newBlock",...}}}
//! ```

use crate::error::DecodeError;
use ledger_types::{EventPayload, SubscriptionId, Topic};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Client-chosen request id used for correlation.
pub type RequestId = u64;

/// The `id` member of an inbound response, as far as correlation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseId {
    /// The response carries no `id` member.
    Absent,
    /// A non-negative integer id, the only kind this client sends.
    Numeric(RequestId),
    /// `null`, a string, a negative or fractional number: never one of ours.
    Foreign,
}

impl ResponseId {
    fn from_raw(id: Option<&Value>) -> Self {
        match id {
            None => ResponseId::Absent,
            Some(value) => value.as_u64().map_or(ResponseId::Foreign, ResponseId::Numeric),
        }
    }

    /// Whether a response with this id may answer request `id`.
    ///
    /// Responses without an id are accepted: some nodes do not echo request
    /// ids on acknowledgements.
    pub fn answers(&self, id: RequestId) -> bool {
        match self {
            ResponseId::Absent => true,
            ResponseId::Numeric(n) => *n == id,
            ResponseId::Foreign => false,
        }
    }
}

/// JSON-RPC method carrying event pushes.
pub const EVENT_METHOD: &str = "event";

/// Requests the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Subscribe {
        id: RequestId,
        topic: Topic,
    },
    Unsubscribe {
        id: RequestId,
        subscription_id: SubscriptionId,
    },
}

impl Request {
    pub fn subscribe(id: RequestId, topic: Topic) -> Self {
        Request::Subscribe { id, topic }
    }

    pub fn unsubscribe(id: RequestId, subscription_id: SubscriptionId) -> Self {
        Request::Unsubscribe {
            id,
            subscription_id,
        }
    }

    pub fn id(&self) -> RequestId {
        match self {
            Request::Subscribe { id, .. } | Request::Unsubscribe { id, .. } => *id,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::Subscribe { .. } => "subscribe",
            Request::Unsubscribe { .. } => "unsubscribe",
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Successful subscribe response.
    SubscribeAck {
        request_id: ResponseId,
        subscription_id: SubscriptionId,
    },
    /// Successful unsubscribe response.
    UnsubscribeAck {
        request_id: ResponseId,
        subscription_id: SubscriptionId,
    },
    /// Error response to a request.
    Rejected {
        request_id: ResponseId,
        code: i64,
        message: String,
    },
    /// Pushed event.
    Event { topic: Topic, payload: EventPayload },
    /// Anything else the node may send (other notifications, unknown results).
    Other,
}

impl Envelope {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::SubscribeAck { .. } => "subscribe_ack",
            Envelope::UnsubscribeAck { .. } => "unsubscribe_ack",
            Envelope::Rejected { .. } => "rejected",
            Envelope::Event { .. } => "event",
            Envelope::Other => "other",
        }
    }
}

/// Wire encoding seam between the client and the transport.
pub trait FrameCodec: Send + Sync {
    /// Encode a request as a text frame.
    fn encode_request(&self, request: &Request) -> Result<String, DecodeError>;

    /// Decode one inbound frame.
    fn decode(&self, frame: &[u8]) -> Result<Envelope, DecodeError>;
}

/// JSON-RPC 2.0 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcCodec;

#[derive(Serialize)]
struct WireRequest<P: Serialize> {
    jsonrpc: &'static str,
    id: RequestId,
    method: &'static str,
    params: P,
}

#[derive(Serialize)]
struct SubscribeParams<'a> {
    event: &'a Topic,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnsubscribeParams<'a> {
    subscription_id: &'a SubscriptionId,
}

#[derive(Deserialize)]
struct RawFrame {
    /// `Some(Value::Null)` for `"id": null`, `None` when the member is missing.
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawError {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct EventParams {
    event: Topic,
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckResult {
    #[serde(default)]
    subscription_id: Option<SubscriptionId>,
    #[serde(default)]
    unsubscribed: Option<SubscriptionId>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcCodec {
    fn wire<P: Serialize>(id: RequestId, method: &'static str, params: P) -> WireRequest<P> {
        WireRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

impl FrameCodec for JsonRpcCodec {
    fn encode_request(&self, request: &Request) -> Result<String, DecodeError> {
        let encoded = match request {
            Request::Subscribe { id, topic } => serde_json::to_string(&Self::wire(
                *id,
                request.method(),
                SubscribeParams { event: topic },
            )),
            Request::Unsubscribe {
                id,
                subscription_id,
            } => serde_json::to_string(&Self::wire(
                *id,
                request.method(),
                UnsubscribeParams { subscription_id },
            )),
        };
        encoded.map_err(DecodeError::Encode)
    }

    fn decode(&self, frame: &[u8]) -> Result<Envelope, DecodeError> {
        let raw: RawFrame = serde_json::from_slice(frame).map_err(DecodeError::Json)?;
        let request_id = ResponseId::from_raw(raw.id.as_ref());

        if raw.method.as_deref() == Some(EVENT_METHOD) {
            let params = raw.params.ok_or(DecodeError::MissingField("params"))?;
            let params: EventParams = serde_json::from_value(params).map_err(DecodeError::Json)?;
            let payload = serde_json::from_value(params.data).map_err(|source| {
                DecodeError::Payload {
                    topic: params.event.clone(),
                    source,
                }
            })?;
            return Ok(Envelope::Event {
                topic: params.event,
                payload,
            });
        }

        if let Some(error) = raw.error {
            return Ok(Envelope::Rejected {
                request_id,
                code: error.code,
                message: error.message,
            });
        }

        let Some(result) = raw.result else {
            return Ok(Envelope::Other);
        };

        // Results that are not acknowledgement objects (e.g. `true`) are Other.
        let Ok(ack) = serde_json::from_value::<AckResult>(result) else {
            return Ok(Envelope::Other);
        };
        Ok(match (ack.subscription_id, ack.unsubscribed) {
            (Some(subscription_id), _) => Envelope::SubscribeAck {
                request_id,
                subscription_id,
            },
            (None, Some(subscription_id)) => Envelope::UnsubscribeAck {
                request_id,
                subscription_id,
            },
            (None, None) => Envelope::Other,
        })
    }
}
