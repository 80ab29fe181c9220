//! Classification of inbound envelopes.
//!
//! Transports may carry unrelated traffic, so anything that is not clearly a
//! Request or a Response is ignored rather than treated as an error. The
//! exception is a request-shaped document with a readable `id`: it is
//! surfaced as [`Envelope::Malformed`] so the sender can still be answered.

use crate::request::{Request, RequestId};
use crate::response::Response;
use serde_json::Value;

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(Request),
    Response(Response),
    /// Has `requester` and a valid `id`, but the rest does not decode.
    Malformed { id: RequestId, reason: String },
}

impl Envelope {
    /// Decode `text` by structural shape.
    ///
    /// - an object with `requester` is a Request, or `Malformed` when only
    ///   its `id` can be read;
    /// - an object with `id` and `code` and no `requester` is a Response;
    /// - anything else is `None`.
    pub fn classify(text: &str) -> Option<Envelope> {
        let value: Value = serde_json::from_str(text).ok()?;
        let object = value.as_object()?;

        if object.contains_key("requester") {
            let id = object
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| RequestId::parse(id).ok());
            match serde_json::from_value(value) {
                Ok(request) => Some(Envelope::Request(request)),
                Err(e) => id.map(|id| Envelope::Malformed {
                    id,
                    reason: e.to_string(),
                }),
            }
        } else if object.contains_key("id") && object.contains_key("code") {
            serde_json::from_value(value).ok().map(Envelope::Response)
        } else {
            None
        }
    }
}
