// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket framing of requests and responses.
//!
//! Every text frame carries one JSON object tagged by `@type`:
//! - Client sends `Request` objects with a client-chosen `id`
//! - Server answers each with a `Response` or a `RequestError` echoing it
//!   as `requestId`

use serde::{Deserialize, Serialize};

use crate::response::{Request, Response};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "@type")]
pub enum ClientMessage {
    /// A batch of method calls.
    Request {
        /// Client-chosen id echoed in the reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(flatten)]
        request: Request,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "@type")]
pub enum ServerMessage {
    /// The method responses of one request.
    Response {
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(flatten)]
        response: Response,
    },

    /// The request as a whole was rejected.
    RequestError {
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Problem type URI, e.g. `urn:ietf:params:jmap:error:notRequest`.
        #[serde(rename = "type")]
        kind: String,
        status: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// Problem type for a frame that is not a valid request.
pub const NOT_REQUEST: &str = "urn:ietf:params:jmap:error:notRequest";
/// Problem type for a request naming a capability the server lacks.
pub const UNKNOWN_CAPABILITY: &str = "urn:ietf:params:jmap:error:unknownCapability";

impl ClientMessage {
    /// Creates a Request message.
    pub fn request(id: impl Into<String>, request: Request) -> Self {
        ClientMessage::Request {
            id: Some(id.into()),
            request,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates a Response message.
    pub fn response(request_id: Option<String>, response: Response) -> Self {
        ServerMessage::Response {
            request_id,
            response,
        }
    }

    /// Creates a RequestError message.
    pub fn request_error(
        request_id: Option<String>,
        kind: impl Into<String>,
        status: u16,
        detail: impl Into<String>,
    ) -> Self {
        ServerMessage::RequestError {
            request_id,
            kind: kind.into(),
            status,
            detail: Some(detail.into()),
        }
    }

    /// The request id this message answers.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Response { request_id, .. }
            | ServerMessage::RequestError { request_id, .. } => request_id.as_deref(),
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
