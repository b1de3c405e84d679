// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::response::WireInvocation;
use serde_json::json;

fn request() -> Request {
    Request {
        using: vec!["urn:ietf:params:jmap:core".into()],
        method_calls: vec![WireInvocation(
            "Mailbox/get".into(),
            json!({ "accountId": "acc" }),
            "0".into(),
        )],
    }
}

#[test]
fn request_frame_format() {
    let msg = ClientMessage::request("r1", request());
    let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "@type": "Request",
            "id": "r1",
            "using": ["urn:ietf:params:jmap:core"],
            "methodCalls": [["Mailbox/get", { "accountId": "acc" }, "0"]],
        })
    );
    assert_eq!(ClientMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
}

#[test]
fn response_frame_parses() {
    let json = r#"{
        "@type": "Response",
        "requestId": "r1",
        "methodResponses": [["Mailbox/get", {"accountId": "acc"}, "0"]],
        "sessionState": "s0"
    }"#;
    let msg = ServerMessage::from_json(json).unwrap();
    assert_eq!(msg.request_id(), Some("r1"));
    let ServerMessage::Response { response, .. } = msg else {
        unreachable!("parsed as request error");
    };
    assert_eq!(response.session_state, "s0");
    assert_eq!(response.method_responses[0].name(), "Mailbox/get");
}

#[test]
fn request_error_frame() {
    let msg = ServerMessage::request_error(Some("r2".into()), NOT_REQUEST, 400, "bad json");
    let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(value["@type"], "RequestError");
    assert_eq!(value["type"], NOT_REQUEST);
    assert_eq!(value["status"], 400);
    assert_eq!(ServerMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
}

#[test]
fn unknown_type_is_rejected() {
    assert!(ServerMessage::from_json(r#"{"@type":"StateChange","changed":{}}"#).is_err());
}
