// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests against a server running on a random port.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use mua_core::method::Namespace;
use mua_core::protocol::{ClientMessage, ServerMessage, NOT_REQUEST, UNKNOWN_CAPABILITY};
use mua_core::response::Request;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::*;
use crate::store::MailStore;

/// A test server that runs on a random port and can be controlled.
struct TestServer {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    state: ServerState,
}

impl TestServer {
    async fn start() -> Self {
        let state = ServerState::new(MailStore::demo("a1"));

        // Bind to port 0 to get a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state_clone = state.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = serve(listener, state_clone) => {
                    if let Err(e) = result {
                        eprintln!("Test server error: {}", e);
                    }
                }
                _ = shutdown_rx => {}
            }
        });

        TestServer {
            addr,
            shutdown_tx,
            state,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn mail_request(calls: serde_json::Value) -> Request {
    Request {
        using: vec![Namespace::Core.uri().into(), Namespace::Mail.uri().into()],
        method_calls: serde_json::from_value(calls).unwrap(),
    }
}

async fn round_trip(url: &str, frame: String) -> ServerMessage {
    let (ws, _) = connect_async(url).await.unwrap();
    let (mut sink, mut stream) = ws.split();
    sink.send(Message::Text(frame.into())).await.unwrap();

    match timeout(Duration::from_secs(5), stream.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => ServerMessage::from_json(&text).unwrap(),
        Ok(other) => panic!("Expected text reply, got {:?}", other),
        Err(_) => panic!("Timeout waiting for reply"),
    }
}

#[tokio::test]
async fn request_gets_response_with_echoed_id() {
    let server = TestServer::start().await;
    let request = mail_request(json!([["Mailbox/get", {"accountId": "a1"}, "0"]]));
    let frame = ClientMessage::request("r1", request).to_json().unwrap();

    match round_trip(&server.ws_url(), frame).await {
        ServerMessage::Response {
            request_id,
            response,
        } => {
            assert_eq!(request_id.as_deref(), Some("r1"));
            assert_eq!(response.method_responses.len(), 1);
            assert_eq!(response.method_responses[0].name(), "Mailbox/get");
        }
        other => panic!("Expected Response, got {:?}", other),
    }
    server.shutdown();
}

#[tokio::test]
async fn malformed_frame_is_not_a_request() {
    let server = TestServer::start().await;
    let reply = round_trip(&server.ws_url(), r#"{"@type":"Bogus"}"#.to_string()).await;

    match reply {
        ServerMessage::RequestError { kind, status, .. } => {
            assert_eq!(kind, NOT_REQUEST);
            assert_eq!(status, 400);
        }
        other => panic!("Expected RequestError, got {:?}", other),
    }
    server.shutdown();
}

#[tokio::test]
async fn unknown_capability_is_request_error() {
    let server = TestServer::start().await;
    let mut request = mail_request(json!([]));
    request.using.push("urn:example:unknown".into());
    let frame = ClientMessage::request("r2", request).to_json().unwrap();

    let reply = round_trip(&server.ws_url(), frame).await;
    assert_eq!(reply.request_id(), Some("r2"));
    assert!(matches!(
        reply,
        ServerMessage::RequestError { ref kind, .. } if kind == UNKNOWN_CAPABILITY
    ));
    server.shutdown();
}

#[tokio::test]
async fn changes_made_through_state_are_served() {
    let server = TestServer::start().await;
    let since = {
        let store = server.state.store().await;
        store.state(mua_core::EntityType::Email)
    };
    let id = server.state.store().await.emails()[0].id.clone();
    server.state.store().await.set_keyword(&id, "$flagged", true);

    let request = mail_request(json!([["Email/changes", {"accountId": "a1", "sinceState": since}, "0"]]));
    let frame = ClientMessage::request("r3", request).to_json().unwrap();
    let ServerMessage::Response { response, .. } = round_trip(&server.ws_url(), frame).await else {
        panic!("Expected Response");
    };
    assert_eq!(response.method_responses[0].arguments()["updated"], json!([id]));
    server.shutdown();
}

#[tokio::test]
async fn ping_gets_pong() {
    let server = TestServer::start().await;
    let (ws, _) = connect_async(&server.ws_url()).await.unwrap();
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Ping(vec![7u8].into())).await.unwrap();
    match timeout(Duration::from_secs(5), stream.next()).await {
        Ok(Some(Ok(Message::Pong(data)))) => assert_eq!(data.as_ref(), &[7u8]),
        other => panic!("Expected pong, got {:?}", other),
    }
    server.shutdown();
}
