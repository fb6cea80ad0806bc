// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities for the listener integration tests

#![allow(dead_code)]

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_listener::{BindAddress, Diagnostic, Diagnostics, ListenerConfig, TelemetryListener};
use tokio::time::timeout;

/// Diagnostics mock keeping the kind of every emitted diagnostic.
#[derive(Default)]
pub struct RecordingDiagnostics {
    seen: Mutex<Vec<&'static str>>,
    dropped_payloads: Mutex<Vec<Vec<u8>>>,
}

impl RecordingDiagnostics {
    pub fn seen(&self) -> Vec<&'static str> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.seen().iter().filter(|seen| **seen == kind).count()
    }

    pub fn dropped_payloads(&self) -> Vec<Vec<u8>> {
        self.dropped_payloads.lock().unwrap().clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, diagnostic: Diagnostic<'_>) {
        let kind = match diagnostic {
            Diagnostic::Starting { .. } => "starting",
            Diagnostic::Listening { .. } => "listening",
            Diagnostic::DroppedEvents { payload } => {
                self.dropped_payloads.lock().unwrap().push(payload.to_vec());
                "dropped"
            }
            Diagnostic::ConnectionFailed { .. } => "connection_failed",
            Diagnostic::ConnectionPanicked { .. } => "connection_panicked",
            Diagnostic::ServerFailed { .. } => "server_failed",
            Diagnostic::ServerClosed => "closed",
            Diagnostic::ShutdownForced { .. } => "forced",
        };
        self.seen.lock().unwrap().push(kind);
    }
}

/// Reserve a free local port. Another process could grab it before the listener binds, which is
/// fine for tests.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("Failed to reserve a local port")
}

pub fn local_config(port: u16) -> ListenerConfig {
    ListenerConfig {
        bind_address: BindAddress::Host("127.0.0.1".to_string()),
        port,
        shutdown_deadline: Duration::from_secs(1),
    }
}

/// Start a listener on a free local port and wait until it accepts connections
pub async fn start_local_listener() -> (TelemetryListener, Arc<RecordingDiagnostics>, SocketAddr) {
    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let listener = TelemetryListener::new(local_config(free_port()), diagnostics.clone());
    listener.start().expect("Failed to start listener");
    let addr = timeout(Duration::from_secs(2), listener.ready())
        .await
        .expect("Listener did not become ready in time")
        .expect("Listener failed to bind");
    (listener, diagnostics, addr)
}

/// Send one HTTP request over a fresh connection and return status and body
pub async fn send_push(
    addr: SocketAddr,
    method: &str,
    uri: &str,
    body: impl Into<Bytes>,
) -> Result<(StatusCode, Bytes), Box<dyn std::error::Error + Send + Sync>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = Request::builder()
        .uri(uri)
        .method(method)
        .header("Content-Type", "application/json")
        .body(Full::new(body.into()))?;
    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;

    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok((status, body))
}

pub fn telemetry_batch(events: &[(&str, &str)]) -> String {
    let events: Vec<String> = events
        .iter()
        .map(|(event_type, record)| {
            format!(r#"{{"time":"2022-10-12T00:00:00.000Z","type":"{event_type}","record":{record}}}"#)
        })
        .collect();
    format!("[{}]", events.join(","))
}
