// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logging capability injected into the listener.
//!
//! When the extension subscribes to its own logs, every line it writes to stdout comes back as a
//! new Telemetry API push. The listener therefore only reports through [`Diagnostics`], and the
//! request path only ever emits [`Diagnostic::DroppedEvents`].

use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, error, info};

use crate::errors::ListenerError;

/// Something worth reporting about the listener.
#[derive(Debug)]
pub enum Diagnostic<'a> {
    Starting { address: &'a str },
    Listening { local_addr: SocketAddr },
    /// The host discarded events before delivering this payload.
    DroppedEvents { payload: &'a [u8] },
    ConnectionFailed { error: &'a hyper::Error },
    /// A connection task panicked, most likely inside an injected [`Diagnostics`].
    ConnectionPanicked { error: &'a JoinError },
    ServerFailed { error: &'a ListenerError },
    ServerClosed,
    ShutdownForced { deadline: Duration },
}

pub trait Diagnostics: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic<'_>);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, diagnostic: Diagnostic<'_>) {
        match diagnostic {
            Diagnostic::Starting { address } => {
                info!(address, "Starting telemetry listener");
            }
            Diagnostic::Listening { local_addr } => {
                debug!(%local_addr, "Telemetry listener accepting connections");
            }
            Diagnostic::DroppedEvents { payload } => {
                info!(payload = %String::from_utf8_lossy(payload), "Dropped");
            }
            Diagnostic::ConnectionFailed { error } => {
                debug!(%error, "Telemetry listener connection error");
            }
            Diagnostic::ConnectionPanicked { error } => {
                error!(?error, "Telemetry listener connection handler panicked");
            }
            Diagnostic::ServerFailed { error } => {
                error!(%error, "Unexpected stop of telemetry listener");
            }
            Diagnostic::ServerClosed => {
                info!("Telemetry listener closed");
            }
            Diagnostic::ShutdownForced { deadline } => {
                error!(
                    deadline_ms = %deadline.as_millis(),
                    "Telemetry listener did not drain in time, closing remaining connections"
                );
            }
        }
    }
}
