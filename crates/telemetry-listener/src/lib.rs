// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local ingestion endpoint for the Lambda Telemetry API.
//!
//! The [`TelemetryListener`] binds an HTTP server on a background task, hands every pushed batch
//! to an [`EventBuffer`] and stops under a bounded deadline. Draining the buffer and shipping the
//! events somewhere useful is left to the embedding extension.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod event_buffer;
pub mod handler;
pub mod listener;

pub use config::{BindAddress, ListenerConfig};
pub use diagnostics::{Diagnostic, Diagnostics, TracingDiagnostics};
pub use errors::ListenerError;
pub use event_buffer::{EventBuffer, EventRecord};
pub use listener::{ListenerState, TelemetryListener};
