// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;

/// Failures of the listener lifecycle.
///
/// Only `NoRuntime` and `AlreadyRunning` are returned by [`crate::TelemetryListener::start`].
/// Bind and accept failures happen on the background task and are reported through
/// [`crate::Diagnostics`] before the listener shuts itself down.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("no tokio runtime is available to run the listener")]
    NoRuntime,
    #[error("listener is already running")]
    AlreadyRunning,
    #[error("listener is not running")]
    NotRunning,
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}
