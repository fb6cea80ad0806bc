// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};

use anyhow::Context;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use telemetry_listener::{EventBuffer, ListenerConfig, TelemetryListener, TracingDiagnostics};

const LOG_LEVEL_ENV_VAR: &str = "TELEMETRY_LISTENER_LOG_LEVEL";
const DISPATCH_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let log_level = env::var(LOG_LEVEL_ENV_VAR)
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,{}", log_level);

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).context("could not parse log level in configuration")?,
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");

    let config = ListenerConfig::from_env();
    let listener = TelemetryListener::new(config, Arc::new(TracingDiagnostics));

    let url = match listener.start() {
        Ok(url) => url,
        Err(e) => {
            error!("Error starting telemetry listener: {e}");
            return Err(e.into());
        }
    };
    info!("Telemetry listener destination: {url}");

    let buffer = listener.buffer();
    let dispatcher = tokio::spawn(dispatch(buffer.clone()));

    wait_for_termination().await?;

    info!("Termination requested, stopping telemetry listener");
    listener.shutdown().await;
    dispatcher.abort();
    let remaining = buffer.drain();
    debug!("{} telemetry events left in buffer at exit", remaining.len());

    Ok(())
}

/// Drains the buffer on a fixed cadence. Shipping the events is up to the embedding extension;
/// this only keeps the buffer from growing while the listener runs.
async fn dispatch(buffer: EventBuffer) {
    let mut dispatch_interval = interval(DISPATCH_INTERVAL);
    dispatch_interval.tick().await; // discard first tick, which is instantaneous

    loop {
        dispatch_interval.tick().await;

        let events = buffer.drain();
        if !events.is_empty() {
            // debug only: anything written at the default level comes back as telemetry
            debug!("Dispatched {} telemetry events", events.len());
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = sigterm.recv() => {},
        result = tokio::signal::ctrl_c() => result.context("failed to listen for ctrl-c")?,
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}
