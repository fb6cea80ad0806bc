// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of the Telemetry API listener.
//!
//! [`TelemetryListener::start`] spawns a supervised server task and returns the URL to register
//! with the Telemetry API without waiting for the bind. [`TelemetryListener::shutdown`] cancels
//! the task, lets in-flight pushes finish within a deadline and aborts whatever is left after it.
//! If the server task fails on its own (bind or accept error), it reports the failure and
//! releases the listener so the extension is not left waiting on a dead socket.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::ListenerConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::errors::ListenerError;
use crate::event_buffer::EventBuffer;
use crate::handler;

/// Observable lifecycle of a [`TelemetryListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Uninitialized,
    /// Server task spawned, socket not bound yet.
    Starting,
    Running(SocketAddr),
    /// `shutdown` in progress.
    Draining,
    /// The server task failed and released the listener. Kept until the next `start`.
    Crashed,
    Stopped,
}

struct RunningServer {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    server: Mutex<Option<RunningServer>>,
    state: watch::Sender<ListenerState>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Shared {
    fn server(&self) -> MutexGuard<'_, Option<RunningServer>> {
        self.server.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `state` only while `generation` still owns the server slot.
    fn publish(&self, generation: u64, state: ListenerState) {
        let server = self.server();
        if owns(&server, generation) {
            self.state.send_replace(state);
        }
    }

    /// Self-shutdown of a crashed server. A newer server started in the meantime is left alone.
    fn release_crashed(&self, generation: u64) {
        let mut server = self.server();
        if !owns(&server, generation) {
            return;
        }
        if let Some(running) = server.take() {
            running.cancel.cancel();
        }
        self.state.send_replace(ListenerState::Crashed);
    }

    fn mark_stopped_if_idle(&self) {
        let server = self.server();
        if server.is_none() {
            self.state.send_replace(ListenerState::Stopped);
        }
    }
}

fn owns(server: &Option<RunningServer>, generation: u64) -> bool {
    server
        .as_ref()
        .is_some_and(|running| running.generation == generation)
}

/// Receives Telemetry API pushes and queues their events on an [`EventBuffer`].
pub struct TelemetryListener {
    config: ListenerConfig,
    buffer: EventBuffer,
    shared: Arc<Shared>,
    generation: AtomicU64,
}

impl TelemetryListener {
    pub fn new(config: ListenerConfig, diagnostics: Arc<dyn Diagnostics>) -> Self {
        let (state, _) = watch::channel(ListenerState::Uninitialized);
        TelemetryListener {
            config,
            buffer: EventBuffer::new(),
            shared: Arc::new(Shared {
                server: Mutex::new(None),
                state,
                diagnostics,
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Handle on the queue of received events, for the dispatcher to drain.
    pub fn buffer(&self) -> EventBuffer {
        self.buffer.clone()
    }

    pub fn state(&self) -> ListenerState {
        *self.shared.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.shared.server().is_some()
    }

    /// Spawns the server on the current tokio runtime and returns its URL.
    ///
    /// The URL is returned before the socket is bound, so the first pushes may race the bind.
    /// Use [`TelemetryListener::ready`] to wait for it. Bind failures are not returned here:
    /// they are reported through [`Diagnostics`] and the listener stops itself.
    pub fn start(&self) -> Result<String, ListenerError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;

        let mut server = self.shared.server();
        if server.is_some() {
            return Err(ListenerError::AlreadyRunning);
        }

        let address = self.config.listen_address();
        self.shared
            .diagnostics
            .emit(Diagnostic::Starting { address: &address });

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        self.shared.state.send_replace(ListenerState::Starting);

        // The slot is still locked, so a task failing right away waits for its own entry.
        let serving = serve(
            Arc::clone(&self.shared),
            generation,
            address,
            self.buffer.clone(),
            cancel.clone(),
        );
        let task = runtime.spawn(supervise(Arc::clone(&self.shared), generation, serving));
        *server = Some(RunningServer {
            generation,
            cancel,
            task,
        });

        Ok(self.config.endpoint_url())
    }

    /// Waits until the server accepts connections and returns the bound address.
    ///
    /// Fails with [`ListenerError::NotRunning`] if the listener stops or crashes first, or was
    /// never started.
    pub async fn ready(&self) -> Result<SocketAddr, ListenerError> {
        let mut updates = self.shared.state.subscribe();
        let reached = updates
            .wait_for(|state| *state != ListenerState::Starting)
            .await
            .map_err(|_| ListenerError::NotRunning)?;
        match *reached {
            ListenerState::Running(local_addr) => Ok(local_addr),
            _ => Err(ListenerError::NotRunning),
        }
    }

    /// Stops the server within the configured deadline. Does nothing if it is not running.
    pub async fn shutdown(&self) {
        self.shutdown_with_deadline(self.config.shutdown_deadline)
            .await;
    }

    /// Stops accepting connections and gives in-flight pushes until `deadline` to complete.
    ///
    /// Connections still open when the deadline expires are closed by aborting the server task.
    /// Either way the listener no longer owns a server when this returns, so a second call is a
    /// no-op.
    pub async fn shutdown_with_deadline(&self, deadline: Duration) {
        let running = self.shared.server().take();
        let Some(running) = running else {
            return;
        };
        self.shared.state.send_replace(ListenerState::Draining);
        running.cancel.cancel();

        let mut task = running.task;
        if tokio::time::timeout(deadline, &mut task).await.is_err() {
            task.abort();
            self.shared
                .diagnostics
                .emit(Diagnostic::ShutdownForced { deadline });
        }
        self.shared.mark_stopped_if_idle();
    }
}

impl Drop for TelemetryListener {
    fn drop(&mut self) {
        // No grace period without an await point: open connections are closed right away.
        if let Some(running) = self.shared.server().take() {
            running.cancel.cancel();
            running.task.abort();
        }
    }
}

async fn supervise<F>(shared: Arc<Shared>, generation: u64, serving: F)
where
    F: Future<Output = Result<(), ListenerError>>,
{
    match serving.await {
        Ok(()) => shared.diagnostics.emit(Diagnostic::ServerClosed),
        Err(error) => {
            shared
                .diagnostics
                .emit(Diagnostic::ServerFailed { error: &error });
            shared.release_crashed(generation);
        }
    }
}

async fn serve(
    shared: Arc<Shared>,
    generation: u64,
    address: String,
    buffer: EventBuffer,
    cancel: CancellationToken,
) -> Result<(), ListenerError> {
    let address = address.as_str();
    let listener = tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        bound = TcpListener::bind(address) => bound.map_err(|source| ListenerError::Bind {
            address: address.to_string(),
            source,
        })?,
    };
    let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
        address: address.to_string(),
        source,
    })?;
    shared.publish(generation, ListenerState::Running(local_addr));
    shared
        .diagnostics
        .emit(Diagnostic::Listening { local_addr });

    let server = http1::Builder::new();
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        let stream = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(ListenerError::Accept(e)),
                Ok((stream, _)) => stream,
            },
            finished = async {
                match connections.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    // Don't kill server on panic - report and continue
                    shared
                        .diagnostics
                        .emit(Diagnostic::ConnectionPanicked { error: &e });
                    continue;
                }
                Ok(()) | Err(_) => continue,
            },
        };

        let buffer = buffer.clone();
        let diagnostics = Arc::clone(&shared.diagnostics);
        let service = service_fn(move |req: Request<Incoming>| {
            let buffer = buffer.clone();
            let diagnostics = Arc::clone(&diagnostics);
            async move {
                Ok::<_, Infallible>(
                    handler::handle_push(req, &buffer, diagnostics.as_ref()).await,
                )
            }
        });

        let connection = graceful.watch(server.serve_connection(TokioIo::new(stream), service));
        let diagnostics = Arc::clone(&shared.diagnostics);
        connections.spawn(async move {
            if let Err(error) = connection.await {
                diagnostics.emit(Diagnostic::ConnectionFailed { error: &error });
            }
        });
    }

    drop(listener);
    graceful.shutdown().await;
    while connections.join_next().await.is_some() {}
    Ok(())
}
