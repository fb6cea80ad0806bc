// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Handling of a single Telemetry API push.
//!
//! Nothing on this path logs except the dropped-events notice: a log line written here would be
//! delivered back to the listener as another push.

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::{Request, Response, StatusCode};
use serde_json::value::RawValue;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::event_buffer::{EventBuffer, EventRecord};

/// Substring the host puts in a batch after it discarded events.
pub const DROP_MARKER: &[u8] = b"logsDropped";

/// Reads the body of one push, enqueues its events and acknowledges it.
///
/// Method and path are not checked. The response is always an empty `200 OK`, even when the
/// body could not be read.
pub async fn handle_push<B>(
    req: Request<B>,
    buffer: &EventBuffer,
    diagnostics: &dyn Diagnostics,
) -> Response<Full<Bytes>>
where
    B: Body,
{
    if let Ok(collected) = req.into_body().collect().await {
        process_payload(collected.to_bytes(), buffer, diagnostics);
    }
    empty_ok()
}

/// Enqueues every event of `payload` and returns how many were pushed.
pub fn process_payload(
    payload: Bytes,
    buffer: &EventBuffer,
    diagnostics: &dyn Diagnostics,
) -> usize {
    if contains_drop_marker(&payload) {
        diagnostics.emit(Diagnostic::DroppedEvents { payload: &payload });
    }
    let records = split_records(&payload);
    let count = records.len();
    for record in records {
        buffer.push(record);
    }
    count
}

pub fn contains_drop_marker(payload: &[u8]) -> bool {
    payload
        .windows(DROP_MARKER.len())
        .any(|window| window == DROP_MARKER)
}

/// A JSON array yields one record per element, each a slice of the original payload. Anything
/// else that is not blank is kept whole as a single record.
fn split_records(payload: &Bytes) -> Vec<EventRecord> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Vec::new();
    }
    match serde_json::from_slice::<Vec<&RawValue>>(payload) {
        Ok(events) => events
            .into_iter()
            .map(|event| EventRecord::new(payload.slice_ref(event.get().as_bytes())))
            .collect(),
        Err(_) => vec![EventRecord::new(payload.clone())],
    }
}

fn empty_ok() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::OK;
    response
}
