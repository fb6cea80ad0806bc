// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! FIFO hand-off between the HTTP handler and whatever dispatches telemetry downstream.
//!
//! The buffer is unbounded: a push never fails and never evicts. Consumers either poll with
//! [`EventBuffer::pop`]/[`EventBuffer::drain`] or park on [`EventBuffer::pop_wait`].

use hyper::body::Bytes;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// One telemetry event exactly as the host delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord(Bytes);

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
}

impl EventRecord {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        EventRecord(payload.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `type` field of a JSON object payload (`platform.start`, `function`, ...), if any.
    pub fn event_type(&self) -> Option<String> {
        serde_json::from_slice::<Envelope>(&self.0)
            .ok()
            .map(|envelope| envelope.event_type)
    }
}

impl From<Bytes> for EventRecord {
    fn from(payload: Bytes) -> Self {
        EventRecord(payload)
    }
}

impl From<Vec<u8>> for EventRecord {
    fn from(payload: Vec<u8>) -> Self {
        EventRecord(Bytes::from(payload))
    }
}

impl From<&'static str> for EventRecord {
    fn from(payload: &'static str) -> Self {
        EventRecord(Bytes::from_static(payload.as_bytes()))
    }
}

#[derive(Default)]
struct Inner {
    records: Mutex<VecDeque<EventRecord>>,
    available: Notify,
}

/// Cheap to clone; every clone refers to the same queue.
#[derive(Clone, Default)]
pub struct EventBuffer {
    inner: Arc<Inner>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, VecDeque<EventRecord>> {
        // A panicking pusher cannot leave the deque half-modified.
        self.inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, record: EventRecord) {
        self.records().push_back(record);
        self.inner.available.notify_one();
    }

    /// Removes the oldest record, or returns `None` right away when the buffer is empty.
    pub fn pop(&self) -> Option<EventRecord> {
        self.records().pop_front()
    }

    /// Removes the oldest record, waiting for a push if the buffer is empty.
    pub async fn pop_wait(&self) -> EventRecord {
        loop {
            let notified = self.inner.available.notified();
            if let Some(record) = self.pop() {
                return record;
            }
            notified.await;
        }
    }

    /// Takes every queued record, oldest first.
    pub fn drain(&self) -> Vec<EventRecord> {
        self.records().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("len", &self.len())
            .finish()
    }
}
