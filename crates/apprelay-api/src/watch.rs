//! Watch translation
//!
//! A watch session owns one task that reads the backing Release watch,
//! drops records outside the resource type's scope, maps the rest to
//! Applications and hands them to the consumer one at a time.
//!
//! ```text
//! backing watch ──► scope filter ──► mapper ──► [1 slot] ──► consumer
//!                        ▲                         ▲
//!                        └──── stop / cancel ──────┘
//! ```
//!
//! The session is closed exactly once, by whichever comes first: the backing
//! stream ending, [`ApplicationWatch::stop`], the caller's cancellation
//! token, or the consumer dropping the watch. The backing watch is never
//! re-established.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::WatchEvent;
use kube::core::ErrorResponse;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use apprelay_common::types::{Application, Release};

use crate::backend::ReleaseEventStream;
use crate::mapper::ReleaseMapper;
use crate::scope::in_scope;

/// A translated watch event, serialised as `{"type": ..., "object": ...}`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum ApplicationEvent {
    /// An in-scope Release appeared
    Added(Application),
    /// An in-scope Release changed
    Modified(Application),
    /// An in-scope Release was removed
    Deleted(Application),
    /// The backing watch reported an error status
    Error(Status),
}

/// Full `v1` Status for an error reported by the backing watch
fn error_status(err: ErrorResponse) -> Status {
    Status {
        code: Some(i32::from(err.code)),
        message: Some(err.message),
        reason: Some(err.reason),
        status: Some(err.status),
        ..Default::default()
    }
}

/// Lifecycle of a watch session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchState {
    /// Events are still being translated
    Active,
    /// The session ended; no further events will be delivered
    Closed,
}

/// Stops a watch session; clones share the session
#[derive(Clone, Debug)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    token: CancellationToken,
}

impl StopHandle {
    fn new(token: CancellationToken) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            token,
        }
    }

    /// Stop the session
    ///
    /// Safe to call any number of times from any task. Returns `true` only
    /// for the call that actually stopped it.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Whether the session was stopped or its caller cancelled
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Consumer side of a watch session
///
/// Implements [`Stream`]; the stream ends when the session closes.
/// Dropping the watch stops the session.
pub struct ApplicationWatch {
    events: mpsc::Receiver<ApplicationEvent>,
    stop: StopHandle,
}

impl ApplicationWatch {
    /// Start translating a backing watch stream
    ///
    /// `cancel` is the caller's cancellation token; cancelling it closes the
    /// session as if [`stop`](Self::stop) had been called.
    pub fn spawn(
        upstream: ReleaseEventStream,
        mapper: ReleaseMapper,
        cancel: &CancellationToken,
    ) -> Self {
        let token = cancel.child_token();
        let (tx, events) = mpsc::channel(1);
        tokio::spawn(translate(upstream, tx, mapper, token.clone()));

        Self {
            events,
            stop: StopHandle::new(token),
        }
    }

    /// Receive the next event, `None` once the session is closed
    pub async fn recv(&mut self) -> Option<ApplicationEvent> {
        if self.stop.is_stopped() {
            return None;
        }
        self.events.recv().await
    }

    /// Stop the session; see [`StopHandle::stop`]
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    /// A handle that can stop the session from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> WatchState {
        if self.stop.is_stopped() || self.events.is_closed() {
            WatchState::Closed
        } else {
            WatchState::Active
        }
    }
}

impl Stream for ApplicationWatch {
    type Item = ApplicationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.stop.is_stopped() {
            return Poll::Ready(None);
        }
        self.events.poll_recv(cx)
    }
}

impl Drop for ApplicationWatch {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

async fn translate(
    mut upstream: ReleaseEventStream,
    tx: mpsc::Sender<ApplicationEvent>,
    mapper: ReleaseMapper,
    token: CancellationToken,
) {
    debug!(kind = %mapper.kind(), "Watch started");

    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(kind = %mapper.kind(), "Watch stopped");
                break;
            }
            event = upstream.next() => event,
        };

        let Some(event) = event else {
            debug!(kind = %mapper.kind(), "Backing watch ended");
            break;
        };

        let Some(out) = translate_event(&mapper, event) else {
            continue;
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(kind = %mapper.kind(), "Watch stopped during hand-off");
                break;
            }
            sent = tx.send(out) => {
                if sent.is_err() {
                    debug!(kind = %mapper.kind(), "Watch consumer went away");
                    break;
                }
            }
        }
    }
}

/// Translate one backing event; `None` means drop it
pub(crate) fn translate_event(
    mapper: &ReleaseMapper,
    event: Result<WatchEvent<kube::api::DynamicObject>, kube::Error>,
) -> Option<ApplicationEvent> {
    let (obj, wrap): (_, fn(Application) -> ApplicationEvent) = match event {
        Ok(WatchEvent::Added(obj)) => (obj, ApplicationEvent::Added),
        Ok(WatchEvent::Modified(obj)) => (obj, ApplicationEvent::Modified),
        Ok(WatchEvent::Deleted(obj)) => (obj, ApplicationEvent::Deleted),
        Ok(WatchEvent::Bookmark(_)) => return None,
        Ok(WatchEvent::Error(err)) => return Some(ApplicationEvent::Error(error_status(err))),
        Err(e) => {
            warn!(kind = %mapper.kind(), error = %e, "Skipping undecodable watch event");
            return None;
        }
    };

    let release = match Release::try_from_dynamic(&obj) {
        Ok(release) => release,
        Err(e) => {
            warn!(kind = %mapper.kind(), error = %e, "Skipping malformed Release in watch");
            return None;
        }
    };

    if !in_scope(&release, mapper.release_config()) {
        return None;
    }

    Some(wrap(mapper.release_to_application(&release)))
}
