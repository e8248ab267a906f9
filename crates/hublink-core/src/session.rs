// ── Session engine ──
//
// One session per transport. A single dispatch task owns the inbound
// channel and is the only writer of live state: it decodes frames,
// resolves acks, applies updates to the cache, and fans events out to
// listeners, strictly in arrival order. Everything else (commands,
// subscriptions) talks to the hub through the outbound channel and waits
// on the structures the dispatch task settles.

use std::sync::Arc;

use hublink_api::{AckStatus, AttributeValue, DeviceRecord, Frame, FrameKind, TopicId, Transport};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::StateCache;
use crate::correlation::{CommandOutcome, ConfirmedChange, CorrelationTable};
use crate::device::{Device, DeviceKind};
use crate::error::EngineError;
use crate::registry::{SubscriptionHandle, SubscriptionRegistry, UpdateEvent, UpdateReceiver};

const DIAGNOSTIC_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of a session, observable through [`Session::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Closed,
}

/// Non-fatal protocol trouble the dispatch loop shrugged off.
///
/// Surfaced on a broadcast channel so embedders can log or count them;
/// the loop itself only emits a warning and moves on.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// An inbound frame failed to decode and was discarded.
    Decode { message: String, raw: String },
    /// A frame kind arrived that the hub should never send.
    UnexpectedFrame { kind: FrameKind, topic: TopicId },
}

/// An established hub session.
///
/// Owns the dispatch task. Dropping the session (or calling [`end`])
/// closes it; [`Device`] handles hold weak references and start failing
/// with [`EngineError::SessionClosed`] once it is gone.
///
/// [`end`]: Session::end
pub struct Session {
    inner: Arc<SessionInner>,
    dispatch: Option<JoinHandle<()>>,
}

pub(crate) struct SessionInner {
    outbound: mpsc::Sender<String>,
    pub(crate) correlations: CorrelationTable,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) cache: StateCache,
    state: watch::Sender<SessionState>,
    diagnostics: broadcast::Sender<Diagnostic>,
    cancel: CancellationToken,
}

impl Session {
    /// Take ownership of an authenticated transport and start the dispatch
    /// loop. Fails with [`EngineError::ConnectionError`] if the transport
    /// is already closed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(transport: Transport) -> Result<Self, EngineError> {
        if transport.is_closed() {
            return Err(EngineError::ConnectionError {
                reason: "transport already closed".into(),
            });
        }

        let (outbound, inbound, cancel) = transport.into_parts();
        let (state, _) = watch::channel(SessionState::Connected);
        let (diagnostics, _) = broadcast::channel(DIAGNOSTIC_CHANNEL_CAPACITY);

        let inner = Arc::new(SessionInner {
            outbound,
            correlations: CorrelationTable::new(),
            registry: SubscriptionRegistry::new(),
            cache: StateCache::new(),
            state,
            diagnostics,
            cancel,
        });

        let dispatch = tokio::spawn(dispatch_loop(Arc::clone(&inner), inbound));
        info!("session started");

        Ok(Self {
            inner,
            dispatch: Some(dispatch),
        })
    }

    /// Watch the session lifecycle. The receiver flips to
    /// [`SessionState::Closed`] exactly once.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Subscribe to non-fatal protocol diagnostics.
    pub fn diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.inner.diagnostics.subscribe()
    }

    /// Build a device handle from a directory record, seeding the cache
    /// with the record's initial attribute states.
    pub fn attach(&self, record: &DeviceRecord) -> Device {
        let topic = TopicId::for_device(record.id);
        self.inner.cache.seed(
            &topic,
            record.attributes.iter().filter_map(|a| {
                a.state
                    .as_deref()
                    .map(|s| (a.name.clone(), AttributeValue::parse(s)))
            }),
        );
        debug!(%topic, kind = %record.kind, "device attached");
        Device::new(
            topic,
            DeviceKind::from_directory(&record.kind),
            record.name.clone(),
            Arc::downgrade(&self.inner),
        )
    }

    /// Attach every record from a directory listing.
    pub fn attach_all(&self, records: &[DeviceRecord]) -> Vec<Device> {
        records.iter().map(|r| self.attach(r)).collect()
    }

    /// Build a device handle for a known topic without a directory record.
    pub fn device(&self, topic: TopicId, kind: DeviceKind, name: impl Into<String>) -> Device {
        Device::new(topic, kind, name.into(), Arc::downgrade(&self.inner))
    }

    /// End the session: stop the dispatch loop, fail all pending commands
    /// with [`EngineError::ConnectionLost`], and tear down the transport.
    /// This consumes the session, so `Device` handles are orphaned once it
    /// returns: commands fail with [`EngineError::SessionClosed`] and
    /// reads report unknown.
    pub async fn end(mut self) {
        info!("ending session");
        self.inner.cancel.cancel();
        if let Some(dispatch) = self.dispatch.take() {
            let _ = dispatch.await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Without this the detached dispatch task would keep the inner
        // state alive past the last strong reference.
        self.inner.cancel.cancel();
    }
}

impl SessionInner {
    pub(crate) fn is_closed(&self) -> bool {
        *self.state.borrow() == SessionState::Closed
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::SessionClosed);
        }
        Ok(())
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), EngineError> {
        let text = frame.encode()?;
        self.outbound.send(text).await.map_err(|_| {
            if self.is_closed() {
                EngineError::SessionClosed
            } else {
                EngineError::ConnectionLost
            }
        })
    }

    /// Non-blocking send for frames queued while a registry entry is
    /// locked. Best effort: a full or closed channel drops the frame.
    fn try_send_frame(&self, frame: &Frame) -> bool {
        match frame.encode() {
            Ok(text) => self.outbound.try_send(text).is_ok(),
            Err(_) => false,
        }
    }

    /// Send an attribute-change command and wait for its acknowledgment.
    ///
    /// On success the confirmed value is written to the cache and
    /// returned; the cache is never touched optimistically.
    pub(crate) async fn set_attribute(
        &self,
        topic: &TopicId,
        attribute: &str,
        value: AttributeValue,
        timeout: Duration,
    ) -> Result<AttributeValue, EngineError> {
        self.ensure_open()?;

        let (id, mut rx) = self.correlations.register();
        let frame = Frame::command(topic.clone(), id, attribute, value.clone());

        if let Err(e) = self.send_frame(&frame).await {
            self.correlations.cancel(id);
            return Err(e);
        }
        debug!(%topic, attribute, correlation_id = id, "command sent");

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => self.finish_set(topic, attribute, value, outcome),
            // The table was torn down without settling us; treat as loss.
            Ok(Err(_)) => Err(EngineError::ConnectionLost),
            Err(_) => {
                if self.correlations.expire(id) {
                    warn!(%topic, attribute, correlation_id = id, "command timed out");
                    Err(EngineError::Timeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                } else {
                    // The ack resolved us in the same instant the deadline
                    // fired; honor the outcome that won the race.
                    match rx.try_recv() {
                        Ok(outcome) => self.finish_set(topic, attribute, value, outcome),
                        Err(_) => Err(EngineError::ConnectionLost),
                    }
                }
            }
        }
    }

    fn finish_set(
        &self,
        topic: &TopicId,
        requested_attribute: &str,
        requested_value: AttributeValue,
        outcome: CommandOutcome,
    ) -> Result<AttributeValue, EngineError> {
        let change = outcome?;
        let attribute = change
            .attribute
            .unwrap_or_else(|| requested_attribute.to_owned());
        let confirmed = change.value.unwrap_or(requested_value);
        self.cache.apply(topic, &attribute, confirmed.clone());
        trace!(%topic, attribute, "confirmed value cached");
        Ok(confirmed)
    }

    /// Register a listener, telling the hub on the topic's first one.
    pub(crate) async fn subscribe(
        &self,
        topic: &TopicId,
    ) -> Result<(SubscriptionHandle, UpdateReceiver), EngineError> {
        self.ensure_open()?;

        let (handle, rx, first) = self.registry.subscribe(topic);
        if first {
            if let Err(e) = self.send_frame(&Frame::subscribe(topic.clone())).await {
                // The hub was never told; no unsubscribe frame needed.
                self.registry.unsubscribe(&handle, || {});
                return Err(e);
            }
            debug!(%topic, "subscribe sent");
        }
        Ok((handle, rx))
    }

    /// Remove a listener, telling the hub when it was the topic's last.
    /// Unsubscribing never clears cached state. The frame goes out while
    /// the registry entry is still locked, so a racing `subscribe` on the
    /// same topic cannot end up behind a stale unsubscribe on the wire.
    pub(crate) fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.registry.unsubscribe(handle, || {
            if self.try_send_frame(&Frame::unsubscribe(handle.topic().clone())) {
                debug!(topic = %handle.topic(), "unsubscribe sent");
            } else {
                trace!(topic = %handle.topic(), "unsubscribe not sent; transport gone");
            }
        });
    }

    fn emit_diagnostic(&self, diagnostic: Diagnostic) {
        // No receivers is fine; diagnostics are strictly optional.
        let _ = self.diagnostics.send(diagnostic);
    }

    fn close(&self) {
        self.correlations.fail_all(|| EngineError::ConnectionLost);
        let _ = self.state.send(SessionState::Closed);
    }
}

// ── Dispatch loop ───────────────────────────────────────────────────

async fn dispatch_loop(inner: Arc<SessionInner>, mut inbound: mpsc::Receiver<String>) {
    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => {
                debug!("dispatch cancelled");
                break;
            }
            frame = inbound.recv() => {
                let Some(text) = frame else {
                    info!("transport closed");
                    break;
                };
                handle_frame(&inner, &text);
            }
        }
    }

    inner.close();
    inner.cancel.cancel();
    debug!("dispatch loop exited");
}

fn handle_frame(inner: &SessionInner, text: &str) {
    let frame = match Frame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "discarding undecodable frame");
            inner.emit_diagnostic(Diagnostic::Decode {
                message: e.to_string(),
                raw: text.to_owned(),
            });
            return;
        }
    };

    trace!(kind = ?frame.kind, topic = %frame.topic, "frame received");

    match frame.kind {
        FrameKind::CommandAck => handle_command_ack(inner, frame),
        FrameKind::UpdateEvent => handle_update_event(inner, frame),
        FrameKind::SubscribeAck => {
            if !inner.registry.mark_subscribed(&frame.topic) {
                trace!(topic = %frame.topic, "subscribe ack for inactive topic");
            }
        }
        kind @ (FrameKind::Command | FrameKind::Subscribe | FrameKind::Unsubscribe) => {
            warn!(?kind, topic = %frame.topic, "outbound-only frame kind received");
            inner.emit_diagnostic(Diagnostic::UnexpectedFrame {
                kind,
                topic: frame.topic,
            });
        }
    }
}

fn handle_command_ack(inner: &SessionInner, frame: Frame) {
    let Some(id) = frame.correlation_id else {
        warn!(topic = %frame.topic, "command ack without correlation id");
        inner.emit_diagnostic(Diagnostic::UnexpectedFrame {
            kind: FrameKind::CommandAck,
            topic: frame.topic,
        });
        return;
    };

    let outcome = match frame.status {
        Some(AckStatus::Error) => Err(EngineError::CommandFailed {
            message: format!("command rejected for {}", frame.topic),
        }),
        // A missing status reads as success; the hub omits it on some
        // firmware versions.
        Some(AckStatus::Ok) | None => Ok(ConfirmedChange {
            attribute: frame.attribute,
            value: frame.value,
        }),
    };

    if !inner.correlations.resolve(id, outcome) {
        trace!(correlation_id = id, "late or duplicate ack discarded");
    }
}

fn handle_update_event(inner: &SessionInner, frame: Frame) {
    let (Some(attribute), Some(value)) = (frame.attribute, frame.value) else {
        warn!(topic = %frame.topic, "update event missing attribute or value");
        inner.emit_diagnostic(Diagnostic::UnexpectedFrame {
            kind: FrameKind::UpdateEvent,
            topic: frame.topic,
        });
        return;
    };

    // Cache first, then fan out: a listener reading the cache on receipt
    // sees this value or a newer one.
    let stored = inner.cache.apply(&frame.topic, &attribute, value.clone());
    let event = Arc::new(UpdateEvent {
        topic: frame.topic,
        attribute,
        value,
        observed_at: stored.updated_at,
    });

    // Pruning dead listeners empties the topic; release it at the hub
    // from inside the registry's entry lock, so a concurrent subscribe
    // cannot queue its frame ahead of this unsubscribe.
    inner.registry.deliver(&event, || {
        if inner.try_send_frame(&Frame::unsubscribe(event.topic.clone())) {
            debug!(topic = %event.topic, "all listeners gone, unsubscribed");
        } else {
            warn!(topic = %event.topic, "listener prune could not release the topic");
        }
    });
}
