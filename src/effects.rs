//! Effect runner for the panic recorder
//!
//! This module handles executing effects produced by the state machine.
//! Device work runs on the blocking pool; every completion is reported back
//! to the state loop as an [`Event`] tagged with its session id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::{probe_access, CaptureError, CaptureGateway, ChunkReceiver};
use crate::dispatch::PanicDispatcher;
use crate::state_machine::{Effect, Event};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);

    /// Release everything still held. Called once when the state loop exits.
    fn shutdown(&self) {}
}

/// Per-session bookkeeping. Removing the entry is what "owns" the stop.
struct ActiveSession<C> {
    token: CancellationToken,
    capture: Option<C>,
    forwarder: Option<JoinHandle<()>>,
}

type Sessions<C> = Arc<Mutex<HashMap<Uuid, ActiveSession<C>>>>;

fn lock<C>(sessions: &Sessions<C>) -> MutexGuard<'_, HashMap<Uuid, ActiveSession<C>>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of the blocking part of `RequestAccess`.
enum Acquired {
    Started,
    Abandoned,
}

/// Effect runner backed by a [`CaptureGateway`] and a [`PanicDispatcher`].
pub struct CaptureEffectRunner<G: CaptureGateway> {
    gateway: Arc<G>,
    dispatcher: PanicDispatcher,
    max_recording: Duration,
    sessions: Sessions<G::Capture>,
}

impl<G: CaptureGateway> CaptureEffectRunner<G> {
    pub fn new(gateway: G, dispatcher: PanicDispatcher, max_recording: Duration) -> Arc<Self> {
        Arc::new(Self {
            gateway: Arc::new(gateway),
            dispatcher,
            max_recording,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn request_access(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let token = CancellationToken::new();
        lock(&self.sessions).insert(
            id,
            ActiveSession {
                token: token.clone(),
                capture: None,
                forwarder: None,
            },
        );

        let gateway = self.gateway.clone();
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            let (sink, chunks) = mpsc::unbounded_channel();
            let (go_tx, go_rx) = oneshot::channel();
            let forwarder = tokio::spawn(forward_chunks(
                id,
                chunks,
                go_rx,
                token.clone(),
                tx.clone(),
            ));

            match lock(&sessions).get_mut(&id) {
                Some(session) => session.forwarder = Some(forwarder),
                None => forwarder.abort(),
            }

            let blocking_sessions = sessions.clone();
            let result = tokio::task::spawn_blocking(move || {
                let device = match gateway.request_access() {
                    Ok(device) => device,
                    Err(e) => return Err(Event::AccessDenied { id, err: e }),
                };

                if token.is_cancelled() {
                    log::info!("Session {} cancelled while waiting for access", id);
                    gateway.release(device);
                    return Ok(Acquired::Abandoned);
                }

                let capture = gateway
                    .start_capture(device, sink)
                    .map_err(|e| Event::CaptureFailed { id, err: e })?;

                let mut guard = lock(&blocking_sessions);
                if let Some(session) = guard
                    .get_mut(&id)
                    .filter(|s| !s.token.is_cancelled())
                {
                    session.capture = Some(capture);
                    return Ok(Acquired::Started);
                }
                drop(guard);

                log::info!("Session {} cancelled during capture start", id);
                if let Err(e) = gateway.stop_capture(capture) {
                    log::warn!("Failed to stop abandoned capture: {}", e);
                }
                Ok(Acquired::Abandoned)
            })
            .await;

            match result {
                Ok(Ok(Acquired::Started)) => {
                    log::info!("Capture started for session {}", id);
                    let _ = tx.send(Event::AccessGranted { id }).await;
                    let _ = go_tx.send(());
                }
                Ok(Ok(Acquired::Abandoned)) => {}
                Ok(Err(event)) => {
                    lock(&sessions).remove(&id);
                    log::error!("Capture start failed: {:?}", event);
                    let _ = tx.send(event).await;
                }
                Err(join_err) => {
                    lock(&sessions).remove(&id);
                    let _ = tx
                        .send(Event::CaptureFailed {
                            id,
                            err: CaptureError::Stream(format!(
                                "capture task failed: {}",
                                join_err
                            )),
                        })
                        .await;
                }
            }
        });
    }

    fn stop_capture(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let Some(session) = lock(&self.sessions).remove(&id) else {
            log::debug!("StopCapture for unknown session {}", id);
            let _ = tx.try_send(Event::CaptureStopped { id });
            return;
        };
        session.token.cancel();

        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            let Some(capture) = session.capture else {
                // Capture never started; RequestAccess releases the device itself
                let _ = tx.send(Event::CaptureStopped { id }).await;
                return;
            };

            let result = tokio::task::spawn_blocking(move || gateway.stop_capture(capture))
                .await
                .unwrap_or_else(|e| Err(CaptureError::Stream(format!("stop task failed: {}", e))));

            // Sink is gone, so the forwarder finishes once it has drained
            if let Some(forwarder) = session.forwarder {
                let _ = forwarder.await;
            }

            match result {
                Ok(()) => {
                    log::info!("Capture stopped for session {}", id);
                    let _ = tx.send(Event::CaptureStopped { id }).await;
                }
                Err(e) => {
                    log::error!("Failed to stop capture: {}", e);
                    let _ = tx.send(Event::CaptureFailed { id, err: e }).await;
                }
            }
        });
    }

    fn start_recording_tick(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let Some(token) = lock(&self.sessions).get(&id).map(|s| s.token.clone()) else {
            return;
        };
        let max_duration = self.max_recording;

        tokio::spawn(async move {
            // Send tick events every second while the recording is active
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        log::debug!("Recording tick stopping - recording {} no longer active", id);
                        break;
                    }
                    _ = interval.tick() => {
                        if tx.send(Event::RecordingTick { id, max_duration }).await.is_err() {
                            log::debug!("Recording tick stopping - channel closed");
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// Forward captured chunks to the state loop in arrival order, starting only
/// once `AccessGranted` has been queued.
///
/// A capture error, or the sink closing before the session was stopped, is
/// reported as `CaptureFailed` so the state loop stops the dead capture.
async fn forward_chunks(
    id: Uuid,
    mut chunks: ChunkReceiver,
    go: oneshot::Receiver<()>,
    token: CancellationToken,
    tx: mpsc::Sender<Event>,
) {
    if go.await.is_err() {
        return;
    }
    while let Some(item) = chunks.recv().await {
        let event = match item {
            Ok(chunk) => Event::ChunkReceived { id, chunk },
            Err(err) => {
                log::error!("Capture for session {} failed: {}", id, err);
                let _ = tx.send(Event::CaptureFailed { id, err }).await;
                return;
            }
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
    if !token.is_cancelled() {
        log::error!("Capture for session {} ended while still recording", id);
        let err = CaptureError::Stream("audio stream closed unexpectedly".to_string());
        let _ = tx.send(Event::CaptureFailed { id, err }).await;
    }
}

impl<G: CaptureGateway> EffectRunner for CaptureEffectRunner<G> {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::RequestAccess { id } => self.request_access(id, tx),

            Effect::StopCapture { id } => self.stop_capture(id, tx),

            Effect::StartRecordingTick { id } => self.start_recording_tick(id, tx),

            Effect::ProbeAccess => {
                let gateway = self.gateway.clone();
                tokio::spawn(async move {
                    let result = tokio::task::spawn_blocking(move || probe_access(gateway.as_ref()))
                        .await
                        .unwrap_or_else(|e| {
                            Err(CaptureError::Stream(format!("probe task failed: {}", e)))
                        });
                    match &result {
                        Ok(()) => log::info!("Microphone access check passed"),
                        Err(e) => log::warn!("Microphone access check failed: {}", e),
                    }
                    let _ = tx.send(Event::AccessProbed { result }).await;
                });
            }

            Effect::Dispatch { id, clip } => {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    let event = match dispatcher.send(&clip).await {
                        Ok(ack) => Event::DispatchSucceeded { id, ack },
                        Err(err) => Event::DispatchFailed { id, err },
                    };
                    let _ = tx.send(event).await;
                });
            }

            Effect::Reject(_) | Effect::EmitUi => {
                // Handled in the main loop, not here
                unreachable!("{:?} should be handled in run_state_loop", effect);
            }
        }
    }

    fn shutdown(&self) {
        let sessions: Vec<_> = lock(&self.sessions).drain().collect();
        for (id, session) in sessions {
            session.token.cancel();
            if let Some(forwarder) = session.forwarder {
                forwarder.abort();
            }
            if let Some(capture) = session.capture {
                log::info!("Releasing capture for session {} on shutdown", id);
                if let Err(e) = self.gateway.stop_capture(capture) {
                    log::warn!("Failed to stop capture on shutdown: {}", e);
                }
            }
        }
    }
}
