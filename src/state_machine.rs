//! State machine for the panic recorder
//!
//! This module implements the recorder lifecycle using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new state and a list of effects to execute.

use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::audio::{CaptureChunk, CaptureError, ChunkBuffer, EncodedAudio};
use crate::dispatch::{Ack, DispatchError};

/// Reasons a recorder command is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecorderError {
    #[error("A recording is already in progress")]
    Busy,
    #[error("No recording in progress")]
    NotRecording,
    #[error("There is no recording to send")]
    NothingToSend,
    #[error("The recording is already being sent")]
    SendInFlight,
    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),
    #[error("Recorder must be reset after a failure: {0}")]
    NeedsReset(String),
    #[error("Recorder has shut down")]
    Closed,
}

/// Internal state of the recording workflow.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    Requesting {
        session_id: Uuid,
    },
    Recording {
        session_id: Uuid,
        chunks: ChunkBuffer,
        started_at: Instant,
    },
    Processing {
        session_id: Uuid,
        chunks: ChunkBuffer,
    },
    Ready {
        session_id: Uuid,
        clip: EncodedAudio,
        sending: bool,
        last_error: Option<String>,
    },
    Failed {
        error: CaptureError,
    },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

impl State {
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            State::Requesting { session_id }
            | State::Recording { session_id, .. }
            | State::Processing { session_id, .. }
            | State::Ready { session_id, .. } => Some(*session_id),
            State::Idle | State::Failed { .. } => None,
        }
    }
}

/// Events that can trigger state transitions.
/// Commands come from the user; the rest are completions reported by the effect runner.
#[derive(Debug, Clone)]
pub enum Event {
    /// User asked to start a new recording
    Start,
    /// User asked to stop the current recording
    Stop,
    /// User asked to dispatch the finished clip
    Send,
    /// User cancelled, or the owning view closed
    Cancel,
    /// Explicit microphone availability check
    CheckAccess,

    /// Once-a-second tick while recording (carries the configured limit)
    RecordingTick {
        id: Uuid,
        max_duration: Duration,
    },

    // Device events
    AccessGranted {
        id: Uuid,
    },
    AccessDenied {
        id: Uuid,
        err: CaptureError,
    },
    ChunkReceived {
        id: Uuid,
        chunk: CaptureChunk,
    },
    CaptureStopped {
        id: Uuid,
    },
    CaptureFailed {
        id: Uuid,
        err: CaptureError,
    },
    AccessProbed {
        result: Result<(), CaptureError>,
    },

    // Dispatch events
    DispatchSucceeded {
        id: Uuid,
        ack: Ack,
    },
    DispatchFailed {
        id: Uuid,
        err: DispatchError,
    },
}

impl Event {
    /// Session the event belongs to, for events produced by a running session.
    fn session_id(&self) -> Option<Uuid> {
        match self {
            Event::RecordingTick { id, .. }
            | Event::AccessGranted { id }
            | Event::AccessDenied { id, .. }
            | Event::ChunkReceived { id, .. }
            | Event::CaptureStopped { id }
            | Event::CaptureFailed { id, .. }
            | Event::DispatchSucceeded { id, .. }
            | Event::DispatchFailed { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Ask for the microphone and, once granted, start capturing
    RequestAccess { id: Uuid },
    /// Stop capturing (or abandon a pending request) and release the device
    StopCapture { id: Uuid },
    /// Request access and release it immediately
    ProbeAccess,
    /// Start sending RecordingTick events every second while recording
    StartRecordingTick { id: Uuid },
    /// Hand the clip to the dispatch adapter
    Dispatch { id: Uuid, clip: EncodedAudio },
    /// The triggering command was refused
    Reject(RecorderError),
    /// Signal to publish UI state
    EmitUi,
}

fn new_session() -> (State, Vec<Effect>) {
    let id = Uuid::new_v4();
    (
        State::Requesting { session_id: id },
        vec![Effect::RequestAccess { id }, Effect::EmitUi],
    )
}

fn reject(state: State, err: RecorderError) -> (State, Vec<Effect>) {
    (state, vec![Effect::Reject(err)])
}

fn unavailable(error: &CaptureError) -> RecorderError {
    if error.blocks_microphone() {
        RecorderError::MicrophoneUnavailable(error.to_string())
    } else {
        RecorderError::NeedsReset(error.to_string())
    }
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Session events whose id doesn't match the current session are dropped
/// - Illegal commands produce `Effect::Reject` and leave the state unchanged
/// - Always emit EmitUi after visible state changes
pub fn reduce(state: State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    if let Some(eid) = event.session_id() {
        if state.session_id() != Some(eid) {
            log::debug!("Dropping stale event for session {}", eid);
            return (state, vec![]);
        }
    }

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, Start) => new_session(),
        (Idle, Cancel) => (Idle, vec![]),
        (Idle, CheckAccess) => (Idle, vec![ProbeAccess]),
        (Idle, AccessProbed { result: Err(err) }) if err.blocks_microphone() => {
            log::warn!("Microphone unavailable: {}", err);
            (Failed { error: err }, vec![EmitUi])
        }

        // -----------------
        // Requesting
        // -----------------
        (Requesting { session_id }, AccessGranted { .. }) => (
            Recording {
                session_id,
                chunks: ChunkBuffer::new(),
                started_at: Instant::now(),
            },
            vec![StartRecordingTick { id: session_id }, EmitUi],
        ),
        (Requesting { .. }, AccessDenied { err, .. }) => {
            log::warn!("Microphone access denied: {}", err);
            (Failed { error: err }, vec![EmitUi])
        }
        (Requesting { .. }, CaptureFailed { err, .. }) => (Failed { error: err }, vec![EmitUi]),
        (Requesting { session_id }, Cancel) => (
            Idle,
            // The grant may still arrive; the runner releases it
            vec![StopCapture { id: session_id }, EmitUi],
        ),

        // -----------------
        // Recording
        // -----------------
        (
            Recording {
                session_id,
                mut chunks,
                started_at,
            },
            ChunkReceived { chunk, .. },
        ) => {
            chunks.push(chunk);
            (
                Recording {
                    session_id,
                    chunks,
                    started_at,
                },
                vec![],
            )
        }
        (
            Recording {
                session_id, chunks, ..
            },
            Stop,
        ) => (
            Processing { session_id, chunks },
            vec![StopCapture { id: session_id }, EmitUi],
        ),
        (
            Recording {
                session_id,
                chunks,
                started_at,
            },
            RecordingTick { max_duration, .. },
        ) => {
            let elapsed = started_at.elapsed();
            if elapsed >= max_duration {
                log::warn!(
                    "Recording {} auto-stopped after {:?} (max duration reached)",
                    session_id,
                    elapsed
                );
                (
                    Processing { session_id, chunks },
                    vec![StopCapture { id: session_id }, EmitUi],
                )
            } else {
                (
                    Recording {
                        session_id,
                        chunks,
                        started_at,
                    },
                    vec![EmitUi],
                )
            }
        }
        (Recording { session_id, .. }, CaptureFailed { err, .. }) => (
            Failed { error: err },
            vec![StopCapture { id: session_id }, EmitUi],
        ),
        // Cancel during recording discards everything captured so far
        (Recording { session_id, .. }, Cancel) => {
            (Idle, vec![StopCapture { id: session_id }, EmitUi])
        }

        // -----------------
        // Processing
        // -----------------
        (
            Processing {
                session_id,
                mut chunks,
            },
            ChunkReceived { chunk, .. },
        ) => {
            chunks.push(chunk);
            (Processing { session_id, chunks }, vec![])
        }
        (Processing { session_id, chunks }, CaptureStopped { .. }) => {
            let chunk_count = chunks.chunk_count();
            match chunks.finalize() {
                Some(clip) => {
                    log::info!(
                        "Recording {} ready: {} bytes from {} chunk(s), {}",
                        session_id,
                        clip.len(),
                        chunk_count,
                        clip.mime
                    );
                    (
                        Ready {
                            session_id,
                            clip,
                            sending: false,
                            last_error: None,
                        },
                        vec![EmitUi],
                    )
                }
                None => (
                    Failed {
                        error: CaptureError::EmptyRecording,
                    },
                    vec![EmitUi],
                ),
            }
        }
        (Processing { .. }, CaptureFailed { err, .. }) => (Failed { error: err }, vec![EmitUi]),
        // StopCapture is already in flight and releases the device
        (Processing { .. }, Cancel) => (Idle, vec![EmitUi]),

        // -----------------
        // Ready
        // -----------------
        (
            Ready {
                session_id,
                clip,
                sending: false,
                ..
            },
            Send,
        ) => {
            let effects = vec![
                Dispatch {
                    id: session_id,
                    clip: clip.clone(),
                },
                EmitUi,
            ];
            (
                Ready {
                    session_id,
                    clip,
                    sending: true,
                    last_error: None,
                },
                effects,
            )
        }
        (state @ Ready { sending: true, .. }, Send) => reject(state, RecorderError::SendInFlight),
        (Ready { session_id, .. }, DispatchSucceeded { ack, .. }) => {
            log::info!("Recording {} dispatched: {}", session_id, ack.message);
            (Idle, vec![EmitUi])
        }
        (
            Ready {
                session_id, clip, ..
            },
            DispatchFailed { err, .. },
        ) => (
            Ready {
                session_id,
                clip,
                sending: false,
                last_error: Some(err.to_string()),
            },
            vec![EmitUi],
        ),
        (Ready { sending: false, .. }, Start) => new_session(),
        (state @ Ready { sending: true, .. }, Start) => reject(state, RecorderError::SendInFlight),
        (Ready { .. }, Cancel) => (Idle, vec![EmitUi]),

        // -----------------
        // Failed
        // -----------------
        (Failed { .. }, Cancel) => (Idle, vec![EmitUi]),
        (state @ Failed { .. }, CheckAccess) => (state, vec![ProbeAccess]),
        (Failed { .. }, AccessProbed { result: Ok(()) }) => {
            log::info!("Microphone available again");
            (Idle, vec![EmitUi])
        }
        (Failed { .. }, AccessProbed { result: Err(err) }) => {
            (Failed { error: err }, vec![EmitUi])
        }
        (Failed { error }, Start) => {
            let err = unavailable(&error);
            reject(Failed { error }, err)
        }

        // -----------------
        // Illegal commands
        // -----------------
        (state @ (Requesting { .. } | Recording { .. } | Processing { .. }), Start) => {
            reject(state, RecorderError::Busy)
        }
        (state, Stop) => reject(state, RecorderError::NotRecording),
        (state, Send) => reject(state, RecorderError::NothingToSend),

        // -----------------
        // Unhandled: no transition
        // -----------------
        (state, _) => (state, vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(effects: &[Effect], pred: impl Fn(&Effect) -> bool) -> bool {
        effects.iter().any(pred)
    }

    fn recording(id: Uuid) -> State {
        State::Recording {
            session_id: id,
            chunks: ChunkBuffer::new(),
            started_at: Instant::now(),
        }
    }

    fn ready(id: Uuid) -> State {
        State::Ready {
            session_id: id,
            clip: EncodedAudio::new(vec![0; 10], "audio/ogg"),
            sending: false,
            last_error: None,
        }
    }

    #[test]
    fn idle_start_transitions_to_requesting() {
        let (next, effects) = reduce(State::Idle, Event::Start);
        assert!(matches!(next, State::Requesting { .. }));
        assert!(has(&effects, |e| matches!(e, Effect::RequestAccess { .. })));
        assert!(has(&effects, |e| matches!(e, Effect::EmitUi)));
    }

    #[test]
    fn access_granted_transitions_to_recording() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(
            State::Requesting { session_id: id },
            Event::AccessGranted { id },
        );
        assert!(matches!(next, State::Recording { session_id, .. } if session_id == id));
        assert!(has(&effects, |e| matches!(e, Effect::StartRecordingTick { .. })));
    }

    #[test]
    fn access_denied_fails_and_blocks_start() {
        let id = Uuid::new_v4();
        let (next, _) = reduce(
            State::Requesting { session_id: id },
            Event::AccessDenied {
                id,
                err: CaptureError::PermissionDenied("user said no".into()),
            },
        );
        assert!(matches!(next, State::Failed { .. }));

        let (next, effects) = reduce(next, Event::Start);
        assert!(matches!(next, State::Failed { .. }));
        assert!(has(&effects, |e| matches!(
            e,
            Effect::Reject(RecorderError::MicrophoneUnavailable(_))
        )));
    }

    #[test]
    fn start_while_recording_is_rejected() {
        let id = Uuid::new_v4();
        for state in [
            State::Requesting { session_id: id },
            recording(id),
            State::Processing {
                session_id: id,
                chunks: ChunkBuffer::new(),
            },
        ] {
            let (next, effects) = reduce(state, Event::Start);
            assert_eq!(next.session_id(), Some(id));
            assert!(matches!(
                effects.as_slice(),
                [Effect::Reject(RecorderError::Busy)]
            ));
        }
    }

    #[test]
    fn chunks_accumulate_and_assemble_on_stop() {
        let id = Uuid::new_v4();
        let mut state = recording(id);
        for (len, fill) in [(100usize, 1u8), (200, 2)] {
            state = reduce(
                state,
                Event::ChunkReceived {
                    id,
                    chunk: CaptureChunk::new(vec![fill; len], "audio/L16;rate=8000;channels=1"),
                },
            )
            .0;
        }

        let (state, effects) = reduce(state, Event::Stop);
        assert!(matches!(state, State::Processing { .. }));
        assert!(has(&effects, |e| matches!(e, Effect::StopCapture { .. })));

        let (state, _) = reduce(state, Event::CaptureStopped { id });
        match state {
            State::Ready { clip, .. } => {
                assert_eq!(clip.len(), 300);
                assert_eq!(clip.bytes[0], 1);
                assert_eq!(clip.bytes[299], 2);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn capture_failure_while_recording_stops_the_device() {
        let id = Uuid::new_v4();
        let (state, effects) = reduce(
            recording(id),
            Event::CaptureFailed {
                id,
                err: CaptureError::NoInputDevice,
            },
        );
        assert!(matches!(state, State::Failed { .. }));
        assert!(has(&effects, |e| matches!(e, Effect::StopCapture { id: got } if *got == id)));

        // The stop completion for the dead session is ignored
        let (state, effects) = reduce(state, Event::CaptureStopped { id });
        assert!(matches!(state, State::Failed { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn empty_recording_fails() {
        let id = Uuid::new_v4();
        let (state, _) = reduce(recording(id), Event::Stop);
        let (state, _) = reduce(state, Event::CaptureStopped { id });
        assert!(matches!(
            state,
            State::Failed {
                error: CaptureError::EmptyRecording
            }
        ));
    }

    #[test]
    fn stale_event_is_ignored() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(
            State::Requesting { session_id: id },
            Event::AccessGranted { id: Uuid::new_v4() },
        );
        assert!(matches!(next, State::Requesting { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn dispatch_failure_keeps_clip_for_retry() {
        let id = Uuid::new_v4();
        let (state, effects) = reduce(ready(id), Event::Send);
        assert!(has(&effects, |e| matches!(e, Effect::Dispatch { .. })));
        assert!(matches!(state, State::Ready { sending: true, .. }));

        // A second send while in flight is refused
        let (state, effects) = reduce(state, Event::Send);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Reject(RecorderError::SendInFlight)]
        ));

        let (state, _) = reduce(
            state,
            Event::DispatchFailed {
                id,
                err: DispatchError::Network("offline".into()),
            },
        );
        match &state {
            State::Ready {
                clip,
                sending,
                last_error,
                ..
            } => {
                assert_eq!(clip.len(), 10);
                assert!(!sending);
                assert!(last_error.as_deref().unwrap().contains("offline"));
            }
            other => panic!("expected Ready, got {:?}", other),
        }

        // Retry is allowed
        let (_, effects) = reduce(state, Event::Send);
        assert!(has(&effects, |e| matches!(e, Effect::Dispatch { .. })));
    }

    #[test]
    fn dispatch_success_returns_to_idle() {
        let id = Uuid::new_v4();
        let (state, _) = reduce(ready(id), Event::Send);
        let (state, _) = reduce(
            state,
            Event::DispatchSucceeded {
                id,
                ack: Ack::default(),
            },
        );
        assert!(matches!(state, State::Idle));
    }

    #[test]
    fn start_from_ready_discards_clip_and_opens_new_session() {
        let old = Uuid::new_v4();
        let (state, effects) = reduce(ready(old), Event::Start);
        assert!(matches!(state, State::Requesting { session_id } if session_id != old));
        assert!(has(&effects, |e| matches!(e, Effect::RequestAccess { .. })));
    }

    // =========================================================================
    // Cancel semantics tests
    // =========================================================================

    #[test]
    fn cancel_during_requesting_stops_capture_and_returns_to_idle() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(State::Requesting { session_id: id }, Event::Cancel);
        assert!(matches!(next, State::Idle));
        assert!(has(&effects, |e| matches!(e, Effect::StopCapture { .. })));
    }

    #[test]
    fn cancel_during_recording_discards_chunks() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(recording(id), Event::Cancel);
        assert!(matches!(next, State::Idle));
        assert!(has(&effects, |e| matches!(e, Effect::StopCapture { .. })));
        assert!(!has(&effects, |e| matches!(e, Effect::Dispatch { .. })));
    }

    #[test]
    fn cancel_is_idempotent() {
        let (next, effects) = reduce(State::Idle, Event::Cancel);
        assert!(matches!(next, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn late_grant_after_cancel_is_dropped() {
        let id = Uuid::new_v4();
        let (state, _) = reduce(State::Requesting { session_id: id }, Event::Cancel);
        let (state, effects) = reduce(state, Event::AccessGranted { id });
        assert!(matches!(state, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn stale_dispatch_result_after_new_session_is_ignored() {
        let old = Uuid::new_v4();
        let (state, _) = reduce(ready(old), Event::Start);
        let (state, effects) = reduce(
            state,
            Event::DispatchSucceeded {
                id: old,
                ack: Ack::default(),
            },
        );
        assert!(matches!(state, State::Requesting { .. }));
        assert!(effects.is_empty());
    }

    // =========================================================================
    // Tick and access checks
    // =========================================================================

    #[test]
    fn tick_past_limit_auto_stops() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(
            recording(id),
            Event::RecordingTick {
                id,
                max_duration: Duration::ZERO,
            },
        );
        assert!(matches!(next, State::Processing { .. }));
        assert!(has(&effects, |e| matches!(e, Effect::StopCapture { .. })));
    }

    #[test]
    fn tick_under_limit_only_refreshes_ui() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(
            recording(id),
            Event::RecordingTick {
                id,
                max_duration: Duration::from_secs(120),
            },
        );
        assert!(matches!(next, State::Recording { .. }));
        assert!(matches!(effects.as_slice(), [Effect::EmitUi]));
    }

    #[test]
    fn access_probe_moves_between_idle_and_failed() {
        let (state, effects) = reduce(State::Idle, Event::CheckAccess);
        assert!(matches!(effects.as_slice(), [Effect::ProbeAccess]));

        let (state, _) = reduce(
            state,
            Event::AccessProbed {
                result: Err(CaptureError::NoInputDevice),
            },
        );
        assert!(matches!(state, State::Failed { .. }));

        let (state, _) = reduce(state, Event::AccessProbed { result: Ok(()) });
        assert!(matches!(state, State::Idle));
    }

    #[test]
    fn stop_and_send_outside_their_states_are_rejected() {
        let (_, effects) = reduce(State::Idle, Event::Stop);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Reject(RecorderError::NotRecording)]
        ));
        let (_, effects) = reduce(State::Idle, Event::Send);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Reject(RecorderError::NothingToSend)]
        ));
    }
}
