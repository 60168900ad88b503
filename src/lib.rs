pub mod audio;
pub mod clip;
pub mod console;
pub mod dispatch;
pub mod editor;
pub mod effects;
pub mod schedule;
pub mod settings;
pub mod state_machine;
pub mod validation;
pub mod waveform;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use audio::CaptureGateway;
use dispatch::{PanicDispatcher, PanicTransport};
use effects::{CaptureEffectRunner, EffectRunner};
use settings::AppSettings;
use state_machine::{reduce, Effect, Event, RecorderError, State};

/// UI state published to whoever renders the recorder.
/// Uses tagged union format: { "status": "idle" } or { "status": "recording", "elapsedSecs": 5, ... }
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    Idle,
    Requesting,
    Recording {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
        #[serde(rename = "bytesCaptured")]
        bytes_captured: usize,
    },
    Processing,
    Ready {
        #[serde(rename = "clipBytes")]
        clip_bytes: usize,
        #[serde(rename = "mimeType")]
        mime_type: String,
        sending: bool,
        #[serde(rename = "lastError")]
        last_error: Option<String>,
    },
    Failed {
        message: String,
        #[serde(rename = "microphoneBlocked")]
        microphone_blocked: bool,
    },
}

impl UiState {
    /// One-line status shown next to the panic button.
    pub fn status_line(&self) -> String {
        match self {
            UiState::Idle => "Ready to record".to_string(),
            UiState::Requesting => "Waiting for microphone access...".to_string(),
            UiState::Recording { elapsed_secs, .. } => {
                format!("Recording... {}s", elapsed_secs)
            }
            UiState::Processing => "Finishing recording...".to_string(),
            UiState::Ready {
                sending: true, ..
            } => "Sending panic message...".to_string(),
            UiState::Ready {
                last_error: Some(err),
                ..
            } => format!("Send failed: {} (press send to retry)", err),
            UiState::Ready { clip_bytes, .. } => {
                format!("Recording complete ({} bytes). Ready to send.", clip_bytes)
            }
            UiState::Failed { message, .. } => message.clone(),
        }
    }

    pub fn can_start(&self) -> bool {
        matches!(
            self,
            UiState::Idle | UiState::Ready { sending: false, .. }
        )
    }

    pub fn can_send(&self) -> bool {
        matches!(self, UiState::Ready { sending: false, .. })
    }
}

/// Convert internal State to UiState
fn state_to_ui(state: &State) -> UiState {
    match state {
        State::Idle => UiState::Idle,
        State::Requesting { .. } => UiState::Requesting,
        State::Recording {
            chunks, started_at, ..
        } => UiState::Recording {
            elapsed_secs: started_at.elapsed().as_secs(),
            bytes_captured: chunks.total_bytes(),
        },
        State::Processing { .. } => UiState::Processing,
        State::Ready {
            clip,
            sending,
            last_error,
            ..
        } => UiState::Ready {
            clip_bytes: clip.len(),
            mime_type: clip.mime.clone(),
            sending: *sending,
            last_error: last_error.clone(),
        },
        State::Failed { error } => UiState::Failed {
            message: error.to_string(),
            microphone_blocked: error.blocks_microphone(),
        },
    }
}

fn emit_ui_state(ui: &watch::Sender<UiState>, state: &State) {
    let ui_state = state_to_ui(state);
    log::debug!("Emitting UI state: {:?}", serde_json::to_string(&ui_state));
    ui.send_replace(ui_state);
}

/// A user command plus the channel its verdict goes back on.
struct Command {
    event: Event,
    reply: oneshot::Sender<Result<(), RecorderError>>,
}

/// Run the main state loop until every [`Recorder`] handle is gone.
async fn run_state_loop(
    mut commands: mpsc::Receiver<Command>,
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    ui: watch::Sender<UiState>,
) {
    let mut state = State::default();

    emit_ui_state(&ui, &state);
    log::info!("State loop started");

    loop {
        let (event, reply) = tokio::select! {
            command = commands.recv() => match command {
                Some(Command { event, reply }) => (event, Some(reply)),
                None => {
                    log::info!("Recorder closed, shutting down state loop");
                    break;
                }
            },
            Some(event) = rx.recv() => (event, None),
        };

        log::debug!("Received event: {:?}", event);

        let old_discriminant = std::mem::discriminant(&state);
        let (next, effects) = reduce(state, event);
        let new_discriminant = std::mem::discriminant(&next);

        // Log state transitions
        if old_discriminant != new_discriminant {
            log::info!("State transition: {:?}", next);
        }

        state = next;

        let mut verdict = Ok(());
        for eff in effects {
            match eff {
                Effect::EmitUi => emit_ui_state(&ui, &state),
                Effect::Reject(err) => {
                    log::warn!("Command rejected: {}", err);
                    verdict = Err(err);
                }
                other => effect_runner.spawn(other, tx.clone()),
            }
        }

        if let Some(reply) = reply {
            let _ = reply.send(verdict);
        }
    }

    effect_runner.shutdown();
    log::info!("State loop ended");
}

/// Handle to one panic recorder session.
///
/// Commands are applied in order by a single state loop task. Dropping every
/// handle (or calling [`Recorder::shutdown`]) releases the microphone.
pub struct Recorder {
    commands: mpsc::Sender<Command>,
    ui: watch::Receiver<UiState>,
    task: JoinHandle<()>,
}

impl Recorder {
    /// Start a recorder over `gateway`, dispatching through `transport`.
    pub fn spawn<G: CaptureGateway>(
        gateway: G,
        transport: Arc<dyn PanicTransport>,
        settings: &AppSettings,
    ) -> Self {
        let runner = CaptureEffectRunner::new(
            gateway,
            PanicDispatcher::new(transport),
            settings.max_recording(),
        );
        Self::with_runner(runner)
    }

    pub fn with_runner(effect_runner: Arc<dyn EffectRunner>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (tx, rx) = mpsc::channel::<Event>(32);
        let (ui_tx, ui_rx) = watch::channel(UiState::Idle);

        let task = tokio::spawn(run_state_loop(command_rx, rx, tx, effect_runner, ui_tx));

        Self {
            commands: command_tx,
            ui: ui_rx,
            task,
        }
    }

    async fn command(&self, event: Event) -> Result<(), RecorderError> {
        let (reply, verdict) = oneshot::channel();
        self.commands
            .send(Command { event, reply })
            .await
            .map_err(|_| RecorderError::Closed)?;
        verdict.await.map_err(|_| RecorderError::Closed)?
    }

    pub async fn start(&self) -> Result<(), RecorderError> {
        self.command(Event::Start).await
    }

    pub async fn stop(&self) -> Result<(), RecorderError> {
        self.command(Event::Stop).await
    }

    /// Dispatch the finished clip. Returns once the send is under way; watch
    /// [`Recorder::ui`] for the outcome.
    pub async fn send(&self) -> Result<(), RecorderError> {
        self.command(Event::Send).await
    }

    pub async fn cancel(&self) -> Result<(), RecorderError> {
        self.command(Event::Cancel).await
    }

    pub async fn check_access(&self) -> Result<(), RecorderError> {
        self.command(Event::CheckAccess).await
    }

    pub fn ui(&self) -> watch::Receiver<UiState> {
        self.ui.clone()
    }

    pub fn snapshot(&self) -> UiState {
        self.ui.borrow().clone()
    }

    /// Stop the state loop and release any device still held.
    pub async fn shutdown(self) {
        let Recorder { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            log::error!("State loop task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_state_serializes_with_status_tag() {
        let json = serde_json::to_value(UiState::Recording {
            elapsed_secs: 5,
            bytes_captured: 300,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "recording", "elapsedSecs": 5, "bytesCaptured": 300})
        );
        assert_eq!(
            serde_json::to_value(UiState::Idle).unwrap(),
            serde_json::json!({"status": "idle"})
        );
    }

    #[test]
    fn send_failure_is_shown_with_retry_hint() {
        let ui = UiState::Ready {
            clip_bytes: 10,
            mime_type: "audio/wav".into(),
            sending: false,
            last_error: Some("Network error: offline".into()),
        };
        assert!(ui.status_line().contains("retry"));
        assert!(ui.can_send());
        assert!(ui.can_start());
    }

    #[test]
    fn failed_state_blocks_start() {
        let ui = state_to_ui(&State::Failed {
            error: audio::CaptureError::PermissionDenied("denied".into()),
        });
        assert!(!ui.can_start());
        assert!(matches!(
            ui,
            UiState::Failed {
                microphone_blocked: true,
                ..
            }
        ));
    }
}
