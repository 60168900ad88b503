//! Song editor session
//!
//! Couples one loaded source file, its [`ClipSelector`] and the waveform
//! canvas. Every range edit re-renders exactly once and refreshes both labels
//! before returning. Loads are asynchronous; a load that has been superseded
//! by a newer one (or by [`SongEditor::close`]) is dropped without touching
//! the session.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clip::{ClipLabels, ClipRange, ClipSelector};
use crate::dispatch::{DispatchError, SongFile, SongRecord, SongStore};
use crate::validation::{require_name, ValidationError};
use crate::waveform::{
    decode_cancellable, render, Canvas, DecodeError, DecodedAudio, WaveformPlot, WaveformStyle,
};

/// Why a save did not happen.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Where the bytes being loaded came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// A new file chosen by the user; uploaded on save
    Upload,
    /// The stored audio of the song being edited; display only
    Stored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOutcome {
    Loaded { duration: f64 },
    /// A newer load or a close happened first; nothing was changed
    Superseded,
}

/// An in-flight decode started by [`SongEditor::begin_load`].
pub struct DecodeTicket {
    generation: u64,
    kind: LoadKind,
    token: CancellationToken,
    file: SongFile,
    handle: JoinHandle<Result<DecodedAudio, DecodeError>>,
}

impl DecodeTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the decode to finish.
    pub async fn resolve(self) -> ResolvedLoad {
        let result = match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(DecodeError::Cancelled),
            Err(e) => Err(DecodeError::Malformed(format!("decode task failed: {}", e))),
        };
        ResolvedLoad {
            generation: self.generation,
            kind: self.kind,
            file: self.file,
            result,
        }
    }
}

/// A finished decode, waiting to be applied with [`SongEditor::apply`].
pub struct ResolvedLoad {
    generation: u64,
    kind: LoadKind,
    file: SongFile,
    result: Result<DecodedAudio, DecodeError>,
}

/// One open song form.
pub struct SongEditor<C: Canvas> {
    canvas: C,
    style: WaveformStyle,
    audio: Option<Arc<DecodedAudio>>,
    upload: Option<SongFile>,
    selector: ClipSelector,
    labels: ClipLabels,
    plot: Option<WaveformPlot>,
    renders: usize,
    name: String,
    existing: Option<SongRecord>,
    stored_clip: Option<ClipRange>,
    generation: u64,
    inflight: Option<CancellationToken>,
}

impl<C: Canvas> SongEditor<C> {
    pub fn new(canvas: C) -> Self {
        Self::with_style(canvas, WaveformStyle::default())
    }

    pub fn with_style(canvas: C, style: WaveformStyle) -> Self {
        let selector = ClipSelector::empty();
        Self {
            canvas,
            style,
            audio: None,
            upload: None,
            labels: selector.labels(),
            selector,
            plot: None,
            renders: 0,
            name: String::new(),
            existing: None,
            stored_clip: None,
            generation: 0,
            inflight: None,
        }
    }

    /// Start editing a stored song. Its audio still has to be loaded with
    /// [`LoadKind::Stored`] before the clip can be changed; the stored clip
    /// bounds are restored once it is.
    pub fn open_existing(&mut self, record: SongRecord) {
        self.close();
        self.name = record.name.clone();
        self.stored_clip = Some(ClipRange {
            start: record.clip_start,
            end: record.clip_end,
        });
        self.existing = Some(record);
    }

    /// Start decoding `file` off the async runtime. Any earlier load still in
    /// flight is cancelled and will resolve as superseded.
    pub fn begin_load(&mut self, file: SongFile, kind: LoadKind) -> DecodeTicket {
        if let Some(previous) = self.inflight.take() {
            previous.cancel();
        }
        self.generation += 1;

        let token = CancellationToken::new();
        self.inflight = Some(token.clone());

        let bytes = file.bytes.clone();
        let hint = file.extension();
        let decode_token = token.clone();
        log::info!(
            "Decoding {} ({} bytes, load {})",
            file.filename,
            bytes.len(),
            self.generation
        );
        let handle = tokio::task::spawn_blocking(move || {
            decode_cancellable(bytes, hint.as_deref(), &decode_token)
        });

        DecodeTicket {
            generation: self.generation,
            kind,
            token,
            file,
            handle,
        }
    }

    /// Apply a finished decode. Superseded results change nothing; a failed
    /// decode leaves the previous audio and range in place.
    pub fn apply(&mut self, resolved: ResolvedLoad) -> Result<LoadOutcome, DecodeError> {
        if resolved.generation != self.generation {
            log::debug!(
                "Dropping stale decode (load {}, current {})",
                resolved.generation,
                self.generation
            );
            return Ok(LoadOutcome::Superseded);
        }
        self.inflight = None;

        let decoded = match resolved.result {
            Ok(decoded) => decoded,
            Err(DecodeError::Cancelled) => return Ok(LoadOutcome::Superseded),
            Err(e) => {
                log::warn!("Failed to decode {}: {}", resolved.file.filename, e);
                return Err(e);
            }
        };

        let duration = decoded.duration_secs();
        log::info!(
            "Loaded {}: {:.2}s, {} samples at {} Hz",
            resolved.file.filename,
            duration,
            decoded.sample_count(),
            decoded.sample_rate()
        );

        self.audio = Some(Arc::new(decoded));
        self.selector = ClipSelector::new(duration);
        match resolved.kind {
            LoadKind::Upload => self.upload = Some(resolved.file),
            LoadKind::Stored => {
                if let Some(stored) = self.stored_clip.take() {
                    self.selector.select(stored.start, stored.end);
                }
            }
        }
        self.redraw();

        Ok(LoadOutcome::Loaded { duration })
    }

    /// Decode and apply in one step.
    pub async fn load(
        &mut self,
        file: SongFile,
        kind: LoadKind,
    ) -> Result<LoadOutcome, DecodeError> {
        let ticket = self.begin_load(file, kind);
        let resolved = ticket.resolve().await;
        self.apply(resolved)
    }

    pub fn set_clip_start(&mut self, value: f64) -> Result<ClipRange, ValidationError> {
        self.require_audio()?;
        let range = self.selector.set_start(value);
        self.redraw();
        Ok(range)
    }

    pub fn set_clip_end(&mut self, value: f64) -> Result<ClipRange, ValidationError> {
        self.require_audio()?;
        let range = self.selector.set_end(value);
        self.redraw();
        Ok(range)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Validate and hand the song to `store`. Nothing reaches the store when
    /// validation fails; on a store failure the form keeps its state.
    pub async fn save(&mut self, store: &dyn SongStore) -> Result<SongRecord, SaveError> {
        let name = require_name(&self.name)?;
        if self.existing.is_none() && self.upload.is_none() {
            return Err(ValidationError::MissingAudio.into());
        }
        let range = self.selector.commit()?;

        let record = SongRecord {
            id: self.existing.as_ref().and_then(|r| r.id.clone()),
            name,
            filename: self.existing.as_ref().and_then(|r| r.filename.clone()),
            clip_start: range.start,
            clip_end: range.end,
        };

        let saved = store.save(record, self.upload.clone()).await?;
        log::info!(
            "Saved song {:?} [{:.2}, {:.2}]",
            saved.name,
            saved.clip_start,
            saved.clip_end
        );
        self.existing = Some(saved.clone());
        self.upload = None;
        Ok(saved)
    }

    /// Tear the session down. In-flight loads resolve as superseded. Safe to
    /// call repeatedly.
    pub fn close(&mut self) {
        if let Some(token) = self.inflight.take() {
            token.cancel();
        }
        self.generation += 1;
        self.audio = None;
        self.upload = None;
        self.selector = ClipSelector::empty();
        self.labels = self.selector.labels();
        self.plot = None;
        self.name.clear();
        self.existing = None;
        self.stored_clip = None;
        self.canvas.clear(self.style.background);
    }

    fn require_audio(&self) -> Result<(), ValidationError> {
        if self.audio.is_none() {
            return Err(ValidationError::MissingSelection);
        }
        Ok(())
    }

    fn redraw(&mut self) {
        self.labels = self.selector.labels();
        if let Some(audio) = &self.audio {
            let range = self.selector.range();
            self.plot = Some(render(audio, &range, &mut self.canvas, &self.style));
            self.renders += 1;
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn plot(&self) -> Option<&WaveformPlot> {
        self.plot.as_ref()
    }

    /// Number of renders since the editor was created.
    pub fn render_count(&self) -> usize {
        self.renders
    }

    pub fn range(&self) -> ClipRange {
        self.selector.range()
    }

    pub fn labels(&self) -> &ClipLabels {
        &self.labels
    }

    pub fn audio(&self) -> Option<&DecodedAudio> {
        self.audio.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn existing(&self) -> Option<&SongRecord> {
        self.existing.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.inflight.is_some()
    }
}

impl<C: Canvas> Drop for SongEditor<C> {
    fn drop(&mut self) {
        if let Some(token) = self.inflight.take() {
            token.cancel();
        }
    }
}
