//! Terminal front-ends for the binary
//!
//! Each function drives one library session (recorder, editor, probe) from
//! the command line and prints what a UI would show.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::audio::{probe_access, CpalGateway};
use crate::dispatch::{HttpClient, SongFile};
use crate::editor::{LoadKind, SongEditor};
use crate::settings::{self, AppSettings};
use crate::waveform::PixmapCanvas;
use crate::{Recorder, UiState};

pub type ConsoleResult = Result<(), Box<dyn Error>>;

fn http_client(settings: &AppSettings) -> Result<HttpClient, Box<dyn Error>> {
    Ok(HttpClient::new(
        &settings.server_url,
        settings.request_timeout(),
    )?)
}

async fn read_song_file(path: &Path) -> Result<SongFile, Box<dyn Error>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("song")
        .to_string();
    Ok(SongFile::new(bytes, filename))
}

/// Interactive panic recorder. Enter toggles recording, `s` sends,
/// `c` cancels, `q` quits.
pub async fn record(settings: &AppSettings) -> ConsoleResult {
    let client = http_client(settings)?;
    log::info!("Panic messages go to {}", client.base_url());

    let recorder = Recorder::spawn(CpalGateway::new(), Arc::new(client), settings);

    let mut ui = recorder.ui();
    let printer = tokio::spawn(async move {
        let mut last_status: Option<String> = None;
        loop {
            let line = ui.borrow_and_update().status_line();
            if last_status.as_deref() != Some(line.as_str()) {
                println!("  {}", line);
                last_status = Some(line);
            }
            if ui.changed().await.is_err() {
                break;
            }
        }
    });

    println!("[Enter] start/stop  [s] send  [c] cancel  [q] quit");
    let _ = recorder.check_access().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let result = match line.trim() {
            "" => match recorder.snapshot() {
                UiState::Recording { .. } => recorder.stop().await,
                _ => recorder.start().await,
            },
            "s" => recorder.send().await,
            "c" => recorder.cancel().await,
            "q" => break,
            other => {
                println!("  Unknown command {:?}", other);
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("  {}", e);
        }
    }

    recorder.shutdown().await;
    let _ = printer.await;
    Ok(())
}

/// Decode `file`, apply the optional clip bounds and write a PNG preview.
pub async fn preview(
    settings: &AppSettings,
    file: &Path,
    start: Option<f64>,
    end: Option<f64>,
    out: &Path,
) -> ConsoleResult {
    let canvas = PixmapCanvas::new(settings.waveform_width, settings.waveform_height)
        .ok_or("waveform width and height must be non-zero")?;
    let mut editor = SongEditor::new(canvas);

    editor.load(read_song_file(file).await?, LoadKind::Upload).await?;
    if let Some(start) = start {
        editor.set_clip_start(start)?;
    }
    if let Some(end) = end {
        editor.set_clip_end(end)?;
    }

    editor.canvas().save_png(out)?;

    let duration = editor.audio().map(|a| a.duration_secs()).unwrap_or(0.0);
    println!("Duration: {:.2} seconds", duration);
    println!("Clip start: {}", editor.labels().start);
    println!("Clip end: {}", editor.labels().end);
    println!("Preview written to {}", out.display());
    Ok(())
}

/// Create a new song on the server from a local file.
pub async fn upload_song(
    settings: &AppSettings,
    file: &Path,
    name: &str,
    start: f64,
    end: f64,
) -> ConsoleResult {
    let client = http_client(settings)?;
    let canvas = PixmapCanvas::new(settings.waveform_width, settings.waveform_height)
        .ok_or("waveform width and height must be non-zero")?;
    let mut editor = SongEditor::new(canvas);

    editor.load(read_song_file(file).await?, LoadKind::Upload).await?;
    editor.set_name(name);
    editor.set_clip_start(start)?;
    editor.set_clip_end(end)?;

    let saved = editor.save(&client).await?;
    println!(
        "Saved {:?} as {} ({} to {})",
        saved.name,
        saved.id.as_deref().unwrap_or("<no id>"),
        editor.labels().start,
        editor.labels().end
    );
    editor.close();
    Ok(())
}

/// Report whether the default microphone can be opened.
pub async fn check_mic() -> ConsoleResult {
    let result = tokio::task::spawn_blocking(|| probe_access(&CpalGateway::new())).await?;
    match result {
        Ok(()) => {
            println!("Microphone available");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Show the settings file, updating it first when values are given.
///
/// Works on the file contents only, so an environment override is never
/// written back.
pub fn configure(server_url: Option<String>, max_recording_secs: Option<u64>) -> ConsoleResult {
    let path = settings::settings_path()?;
    let mut current = settings::load_settings_from(&path);
    let before = current.clone();

    if let Some(url) = server_url {
        current.server_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(secs) = max_recording_secs {
        current.max_recording_secs = secs;
    }

    if current != before {
        let saved_to = settings::save_settings(&current)?;
        log::info!("Settings saved to {:?}", saved_to);
    }

    println!("{}", serde_json::to_string_pretty(&current)?);
    println!("({})", path.display());
    Ok(())
}
