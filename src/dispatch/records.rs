//! Song and event records as stored by the server.

use serde::{Deserialize, Serialize};

use super::mime_for_extension;

/// A song in the clip library. The core only ever produces `name` and the
/// clip bounds; `id` and `filename` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub clip_start: f64,
    pub clip_end: f64,
}

impl SongRecord {
    pub fn new(name: impl Into<String>, clip_start: f64, clip_end: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            filename: None,
            clip_start,
            clip_end,
        }
    }
}

/// A scheduled trigger: play a song at `time` on `day`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// `HH:MM`
    pub time: String,
    pub day: String,
    pub song_id: String,
}

/// Everything the server knows: both flat lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub songs: Vec<SongRecord>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

impl Library {
    /// Resolve the song an event points at.
    pub fn song_for(&self, event: &EventRecord) -> Option<&SongRecord> {
        self.songs
            .iter()
            .find(|s| s.id.as_deref() == Some(event.song_id.as_str()))
    }
}

/// A source audio file chosen by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct SongFile {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl SongFile {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
        }
    }

    /// Lower-cased file extension, used as a decoder hint.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Content type for uploading, guessed from the extension.
    pub fn mime_type(&self) -> &'static str {
        self.extension()
            .map_or("application/octet-stream", |ext| mime_for_extension(&ext))
    }
}

impl std::fmt::Debug for SongFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongFile")
            .field("len", &self.bytes.len())
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type())
            .finish()
    }
}
