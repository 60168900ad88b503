//! Scheduled announcement events
//!
//! An event plays one library song at a time of day on a given day. Drafts
//! are validated locally before anything is sent to the [`EventStore`].

use chrono::NaiveTime;

use crate::dispatch::{EventRecord, EventStore};
use crate::editor::SaveError;
use crate::validation::{require_name, ValidationError};

/// Event form contents as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    /// Set when editing an existing event
    pub id: Option<String>,
    pub name: String,
    pub time: String,
    pub day: String,
    pub song_id: String,
}

impl EventDraft {
    pub fn edit(record: &EventRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            time: record.time.clone(),
            day: record.day.clone(),
            song_id: record.song_id.clone(),
        }
    }

    /// Check every field and produce the record to store. Time is normalised
    /// to zero-padded `HH:MM`.
    pub fn validate(&self) -> Result<EventRecord, ValidationError> {
        let name = require_name(&self.name)?;
        let time = parse_time(&self.time)?;

        let day = self.day.trim();
        if day.is_empty() {
            return Err(ValidationError::MissingDay);
        }
        let song_id = self.song_id.trim();
        if song_id.is_empty() {
            return Err(ValidationError::MissingSong);
        }

        Ok(EventRecord {
            id: self.id.clone(),
            name,
            time: time.format("%H:%M").to_string(),
            day: day.to_string(),
            song_id: song_id.to_string(),
        })
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ValidationError::InvalidTime(value.to_string()))
}

/// Validate `draft` and save it. The store is not called when validation fails.
pub async fn save_event(
    store: &dyn EventStore,
    draft: &EventDraft,
) -> Result<EventRecord, SaveError> {
    let record = draft.validate()?;
    let saved = store.save(record).await?;
    log::info!(
        "Saved event {:?} ({} {}) -> song {}",
        saved.name,
        saved.day,
        saved.time,
        saved.song_id
    );
    Ok(saved)
}
