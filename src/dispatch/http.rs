//! HTTP client for the announcement server
//!
//! Implements the panic transport and both stores against the server's JSON
//! and multipart endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;

use super::records::{EventRecord, Library, SongFile, SongRecord};
use super::{Ack, DispatchError, EventStore, PanicPayload, PanicTransport, SongStore};

/// Placeholder file name the server treats as "keep the current audio".
const NO_CHANGE_FILENAME: &str = "no_change.txt";

/// Server error body, e.g. `{"error": "No file part in the request"}`
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Client for one server base URL. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: Client,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch both songs and events.
    pub async fn library(&self) -> Result<Library, DispatchError> {
        let response = self
            .client
            .get(self.url("/api/data"))
            .send()
            .await
            .map_err(network_error)?;
        parse_json(response).await
    }
}

fn network_error(e: reqwest::Error) -> DispatchError {
    DispatchError::Network(e.to_string())
}

/// Turn a response into `T`, or into `DispatchError::Rejected` on non-2xx.
async fn parse_json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, DispatchError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| DispatchError::Decode(e.to_string()));
    }

    let error_text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
        Ok(body) => body.error,
        Err(_) => error_text,
    };

    log::error!("Server error ({}): {}", status.as_u16(), message);
    Err(DispatchError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn file_part(bytes: Vec<u8>, filename: String, mime: &str) -> Result<Part, DispatchError> {
    Part::bytes(bytes)
        .file_name(filename)
        .mime_str(mime)
        .map_err(|e| DispatchError::Encode(e.to_string()))
}

#[async_trait]
impl PanicTransport for HttpClient {
    async fn send(&self, payload: PanicPayload) -> Result<Ack, DispatchError> {
        let form = Form::new().part(
            "file",
            file_part(
                payload.audio,
                payload.suggested_filename,
                &payload.mime_type,
            )?,
        );

        let response = self
            .client
            .post(self.url("/api/panic"))
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;
        parse_json(response).await
    }
}

#[async_trait]
impl SongStore for HttpClient {
    async fn list(&self) -> Result<Vec<SongRecord>, DispatchError> {
        Ok(self.library().await?.songs)
    }

    async fn save(
        &self,
        record: SongRecord,
        file: Option<SongFile>,
    ) -> Result<SongRecord, DispatchError> {
        let metadata =
            serde_json::to_string(&record).map_err(|e| DispatchError::Encode(e.to_string()))?;

        let part = match file {
            Some(file) => {
                let mime = file.mime_type();
                file_part(file.bytes, file.filename, mime)?
            }
            None => file_part(
                Vec::new(),
                NO_CHANGE_FILENAME.to_string(),
                "application/octet-stream",
            )?,
        };

        let form = Form::new().text("metadata", metadata).part("file", part);

        let response = self
            .client
            .post(self.url("/api/songs"))
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;
        let ack: Ack = parse_json(response).await?;

        log::info!("Song {:?} saved: {}", record.name, ack.message);
        Ok(SongRecord {
            id: ack.id.or(record.id),
            ..record
        })
    }

    async fn delete(&self, id: &str) -> Result<(), DispatchError> {
        log::warn!("Refusing to delete song {}: no delete endpoint", id);
        Err(DispatchError::Unsupported("deleting songs"))
    }
}

#[async_trait]
impl EventStore for HttpClient {
    async fn list(&self) -> Result<Vec<EventRecord>, DispatchError> {
        Ok(self.library().await?.events)
    }

    async fn save(&self, record: EventRecord) -> Result<EventRecord, DispatchError> {
        let request = if record.id.is_some() {
            self.client.put(self.url("/api/event"))
        } else {
            self.client.post(self.url("/api/event"))
        };

        let response = request
            .json(&record)
            .send()
            .await
            .map_err(network_error)?;
        let ack: Ack = parse_json(response).await?;

        log::info!("Event {:?} saved: {}", record.name, ack.message);
        Ok(EventRecord {
            id: ack.id.or(record.id),
            ..record
        })
    }

    async fn delete(&self, id: &str) -> Result<(), DispatchError> {
        log::warn!("Refusing to delete event {}: no delete endpoint", id);
        Err(DispatchError::Unsupported("deleting events"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpClient::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/api/panic"), "http://localhost:5000/api/panic");
    }

    #[test]
    fn error_body_is_parsed() {
        let body: ErrorResponse =
            serde_json::from_str(r#"{"error": "No file part in the request"}"#).unwrap();
        assert_eq!(body.error, "No file part in the request");
    }

    #[tokio::test]
    async fn deletes_fail_without_contacting_the_server() {
        // Nothing listens here; a request would come back as Network
        let client = HttpClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();

        let song = SongStore::delete(&client, "s1").await.unwrap_err();
        assert_eq!(song, DispatchError::Unsupported("deleting songs"));
        assert_eq!(song.to_string(), "Server does not support deleting songs");

        let event = EventStore::delete(&client, "e1").await.unwrap_err();
        assert_eq!(event, DispatchError::Unsupported("deleting events"));
    }

    #[test]
    fn rejected_error_display_includes_status() {
        let err = DispatchError::Rejected {
            status: 400,
            message: "No file part".to_string(),
        };
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("No file part"));
    }
}
