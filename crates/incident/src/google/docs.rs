//! Incident notes document in Google Docs.
//!
//! The file is created through Drive, then filled through a Docs
//! `batchUpdate`. A freshly created document is not always writable right
//! away, so the content call is retried with exponential backoff. The handle
//! is returned even when the content never lands.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{GoogleClient, NotesProvider, NotesRequest};
use crate::config::GoogleConfig;
use crate::error::{check_status, ClientError};
use crate::http::endpoint;
use crate::incident::DocumentHandle;

const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";

/// Public URL prefix of a Google document.
const DOCUMENT_URL: &str = "https://docs.google.com/document/d";

/// Docs client creating notes documents.
#[derive(Debug, Clone)]
pub struct GoogleDocs {
    google: Arc<GoogleClient>,
    settle_attempts: u32,
    settle_backoff: Duration,
}

impl GoogleDocs {
    #[must_use]
    pub fn new(google: Arc<GoogleClient>, config: &GoogleConfig) -> Self {
        Self {
            google,
            settle_attempts: config.settle_attempts.max(1),
            settle_backoff: config.settle_backoff,
        }
    }

    async fn create_file(&self, request: &NotesRequest) -> Result<String, ClientError> {
        let mut metadata = json!({
            "mimeType": DOCUMENT_MIME_TYPE,
            "name": request.file_name,
        });
        if let Some(folder) = &request.folder {
            metadata["parents"] = json!([folder]);
        }

        let url = endpoint(&self.google.endpoints().drive_url, &["files"])?;
        let response = self
            .google
            .request(Method::POST, url)
            .await?
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;

        let file: DriveFile = check_status("google-drive", response).await?.json().await?;
        Ok(file.id)
    }

    async fn write_skeleton(&self, document_id: &str, requests: &[Value]) -> Result<(), ClientError> {
        let url = endpoint(
            &self.google.endpoints().docs_url,
            &["documents", &format!("{document_id}:batchUpdate")],
        )?;
        let response = self
            .google
            .request(Method::POST, url)
            .await?
            .json(&json!({ "requests": requests }))
            .send()
            .await?;

        check_status("google-docs", response).await?;
        Ok(())
    }

    /// Write the skeleton, retrying while the new document settles.
    async fn write_skeleton_with_retry(
        &self,
        document_id: &str,
        requests: &[Value],
    ) -> Result<(), ClientError> {
        let mut backoff = self.settle_backoff;
        let mut attempt = 1;

        loop {
            match self.write_skeleton(document_id, requests).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.settle_attempts && is_not_ready(&e) => {
                    debug!(
                        document_id = %document_id,
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Document not ready, retrying"
                    );
                    sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl NotesProvider for GoogleDocs {
    async fn create_notes_document(
        &self,
        request: &NotesRequest,
    ) -> Result<DocumentHandle, ClientError> {
        let id = self.create_file(request).await?;
        debug!(document_id = %id, "Notes document created");

        let requests = skeleton_requests(&request.title, &request.author, request.started_at);
        if let Err(e) = self.write_skeleton_with_retry(&id, &requests).await {
            warn!(document_id = %id, error = %e, "Failed to write notes skeleton");
        }

        Ok(DocumentHandle {
            url: format!("{DOCUMENT_URL}/{id}"),
            id,
        })
    }
}

/// Statuses a just-created document answers with before it accepts edits.
fn is_not_ready(error: &ClientError) -> bool {
    matches!(error.status(), Some(404 | 409 | 429 | 500..=599))
}

/// Paragraph style applied to an inserted span.
enum Style {
    Paragraph(&'static str),
    Italic,
}

/// `batchUpdate` requests that lay out the notes skeleton.
///
/// Spans are inserted back to back from index 1; indices count UTF-16 code
/// units.
#[must_use]
pub fn skeleton_requests(title: &str, author: &str, started_at: DateTime<Utc>) -> Vec<Value> {
    let first_entry = format!(
        "{}: Incident started by {author}\n\n",
        started_at.format("%Y-%m-%d %H:%M %:z")
    );
    let spans = [
        (format!("{title}\n"), Some(Style::Paragraph("TITLE"))),
        ("Quick description of the problem\n".to_string(), Some(Style::Paragraph("HEADING_1"))),
        ("\n".to_string(), None),
        ("Timeline\n".to_string(), Some(Style::Paragraph("HEADING_1"))),
        ("Times in UTC\n\n".to_string(), Some(Style::Italic)),
        (first_entry, None),
        ("[Copy & paste data]\n".to_string(), Some(Style::Paragraph("HEADING_1"))),
        ("\n\n".to_string(), None),
    ];

    let mut requests = Vec::with_capacity(spans.len() * 2);
    let mut index = 1;

    for (text, style) in spans {
        let end = index + text.encode_utf16().count();
        let range = json!({ "startIndex": index, "endIndex": end });

        requests.push(json!({
            "insertText": { "text": text, "location": { "index": index } }
        }));

        match style {
            Some(Style::Paragraph(named)) => requests.push(json!({
                "updateParagraphStyle": {
                    "paragraphStyle": { "namedStyleType": named },
                    "fields": "namedStyleType",
                    "range": range,
                }
            })),
            Some(Style::Italic) => requests.push(json!({
                "updateTextStyle": {
                    "textStyle": { "italic": true },
                    "fields": "italic",
                    "range": range,
                }
            })),
            None => {}
        }

        index = end;
    }

    requests
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}
