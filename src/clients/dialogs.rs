//! Dialog service client
//!
//! Every write is guarded by the dialog's revision (`If-Match`) and returns
//! the next revision from the `ETag` header.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ETAG, IF_MATCH};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use super::{http_client, read_json, transport_error, trim_base};
use crate::model::Dialog;
use crate::types::{Result, SyncError};

const SERVICE: &str = "dialogs";

/// Per-write flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Suppress end-user notifications for this write
    pub silent: bool,
}

impl WriteOptions {
    pub fn silent(silent: bool) -> Self {
        Self { silent }
    }
}

#[async_trait]
pub trait DialogService: Send + Sync {
    /// Current dialog with `revision` set, `None` when it does not exist
    async fn get(&self, id: Uuid) -> Result<Option<Dialog>>;

    /// Returns the new revision
    async fn create(&self, dialog: &Dialog, opts: WriteOptions) -> Result<String>;

    /// Returns the new revision
    async fn update(&self, dialog: &Dialog, revision: &str, opts: WriteOptions) -> Result<String>;

    /// Soft delete
    async fn delete(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<()>;

    async fn purge(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<()>;

    /// Undo a soft delete. Returns the new revision
    async fn restore(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<String>;

    /// Move the timestamp of a `FormSaved` activity. Returns the new revision
    async fn update_form_saved_time(
        &self,
        id: Uuid,
        activity_id: Uuid,
        created_at: DateTime<Utc>,
        revision: &str,
        opts: WriteOptions,
    ) -> Result<String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormSavedTime {
    created_at: DateTime<Utc>,
}

/// reqwest implementation
pub struct HttpDialogService {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDialogService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: trim_base(base_url),
            http: http_client(timeout)?,
        })
    }

    fn dialog_url(&self, id: Uuid) -> String {
        format!("{}/dialogs/{}", self.base_url, id)
    }

    fn with_options(request: reqwest::RequestBuilder, opts: WriteOptions) -> reqwest::RequestBuilder {
        if opts.silent {
            request.query(&[("isSilentUpdate", "true")])
        } else {
            request
        }
    }

    /// Send a write and return the response, logging validation failures with their body
    async fn send_write(
        &self,
        operation: &'static str,
        id: Uuid,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            error!(dialog_id = %id, operation, body = %body, "Dialog service rejected write");
        } else {
            warn!(dialog_id = %id, operation, status = status.as_u16(), "Dialog write failed");
        }
        Err(SyncError::from_status(SERVICE, status.as_u16(), body))
    }

    fn revision_of(response: &reqwest::Response) -> Result<String> {
        response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| SyncError::Rejected {
                service: SERVICE,
                status: response.status().as_u16(),
                body: "missing ETag header".to_string(),
            })
    }
}

#[async_trait]
impl DialogService for HttpDialogService {
    async fn get(&self, id: Uuid) -> Result<Option<Dialog>> {
        let response = self
            .http
            .get(self.dialog_url(id))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let revision = Self::revision_of(&response).ok();
        let mut dialog: Dialog = read_json(SERVICE, response).await?;
        dialog.revision = revision;
        Ok(Some(dialog))
    }

    async fn create(&self, dialog: &Dialog, opts: WriteOptions) -> Result<String> {
        let request = self
            .http
            .post(format!("{}/dialogs", self.base_url))
            .json(dialog);
        let response = self
            .send_write("create", dialog.id, Self::with_options(request, opts))
            .await?;
        Self::revision_of(&response)
    }

    async fn update(&self, dialog: &Dialog, revision: &str, opts: WriteOptions) -> Result<String> {
        let request = self
            .http
            .put(self.dialog_url(dialog.id))
            .header(IF_MATCH, revision)
            .json(dialog);
        let response = self
            .send_write("update", dialog.id, Self::with_options(request, opts))
            .await?;
        Self::revision_of(&response)
    }

    async fn delete(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<()> {
        let request = self.http.delete(self.dialog_url(id)).header(IF_MATCH, revision);
        self.send_write("delete", id, Self::with_options(request, opts))
            .await?;
        Ok(())
    }

    async fn purge(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<()> {
        let request = self
            .http
            .post(format!("{}/actions/purge", self.dialog_url(id)))
            .header(IF_MATCH, revision);
        self.send_write("purge", id, Self::with_options(request, opts))
            .await?;
        Ok(())
    }

    async fn restore(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<String> {
        let request = self
            .http
            .post(format!("{}/actions/restore", self.dialog_url(id)))
            .header(IF_MATCH, revision);
        let response = self
            .send_write("restore", id, Self::with_options(request, opts))
            .await?;
        Self::revision_of(&response)
    }

    async fn update_form_saved_time(
        &self,
        id: Uuid,
        activity_id: Uuid,
        created_at: DateTime<Utc>,
        revision: &str,
        opts: WriteOptions,
    ) -> Result<String> {
        let request = self
            .http
            .put(format!(
                "{}/activities/{}/actions/update-form-saved-activity-time",
                self.dialog_url(id),
                activity_id
            ))
            .header(IF_MATCH, revision)
            .json(&FormSavedTime { created_at });
        let response = self
            .send_write("update_form_saved_time", id, Self::with_options(request, opts))
            .await?;
        Self::revision_of(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorClass;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dialog(id: Uuid) -> Dialog {
        Dialog {
            id,
            service_resource: "urn:altinn:resource:app_acme_tax-form".into(),
            party: "urn:altinn:person:identifier-no:01017012345".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_reads_etag() {
        let server = MockServer::start().await;
        let id = Uuid::from_u128(9);
        Mock::given(method("GET"))
            .and(path(format!("/dialogs/{}", id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"rev-1\"")
                    .set_body_json(serde_json::to_value(dialog(id)).unwrap()),
            )
            .mount(&server)
            .await;

        let service = HttpDialogService::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let found = service.get(id).await.unwrap().unwrap();
        assert_eq!(found.revision.as_deref(), Some("\"rev-1\""));
        assert!(service.get(Uuid::from_u128(10)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_silent_update_with_if_match() {
        let server = MockServer::start().await;
        let id = Uuid::from_u128(9);
        Mock::given(method("PUT"))
            .and(path(format!("/dialogs/{}", id)))
            .and(header("If-Match", "\"rev-1\""))
            .and(query_param("isSilentUpdate", "true"))
            .respond_with(ResponseTemplate::new(204).insert_header("ETag", "\"rev-2\""))
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpDialogService::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let next = service
            .update(&dialog(id), "\"rev-1\"", WriteOptions::silent(true))
            .await
            .unwrap();
        assert_eq!(next, "\"rev-2\"");
    }

    #[tokio::test]
    async fn test_precondition_failed_is_conflict() {
        let server = MockServer::start().await;
        let id = Uuid::from_u128(9);
        Mock::given(method("POST"))
            .and(path(format!("/dialogs/{}/actions/restore", id)))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;

        let service = HttpDialogService::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = service
            .restore(id, "\"stale\"", WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[tokio::test]
    async fn test_validation_failure_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dialogs"))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"title\":\"required\"}"))
            .mount(&server)
            .await;

        let service = HttpDialogService::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = service
            .create(&dialog(Uuid::from_u128(1)), WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert!(err.to_string().contains("required"));
    }
}
