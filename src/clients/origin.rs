//! Origin (case-management) store client

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{ensure_success, http_client, read_json, transport_error, trim_base};
use crate::model::{Application, ApplicationRef, Instance, InstanceEvent, InstanceEventType};
use crate::streamer::{Cursor, StreamScope};
use crate::types::Result;

const SERVICE: &str = "origin";

/// Largest page the origin store serves
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of the instance listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePage {
    #[serde(default)]
    pub instances: Vec<Instance>,
    /// Absolute continuation URL, absent on the last page
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApplicationList {
    #[serde(default)]
    applications: Vec<ApplicationRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    instance_events: Vec<InstanceEvent>,
}

#[derive(Debug, Serialize)]
struct DataValues<'a> {
    values: &'a HashMap<String, String>,
}

/// First-page query of the instance listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceQuery {
    pub scope: StreamScope,
    pub cursor: Cursor,
    pub size: usize,
}

impl InstanceQuery {
    pub fn new(scope: StreamScope, cursor: Cursor, size: usize) -> Self {
        Self {
            scope,
            cursor,
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("org", self.scope.org.clone())];
        if let Some(app_id) = &self.scope.app_id {
            pairs.push(("appId", app_id.clone()));
        }
        if let Some(party_id) = &self.scope.party_id {
            pairs.push(("instanceOwner.partyId", party_id.clone()));
        }
        for filter in self.cursor.filters() {
            pairs.push(("lastChanged", filter));
        }
        pairs.push(("order", self.cursor.order().as_query().to_string()));
        pairs.push(("size", self.size.to_string()));
        pairs
    }
}

#[async_trait]
pub trait OriginStore: Send + Sync {
    async fn list_applications(&self) -> Result<Vec<ApplicationRef>>;

    /// `app_id` is `{org}/{app}`; `None` when the app is unknown
    async fn get_application(&self, app_id: &str) -> Result<Option<Application>>;

    async fn query_instances(&self, query: &InstanceQuery) -> Result<InstancePage>;

    /// Follow a `next` link from a previous page
    async fn next_instances(&self, next: &str) -> Result<InstancePage>;

    async fn get_instance(&self, party_id: &str, instance_id: Uuid) -> Result<Option<Instance>>;

    async fn get_events(
        &self,
        party_id: &str,
        instance_id: Uuid,
        event_types: &[InstanceEventType],
    ) -> Result<Vec<InstanceEvent>>;

    async fn update_data_values(
        &self,
        party_id: &str,
        instance_id: Uuid,
        values: &HashMap<String, String>,
    ) -> Result<()>;
}

/// reqwest implementation
pub struct HttpOriginStore {
    base_url: String,
    http: reqwest::Client,
}

impl HttpOriginStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: trim_base(base_url),
            http: http_client(timeout)?,
        })
    }

    fn instance_url(&self, party_id: &str, instance_id: Uuid) -> String {
        format!("{}/instances/{}/{}", self.base_url, party_id, instance_id)
    }

    async fn get_page(&self, request: reqwest::RequestBuilder) -> Result<InstancePage> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let page: InstancePage = read_json(SERVICE, response).await?;
        debug!(
            count = page.instances.len(),
            has_next = page.next.is_some(),
            "Fetched instance page"
        );
        Ok(page)
    }
}

#[async_trait]
impl OriginStore for HttpOriginStore {
    async fn list_applications(&self) -> Result<Vec<ApplicationRef>> {
        let response = self
            .http
            .get(format!("{}/applications", self.base_url))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let list: ApplicationList = read_json(SERVICE, response).await?;
        Ok(list.applications)
    }

    async fn get_application(&self, app_id: &str) -> Result<Option<Application>> {
        let response = self
            .http
            .get(format!("{}/applications/{}", self.base_url, app_id))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let app = read_json(SERVICE, response).await?;
        Ok(Some(app))
    }

    async fn query_instances(&self, query: &InstanceQuery) -> Result<InstancePage> {
        let request = self
            .http
            .get(format!("{}/instances", self.base_url))
            .query(&query.query_pairs());
        self.get_page(request).await
    }

    async fn next_instances(&self, next: &str) -> Result<InstancePage> {
        self.get_page(self.http.get(next)).await
    }

    async fn get_instance(&self, party_id: &str, instance_id: Uuid) -> Result<Option<Instance>> {
        let response = self
            .http
            .get(self.instance_url(party_id, instance_id))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let instance = read_json(SERVICE, response).await?;
        Ok(Some(instance))
    }

    async fn get_events(
        &self,
        party_id: &str,
        instance_id: Uuid,
        event_types: &[InstanceEventType],
    ) -> Result<Vec<InstanceEvent>> {
        let types: Vec<(&str, &str)> = event_types
            .iter()
            .map(|t| ("eventTypes", t.as_str()))
            .collect();
        let response = self
            .http
            .get(format!("{}/events", self.instance_url(party_id, instance_id)))
            .query(&types)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let list: EventList = read_json(SERVICE, response).await?;
        Ok(list.instance_events)
    }

    async fn update_data_values(
        &self,
        party_id: &str,
        instance_id: Uuid,
        values: &HashMap<String, String>,
    ) -> Result<()> {
        let response = self
            .http
            .put(format!("{}/datavalues", self.instance_url(party_id, instance_id)))
            .json(&DataValues { values })
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorClass;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn instance_json(guid: &str, last_changed: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("50001/{}", guid),
            "instanceOwner": { "partyId": "50001" },
            "appId": "acme/tax-form",
            "org": "acme",
            "created": "2024-01-01T08:00:00Z",
            "lastChanged": last_changed,
        })
    }

    #[test]
    fn test_query_pairs_cap_page_size() {
        let scope = StreamScope::organization("acme").with_party(Some("50001".into()));
        let query = InstanceQuery::new(scope, Cursor::ascending(None), 500);
        let pairs = query.query_pairs();

        assert!(pairs.contains(&("org", "acme".to_string())));
        assert!(pairs.contains(&("instanceOwner.partyId", "50001".to_string())));
        assert!(pairs.contains(&("order", "asc:lastChanged".to_string())));
        assert!(pairs.contains(&("size", "100".to_string())));
        assert!(!pairs.iter().any(|(k, _)| *k == "lastChanged"));
    }

    #[tokio::test]
    async fn test_query_and_follow_next() {
        let server = MockServer::start().await;
        let next = format!("{}/instances?continuationToken=abc", server.uri());

        Mock::given(method("GET"))
            .and(path("/instances"))
            .and(query_param("continuationToken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "instances": [instance_json("0f9e8d7c-6b5a-4321-8765-43210fedcba9", "2024-01-01T10:00:00Z")],
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/instances"))
            .and(query_param("org", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "instances": [instance_json("a3e0c1a2-5b6f-4d8e-9f01-23456789abcd", "2024-01-01T09:00:00Z")],
                "next": next,
            })))
            .mount(&server)
            .await;

        let store = HttpOriginStore::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let query = InstanceQuery::new(
            StreamScope::organization("acme"),
            Cursor::ascending(None),
            10,
        );

        let first = store.query_instances(&query).await.unwrap();
        assert_eq!(first.instances.len(), 1);
        let link = first.next.expect("continuation link");

        let second = store.next_instances(&link).await.unwrap();
        assert_eq!(second.instances.len(), 1);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_missing_instance_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpOriginStore::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let found = store.get_instance("50001", Uuid::from_u128(1)).await.unwrap();
        assert!(found.is_none());
        assert!(store.get_application("acme/gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_data_values() {
        let server = MockServer::start().await;
        let guid = Uuid::from_u128(42);
        Mock::given(method("PUT"))
            .and(path(format!("/instances/50001/{}/datavalues", guid)))
            .and(body_json(serde_json::json!({ "values": { "dialog.id": "d-1" } })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpOriginStore::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let values = HashMap::from([("dialog.id".to_string(), "d-1".to_string())]);
        store.update_data_values("50001", guid, &values).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let store = HttpOriginStore::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = store.list_applications().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }
}
