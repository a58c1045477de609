//! In-memory origin store and dialog service
//!
//! Used by development mode and the test suites. Both record the writes they
//! receive so tests can assert on them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::dialogs::{DialogService, WriteOptions};
use super::origin::{InstancePage, InstanceQuery, OriginStore};
use crate::model::{
    Application, ApplicationRef, Dialog, Instance, InstanceEvent, InstanceEventType,
};
use crate::streamer::SortOrder;
use crate::types::{Result, SyncError};

/// Origin store backed by maps
#[derive(Default)]
pub struct InMemoryOriginStore {
    applications: DashMap<String, Application>,
    /// Keyed by instance guid
    instances: DashMap<Uuid, Instance>,
    events: DashMap<Uuid, Vec<InstanceEvent>>,
    /// Remaining pages of listings in progress, keyed by continuation token
    continuations: DashMap<String, (usize, Vec<Instance>)>,
    next_token: AtomicU64,
    page_size_override: Mutex<Option<usize>>,
    failing_queries: AtomicUsize,
    data_value_writes: AtomicUsize,
    queries: AtomicUsize,
}

impl InMemoryOriginStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_application(&self, app: Application) {
        self.applications.insert(app.id.clone(), app);
    }

    /// Insert or replace an instance
    pub fn put_instance(&self, instance: Instance) -> Result<()> {
        let guid = instance.guid()?;
        self.instances.insert(guid, instance);
        Ok(())
    }

    pub fn remove_instance(&self, guid: Uuid) {
        self.instances.remove(&guid);
    }

    pub fn instance(&self, guid: Uuid) -> Option<Instance> {
        self.instances.get(&guid).map(|i| i.value().clone())
    }

    pub fn set_events(&self, guid: Uuid, events: Vec<InstanceEvent>) {
        self.events.insert(guid, events);
    }

    /// Serve pages smaller than requested
    pub fn set_page_size(&self, size: usize) {
        if let Ok(mut guard) = self.page_size_override.lock() {
            *guard = Some(size.max(1));
        }
    }

    /// Make the next `count` listing queries fail with a transient error
    pub fn fail_next_queries(&self, count: usize) {
        self.failing_queries.store(count, Ordering::SeqCst);
    }

    pub fn data_value_writes(&self) -> usize {
        self.data_value_writes.load(Ordering::SeqCst)
    }

    /// Number of first-page listing queries served
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn page(&self, mut remaining: Vec<Instance>, size: usize) -> InstancePage {
        if remaining.len() <= size {
            return InstancePage {
                instances: remaining,
                next: None,
            };
        }
        let rest = remaining.split_off(size);
        let token = format!("memory://next/{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        self.continuations.insert(token.clone(), (size, rest));
        InstancePage {
            instances: remaining,
            next: Some(token),
        }
    }

    fn effective_size(&self, requested: usize) -> usize {
        self.page_size_override
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .unwrap_or(requested)
    }
}

#[async_trait]
impl OriginStore for InMemoryOriginStore {
    async fn list_applications(&self) -> Result<Vec<ApplicationRef>> {
        let mut apps: Vec<ApplicationRef> = self
            .applications
            .iter()
            .map(|a| ApplicationRef {
                id: a.id.clone(),
                org: a.org.clone(),
            })
            .collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(apps)
    }

    async fn get_application(&self, app_id: &str) -> Result<Option<Application>> {
        Ok(self.applications.get(app_id).map(|a| a.value().clone()))
    }

    async fn query_instances(&self, query: &InstanceQuery) -> Result<InstancePage> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(SyncError::Transient {
                service: "origin",
                message: "injected failure".to_string(),
            });
        }

        let mut matching: Vec<Instance> = self
            .instances
            .iter()
            .filter(|i| i.org == query.scope.org)
            .filter(|i| query.scope.app_id.as_ref().map_or(true, |a| &i.app_id == a))
            .filter(|i| {
                query
                    .scope
                    .party_id
                    .as_ref()
                    .map_or(true, |p| &i.instance_owner.party_id == p)
            })
            .filter(|i| query.cursor.admits(i.last_changed))
            .map(|i| i.value().clone())
            .collect();

        matching.sort_by(|a, b| a.last_changed.cmp(&b.last_changed).then(a.id.cmp(&b.id)));
        if query.cursor.order() == SortOrder::Descending {
            matching.reverse();
        }

        Ok(self.page(matching, self.effective_size(query.size)))
    }

    async fn next_instances(&self, next: &str) -> Result<InstancePage> {
        let (_, (size, remaining)) = self
            .continuations
            .remove(next)
            .ok_or_else(|| SyncError::NotFound(format!("Unknown continuation {}", next)))?;
        Ok(self.page(remaining, size))
    }

    async fn get_instance(&self, party_id: &str, instance_id: Uuid) -> Result<Option<Instance>> {
        Ok(self
            .instances
            .get(&instance_id)
            .filter(|i| i.instance_owner.party_id == party_id)
            .map(|i| i.value().clone()))
    }

    async fn get_events(
        &self,
        _party_id: &str,
        instance_id: Uuid,
        event_types: &[InstanceEventType],
    ) -> Result<Vec<InstanceEvent>> {
        Ok(self
            .events
            .get(&instance_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| event_types.contains(&e.event_type))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_data_values(
        &self,
        party_id: &str,
        instance_id: Uuid,
        values: &HashMap<String, String>,
    ) -> Result<()> {
        let mut instance = self
            .instances
            .get_mut(&instance_id)
            .filter(|i| i.instance_owner.party_id == party_id)
            .ok_or_else(|| SyncError::NotFound(format!("Instance {}/{}", party_id, instance_id)))?;
        instance
            .data_values
            .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.data_value_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Kind of write received by [`InMemoryDialogService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DialogWrite {
    Create,
    Update,
    Delete,
    Purge,
    Restore,
    FormSavedTime,
}

/// Dialog service backed by a map, enforcing `If-Match`
#[derive(Default)]
pub struct InMemoryDialogService {
    dialogs: DashMap<Uuid, Dialog>,
    writes: Mutex<Vec<(DialogWrite, Uuid, bool)>>,
}

impl InMemoryDialogService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a dialog; a revision is assigned
    pub fn insert(&self, mut dialog: Dialog) {
        dialog.revision = Some(new_revision());
        self.dialogs.insert(dialog.id, dialog);
    }

    pub fn dialog(&self, id: Uuid) -> Option<Dialog> {
        self.dialogs.get(&id).map(|d| d.value().clone())
    }

    /// Number of writes of one kind
    pub fn count(&self, kind: DialogWrite) -> usize {
        self.writes
            .lock()
            .map(|w| w.iter().filter(|(k, _, _)| *k == kind).count())
            .unwrap_or(0)
    }

    /// All writes in order: kind, dialog id, silent flag
    pub fn writes(&self) -> Vec<(DialogWrite, Uuid, bool)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn record(&self, kind: DialogWrite, id: Uuid, opts: WriteOptions) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push((kind, id, opts.silent));
        }
    }

    /// Run `f` against the stored dialog after checking the revision
    fn guarded<T>(
        &self,
        id: Uuid,
        revision: &str,
        f: impl FnOnce(&mut Dialog) -> T,
    ) -> Result<T> {
        let mut stored = self
            .dialogs
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("Dialog {}", id)))?;
        if stored.revision.as_deref() != Some(revision) {
            return Err(SyncError::from_status(
                "dialogs",
                412,
                format!("revision mismatch for {}", id),
            ));
        }
        Ok(f(&mut stored))
    }
}

fn new_revision() -> String {
    format!("\"{}\"", Uuid::new_v4())
}

#[async_trait]
impl DialogService for InMemoryDialogService {
    async fn get(&self, id: Uuid) -> Result<Option<Dialog>> {
        Ok(self.dialog(id))
    }

    async fn create(&self, dialog: &Dialog, opts: WriteOptions) -> Result<String> {
        if self.dialogs.contains_key(&dialog.id) {
            return Err(SyncError::from_status(
                "dialogs",
                409,
                format!("dialog {} already exists", dialog.id),
            ));
        }
        let revision = new_revision();
        let mut stored = dialog.clone();
        stored.revision = Some(revision.clone());
        self.dialogs.insert(stored.id, stored);
        self.record(DialogWrite::Create, dialog.id, opts);
        Ok(revision)
    }

    async fn update(&self, dialog: &Dialog, revision: &str, opts: WriteOptions) -> Result<String> {
        let next = new_revision();
        self.guarded(dialog.id, revision, |stored| {
            let deleted_at = stored.deleted_at;
            *stored = dialog.clone();
            stored.deleted_at = deleted_at;
            stored.revision = Some(next.clone());
        })?;
        self.record(DialogWrite::Update, dialog.id, opts);
        Ok(next)
    }

    async fn delete(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<()> {
        self.guarded(id, revision, |stored| {
            stored.deleted_at = Some(Utc::now());
            stored.revision = Some(new_revision());
        })?;
        self.record(DialogWrite::Delete, id, opts);
        Ok(())
    }

    async fn purge(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<()> {
        self.guarded(id, revision, |_| ())?;
        self.dialogs.remove(&id);
        self.record(DialogWrite::Purge, id, opts);
        Ok(())
    }

    async fn restore(&self, id: Uuid, revision: &str, opts: WriteOptions) -> Result<String> {
        let next = new_revision();
        self.guarded(id, revision, |stored| {
            stored.deleted_at = None;
            stored.revision = Some(next.clone());
        })?;
        self.record(DialogWrite::Restore, id, opts);
        Ok(next)
    }

    async fn update_form_saved_time(
        &self,
        id: Uuid,
        activity_id: Uuid,
        created_at: DateTime<Utc>,
        revision: &str,
        opts: WriteOptions,
    ) -> Result<String> {
        let next = new_revision();
        let found = self.guarded(id, revision, |stored| {
            let activity = stored.activities.iter_mut().find(|a| a.id == activity_id);
            let found = activity.is_some();
            if let Some(activity) = activity {
                activity.created_at = created_at;
                stored.revision = Some(next.clone());
            }
            found
        })?;
        if !found {
            return Err(SyncError::from_status(
                "dialogs",
                404,
                format!("activity {} not found", activity_id),
            ));
        }
        self.record(DialogWrite::FormSavedTime, id, opts);
        Ok(next)
    }
}

/// Application fixture with an English title
pub fn sample_application(org: &str, app: &str) -> Application {
    Application {
        id: format!("{}/{}", org, app),
        org: org.to_string(),
        title: BTreeMap::from([("en".to_string(), format!("{} {}", org, app))]),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceOwner;
    use crate::streamer::{Cursor, StreamScope};
    use chrono::TimeZone;

    fn instance(n: u128, org: &str, hour: u32) -> Instance {
        Instance {
            id: format!("50001/{}", Uuid::from_u128(n)),
            instance_owner: InstanceOwner {
                party_id: "50001".into(),
                ..Default::default()
            },
            app_id: format!("{}/app", org),
            org: org.into(),
            created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            last_changed: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_listing_pages_and_filters() {
        let store = InMemoryOriginStore::new();
        for (n, hour) in [(1, 1), (2, 2), (3, 3)] {
            store.put_instance(instance(n, "acme", hour)).unwrap();
        }
        store.put_instance(instance(4, "other", 4)).unwrap();

        let query = InstanceQuery::new(StreamScope::organization("acme"), Cursor::ascending(None), 2);
        let first = store.query_instances(&query).await.unwrap();
        assert_eq!(first.instances.len(), 2);
        let second = store
            .next_instances(first.next.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(second.instances.len(), 1);
        assert!(second.next.is_none());

        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
        let desc = InstanceQuery::new(
            StreamScope::organization("acme"),
            Cursor::descending(Some(cutoff), None),
            10,
        );
        let page = store.query_instances(&desc).await.unwrap();
        let hours: Vec<_> = page.instances.iter().map(|i| i.last_changed).collect();
        assert_eq!(hours.len(), 2);
        assert!(hours[0] > hours[1]);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let service = InMemoryDialogService::new();
        let dialog = Dialog {
            id: Uuid::from_u128(5),
            ..Default::default()
        };
        let rev = service.create(&dialog, WriteOptions::default()).await.unwrap();
        let err = service
            .update(&dialog, "\"stale\"", WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.class(), crate::types::ErrorClass::Conflict);
        service.update(&dialog, &rev, WriteOptions::default()).await.unwrap();
        assert_eq!(service.count(DialogWrite::Create), 1);
        assert_eq!(service.count(DialogWrite::Update), 1);
    }
}
