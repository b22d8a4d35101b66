//! Time-bounded metadata cache with single-flight fetching and SQLite
//! persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::MetadataSource;
use crate::config::CacheConfig;
use crate::errors::{NaturaleError, NaturaleResult};
use crate::metadata::fallback::{self, fallback_snapshot};
use crate::models::{MetadataSnapshot, ProjectKey, ProjectTarget, SnapshotCounts};
use crate::store::SnapshotDatabase;

type SharedFetch = Shared<BoxFuture<'static, Arc<MetadataSnapshot>>>;

/// Per-entry view reported by cache administration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub organization: String,
    pub project: String,
    pub fetched_at: DateTime<Utc>,
    pub age_secs: i64,
    pub ttl_secs: i64,
    pub is_stale: bool,
    pub is_fallback: bool,
    pub in_memory: bool,
    pub persisted: bool,
    pub counts: SnapshotCounts,
}

async fn blocking<T, F>(f: F) -> NaturaleResult<T>
where
    F: FnOnce() -> NaturaleResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| NaturaleError::Io(std::io::Error::other(e)))?
}

/// Unwrap one sub-fetch, degrading a failure to an empty slice.
fn slice<T: Default>(name: &str, target: &ProjectTarget, result: NaturaleResult<T>, failures: &mut usize) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            *failures += 1;
            warn!(key = %target.key, slice = name, error = %err, "metadata sub-fetch failed");
            T::default()
        }
    }
}

const SUB_FETCHES: usize = 5;

struct Inner {
    source: Arc<dyn MetadataSource>,
    database: Option<SnapshotDatabase>,
    ttl: chrono::Duration,
    cache: RwLock<IndexMap<ProjectKey, Arc<MetadataSnapshot>>>,
    in_flight: Mutex<HashMap<ProjectKey, SharedFetch>>,
}

impl Inner {
    fn is_fresh(&self, snapshot: &MetadataSnapshot, now: DateTime<Utc>) -> bool {
        snapshot.fetched_at + self.ttl > now
    }

    fn memory(&self, key: &ProjectKey) -> Option<Arc<MetadataSnapshot>> {
        self.cache.read().get(key).cloned()
    }

    fn fresh_memory(&self, key: &ProjectKey) -> Option<Arc<MetadataSnapshot>> {
        self.memory(key).filter(|s| self.is_fresh(s, Utc::now()))
    }

    fn remember(&self, snapshot: Arc<MetadataSnapshot>) {
        self.cache.write().insert(snapshot.key(), snapshot);
    }

    async fn load_persisted(&self, key: &ProjectKey) -> Option<MetadataSnapshot> {
        let db = self.database.clone()?;
        let key = key.clone();
        match blocking(move || db.load_snapshot(&key)).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "failed to read persisted metadata");
                None
            }
        }
    }

    async fn persist(&self, snapshot: Arc<MetadataSnapshot>) {
        let Some(db) = self.database.clone() else {
            return;
        };
        if let Err(err) = blocking(move || db.save_snapshot(&snapshot)).await {
            warn!(error = %err, "failed to persist metadata");
        }
    }

    async fn fetch_live(&self, target: &ProjectTarget) -> Option<MetadataSnapshot> {
        let source = &self.source;
        let (types, fields, iterations, areas, members) = tokio::join!(
            source.work_item_types(target),
            source.fields(target),
            source.iterations(target),
            source.areas(target),
            source.team_members(target),
        );

        let mut failures = 0;
        let types = slice("work_item_types", target, types, &mut failures);
        let mut fields = slice("fields", target, fields, &mut failures);
        let iterations = slice("iterations", target, iterations, &mut failures);
        let areas = slice("areas", target, areas, &mut failures);
        let team_members = slice("team_members", target, members, &mut failures);
        if failures == SUB_FETCHES {
            return None;
        }

        let picklists = join_all(
            fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.is_picklist)
                .filter_map(|(idx, f)| f.picklist_id.clone().map(|id| (idx, id)))
                .map(|(idx, id)| async move { (idx, source.picklist_values(target, &id).await) }),
        )
        .await;
        for (idx, result) in picklists {
            match result {
                Ok(values) => fields[idx].allowed_values = values,
                Err(err) => warn!(
                    field = %fields[idx].reference_name,
                    error = %err,
                    "picklist enrichment failed"
                ),
            }
        }

        let snapshot = MetadataSnapshot {
            organization: target.key.organization.clone(),
            project: target.key.project.clone(),
            work_item_types: types.into_iter().map(|t| (t.name.clone(), t)).collect::<BTreeMap<_, _>>(),
            fields: fields
                .into_iter()
                .map(|f| (f.reference_name.clone(), f))
                .collect::<BTreeMap<_, _>>(),
            team_members,
            iterations,
            areas,
            common_fields: fallback::common_fields(),
            query_operators: fallback::query_operators(),
            fetched_at: Utc::now(),
            is_fallback: false,
        };
        let counts = snapshot.counts();
        info!(
            key = %target.key,
            work_item_types = counts.work_item_types,
            fields = counts.fields,
            iterations = counts.iterations,
            areas = counts.areas,
            team_members = counts.team_members,
            failed_slices = failures,
            "fetched metadata"
        );
        Some(snapshot)
    }

    async fn load_or_fetch(&self, target: &ProjectTarget, force: bool) -> Arc<MetadataSnapshot> {
        let key = &target.key;
        let mut persisted = None;
        if !force {
            if let Some(snapshot) = self.fresh_memory(key) {
                return snapshot;
            }
            persisted = self.load_persisted(key).await;
            if let Some(snapshot) = persisted.take_if(|s| self.is_fresh(s, Utc::now())) {
                debug!(key = %key, "promoted persisted metadata");
                let snapshot = Arc::new(snapshot);
                self.remember(snapshot.clone());
                return snapshot;
            }
        }

        if let Some(snapshot) = self.fetch_live(target).await {
            let snapshot = Arc::new(snapshot);
            self.remember(snapshot.clone());
            self.persist(snapshot.clone()).await;
            return snapshot;
        }

        if let Some(stale) = self.memory(key) {
            warn!(key = %key, "all metadata fetches failed, keeping cached snapshot");
            return stale;
        }
        if persisted.is_none() {
            persisted = self.load_persisted(key).await;
        }
        if let Some(stale) = persisted {
            warn!(key = %key, "all metadata fetches failed, using persisted snapshot");
            let stale = Arc::new(stale);
            self.remember(stale.clone());
            return stale;
        }
        warn!(key = %key, "all metadata fetches failed, using fallback metadata");
        Arc::new(fallback_snapshot(&key.organization, &key.project))
    }

    fn status(&self, snapshot: &MetadataSnapshot, in_memory: bool, persisted: bool, now: DateTime<Utc>) -> CacheStatus {
        CacheStatus {
            organization: snapshot.organization.clone(),
            project: snapshot.project.clone(),
            fetched_at: snapshot.fetched_at,
            age_secs: (now - snapshot.fetched_at).num_seconds().max(0),
            ttl_secs: self.ttl.num_seconds(),
            is_stale: !self.is_fresh(snapshot, now),
            is_fallback: snapshot.is_fallback,
            in_memory,
            persisted,
            counts: snapshot.counts(),
        }
    }
}

/// Shared handle to the metadata cache. Cloning is cheap.
#[derive(Clone)]
pub struct MetadataStore {
    inner: Arc<Inner>,
}

impl MetadataStore {
    pub fn new(source: Arc<dyn MetadataSource>, ttl: chrono::Duration, database: Option<SnapshotDatabase>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                database,
                ttl,
                cache: RwLock::new(IndexMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Build from config, opening and migrating the SQLite file when one is
    /// configured.
    pub fn from_config(source: Arc<dyn MetadataSource>, config: &CacheConfig) -> NaturaleResult<Self> {
        let database = match &config.db_path {
            Some(path) => {
                let db = SnapshotDatabase::new(path)?;
                db.init_schema()?;
                Some(db)
            }
            None => None,
        };
        Ok(Self::new(source, config.ttl(), database))
    }

    pub fn database(&self) -> Option<&SnapshotDatabase> {
        self.inner.database.as_ref()
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.inner.ttl
    }

    /// Current snapshot for `target`. Never fails: unresolved targets and
    /// total fetch failures yield the fallback schema, which is not cached.
    pub async fn get_snapshot(&self, target: &ProjectTarget) -> Arc<MetadataSnapshot> {
        if !target.key.is_resolved() {
            debug!("organization or project unresolved, using fallback metadata");
            return Arc::new(fallback_snapshot(&target.key.organization, &target.key.project));
        }
        if let Some(snapshot) = self.inner.fresh_memory(&target.key) {
            debug!(key = %target.key, "metadata cache hit");
            return snapshot;
        }
        self.single_flight(target, false).await
    }

    /// Force a live fetch. The previous snapshot survives a total failure.
    pub async fn refresh(&self, target: &ProjectTarget) -> Arc<MetadataSnapshot> {
        if !target.key.is_resolved() {
            return Arc::new(fallback_snapshot(&target.key.organization, &target.key.project));
        }
        self.single_flight(target, true).await
    }

    async fn single_flight(&self, target: &ProjectTarget, force: bool) -> Arc<MetadataSnapshot> {
        let fetch = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&target.key) {
                Some(existing) => {
                    debug!(key = %target.key, "joining in-flight metadata fetch");
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let owned = target.clone();
                    let fetch = async move {
                        let snapshot = inner.load_or_fetch(&owned, force).await;
                        inner.in_flight.lock().remove(&owned.key);
                        snapshot
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(target.key.clone(), fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Drop the memory entry and the persisted row. Returns whether anything
    /// was removed.
    pub async fn invalidate(&self, key: &ProjectKey) -> NaturaleResult<bool> {
        let in_memory = self.inner.cache.write().shift_remove(key).is_some();
        let persisted = match self.inner.database.clone() {
            Some(db) => {
                let key = key.clone();
                blocking(move || db.delete_snapshot(&key)).await?
            }
            None => false,
        };
        Ok(in_memory || persisted)
    }

    /// Drop every entry. Returns the number of distinct keys removed.
    pub async fn clear(&self) -> NaturaleResult<usize> {
        let mut removed: Vec<ProjectKey> = self.inner.cache.write().drain(..).map(|(k, _)| k).collect();
        if let Some(db) = self.inner.database.clone() {
            let stored = blocking(move || {
                let stored = db.list_snapshots()?;
                db.clear()?;
                Ok(stored)
            })
            .await?;
            for entry in stored {
                if !removed.contains(&entry.key) {
                    removed.push(entry.key);
                }
            }
        }
        Ok(removed.len())
    }

    pub async fn cache_status(&self, key: &ProjectKey) -> NaturaleResult<Option<CacheStatus>> {
        Ok(self
            .cache_status_all()
            .await?
            .into_iter()
            .find(|s| s.organization == key.organization && s.project == key.project))
    }

    /// Memory entries first, then persisted-only entries.
    pub async fn cache_status_all(&self) -> NaturaleResult<Vec<CacheStatus>> {
        let now = Utc::now();
        let stored = match self.inner.database.clone() {
            Some(db) => blocking(move || db.list_snapshots()).await?,
            None => Vec::new(),
        };
        let memory: Vec<Arc<MetadataSnapshot>> = self.inner.cache.read().values().cloned().collect();

        let mut statuses: Vec<CacheStatus> = memory
            .iter()
            .map(|snapshot| {
                let persisted = stored.iter().any(|s| s.key == snapshot.key());
                self.inner.status(snapshot, true, persisted, now)
            })
            .collect();

        for entry in stored {
            if memory.iter().any(|s| s.key() == entry.key) {
                continue;
            }
            if let Some(snapshot) = self.inner.load_persisted(&entry.key).await {
                statuses.push(self.inner.status(&snapshot, false, true, now));
            }
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::backend::WorkItemReference;
    use crate::models::{Area, FieldInfo, HostShape, Iteration, TeamMember, WorkItemTypeInfo};

    #[derive(Default)]
    struct FakeSource {
        type_calls: AtomicUsize,
        fail_all: AtomicBool,
        fail_iterations: bool,
        delay_ms: u64,
    }

    impl FakeSource {
        fn check(&self) -> NaturaleResult<()> {
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(NaturaleError::MetadataFetch("offline".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MetadataSource for FakeSource {
        async fn work_item_types(&self, _target: &ProjectTarget) -> NaturaleResult<Vec<WorkItemTypeInfo>> {
            self.type_calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.check()?;
            Ok(vec![WorkItemTypeInfo {
                name: "Bug".into(),
                reference_name: "Microsoft.VSTS.WorkItemTypes.Bug".into(),
                ..WorkItemTypeInfo::default()
            }])
        }

        async fn fields(&self, _target: &ProjectTarget) -> NaturaleResult<Vec<FieldInfo>> {
            self.check()?;
            let mut severity = FieldInfo::new("Severity", "Microsoft.VSTS.Common.Severity", "String");
            severity.is_picklist = true;
            severity.picklist_id = Some("sev-list".into());
            Ok(vec![FieldInfo::new("Title", "System.Title", "String"), severity])
        }

        async fn picklist_values(&self, _target: &ProjectTarget, picklist_id: &str) -> NaturaleResult<Vec<String>> {
            assert_eq!(picklist_id, "sev-list");
            Ok(vec!["1 - Critical".into(), "2 - High".into()])
        }

        async fn iterations(&self, _target: &ProjectTarget) -> NaturaleResult<Vec<Iteration>> {
            self.check()?;
            if self.fail_iterations {
                return Err(NaturaleError::Server {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(vec![Iteration {
                name: "Sprint 1".into(),
                path: "web\\Sprint 1".into(),
                ..Iteration::default()
            }])
        }

        async fn areas(&self, _target: &ProjectTarget) -> NaturaleResult<Vec<Area>> {
            self.check()?;
            Ok(vec![])
        }

        async fn team_members(&self, _target: &ProjectTarget) -> NaturaleResult<Vec<TeamMember>> {
            self.check()?;
            Ok(vec![])
        }

        async fn execute_wiql(&self, _target: &ProjectTarget, _wiql: &str) -> NaturaleResult<Vec<WorkItemReference>> {
            Ok(vec![])
        }
    }

    fn target() -> ProjectTarget {
        ProjectTarget::new("acme", "web", HostShape::PathEmbedded)
    }

    fn store(source: Arc<FakeSource>, database: Option<SnapshotDatabase>) -> MetadataStore {
        MetadataStore::new(source, chrono::Duration::seconds(1800), database)
    }

    #[tokio::test]
    async fn test_fetch_builds_snapshot_with_picklists() {
        let source = Arc::new(FakeSource::default());
        let store = store(source.clone(), None);
        let snapshot = store.get_snapshot(&target()).await;
        assert!(!snapshot.is_fallback);
        assert!(snapshot.work_item_types.contains_key("Bug"));
        assert_eq!(
            snapshot.allowed_values("Microsoft.VSTS.Common.Severity"),
            vec!["1 - Critical".to_string(), "2 - High".to_string()]
        );
        assert!(!snapshot.common_fields.is_empty());

        store.get_snapshot(&target()).await;
        assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_slices() {
        let source = Arc::new(FakeSource {
            fail_iterations: true,
            ..FakeSource::default()
        });
        let snapshot = store(source, None).get_snapshot(&target()).await;
        assert!(!snapshot.is_fallback);
        assert!(snapshot.iterations.is_empty());
        assert_eq!(snapshot.counts().work_item_types, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let source = Arc::new(FakeSource {
            delay_ms: 50,
            ..FakeSource::default()
        });
        let store = store(source.clone(), None);
        let t = target();
        let (a, b, c) = tokio::join!(store.get_snapshot(&t), store.get_snapshot(&t), store.get_snapshot(&t));
        assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn test_total_failure_without_cache_uses_fallback() {
        let source = Arc::new(FakeSource::default());
        source.fail_all.store(true, Ordering::SeqCst);
        let store = store(source, None);
        let snapshot = store.get_snapshot(&target()).await;
        assert!(snapshot.is_fallback);
        assert!(store.cache_status_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_snapshot() {
        let source = Arc::new(FakeSource::default());
        let store = store(source.clone(), None);
        let first = store.get_snapshot(&target()).await;
        source.fail_all.store(true, Ordering::SeqCst);
        let after = store.refresh(&target()).await;
        assert!(Arc::ptr_eq(&first, &after));
        assert_eq!(source.type_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unresolved_target_skips_backend() {
        let source = Arc::new(FakeSource::default());
        let store = store(source.clone(), None);
        let snapshot = store
            .get_snapshot(&ProjectTarget::new("acme", "", HostShape::PathEmbedded))
            .await;
        assert!(snapshot.is_fallback);
        assert_eq!(source.type_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_persisted_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let db = SnapshotDatabase::new(dir.path().join("meta.db")).unwrap();
        db.init_schema().unwrap();

        let first_source = Arc::new(FakeSource::default());
        store(first_source, Some(db.clone())).get_snapshot(&target()).await;

        let second_source = Arc::new(FakeSource::default());
        second_source.fail_all.store(true, Ordering::SeqCst);
        let restarted = store(second_source.clone(), Some(db));
        let snapshot = restarted.get_snapshot(&target()).await;
        assert!(!snapshot.is_fallback);
        assert!(snapshot.work_item_types.contains_key("Bug"));
        assert_eq!(second_source.type_calls.load(Ordering::SeqCst), 0);

        let statuses = restarted.cache_status_all().await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].in_memory && statuses[0].persisted);
        assert!(!statuses[0].is_stale);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let db = SnapshotDatabase::new(dir.path().join("meta.db")).unwrap();
        db.init_schema().unwrap();
        let store = store(Arc::new(FakeSource::default()), Some(db));

        store.get_snapshot(&target()).await;
        assert!(store.cache_status(&target().key).await.unwrap().is_some());
        assert!(store.invalidate(&target().key).await.unwrap());
        assert!(!store.invalidate(&target().key).await.unwrap());

        store.get_snapshot(&target()).await;
        store
            .get_snapshot(&ProjectTarget::new("acme", "api", HostShape::PathEmbedded))
            .await;
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.cache_status_all().await.unwrap().is_empty());
    }
}
