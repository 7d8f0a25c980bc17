//! Sync executor.
//!
//! Orchestrates fetch → resolve → write → record for one key at a time,
//! under a per-key lock backed by the persisted `is_syncing` claim. Remote
//! errors become sync record status updates and typed outcomes; raw HTTP
//! detail never escapes past the audit log.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::config::SyncSettings;
use crate::db::{
    ConflictRepository, Database, SqliteConflictRepository, SqliteSyncLogRepository,
    SqliteSyncRecordRepository, SyncLogRepository, SyncRecordRepository,
};
use crate::document::{canonical_hash, doc_modified, strip_fields, Document};
use crate::error::{Error, Result};
use crate::models::{LogAction, LogStatus, SyncDirection, SyncStatus};
use crate::policy::{decide, ConflictPolicy, PolicyDecision};
use crate::remote::{RemoteClient, RemoteError};
use crate::resolver::{resolve_with_hint, Resolution};
use crate::util::clamp_message;

/// Result of one `sync_one` invocation.
#[derive(Debug)]
pub enum Outcome {
    /// A write happened in the given direction
    Synced(SyncDirection),
    /// Nothing to do; the reason says why
    Skipped(String),
    /// Divergence halted for external resolution
    Conflict,
    /// The operation failed; the sync record carries the error state
    Failed(Error),
}

impl Outcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

/// Aggregate counts for bulk operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub synced: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl Summary {
    fn record(&mut self, outcome: &Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Synced(_) => self.synced += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Conflict => self.conflicts += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    fn absorb(&mut self, other: Summary) {
        self.total += other.total;
        self.synced += other.synced;
        self.skipped += other.skipped;
        self.conflicts += other.conflicts;
        self.failed += other.failed;
    }
}

type KeyLocks = Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>;

/// Bidirectional sync executor bound to both endpoints and the state store.
pub struct SyncEngine {
    cloud: RemoteClient,
    local: RemoteClient,
    records: SqliteSyncRecordRepository,
    conflicts: SqliteConflictRepository,
    audit: SqliteSyncLogRepository,
    policy: ConflictPolicy,
    excluded_fields: Vec<String>,
    max_attempts: i64,
    batch_size: usize,
    doctypes: Vec<String>,
    locks: KeyLocks,
}

impl SyncEngine {
    /// Build an executor from its collaborators.
    #[must_use]
    pub fn new(
        cloud: RemoteClient,
        local: RemoteClient,
        db: &Database,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            cloud,
            local,
            records: SqliteSyncRecordRepository::new(db),
            conflicts: SqliteConflictRepository::new(db),
            audit: SqliteSyncLogRepository::new(db),
            policy: settings.conflict_resolution,
            excluded_fields: settings.excluded_fields.clone(),
            max_attempts: settings.retry.max_attempts,
            batch_size: settings.batch_size,
            doctypes: settings.doctypes.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Synchronize one document key.
    ///
    /// Idempotent: a key whose hashes already match returns
    /// `Skipped("no changes")` without touching either remote.
    pub async fn sync_one(
        &self,
        doctype: &str,
        docname: &str,
        hint: Option<SyncDirection>,
    ) -> Outcome {
        let key_lock = self.key_lock(doctype, docname);
        let Ok(_guard) = key_lock.try_lock() else {
            return Outcome::skipped("already syncing");
        };

        match self.records.claim(doctype, docname) {
            Ok(true) => {}
            Ok(false) => return Outcome::skipped("already syncing"),
            Err(error) => return Outcome::Failed(error),
        }
        // Releases the persisted claim on every exit path, panics included;
        // the terminal record updates below make this a no-op on clean exits.
        let _claim = ClaimGuard {
            records: &self.records,
            doctype,
            docname,
        };

        match self.run_claimed(doctype, docname, hint).await {
            Ok(outcome) => outcome,
            Err(error) => self.fail(doctype, docname, error),
        }
    }

    /// Synchronize every document of one doctype known to either side.
    pub async fn sync_doctype(&self, doctype: &str, limit: Option<usize>) -> Result<Summary> {
        let limit = limit.unwrap_or(self.batch_size);
        let cloud_docs = self.cloud.list(doctype, None, limit, 0).await?;
        let local_docs = self.local.list(doctype, None, limit, 0).await?;

        let names: BTreeSet<String> = cloud_docs
            .iter()
            .chain(local_docs.iter())
            .filter_map(|doc| crate::document::doc_name(doc).map(str::to_string))
            .collect();

        let mut summary = Summary::default();
        for name in names {
            let outcome = self.sync_one(doctype, &name, None).await;
            if let Outcome::Failed(error) = &outcome {
                tracing::error!(doctype, docname = %name, %error, "sync failed");
            }
            summary.record(&outcome);
        }
        Ok(summary)
    }

    /// Synchronize all configured doctypes.
    pub async fn sync_all(&self, limit: Option<usize>) -> Summary {
        let mut summary = Summary::default();
        let doctypes = self.doctypes.clone();
        for doctype in &doctypes {
            match self.sync_doctype(doctype, limit).await {
                Ok(doctype_summary) => summary.absorb(doctype_summary),
                Err(error) => {
                    tracing::error!(doctype = %doctype, %error, "doctype listing failed");
                    summary.total += 1;
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    async fn run_claimed(
        &self,
        doctype: &str,
        docname: &str,
        hint: Option<SyncDirection>,
    ) -> Result<Outcome> {
        let record = self.records.get_or_create(doctype, docname)?;
        if record.status == SyncStatus::Failed {
            self.records.release(doctype, docname)?;
            return Ok(Outcome::skipped("marked failed; manual intervention required"));
        }

        let mut cloud_doc = self.cloud.get(doctype, docname).await?;
        let mut local_doc = self.local.get(doctype, docname).await?;
        let mut re_resolved = false;

        loop {
            let record = self.records.get_or_create(doctype, docname)?;
            let cloud_hash = cloud_doc
                .as_ref()
                .map(|doc| canonical_hash(doc, &self.excluded_fields))
                .unwrap_or_default();
            let local_hash = local_doc
                .as_ref()
                .map(|doc| canonical_hash(doc, &self.excluded_fields))
                .unwrap_or_default();

            let resolution = resolve_with_hint(
                &cloud_hash,
                &local_hash,
                &record.cloud_hash,
                &record.local_hash,
                hint,
            );

            let (direction, resolved_conflict) = match resolution {
                Resolution::Skip => {
                    self.records.release(doctype, docname)?;
                    self.audit.append(
                        doctype,
                        docname,
                        LogAction::Skip,
                        SyncDirection::None,
                        LogStatus::Skipped,
                        "document absent on both sides",
                    )?;
                    return Ok(Outcome::skipped("document absent on both sides"));
                }
                Resolution::Unchanged => {
                    self.records.release(doctype, docname)?;
                    self.audit.append(
                        doctype,
                        docname,
                        LogAction::Skip,
                        SyncDirection::None,
                        LogStatus::Skipped,
                        "no changes",
                    )?;
                    return Ok(Outcome::skipped("no changes"));
                }
                Resolution::CloudToLocal => (SyncDirection::CloudToLocal, None),
                Resolution::LocalToCloud => (SyncDirection::LocalToCloud, None),
                Resolution::Conflict => {
                    let (Some(cloud), Some(local)) = (cloud_doc.as_ref(), local_doc.as_ref())
                    else {
                        return Err(Error::InvalidInput(
                            "conflict resolution requires both documents".to_string(),
                        ));
                    };
                    match decide(self.policy, cloud, local) {
                        PolicyDecision::Manual => {
                            return self.halt_manual(doctype, docname, cloud, local);
                        }
                        PolicyDecision::Apply {
                            direction,
                            resolution,
                        } => {
                            let conflict_id = self.conflicts.record(
                                doctype,
                                docname,
                                &Value::Object(cloud.clone()).to_string(),
                                &Value::Object(local.clone()).to_string(),
                                doc_modified(cloud),
                                doc_modified(local),
                            )?;
                            tracing::info!(
                                doctype,
                                docname,
                                %direction,
                                resolution,
                                "divergence auto-resolved by policy"
                            );
                            (direction, Some((conflict_id, resolution)))
                        }
                    }
                }
            };

            match self
                .apply(doctype, docname, direction, &cloud_doc, &local_doc)
                .await
            {
                Ok(applied) => {
                    if let Some((conflict_id, resolution)) = resolved_conflict {
                        self.conflicts.mark_resolved(conflict_id, resolution)?;
                    }
                    self.records.mark_synced(
                        doctype,
                        docname,
                        &applied.content_hash,
                        direction,
                        applied.cloud_modified.as_deref(),
                        applied.local_modified.as_deref(),
                    )?;
                    self.audit.append(
                        doctype,
                        docname,
                        applied.action,
                        direction,
                        LogStatus::Success,
                        &applied.message,
                    )?;
                    return Ok(Outcome::Synced(direction));
                }
                Err(Error::Remote(RemoteError::TimestampMismatch(message))) if !re_resolved => {
                    // The destination moved under us faster than the client's
                    // own retries. Refetch both sides and re-resolve once; a
                    // second collision fails the operation to prevent livelock.
                    tracing::warn!(doctype, docname, %message, "re-resolving after collision");
                    re_resolved = true;
                    cloud_doc = self.cloud.get(doctype, docname).await?;
                    local_doc = self.local.get(doctype, docname).await?;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Perform the one-directional copy and describe what was done.
    async fn apply(
        &self,
        doctype: &str,
        docname: &str,
        direction: SyncDirection,
        cloud_doc: &Option<Document>,
        local_doc: &Option<Document>,
    ) -> Result<Applied> {
        let (source, destination, dest_client) = match direction {
            SyncDirection::CloudToLocal => (cloud_doc.as_ref(), local_doc.as_ref(), &self.local),
            SyncDirection::LocalToCloud => (local_doc.as_ref(), cloud_doc.as_ref(), &self.cloud),
            SyncDirection::None => {
                return Err(Error::InvalidInput("cannot apply direction none".to_string()))
            }
        };
        let Some(source) = source else {
            return Err(Error::InvalidInput(
                "chosen direction has no source document".to_string(),
            ));
        };

        let source_hash = canonical_hash(source, &self.excluded_fields);
        let mut payload = strip_fields(source, &self.excluded_fields);

        let (action, written, retried) = match destination {
            Some(current) => {
                // Carry the destination's own modified value so its
                // optimistic-concurrency check sees the version we read.
                if let Some(modified) = doc_modified(current) {
                    payload.insert("modified".to_string(), Value::String(modified.to_string()));
                }
                let outcome = dest_client.update(doctype, docname, &payload).await?;
                (LogAction::Update, outcome.document, outcome.attempts > 1)
            }
            None => {
                payload.remove("name");
                let created = dest_client.create(doctype, &payload).await?;
                (LogAction::Create, created, false)
            }
        };

        let written_hash = canonical_hash(&written, &self.excluded_fields);
        if written_hash != source_hash {
            tracing::debug!(
                doctype,
                docname,
                "destination response hash differs from source; recording source hash"
            );
        }

        let written_modified = doc_modified(&written).map(str::to_string);
        let source_modified = doc_modified(source).map(str::to_string);
        let (cloud_modified, local_modified) = match direction {
            SyncDirection::CloudToLocal => (source_modified, written_modified),
            _ => (written_modified, source_modified),
        };

        let verb = match action {
            LogAction::Create => "created on",
            _ => "updated on",
        };
        let target = match direction {
            SyncDirection::CloudToLocal => "local from cloud",
            _ => "cloud from local",
        };
        let mut message = format!("{verb} {target}");
        if retried {
            message.push_str(" (retried after timestamp mismatch)");
        }

        Ok(Applied {
            action,
            content_hash: source_hash,
            cloud_modified,
            local_modified,
            message,
        })
    }

    /// Halt a key under the manual policy, writing at most one unresolved
    /// conflict row per divergence.
    fn halt_manual(
        &self,
        doctype: &str,
        docname: &str,
        cloud: &Document,
        local: &Document,
    ) -> Result<Outcome> {
        if !self.conflicts.has_unresolved(doctype, docname)? {
            self.conflicts.record(
                doctype,
                docname,
                &Value::Object(cloud.clone()).to_string(),
                &Value::Object(local.clone()).to_string(),
                doc_modified(cloud),
                doc_modified(local),
            )?;
        }
        self.records.mark_conflict(doctype, docname)?;
        self.audit.append(
            doctype,
            docname,
            LogAction::Skip,
            SyncDirection::None,
            LogStatus::Conflict,
            "divergence requires manual resolution",
        )?;
        Ok(Outcome::Conflict)
    }

    /// Translate an error into sync record state and an audit row.
    fn fail(&self, doctype: &str, docname: &str, error: Error) -> Outcome {
        let message = clamp_message(&error.to_string());
        // Credential and validation failures will not succeed on retry; they
        // go terminal immediately.
        let max_attempts = match &error {
            Error::Remote(RemoteError::Unauthorized(_) | RemoteError::Validation(_)) => 0,
            _ => self.max_attempts,
        };
        if let Err(store_error) = self
            .records
            .mark_error(doctype, docname, &message, max_attempts)
        {
            tracing::error!(doctype, docname, %store_error, "failed to record sync error");
        }
        if let Err(store_error) = self.audit.append(
            doctype,
            docname,
            LogAction::Update,
            SyncDirection::None,
            LogStatus::Failed,
            &message,
        ) {
            tracing::error!(doctype, docname, %store_error, "failed to audit sync error");
        }
        Outcome::Failed(error)
    }

    fn key_lock(&self, doctype: &str, docname: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry((doctype.to_string(), docname.to_string()))
            .or_default()
            .clone()
    }
}

/// What `apply` did, for the sync record and the audit log.
struct Applied {
    action: LogAction,
    content_hash: String,
    cloud_modified: Option<String>,
    local_modified: Option<String>,
    message: String,
}

/// Releases the persisted `is_syncing` claim when dropped.
struct ClaimGuard<'a> {
    records: &'a SqliteSyncRecordRepository,
    doctype: &'a str,
    docname: &'a str,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.records.release(self.doctype, self.docname) {
            tracing::error!(
                doctype = self.doctype,
                docname = self.docname,
                %error,
                "failed to release sync claim"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, RetryConfig, WebhookConfig, WorkerConfig};
    use crate::db::{SqliteWebhookQueueRepository, WebhookQueueRepository};
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_settings(policy: ConflictPolicy) -> SyncSettings {
        SyncSettings {
            cloud: endpoint("http://cloud.invalid"),
            local: endpoint("http://local.invalid"),
            webhook: WebhookConfig::default(),
            doctypes: vec!["Customer".to_string()],
            excluded_fields: vec![],
            conflict_resolution: policy,
            retry: RetryConfig::default(),
            batch_size: 100,
            worker: WorkerConfig::default(),
            db_path: "unused.db".into(),
            queue_retention_days: 30,
        }
    }

    fn endpoint(url: &str) -> EndpointConfig {
        EndpointConfig {
            url: url.to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        }
    }

    struct Harness {
        engine: SyncEngine,
        cloud: MockServer,
        local: MockServer,
        db: Database,
    }

    async fn harness(policy: ConflictPolicy) -> Harness {
        let cloud = MockServer::start_async().await;
        let local = MockServer::start_async().await;
        let db = Database::open_in_memory().unwrap();
        let settings = test_settings(policy);
        let cloud_client = RemoteClient::new(&endpoint(&cloud.base_url()), "cloud").unwrap();
        let local_client = RemoteClient::new(&endpoint(&local.base_url()), "local").unwrap();
        let engine = SyncEngine::new(cloud_client, local_client, &db, &settings);
        Harness {
            engine,
            cloud,
            local,
            db,
        }
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn hash_of(value: serde_json::Value) -> String {
        canonical_hash(&doc(value), &[])
    }

    async fn mock_missing<'a>(server: &'a MockServer, path: &str) -> httpmock::Mock<'a> {
        let path = path.to_string();
        server
            .mock_async(move |when, then| {
                when.method(GET).path(path);
                then.status(404).json_body(json!({"message": "Not Found"}));
            })
            .await
    }

    #[tokio::test]
    async fn creates_missing_document_on_the_other_side() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;

        h.cloud
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer/C1");
                then.status(200).json_body(json!({"data": {
                    "name": "C1",
                    "customer_name": "Acme",
                    "modified": "2025-01-01 10:00:00"
                }}));
            })
            .await;
        mock_missing(&h.local, "/api/resource/Customer/C1").await;
        let create = h
            .local
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/resource/Customer")
                    .json_body_partial(r#"{"customer_name": "Acme"}"#);
                then.status(200).json_body(json!({"data": {
                    "name": "C1",
                    "customer_name": "Acme",
                    "modified": "2025-01-01 10:00:05"
                }}));
            })
            .await;

        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        assert!(matches!(outcome, Outcome::Synced(SyncDirection::CloudToLocal)));
        create.assert_async().await;

        let record = h
            .engine
            .records
            .get("Customer", "C1")
            .unwrap()
            .unwrap();
        assert_eq!(record.status, SyncStatus::Synced);
        assert_eq!(record.cloud_hash, record.local_hash);
        assert!(!record.cloud_hash.is_empty());
        assert_eq!(record.retry_count, 0);
        assert!(!record.is_syncing);
        assert_eq!(record.last_direction, SyncDirection::CloudToLocal);

        let logs = h.engine.audit.recent(10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::Create);
        assert_eq!(logs[0].status, LogStatus::Success);
        assert_eq!(logs[0].direction, SyncDirection::CloudToLocal);
    }

    #[tokio::test]
    async fn unchanged_key_is_skipped_without_writes() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;
        let body = json!({
            "name": "C1",
            "customer_name": "Acme",
            "modified": "2025-01-01 10:00:00"
        });

        // Seed the record as already synced at the current content.
        h.engine.records.get_or_create("Customer", "C1").unwrap();
        h.engine
            .records
            .mark_synced(
                "Customer",
                "C1",
                &hash_of(body.clone()),
                SyncDirection::CloudToLocal,
                None,
                None,
            )
            .unwrap();

        for server in [&h.cloud, &h.local] {
            let body = body.clone();
            server
                .mock_async(move |when, then| {
                    when.method(GET).path("/api/resource/Customer/C1");
                    then.status(200).json_body(json!({"data": body}));
                })
                .await;
        }

        // No write mocks registered: any create/update would fail the test.
        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        let Outcome::Skipped(reason) = outcome else {
            panic!("expected skip, got {outcome:?}");
        };
        assert_eq!(reason, "no changes");

        // Replays keep skipping; the executor is idempotent.
        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        assert!(matches!(outcome, Outcome::Skipped(_)));

        let logs = h.engine.audit.recent(10).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|entry| entry.status == LogStatus::Skipped));
    }

    #[tokio::test]
    async fn divergence_under_latest_timestamp_lets_the_newer_side_win() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;

        h.engine.records.get_or_create("Customer", "C1").unwrap();
        h.engine
            .records
            .mark_synced("Customer", "C1", "stale", SyncDirection::None, None, None)
            .unwrap();

        h.cloud
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer/C1");
                then.status(200).json_body(json!({"data": {
                    "name": "C1",
                    "customer_name": "AcmeCo",
                    "modified": "2025-01-02 09:00:00"
                }}));
            })
            .await;
        h.local
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer/C1");
                then.status(200).json_body(json!({"data": {
                    "name": "C1",
                    "customer_name": "Acme Inc",
                    "modified": "2025-01-02 10:00:00"
                }}));
            })
            .await;
        // Local is newer, so the write lands on cloud carrying cloud's
        // current modified value.
        let cloud_put = h
            .cloud
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/resource/Customer/C1")
                    .json_body_partial(
                        r#"{"customer_name": "Acme Inc", "modified": "2025-01-02 09:00:00"}"#,
                    );
                then.status(200).json_body(json!({"data": {
                    "name": "C1",
                    "customer_name": "Acme Inc",
                    "modified": "2025-01-02 10:30:00"
                }}));
            })
            .await;

        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        assert!(matches!(outcome, Outcome::Synced(SyncDirection::LocalToCloud)));
        cloud_put.assert_async().await;

        // The divergence is preserved as a resolved conflict record.
        let conflicts = h.engine.conflicts.list_unresolved(10).unwrap();
        assert!(conflicts.is_empty());
        let all: i64 = h
            .db
            .lock()
            .query_row("SELECT COUNT(*) FROM conflict_records WHERE resolved = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(all, 1);
        let resolution: String = h
            .db
            .lock()
            .query_row("SELECT resolution FROM conflict_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(resolution, "local_wins_by_timestamp");

        let record = h.engine.records.get("Customer", "C1").unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Synced);
        assert_eq!(record.cloud_hash, record.local_hash);
    }

    #[tokio::test]
    async fn manual_policy_halts_the_key_until_resolved() {
        let h = harness(ConflictPolicy::Manual).await;

        h.engine.records.get_or_create("Customer", "C1").unwrap();
        h.engine
            .records
            .mark_synced("Customer", "C1", "stale", SyncDirection::None, None, None)
            .unwrap();

        for (server, name) in [(&h.cloud, "AcmeCo"), (&h.local, "Acme Inc")] {
            server
                .mock_async(move |when, then| {
                    when.method(GET).path("/api/resource/Customer/C1");
                    then.status(200).json_body(json!({"data": {
                        "name": "C1",
                        "customer_name": name,
                        "modified": "2025-01-02 09:00:00"
                    }}));
                })
                .await;
        }

        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        assert!(matches!(outcome, Outcome::Conflict));
        assert_eq!(h.engine.conflicts.count_unresolved().unwrap(), 1);

        let record = h.engine.records.get("Customer", "C1").unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Conflict);
        assert!(!record.is_syncing);

        // Repeated invocations keep returning Conflict without piling up
        // duplicate conflict rows.
        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        assert!(matches!(outcome, Outcome::Conflict));
        assert_eq!(h.engine.conflicts.count_unresolved().unwrap(), 1);
    }

    #[tokio::test]
    async fn absent_on_both_sides_is_skipped() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;
        mock_missing(&h.cloud, "/api/resource/Customer/ghost").await;
        mock_missing(&h.local, "/api/resource/Customer/ghost").await;

        let outcome = h.engine.sync_one("Customer", "ghost", None).await;
        let Outcome::Skipped(reason) = outcome else {
            panic!("expected skip");
        };
        assert_eq!(reason, "document absent on both sides");
    }

    #[tokio::test]
    async fn concurrent_claim_is_skipped() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;
        assert!(h.engine.records.claim("Customer", "C1").unwrap());

        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        let Outcome::Skipped(reason) = outcome else {
            panic!("expected skip");
        };
        assert_eq!(reason, "already syncing");
    }

    #[tokio::test]
    async fn transient_errors_increment_retry_count() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;
        h.cloud
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer/C1");
                then.status(503).json_body(json!({"message": "gateway busy"}));
            })
            .await;

        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        assert!(matches!(outcome, Outcome::Failed(_)));

        let record = h.engine.records.get("Customer", "C1").unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Error);
        assert_eq!(record.retry_count, 1);
        assert!(record.error_message.is_some());
        assert!(!record.is_syncing);
    }

    #[tokio::test]
    async fn auth_failures_go_terminal_immediately() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;
        h.cloud
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer/C1");
                then.status(401).json_body(json!({"message": "Invalid API key"}));
            })
            .await;

        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        assert!(matches!(outcome, Outcome::Failed(_)));

        let record = h.engine.records.get("Customer", "C1").unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Failed);

        // The key stays parked until an operator clears the failure.
        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        let Outcome::Skipped(reason) = outcome else {
            panic!("expected skip");
        };
        assert!(reason.contains("manual intervention"));
    }

    #[tokio::test]
    async fn persistent_collision_fails_after_one_re_resolution() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;
        let local_body = json!({
            "name": "C1",
            "customer_name": "Acme",
            "modified": "2025-01-01 10:00:00"
        });

        // Local matches the recorded state, cloud has drifted: c→l update.
        h.engine.records.get_or_create("Customer", "C1").unwrap();
        h.engine
            .records
            .mark_synced(
                "Customer",
                "C1",
                &hash_of(local_body.clone()),
                SyncDirection::None,
                None,
                None,
            )
            .unwrap();

        h.cloud
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer/C1");
                then.status(200).json_body(json!({"data": {
                    "name": "C1",
                    "customer_name": "Acme Updated",
                    "modified": "2025-01-01 11:00:00"
                }}));
            })
            .await;
        h.local
            .mock_async(move |when, then| {
                when.method(GET).path("/api/resource/Customer/C1");
                then.status(200).json_body(json!({"data": local_body}));
            })
            .await;
        let puts = h
            .local
            .mock_async(|when, then| {
                when.method(PUT).path("/api/resource/Customer/C1");
                then.status(409).json_body(json!({"message": "Timestamp mismatch"}));
            })
            .await;

        let outcome = h.engine.sync_one("Customer", "C1", None).await;
        let Outcome::Failed(Error::Remote(RemoteError::TimestampMismatch(_))) = outcome else {
            panic!("expected timestamp mismatch failure, got {outcome:?}");
        };

        // Three client attempts per apply, two applies (one re-resolution).
        puts.assert_hits_async(6).await;

        let record = h.engine.records.get("Customer", "C1").unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Error);
        assert_eq!(record.retry_count, 1);
    }

    #[tokio::test]
    async fn sync_doctype_unions_names_from_both_sides() {
        let h = harness(ConflictPolicy::LatestTimestamp).await;

        h.cloud
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer");
                then.status(200).json_body(json!({"data": [
                    {"name": "C1", "customer_name": "Acme", "modified": "2025-01-01 10:00:00"}
                ]}));
            })
            .await;
        h.local
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer");
                then.status(200).json_body(json!({"data": [
                    {"name": "C2", "customer_name": "Globex", "modified": "2025-01-01 10:00:00"}
                ]}));
            })
            .await;

        h.cloud
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer/C1");
                then.status(200).json_body(json!({"data": {
                    "name": "C1", "customer_name": "Acme", "modified": "2025-01-01 10:00:00"
                }}));
            })
            .await;
        mock_missing(&h.cloud, "/api/resource/Customer/C2").await;
        mock_missing(&h.local, "/api/resource/Customer/C1").await;
        h.local
            .mock_async(|when, then| {
                when.method(GET).path("/api/resource/Customer/C2");
                then.status(200).json_body(json!({"data": {
                    "name": "C2", "customer_name": "Globex", "modified": "2025-01-01 10:00:00"
                }}));
            })
            .await;

        let local_create = h
            .local
            .mock_async(|when, then| {
                when.method(POST).path("/api/resource/Customer");
                then.status(200).json_body(json!({"data": {
                    "name": "C1", "customer_name": "Acme", "modified": "2025-01-01 10:01:00"
                }}));
            })
            .await;
        let cloud_create = h
            .cloud
            .mock_async(|when, then| {
                when.method(POST).path("/api/resource/Customer");
                then.status(200).json_body(json!({"data": {
                    "name": "C2", "customer_name": "Globex", "modified": "2025-01-01 10:01:00"
                }}));
            })
            .await;

        let summary = h.engine.sync_doctype("Customer", None).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.synced, 2);
        assert_eq!(summary.failed, 0);
        local_create.assert_async().await;
        cloud_create.assert_async().await;
    }

    #[tokio::test]
    async fn queue_items_and_engine_share_one_store() {
        // The worker relies on executor idempotence: replaying a webhook
        // for an in-sync key must not write anywhere.
        let h = harness(ConflictPolicy::LatestTimestamp).await;
        let queue = SqliteWebhookQueueRepository::new(&h.db);
        let body = json!({
            "name": "C1",
            "customer_name": "Acme",
            "modified": "2025-01-01 10:00:00"
        });

        h.engine.records.get_or_create("Customer", "C1").unwrap();
        h.engine
            .records
            .mark_synced(
                "Customer",
                "C1",
                &hash_of(body.clone()),
                SyncDirection::CloudToLocal,
                None,
                None,
            )
            .unwrap();
        for server in [&h.cloud, &h.local] {
            let body = body.clone();
            server
                .mock_async(move |when, then| {
                    when.method(GET).path("/api/resource/Customer/C1");
                    then.status(200).json_body(json!({"data": body}));
                })
                .await;
        }

        for _ in 0..3 {
            let outcome = h
                .engine
                .sync_one("Customer", "C1", Some(SyncDirection::CloudToLocal))
                .await;
            assert!(matches!(outcome, Outcome::Skipped(_)));
        }
        assert_eq!(queue.counts().unwrap().pending, 0);
    }
}
