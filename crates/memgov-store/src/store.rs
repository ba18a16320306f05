use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use serde_yaml::Value;
use tracing::{debug, error, info, warn};

use memgov_audit::{
    conflicts, pair_id, parse_document, parse_record, AuditEngine, AuditError, AuditReport,
    ConflictMode, ConflictPair, IssueCode, RecordErrors, Verdict,
};
use memgov_fsio::{read_holder, read_optional, with_lock, write_atomic, LockConfig};
use memgov_types::{ItemValue, MemoryItem, Status, StatusCounts};

use crate::buckets::{InvalidRecord, StatusBuckets};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::paths::MemoryPaths;
use crate::projection::{MarkdownProjection, ProjectionRenderer};
use crate::snapshot::FileSnapshot;

/// Lock resource that serializes every store mutation.
pub const STORE_LOCK: &str = "status-store";

/// What [`StatusStore::ensure_buckets`] found on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum EnsureOutcome {
    /// No buckets existed; they were seeded from the canonical file.
    SeededFromCanonical { items: usize },
    /// Neither buckets nor a canonical file existed.
    CreatedEmpty,
    /// Buckets existed and were rewritten in normal form.
    Normalized,
}

#[derive(Clone, Debug, Serialize)]
pub struct InitReport {
    pub paths: MemoryPaths,
    pub counts: StatusCounts,
}

/// Result of a committed [`StatusStore::change_status`].
#[derive(Clone, Debug, Serialize)]
pub struct StatusChange {
    pub from: Status,
    pub to: Status,
    /// The item as persisted.
    pub item: MemoryItem,
    pub counts: StatusCounts,
}

/// Arguments to [`StatusStore::merge_conflict`].
#[derive(Clone, Debug, PartialEq)]
pub struct MergeRequest {
    pub left_id: String,
    pub right_id: String,
    pub merged_value: ItemValue,
    /// Item that survives the merge; defaults to `left_id`.
    pub keep_id: Option<String>,
}

impl MergeRequest {
    pub fn new(
        left_id: impl Into<String>,
        right_id: impl Into<String>,
        merged_value: impl Into<ItemValue>,
    ) -> Self {
        Self {
            left_id: left_id.into(),
            right_id: right_id.into(),
            merged_value: merged_value.into(),
            keep_id: None,
        }
    }

    pub fn keep(mut self, id: impl Into<String>) -> Self {
        self.keep_id = Some(id.into());
        self
    }

    /// Check the argument-only preconditions and return `(kept, deprecated)`.
    fn resolve(&self) -> StoreResult<(&str, &str)> {
        if self.left_id == self.right_id {
            return Err(StoreError::InvalidArgument(format!(
                "cannot merge {} with itself",
                self.left_id
            )));
        }
        if self.merged_value.is_degenerate() {
            return Err(StoreError::InvalidArgument(
                "merged value must be non-empty and finite".into(),
            ));
        }
        let keep = self.keep_id.as_deref().unwrap_or(&self.left_id);
        if keep == self.left_id {
            Ok((&self.left_id, &self.right_id))
        } else if keep == self.right_id {
            Ok((&self.right_id, &self.left_id))
        } else {
            Err(StoreError::InvalidArgument(format!(
                "keep id {keep} is neither {} nor {}",
                self.left_id, self.right_id
            )))
        }
    }
}

/// Result of a committed [`StatusStore::merge_conflict`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub merged_id: String,
    pub deprecated_id: String,
    pub counts: StatusCounts,
    pub pair_id: String,
}

/// Transactional store of memory items partitioned into status buckets.
///
/// Holds no cached state: every operation reads the files again under the
/// `status-store` lock. Mutations run as a transaction:
///
/// 1. snapshot every artifact,
/// 2. load and mutate the buckets,
/// 3. write the buckets and rebuild `MEMORY.yml`,
/// 4. audit `MEMORY.yml` and reject a severe verdict,
/// 5. render the runtime projection.
///
/// Any failure after step 1 restores the snapshot byte-for-byte.
pub struct StatusStore {
    paths: MemoryPaths,
    lock: LockConfig,
    engine: AuditEngine,
    renderer: Box<dyn ProjectionRenderer>,
}

impl StatusStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            paths: MemoryPaths::new(&config.memory_root, &config.workspace_root),
            lock: config.lock_config(),
            engine: AuditEngine::new(config.audit.clone()),
            renderer: Box::new(MarkdownProjection),
        }
    }

    /// Replace the runtime projection renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn ProjectionRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the audit engine used as the commit gate.
    pub fn with_engine(mut self, engine: AuditEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn paths(&self) -> &MemoryPaths {
        &self.paths
    }

    pub fn engine(&self) -> &AuditEngine {
        &self.engine
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create or normalize every artifact. Running it twice in a row leaves
    /// the files byte-identical.
    ///
    /// `init` is not audit-gated, so an existing store with open issues can
    /// still be initialized; `memgov audit` reports them.
    pub fn init(&self) -> StoreResult<InitReport> {
        let ((), counts) = self.transaction(None, |_| Ok(()))?;
        info!(root = %self.paths.memory_root.display(), %counts, "store initialized");
        Ok(InitReport {
            paths: self.paths.clone(),
            counts,
        })
    }

    /// Seed the bucket files from the canonical file if none exist,
    /// otherwise rewrite them in normal form.
    pub fn ensure_buckets(&self) -> StoreResult<EnsureOutcome> {
        self.locked(|| self.ensure_unlocked())
    }

    /// Move an item to another status bucket.
    ///
    /// Changing to the current status leaves the item (including `updated`)
    /// untouched but still commits, so the store is normalized and audited.
    pub fn change_status(&self, id: &str, to: Status, today: NaiveDate) -> StoreResult<StatusChange> {
        let ((from, item), counts) = self.transaction(Some(today), |buckets| {
            let from = buckets
                .relabel(id, to, today)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if from == to {
                debug!(id, status = %to, "status unchanged");
            }
            let item = buckets
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            Ok((from, item))
        })?;
        info!(id, %from, %to, %counts, "status changed");
        Ok(StatusChange {
            from,
            to,
            item,
            counts,
        })
    }

    /// Resolve an unresolved conflict: the kept item takes the merged value
    /// and becomes active, the other one is deprecated.
    pub fn merge_conflict(&self, request: &MergeRequest, today: NaiveDate) -> StoreResult<MergeOutcome> {
        let (kept_id, other_id) = request.resolve()?;
        let pair = pair_id(&request.left_id, &request.right_id);

        let ((), counts) = self.transaction(Some(today), |buckets| {
            let unresolved = {
                let left = buckets
                    .get(&request.left_id)
                    .ok_or_else(|| StoreError::NotFound(request.left_id.clone()))?;
                let right = buckets
                    .get(&request.right_id)
                    .ok_or_else(|| StoreError::NotFound(request.right_id.clone()))?;
                let mode = ConflictMode::ActiveAndPending;
                mode.admits(left.status) && mode.admits(right.status) && conflicts(left, right)
            };
            if !unresolved {
                return Err(StoreError::NotConflicting {
                    pair_id: pair.clone(),
                });
            }

            buckets.relabel(kept_id, Status::Active, today);
            if let Some(kept) = buckets.get_mut(kept_id) {
                kept.value = request.merged_value.clone();
                kept.updated = Some(today);
                kept.annotate_next(&format!("resolved conflict {pair}"));
            }
            buckets.relabel(other_id, Status::Deprecated, today);
            if let Some(other) = buckets.get_mut(other_id) {
                other.updated = Some(today);
                other.annotate_next(&format!("superseded by {kept_id} (conflict {pair})"));
            }
            Ok(())
        })?;

        info!(pair = %pair, kept = kept_id, deprecated = other_id, %counts, "conflict merged");
        Ok(MergeOutcome {
            merged_id: kept_id.to_string(),
            deprecated_id: other_id.to_string(),
            counts,
            pair_id: pair,
        })
    }

    /// Write the buckets as given (sorted) without rebuilding or auditing
    /// the derived files. Prefer the audited operations above.
    pub fn save(&self, buckets: &mut StatusBuckets) -> StoreResult<()> {
        self.locked(|| self.write_buckets(buckets))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Current buckets. Reads the canonical file when no buckets exist yet.
    pub fn load(&self) -> StoreResult<StatusBuckets> {
        self.locked(|| self.read_buckets())
    }

    /// Every item in persistence order.
    pub fn flatten(&self) -> StoreResult<Vec<MemoryItem>> {
        Ok(self.load()?.flatten())
    }

    /// Unresolved conflicts among active and pending items, by pair id.
    pub fn list_conflicts(&self) -> StoreResult<Vec<ConflictPair>> {
        let items = self.flatten()?;
        Ok(self.engine.scanner().scan(&items, ConflictMode::ActiveAndPending))
    }

    /// Per-bucket counts. Does not take the lock.
    pub fn counts(&self) -> StoreResult<StatusCounts> {
        Ok(self.read_buckets()?.counts())
    }

    /// Audit the canonical file as it is on disk.
    pub fn audit(&self, today: NaiveDate) -> StoreResult<AuditReport> {
        self.locked(|| self.audit_canonical(today))
    }

    // -----------------------------------------------------------------------
    // Internals (caller holds the lock)
    // -----------------------------------------------------------------------

    fn locked<T>(&self, task: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        let path = self.paths.lock(STORE_LOCK);
        let outcome = with_lock(&path, &self.lock, task);
        if let Err(StoreError::LockTimeout { waited, .. }) = &outcome {
            match read_holder(&path) {
                Ok(Some(holder)) => warn!(
                    pid = holder.pid,
                    acquired_at = %holder.acquired_at,
                    ?waited,
                    "store lock still held"
                ),
                _ => warn!(?waited, "store lock still held by unknown holder"),
            }
        }
        outcome
    }

    fn transaction<T>(
        &self,
        today: Option<NaiveDate>,
        mutate: impl FnOnce(&mut StatusBuckets) -> StoreResult<T>,
    ) -> StoreResult<(T, StatusCounts)> {
        self.locked(|| {
            let previous = FileSnapshot::capture(&self.paths.artifacts())?;
            let outcome = self.ensure_unlocked().and_then(|_| {
                let mut buckets = self.read_buckets()?;
                let value = mutate(&mut buckets)?;
                let counts = self.commit(&mut buckets, today)?;
                Ok((value, counts))
            });
            outcome.map_err(|err| self.roll_back(&previous, err))
        })
    }

    fn roll_back(&self, previous: &FileSnapshot, err: StoreError) -> StoreError {
        match previous.restore() {
            Ok(0) => err,
            Ok(restored) => {
                warn!(error = %err, restored, "transaction rolled back");
                err
            }
            Err(restore) => {
                error!(error = %err, restore_error = %restore, "rollback failed");
                StoreError::RollbackFailed {
                    original: err.to_string(),
                    restore: restore.to_string(),
                }
            }
        }
    }

    /// Write buckets, rebuild the canonical file, gate on the audit when
    /// `today` is given, then render the projection.
    fn commit(&self, buckets: &mut StatusBuckets, today: Option<NaiveDate>) -> StoreResult<StatusCounts> {
        self.write_buckets(buckets)?;
        self.write_canonical(buckets)?;

        if let Some(today) = today {
            let report = self.audit_canonical(today)?;
            match report.verdict {
                Verdict::Severe => {
                    return Err(StoreError::AuditRejected {
                        issues: report.severe_issues(),
                    })
                }
                Verdict::StaleOnly => warn!(
                    stale = report.count(IssueCode::Stale),
                    "committed with stale active items"
                ),
                Verdict::Clean => {}
            }
        }

        let projection = self.renderer.render(buckets.bucket(Status::Active));
        write_atomic(&self.paths.runtime_projection, projection.as_bytes())?;
        Ok(buckets.counts())
    }

    fn audit_canonical(&self, today: NaiveDate) -> StoreResult<AuditReport> {
        self.engine
            .audit_file(&self.paths.canonical, today)
            .map_err(|source| StoreError::Document {
                path: self.paths.canonical.clone(),
                source,
            })
    }

    fn buckets_present(&self) -> bool {
        Status::ALL.iter().any(|s| self.paths.bucket(*s).exists())
    }

    fn ensure_unlocked(&self) -> StoreResult<EnsureOutcome> {
        let (mut buckets, outcome) = if self.buckets_present() {
            (self.read_buckets()?, EnsureOutcome::Normalized)
        } else if self.paths.canonical.exists() {
            let buckets = self.read_canonical()?;
            let outcome = EnsureOutcome::SeededFromCanonical {
                items: buckets.counts().total(),
            };
            (buckets, outcome)
        } else {
            (StatusBuckets::new(), EnsureOutcome::CreatedEmpty)
        };
        self.write_buckets(&mut buckets)?;
        debug!(?outcome, "buckets ensured");
        Ok(outcome)
    }

    /// Bucket files are authoritative: an item whose `status` field
    /// disagrees with its bucket takes the bucket's status.
    fn read_buckets(&self) -> StoreResult<StatusBuckets> {
        if !self.buckets_present() {
            return self.read_canonical();
        }
        let mut buckets = StatusBuckets::new();
        for status in Status::ALL {
            let (items, invalid) = self.read_items(&self.paths.bucket(status))?;
            for mut item in items {
                if item.status != status {
                    warn!(
                        id = %item.id,
                        recorded = %item.status,
                        bucket = %status,
                        "status field disagrees with bucket; using bucket"
                    );
                    item.status = status;
                }
                buckets.insert(item);
            }
            for (record, errors) in invalid {
                buckets.insert_invalid(InvalidRecord {
                    bucket: status,
                    record,
                    errors,
                });
            }
        }
        Ok(buckets)
    }

    /// Buckets built from the canonical file. Invalid records go to the
    /// bucket their `status` names, or to pending.
    fn read_canonical(&self) -> StoreResult<StatusBuckets> {
        let (items, invalid) = self.read_items(&self.paths.canonical)?;
        let mut buckets = StatusBuckets::from_items(items);
        for (record, errors) in invalid {
            let bucket = record
                .get("status")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Status>().ok())
                .unwrap_or(Status::Pending);
            buckets.insert_invalid(InvalidRecord {
                bucket,
                record,
                errors,
            });
        }
        Ok(buckets)
    }

    fn write_buckets(&self, buckets: &mut StatusBuckets) -> StoreResult<()> {
        buckets.sort();
        for status in Status::ALL {
            self.write_items(
                &self.paths.bucket(status),
                buckets.bucket(status),
                buckets.invalid_in(status),
            )?;
        }
        Ok(())
    }

    fn write_canonical(&self, buckets: &StatusBuckets) -> StoreResult<()> {
        let invalid = buckets.invalid().iter().map(|r| &r.record);
        self.write_items(&self.paths.canonical, &buckets.flatten(), invalid)
    }

    /// Parse an item file record by record. Records that fail validation
    /// are returned verbatim with their errors; the audit gate reports
    /// them as `schema` issues. A missing file is an empty list.
    fn read_items(&self, path: &Path) -> StoreResult<(Vec<MemoryItem>, Vec<(Value, Vec<String>)>)> {
        let Some(bytes) = read_optional(path)? else {
            return Ok((Vec::new(), Vec::new()));
        };
        let document = |source: AuditError| StoreError::Document {
            path: path.to_path_buf(),
            source,
        };
        let text = String::from_utf8(bytes).map_err(|e| document(AuditError::Yaml(e.to_string())))?;
        let mut items = Vec::new();
        let mut invalid = Vec::new();
        for (index, record) in parse_document(&text).map_err(document)?.into_iter().enumerate() {
            match parse_record(index, &record) {
                Ok(item) => items.push(item),
                Err(RecordErrors { id, errors, .. }) => {
                    warn!(
                        path = %path.display(),
                        index,
                        id = id.as_deref().unwrap_or("-"),
                        errors = errors.len(),
                        "keeping invalid record verbatim"
                    );
                    invalid.push((record, errors));
                }
            }
        }
        Ok((items, invalid))
    }

    /// Write items followed by any raw records carried for the same file.
    fn write_items<'a>(
        &self,
        path: &Path,
        items: &[MemoryItem],
        raw: impl Iterator<Item = &'a Value>,
    ) -> StoreResult<()> {
        let mut records = items
            .iter()
            .map(serde_yaml::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        records.extend(raw.cloned());
        let yaml = serde_yaml::to_string(&records)?;
        write_atomic(path, yaml.as_bytes())?;
        Ok(())
    }
}
