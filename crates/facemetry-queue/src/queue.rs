//! Offline-first registration queue.
//!
//! Each sample goes `Captured → UploadAttempted → {Synced | Queued}`. Upload
//! failures never reach the caller as errors: the sample is recorded as
//! unsynced, added to the pending queue and the pending snapshot is rewritten.
//!
//! Records inside a class are kept in call order even when uploads finish out
//! of order: every call takes a sequence number before it suspends, and the
//! record is inserted at that position when the upload completes.

use crate::clock::ClockSource;
use crate::record::{CaptureMethod, SampleRecord};
use crate::store::{Persistence, PersistenceError, PENDING_KEY};
use crate::transport::{UploadError, UploadRequest, UploadTransport};
use facemetry_core::StatusCategory;
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassNameError {
    #[error("class name is empty")]
    Empty,
    #[error("class {0:?} already exists")]
    Duplicate(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("class {0:?} has not been added")]
    UnknownClass(String),
}

impl ClassNameError {
    pub fn category(&self) -> StatusCategory {
        StatusCategory::Validation
    }
}

impl RegisterError {
    pub fn category(&self) -> StatusCategory {
        StatusCategory::Validation
    }
}

/// Queue settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Fixed session identifier sent as `userId` with every upload.
    pub user_id: String,
    /// Store key for the pending snapshot.
    pub storage_key: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            user_id: Uuid::new_v4().to_string(),
            storage_key: PENDING_KEY.to_string(),
        }
    }
}

/// Where a registration ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationStatus {
    Synced,
    /// Upload failed; the record is pending. `persisted` is false if the
    /// snapshot could not be written and the sample is only held in memory.
    Queued { reason: UploadError, persisted: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub record: SampleRecord,
    pub status: RegistrationStatus,
}

impl RegistrationOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self.status, RegistrationStatus::Synced)
    }

    /// Failure category for status messages; `None` when synced.
    pub fn category(&self) -> Option<StatusCategory> {
        match &self.status {
            RegistrationStatus::Synced => None,
            RegistrationStatus::Queued { reason, .. } => Some(reason.category()),
        }
    }
}

/// Class name with its current sample count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSummary {
    pub name: String,
    pub samples: usize,
}

/// Result of one pass over the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    /// Pending records whose bytes the source could not supply.
    pub missing: usize,
    pub still_pending: usize,
}

/// Supplies file bytes for a pending record on retry.
pub trait SampleSource {
    fn load(&self, record: &SampleRecord) -> Option<Vec<u8>>;
}

#[derive(Debug, Clone)]
struct Slot {
    seq: i64,
    record: SampleRecord,
}

fn insert_ordered(slots: &mut Vec<Slot>, slot: Slot) {
    let at = slots.partition_point(|s| s.seq < slot.seq);
    slots.insert(at, slot);
}

#[derive(Debug)]
struct ClassEntry {
    name: String,
    samples: Vec<Slot>,
}

/// Classes in insertion order, each with its samples in call order.
#[derive(Debug, Default)]
struct ClassRegistry {
    classes: Vec<ClassEntry>,
    active: Option<usize>,
}

impl ClassRegistry {
    fn position(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.name == name)
    }

    fn add(&mut self, name: &str) -> usize {
        self.classes.push(ClassEntry {
            name: name.to_string(),
            samples: Vec::new(),
        });
        self.classes.len() - 1
    }

    fn append(&mut self, slot: Slot) {
        let idx = match self.position(&slot.record.class_name) {
            Some(idx) => idx,
            None => self.add(&slot.record.class_name),
        };
        insert_ordered(&mut self.classes[idx].samples, slot);
    }

    fn mark_synced(&mut self, class_name: &str, seq: i64) {
        if let Some(idx) = self.position(class_name) {
            if let Some(slot) = self.classes[idx].samples.iter_mut().find(|s| s.seq == seq) {
                slot.record.synced = true;
            }
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    registry: ClassRegistry,
    /// Unsynced records, in call order.
    pending: Vec<Slot>,
    next_seq: i64,
    /// Lowest sequence number handed out so far.
    first_seq: i64,
    durable: bool,
    /// Whether the stored snapshot has been read into `pending`. Until it
    /// has, the snapshot must not be overwritten.
    loaded: bool,
}

impl QueueState {
    fn take_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Place snapshot records ahead of everything already queued.
    fn seed_front(&mut self, records: Vec<SampleRecord>) {
        let base = self.first_seq - records.len() as i64;
        for (offset, mut record) in (0..).zip(records) {
            record.synced = false;
            let slot = Slot {
                seq: base + offset,
                record,
            };
            self.registry.append(slot.clone());
            insert_ordered(&mut self.pending, slot);
        }
        self.first_seq = base;
        self.loaded = true;
    }

    fn pending_records(&self) -> Vec<SampleRecord> {
        self.pending.iter().map(|s| s.record.clone()).collect()
    }
}

/// Registration queue over injected transport, store and clock.
pub struct RegistrationQueue<T, P, C> {
    transport: T,
    store: P,
    clock: C,
    config: QueueConfig,
    state: Mutex<QueueState>,
}

impl<T, P, C> RegistrationQueue<T, P, C>
where
    T: UploadTransport,
    P: Persistence,
    C: ClockSource,
{
    /// Build the queue and seed the pending queue from the store's snapshot.
    ///
    /// Seeded records are also placed in the class registry so every pending
    /// record is visible there. A missing or corrupt snapshot leaves the
    /// queue empty. An unreadable store marks the queue as non-durable; the
    /// read is retried before the first write so earlier records are merged
    /// in rather than overwritten.
    pub fn open(transport: T, store: P, clock: C, config: QueueConfig) -> Self {
        let mut state = QueueState {
            durable: true,
            ..QueueState::default()
        };

        match load_snapshot(&store, &config.storage_key) {
            Ok(records) => {
                state.seed_front(records);
                tracing::info!(
                    pending = state.pending.len(),
                    key = %config.storage_key,
                    "pending queue loaded"
                );
            }
            Err(e @ PersistenceError::Corrupt { .. }) => {
                tracing::warn!(error = %e, "discarding corrupt pending snapshot");
                state.loaded = true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "pending snapshot unavailable; continuing in memory");
                state.durable = false;
            }
        }

        Self {
            transport,
            store,
            clock,
            config,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Add a class and make it active. Fails on an empty (after trimming) or
    /// already-present name.
    pub fn try_add_class(&self, name: &str) -> Result<(), ClassNameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClassNameError::Empty);
        }
        let mut state = self.lock();
        if state.registry.position(name).is_some() {
            return Err(ClassNameError::Duplicate(name.to_string()));
        }
        let idx = state.registry.add(name);
        state.registry.active = Some(idx);
        tracing::info!(class = name, "class added");
        Ok(())
    }

    /// [`try_add_class`](Self::try_add_class) reduced to success/failure.
    pub fn add_class(&self, name: &str) -> bool {
        match self.try_add_class(name) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "add_class rejected");
                false
            }
        }
    }

    /// Make an existing class active.
    pub fn select_class(&self, name: &str) -> bool {
        let mut state = self.lock();
        match state.registry.position(name.trim()) {
            Some(idx) => {
                state.registry.active = Some(idx);
                true
            }
            None => false,
        }
    }

    pub fn active_class(&self) -> Option<String> {
        let state = self.lock();
        state
            .registry
            .active
            .map(|idx| state.registry.classes[idx].name.clone())
    }

    /// Class names with sample counts, in insertion order.
    pub fn list_classes(&self) -> Vec<ClassSummary> {
        self.lock()
            .registry
            .classes
            .iter()
            .map(|c| ClassSummary {
                name: c.name.clone(),
                samples: c.samples.len(),
            })
            .collect()
    }

    /// All records of a class, in registration order.
    pub fn samples(&self, class_name: &str) -> Option<Vec<SampleRecord>> {
        let state = self.lock();
        let idx = state.registry.position(class_name.trim())?;
        Some(
            state.registry.classes[idx]
                .samples
                .iter()
                .map(|s| s.record.clone())
                .collect(),
        )
    }

    /// Unsynced records, in registration order.
    pub fn pending(&self) -> Vec<SampleRecord> {
        self.lock().pending_records()
    }

    /// False after a snapshot read or write failed and the pending queue is
    /// only held in memory.
    pub fn is_durable(&self) -> bool {
        self.lock().durable
    }

    /// Upload one sample; on failure record it as pending.
    pub async fn register_sample(
        &self,
        class_name: &str,
        file: Vec<u8>,
        file_name: &str,
        method: CaptureMethod,
    ) -> Result<RegistrationOutcome, RegisterError> {
        self.register_sample_until(class_name, file, file_name, method, std::future::pending())
            .await
    }

    /// Like [`register_sample`](Self::register_sample), but the upload is
    /// abandoned when `cancel` completes. A cancelled upload is queued like
    /// any other failure.
    pub async fn register_sample_until<F>(
        &self,
        class_name: &str,
        file: Vec<u8>,
        file_name: &str,
        method: CaptureMethod,
        cancel: F,
    ) -> Result<RegistrationOutcome, RegisterError>
    where
        F: Future<Output = ()>,
    {
        let class_name = class_name.trim();
        let (seq, mut record) = {
            let mut state = self.lock();
            if state.registry.position(class_name).is_none() {
                return Err(RegisterError::UnknownClass(class_name.to_string()));
            }
            let record = SampleRecord {
                id: Uuid::new_v4(),
                class_name: class_name.to_string(),
                method,
                file_name: file_name.to_string(),
                created_at: self.clock.now(),
                synced: false,
            };
            (state.take_seq(), record)
        };

        let request = UploadRequest {
            user_id: self.config.user_id.clone(),
            class_name: record.class_name.clone(),
            method,
            file_name: record.file_name.clone(),
            file,
        };

        let result = tokio::select! {
            r = self.transport.upload(request) => r,
            _ = cancel => Err(UploadError::Cancelled),
        };

        let mut state = self.lock();
        match result {
            Ok(()) => {
                record.synced = true;
                state.registry.append(Slot {
                    seq,
                    record: record.clone(),
                });
                tracing::info!(class = %record.class_name, file = %record.file_name, "sample synced");
                Ok(RegistrationOutcome {
                    record,
                    status: RegistrationStatus::Synced,
                })
            }
            Err(reason) => {
                let slot = Slot {
                    seq,
                    record: record.clone(),
                };
                state.registry.append(slot.clone());
                insert_ordered(&mut state.pending, slot);
                let persisted = self.persist(&mut state);
                tracing::warn!(
                    class = %record.class_name,
                    file = %record.file_name,
                    error = %reason,
                    category = %reason.category(),
                    persisted,
                    "upload failed; sample queued"
                );
                Ok(RegistrationOutcome {
                    record,
                    status: RegistrationStatus::Queued { reason, persisted },
                })
            }
        }
    }

    /// Re-attempt every pending record once, in order. Successful uploads are
    /// marked synced, leave the pending queue and the snapshot is rewritten.
    pub async fn retry_pending<S>(&self, source: &S) -> RetrySummary
    where
        S: SampleSource + ?Sized,
    {
        let pending: Vec<Slot> = self.lock().pending.clone();
        let mut summary = RetrySummary::default();

        for slot in pending {
            let record = &slot.record;
            let Some(file) = source.load(record) else {
                tracing::warn!(file = %record.file_name, "no bytes for pending sample; skipping");
                summary.missing += 1;
                continue;
            };
            summary.attempted += 1;

            let request = UploadRequest {
                user_id: self.config.user_id.clone(),
                class_name: record.class_name.clone(),
                method: record.method,
                file_name: record.file_name.clone(),
                file,
            };

            match self.transport.upload(request).await {
                Ok(()) => {
                    let mut state = self.lock();
                    state.registry.mark_synced(&record.class_name, slot.seq);
                    state.pending.retain(|s| s.seq != slot.seq);
                    self.persist(&mut state);
                    summary.synced += 1;
                    tracing::info!(class = %record.class_name, file = %record.file_name, "pending sample synced");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(file = %record.file_name, error = %e, "retry failed");
                }
            }
        }

        summary.still_pending = self.lock().pending.len();
        summary
    }

    /// Overwrite the pending snapshot. Returns whether the write succeeded.
    ///
    /// If the snapshot was never read, it is read and merged first; while it
    /// stays unreadable nothing is written.
    fn persist(&self, state: &mut QueueState) -> bool {
        if !state.loaded {
            match load_snapshot(&self.store, &self.config.storage_key) {
                Ok(records) => {
                    tracing::info!(merged = records.len(), "pending snapshot recovered");
                    state.seed_front(records);
                }
                Err(e @ PersistenceError::Corrupt { .. }) => {
                    tracing::warn!(error = %e, "discarding corrupt pending snapshot");
                    state.loaded = true;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "pending snapshot still unreadable; not overwriting it"
                    );
                    state.durable = false;
                    return false;
                }
            }
        }

        let result = serde_json::to_string(&state.pending_records())
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))
            .and_then(|json| self.store.set(&self.config.storage_key, &json));

        match result {
            Ok(()) => {
                state.durable = true;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "pending snapshot write failed; queue held in memory");
                state.durable = false;
                false
            }
        }
    }
}

fn load_snapshot<P: Persistence>(store: &P, key: &str) -> Result<Vec<SampleRecord>, PersistenceError> {
    match store.get(key)? {
        Some(json) => serde_json::from_str(&json).map_err(|e| PersistenceError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Pops one scripted result per upload; succeeds once the script runs out.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<(), UploadError>>>,
        requests: Mutex<Vec<UploadRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<(), UploadError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::default(),
            }
        }

        fn requests(&self) -> Vec<UploadRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl UploadTransport for ScriptedTransport {
        async fn upload(&self, request: UploadRequest) -> Result<(), UploadError> {
            self.requests.lock().unwrap().push(request);
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    /// Sleeps for the number of milliseconds encoded in the file bytes.
    struct DelayTransport;

    impl UploadTransport for DelayTransport {
        async fn upload(&self, request: UploadRequest) -> Result<(), UploadError> {
            let ms = request.file.first().copied().unwrap_or(0) as u64;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        }
    }

    struct NeverTransport;

    impl UploadTransport for NeverTransport {
        async fn upload(&self, _request: UploadRequest) -> Result<(), UploadError> {
            std::future::pending().await
        }
    }

    struct BrokenStore;

    impl Persistence for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, PersistenceError> {
            Err(PersistenceError::Unavailable("quota exceeded".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("quota exceeded".into()))
        }
    }

    /// Memory store whose first `read_failures` reads fail. Writes succeed.
    struct FlakyReads {
        inner: MemoryStore,
        read_failures: AtomicUsize,
    }

    impl FlakyReads {
        fn new(inner: MemoryStore, read_failures: usize) -> Self {
            Self {
                inner,
                read_failures: AtomicUsize::new(read_failures),
            }
        }

        fn stored_names(&self) -> Vec<String> {
            snapshot(&self.inner).into_iter().map(|r| r.file_name).collect()
        }
    }

    impl Persistence for FlakyReads {
        fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            let failing = self
                .read_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(PersistenceError::Unavailable("database is locked".into()));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
            self.inner.set(key, value)
        }
    }

    /// Store holding one pending record from an earlier session.
    fn store_with_old_sample() -> MemoryStore {
        let store = MemoryStore::new();
        let old = vec![SampleRecord {
            id: Uuid::new_v4(),
            class_name: "A".into(),
            method: CaptureMethod::Camera,
            file_name: "old.jpg".into(),
            created_at: clock().0,
            synced: false,
        }];
        store
            .set(PENDING_KEY, &serde_json::to_string(&old).unwrap())
            .unwrap();
        store
    }

    struct AllBytes;

    impl SampleSource for AllBytes {
        fn load(&self, _record: &SampleRecord) -> Option<Vec<u8>> {
            Some(vec![1, 2, 3])
        }
    }

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
    }

    fn config() -> QueueConfig {
        QueueConfig {
            user_id: "session-1".into(),
            storage_key: PENDING_KEY.into(),
        }
    }

    fn queue<T: UploadTransport>(transport: T) -> RegistrationQueue<T, MemoryStore, FixedClock> {
        RegistrationQueue::open(transport, MemoryStore::new(), clock(), config())
    }

    fn snapshot(store: &MemoryStore) -> Vec<SampleRecord> {
        serde_json::from_str(&store.get(PENDING_KEY).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_add_class_rejects_empty_and_duplicate() {
        let q = queue(ScriptedTransport::default());
        assert!(!q.add_class(""));
        assert!(!q.add_class("   "));
        assert!(q.add_class("X"));
        assert!(!q.add_class("X"));
        assert!(!q.add_class(" X "));
        assert_eq!(
            q.list_classes(),
            vec![ClassSummary {
                name: "X".into(),
                samples: 0
            }]
        );
    }

    #[test]
    fn test_try_add_class_reasons() {
        let q = queue(ScriptedTransport::default());
        assert_eq!(q.try_add_class(""), Err(ClassNameError::Empty));
        q.try_add_class("A").unwrap();
        let err = q.try_add_class("A").unwrap_err();
        assert_eq!(err, ClassNameError::Duplicate("A".into()));
        assert_eq!(err.category(), StatusCategory::Validation);
    }

    #[test]
    fn test_added_class_becomes_active() {
        let q = queue(ScriptedTransport::default());
        assert_eq!(q.active_class(), None);
        q.add_class("A");
        q.add_class("B");
        assert_eq!(q.active_class().as_deref(), Some("B"));
        assert!(q.select_class("A"));
        assert_eq!(q.active_class().as_deref(), Some("A"));
        assert!(!q.select_class("C"));
    }

    #[tokio::test]
    async fn test_two_failures_one_success() {
        let q = queue(ScriptedTransport::new(vec![
            Err(UploadError::Transport("offline".into())),
            Ok(()),
            Err(UploadError::Status(500)),
        ]));
        assert!(q.add_class("A"));

        for i in 0..3 {
            let outcome = q
                .register_sample("A", vec![i], &format!("s{i}.jpg"), CaptureMethod::Camera)
                .await
                .unwrap();
            assert_eq!(outcome.is_synced(), i == 1);
        }

        let samples = q.samples("A").unwrap();
        assert_eq!(samples.len(), 3);
        let unsynced: Vec<_> = samples.iter().filter(|r| !r.synced).cloned().collect();
        assert_eq!(unsynced.len(), 2);
        assert_eq!(q.pending(), unsynced);
        assert_eq!(snapshot(q.store()), q.pending());
        assert_eq!(q.list_classes()[0].samples, 3);
    }

    #[tokio::test]
    async fn test_upload_request_fields() {
        let q = queue(ScriptedTransport::default());
        q.add_class("A");
        q.register_sample("A", vec![9, 9], "face.png", CaptureMethod::Upload)
            .await
            .unwrap();
        let requests = q.transport().requests();
        assert_eq!(
            requests,
            vec![UploadRequest {
                user_id: "session-1".into(),
                class_name: "A".into(),
                method: CaptureMethod::Upload,
                file_name: "face.png".into(),
                file: vec![9, 9],
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_class_is_validation_error() {
        let q = queue(ScriptedTransport::default());
        let err = q
            .register_sample("nope", vec![], "a.jpg", CaptureMethod::Camera)
            .await
            .unwrap_err();
        assert_eq!(err, RegisterError::UnknownClass("nope".into()));
        assert_eq!(err.category(), StatusCategory::Validation);
        assert!(q.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_records_keep_call_order_when_uploads_race() {
        let q = queue(DelayTransport);
        q.add_class("A");
        let (first, second) = tokio::join!(
            q.register_sample("A", vec![60], "slow.jpg", CaptureMethod::Camera),
            q.register_sample("A", vec![0], "fast.jpg", CaptureMethod::Camera),
        );
        first.unwrap();
        second.unwrap();
        let names: Vec<_> = q
            .samples("A")
            .unwrap()
            .into_iter()
            .map(|r| r.file_name)
            .collect();
        assert_eq!(names, vec!["slow.jpg", "fast.jpg"]);
    }

    #[tokio::test]
    async fn test_cancelled_upload_is_queued() {
        let q = queue(NeverTransport);
        q.add_class("A");
        let outcome = q
            .register_sample_until("A", vec![1], "c.jpg", CaptureMethod::Camera, async {})
            .await
            .unwrap();
        assert_eq!(
            outcome.status,
            RegistrationStatus::Queued {
                reason: UploadError::Cancelled,
                persisted: true
            }
        );
        assert_eq!(outcome.category(), Some(StatusCategory::Transient));
        assert_eq!(q.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_queue_in_memory() {
        let q = RegistrationQueue::open(
            ScriptedTransport::new(vec![Err(UploadError::Status(400))]),
            BrokenStore,
            clock(),
            config(),
        );
        assert!(!q.is_durable());
        q.add_class("A");
        let outcome = q
            .register_sample("A", vec![1], "a.jpg", CaptureMethod::Upload)
            .await
            .unwrap();
        assert_eq!(
            outcome.status,
            RegistrationStatus::Queued {
                reason: UploadError::Status(400),
                persisted: false
            }
        );
        assert_eq!(outcome.category(), Some(StatusCategory::Permanent));
        assert_eq!(q.pending().len(), 1);
        assert!(!q.is_durable());

        // The queue stays usable.
        let next = q
            .register_sample("A", vec![2], "b.jpg", CaptureMethod::Upload)
            .await
            .unwrap();
        assert!(next.is_synced());
        assert_eq!(q.samples("A").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_open_seeds_registry_from_snapshot() {
        let store = MemoryStore::new();
        let records = vec![SampleRecord {
            id: Uuid::new_v4(),
            class_name: "A".into(),
            method: CaptureMethod::Camera,
            file_name: "old.jpg".into(),
            created_at: clock().0,
            synced: false,
        }];
        store
            .set(PENDING_KEY, &serde_json::to_string(&records).unwrap())
            .unwrap();

        let q = RegistrationQueue::open(ScriptedTransport::default(), store, clock(), config());
        assert_eq!(q.pending(), records);
        assert_eq!(q.samples("A").unwrap(), records);
        assert!(!q.add_class("A"));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let store = MemoryStore::new();
        store.set(PENDING_KEY, "{not json").unwrap();
        let q = RegistrationQueue::open(ScriptedTransport::default(), store, clock(), config());
        assert!(q.pending().is_empty());
        assert!(q.is_durable());
    }

    #[tokio::test]
    async fn test_retry_pending_syncs_and_rewrites_snapshot() {
        let q = queue(ScriptedTransport::new(vec![
            Err(UploadError::Transport("offline".into())),
            Err(UploadError::Transport("offline".into())),
            // retry pass: first succeeds, second fails again
            Ok(()),
            Err(UploadError::Status(503)),
        ]));
        q.add_class("A");
        q.register_sample("A", vec![1], "a.jpg", CaptureMethod::Camera)
            .await
            .unwrap();
        q.register_sample("A", vec![2], "b.jpg", CaptureMethod::Camera)
            .await
            .unwrap();
        assert_eq!(q.pending().len(), 2);

        let summary = q.retry_pending(&AllBytes).await;
        assert_eq!(
            summary,
            RetrySummary {
                attempted: 2,
                synced: 1,
                failed: 1,
                missing: 0,
                still_pending: 1
            }
        );

        let samples = q.samples("A").unwrap();
        assert!(samples[0].synced);
        assert!(!samples[1].synced);
        assert_eq!(q.pending(), vec![samples[1].clone()]);
        assert_eq!(snapshot(q.store()), q.pending());
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_never_overwritten() {
        let store = FlakyReads::new(store_with_old_sample(), usize::MAX);
        let q = RegistrationQueue::open(
            ScriptedTransport::new(vec![Err(UploadError::Transport("offline".into()))]),
            store,
            clock(),
            config(),
        );
        assert!(q.add_class("A"));
        let outcome = q
            .register_sample("A", vec![1], "new.jpg", CaptureMethod::Camera)
            .await
            .unwrap();

        assert_eq!(
            outcome.status,
            RegistrationStatus::Queued {
                reason: UploadError::Transport("offline".into()),
                persisted: false
            }
        );
        assert!(!q.is_durable());
        assert_eq!(q.store().stored_names(), vec!["old.jpg"]);
        assert_eq!(q.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_merged_before_first_write_after_failed_open() {
        let store = FlakyReads::new(store_with_old_sample(), 1);
        let q = RegistrationQueue::open(
            ScriptedTransport::new(vec![Err(UploadError::Status(503))]),
            store,
            clock(),
            config(),
        );
        assert!(q.pending().is_empty());
        assert!(!q.is_durable());

        assert!(q.add_class("A"));
        let outcome = q
            .register_sample("A", vec![1], "new.jpg", CaptureMethod::Camera)
            .await
            .unwrap();

        assert!(matches!(
            outcome.status,
            RegistrationStatus::Queued { persisted: true, .. }
        ));
        assert!(q.is_durable());
        assert_eq!(q.store().stored_names(), vec!["old.jpg", "new.jpg"]);
        let pending: Vec<_> = q.pending().into_iter().map(|r| r.file_name).collect();
        assert_eq!(pending, vec!["old.jpg", "new.jpg"]);
        let samples: Vec<_> = q
            .samples("A")
            .unwrap()
            .into_iter()
            .map(|r| r.file_name)
            .collect();
        assert_eq!(samples, vec!["old.jpg", "new.jpg"]);
    }
}
