use crate::cooldown::ledger::CooldownPeriods;
use crate::cooldown::Identity;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Per-user cooldown bookkeeping.
///
/// Created lazily on first command attempt; never deleted by this service
/// (retention is an external concern).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCooldownRecord {
    /// Durable numeric id assigned by the store on first contact
    pub user_id: u64,
    /// Normalized ledger key
    pub identity: String,
    /// Name as last seen at the boundary
    pub display_name: String,
    pub last_request_at: Option<DateTime<Utc>>,
    pub is_supporter: bool,
    pub created_at: DateTime<Utc>,
}

impl UserCooldownRecord {
    fn new(user_id: u64, identity: &Identity, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            identity: identity.key().to_string(),
            display_name: identity.display_name().to_string(),
            last_request_at: None,
            is_supporter: false,
            created_at,
        }
    }

    /// Time left on this user's cooldown, or `None` when eligible.
    ///
    /// Eligible when the user has never requested, or when the elapsed time
    /// has reached the tier's period. Monotonic in `now`: once expired for a
    /// given `last_request_at`, it stays expired.
    pub fn cooldown_remaining(
        &self,
        now: DateTime<Utc>,
        periods: CooldownPeriods,
    ) -> Option<Duration> {
        let last = self.last_request_at?;
        let period = periods.for_record(self);
        let elapsed = now - last;
        if elapsed >= period {
            None
        } else {
            Some(period - elapsed)
        }
    }
}

/// Outcome of an atomic check-and-record attempt
#[derive(Debug, Clone)]
pub enum RequestAttempt {
    /// The timer was stamped; the caller may proceed
    Recorded(UserCooldownRecord),
    /// Still cooling down; nothing was mutated
    OnCooldown {
        record: UserCooldownRecord,
        retry_after: Duration,
    },
}

/// Persistent user record collaborator backing the cooldown ledger.
///
/// `try_record_request` is the linearization point for a single identity:
/// implementations must run the check and the timer update under per-identity
/// mutual exclusion, so two concurrent attempts can never both observe an
/// expired timer.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch or lazily create the record for an identity. Concurrent
    /// first-time access by the same identity must yield exactly one record.
    async fn get_or_create(
        &self,
        identity: &Identity,
    ) -> Result<UserCooldownRecord, StorageError>;

    /// Atomically stamp the request timer if the identity is eligible,
    /// otherwise report the remaining cooldown without mutating anything.
    async fn try_record_request(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
        periods: CooldownPeriods,
    ) -> Result<RequestAttempt, StorageError>;

    /// Unconditionally stamp the request timer, creating the record first
    /// if absent.
    async fn record_request(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<UserCooldownRecord, StorageError>;

    /// Flip the supporter tier for an identity
    async fn set_supporter(
        &self,
        identity: &Identity,
        is_supporter: bool,
    ) -> Result<UserCooldownRecord, StorageError>;
}

/// In-memory store used by tests and as a fallback when persistence is not
/// configured. Records live behind per-identity locks; the outer map lock is
/// held only for lookup and insert.
pub struct MemoryUserStore {
    users: parking_lot::Mutex<HashMap<String, Arc<parking_lot::Mutex<UserCooldownRecord>>>>,
    next_id: AtomicU64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: parking_lot::Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn entry(&self, identity: &Identity) -> Arc<parking_lot::Mutex<UserCooldownRecord>> {
        let mut users = self.users.lock();
        Arc::clone(users.entry(identity.key().to_string()).or_insert_with(|| {
            let user_id = self.next_id.fetch_add(1, Ordering::Relaxed);
            debug!(user_id, identity = identity.key(), "Created user record");
            Arc::new(parking_lot::Mutex::new(UserCooldownRecord::new(
                user_id,
                identity,
                Utc::now(),
            )))
        }))
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_or_create(
        &self,
        identity: &Identity,
    ) -> Result<UserCooldownRecord, StorageError> {
        Ok(self.entry(identity).lock().clone())
    }

    async fn try_record_request(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
        periods: CooldownPeriods,
    ) -> Result<RequestAttempt, StorageError> {
        let entry = self.entry(identity);
        let mut record = entry.lock();

        match record.cooldown_remaining(now, periods) {
            None => {
                record.last_request_at = Some(now);
                Ok(RequestAttempt::Recorded(record.clone()))
            }
            Some(retry_after) => Ok(RequestAttempt::OnCooldown {
                record: record.clone(),
                retry_after,
            }),
        }
    }

    async fn record_request(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<UserCooldownRecord, StorageError> {
        let entry = self.entry(identity);
        let mut record = entry.lock();
        record.last_request_at = Some(now);
        Ok(record.clone())
    }

    async fn set_supporter(
        &self,
        identity: &Identity,
        is_supporter: bool,
    ) -> Result<UserCooldownRecord, StorageError> {
        let entry = self.entry(identity);
        let mut record = entry.lock();
        record.is_supporter = is_supporter;
        Ok(record.clone())
    }
}

/// File-backed user store: a JSON array of records, loaded at startup and
/// written through on every mutation.
///
/// Cooldown decisions are serialized per identity only; unrelated identities
/// contend on nothing but the brief map guards and the shared file write.
pub struct JsonUserStore {
    path: PathBuf,
    users: RwLock<HashMap<String, UserCooldownRecord>>,
    identity_locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    write_lock: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl JsonUserStore {
    /// Load the store from `path`, creating parent directories as needed.
    /// A missing file is an empty store, not an error.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut users = HashMap::new();
        let mut next_id = 1u64;

        match fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<UserCooldownRecord> = serde_json::from_slice(&bytes)
                    .map_err(|source| StorageError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                for record in records {
                    next_id = next_id.max(record.user_id + 1);
                    users.insert(record.identity.clone(), record);
                }
                info!(
                    count = users.len(),
                    path = %path.display(),
                    "Loaded user records"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No existing user store, starting empty");
            }
            Err(source) => {
                return Err(StorageError::Read { path, source });
            }
        }

        Ok(Self {
            path,
            users: RwLock::new(users),
            identity_locks: parking_lot::Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(next_id),
        })
    }

    fn identity_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.identity_locks.lock();
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Write the full record set to disk via a temp file and rename
    async fn persist(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let records: Vec<UserCooldownRecord> =
            self.users.read().await.values().cloned().collect();
        let json = serde_json::to_vec_pretty(&records)?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &json)
            .await
            .map_err(|source| StorageError::Write {
                path: tmp_path.clone(),
                source,
            })?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| StorageError::Write {
                path: self.path.clone(),
                source,
            })?;

        Ok(())
    }

    /// Fetch or create; caller must hold the identity lock
    async fn get_or_create_locked(
        &self,
        identity: &Identity,
    ) -> Result<UserCooldownRecord, StorageError> {
        if let Some(record) = self.users.read().await.get(identity.key()) {
            return Ok(record.clone());
        }

        let user_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = UserCooldownRecord::new(user_id, identity, Utc::now());
        self.users
            .write()
            .await
            .insert(identity.key().to_string(), record.clone());
        self.persist().await?;

        debug!(user_id, identity = identity.key(), "Created user record");
        Ok(record)
    }

    async fn update_record<F>(
        &self,
        identity: &Identity,
        apply: F,
    ) -> Result<UserCooldownRecord, StorageError>
    where
        F: FnOnce(&mut UserCooldownRecord),
    {
        let updated = {
            let mut users = self.users.write().await;
            let record =
                users
                    .get_mut(identity.key())
                    .ok_or_else(|| StorageError::MissingRecord {
                        identity: identity.key().to_string(),
                    })?;
            // Keep the boundary name fresh in case the casing changed
            record.display_name = identity.display_name().to_string();
            apply(record);
            record.clone()
        };
        self.persist().await?;
        Ok(updated)
    }
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn get_or_create(
        &self,
        identity: &Identity,
    ) -> Result<UserCooldownRecord, StorageError> {
        if let Some(record) = self.users.read().await.get(identity.key()) {
            return Ok(record.clone());
        }

        let lock = self.identity_lock(identity.key());
        let _guard = lock.lock().await;
        self.get_or_create_locked(identity).await
    }

    async fn try_record_request(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
        periods: CooldownPeriods,
    ) -> Result<RequestAttempt, StorageError> {
        let lock = self.identity_lock(identity.key());
        let _guard = lock.lock().await;

        let record = self.get_or_create_locked(identity).await?;
        match record.cooldown_remaining(now, periods) {
            None => {
                let updated = self
                    .update_record(identity, |r| r.last_request_at = Some(now))
                    .await?;
                Ok(RequestAttempt::Recorded(updated))
            }
            Some(retry_after) => Ok(RequestAttempt::OnCooldown {
                record,
                retry_after,
            }),
        }
    }

    async fn record_request(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<UserCooldownRecord, StorageError> {
        let lock = self.identity_lock(identity.key());
        let _guard = lock.lock().await;

        self.get_or_create_locked(identity).await?;
        self.update_record(identity, |r| r.last_request_at = Some(now))
            .await
    }

    async fn set_supporter(
        &self,
        identity: &Identity,
        is_supporter: bool,
    ) -> Result<UserCooldownRecord, StorageError> {
        let lock = self.identity_lock(identity.key());
        let _guard = lock.lock().await;

        self.get_or_create_locked(identity).await?;
        self.update_record(identity, |r| r.is_supporter = is_supporter)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn identity(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    fn periods() -> CooldownPeriods {
        CooldownPeriods {
            regular: Duration::milliseconds(120_000),
            supporter: Duration::milliseconds(60_000),
        }
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
    }

    #[tokio::test]
    async fn test_lazy_creation_defaults() {
        let store = MemoryUserStore::new();
        let record = store.get_or_create(&identity("NewViewer")).await.unwrap();

        assert_eq!(record.user_id, 1);
        assert_eq!(record.identity, "newviewer");
        assert_eq!(record.display_name, "NewViewer");
        assert!(record.last_request_at.is_none());
        assert!(!record.is_supporter);
    }

    #[tokio::test]
    async fn test_one_record_per_identity() {
        let store = Arc::new(MemoryUserStore::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.get_or_create(&identity("SameUser")).await.unwrap()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().user_id);
        }

        // Every concurrent first-time access resolved to the same record
        assert!(ids.iter().all(|&id| id == ids[0]));

        // Different casing maps to the same record too
        let same = store.get_or_create(&identity("sameuser")).await.unwrap();
        assert_eq!(same.user_id, ids[0]);
    }

    #[tokio::test]
    async fn test_try_record_request_is_check_and_stamp() {
        let store = MemoryUserStore::new();
        let user = identity("gate");

        // Fresh record: eligible, timer stamped
        let attempt = store
            .try_record_request(&user, at(0), periods())
            .await
            .unwrap();
        let record = match attempt {
            RequestAttempt::Recorded(r) => r,
            other => panic!("expected Recorded, got {:?}", other),
        };
        assert_eq!(record.last_request_at, Some(at(0)));

        // Within the window: rejected, timer untouched
        let attempt = store
            .try_record_request(&user, at(119_999), periods())
            .await
            .unwrap();
        match attempt {
            RequestAttempt::OnCooldown {
                record,
                retry_after,
            } => {
                assert_eq!(record.last_request_at, Some(at(0)));
                assert_eq!(retry_after, Duration::milliseconds(1));
            }
            other => panic!("expected OnCooldown, got {:?}", other),
        }

        // At the boundary the user is eligible again
        let attempt = store
            .try_record_request(&user, at(120_000), periods())
            .await
            .unwrap();
        assert!(matches!(attempt, RequestAttempt::Recorded(_)));
    }

    #[tokio::test]
    async fn test_supporter_period_applies() {
        let store = MemoryUserStore::new();
        let user = identity("patron");
        store.set_supporter(&user, true).await.unwrap();

        store
            .try_record_request(&user, at(0), periods())
            .await
            .unwrap();

        let attempt = store
            .try_record_request(&user, at(60_001), periods())
            .await
            .unwrap();
        assert!(matches!(attempt, RequestAttempt::Recorded(_)));
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let user = identity("Persistent");

        {
            let store = JsonUserStore::load(&path).await.unwrap();
            store.record_request(&user, at(500)).await.unwrap();
            store.set_supporter(&user, true).await.unwrap();
        }

        let reloaded = JsonUserStore::load(&path).await.unwrap();
        let record = reloaded.get_or_create(&user).await.unwrap();
        assert_eq!(record.user_id, 1);
        assert_eq!(record.last_request_at, Some(at(500)));
        assert!(record.is_supporter);

        // Id assignment continues past loaded records
        let next = reloaded
            .get_or_create(&identity("Another"))
            .await
            .unwrap();
        assert_eq!(next.user_id, 2);
    }

    #[tokio::test]
    async fn test_json_store_atomic_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonUserStore::load(dir.path().join("users.json"))
            .await
            .unwrap();
        let user = identity("racer");

        let attempt = store
            .try_record_request(&user, at(0), periods())
            .await
            .unwrap();
        assert!(matches!(attempt, RequestAttempt::Recorded(_)));

        let attempt = store
            .try_record_request(&user, at(100), periods())
            .await
            .unwrap();
        assert!(matches!(attempt, RequestAttempt::OnCooldown { .. }));
    }

    #[tokio::test]
    async fn test_update_without_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonUserStore::load(dir.path().join("users.json"))
            .await
            .unwrap();

        // Mutating an identity that was never created fails cleanly
        let result = store
            .update_record(&identity("ghost"), |r| r.is_supporter = true)
            .await;
        assert!(matches!(result, Err(StorageError::MissingRecord { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_store_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        tokio::fs::write(&path, b"{ not json ]").await.unwrap();

        let result = JsonUserStore::load(&path).await;
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }
}
