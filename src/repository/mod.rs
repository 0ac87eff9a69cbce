// SPDX-License-Identifier: MIT

//! Durable tracked-record storage (§4.C) and the advisory file lock that
//! guards it when multiple processes might share one store.

pub mod sqlite;

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use uuid::Uuid;

use crate::constants::{LOCK_FILE_NAME, LOCK_FORCE_RECLAIM_AFTER_SECS, LOCK_STALE_AFTER_SECS};
use crate::errors::{CoreResult, RepositoryError};
use crate::model::{ManagedHostname, PreservedPattern, Provider, RecordSource, TrackedRecord};

/// Optional filter applied to [`TrackedRecordRepository::list_by_provider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceFilter {
    pub source: Option<RecordSource>,
    pub managed_only: bool,
}

/// Durable, transactional storage of everything the engine owns (§3, §4.C).
///
/// Implementations must make every write atomic per provider batch: a
/// `BatchResult` from one provider is reflected by exactly one transaction,
/// so a cancelled pass never leaves a half-applied batch (§5 Cancellation).
#[async_trait]
pub trait TrackedRecordRepository: Send + Sync {
    async fn upsert(&self, record: TrackedRecord) -> CoreResult<()>;
    async fn clear_orphan(&self, provider_id: Uuid, external_id: &str) -> CoreResult<()>;
    async fn mark_orphan(
        &self,
        provider_id: Uuid,
        external_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<()>;
    async fn delete(&self, provider_id: Uuid, external_id: &str) -> CoreResult<()>;
    async fn list_by_provider(
        &self,
        provider_id: Uuid,
        filter: SourceFilter,
    ) -> CoreResult<Vec<TrackedRecord>>;
    async fn get(&self, provider_id: Uuid, external_id: &str) -> CoreResult<Option<TrackedRecord>>;

    async fn list_preserved(&self) -> CoreResult<Vec<PreservedPattern>>;
    async fn add_preserved(&self, pattern: PreservedPattern) -> CoreResult<()>;
    async fn remove_preserved(&self, pattern: &PreservedPattern) -> CoreResult<()>;

    async fn list_managed(&self) -> CoreResult<Vec<ManagedHostname>>;
    async fn add_managed(&self, hostname: ManagedHostname) -> CoreResult<()>;
    async fn remove_managed(&self, hostname: &str) -> CoreResult<()>;

    async fn list_providers(&self) -> CoreResult<Vec<Provider>>;
    async fn get_provider(&self, id: Uuid) -> CoreResult<Option<Provider>>;
    async fn upsert_provider(&self, provider: Provider) -> CoreResult<()>;
    async fn delete_provider(&self, id: Uuid) -> CoreResult<()>;

    async fn get_setting(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set_setting(&self, key: &str, value: &str) -> CoreResult<()>;
}

/// Encrypts/decrypts the credentials blob before it touches storage.
///
/// The default [`NoopCipher`] is a pass-through; deployments that need
/// encryption at rest provide their own implementation at wiring time (§3.2).
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8>;
}

pub struct NoopCipher;

impl Cipher for NoopCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        plaintext.to_vec()
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        ciphertext.to_vec()
    }
}

// ============================================================================
// File-based advisory lock
// ============================================================================

/// State machine for the advisory lock file: `UNLOCKED → OWNED(pid, t0) →
/// STALE(t0+Δ) → RECLAIMED` (§4.C, §5, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Owned,
    Stale,
}

struct LockFileContents {
    pid: u32,
    acquired_at: SystemTime,
}

impl LockFileContents {
    fn serialize(&self) -> String {
        let epoch = self
            .acquired_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        format!("{}\n{}\n", self.pid, epoch)
    }

    fn parse(raw: &str) -> Option<Self> {
        let mut lines = raw.lines();
        let pid: u32 = lines.next()?.trim().parse().ok()?;
        let epoch: u64 = lines.next()?.trim().parse().ok()?;
        Some(Self {
            pid,
            acquired_at: UNIX_EPOCH + Duration::from_secs(epoch),
        })
    }
}

/// Guards `<config_dir>/.trafegodns.lock`. Dropping the guard removes the
/// file, returning the state machine to `UNLOCKED`.
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Inspects the lock file's current state without acquiring it.
pub fn inspect_lock(config_dir: &Path) -> CoreResult<LockState> {
    let path = config_dir.join(LOCK_FILE_NAME);
    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LockState::Unlocked),
        Err(e) => return Err(RepositoryError::Io(e).into()),
    };
    let mut raw = String::new();
    file.read_to_string(&mut raw)
        .map_err(RepositoryError::Io)?;
    let Some(contents) = LockFileContents::parse(&raw) else {
        return Ok(LockState::Stale);
    };
    let age = SystemTime::now()
        .duration_since(contents.acquired_at)
        .unwrap_or_default();
    if age > Duration::from_secs(LOCK_STALE_AFTER_SECS) {
        Ok(LockState::Stale)
    } else {
        Ok(LockState::Owned)
    }
}

/// Acquires the advisory lock, reclaiming a stale or forcibly-expired lock
/// if present. Returns a guard that releases the lock on drop.
pub fn acquire_lock(config_dir: &Path) -> CoreResult<LockGuard> {
    let path = config_dir.join(LOCK_FILE_NAME);
    let contents = LockFileContents {
        pid: std::process::id(),
        acquired_at: SystemTime::now(),
    };

    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            file.write_all(contents.serialize().as_bytes())
                .map_err(RepositoryError::Io)?;
            return Ok(LockGuard { path });
        }
        Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => {
            return Err(RepositoryError::Io(e).into());
        }
        Err(_) => {}
    }

    // The file already exists: decide whether it is reclaimable.
    let existing = std::fs::read_to_string(&path).map_err(RepositoryError::Io)?;
    let reclaimable = match LockFileContents::parse(&existing) {
        None => true,
        Some(prior) => {
            let age = SystemTime::now()
                .duration_since(prior.acquired_at)
                .unwrap_or_default();
            age > Duration::from_secs(LOCK_FORCE_RECLAIM_AFTER_SECS)
        }
    };

    if !reclaimable {
        return Err(RepositoryError::LockFailed(format!(
            "lock held by another process, not yet stale: {}",
            path.display()
        ))
        .into());
    }

    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .map_err(RepositoryError::Io)?;
    file.write_all(contents.serialize().as_bytes())
        .map_err(RepositoryError::Io)?;
    Ok(LockGuard { path })
}
