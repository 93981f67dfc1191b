use std::path::PathBuf;

use archiver_config::{LockBackend, LockingConfig};
use archiver_dal::{advisory_lock_key, ConnectionPool, PgAdvisoryLock};
use archiver_types::LockRecord;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::{sync::watch, task::JoinHandle, time::Duration};

use crate::{error::ArchiverError, metrics::METRICS};

/// A held `(database, table)` lock.
#[derive(Debug)]
pub struct HeldLock {
    pub record: LockRecord,
    backend: LeaseBackend,
}

#[derive(Debug)]
enum LeaseBackend {
    Postgres(PgAdvisoryLock),
    File { path: PathBuf },
}

/// A lock with a running heartbeat task. The task owns the lock and hands it
/// back when the stop signal fires, so release always sees the final state.
#[derive(Debug)]
pub struct LockGuard {
    stop_sender: watch::Sender<bool>,
    heartbeat: JoinHandle<HeldLock>,
}

/// Mutual exclusion on a `(database, table)` target. Backends share the same
/// acquire/heartbeat/release surface:
///
/// - `postgresql`: non-blocking session advisory lock on a 64-bit hash of
///   the key; the heartbeat pings the session to keep it alive.
/// - `file`: a JSON lock record under the lock directory; an expired record
///   is stale and silently replaced; the heartbeat extends `expires_at`.
/// - `redis`: reserved, acquisition fails.
#[derive(Debug, Clone)]
pub struct LockManager {
    config: LockingConfig,
    owner: String,
}

impl LockManager {
    pub fn new(config: LockingConfig) -> Self {
        let owner = format!(
            "{}:{}",
            gethostname::gethostname().to_string_lossy(),
            std::process::id()
        );
        Self { config, owner }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Acquires the lock or fails with a lock error on contention. The
    /// postgresql backend needs the target database's pool.
    pub async fn acquire(
        &self,
        lock_key: &str,
        pool: Option<&ConnectionPool>,
    ) -> Result<HeldLock, ArchiverError> {
        let now = Utc::now();
        let record = LockRecord {
            lock_key: lock_key.to_string(),
            acquired_at: now,
            expires_at: now + ChronoDuration::seconds(self.config.ttl_seconds as i64),
            owner: self.owner.clone(),
        };

        match self.config.backend {
            LockBackend::Postgresql => {
                let pool = pool.ok_or_else(|| {
                    ArchiverError::configuration(
                        "postgresql locking requires a database connection pool",
                    )
                })?;
                let key = advisory_lock_key(lock_key);
                match pool.try_advisory_lock(key).await? {
                    Some(lock) => Ok(HeldLock {
                        record,
                        backend: LeaseBackend::Postgres(lock),
                    }),
                    None => Err(ArchiverError::lock(format!(
                        "lock already held for {lock_key} (advisory key {key})"
                    ))
                    .with_context("lock_key", lock_key)),
                }
            }
            LockBackend::File => {
                let path = self.lock_file_path(lock_key);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|err| {
                        ArchiverError::lock(format!("cannot create lock directory: {err}"))
                    })?;
                }
                match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let existing: Option<LockRecord> = serde_json::from_slice(&bytes).ok();
                        match existing {
                            Some(existing) if !existing.is_expired() => {
                                return Err(ArchiverError::lock(format!(
                                    "lock already held for {lock_key} by {}",
                                    existing.owner
                                ))
                                .with_context("lock_key", lock_key)
                                .with_context("holder", existing.owner));
                            }
                            Some(existing) => {
                                tracing::warn!(
                                    lock_key,
                                    stale_owner = %existing.owner,
                                    expired_at = %existing.expires_at,
                                    "Replacing stale lock file"
                                );
                            }
                            // An unreadable record counts as stale.
                            None => {
                                tracing::warn!(lock_key, "Replacing unreadable lock file");
                            }
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        return Err(ArchiverError::lock(format!(
                            "cannot read lock file {}: {err}",
                            path.display()
                        )))
                    }
                }

                let json = serde_json::to_vec_pretty(&record).expect("lock serialization");
                tokio::fs::write(&path, json).await.map_err(|err| {
                    ArchiverError::lock(format!("cannot write lock file {}: {err}", path.display()))
                })?;
                Ok(HeldLock {
                    record,
                    backend: LeaseBackend::File { path },
                })
            }
            LockBackend::Redis => Err(ArchiverError::lock(
                "redis locking is reserved and not implemented",
            )),
        }
    }

    /// Spawns the heartbeat task for a held lock. The heartbeat extends
    /// `expires_at` (file) or keeps the session alive (postgresql) every
    /// `heartbeat_interval_seconds` until the guard is released.
    pub fn start_heartbeat(&self, mut lock: HeldLock) -> LockGuard {
        let (stop_sender, mut stop_receiver) = watch::channel(false);
        let interval = Duration::from_secs(self.config.heartbeat_interval_seconds.max(1));
        let ttl = ChronoDuration::seconds(self.config.ttl_seconds as i64);

        let heartbeat = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            timer.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    _ = stop_receiver.changed() => break,
                }
                if let Err(err) = heartbeat_once(&mut lock, ttl).await {
                    METRICS.lock_heartbeat_failures.inc();
                    tracing::warn!(lock_key = %lock.record.lock_key, %err, "Lock heartbeat failed");
                }
            }
            lock
        });

        LockGuard {
            stop_sender,
            heartbeat,
        }
    }

    /// Stops the heartbeat and releases the lock. Idempotent at the backend
    /// level: releasing an already-released lock is not an error.
    pub async fn release(&self, guard: LockGuard) -> Result<(), ArchiverError> {
        let _ = guard.stop_sender.send(true);
        let lock = guard
            .heartbeat
            .await
            .map_err(|err| ArchiverError::lock(format!("heartbeat task panicked: {err}")))?;
        self.release_lock(lock).await
    }

    /// Releases a lock that never had a heartbeat started.
    pub async fn release_lock(&self, lock: HeldLock) -> Result<(), ArchiverError> {
        match lock.backend {
            LeaseBackend::Postgres(advisory) => {
                let held = advisory.release().await?;
                if !held {
                    tracing::warn!(
                        lock_key = %lock.record.lock_key,
                        "Advisory lock was not held at release"
                    );
                }
                Ok(())
            }
            LeaseBackend::File { path } => match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(ArchiverError::lock(format!(
                    "cannot remove lock file {}: {err}",
                    path.display()
                ))),
            },
        }
    }

    fn lock_file_path(&self, lock_key: &str) -> PathBuf {
        self.config
            .lock_dir
            .join(format!("{}.lock", lock_key.replace('/', "_")))
    }
}

async fn heartbeat_once(lock: &mut HeldLock, ttl: ChronoDuration) -> Result<(), ArchiverError> {
    match &mut lock.backend {
        LeaseBackend::Postgres(advisory) => {
            advisory.keep_alive().await?;
        }
        LeaseBackend::File { path } => {
            lock.record.expires_at = Utc::now() + ttl;
            let json = serde_json::to_vec_pretty(&lock.record).expect("lock serialization");
            tokio::fs::write(&mut *path, json).await.map_err(|err| {
                ArchiverError::lock(format!("cannot refresh lock file {}: {err}", path.display()))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn file_config(dir: &std::path::Path, ttl_seconds: u64) -> LockingConfig {
        LockingConfig {
            backend: LockBackend::File,
            ttl_seconds,
            heartbeat_interval_seconds: 30,
            lock_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn file_lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(file_config(dir.path(), 3600));

        let lock = manager.acquire("app/public.audit_logs", None).await.unwrap();
        assert!(dir.path().join("app_public.audit_logs.lock").exists());
        assert_eq!(lock.record.owner, manager.owner());

        manager.release_lock(lock).await.unwrap();
        assert!(!dir.path().join("app_public.audit_logs.lock").exists());
    }

    #[tokio::test]
    async fn file_lock_contention_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(file_config(dir.path(), 3600));

        let _held = manager.acquire("app/t", None).await.unwrap();
        assert_matches!(
            manager.acquire("app/t", None).await,
            Err(ArchiverError::Lock { .. })
        );
    }

    #[tokio::test]
    async fn stale_file_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(file_config(dir.path(), 3600));

        // Write a lock record that expired an hour ago.
        let stale = LockRecord {
            lock_key: "app/t".to_string(),
            acquired_at: Utc::now() - ChronoDuration::hours(2),
            expires_at: Utc::now() - ChronoDuration::hours(1),
            owner: "old_owner:1".to_string(),
        };
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(
            dir.path().join("app_t.lock"),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        let lock = manager.acquire("app/t", None).await.unwrap();
        assert_eq!(lock.record.owner, manager.owner());
    }

    #[tokio::test]
    async fn release_is_idempotent_when_file_is_already_gone() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(file_config(dir.path(), 3600));
        let lock = manager.acquire("app/t", None).await.unwrap();
        std::fs::remove_file(dir.path().join("app_t.lock")).unwrap();
        manager.release_lock(lock).await.unwrap();
    }

    #[tokio::test]
    async fn postgres_backend_requires_pool() {
        let manager = LockManager::new(LockingConfig::default());
        assert_matches!(
            manager.acquire("app/t", None).await,
            Err(ArchiverError::Configuration { .. })
        );
    }

    #[tokio::test]
    async fn redis_backend_is_reserved() {
        let manager = LockManager::new(LockingConfig {
            backend: LockBackend::Redis,
            ..LockingConfig::default()
        });
        assert_matches!(
            manager.acquire("app/t", None).await,
            Err(ArchiverError::Lock { .. })
        );
    }

    #[tokio::test]
    async fn heartbeat_extends_file_lock_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = file_config(dir.path(), 3600);
        config.heartbeat_interval_seconds = 1;
        let manager = LockManager::new(config);

        let lock = manager.acquire("app/t", None).await.unwrap();
        let initial_expiry = lock.record.expires_at;
        let guard = manager.start_heartbeat(lock);

        tokio::time::sleep(Duration::from_millis(1200)).await;

        let bytes = std::fs::read(dir.path().join("app_t.lock")).unwrap();
        let on_disk: LockRecord = serde_json::from_slice(&bytes).unwrap();
        assert!(on_disk.expires_at >= initial_expiry);

        manager.release(guard).await.unwrap();
        assert!(!dir.path().join("app_t.lock").exists());
    }
}
