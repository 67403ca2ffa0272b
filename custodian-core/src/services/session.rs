//! Session manager - session lifecycle, duplicate detection and the store lock
//!
//! Only one import may mutate the store at a time. The lock is held by an
//! RAII guard, so every exit path (success, failure, abort, panic unwind)
//! releases it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;

use crate::domain::result::{Error, Result};
use crate::domain::{FileMeta, ImportSession, Institution, Position};
use crate::ports::{CommitOutcome, ImportBatch, ReplaceScope, Repository};
use crate::services::resolver::StagedEntities;

const LOCK_FILE: &str = "import.lock";

#[derive(Debug)]
pub enum LockError {
    /// Another import holds the lock
    Busy,
    Io(std::io::Error),
}

/// Held for the duration of one import
pub struct SessionLock<'a> {
    active: &'a Mutex<bool>,
    file: Option<File>,
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(error = %e, "failed to release import lock file");
            }
        }
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active = false;
    }
}

pub struct SessionManager {
    repository: Arc<dyn Repository>,
    active: Mutex<bool>,
    /// Cross-process lock file, when the store lives on disk
    lock_path: Option<PathBuf>,
}

impl SessionManager {
    pub fn new(repository: Arc<dyn Repository>, data_dir: Option<&Path>) -> Self {
        Self {
            repository,
            active: Mutex::new(false),
            lock_path: data_dir.map(|dir| dir.join(LOCK_FILE)),
        }
    }

    /// Take the exclusive import lock, failing fast when it is held
    pub fn lock(&self) -> std::result::Result<SessionLock<'_>, LockError> {
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if *active {
                return Err(LockError::Busy);
            }
            *active = true;
        }
        // From here on the guard resets the flag if the file lock fails
        let mut guard = SessionLock {
            active: &self.active,
            file: None,
        };

        if let Some(path) = &self.lock_path {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(path)
                .map_err(LockError::Io)?;
            if file.try_lock_exclusive().is_err() {
                return Err(LockError::Busy);
            }
            guard.file = Some(file);
        }
        Ok(guard)
    }

    /// A new pending session for a file
    pub fn begin(
        &self,
        meta: FileMeta,
        institution: &Institution,
        session_name: Option<&str>,
    ) -> ImportSession {
        let mut session = ImportSession::new(meta, Some(institution));
        if let Some(name) = session_name.map(str::trim).filter(|n| !n.is_empty()) {
            session.session_name = name.to_string();
        }
        session
    }

    /// The completed session that already imported these exact bytes
    pub fn find_duplicate(&self, meta: &FileMeta) -> Result<Option<ImportSession>> {
        self.repository.find_completed_session_by_hash(&meta.file_hash)
    }

    /// Complete the session and write everything in one transaction. The
    /// session is left untouched when the store rejects the batch.
    pub fn commit(
        &self,
        session: &mut ImportSession,
        staged: StagedEntities,
        positions: Vec<Position>,
        replace: Option<ReplaceScope>,
    ) -> Result<CommitOutcome> {
        let mut completed = session.clone();
        completed.complete().map_err(Error::validation)?;

        let batch = ImportBatch {
            session: completed,
            replace,
            accounts: staged.accounts,
            instruments: staged.instruments,
            positions,
        };
        let outcome = self.repository.commit_import(&batch)?;
        *session = batch.session;
        tracing::info!(
            session = %session.id,
            inserted = outcome.inserted_positions,
            removed = outcome.removed_positions,
            "import committed"
        );
        Ok(outcome)
    }

    /// Close the session as Failed and keep it as an audit record
    pub fn fail(&self, session: &mut ImportSession, reason: &str) -> Result<()> {
        session.fail(reason).map_err(Error::validation)?;
        tracing::warn!(session = %session.id, reason, "import failed");
        self.repository.record_session(session)
    }

    /// Delete positions in scope outside of an import
    pub fn replace_existing(&self, scope: &ReplaceScope) -> Result<usize> {
        let _lock = self.lock().map_err(|e| match e {
            LockError::Busy => Error::validation("another import is running against this store"),
            LockError::Io(e) => Error::Io(e),
        })?;
        let removed = self.repository.delete_positions(scope)?;
        tracing::info!(institution = %scope.institution_id, removed, "positions deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use tempfile::TempDir;

    fn manager(dir: Option<&Path>) -> SessionManager {
        let repo: Arc<dyn Repository> = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        SessionManager::new(repo, dir)
    }

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let dir = TempDir::new().unwrap();
        let sessions = manager(Some(dir.path()));
        {
            let _held = sessions.lock().unwrap();
            assert!(matches!(sessions.lock(), Err(LockError::Busy)));
        }
        assert!(sessions.lock().is_ok());
        assert!(dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_lock_file_shared_between_managers() {
        let dir = TempDir::new().unwrap();
        let first = manager(Some(dir.path()));
        let second = manager(Some(dir.path()));
        let _held = first.lock().unwrap();
        assert!(matches!(second.lock(), Err(LockError::Busy)));
    }

    #[test]
    fn test_failed_session_is_recorded_with_closed_counts() {
        let sessions = manager(None);
        let ubs = Institution::new("UBS", "UBS");
        let meta = FileMeta::from_bytes(Path::new("UBS_20241231.csv"), b"x");
        let mut session = sessions.begin(meta, &ubs, None);
        session.start().unwrap();
        session.total_rows = 4;
        session.record_success(crate::domain::RecordKind::Security);

        sessions.fail(&mut session, "aborted by user").unwrap();
        let stored = sessions.repository.get_sessions(5).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].failed_rows, 4);
        assert_eq!(stored[0].successful_rows, 0);
        assert!(sessions.find_duplicate(&FileMeta::from_bytes(Path::new("a"), b"x")).unwrap().is_none());
    }

    #[test]
    fn test_custom_session_name() {
        let sessions = manager(None);
        let ubs = Institution::new("UBS", "UBS");
        let meta = FileMeta::from_bytes(Path::new("a.csv"), b"x");
        assert_eq!(sessions.begin(meta.clone(), &ubs, None).session_name, "UBS a.csv");
        assert_eq!(sessions.begin(meta, &ubs, Some("Year end")).session_name, "Year end");
    }
}
