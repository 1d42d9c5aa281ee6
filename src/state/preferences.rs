//! Preference storage for the player.
//!
//! Two values are remembered on behalf of the visitor: the playback volume,
//! which survives across sessions, and the unlocked flag, which belongs to a
//! single browsing session. The session runtime only talks to the
//! [`PreferenceStore`] trait; [`MemoryPreferences`] backs tests and the
//! simulator, [`FilePreferences`] keeps JSON files on disk.
//!
//! On-disk layout:
//!
//! ```text
//! <dir>/preferences.json          cross-session values
//! <dir>/sessions/<session-id>.json one record per session
//! ```

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{PlayerError, Result};

/// Name of the cross-session preferences file.
const PREFERENCES_FILE: &str = "preferences.json";

/// Directory holding one file per session.
const SESSIONS_DIR: &str = "sessions";

/// Extension for session files.
const SESSION_EXTENSION: &str = "json";

/// Persisted visitor preferences
pub trait PreferenceStore {
    /// Last volume chosen by the visitor, if any
    fn volume(&self) -> Option<f32>;

    fn set_volume(&mut self, volume: f32) -> Result<()>;

    /// Whether the current session already passed the entrance gate
    fn unlocked(&self) -> bool;

    fn set_unlocked(&mut self, unlocked: bool) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    volume: Option<f32>,
    unlocked: bool,
    volume_writes: usize,
    unlock_writes: usize,
}

/// In-memory preference store.
///
/// Clones share the same values, so a caller can hand one clone to a session
/// and inspect the writes through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that starts out as a returning session
    pub fn returning() -> Self {
        let prefs = Self::default();
        prefs.inner.borrow_mut().unlocked = true;
        prefs
    }

    pub fn with_volume(self, volume: f32) -> Self {
        self.inner.borrow_mut().volume = Some(volume);
        self
    }

    /// Number of `set_unlocked` calls seen
    pub fn unlock_writes(&self) -> usize {
        self.inner.borrow().unlock_writes
    }

    /// Number of `set_volume` calls seen
    pub fn volume_writes(&self) -> usize {
        self.inner.borrow().volume_writes
    }
}

impl PreferenceStore for MemoryPreferences {
    fn volume(&self) -> Option<f32> {
        self.inner.borrow().volume
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.volume = Some(volume);
        inner.volume_writes += 1;
        Ok(())
    }

    fn unlocked(&self) -> bool {
        self.inner.borrow().unlocked
    }

    fn set_unlocked(&mut self, unlocked: bool) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.unlocked = unlocked;
        inner.unlock_writes += 1;
        Ok(())
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Contents of `preferences.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    pub updated_at: DateTime<Utc>,
}

impl Default for StoredPreferences {
    fn default() -> Self {
        Self {
            volume: None,
            updated_at: Utc::now(),
        }
    }
}

/// Contents of `sessions/<id>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub unlocked: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            unlocked: false,
            started_at: now,
            updated_at: now,
        }
    }
}

/// Everything stored under a preferences directory
#[derive(Debug, Clone, Serialize)]
pub struct PreferencesSnapshot {
    pub preferences: Option<StoredPreferences>,
    pub sessions: Vec<SessionRecord>,
}

/// JSON-file preference store
#[derive(Debug, Clone)]
pub struct FilePreferences {
    dir: PathBuf,
    stored: StoredPreferences,
    session: SessionRecord,
}

impl FilePreferences {
    /// Open the store in `dir`.
    ///
    /// With a `session_id` whose record exists, that session is resumed.
    /// Otherwise a session is started with `unlocked = false`, under the given
    /// id or a fresh uuid. Nothing is written until a value changes.
    pub fn open(dir: &Path, session_id: Option<&str>) -> Result<Self> {
        let stored = match read_json::<StoredPreferences>(&dir.join(PREFERENCES_FILE))? {
            Some(stored) => stored,
            None => StoredPreferences::default(),
        };

        let session = match session_id {
            Some(id) => {
                validate_session_id(id)?;
                match read_json::<SessionRecord>(&session_path(dir, id))? {
                    Some(record) => {
                        debug!("Resuming session {} (unlocked: {})", id, record.unlocked);
                        record
                    }
                    None => SessionRecord::new(id.to_string()),
                }
            }
            None => SessionRecord::new(Uuid::new_v4().to_string()),
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            stored,
            session,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    fn save_preferences(&mut self) -> Result<()> {
        self.stored.updated_at = Utc::now();
        write_json(&self.dir, &self.dir.join(PREFERENCES_FILE), &self.stored)
    }

    fn save_session(&mut self) -> Result<()> {
        self.session.updated_at = Utc::now();
        let sessions_dir = self.dir.join(SESSIONS_DIR);
        let path = session_path(&self.dir, &self.session.id);
        write_json(&sessions_dir, &path, &self.session)
    }

    /// List session files, oldest file name first
    pub fn list_sessions(dir: &Path) -> Result<Vec<PathBuf>> {
        let sessions_dir = dir.join(SESSIONS_DIR);
        if !sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions: Vec<PathBuf> = WalkDir::new(&sessions_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry.path().extension().and_then(|ext| ext.to_str()) == Some(SESSION_EXTENSION)
            })
            .map(|entry| entry.path().to_path_buf())
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    /// Read everything stored under `dir`
    pub fn snapshot(dir: &Path) -> Result<PreferencesSnapshot> {
        let preferences = read_json::<StoredPreferences>(&dir.join(PREFERENCES_FILE))?;
        let mut sessions = Vec::new();
        for path in Self::list_sessions(dir)? {
            match read_json::<SessionRecord>(&path) {
                Ok(Some(record)) => sessions.push(record),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }
        sessions.sort_by_key(|record| record.started_at);
        Ok(PreferencesSnapshot {
            preferences,
            sessions,
        })
    }

    /// Delete session files not updated within `max_age`.
    ///
    /// Files that cannot be parsed are treated as stale. Returns the number of
    /// files removed.
    pub fn prune_sessions(dir: &Path, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;

        for path in Self::list_sessions(dir)? {
            let stale = match read_json::<SessionRecord>(&path) {
                Ok(Some(record)) => record.updated_at < cutoff,
                Ok(None) => false,
                Err(_) => true,
            };
            if stale {
                fs::remove_file(&path).map_err(|e| PlayerError::FileWriteError {
                    path: path.clone(),
                    source: e,
                })?;
                debug!("Pruned session file {}", path.display());
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Remove all stored preferences and sessions under `dir`
    pub fn reset(dir: &Path) -> Result<()> {
        let prefs_path = dir.join(PREFERENCES_FILE);
        if prefs_path.exists() {
            fs::remove_file(&prefs_path).map_err(|e| PlayerError::FileWriteError {
                path: prefs_path.clone(),
                source: e,
            })?;
        }

        let sessions_dir = dir.join(SESSIONS_DIR);
        if sessions_dir.exists() {
            fs::remove_dir_all(&sessions_dir).map_err(|e| PlayerError::FileWriteError {
                path: sessions_dir.clone(),
                source: e,
            })?;
        }

        Ok(())
    }
}

impl PreferenceStore for FilePreferences {
    fn volume(&self) -> Option<f32> {
        self.stored.volume
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.stored.volume = Some(volume);
        self.save_preferences()
    }

    fn unlocked(&self) -> bool {
        self.session.unlocked
    }

    fn set_unlocked(&mut self, unlocked: bool) -> Result<()> {
        self.session.unlocked = unlocked;
        self.save_session()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn session_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(SESSIONS_DIR)
        .join(format!("{}.{}", id, SESSION_EXTENSION))
}

/// Session ids become file names
fn validate_session_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PlayerError::InvalidConfig {
            reason: format!("invalid session id '{}'", id),
        })
    }
}

/// Read a JSON file, `None` when it does not exist
fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| PlayerError::FileReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_json<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| PlayerError::DirectoryCreateError {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).map_err(|e| PlayerError::FileWriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_shares_state_between_clones() {
        let prefs = MemoryPreferences::new();
        let mut handle = prefs.clone();

        assert_eq!(prefs.volume(), None);
        assert!(!prefs.unlocked());

        handle.set_volume(0.4).unwrap();
        handle.set_unlocked(true).unwrap();

        assert_eq!(prefs.volume(), Some(0.4));
        assert!(prefs.unlocked());
        assert_eq!(prefs.unlock_writes(), 1);
        assert_eq!(prefs.volume_writes(), 1);
    }

    #[test]
    fn test_memory_returning() {
        let prefs = MemoryPreferences::returning().with_volume(0.2);
        assert!(prefs.unlocked());
        assert_eq!(prefs.volume(), Some(0.2));
        assert_eq!(prefs.unlock_writes(), 0);
    }

    #[test]
    fn test_file_store_new_session_is_locked() {
        let temp = TempDir::new().unwrap();
        let prefs = FilePreferences::open(temp.path(), None).unwrap();

        assert!(!prefs.unlocked());
        assert_eq!(prefs.volume(), None);
        assert!(Uuid::parse_str(prefs.session_id()).is_ok());
        // Nothing written yet
        assert!(!temp.path().join(PREFERENCES_FILE).exists());
    }

    #[test]
    fn test_file_store_persists_volume_across_sessions() {
        let temp = TempDir::new().unwrap();
        let mut first = FilePreferences::open(temp.path(), None).unwrap();
        first.set_volume(0.35).unwrap();
        first.set_unlocked(true).unwrap();

        let second = FilePreferences::open(temp.path(), None).unwrap();
        assert_eq!(second.volume(), Some(0.35));
        assert!(!second.unlocked(), "unlock flag is per session");
        assert_ne!(first.session_id(), second.session_id());
    }

    #[test]
    fn test_file_store_resumes_session() {
        let temp = TempDir::new().unwrap();
        let mut first = FilePreferences::open(temp.path(), Some("visit-1")).unwrap();
        first.set_unlocked(true).unwrap();

        let resumed = FilePreferences::open(temp.path(), Some("visit-1")).unwrap();
        assert!(resumed.unlocked());
        assert!(temp.path().join("sessions").join("visit-1.json").exists());

        let other = FilePreferences::open(temp.path(), Some("visit-2")).unwrap();
        assert!(!other.unlocked());
    }

    #[test]
    fn test_file_store_rejects_path_like_session_id() {
        let temp = TempDir::new().unwrap();
        let err = FilePreferences::open(temp.path(), Some("../escape")).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_corrupt_preferences_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(PREFERENCES_FILE), "{ not json").unwrap();
        let err = FilePreferences::open(temp.path(), None).unwrap_err();
        assert_eq!(err.error_code(), "JSON_ERROR");
    }

    #[test]
    fn test_snapshot_and_reset() {
        let temp = TempDir::new().unwrap();
        let mut prefs = FilePreferences::open(temp.path(), Some("a")).unwrap();
        prefs.set_volume(0.5).unwrap();
        prefs.set_unlocked(true).unwrap();

        let snapshot = FilePreferences::snapshot(temp.path()).unwrap();
        assert_eq!(snapshot.preferences.map(|p| p.volume), Some(Some(0.5)));
        assert_eq!(snapshot.sessions.len(), 1);
        assert!(snapshot.sessions[0].unlocked);

        FilePreferences::reset(temp.path()).unwrap();
        let snapshot = FilePreferences::snapshot(temp.path()).unwrap();
        assert!(snapshot.preferences.is_none());
        assert!(snapshot.sessions.is_empty());
    }

    #[test]
    fn test_prune_sessions_removes_stale_records() {
        let temp = TempDir::new().unwrap();
        let sessions_dir = temp.path().join(SESSIONS_DIR);
        fs::create_dir_all(&sessions_dir).unwrap();

        let mut old = SessionRecord::new("old".to_string());
        old.updated_at = Utc::now() - Duration::days(3);
        fs::write(
            sessions_dir.join("old.json"),
            serde_json::to_string(&old).unwrap(),
        )
        .unwrap();
        fs::write(sessions_dir.join("broken.json"), "garbage").unwrap();

        let mut fresh = FilePreferences::open(temp.path(), Some("fresh")).unwrap();
        fresh.set_unlocked(true).unwrap();

        let removed = FilePreferences::prune_sessions(temp.path(), Duration::days(1)).unwrap();
        assert_eq!(removed, 2);

        let remaining = FilePreferences::list_sessions(temp.path()).unwrap();
        assert_eq!(remaining, vec![sessions_dir.join("fresh.json")]);
    }

    #[test]
    fn test_list_sessions_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(FilePreferences::list_sessions(temp.path()).unwrap().is_empty());
    }
}
