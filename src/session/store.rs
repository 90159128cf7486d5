//! File-backed session and preset storage
//!
//! Sessions and presets live in memory behind a lock and are flushed to JSON
//! files on every mutation. A failed flush is logged and does not fail the
//! caller's request.

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::session::{PresetInfo, UserSession};

pub struct SessionStore {
    sessions_path: PathBuf,
    presets_path: PathBuf,
    sessions: RwLock<HashMap<String, UserSession>>,
    presets: RwLock<HashMap<String, HashMap<Uuid, PresetInfo>>>,
}

impl SessionStore {
    pub fn new(sessions_path: impl Into<PathBuf>, presets_path: impl Into<PathBuf>) -> Self {
        let sessions_path = sessions_path.into();
        let presets_path = presets_path.into();
        Self {
            sessions: RwLock::new(load_map(&sessions_path)),
            presets: RwLock::new(load_map(&presets_path)),
            sessions_path,
            presets_path,
        }
    }

    /// Read-only snapshot of a caller's session, creating a default empty
    /// session on first contact.
    pub fn snapshot(&self, caller_id: &str) -> UserSession {
        if let Some(session) = self.sessions.read().get(caller_id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(caller_id.to_string())
            .or_insert_with(|| UserSession::new(caller_id))
            .clone();
        drop(sessions);
        self.flush_sessions();
        session
    }

    /// Apply a mutation to a caller's session, bumping `last_updated`
    pub fn mutate<F>(&self, caller_id: &str, f: F) -> UserSession
    where
        F: FnOnce(&mut UserSession),
    {
        let updated = {
            let mut sessions = self.sessions.write();
            let session = sessions
                .entry(caller_id.to_string())
                .or_insert_with(|| UserSession::new(caller_id));
            f(session);
            session.last_updated = Utc::now();
            session.clone()
        };
        self.flush_sessions();
        updated
    }

    pub fn save_preset(
        &self,
        caller_id: &str,
        name: String,
        description: Option<String>,
        config: Value,
    ) -> PresetInfo {
        let preset = PresetInfo {
            preset_id: Uuid::new_v4(),
            name,
            description,
            config,
            created_at: Utc::now(),
            last_used: None,
        };
        self.presets
            .write()
            .entry(caller_id.to_string())
            .or_default()
            .insert(preset.preset_id, preset.clone());
        self.flush_presets();
        preset
    }

    pub fn list_presets(&self, caller_id: &str) -> Vec<PresetInfo> {
        let presets = self.presets.read();
        let mut list: Vec<PresetInfo> = presets
            .get(caller_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by_key(|p| p.created_at);
        list
    }

    pub fn delete_preset(&self, caller_id: &str, preset_id: Uuid) -> bool {
        let removed = self
            .presets
            .write()
            .get_mut(caller_id)
            .and_then(|m| m.remove(&preset_id))
            .is_some();
        if removed {
            self.flush_presets();
        }
        removed
    }

    fn flush_sessions(&self) {
        let sessions = self.sessions.read();
        if let Err(e) = save_map(&self.sessions_path, &*sessions) {
            warn!(path = %self.sessions_path.display(), error = %e, "Failed to persist sessions");
        }
    }

    fn flush_presets(&self) {
        let presets = self.presets.read();
        if let Err(e) = save_map(&self.presets_path, &*presets) {
            warn!(path = %self.presets_path.display(), error = %e, "Failed to persist presets");
        }
    }
}

fn load_map<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable store file");
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

fn save_map<T: serde::Serialize>(path: &Path, map: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_json::to_string_pretty(map)?;
    std::fs::write(path, contents)?;
    Ok(())
}
