//! State persistence contract (spec.md §4.7).
//!
//! Subsystems register a serializer (and a listener to receive their slice
//! back on load) rather than persistence owning their shape directly --
//! the same seam `storage::database::Database`'s key-value table gives the
//! rest of the teacher codebase, generalized here to a whole-document
//! snapshot with an optional authoritative remote copy.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::discovery::Cadence;
use crate::error::{PersistenceError, Result};

pub type Serializer = Box<dyn Fn() -> Value + Send>;
pub type Listener = Box<dyn FnMut(&Value) + Send>;

struct Section {
    serializer: Serializer,
    listener: Listener,
}

/// Seam for an authoritative off-box copy of the state snapshot. Unlike
/// the local file, a depot write failure is not swallowed: the snapshot
/// is considered unpersisted until the depot accepts it.
pub trait RemoteDepot: Send {
    fn push(&self, snapshot: &Value) -> std::result::Result<(), String>;
}

/// Drives registered subsystems' state through a local JSON file and an
/// optional remote depot.
pub struct PersistenceManager {
    sections: BTreeMap<String, Section>,
    changed: bool,
    flush_cadence: Cadence,
    local_path: PathBuf,
    local_enabled: bool,
    depot: Option<Box<dyn RemoteDepot>>,
    failing_since: Option<i64>,
}

const FLUSH_GIVEUP_SECS: i64 = 10;

impl PersistenceManager {
    pub fn new(local_path: PathBuf) -> Self {
        Self {
            sections: BTreeMap::new(),
            changed: false,
            flush_cadence: Cadence::new(1),
            local_path,
            local_enabled: true,
            depot: None,
            failing_since: None,
        }
    }

    pub fn with_depot(mut self, depot: Box<dyn RemoteDepot>) -> Self {
        self.depot = Some(depot);
        self
    }

    pub fn set_local_enabled(&mut self, enabled: bool) {
        self.local_enabled = enabled;
    }

    /// Registers a named section. `serializer` produces this section's
    /// value on flush; `listener` is handed the restored value on
    /// [`Self::load`], or never invoked if the snapshot has no such key
    /// (a fresh deployment).
    pub fn register(&mut self, name: &str, serializer: Serializer, listener: Listener) {
        self.sections.insert(name.to_string(), Section { serializer, listener });
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Reads the local snapshot, if any. A missing file is not an error --
    /// a fresh deployment has nothing to restore.
    pub fn read_snapshot(&self) -> Result<Option<Value>> {
        match std::fs::read_to_string(&self.local_path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PersistenceError::LocalReadFailed {
                path: self.local_path.display().to_string(),
                message: err.to_string(),
            }
            .into()),
        }
    }

    /// Loads the local snapshot and dispatches each key to its registered
    /// section's listener.
    pub fn load(&mut self) -> Result<()> {
        let Some(root) = self.read_snapshot()? else {
            return Ok(());
        };
        for (name, section) in &mut self.sections {
            if let Some(value) = root.get(name) {
                (section.listener)(value);
            }
        }
        Ok(())
    }

    /// Flushes at most once per second, and only when something has
    /// changed since the last successful flush. Repeated failure for
    /// [`FLUSH_GIVEUP_SECS`] seconds drops the pending write rather than
    /// retrying forever.
    pub fn tick(&mut self, now: i64) {
        if !self.changed || !self.flush_cadence.due(now, false) {
            return;
        }

        let mut root = serde_json::Map::new();
        for (name, section) in &self.sections {
            root.insert(name.clone(), (section.serializer)());
        }
        self.attempt_flush(now, Value::Object(root));
    }

    /// Flushes a caller-assembled snapshot directly, bypassing the
    /// section registry. Useful for an aggregate that already owns its
    /// single document and has no separate per-subsystem serializers.
    /// Subject to the same once-a-second cadence as [`Self::tick`].
    pub fn flush_snapshot(&mut self, now: i64, snapshot: Value) -> bool {
        if !self.changed || !self.flush_cadence.due(now, false) {
            return false;
        }
        self.attempt_flush(now, snapshot)
    }

    fn attempt_flush(&mut self, now: i64, snapshot: Value) -> bool {
        let local_ok = !self.local_enabled || self.flush_local(&snapshot).is_ok();
        let depot_ok = match &self.depot {
            Some(depot) => depot.push(&snapshot).is_ok(),
            None => true,
        };

        if local_ok && depot_ok {
            self.changed = false;
            self.failing_since = None;
            return true;
        }

        let since = *self.failing_since.get_or_insert(now);
        if now - since >= FLUSH_GIVEUP_SECS {
            tracing::error!(
                elapsed_secs = now - since,
                "persistence: giving up on pending flush after repeated failures"
            );
            self.changed = false;
            self.failing_since = None;
        }
        false
    }

    fn flush_local(&self, snapshot: &Value) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.local_path, content).map_err(|err| PersistenceError::LocalWriteFailed {
            path: self.local_path.display().to_string(),
            message: err.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    #[test]
    fn flush_is_noop_until_marked_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut manager = PersistenceManager::new(path.clone());
        manager.tick(0);
        assert!(!path.exists());
    }

    #[test]
    fn flush_writes_registered_section_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut manager = PersistenceManager::new(path.clone());
        let restored = Rc::new(RefCell::new(None));
        let restored_clone = restored.clone();
        manager.register(
            "schedules",
            Box::new(|| serde_json::json!({"last_launch": 42})),
            Box::new(move |value| *restored_clone.borrow_mut() = Some(value.clone())),
        );
        manager.mark_changed();
        manager.tick(0);

        let content = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["schedules"]["last_launch"], 42);
    }

    #[test]
    fn cadence_limits_flush_to_once_per_second() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut manager = PersistenceManager::new(path.clone());
        manager.register("a", Box::new(|| serde_json::json!(1)), Box::new(|_| {}));
        manager.mark_changed();
        manager.tick(0);
        std::fs::remove_file(&path).unwrap();
        manager.mark_changed();
        manager.tick(0);
        assert!(!path.exists(), "second flush within the same second should be skipped");
        manager.tick(1);
        assert!(path.exists());
    }

    #[test]
    fn load_invokes_listener_with_restored_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"schedules":{"last_launch":7}}"#).unwrap();

        let mut manager = PersistenceManager::new(path);
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        manager.register(
            "schedules",
            Box::new(|| serde_json::json!({})),
            Box::new(move |value| *seen_clone.lock().unwrap() = Some(value.clone())),
        );
        manager.load().unwrap();
        assert_eq!(seen.lock().unwrap().as_ref().unwrap()["last_launch"], 7);
    }

    #[test]
    fn missing_local_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let mut manager = PersistenceManager::new(path);
        assert!(manager.load().is_ok());
    }

    #[test]
    fn depot_failure_keeps_changed_flag_until_giveup() {
        struct AlwaysFails;
        impl RemoteDepot for AlwaysFails {
            fn push(&self, _snapshot: &Value) -> std::result::Result<(), String> {
                Err("unreachable".to_string())
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut manager = PersistenceManager::new(path).with_depot(Box::new(AlwaysFails));
        manager.register("a", Box::new(|| serde_json::json!(1)), Box::new(|_| {}));
        manager.mark_changed();
        manager.tick(0);
        assert!(manager.changed, "depot failure should keep retrying");
        manager.tick(11);
        assert!(!manager.changed, "giveup window elapsed, pending write dropped");
    }
}
