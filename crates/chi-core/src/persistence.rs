//! JSON document persistence for the history store.
//!
//! The whole document is rewritten on every change. Encoding happens under
//! the store's lock; the bytes are then written to a sibling temp file and
//! renamed over the original, so a crash never leaves a half-written file
//! behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};
use crate::session::HistoryState;

/// Load the document, or start empty if the file does not exist yet
pub(crate) fn load(path: &Path) -> Result<HistoryState> {
    if !path.exists() {
        return Ok(HistoryState::default());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(HistoryState::default());
    }

    serde_json::from_str(&content).map_err(|e| {
        AgentError::Storage(format!("Failed to parse history at {}: {}", path.display(), e))
    })
}

/// Serialize the document
pub(crate) fn encode(state: &HistoryState) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(state)?)
}

/// Atomically replace the document at `path` with `doc`
pub(crate) fn write(path: &Path, doc: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(doc)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path).map_err(|e| {
        AgentError::Storage(format!("Failed to replace {}: {}", path.display(), e))
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::message::Role;
    use crate::session::{HistoryStore, SessionStore};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("history.json"), HistoryConfig::default()).unwrap();
        assert!(store.list_conversations(10).unwrap().is_empty());
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let first_id = {
            let store = SessionStore::open(&path, HistoryConfig::default()).unwrap();
            let id = store.append_message(Role::User, "install firefox").unwrap();
            store.append_message(Role::Assistant, "Installed.").unwrap();
            store.record_tool_output("install_app", &json!({"status": "installed"})).unwrap();
            id
        };

        let reopened = SessionStore::open(&path, HistoryConfig::default()).unwrap();
        let history = reopened.list_conversations(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, first_id);
        assert_eq!(history[0].message_count, 2);
        assert_eq!(reopened.list_tool_outputs(10).unwrap()[0].data, json!({"status": "installed"}));

        // A restart never resumes the previous conversation
        let next = reopened.append_message(Role::User, "again").unwrap();
        assert!(next > first_id);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_concurrent_appends_all_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let store = Arc::new(SessionStore::open(&path, HistoryConfig::default()).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store.append_message(Role::User, &format!("w{w}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let reopened = SessionStore::open(&path, HistoryConfig::default()).unwrap();
        let history = reopened.list_conversations(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message_count, 40);
        for w in 0..4 {
            let mine: Vec<String> = history[0]
                .messages
                .iter()
                .map(|m| m.content.clone())
                .filter(|c| c.starts_with(&format!("w{w}-")))
                .collect();
            let expected: Vec<String> = (0..10).map(|i| format!("w{w}-{i}")).collect();
            assert_eq!(mine, expected);
        }
    }

    #[test]
    fn test_failed_write_keeps_memory_copy() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let store = SessionStore::open(blocker.join("history.json"), HistoryConfig::default()).unwrap();

        assert!(store.append_message(Role::User, "hello").is_err());
        let history = store.list_conversations(10).unwrap();
        assert_eq!(history[0].messages[0].content, "hello");
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        let err = SessionStore::open(&path, HistoryConfig::default()).err().unwrap();
        assert!(matches!(err, AgentError::Storage(_)));
    }
}
