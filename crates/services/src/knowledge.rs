//! Knowledge-base persistence.
//!
//! The whole collection plus the active-group id lives in one JSON file,
//! rewritten on every mutation. Startup rehydrates from it and falls
//! back to a fresh default set when the file is absent or corrupt.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::context::{KnowledgeBase, KnowledgeBaseSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

const KNOWLEDGE_FILE: &str = "knowledge_bases.json";

#[derive(Serialize, Deserialize)]
struct PersistedKnowledge {
    groups: Vec<KnowledgeBase>,
    active_id: Option<String>,
}

pub struct KnowledgeStore {
    dir: PathBuf,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::at(crate::default_store_dir())
    }

    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(KNOWLEDGE_FILE)
    }

    pub fn save(&self, set: &KnowledgeBaseSet) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let persisted = PersistedKnowledge {
            groups: set.groups().to_vec(),
            active_id: Some(set.active_id().to_string()),
        };
        let json = serde_json::to_string_pretty(&persisted)?;
        fs::write(self.path(), json)
            .with_context(|| format!("writing {}", self.path().display()))?;
        debug!(groups = set.groups().len(), "knowledge bases saved");
        Ok(())
    }

    /// Rehydrate the set. Never fails: absent, corrupt, or empty storage
    /// yields a fresh default set.
    pub fn load(&self) -> KnowledgeBaseSet {
        let content = match fs::read_to_string(self.path()) {
            Ok(content) => content,
            Err(_) => return KnowledgeBaseSet::with_default(),
        };
        match serde_json::from_str::<PersistedKnowledge>(&content) {
            Ok(persisted) => KnowledgeBaseSet::from_parts(persisted.groups, persisted.active_id),
            Err(e) => {
                warn!(error = %e, "knowledge-base file unreadable, starting fresh");
                KnowledgeBaseSet::with_default()
            }
        }
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}
