//! Credential persistence.
//!
//! One JSON file in the store dir. An absent or unreadable file means
//! "not logged in"; nothing here validates the key itself (the login
//! probe does that before anything is saved).

use anyhow::{Context, Result};
use shared::credential::Credential;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const CREDENTIAL_FILE: &str = "credential.json";

pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::at(crate::default_store_dir())
    }

    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIAL_FILE)
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let json = serde_json::to_string_pretty(credential)?;
        fs::write(self.path(), json)
            .with_context(|| format!("writing {}", self.path().display()))?;
        debug!(email = %credential.email, "credential saved");
        Ok(())
    }

    pub fn load(&self) -> Option<Credential> {
        let content = fs::read_to_string(self.path()).ok()?;
        let credential: Credential = serde_json::from_str(&content).ok()?;
        credential.logged_in.then_some(credential)
    }

    /// Remove the stored credential file. Wiping the in-memory key is the
    /// caller's job; it holds the live copy.
    pub fn clear(&self) {
        let _ = fs::remove_file(self.path());
        debug!("credential cleared");
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
