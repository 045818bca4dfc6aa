//! Knowledge bases and the attached local context.
//!
//! A knowledge base is a named, bounded list of reference URLs used to
//! scope chat prompts. The local context is a single block of plain text
//! (an uploaded file or pasted snippet) attached alongside it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Hard cap on URLs per knowledge base.
pub const MAX_URLS_PER_GROUP: usize = 20;

/// Validation failures for knowledge-base edits.
///
/// These are inline form errors: the operation that raised one has not
/// mutated any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("That doesn't look like a valid URL")]
    MalformedUrl,
    #[error("This URL is already in the knowledge base")]
    DuplicateUrl,
    #[error("A knowledge base can hold at most {MAX_URLS_PER_GROUP} URLs")]
    GroupFull,
    #[error("Name cannot be blank")]
    BlankName,
    #[error("At least one knowledge base must remain")]
    LastGroup,
    #[error("No such knowledge base")]
    UnknownGroup,
}

/// A named, user-curated list of reference URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    pub urls: Vec<String>,
}

impl KnowledgeBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            urls: Vec::new(),
        }
    }
}

/// A single attached block of plain text supplementing chat prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalContext {
    pub name: String,
    pub content: String,
}

/// The full knowledge-base collection plus which one is active.
///
/// Invariant: at least one group always exists, and `active_id` always
/// names one of them.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseSet {
    groups: Vec<KnowledgeBase>,
    active_id: String,
}

impl KnowledgeBaseSet {
    pub const DEFAULT_GROUP_NAME: &'static str = "My Knowledge Base";

    /// A fresh set holding a single default group.
    pub fn with_default() -> Self {
        let group = KnowledgeBase::new(Self::DEFAULT_GROUP_NAME);
        let active_id = group.id.clone();
        Self {
            groups: vec![group],
            active_id,
        }
    }

    /// Rebuild a set from persisted parts, repairing whatever is off:
    /// an empty group list becomes a default group, and an unknown or
    /// missing active id falls back to the first group.
    pub fn from_parts(groups: Vec<KnowledgeBase>, active_id: Option<String>) -> Self {
        if groups.is_empty() {
            return Self::with_default();
        }
        let active_id = active_id
            .filter(|id| groups.iter().any(|g| &g.id == id))
            .unwrap_or_else(|| groups[0].id.clone());
        Self { groups, active_id }
    }

    pub fn groups(&self) -> &[KnowledgeBase] {
        &self.groups
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active(&self) -> &KnowledgeBase {
        self.groups
            .iter()
            .find(|g| g.id == self.active_id)
            .expect("active id always names an existing group")
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeBase> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Switch the active group. Returns false if the id is unknown or
    /// already active (no change either way).
    pub fn set_active(&mut self, id: &str) -> bool {
        if id == self.active_id || !self.groups.iter().any(|g| g.id == id) {
            return false;
        }
        self.active_id = id.to_string();
        true
    }

    /// Append a URL to a group after validating it.
    pub fn add_url(&mut self, group_id: &str, url: &str) -> Result<(), ContextError> {
        let url = url.trim();
        let parsed = Url::parse(url).map_err(|_| ContextError::MalformedUrl)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ContextError::MalformedUrl);
        }
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or(ContextError::UnknownGroup)?;
        if group.urls.iter().any(|u| u == url) {
            return Err(ContextError::DuplicateUrl);
        }
        if group.urls.len() >= MAX_URLS_PER_GROUP {
            return Err(ContextError::GroupFull);
        }
        group.urls.push(url.to_string());
        Ok(())
    }

    /// Remove a URL from a group. Unknown URLs are ignored.
    pub fn remove_url(&mut self, group_id: &str, url: &str) -> Result<(), ContextError> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or(ContextError::UnknownGroup)?;
        group.urls.retain(|u| u != url);
        Ok(())
    }

    /// Create a new group and return its id.
    pub fn add_group(&mut self, name: &str) -> Result<String, ContextError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ContextError::BlankName);
        }
        let group = KnowledgeBase::new(name);
        let id = group.id.clone();
        self.groups.push(group);
        Ok(id)
    }

    /// Remove a group. Refuses to remove the last remaining one. If the
    /// removed group was active, the first remaining group becomes active.
    pub fn remove_group(&mut self, id: &str) -> Result<(), ContextError> {
        if self.groups.len() <= 1 {
            return Err(ContextError::LastGroup);
        }
        let pos = self
            .groups
            .iter()
            .position(|g| g.id == id)
            .ok_or(ContextError::UnknownGroup)?;
        self.groups.remove(pos);
        if self.active_id == id {
            self.active_id = self.groups[0].id.clone();
        }
        Ok(())
    }

    /// Rename a group. Blank names are rejected without mutating.
    pub fn rename_group(&mut self, id: &str, name: &str) -> Result<(), ContextError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ContextError::BlankName);
        }
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(ContextError::UnknownGroup)?;
        group.name = name.to_string();
        Ok(())
    }

    /// Split into persistable parts.
    pub fn into_parts(self) -> (Vec<KnowledgeBase>, String) {
        (self.groups, self.active_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_has_one_active_group() {
        let set = KnowledgeBaseSet::with_default();
        assert_eq!(set.groups().len(), 1);
        assert_eq!(set.active().name, KnowledgeBaseSet::DEFAULT_GROUP_NAME);
    }

    #[test]
    fn add_url_validates_shape() {
        let mut set = KnowledgeBaseSet::with_default();
        let id = set.active_id().to_string();
        assert_eq!(
            set.add_url(&id, "not a url"),
            Err(ContextError::MalformedUrl)
        );
        assert_eq!(
            set.add_url(&id, "ftp://example.com/file"),
            Err(ContextError::MalformedUrl)
        );
        assert!(set.add_url(&id, "https://example.com/page").is_ok());
        assert_eq!(set.active().urls.len(), 1);
    }

    #[test]
    fn duplicate_url_rejected_in_group_but_allowed_elsewhere() {
        let mut set = KnowledgeBaseSet::with_default();
        let first = set.active_id().to_string();
        let second = set.add_group("Other").unwrap();

        set.add_url(&first, "https://example.com").unwrap();
        assert_eq!(
            set.add_url(&first, "https://example.com"),
            Err(ContextError::DuplicateUrl)
        );
        // Same URL in a different group is fine.
        assert!(set.add_url(&second, "https://example.com").is_ok());
        assert_eq!(set.get(&first).unwrap().urls.len(), 1);
    }

    #[test]
    fn url_limit_leaves_group_unchanged() {
        let mut set = KnowledgeBaseSet::with_default();
        let id = set.active_id().to_string();
        for i in 0..MAX_URLS_PER_GROUP {
            set.add_url(&id, &format!("https://example.com/{i}")).unwrap();
        }
        assert_eq!(
            set.add_url(&id, "https://example.com/one-too-many"),
            Err(ContextError::GroupFull)
        );
        assert_eq!(set.active().urls.len(), MAX_URLS_PER_GROUP);
    }

    #[test]
    fn removing_last_group_is_refused() {
        let mut set = KnowledgeBaseSet::with_default();
        let id = set.active_id().to_string();
        assert_eq!(set.remove_group(&id), Err(ContextError::LastGroup));
        assert_eq!(set.groups().len(), 1);
    }

    #[test]
    fn removing_active_group_reassigns_to_first_remaining() {
        let mut set = KnowledgeBaseSet::with_default();
        let first = set.active_id().to_string();
        let second = set.add_group("Research").unwrap();
        set.set_active(&second);

        set.remove_group(&second).unwrap();
        assert_eq!(set.active_id(), first);
    }

    #[test]
    fn rename_rejects_blank_without_mutating() {
        let mut set = KnowledgeBaseSet::with_default();
        let id = set.active_id().to_string();
        assert_eq!(set.rename_group(&id, "   "), Err(ContextError::BlankName));
        assert_eq!(set.active().name, KnowledgeBaseSet::DEFAULT_GROUP_NAME);
        set.rename_group(&id, "Reading List").unwrap();
        assert_eq!(set.active().name, "Reading List");
    }

    #[test]
    fn from_parts_repairs_missing_active_id() {
        let a = KnowledgeBase::new("A");
        let first = a.id.clone();
        let set = KnowledgeBaseSet::from_parts(vec![a], Some("gone".into()));
        assert_eq!(set.active_id(), first);

        let empty = KnowledgeBaseSet::from_parts(Vec::new(), None);
        assert_eq!(empty.groups().len(), 1);
    }
}
