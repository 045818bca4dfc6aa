//! The session controller: the state machine behind the UI.
//!
//! Owns all mutable session state (credential, mode, knowledge bases,
//! local context, transcript, suggestions, current book) and the
//! in-flight bookkeeping around it. Async work happens outside: the
//! controller hands out a pending handle describing the request, the
//! caller runs the gateway call, and feeds the result back in. Each
//! context change bumps a generation counter; completions carrying a
//! stale counter are dropped instead of writing into the new context.

use providers::book::strip_code_fence;
use providers::chat::{ChatOptions, ChatReply};
use providers::GatewayError;
use serde::Deserialize;
use services::credentials::CredentialStore;
use services::knowledge::KnowledgeStore;
use shared::book::Book;
use shared::chat::ChatMessage;
use shared::context::{ContextError, KnowledgeBaseSet, LocalContext};
use shared::credential::Credential;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Chat,
    Image,
    Book,
}

/// Why a send was refused. These are user-visible conditions, not
/// errors: nothing has changed when one comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRefused {
    NotLoggedIn,
    NotInChatMode,
    /// A chat request or suggestions fetch is still outstanding.
    Busy,
}

/// Handle for an in-flight chat request. Carries everything the gateway
/// call needs plus the epoch to check on completion.
#[derive(Debug, Clone)]
pub struct PendingChat {
    pub epoch: u64,
    pub placeholder_id: String,
    pub prompt: String,
    pub urls: Vec<String>,
    pub local: Option<LocalContext>,
    pub options: ChatOptions,
}

/// Handle for an in-flight suggestions fetch.
#[derive(Debug, Clone)]
pub struct PendingSuggestions {
    pub epoch: u64,
    pub urls: Vec<String>,
    pub local_text: Option<String>,
}

#[derive(Deserialize)]
struct SuggestionPayload {
    suggestions: Vec<String>,
}

pub struct SessionController {
    credential: Option<Credential>,
    mode: Mode,
    knowledge: KnowledgeBaseSet,
    local_context: Option<LocalContext>,
    transcript: Vec<ChatMessage>,
    suggestions: Vec<String>,
    book: Option<Book>,

    // Request-time chat settings.
    use_web_search: bool,
    thinking: bool,
    system_prompt: Option<String>,

    // In-flight bookkeeping. The epoch invalidates completions that
    // started under a previous context.
    epoch: u64,
    sending: bool,
    fetching_suggestions: bool,

    credential_store: CredentialStore,
    knowledge_store: KnowledgeStore,
}

impl SessionController {
    pub fn new(credential_store: CredentialStore, knowledge_store: KnowledgeStore) -> Self {
        Self {
            credential: None,
            mode: Mode::Chat,
            knowledge: KnowledgeBaseSet::with_default(),
            local_context: None,
            transcript: Vec::new(),
            suggestions: Vec::new(),
            book: None,
            use_web_search: false,
            thinking: true,
            system_prompt: None,
            epoch: 0,
            sending: false,
            fetching_suggestions: false,
            credential_store,
            knowledge_store,
        }
    }

    // ── Login state ──────────────────────────────────────────────────

    pub fn is_logged_in(&self) -> bool {
        self.credential.is_some()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Enter the logged-in state with an already-verified credential.
    /// Rehydrates knowledge bases from storage and resets the chat.
    pub fn complete_login(&mut self, credential: Credential) -> anyhow::Result<()> {
        self.credential_store.save(&credential)?;
        info!(email = %credential.email, "logged in");
        self.credential = Some(credential);
        self.knowledge = self.knowledge_store.load();
        self.mode = Mode::Chat;
        self.reset_chat_context();
        Ok(())
    }

    /// Leave the logged-in state, removing the stored credential and
    /// wiping the live key material.
    pub fn logout(&mut self) {
        self.credential_store.clear();
        if let Some(mut credential) = self.credential.take() {
            credential.api_key.zeroize();
        }
        self.transcript.clear();
        self.suggestions.clear();
        self.local_context = None;
        self.book = None;
        self.sending = false;
        self.fetching_suggestions = false;
        self.epoch += 1;
        info!("logged out");
    }

    // ── Mode ─────────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if mode == Mode::Chat {
            self.reset_chat_context();
        }
    }

    // ── Knowledge bases and local context ────────────────────────────

    pub fn knowledge(&self) -> &KnowledgeBaseSet {
        &self.knowledge
    }

    pub fn local_context(&self) -> Option<&LocalContext> {
        self.local_context.as_ref()
    }

    pub fn add_url(&mut self, url: &str) -> Result<(), ContextError> {
        let active = self.knowledge.active_id().to_string();
        self.knowledge.add_url(&active, url)?;
        self.persist_knowledge();
        self.reset_chat_context();
        Ok(())
    }

    pub fn remove_url(&mut self, url: &str) -> Result<(), ContextError> {
        let active = self.knowledge.active_id().to_string();
        self.knowledge.remove_url(&active, url)?;
        self.persist_knowledge();
        self.reset_chat_context();
        Ok(())
    }

    /// Create a group and make it active.
    pub fn add_group(&mut self, name: &str) -> Result<String, ContextError> {
        let id = self.knowledge.add_group(name)?;
        self.knowledge.set_active(&id);
        self.persist_knowledge();
        self.reset_chat_context();
        Ok(id)
    }

    pub fn remove_group(&mut self, id: &str) -> Result<(), ContextError> {
        let was_active = self.knowledge.active_id() == id;
        self.knowledge.remove_group(id)?;
        self.persist_knowledge();
        if was_active {
            self.reset_chat_context();
        }
        Ok(())
    }

    pub fn rename_group(&mut self, id: &str, name: &str) -> Result<(), ContextError> {
        self.knowledge.rename_group(id, name)?;
        self.persist_knowledge();
        Ok(())
    }

    pub fn set_active_group(&mut self, id: &str) {
        if self.knowledge.set_active(id) {
            self.persist_knowledge();
            self.reset_chat_context();
        }
    }

    /// Attach a local context, silently replacing any existing one.
    pub fn set_local_context(&mut self, context: LocalContext) {
        self.local_context = Some(context);
        self.reset_chat_context();
    }

    pub fn clear_local_context(&mut self) {
        if self.local_context.take().is_some() {
            self.reset_chat_context();
        }
    }

    fn persist_knowledge(&self) {
        if let Err(e) = self.knowledge_store.save(&self.knowledge) {
            warn!(error = %e, "failed to persist knowledge bases");
        }
    }

    // ── Chat settings ────────────────────────────────────────────────

    pub fn set_web_search(&mut self, on: bool) {
        self.use_web_search = on;
    }

    pub fn set_thinking(&mut self, on: bool) {
        self.thinking = on;
    }

    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.system_prompt = prompt;
    }

    // ── Transcript and suggestions ───────────────────────────────────

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn is_busy(&self) -> bool {
        self.sending || self.fetching_suggestions
    }

    fn has_context(&self) -> bool {
        !self.knowledge.active().urls.is_empty() || self.local_context.is_some()
    }

    fn welcome_message(&self) -> ChatMessage {
        let group = &self.knowledge.active().name;
        let text = if self.has_context() {
            format!("Welcome! Ask me anything about \"{group}\".")
        } else {
            format!(
                "Welcome! \"{group}\" has no content yet. Add some URLs or attach \
                 a document, then ask away."
            )
        };
        ChatMessage::system(text)
    }

    /// Reset the transcript to a single welcome message and invalidate
    /// everything in flight. Called on every context change while in
    /// chat mode (and on entering chat mode).
    fn reset_chat_context(&mut self) {
        if self.mode != Mode::Chat {
            return;
        }
        self.epoch += 1;
        self.suggestions.clear();
        self.sending = false;
        self.fetching_suggestions = false;
        self.transcript = vec![self.welcome_message()];
        debug!(epoch = self.epoch, "chat context reset");
    }

    /// Start sending a chat message: appends the user message and a
    /// loading placeholder, and returns the request handle.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingChat, SendRefused> {
        if self.credential.is_none() {
            return Err(SendRefused::NotLoggedIn);
        }
        if self.mode != Mode::Chat {
            return Err(SendRefused::NotInChatMode);
        }
        if self.is_busy() {
            return Err(SendRefused::Busy);
        }

        self.suggestions.clear();
        self.transcript.push(ChatMessage::user(text));
        let placeholder = ChatMessage::loading();
        let placeholder_id = placeholder.id.clone();
        self.transcript.push(placeholder);
        self.sending = true;

        Ok(PendingChat {
            epoch: self.epoch,
            placeholder_id,
            prompt: text.to_string(),
            urls: self.knowledge.active().urls.clone(),
            local: self.local_context.clone(),
            options: ChatOptions {
                use_web_search: self.use_web_search,
                thinking: self.thinking,
                system_prompt: self.system_prompt.clone(),
            },
        })
    }

    /// Complete a chat request: the placeholder becomes the model's
    /// reply, or a system error message. Stale completions are dropped.
    pub fn finish_send(&mut self, pending: PendingChat, result: Result<ChatReply, GatewayError>) {
        if pending.epoch != self.epoch {
            debug!("dropping stale chat completion");
            return;
        }
        self.sending = false;

        let replacement = match result {
            Ok(reply) => ChatMessage::model(reply.text).with_retrieval(reply.retrieval),
            Err(e) => ChatMessage::system(e.to_string()),
        };
        if let Some(slot) = self
            .transcript
            .iter_mut()
            .find(|m| m.id == pending.placeholder_id)
        {
            *slot = replacement;
        } else {
            // Placeholder vanished with an old transcript; nothing to do.
            self.transcript.push(replacement);
        }
    }

    /// Start a suggestions fetch, if there is any context to suggest
    /// against and nothing else is in flight.
    pub fn begin_suggestions(&mut self) -> Option<PendingSuggestions> {
        if self.credential.is_none()
            || self.mode != Mode::Chat
            || self.is_busy()
            || !self.has_context()
        {
            return None;
        }
        self.fetching_suggestions = true;
        Some(PendingSuggestions {
            epoch: self.epoch,
            urls: self.knowledge.active().urls.clone(),
            local_text: self.local_context.as_ref().map(|c| c.content.clone()),
        })
    }

    /// Complete a suggestions fetch. The raw payload is parsed here; an
    /// unparseable payload just leaves the suggestion list empty.
    pub fn finish_suggestions(
        &mut self,
        pending: PendingSuggestions,
        result: Result<String, GatewayError>,
    ) {
        if pending.epoch != self.epoch {
            debug!("dropping stale suggestions");
            return;
        }
        self.fetching_suggestions = false;

        match result {
            Ok(raw) => match serde_json::from_str::<SuggestionPayload>(strip_code_fence(&raw)) {
                Ok(payload) => {
                    self.suggestions = payload.suggestions.into_iter().take(4).collect();
                }
                Err(e) => {
                    debug!(error = %e, "suggestions payload unparseable");
                    self.suggestions.clear();
                }
            },
            Err(e) => {
                debug!(error = %e, "suggestions fetch failed");
                self.suggestions.clear();
            }
        }
    }

    // ── Books ────────────────────────────────────────────────────────

    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    pub fn set_book(&mut self, book: Book) {
        self.book = Some(book);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::chat::Sender;
    use shared::chat::UrlRetrieval;
    use tempfile::TempDir;

    fn controller() -> (SessionController, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut ctl = SessionController::new(
            CredentialStore::at(dir.path().to_path_buf()),
            KnowledgeStore::at(dir.path().to_path_buf()),
        );
        ctl.complete_login(Credential::new("key", "me@example.com"))
            .unwrap();
        (ctl, dir)
    }

    #[test]
    fn login_resets_to_single_welcome_message() {
        let (ctl, _dir) = controller();
        assert_eq!(ctl.transcript().len(), 1);
        let msg = &ctl.transcript()[0];
        assert_eq!(msg.sender, Sender::System);
        assert!(msg.text.contains(KnowledgeBaseSet::DEFAULT_GROUP_NAME));
    }

    #[test]
    fn switching_groups_resets_transcript_with_new_name() {
        let (mut ctl, _dir) = controller();
        let id = ctl.add_group("Gardening").unwrap();
        ctl.set_active_group(&id);

        assert_eq!(ctl.transcript().len(), 1);
        assert!(ctl.transcript()[0].text.contains("Gardening"));
    }

    #[test]
    fn welcome_wording_reflects_context_presence() {
        let (mut ctl, _dir) = controller();
        assert!(ctl.transcript()[0].text.contains("no content yet"));

        ctl.add_url("https://example.com").unwrap();
        assert!(!ctl.transcript()[0].text.contains("no content yet"));
    }

    #[test]
    fn send_appends_user_and_placeholder_then_resolves() {
        let (mut ctl, _dir) = controller();
        let pending = ctl.begin_send("hello").unwrap();
        assert_eq!(ctl.transcript().len(), 3);
        assert!(ctl.transcript()[2].is_loading);
        assert!(ctl.is_busy());

        ctl.finish_send(
            pending,
            Ok(ChatReply {
                text: "hi there".to_string(),
                retrieval: vec![UrlRetrieval {
                    url: "https://example.com".to_string(),
                    status: "URL_RETRIEVAL_STATUS_SUCCESS".to_string(),
                }],
            }),
        );
        assert!(!ctl.is_busy());
        let last = &ctl.transcript()[2];
        assert_eq!(last.sender, Sender::Model);
        assert_eq!(last.text, "hi there");
        assert!(!last.is_loading);
        assert!(last.retrieval.is_some());
    }

    #[test]
    fn gateway_error_becomes_system_message() {
        let (mut ctl, _dir) = controller();
        let pending = ctl.begin_send("hello").unwrap();
        ctl.finish_send(pending, Err(GatewayError::QuotaExceeded));
        let last = ctl.transcript().last().unwrap();
        assert_eq!(last.sender, Sender::System);
        assert!(last.text.contains("quota"));
    }

    #[test]
    fn concurrent_send_is_refused_while_busy() {
        let (mut ctl, _dir) = controller();
        let _pending = ctl.begin_send("first").unwrap();
        assert!(matches!(ctl.begin_send("second"), Err(SendRefused::Busy)));
    }

    #[test]
    fn stale_completion_is_dropped_after_context_change() {
        let (mut ctl, _dir) = controller();
        let pending = ctl.begin_send("hello").unwrap();

        // Context changes mid-flight: transcript resets, epoch bumps.
        ctl.add_url("https://example.com").unwrap();
        assert_eq!(ctl.transcript().len(), 1);

        ctl.finish_send(
            pending,
            Ok(ChatReply {
                text: "late reply".to_string(),
                retrieval: Vec::new(),
            }),
        );
        // The late reply must not leak into the fresh transcript.
        assert_eq!(ctl.transcript().len(), 1);
        assert_eq!(ctl.transcript()[0].sender, Sender::System);
    }

    #[test]
    fn suggestions_require_context_and_parse_fenced_json() {
        let (mut ctl, _dir) = controller();
        assert!(ctl.begin_suggestions().is_none());

        ctl.add_url("https://example.com").unwrap();
        let pending = ctl.begin_suggestions().unwrap();
        ctl.finish_suggestions(
            pending,
            Ok("```json\n{\"suggestions\": [\"Q1\", \"Q2\", \"Q3\"]}\n```".to_string()),
        );
        assert_eq!(ctl.suggestions(), ["Q1", "Q2", "Q3"]);
    }

    #[test]
    fn unparseable_suggestions_leave_list_empty() {
        let (mut ctl, _dir) = controller();
        ctl.add_url("https://example.com").unwrap();
        let pending = ctl.begin_suggestions().unwrap();
        ctl.finish_suggestions(pending, Ok("I have some ideas!".to_string()));
        assert!(ctl.suggestions().is_empty());
        assert!(!ctl.is_busy());
    }

    #[test]
    fn stale_suggestions_are_dropped() {
        let (mut ctl, _dir) = controller();
        ctl.add_url("https://example.com").unwrap();
        let pending = ctl.begin_suggestions().unwrap();

        ctl.add_url("https://example.org").unwrap();
        ctl.finish_suggestions(pending, Ok(r#"{"suggestions": ["stale"]}"#.to_string()));
        assert!(ctl.suggestions().is_empty());
    }

    #[test]
    fn send_refused_when_logged_out_or_wrong_mode() {
        let (mut ctl, _dir) = controller();
        ctl.set_mode(Mode::Image);
        assert!(matches!(ctl.begin_send("hi"), Err(SendRefused::NotInChatMode)));

        ctl.logout();
        assert!(matches!(ctl.begin_send("hi"), Err(SendRefused::NotLoggedIn)));
    }

    #[test]
    fn entering_chat_mode_resets_transcript() {
        let (mut ctl, _dir) = controller();
        let pending = ctl.begin_send("hello").unwrap();
        ctl.finish_send(
            pending,
            Ok(ChatReply {
                text: "hi".to_string(),
                retrieval: Vec::new(),
            }),
        );
        assert_eq!(ctl.transcript().len(), 3);

        ctl.set_mode(Mode::Book);
        ctl.set_mode(Mode::Chat);
        assert_eq!(ctl.transcript().len(), 1);
        assert_eq!(ctl.transcript()[0].sender, Sender::System);
    }

    #[test]
    fn logout_drops_live_and_stored_credential() {
        let dir = TempDir::new().unwrap();
        let mut ctl = SessionController::new(
            CredentialStore::at(dir.path().to_path_buf()),
            KnowledgeStore::at(dir.path().to_path_buf()),
        );
        ctl.complete_login(Credential::new("key", "me@example.com"))
            .unwrap();
        ctl.logout();

        assert!(ctl.credential().is_none());
        // The on-disk copy is gone too: a fresh store reads logged out.
        assert!(CredentialStore::at(dir.path().to_path_buf()).load().is_none());
    }

    #[test]
    fn knowledge_survives_logout_and_login() {
        let dir = TempDir::new().unwrap();
        let mut ctl = SessionController::new(
            CredentialStore::at(dir.path().to_path_buf()),
            KnowledgeStore::at(dir.path().to_path_buf()),
        );
        ctl.complete_login(Credential::new("key", "me@example.com"))
            .unwrap();
        let id = ctl.add_group("Persistent").unwrap();
        ctl.logout();

        let mut ctl2 = SessionController::new(
            CredentialStore::at(dir.path().to_path_buf()),
            KnowledgeStore::at(dir.path().to_path_buf()),
        );
        ctl2.complete_login(Credential::new("key", "me@example.com"))
            .unwrap();
        assert_eq!(ctl2.knowledge().active_id(), id);
        assert!(ctl2.knowledge().groups().iter().any(|g| g.name == "Persistent"));
    }
}
