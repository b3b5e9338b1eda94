use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use gemrelay_models::ModelRegistry;

use crate::turn::{Role, Turn};

/// One ongoing conversation with the backend.
///
/// Bound to the model variant that was active when the session was
/// created; a later global model switch does not re-bind it.
#[derive(Debug)]
pub struct ChatSession {
    chat_id: i64,
    model: String,
    history: Vec<Turn>,
}

impl ChatSession {
    pub fn new(chat_id: i64, model: impl Into<String>) -> Self {
        Self {
            chat_id,
            model: model.into(),
            history: Vec::new(),
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// The model variant id this session is bound to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn push(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Undo the most recent user turn, along with any partial model turn
    /// that followed it. Recovers a session after the backend aborted
    /// generation so the next attempt starts from clean history.
    pub fn rewind_last_turn(&mut self) {
        while matches!(self.history.last(), Some(t) if t.role == Role::Model) {
            self.history.pop();
        }
        if matches!(self.history.last(), Some(t) if t.role == Role::User) {
            self.history.pop();
        }
    }
}

/// Handle to a session, lockable across await points.
///
/// The tokio mutex serializes turns within one conversation: a second
/// message for the same chat waits until the in-flight relay finishes.
pub type SharedSession = Arc<tokio::sync::Mutex<ChatSession>>;

/// Owner of all live sessions, keyed by chat id.
///
/// At most one live session exists per chat; [`SessionStore::reset`]
/// atomically replaces it (the old session is discarded, not merged).
/// Sessions never expire on their own — process-lifetime only.
pub struct SessionStore {
    registry: Arc<ModelRegistry>,
    sessions: Mutex<HashMap<i64, SharedSession>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the live session for a chat, creating one bound to the
    /// currently active model variant if none exists.
    pub fn get_or_create(&self, chat_id: i64) -> SharedSession {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(sessions.entry(chat_id).or_insert_with(|| {
            let model = self.registry.active();
            Arc::new(tokio::sync::Mutex::new(ChatSession::new(chat_id, model)))
        }))
    }

    /// Discard any existing session for a chat. The next
    /// [`SessionStore::get_or_create`] starts fresh. An in-flight turn
    /// holding the old session handle keeps running against the
    /// detached session and is not interrupted.
    pub fn reset(&self, chat_id: i64) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(ModelRegistry::standard()))
    }

    #[tokio::test]
    async fn get_or_create_returns_same_session_for_same_chat() {
        let store = store();
        let a = store.get_or_create(42);
        let b = store.get_or_create(42);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_chat() {
        let store = store();
        let a = store.get_or_create(1);
        let b = store.get_or_create(2);
        assert!(!Arc::ptr_eq(&a, &b));
        a.lock().await.push(Turn::user("hi"));
        assert!(b.lock().await.history().is_empty());
    }

    #[tokio::test]
    async fn reset_discards_history() {
        let store = store();
        let session = store.get_or_create(42);
        session.lock().await.push(Turn::user("hi"));
        store.reset(42);
        let fresh = store.get_or_create(42);
        assert!(fresh.lock().await.history().is_empty());
    }

    #[tokio::test]
    async fn reset_does_not_disturb_a_held_session_handle() {
        let store = store();
        let held = store.get_or_create(42);
        held.lock().await.push(Turn::user("in flight"));
        store.reset(42);
        // The detached session is still usable by whoever holds it.
        assert_eq!(held.lock().await.history().len(), 1);
    }

    #[tokio::test]
    async fn session_binds_to_active_model_at_creation_only() {
        let registry = Arc::new(ModelRegistry::standard());
        let store = SessionStore::new(Arc::clone(&registry));

        let first = store.get_or_create(1);
        assert_eq!(first.lock().await.model(), "gemini-2.5-pro");

        assert!(registry.switch_active("gemini-2.5-flash"));
        // Existing session keeps its binding...
        assert_eq!(first.lock().await.model(), "gemini-2.5-pro");
        // ...new sessions pick up the switch.
        let second = store.get_or_create(2);
        assert_eq!(second.lock().await.model(), "gemini-2.5-flash");
    }

    #[test]
    fn rewind_removes_user_turn_and_partial_model_turn() {
        let mut session = ChatSession::new(1, "gemini-2.5-pro");
        session.push(Turn::user("q1"));
        session.push(Turn::model("a1"));
        session.push(Turn::user("q2"));
        session.push(Turn::model("partial"));
        session.rewind_last_turn();
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].text(), "a1");
    }

    #[test]
    fn rewind_without_partial_model_turn_removes_only_user_turn() {
        let mut session = ChatSession::new(1, "gemini-2.5-pro");
        session.push(Turn::user("q1"));
        session.push(Turn::model("a1"));
        session.push(Turn::user("q2"));
        session.rewind_last_turn();
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn rewind_on_empty_history_is_a_noop() {
        let mut session = ChatSession::new(1, "gemini-2.5-pro");
        session.rewind_last_turn();
        assert!(session.history().is_empty());
    }
}
