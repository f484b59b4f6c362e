use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::backend::DispatchError;

/// Greeting seeded as the first turn of every session.
pub const GREETING: &str = "Hello! I'm UniD3 chatbot. I can help you with questions about \
drug-disease relationships, drug effectiveness, and drug-target analysis based on our \
knowledge graph built from over 150,000 PubMed publications. How can I assist you today?";

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversational turn.
///
/// `created_at` is for display only; transcript order is store position.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Local>,
}

/// Append-only log of turns. Turns are never mutated or removed; ids come
/// from a per-store counter so two turns in one session cannot collide.
#[derive(Debug)]
pub struct MessageStore {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        let mut store = Self {
            messages: Vec::new(),
            next_id: 0,
        };
        store.push(Role::Assistant, GREETING.to_string());
        store
    }

    fn push(&mut self, role: Role, content: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message {
            id,
            role,
            content,
            created_at: Local::now(),
        });
        id
    }

    pub fn push_user(&mut self, content: String) -> u64 {
        self.push(Role::User, content)
    }

    pub fn push_assistant(&mut self, content: String) -> u64 {
        self.push(Role::Assistant, content)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Dispatch latch: `Sending` exactly while one backend call is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
}

/// The conversational session: the store plus the single-flight state
/// machine. Lives for one run of the client; nothing is persisted.
pub struct Session {
    store: MessageStore,
    phase: Phase,
}

impl Session {
    pub fn new() -> Self {
        Self {
            store: MessageStore::new(),
            phase: Phase::Idle,
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Sending
    }

    /// Guarded submit. Rejects blank input and anything arriving while a
    /// dispatch is outstanding; both are silent no-ops. On acceptance the
    /// user turn is appended immediately (before any network activity) and
    /// the session enters `Sending`. Returns the text to dispatch.
    pub fn submit(&mut self, input: &str) -> Option<String> {
        if self.phase == Phase::Sending {
            return None;
        }
        if input.trim().is_empty() {
            return None;
        }
        // Raw text, not the trimmed copy: the transcript and the request
        // carry what the user actually typed.
        self.store.push_user(input.to_string());
        self.phase = Phase::Sending;
        Some(input.to_string())
    }

    /// Fold the dispatch outcome back into the transcript and return to
    /// `Idle`. Failures become ordinary assistant turns; nothing is fatal
    /// to the session.
    pub fn resolve(&mut self, outcome: Result<String, DispatchError>) {
        match outcome {
            Ok(answer) => {
                self.store.push_assistant(answer);
            }
            Err(err) => {
                self.store
                    .push_assistant(format!("Sorry, there was an error: {}", err));
            }
        }
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_always_first() {
        let session = Session::new();
        let first = &session.messages()[0];
        assert_eq!(first.role, Role::Assistant);
        assert_eq!(first.content, GREETING);
    }

    #[test]
    fn blank_submit_is_a_no_op() {
        let mut session = Session::new();
        assert!(session.submit("").is_none());
        assert!(session.submit("   \t\n").is_none());
        assert_eq!(session.messages().len(), 1);
        assert!(!session.is_busy());
    }

    #[test]
    fn submit_appends_user_turn_and_latches() {
        let mut session = Session::new();
        let text = session.submit("is aspirin linked to stroke?");
        assert_eq!(text.as_deref(), Some("is aspirin linked to stroke?"));
        assert_eq!(session.messages().len(), 2);
        assert!(session.is_busy());
    }

    #[test]
    fn second_submit_while_busy_has_no_effect() {
        let mut session = Session::new();
        session.submit("first question").unwrap();
        assert!(session.submit("second question").is_none());
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn round_trip_appends_user_then_assistant() {
        let mut session = Session::new();
        session.submit("aspirin and heart disease?").unwrap();
        session.resolve(Ok("Yes, related.".to_string()));

        let messages = session.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "aspirin and heart disease?");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].content, "Yes, related.");
        assert!(!session.is_busy());
    }

    #[test]
    fn failure_becomes_an_assistant_apology() {
        let mut session = Session::new();
        session.submit("anything").unwrap();
        session.resolve(Err(DispatchError::Backend {
            status: 500,
            reason: "timeout".to_string(),
        }));

        let last = session.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.starts_with("Sorry, there was an error:"));
        assert!(last.content.contains("timeout"));
        assert!(!session.is_busy());

        // The session stays usable after a failure.
        assert!(session.submit("follow-up").is_some());
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut session = Session::new();
        session.submit("one").unwrap();
        session.resolve(Ok("answer one".to_string()));
        session.submit("two").unwrap();
        session.resolve(Ok("answer two".to_string()));

        let ids: Vec<u64> = session.messages().iter().map(|m| m.id).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
