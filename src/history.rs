use serde::Serialize;

use crate::session::{Message, Role};

/// How many trailing turns accompany a query. Bounds request size and the
/// backend's context-window cost while keeping recent dialogue coherent.
pub const WINDOW_TURNS: usize = 6;

/// A turn as it crosses the network boundary: role and content only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// The last `WINDOW_TURNS` turns of the transcript, oldest first. Shorter
/// histories pass through whole; ids and timestamps never leave the client.
pub fn window(messages: &[Message]) -> Vec<Turn> {
    let start = messages.len().saturating_sub(WINDOW_TURNS);
    messages[start..]
        .iter()
        .map(|m| Turn {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MessageStore;

    fn store_with_turns(user_turns: usize) -> MessageStore {
        let mut store = MessageStore::new();
        for i in 0..user_turns {
            store.push_user(format!("question {}", i));
            store.push_assistant(format!("answer {}", i));
        }
        store
    }

    #[test]
    fn short_history_passes_through_whole() {
        let store = store_with_turns(1);
        // greeting + one exchange
        let turns = window(store.messages());
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::Assistant);
        assert_eq!(turns[1].content, "question 0");
        assert_eq!(turns[2].content, "answer 0");
    }

    #[test]
    fn long_history_keeps_the_most_recent_six() {
        let store = store_with_turns(5);
        let messages = store.messages();
        assert_eq!(messages.len(), 11);

        let turns = window(messages);
        assert_eq!(turns.len(), WINDOW_TURNS);
        // Truncation drops from the front; order is preserved.
        assert_eq!(turns[0].content, messages[5].content);
        assert_eq!(turns[5].content, "answer 4");
    }

    #[test]
    fn exactly_six_is_untouched() {
        let mut store = MessageStore::new();
        for i in 0..5 {
            store.push_user(format!("q{}", i));
        }
        let turns = window(store.messages());
        assert_eq!(turns.len(), 6);
        assert_eq!(turns[0].content, crate::session::GREETING);
    }

    #[test]
    fn windowing_is_idempotent() {
        let store = store_with_turns(7);
        assert_eq!(window(store.messages()), window(store.messages()));
    }
}
