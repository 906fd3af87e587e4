use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use weft_llm::{Message, Role};

use crate::error::HistoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Complete,
    /// Generation failed; the content holds whatever was produced plus an error marker.
    Error,
}

impl TurnStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TurnStatus {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(HistoryError::UnknownStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: TurnStatus,
}

impl ConversationTurn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            status: TurnStatus::Complete,
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn failed(mut self) -> Self {
        self.status = TurnStatus::Error;
        self
    }

    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }
}

/// Completed turns for one assistant, oldest first.
///
/// With a non-zero limit only the most recent `limit` turns are kept.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
    limit: usize,
}

impl ConversationHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` turns. `0` keeps everything.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            turns: Vec::new(),
            limit,
        }
    }

    #[must_use]
    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns, limit: 0 }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Replace all turns, keeping the limit.
    pub fn replace(&mut self, turns: Vec<ConversationTurn>) {
        self.turns = turns;
        self.trim();
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        self.trim();
    }

    /// Append a full exchange in one step so readers never observe half of it.
    pub fn commit_exchange(&mut self, user: ConversationTurn, reply: ConversationTurn) {
        self.turns.reserve(2);
        self.turns.push(user);
        self.turns.push(reply);
        self.trim();
    }

    fn trim(&mut self) {
        if self.limit > 0 && self.turns.len() > self.limit {
            let excess = self.turns.len() - self.limit;
            self.turns.drain(..excess);
        }
    }

    /// The last `max_history` turns, oldest first. `0` means the whole history.
    #[must_use]
    pub fn window(&self, max_history: usize) -> &[ConversationTurn] {
        if max_history == 0 {
            return &self.turns;
        }
        let start = self.turns.len().saturating_sub(max_history);
        &self.turns[start..]
    }

    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(n: usize) -> ConversationHistory {
        let mut h = ConversationHistory::new();
        for i in 0..n {
            h.push(ConversationTurn::user(format!("m{i}")));
        }
        h
    }

    #[test]
    fn window_keeps_most_recent_turns() {
        let h = history_of(5);
        let w = h.window(2);
        assert_eq!(w.len(), 2);
        assert_eq!(w[0].content, "m3");
        assert_eq!(w[1].content, "m4");
    }

    #[test]
    fn zero_window_is_unbounded() {
        assert_eq!(history_of(7).window(0).len(), 7);
    }

    #[test]
    fn window_larger_than_history() {
        assert_eq!(history_of(3).window(10).len(), 3);
    }

    #[test]
    fn commit_exchange_appends_pair() {
        let mut h = ConversationHistory::new();
        h.commit_exchange(
            ConversationTurn::user("2+2?"),
            ConversationTurn::assistant("4"),
        );
        assert_eq!(h.len(), 2);
        assert_eq!(h.turns()[0].role, Role::User);
        assert_eq!(h.turns()[1].to_message(), Message::assistant("4"));
        h.clear();
        assert!(h.is_empty());
    }

    #[test]
    fn limit_drops_oldest_turns() {
        let mut h = ConversationHistory::with_limit(3);
        for i in 0..2 {
            h.commit_exchange(
                ConversationTurn::user(format!("q{i}")),
                ConversationTurn::assistant(format!("a{i}")),
            );
        }
        let contents: Vec<&str> = h.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["a0", "q1", "a1"]);

        h.replace((0..5).map(|i| ConversationTurn::user(format!("m{i}"))).collect());
        assert_eq!(h.len(), 3);
        assert_eq!(h.turns()[0].content, "m2");
        assert_eq!(h.limit(), 3);
    }

    #[test]
    fn status_parses() {
        assert_eq!("error".parse::<TurnStatus>().unwrap(), TurnStatus::Error);
        assert!("partial".parse::<TurnStatus>().is_err());
        assert_eq!(
            ConversationTurn::assistant("x").failed().status,
            TurnStatus::Error
        );
    }
}
