//! Bounded conversation history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Source;

/// One answered question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    /// Monotonic position within the session, starting at 0.
    pub position: u64,
    /// The question as asked.
    pub question: String,
    /// The answer that was returned.
    pub answer: String,
    /// Citations returned with the answer.
    pub sources: Vec<Source>,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Append-only FIFO of the most recent turns of one session.
///
/// Holds at most `capacity` turns; recording past that evicts the oldest.
/// Turns are never edited after being recorded.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
    next_position: u64,
}

impl ConversationMemory {
    /// Create an empty memory. A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { turns: VecDeque::with_capacity(capacity), capacity, next_position: 0 }
    }

    /// Append a turn, evicting the oldest if full. Returns its position.
    pub fn record(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
        sources: Vec<Source>,
    ) -> u64 {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        let position = self.next_position;
        self.next_position += 1;
        self.turns.push_back(ConversationTurn {
            position,
            question: question.into(),
            answer: answer.into(),
            sources,
            timestamp: Utc::now(),
        });
        position
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter().skip(self.turns.len().saturating_sub(n))
    }

    /// Every retained turn, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns are retained.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Most turns kept before the oldest is evicted.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every turn. Positions keep increasing afterwards.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(20)
    }
}
