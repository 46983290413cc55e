//! Bounded message history

use std::collections::VecDeque;

use crate::message::ChatMessage;

/// FIFO ring of the newest `capacity` messages
///
/// Eviction counts entries, not payload bytes.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    entries: VecDeque<ChatMessage>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a message, evicting from the front past capacity
    pub fn push(&mut self, message: ChatMessage) {
        self.entries.push_back(message);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Independent copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_keeps_insertion_order() {
        let mut history = HistoryBuffer::new(3);
        history.push(ChatMessage::system("a"));
        history.push(ChatMessage::system("b"));
        assert_eq!(contents(&history.snapshot()), vec!["a", "b"]);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = HistoryBuffer::new(3);
        for i in 0..10 {
            history.push(ChatMessage::system(i.to_string()));
        }
        assert_eq!(history.snapshot().len(), 3);
        assert_eq!(contents(&history.snapshot()), vec!["7", "8", "9"]);
    }

    #[test]
    fn test_eviction_ignores_payload_size() {
        let mut history = HistoryBuffer::new(2);
        history.push(ChatMessage::system("x".repeat(1000)));
        history.push(ChatMessage::system("y"));
        assert_eq!(history.snapshot().len(), 2);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut history = HistoryBuffer::new(2);
        history.push(ChatMessage::system("first"));
        let before = history.snapshot();

        history.push(ChatMessage::system("second"));
        history.push(ChatMessage::system("third"));

        assert_eq!(contents(&before), vec!["first"]);
        assert_eq!(contents(&history.snapshot()), vec!["second", "third"]);
    }
}
