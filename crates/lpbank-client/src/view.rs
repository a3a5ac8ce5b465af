//! What the client shows: a header and a bounded chat history.

use std::collections::VecDeque;

use crossterm::style::Stylize;
use lpbank_proto::{Envelope, Origin};

/// Lines kept before the oldest is discarded.
pub const HISTORY_LIMIT: usize = 200;

/// Chat history for one terminal.
#[derive(Debug, Clone)]
pub struct ChatView {
    role: Origin,
    history: VecDeque<String>,
    limit: usize,
}

impl ChatView {
    /// Empty view for a customer or teller terminal.
    pub fn new(role: Origin) -> Self {
        Self::with_limit(role, HISTORY_LIMIT)
    }

    /// Empty view keeping at most `limit` lines.
    pub fn with_limit(role: Origin, limit: usize) -> Self {
        Self { role, history: VecDeque::with_capacity(limit.min(HISTORY_LIMIT)), limit }
    }

    /// Append a received message, styled by who sent it.
    pub fn push(&mut self, envelope: &Envelope) {
        let line = match envelope.origin {
            Origin::Bank => envelope.message.as_str().yellow().to_string(),
            origin if origin == self.role => envelope.message.as_str().green().to_string(),
            _ => envelope.message.as_str().blue().to_string(),
        };
        self.push_line(line);
    }

    /// Append a locally generated notice.
    pub fn push_notice(&mut self, text: &str) {
        self.push_line(text.red().to_string());
    }

    fn push_line(&mut self, line: String) {
        if self.limit == 0 {
            return;
        }
        while self.history.len() >= self.limit {
            self.history.pop_front();
        }
        self.history.push_back(line);
    }

    /// Number of history lines held.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True if nothing has been received yet.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Header followed by history, ready for [`Terminal::render`](crate::Terminal::render).
    pub fn lines(&self) -> Vec<String> {
        let title = match self.role {
            Origin::Teller => "LP Bank | teller terminal",
            _ => "LP Bank | customer terminal",
        };
        let mut lines = Vec::with_capacity(self.history.len() + 2);
        lines.push(title.bold().to_string());
        lines.push("-".repeat(title.len()));
        lines.extend(self.history.iter().cloned());
        lines
    }
}
