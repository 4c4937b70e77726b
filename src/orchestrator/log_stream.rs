//! Bounded buffer of engine log lines fed by a push channel.

use crate::model::LogLine;
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedReceiver;

/// Hard cap on retained lines; older lines are dropped first.
pub const LOG_CAPACITY: usize = 1000;

pub struct LogStream {
    lines: VecDeque<LogLine>,
    capacity: usize,
    rx: Option<UnboundedReceiver<String>>,
}

impl Default for LogStream {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl LogStream {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(LOG_CAPACITY)),
            capacity: capacity.max(1),
            rx: None,
        }
    }

    /// Replace any existing subscription with `rx`.
    pub fn subscribe(&mut self, rx: UnboundedReceiver<String>) {
        self.unsubscribe();
        self.rx = Some(rx);
    }

    /// Stop receiving. Safe to call repeatedly or without a subscription.
    pub fn unsubscribe(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
    }

    #[cfg(test)]
    pub fn is_subscribed(&self) -> bool {
        self.rx.is_some()
    }

    /// Append a line stamped with the current time.
    pub fn on_line(&mut self, text: String) -> LogLine {
        let line = LogLine::now(text.trim_end_matches(['\r', '\n']).to_string());
        push_capped(&mut self.lines, line.clone(), self.capacity);
        line
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Next raw line from the subscription. Pends forever when unsubscribed;
    /// returns `None` once when the source closes, then drops the subscription.
    pub async fn recv(&mut self) -> Option<String> {
        match self.rx.as_mut() {
            Some(rx) => {
                let line = rx.recv().await;
                if line.is_none() {
                    self.rx = None;
                }
                line
            }
            None => futures::future::pending().await,
        }
    }
}

/// Push onto a ring, evicting from the front past `capacity`.
pub fn push_capped<T>(buf: &mut VecDeque<T>, item: T, capacity: usize) {
    buf.push_back(item);
    while buf.len() > capacity {
        buf.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn texts(stream: &LogStream) -> Vec<String> {
        stream.lines().map(|l| l.text.clone()).collect()
    }

    #[test]
    fn keeps_exactly_the_last_thousand_in_order() {
        let mut stream = LogStream::default();
        for i in 0..2500 {
            stream.on_line(format!("line {i}"));
            assert!(stream.len() <= LOG_CAPACITY);
        }
        let kept = texts(&stream);
        assert_eq!(kept.len(), LOG_CAPACITY);
        assert_eq!(kept.first().unwrap(), "line 1500");
        assert_eq!(kept.last().unwrap(), "line 2499");
        for (offset, text) in kept.iter().enumerate() {
            assert_eq!(text, &format!("line {}", 1500 + offset));
        }
    }

    #[test]
    fn strips_trailing_newline_only() {
        let mut stream = LogStream::default();
        stream.on_line("  indented message\n".into());
        assert_eq!(texts(&stream), vec!["  indented message"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mut stream = LogStream::default();
        stream.unsubscribe();
        let (_tx, rx) = mpsc::unbounded_channel();
        stream.subscribe(rx);
        assert!(stream.is_subscribed());
        stream.unsubscribe();
        stream.unsubscribe();
        assert!(!stream.is_subscribed());
    }

    #[tokio::test]
    async fn resubscribe_closes_previous_channel() {
        let mut stream = LogStream::default();
        let (old_tx, old_rx) = mpsc::unbounded_channel::<String>();
        stream.subscribe(old_rx);
        let (new_tx, new_rx) = mpsc::unbounded_channel::<String>();
        stream.subscribe(new_rx);

        assert!(old_tx.send("stale".into()).is_err());
        new_tx.send("fresh".into()).unwrap();
        assert_eq!(stream.recv().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn closed_source_ends_subscription() {
        let mut stream = LogStream::default();
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        stream.subscribe(rx);
        tx.send("last".into()).unwrap();
        drop(tx);
        assert_eq!(stream.recv().await.as_deref(), Some("last"));
        assert_eq!(stream.recv().await, None);
        assert!(!stream.is_subscribed());
    }

    #[test]
    fn clear_empties_buffer_but_keeps_subscription() {
        let mut stream = LogStream::default();
        let (_tx, rx) = mpsc::unbounded_channel();
        stream.subscribe(rx);
        stream.on_line("a".into());
        stream.clear();
        assert!(stream.is_empty());
        assert!(stream.is_subscribed());
    }
}
