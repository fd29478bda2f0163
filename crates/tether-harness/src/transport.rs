//! In-memory transport that records everything the connection sends.

use std::collections::VecDeque;

use tether_wire::{Event, OutgoingMessage, Response};
use tokio::sync::mpsc;

/// Captures the outgoing side of a connection so tests can assert on the
/// exact message stream the controller would have seen.
///
/// Registry mutations send synchronously on an unbounded channel, so after a
/// mutation (or an awaited `dispatch`) returns, everything it produced is
/// already observable. Lookups consume only the message they match; the rest
/// stays buffered for later assertions.
pub struct RecordingTransport {
    rx: mpsc::UnboundedReceiver<OutgoingMessage>,
    buffer: VecDeque<OutgoingMessage>,
}

impl RecordingTransport {
    pub fn new(rx: mpsc::UnboundedReceiver<OutgoingMessage>) -> Self {
        Self {
            rx,
            buffer: VecDeque::new(),
        }
    }

    fn pump(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.buffer.push_back(message);
        }
    }

    /// Take every message sent so far, in order.
    pub fn drain(&mut self) -> Vec<OutgoingMessage> {
        self.pump();
        self.buffer.drain(..).collect()
    }

    /// Take every event sent so far, dropping responses.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.drain()
            .into_iter()
            .filter_map(|m| match m {
                OutgoingMessage::Event(event) => Some(event),
                OutgoingMessage::Response(_) => None,
            })
            .collect()
    }

    /// Oldest pending message. Panics if the stream is empty.
    pub fn expect_next(&mut self) -> OutgoingMessage {
        self.pump();
        self.buffer
            .pop_front()
            .unwrap_or_else(|| panic!("expected a pending outgoing message, found none"))
    }

    /// Oldest pending event with this method, leaving everything else in the
    /// stream. Panics (listing what is pending) if no such event exists.
    pub fn expect_event(&mut self, method: &str) -> Event {
        self.pump();
        let found = self.buffer.iter().position(|message| {
            matches!(message, OutgoingMessage::Event(event) if event.method == method)
        });
        match found.and_then(|i| self.buffer.remove(i)) {
            Some(OutgoingMessage::Event(event)) => event,
            _ => panic!("expected event \"{method}\", pending: {:?}", self.buffer),
        }
    }

    /// The response with this id, leaving everything else in the stream.
    /// Panics (listing what is pending) if it has not been sent.
    pub fn expect_response(&mut self, id: u64) -> Response {
        self.pump();
        let found = self.buffer.iter().position(|message| {
            matches!(message, OutgoingMessage::Response(response) if response.id == id)
        });
        match found.and_then(|i| self.buffer.remove(i)) {
            Some(OutgoingMessage::Response(response)) => response,
            _ => panic!("expected response for id {id}, pending: {:?}", self.buffer),
        }
    }

    /// Assert the stream is currently empty.
    pub fn assert_empty(&mut self) {
        self.pump();
        assert!(
            self.buffer.is_empty(),
            "expected no pending messages, saw: {:?}",
            self.buffer
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_wire::Guid;

    fn transport_with(
        messages: Vec<OutgoingMessage>,
    ) -> RecordingTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        for message in messages {
            tx.send(message).unwrap();
        }
        RecordingTransport::new(rx)
    }

    #[test]
    fn lookups_keep_unmatched_messages() {
        let mut transport = transport_with(vec![
            Event::create(&Guid::root(), "Browser", &Guid::new("browser@1"), json!({})).into(),
            Response::result(1, json!({ "ok": true })).into(),
            Response::ack(2).into(),
        ]);

        // Pulling the middle response must not discard its neighbors.
        assert!(transport.expect_response(1).result.is_some());
        let event = transport.expect_event("__create__");
        assert_eq!(event.params["guid"], "browser@1");
        assert!(transport.expect_response(2).result.is_none());
        transport.assert_empty();
    }

    #[test]
    fn expect_next_pops_in_order() {
        let mut transport = transport_with(vec![
            Response::ack(1).into(),
            Response::ack(2).into(),
        ]);
        assert_eq!(transport.expect_next().as_response().unwrap().id, 1);
        assert_eq!(transport.expect_next().as_response().unwrap().id, 2);
    }

    #[test]
    #[should_panic(expected = "expected response for id 7")]
    fn missing_response_panics_with_pending_stream() {
        let mut transport = transport_with(vec![Response::ack(1).into()]);
        transport.expect_response(7);
    }
}
