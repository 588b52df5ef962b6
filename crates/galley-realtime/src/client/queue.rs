//! Outbound FIFO held while the socket is down.

use std::collections::VecDeque;

use galley_core::OutboundMessage;

/// Messages waiting for an open socket, oldest first.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    messages: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    pub(crate) fn push(&mut self, message: OutboundMessage) {
        self.messages.push_back(message);
    }

    pub(crate) fn pop_front(&mut self) -> Option<OutboundMessage> {
        self.messages.pop_front()
    }

    /// Drop everything; returns how many messages were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.messages.len();
        self.messages.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }
}
