use crate::roster::SenderCredential;

/// Cycles through the sender credentials, one per call, wrapping at the end.
///
/// The Nth call (1-indexed) yields the element at `(N - 1) % len`.
#[derive(Debug, Clone)]
pub struct SenderRotator {
    senders: Vec<SenderCredential>,
    cursor: usize,
}

impl SenderRotator {
    /// Returns `None` when there is nothing to rotate over.
    pub fn new(senders: Vec<SenderCredential>) -> Option<Self> {
        if senders.is_empty() {
            return None;
        }
        Some(Self { senders, cursor: 0 })
    }

    pub fn next_sender(&mut self) -> &SenderCredential {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.senders.len();
        &self.senders[index]
    }
}
