use std::collections::HashMap;

/// A message as handed out by [`Queue::receive`](crate::Queue::receive).
///
/// `receipt_handle` identifies this particular delivery; a redelivery of the
/// same message carries a new handle and the old one stops working.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    pub receipt_handle: String,
    pub attributes: HashMap<String, String>,
    /// How many times this message has been delivered, this delivery included.
    pub receive_count: u32,
}

impl QueueMessage {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

const RECEIPT_SEPARATOR: char = '#';

/// Build the receipt handle of one delivery from the message id and its lease token.
pub(crate) fn receipt_handle(message_id: &str, lease: &str) -> String {
    format!("{message_id}{RECEIPT_SEPARATOR}{lease}")
}

/// Split a receipt handle back into `(message_id, lease)`.
pub(crate) fn parse_receipt(handle: &str) -> Result<(&str, &str), crate::QueueError> {
    match handle.split_once(RECEIPT_SEPARATOR) {
        Some((id, lease)) if !id.is_empty() && !lease.is_empty() => Ok((id, lease)),
        _ => Err(crate::QueueError::InvalidReceipt(handle.to_string())),
    }
}
