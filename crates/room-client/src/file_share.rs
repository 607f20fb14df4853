//! Outgoing file shares.
//!
//! Files are size-checked before any encoding, sent as a base64 data URL,
//! and matched to the server's `file-share-ack` frames in send order.

use crate::errors::ClientError;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use common::types::RoomId;
use room_protocol::{ChatEntry, ClientEvent, FileShareAck};
use std::collections::VecDeque;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Fallback MIME type for files without one.
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// A file ready to send, plus the entry to show locally until the server's
/// copy reaches the other members.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedUpload {
    pub event: ClientEvent,
    pub local_entry: ChatEntry,
}

/// Encode `bytes` as a `file-share` event.
///
/// # Errors
///
/// `UploadTooLarge` if `bytes` exceeds `max_bytes`; nothing is encoded.
pub fn encode_upload(
    file_name: &str,
    file_type: &str,
    bytes: &[u8],
    username: &str,
    room: Option<RoomId>,
    max_bytes: usize,
) -> Result<EncodedUpload, ClientError> {
    if bytes.len() > max_bytes {
        return Err(ClientError::UploadTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let file_type = if file_type.is_empty() {
        DEFAULT_FILE_TYPE
    } else {
        file_type
    };
    let file_data = format!("data:{file_type};base64,{}", STANDARD.encode(bytes));

    let local_entry = ChatEntry::File {
        id: Uuid::new_v4(),
        username: username.to_string(),
        file_name: file_name.to_string(),
        file_type: file_type.to_string(),
        file_data: file_data.clone(),
        timestamp: Utc::now(),
    };

    Ok(EncodedUpload {
        event: ClientEvent::FileShare {
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            file_data,
            room,
        },
        local_entry,
    })
}

/// Uploads waiting for their acknowledgement.
///
/// The server acknowledges a connection's uploads in the order it received
/// them, so a FIFO is enough to pair them up.
#[derive(Debug, Default)]
pub struct PendingUploads {
    waiting: VecDeque<oneshot::Sender<FileShareAck>>,
}

impl PendingUploads {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upload; the receiver resolves with its ack.
    pub fn push(&mut self) -> oneshot::Receiver<FileShareAck> {
        let (tx, rx) = oneshot::channel();
        self.waiting.push_back(tx);
        rx
    }

    /// Hand `ack` to the oldest upload. Returns false if none was waiting.
    pub fn resolve(&mut self, ack: FileShareAck) -> bool {
        match self.waiting.pop_front() {
            // The uploader may have stopped waiting; that is fine.
            Some(tx) => {
                let _ = tx.send(ack);
                true
            }
            None => false,
        }
    }

    /// Fail every waiting upload (connection lost or room left).
    pub fn fail_all(&mut self, message: &str) {
        for tx in self.waiting.drain(..) {
            let _ = tx.send(FileShareAck::error(message));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Turn an ack into the uploader's result.
///
/// # Errors
///
/// `UploadFailed` with the server's message when the ack is an error.
pub fn ack_result(ack: FileShareAck) -> Result<(), ClientError> {
    if ack.is_ok() {
        Ok(())
    } else {
        Err(ClientError::UploadFailed(
            ack.message.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}
