// Protocol - Message types for chain gossip
//
// Wire format is one JSON object per text frame:
//   {"type": 0}                     QUERY_LATEST_BLOCK
//   {"type": 1}                     QUERY_BLOCKCHAIN
//   {"type": 2, "data": "<json>"}   RESPONSE_BLOCKCHAIN
// For type 2, `data` is a string holding the JSON array of blocks.

use crate::chain::Block;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Types of messages in the protocol, with their wire discriminants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    QueryLatestBlock = 0,
    QueryBlockchain = 1,
    ResponseBlockchain = 2,
}

impl MessageType {
    /// Wire discriminant
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a message type by its wire discriminant
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::QueryLatestBlock),
            1 => Some(Self::QueryBlockchain),
            2 => Some(Self::ResponseBlockchain),
            _ => None,
        }
    }
}

/// Protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown message type: {0}")]
    UnknownType(u8),

    #[error("Missing data for RESPONSE_BLOCKCHAIN")]
    MissingData,

    #[error("Invalid block payload: {0}")]
    InvalidPayload(String),

    #[error("Empty block payload")]
    EmptyPayload,

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

/// Raw frame shape, before the discriminant is checked
#[derive(Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

/// A decoded protocol message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Requester wants the peer's current tip
    QueryLatestBlock,
    /// Requester wants the peer's full chain
    QueryBlockchain,
    /// One block (tip update) or the full chain (query response)
    ResponseBlockchain(Vec<Block>),
}

impl Message {
    /// Response carrying only the given tip
    pub fn response_latest(tip: &Block) -> Self {
        Message::ResponseBlockchain(vec![tip.clone()])
    }

    /// Response carrying a full chain
    pub fn response_chain(blocks: &[Block]) -> Self {
        Message::ResponseBlockchain(blocks.to_vec())
    }

    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::QueryLatestBlock => MessageType::QueryLatestBlock,
            Message::QueryBlockchain => MessageType::QueryBlockchain,
            Message::ResponseBlockchain(_) => MessageType::ResponseBlockchain,
        }
    }

    /// Encode to a text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let data = match self {
            Message::ResponseBlockchain(blocks) => Some(
                serde_json::to_string(blocks)
                    .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?,
            ),
            _ => None,
        };

        let frame = Frame {
            kind: self.message_type().code(),
            data,
        };
        serde_json::to_string(&frame).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    /// Decode a text frame, rejecting anything that isn't a known variant
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

        match MessageType::from_code(frame.kind) {
            Some(MessageType::QueryLatestBlock) => Ok(Message::QueryLatestBlock),
            Some(MessageType::QueryBlockchain) => Ok(Message::QueryBlockchain),
            Some(MessageType::ResponseBlockchain) => {
                let data = frame.data.ok_or(ProtocolError::MissingData)?;
                let blocks: Vec<Block> = serde_json::from_str(&data)
                    .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
                if blocks.is_empty() {
                    return Err(ProtocolError::EmptyPayload);
                }
                Ok(Message::ResponseBlockchain(blocks))
            }
            None => Err(ProtocolError::UnknownType(frame.kind)),
        }
    }
}
