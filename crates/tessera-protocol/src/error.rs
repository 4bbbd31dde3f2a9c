use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    FramingError(String),

    /// More bytes are needed before the frame at the front can be decoded.
    #[error("incomplete frame: have {have} bytes, need {need}")]
    Incomplete { have: usize, need: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
