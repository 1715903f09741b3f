pub mod codec;
pub mod node;

pub use node::{PeerEvent, PeerHandle, PeerNode, TransportConfig};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode frame: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connection to peer {0} is closed")]
    Closed(String),
}
