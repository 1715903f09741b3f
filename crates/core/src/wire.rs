use serde::{Deserialize, Serialize};

use crate::{enums::ProtocolMessage, ids::PeerId};

pub const PROTOCOL_NAME: &str = "demo";
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound for one encoded frame.
pub const MAX_FRAME_SIZE: usize = 2048;

/// Largest request data that still fits in one frame with its envelope.
pub const MAX_PAYLOAD_SIZE: u16 = 2000;

/// Everything that travels over a peer connection.
///
/// Each side sends exactly one `Hello` before any `Message`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Hello {
        peer_id: PeerId,
        protocol: String,
        version: u32,
    },
    Message(ProtocolMessage),
}

impl Frame {
    pub fn hello(peer_id: PeerId) -> Self {
        Frame::Hello {
            peer_id,
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION,
        }
    }
}
