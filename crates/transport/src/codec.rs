use bincode::config;
use hashwork_core::wire::Frame;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::TransportError;

/// Length-prefixed framing over any byte stream.
pub fn framed<T>(io: T, max_frame_size: usize) -> Framed<T, LengthDelimitedCodec>
where
    T: AsyncRead + AsyncWrite,
{
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_size)
        .new_framed(io)
}

pub fn encode(frame: &Frame) -> Result<Vec<u8>, TransportError> {
    Ok(bincode::serde::encode_to_vec(frame, config::standard())?)
}

pub fn decode(bytes: &[u8]) -> Result<Frame, TransportError> {
    let (frame, _): (Frame, _) = bincode::serde::decode_from_slice(bytes, config::standard())?;
    Ok(frame)
}
