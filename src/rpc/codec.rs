//! Length-delimited JSON framing shared by both ends of the hub protocol

use crate::error::Result;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Framed reading half of a duplex connection.
pub fn frame_read<R: AsyncRead>(reader: R) -> FramedRead<R, LengthDelimitedCodec> {
    FramedRead::new(reader, LengthDelimitedCodec::new())
}

/// Framed writing half of a duplex connection.
pub fn frame_write<W: AsyncWrite>(writer: W) -> FramedWrite<W, LengthDelimitedCodec> {
    FramedWrite::new(writer, LengthDelimitedCodec::new())
}

/// Serialize one message to a frame payload.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Deserialize one message from a frame payload.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write one message as a length-prefixed frame.
pub async fn send_frame<W, T>(
    framed: &mut FramedWrite<W, LengthDelimitedCodec>,
    value: &T,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    framed.send(encode(value)?).await?;
    Ok(())
}

/// Read one message from a length-prefixed frame.
///
/// Returns `None` on a clean end of stream.
pub async fn recv_frame<R, T>(
    framed: &mut FramedRead<R, LengthDelimitedCodec>,
) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match framed.next().await {
        Some(frame) => Ok(Some(decode(&frame?)?)),
        None => Ok(None),
    }
}
