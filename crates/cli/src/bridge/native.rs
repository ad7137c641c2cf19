//! Native-messaging framing.
//!
//! Each frame is a 4-byte little-endian length followed by that many bytes of
//! UTF-8 JSON. The underlying pipe may split or merge writes arbitrarily, so
//! reads always go through `read_exact`.

use std::io;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame the browser accepts from a native host.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

/// Largest frame the browser may send to a native host.
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
	#[error("frame of {size} bytes exceeds the {limit} byte limit")]
	TooLarge { size: usize, limit: usize },

	#[error("malformed frame: {0}")]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] io::Error),
}

impl FrameError {
	/// Whether the stream is still aligned on a frame boundary.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, FrameError::Json(_))
	}
}

/// Reads one frame; `Ok(None)` on a clean end of stream.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
	R: AsyncRead + Unpin,
	T: DeserializeOwned,
{
	let mut header = [0u8; 4];
	match reader.read_exact(&mut header).await {
		Ok(_) => {}
		Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(err) => return Err(err.into()),
	}

	let size = u32::from_le_bytes(header) as usize;
	if size > MAX_INBOUND_FRAME {
		return Err(FrameError::TooLarge {
			size,
			limit: MAX_INBOUND_FRAME,
		});
	}

	let mut body = vec![0u8; size];
	reader.read_exact(&mut body).await?;
	Ok(Some(serde_json::from_slice(&body)?))
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
	W: AsyncWrite + Unpin,
	T: Serialize,
{
	let body = serde_json::to_vec(message)?;
	if body.len() > MAX_OUTBOUND_FRAME {
		return Err(FrameError::TooLarge {
			size: body.len(),
			limit: MAX_OUTBOUND_FRAME,
		});
	}

	writer.write_all(&(body.len() as u32).to_le_bytes()).await?;
	writer.write_all(&body).await?;
	writer.flush().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use serde_json::{Value, json};
	use tokio::io::duplex;

	use super::*;

	#[tokio::test]
	async fn frames_survive_tiny_pipe_buffers() {
		let (mut a, mut b) = duplex(3);
		let writer = tokio::spawn(async move {
			write_frame(&mut a, &json!({ "type": "keep_alive" })).await.unwrap();
			write_frame(&mut a, &json!({ "n": [1, 2, 3] })).await.unwrap();
		});

		let first: Value = read_frame(&mut b).await.unwrap().unwrap();
		let second: Value = read_frame(&mut b).await.unwrap().unwrap();
		writer.await.unwrap();

		assert_eq!(first["type"], "keep_alive");
		assert_eq!(second["n"][2], 3);
		assert!(read_frame::<_, Value>(&mut b).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn header_is_little_endian_length() {
		let mut buf = Vec::new();
		write_frame(&mut buf, &json!("hi")).await.unwrap();
		assert_eq!(&buf[..4], &[4, 0, 0, 0]);
		assert_eq!(&buf[4..], b"\"hi\"");
	}

	#[tokio::test]
	async fn oversized_outbound_frame_is_rejected() {
		let mut buf = Vec::new();
		let big = "x".repeat(MAX_OUTBOUND_FRAME);
		let err = write_frame(&mut buf, &big).await.unwrap_err();
		assert!(matches!(err, FrameError::TooLarge { .. }));
		assert!(buf.is_empty());
	}

	#[tokio::test]
	async fn oversized_inbound_header_is_rejected() {
		let mut input: &[u8] = &(u32::MAX).to_le_bytes();
		let err = read_frame::<_, Value>(&mut input).await.unwrap_err();
		assert!(matches!(err, FrameError::TooLarge { .. }));
		assert!(!err.is_recoverable());
	}

	#[tokio::test]
	async fn malformed_body_keeps_stream_aligned() {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(&3u32.to_le_bytes());
		bytes.extend_from_slice(b"{{{");
		write_frame(&mut bytes, &json!({ "ok": true })).await.unwrap();

		let mut input: &[u8] = &bytes;
		let err = read_frame::<_, Value>(&mut input).await.unwrap_err();
		assert!(err.is_recoverable());
		let next: Value = read_frame(&mut input).await.unwrap().unwrap();
		assert_eq!(next["ok"], true);
	}
}
