//! Message body relay.
//!
//! Reads the message source chunk by chunk, applies DATA transparency and
//! writes each encoded chunk before reading the next one.

use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use mailpost_smtp::DataEncoder;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::classify::{Cause, Failure, Stage};
use crate::connection::Connection;

/// Bytes read from the source per chunk.
pub(crate) const CHUNK_SIZE: usize = 16 * 1024;

/// A message body: any async byte source.
pub trait MessageSource: AsyncRead + Unpin + Send {}

impl<T: AsyncRead + Unpin + Send + ?Sized> MessageSource for T {}

/// Relays `source` to the server and writes the end-of-data marker.
///
/// Returns the number of bytes written. A source error stops the relay
/// without writing the marker.
pub(crate) async fn relay<S>(source: &mut S, conn: &mut Connection<'_>) -> Result<u64, Failure>
where
    S: MessageSource + ?Sized,
{
    let mut encoder = DataEncoder::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut out = BytesMut::with_capacity(CHUNK_SIZE + CHUNK_SIZE / 8);
    let mut written: u64 = 0;

    loop {
        let read = match source.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(error = %err, written, "message source failed");
                return Err(Failure::new(Stage::Body, Cause::Source(Arc::new(err))));
            }
        };

        encoder.encode(&chunk[..read], &mut out);
        written += send(conn, &mut out).await?;
    }

    encoder.finish(&mut out);
    written += send(conn, &mut out).await?;
    tracing::trace!(written, "message body relayed");
    Ok(written)
}

async fn send(conn: &mut Connection<'_>, out: &mut BytesMut) -> Result<u64, Failure> {
    if out.is_empty() {
        return Ok(0);
    }
    conn.write_raw(&out[..])
        .await
        .map_err(|cause| Failure::new(Stage::Body, cause))?;
    let len = out.len() as u64;
    out.clear();
    Ok(len)
}
