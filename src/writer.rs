//! Envelope writer over any `AsyncWrite`.
//!
//! Writes `[magic][length][payload]` with scatter/gather I/O so a frame goes
//! out in one `writev` in the common case instead of a header write, a
//! payload write and a flush.

use std::io::IoSlice;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{CamwireError, Result};
use crate::protocol::{EnvelopeHeader, HEADER_SIZE};

/// Write one envelope carrying `payload` and flush.
///
/// # Errors
///
/// Returns `Protocol` if the payload is longer than `u32::MAX` (nothing is
/// written in that case) and `Io` on any write or flush failure.
pub async fn write_envelope<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = EnvelopeHeader::for_payload(payload).ok_or_else(|| {
        CamwireError::Protocol(format!(
            "Payload of {} bytes does not fit in a u32 length",
            payload.len()
        ))
    })?;
    let header = header.encode();
    let total_size = HEADER_SIZE + payload.len();

    let mut total_written = 0;
    while total_written < total_size {
        let slices = remaining_slices(&header, payload, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(CamwireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice array for what is left after `skip_bytes` were written.
fn remaining_slices<'a>(
    header: &'a [u8; HEADER_SIZE],
    payload: &'a [u8],
    skip_bytes: usize,
) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(2);

    if skip_bytes < HEADER_SIZE {
        slices.push(IoSlice::new(&header[skip_bytes..]));
    }

    let start_in_payload = skip_bytes.saturating_sub(HEADER_SIZE);
    if start_in_payload < payload.len() {
        slices.push(IoSlice::new(&payload[start_in_payload..]));
    }

    slices
}
