//! Streaming gzip
//!
//! Compresses a [`ByteStream`] chunk by chunk. Nothing beyond the encoder's
//! own window is buffered, so large export files never sit in memory whole.

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use futures::{stream, StreamExt, TryStreamExt};
use std::io::Write;

use crate::storage::ByteStream;

/// Wrap `input` in a gzip encoder. Read errors from `input` pass through.
pub fn gzip(input: ByteStream) -> ByteStream {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());

    stream::try_unfold((input, Some(encoder)), |(mut input, encoder)| async move {
        let Some(mut encoder) = encoder else {
            return Ok(None);
        };

        loop {
            match input.try_next().await? {
                Some(chunk) => {
                    encoder.write_all(&chunk)?;
                    let compressed = std::mem::take(encoder.get_mut());
                    // Small chunks often produce no output until the block fills.
                    if !compressed.is_empty() {
                        return Ok(Some((Bytes::from(compressed), (input, Some(encoder)))));
                    }
                },
                None => {
                    let trailer = encoder.finish()?;
                    return Ok(Some((Bytes::from(trailer), (input, None))));
                },
            }
        }
    })
    .boxed()
}
