//! zlib byte codec used by the blob store.
//!
//! Compression goes through `flate2`'s streaming encoder. Decompression drives
//! a raw [`Decompress`] state machine into a caller-sized buffer and doubles
//! the buffer whenever the output fills before the stream ends.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Result, WorldError};

/// Smallest buffer handed to the decompressor.
const MIN_OUTPUT: usize = 64;

/// Compression tag stored alongside each blob row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Stored raw (NULL or empty tag).
    None,
    /// DEFLATE in a zlib container.
    Zlib,
}

impl Compression {
    /// Column value for this tag.
    #[must_use]
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Zlib => Some("zlib"),
        }
    }

    /// Parse a stored tag. Anything unrecognized is treated as corruption.
    ///
    /// # Errors
    /// Returns [`WorldError::UnknownCompression`] for unknown tags.
    pub fn from_tag(tag: Option<&str>, key: &str) -> Result<Self> {
        match tag {
            None | Some("") => Ok(Self::None),
            Some("zlib") => Ok(Self::Zlib),
            Some(other) => Err(WorldError::UnknownCompression {
                key: key.to_string(),
                tag: other.to_string(),
            }),
        }
    }
}

/// Compress `bytes` with zlib at `level` (0-9).
///
/// # Errors
/// Returns [`WorldError::Codec`] if the encoder reports a failure.
pub fn compress(bytes: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(bytes.len() / 2 + MIN_OUTPUT),
        flate2::Compression::new(level.min(9)),
    );
    encoder
        .write_all(bytes)
        .map_err(|e| WorldError::Codec(format!("compress: {e}")))?;
    encoder
        .finish()
        .map_err(|e| WorldError::Codec(format!("compress: {e}")))
}

/// Decompress a zlib stream, starting with a `size_hint`-byte output buffer.
///
/// An undersized buffer is not an error: it is doubled and decompression
/// resumes where it stopped.
///
/// # Errors
/// Returns [`WorldError::Codec`] on corrupt or truncated input.
pub fn decompress(bytes: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(size_hint.max(MIN_OUTPUT));

    loop {
        let consumed = usize::try_from(inflater.total_in())
            .map_err(|_| WorldError::Codec("decompress: input offset overflow".to_string()))?;
        let before_in = inflater.total_in();
        let before_out = inflater.total_out();

        let status = inflater
            .decompress_vec(&bytes[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|e| WorldError::Codec(format!("decompress: {e}")))?;

        if status == Status::StreamEnd {
            return Ok(out);
        }

        if out.len() == out.capacity() {
            // Output buffer too small; grow and go again.
            let grow = out.capacity().max(MIN_OUTPUT);
            out.reserve(grow);
            continue;
        }

        let stalled = inflater.total_in() == before_in && inflater.total_out() == before_out;
        if stalled || inflater.total_in() as usize >= bytes.len() {
            return Err(WorldError::Codec(format!(
                "decompress: truncated stream after {} of {} bytes",
                inflater.total_in(),
                bytes.len()
            )));
        }
    }
}

/// Decode a stored payload according to its compression tag.
///
/// # Errors
/// Propagates [`decompress`] failures.
pub fn decode(compression: Compression, bytes: Vec<u8>, size_hint: usize) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(bytes),
        Compression::Zlib => {
            let hint = bytes.len().saturating_mul(size_hint);
            decompress(&bytes, hint)
        }
    }
}
