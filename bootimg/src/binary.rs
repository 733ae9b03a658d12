//! Little-endian integers, fixed-width strings and chunked copies over `std::io` streams.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha1::{Digest, Sha1};
use tracing::trace;

use crate::string::SizedCString;
use crate::{BootImgError, Result};

/// Reads exactly four bytes as a little-endian `u32`
pub fn read_le32<R: Read>(source: &mut R) -> Result<u32> {
    Ok(source.read_u32::<LittleEndian>()?)
}

/// Writes `value` as four little-endian bytes
pub fn write_le32<W: Write>(sink: &mut W, value: u32) -> Result<()> {
    Ok(sink.write_u32::<LittleEndian>(value)?)
}

/// Feeds the little-endian encoding of `value` into a running digest
pub fn digest_le32(digest: &mut Sha1, value: u32) {
    digest.update(value.to_le_bytes());
}

/// Reads a `SIZE`-byte null-padded string field
pub fn read_fixed_string<R: Read, const SIZE: usize>(source: &mut R) -> Result<SizedCString<SIZE>> {
    let mut data = [0u8; SIZE];
    source.read_exact(&mut data)?;
    Ok(SizedCString::from(data))
}

/// Writes `text` into a `width`-byte field, zero-filling the remainder
///
/// `field` only names the field in the error returned when `text` does not fit.
pub fn write_fixed_string<W: Write>(sink: &mut W, field: &'static str, width: usize, text: &[u8]) -> Result<()> {
    let Some(remaining) = width.checked_sub(text.len()) else {
        return Err(BootImgError::StringTooLong { field, width, len: text.len() });
    };
    sink.write_all(text)?;
    zero_fill(sink, remaining as u64)
}

/// Writes `count` zero bytes
pub fn zero_fill<W: Write + ?Sized>(sink: &mut W, count: u64) -> Result<()> {
    io::copy(&mut io::repeat(0).take(count), sink)?;
    Ok(())
}

/// Zero-fills from stream position `from` up to `to`
///
/// Going backwards means the caller computed a bad layout, which is reported as
/// [`BootImgError::NegativePadding`] rather than silently ignored.
pub fn pad_to<W: Write>(sink: &mut W, from: u64, to: u64) -> Result<()> {
    let count = to.checked_sub(from).ok_or(BootImgError::NegativePadding { from, to })?;
    zero_fill(sink, count)
}

/// Copies exactly `length` bytes from `source` to `sink`, hashing them on the way if asked to
pub fn copy_stream<R: Read + ?Sized, W: Write + ?Sized>(
    source: &mut R,
    sink: &mut W,
    length: u64,
    mut digest: Option<&mut Sha1>,
) -> Result<()> {
    const CHUNK_SIZE: usize = 0x2000;

    let mut chunk = [0u8; CHUNK_SIZE];
    let mut remaining = length;
    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE));
        let read = match source.read(&mut chunk[..want]) {
            Ok(0) => return Err(BootImgError::TruncatedSource { remaining }),
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if let Some(digest) = digest.as_deref_mut() {
            digest.update(&chunk[..read]);
        }
        sink.write_all(&chunk[..read])?;
        remaining -= read as u64;
    }
    trace!(length, "copied stream");
    Ok(())
}
