//! Reading boot image headers and pulling sections back out of a container.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::binary::copy_stream;
use crate::header::{BootImageHeader, SectionSpan, BOOT_MAGIC, BOOT_MAGIC_SIZE, HEADER_SIZE};
use crate::string::SizedCString;
use crate::{BootImgError, Result};

/// Checks whatever part of the magic the stream holds, leaving the stream at its start
fn check_magic<R: Read + Seek>(reader: &mut R, len: u64) -> Result<()> {
    let mut magic = [0u8; BOOT_MAGIC_SIZE];
    let present = len.min(BOOT_MAGIC_SIZE as u64) as usize;
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut magic[..present])?;
    if magic[..present] != BOOT_MAGIC[..present] {
        return Err(BootImgError::InvalidMagic { found: SizedCString::from(magic) });
    }
    reader.seek(SeekFrom::Start(0))?;
    Ok(())
}

/// Reads and validates the header of a boot image
///
/// The magic is checked before anything else, even on streams too short to hold a header.
/// On success the reader is left positioned at the start of the kernel section. Containers
/// longer than the declared layout are accepted, shorter ones are rejected as truncated.
pub fn read_header<R: Read + Seek>(reader: &mut R) -> Result<BootImageHeader> {
    let actual = reader.seek(SeekFrom::End(0))?;
    check_magic(reader, actual)?;
    if actual < HEADER_SIZE as u64 {
        return Err(BootImgError::Truncated { expected: HEADER_SIZE as u64, actual });
    }
    let header = BootImageHeader::parse(reader)?;
    header.validate()?;

    let layout = header.layout();
    if actual < layout.total_size {
        return Err(BootImgError::Truncated { expected: layout.total_size, actual });
    }
    if actual > layout.total_size {
        debug!(trailing = actual - layout.total_size, "ignoring bytes past the last section");
    }

    reader.seek(SeekFrom::Start(layout.kernel.offset))?;
    Ok(header)
}

/// [`read_header`] over an in-memory container
pub fn read_header_from_bytes(container: &[u8]) -> Result<BootImageHeader> {
    read_header(&mut Cursor::new(container))
}

/// Streams the bytes of one section into `writer`
///
/// Padding is not copied.
pub fn extract_section<R: Read + Seek, W: Write>(reader: &mut R, span: SectionSpan, writer: &mut W) -> Result<()> {
    reader.seek(SeekFrom::Start(span.offset))?;
    copy_stream(reader, writer, span.size, None)?;
    debug!(offset = span.offset, size = span.size, "extracted section");
    Ok(())
}

/// Copies `size` bytes at `position` out of an in-memory container
pub fn extract_section_bytes(container: &[u8], position: u64, size: u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let span = SectionSpan { offset: position, size, padding: 0 };
    extract_section(&mut Cursor::new(container), span, &mut out)?;
    Ok(out)
}
