use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::binary::{copy_stream, digest_le32, zero_fill};
use crate::hash::DIGEST_SIZE;
use crate::header::{
    nonzero_page_size, BootImageHeader, LoadAddresses, BOOT_ARGS_SIZE, BOOT_NAME_SIZE, DEFAULT_BASE_ADDR, DEFAULT_PAGE_SIZE,
};
use crate::string::{SizedCString, SizedCStringError};
use crate::{BootImgError, Result, Section};

/// Caller overrides for a new boot image; anything left `None` uses the format default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootImageOptions {
    pub page_size: Option<u32>,
    pub base_addr: Option<u32>,
    pub name: Option<String>,
    pub args: Option<String>,
}

/// Assembles a boot image out of its sections
#[derive(Debug, Clone)]
pub struct BootImageBuilder {
    page_size: u32,
    addresses: LoadAddresses,
    name: SizedCString<BOOT_NAME_SIZE>,
    args: SizedCString<BOOT_ARGS_SIZE>,
}

fn fixed_field<const SIZE: usize>(field: &'static str, text: &str) -> Result<SizedCString<SIZE>> {
    SizedCString::try_from(text).map_err(|SizedCStringError::TooBig { len, width }| {
        BootImgError::StringTooLong { field, width, len }
    })
}

/// Remaining length of a seekable source, measured from its current position
fn source_len<S: Seek>(source: &mut S, section: Section) -> Result<u32> {
    let start = source.stream_position()?;
    let end = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(start))?;
    let size = end.saturating_sub(start);
    u32::try_from(size).map_err(|_| BootImgError::SectionTooLarge { section, size })
}

impl Default for BootImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BootImageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            addresses: LoadAddresses::from_base(DEFAULT_BASE_ADDR),
            name: SizedCString::default(),
            args: SizedCString::default(),
        }
    }
    /// Applies every override set in `options`
    pub fn from_options(options: &BootImageOptions) -> Result<Self> {
        let mut ret = Self::new();
        if let Some(page_size) = options.page_size {
            ret = ret.with_page_size(page_size);
        }
        if let Some(base_addr) = options.base_addr {
            ret = ret.with_base_addr(base_addr);
        }
        if let Some(name) = &options.name {
            ret = ret.with_name(name)?;
        }
        if let Some(args) = &options.args {
            ret = ret.with_args(args)?;
        }
        Ok(ret)
    }
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
    #[must_use]
    pub fn with_base_addr(mut self, base_addr: u32) -> Self {
        self.addresses = LoadAddresses::from_base(base_addr);
        self
    }
    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = fixed_field("name", name)?;
        Ok(self)
    }
    pub fn with_args(mut self, args: &str) -> Result<Self> {
        self.args = fixed_field("args", args)?;
        Ok(self)
    }

    /// Writes a complete boot image to `out` and returns the header that went into it
    ///
    /// Sections are read from their current position to their end. Section data goes in
    /// first; the header, carrying the content digest, is written last. Nothing is written
    /// when the resulting header would not be valid.
    pub fn build<K, R, S, W>(
        &self,
        mut kernel: K,
        mut ramdisk: R,
        mut second: Option<S>,
        out: &mut W,
    ) -> Result<BootImageHeader>
    where
        K: Read + Seek,
        R: Read + Seek,
        S: Read + Seek,
        W: Write + Seek,
    {
        let sizes = [
            source_len(&mut kernel, Section::Kernel)?,
            source_len(&mut ramdisk, Section::Ramdisk)?,
            match second.as_mut() {
                Some(second) => source_len(second, Section::Second)?,
                None => 0,
            },
        ];

        let page_size = nonzero_page_size(self.page_size)?;
        let header = BootImageHeader::new(sizes, page_size, self.addresses, self.name.clone(), self.args.clone());
        header.validate()?;
        let layout = header.layout();
        debug!(?layout, "building boot image");

        let mut hasher = Sha1::new();
        let mut write_section = |source: &mut dyn Read, section: Section| -> Result<()> {
            let span = layout.section(section);
            if span.size > 0 {
                out.seek(SeekFrom::Start(span.offset))?;
                copy_stream(source, &mut *out, span.size, Some(&mut hasher))?;
                zero_fill(&mut *out, span.padding)?;
            }
            digest_le32(&mut hasher, header.section_size(section));
            Ok(())
        };
        write_section(&mut kernel, Section::Kernel)?;
        write_section(&mut ramdisk, Section::Ramdisk)?;
        match second.as_mut() {
            Some(second) => write_section(second, Section::Second)?,
            None => write_section(&mut std::io::empty(), Section::Second)?,
        }

        let digest: [u8; DIGEST_SIZE] = hasher.finalize().into();
        let header = header.with_digest(&digest);
        out.seek(SeekFrom::Start(0))?;
        header.write(out)?;
        out.flush()?;

        info!(
            total_size = layout.total_size,
            id = %hex::encode(digest),
            "built boot image"
        );
        Ok(header)
    }

    /// Builds a boot image entirely in memory
    pub fn build_bytes(&self, kernel: &[u8], ramdisk: &[u8], second: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.build(Cursor::new(kernel), Cursor::new(ramdisk), second.map(Cursor::new), &mut out)?;
        Ok(out.into_inner())
    }
}

/// Builds a boot image from its sections and a set of options, see [`BootImageBuilder::build`]
pub fn build_container<K, R, S, W>(
    kernel: K,
    ramdisk: R,
    second: Option<S>,
    options: &BootImageOptions,
    out: &mut W,
) -> Result<BootImageHeader>
where
    K: Read + Seek,
    R: Read + Seek,
    S: Read + Seek,
    W: Write + Seek,
{
    BootImageBuilder::from_options(options)?.build(kernel, ramdisk, second, out)
}
