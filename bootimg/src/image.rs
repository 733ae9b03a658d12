use crate::hash::content_digest;
use crate::header::{BootImageHeader, Layout};
use crate::reader::read_header_from_bytes;
use crate::{BootImgError, Result, Section};

/// A validated boot image borrowed from a byte slice
#[derive(Debug, Clone)]
pub struct BootImage<'a> {
    header: BootImageHeader,
    layout: Layout,
    data: &'a [u8],
}

impl<'a> BootImage<'a> {
    pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
        let header = read_header_from_bytes(data)?;
        let layout = header.layout();
        Ok(Self { header, layout, data })
    }
    #[must_use]
    pub fn builder() -> crate::builder::BootImageBuilder {
        crate::builder::BootImageBuilder::new()
    }
    #[must_use]
    pub fn header(&self) -> &BootImageHeader {
        &self.header
    }
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }
    /// Bytes of one section, without padding
    #[must_use]
    pub fn section_data(&self, section: Section) -> &'a [u8] {
        let span = self.layout.section(section);
        // from_bytes already checked the whole layout fits into data
        &self.data[span.offset as usize..][..span.size as usize]
    }
    /// Recomputes the content digest and compares it against the header id
    #[must_use]
    pub fn hash_ok(&self) -> bool {
        let digest = content_digest(Section::ALL.map(|section| self.section_data(section)));
        self.header.id_matches(&digest)
    }
    /// Like [`BootImage::hash_ok`], as an error
    pub fn verify(&self) -> Result<()> {
        if self.hash_ok() {
            Ok(())
        } else {
            Err(BootImgError::DigestMismatch)
        }
    }
}
