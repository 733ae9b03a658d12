pub mod binary;
pub mod builder;
pub mod hash;
pub mod header;
pub mod image;
pub mod reader;
pub mod string;

use std::fmt;

use thiserror::Error;

/// One of the three payloads stored in a boot image, in on-disk order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Kernel,
    Ramdisk,
    Second,
}

impl Section {
    /// All sections in the order they are laid out and hashed
    pub const ALL: [Section; 3] = [Section::Kernel, Section::Ramdisk, Section::Second];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Ramdisk => "ramdisk",
            Self::Second => "second",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Broad category of a [`BootImgError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The data is not a boot image at all
    Format,
    /// A boot image whose fields or size break a layout rule
    Validation,
    /// A caller-supplied value does not fit, or a layout bug was hit
    Argument,
    /// The underlying stream failed or ended early
    Io,
}

#[derive(Error, Debug)]
pub enum BootImgError {
    #[error("Invalid boot magic: expected \"ANDROID!\", found {found:?}")]
    InvalidMagic { found: string::SizedCString<8> },
    #[error("Invalid value for {field}: {value} (expected {expected})")]
    InvalidField {
        field: &'static str,
        value: u32,
        expected: String,
    },
    #[error("Container is truncated: expected at least {expected} bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },
    #[error("The {section} section is too large: {size} bytes does not fit a 32-bit size field")]
    SectionTooLarge { section: Section, size: u64 },
    #[error("String too long for {field}: {len} bytes (at most {width} allowed)")]
    StringTooLong {
        field: &'static str,
        width: usize,
        len: usize,
    },
    #[error("Negative padding: cannot pad from {from:#x} back to {to:#x}")]
    NegativePadding { from: u64, to: u64 },
    #[error("Source ended early, still {remaining} bytes to read")]
    TruncatedSource { remaining: u64 },
    #[error("Content digest does not match the id field")]
    DigestMismatch,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BootImgError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMagic { .. } => ErrorKind::Format,
            Self::InvalidField { .. }
            | Self::Truncated { .. }
            | Self::SectionTooLarge { .. }
            | Self::DigestMismatch => ErrorKind::Validation,
            Self::StringTooLong { .. } | Self::NegativePadding { .. } => ErrorKind::Argument,
            Self::TruncatedSource { .. } | Self::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, BootImgError>;

pub mod prelude {
    pub use crate::builder::{build_container, BootImageBuilder, BootImageOptions};
    pub use crate::header::{BootImageHeader, Layout, LoadAddresses, SectionSpan};
    pub use crate::image::BootImage;
    pub use crate::reader::{extract_section, extract_section_bytes, read_header, read_header_from_bytes};
    pub use crate::{BootImgError, ErrorKind, Section};
}
