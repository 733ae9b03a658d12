use std::fmt;
use std::io::{Read, Write};
use std::num::NonZeroU32;

use derivative::Derivative;
use static_assertions::const_assert;
use tracing::debug;

use crate::binary::{pad_to, read_fixed_string, read_le32, write_fixed_string, write_le32};
use crate::hash::DIGEST_SIZE;
use crate::string::SizedCString;
use crate::{BootImgError, Result, Section};

pub const BOOT_MAGIC: &[u8; BOOT_MAGIC_SIZE] = b"ANDROID!";
pub const BOOT_MAGIC_SIZE: usize = 8;
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_ID_SIZE: usize = 32;
/// Size of the fixed header region, before it is padded up to a full page
pub const HEADER_SIZE: usize = BOOT_MAGIC_SIZE + BOOT_NAME_SIZE + BOOT_ARGS_SIZE + 10 * 4 + BOOT_ID_SIZE;

pub const DEFAULT_PAGE_SIZE: u32 = 2048;
pub const DEFAULT_BASE_ADDR: u32 = 0x1000_0000;
pub const OFFSET_KERNEL_ADDR: u32 = 0x0000_8000;
pub const OFFSET_RAMDISK_ADDR: u32 = 0x0100_0000;
pub const OFFSET_SECOND_ADDR: u32 = 0x00F0_0000;
pub const OFFSET_TAGS_ADDR: u32 = 0x0000_0100;

const_assert!(HEADER_SIZE == 608);
const_assert!(DEFAULT_PAGE_SIZE as usize >= HEADER_SIZE);
const_assert!(DIGEST_SIZE <= BOOT_ID_SIZE);

/// Bytes needed after `size` bytes to reach the next multiple of `page_size`
#[must_use]
pub fn compute_padding(size: u64, page_size: NonZeroU32) -> u64 {
    let page_size = u64::from(page_size.get());
    (page_size - size % page_size) % page_size
}

/// Rejects a zero page size, which no layout can be derived from
pub(crate) fn nonzero_page_size(page_size: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(page_size).ok_or_else(|| BootImgError::InvalidField {
        field: "page_size",
        value: page_size,
        expected: format!(">= {HEADER_SIZE}"),
    })
}

/// Physical load addresses of everything the bootloader places in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadAddresses {
    pub kernel: u32,
    pub ramdisk: u32,
    pub second: u32,
    pub tags: u32,
}

impl LoadAddresses {
    /// Expands a base address using the conventional per-section offsets
    #[must_use]
    pub fn from_base(base: u32) -> Self {
        Self {
            kernel: base.wrapping_add(OFFSET_KERNEL_ADDR),
            ramdisk: base.wrapping_add(OFFSET_RAMDISK_ADDR),
            second: base.wrapping_add(OFFSET_SECOND_ADDR),
            tags: base.wrapping_add(OFFSET_TAGS_ADDR),
        }
    }
    /// Base address, as recovered from the kernel address
    #[must_use]
    pub fn base(&self) -> u32 {
        self.kernel.wrapping_sub(OFFSET_KERNEL_ADDR)
    }
}

impl Default for LoadAddresses {
    fn default() -> Self {
        Self::from_base(DEFAULT_BASE_ADDR)
    }
}

/// Where one section lives inside the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub offset: u64,
    pub size: u64,
    pub padding: u64,
}

impl SectionSpan {
    /// First byte past this section's padding
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.size + self.padding
    }
}

/// Section positions derived from the sizes and page size of a header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub kernel: SectionSpan,
    pub ramdisk: SectionSpan,
    pub second: SectionSpan,
    pub total_size: u64,
}

impl Layout {
    /// Lays out the sections back to back, each starting on a page boundary
    #[must_use]
    pub(crate) fn compute(sizes: [u32; 3], page_size: NonZeroU32) -> Self {
        let span = |offset: u64, size: u32| {
            let size = u64::from(size);
            SectionSpan { offset, size, padding: compute_padding(size, page_size) }
        };
        let kernel = span(u64::from(page_size.get()), sizes[0]);
        let ramdisk = span(kernel.end(), sizes[1]);
        let second = span(ramdisk.end(), sizes[2]);
        Self { kernel, ramdisk, second, total_size: second.end() }
    }
    #[must_use]
    pub fn section(&self, section: Section) -> SectionSpan {
        match section {
            Section::Kernel => self.kernel,
            Section::Ramdisk => self.ramdisk,
            Section::Second => self.second,
        }
    }
}

fn fmt_id(id: &[u8; BOOT_ID_SIZE], f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(&hex::encode(id))
}

/// Header of a boot image
///
/// Instances are either parsed from an existing container (see [`crate::reader`]) or produced
/// by [`crate::builder::BootImageBuilder`]; neither changes once it is handed out.
#[derive(Derivative, Clone, PartialEq, Eq)]
#[derivative(Debug)]
pub struct BootImageHeader {
    magic: SizedCString<BOOT_MAGIC_SIZE>,
    kernel_size: u32,
    kernel_addr: u32,
    ramdisk_size: u32,
    ramdisk_addr: u32,
    second_size: u32,
    second_addr: u32,
    tags_addr: u32,
    page_size: NonZeroU32,
    unused: [u32; 2],
    name: SizedCString<BOOT_NAME_SIZE>,
    args: SizedCString<BOOT_ARGS_SIZE>,
    #[derivative(Debug(format_with = "fmt_id"))]
    id: [u8; BOOT_ID_SIZE],
}

impl BootImageHeader {
    pub(crate) fn new(
        sizes: [u32; 3],
        page_size: NonZeroU32,
        addresses: LoadAddresses,
        name: SizedCString<BOOT_NAME_SIZE>,
        args: SizedCString<BOOT_ARGS_SIZE>,
    ) -> Self {
        Self {
            magic: SizedCString::from(*BOOT_MAGIC),
            kernel_size: sizes[0],
            kernel_addr: addresses.kernel,
            ramdisk_size: sizes[1],
            ramdisk_addr: addresses.ramdisk,
            second_size: sizes[2],
            second_addr: addresses.second,
            tags_addr: addresses.tags,
            page_size,
            unused: [0; 2],
            name,
            args,
            id: [0; BOOT_ID_SIZE],
        }
    }

    #[must_use] pub fn magic(&self) -> &SizedCString<BOOT_MAGIC_SIZE> { &self.magic }
    #[must_use] pub fn kernel_size(&self) -> u32 { self.kernel_size }
    #[must_use] pub fn kernel_addr(&self) -> u32 { self.kernel_addr }
    #[must_use] pub fn ramdisk_size(&self) -> u32 { self.ramdisk_size }
    #[must_use] pub fn ramdisk_addr(&self) -> u32 { self.ramdisk_addr }
    #[must_use] pub fn second_size(&self) -> u32 { self.second_size }
    #[must_use] pub fn second_addr(&self) -> u32 { self.second_addr }
    #[must_use] pub fn tags_addr(&self) -> u32 { self.tags_addr }
    #[must_use] pub fn page_size(&self) -> u32 { self.page_size.get() }
    #[must_use] pub fn unused(&self) -> [u32; 2] { self.unused }
    #[must_use] pub fn name(&self) -> &SizedCString<BOOT_NAME_SIZE> { &self.name }
    #[must_use] pub fn args(&self) -> &SizedCString<BOOT_ARGS_SIZE> { &self.args }
    #[must_use] pub fn id(&self) -> &[u8; BOOT_ID_SIZE] { &self.id }

    #[must_use]
    pub fn addresses(&self) -> LoadAddresses {
        LoadAddresses {
            kernel: self.kernel_addr,
            ramdisk: self.ramdisk_addr,
            second: self.second_addr,
            tags: self.tags_addr,
        }
    }
    #[must_use]
    pub fn base_addr(&self) -> u32 {
        self.addresses().base()
    }
    #[must_use]
    pub fn section_size(&self, section: Section) -> u32 {
        match section {
            Section::Kernel => self.kernel_size,
            Section::Ramdisk => self.ramdisk_size,
            Section::Second => self.second_size,
        }
    }
    #[must_use]
    pub fn sizes(&self) -> [u32; 3] {
        [self.kernel_size, self.ramdisk_size, self.second_size]
    }
    /// Derived section positions
    #[must_use]
    pub fn layout(&self) -> Layout {
        Layout::compute(self.sizes(), self.page_size)
    }
    /// Whether the stored id starts with `digest`
    #[must_use]
    pub fn id_matches(&self, digest: &[u8; DIGEST_SIZE]) -> bool {
        self.id[..DIGEST_SIZE] == digest[..]
    }

    /// Returns a copy with `digest` placed at the start of the id field
    #[must_use]
    pub(crate) fn with_digest(&self, digest: &[u8; DIGEST_SIZE]) -> Self {
        let mut ret = self.clone();
        ret.id[..DIGEST_SIZE].copy_from_slice(digest);
        ret
    }

    /// Header fields as `(property, value)` pairs, addresses and sizes in `0x%08X` form
    #[must_use]
    pub fn properties(&self) -> Vec<(&'static str, String)> {
        let hex = |v: u32| format!("{v:#010X}");
        vec![
            ("baseAddr", hex(self.base_addr())),
            ("kernelAddr", hex(self.kernel_addr)),
            ("kernelSize", hex(self.kernel_size)),
            ("ramdiskAddr", hex(self.ramdisk_addr)),
            ("ramdiskSize", hex(self.ramdisk_size)),
            ("secondAddr", hex(self.second_addr)),
            ("secondSize", hex(self.second_size)),
            ("tagsAddr", hex(self.tags_addr)),
            ("pageSize", hex(self.page_size.get())),
            ("name", self.name.to_string_lossy().into_owned()),
            ("args", self.args.to_string_lossy().into_owned()),
        ]
    }

    /// Checks every structural rule a header has to follow
    pub fn validate(&self) -> Result<()> {
        if self.magic.data() != BOOT_MAGIC {
            return Err(BootImgError::InvalidMagic { found: self.magic.clone() });
        }
        if self.kernel_size == 0 {
            return Err(BootImgError::InvalidField {
                field: "kernel_size",
                value: self.kernel_size,
                expected: "> 0".into(),
            });
        }
        if self.ramdisk_size == 0 {
            return Err(BootImgError::InvalidField {
                field: "ramdisk_size",
                value: self.ramdisk_size,
                expected: "> 0".into(),
            });
        }
        if (self.page_size.get() as usize) < HEADER_SIZE {
            return Err(BootImgError::InvalidField {
                field: "page_size",
                value: self.page_size.get(),
                expected: format!(">= {HEADER_SIZE}"),
            });
        }
        debug!(layout = ?self.layout(), "header validated");
        Ok(())
    }

    /// Parses the fixed header region
    ///
    /// Only a zero page size is rejected here; everything else is left to [`Self::validate`].
    pub(crate) fn parse<R: Read>(source: &mut R) -> Result<Self> {
        Ok(Self {
            magic: read_fixed_string(source)?,
            kernel_size: read_le32(source)?,
            kernel_addr: read_le32(source)?,
            ramdisk_size: read_le32(source)?,
            ramdisk_addr: read_le32(source)?,
            second_size: read_le32(source)?,
            second_addr: read_le32(source)?,
            tags_addr: read_le32(source)?,
            page_size: nonzero_page_size(read_le32(source)?)?,
            unused: [read_le32(source)?, read_le32(source)?],
            name: read_fixed_string(source)?,
            args: read_fixed_string(source)?,
            id: {
                let mut id = [0u8; BOOT_ID_SIZE];
                source.read_exact(&mut id)?;
                id
            },
        })
    }

    /// Writes the header followed by zeroes up to the start of the kernel section
    pub fn write<W: Write>(&self, sink: &mut W) -> Result<()> {
        self.validate()?;
        write_fixed_string(sink, "magic", BOOT_MAGIC_SIZE, self.magic.data())?;
        for value in [
            self.kernel_size,
            self.kernel_addr,
            self.ramdisk_size,
            self.ramdisk_addr,
            self.second_size,
            self.second_addr,
            self.tags_addr,
            self.page_size.get(),
            self.unused[0],
            self.unused[1],
        ] {
            write_le32(sink, value)?;
        }
        write_fixed_string(sink, "name", BOOT_NAME_SIZE, self.name.data())?;
        write_fixed_string(sink, "args", BOOT_ARGS_SIZE, self.args.data())?;
        sink.write_all(&self.id)?;
        pad_to(sink, HEADER_SIZE as u64, self.layout().kernel.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use rand::Rng;
    use std::io::Cursor;

    fn page(size: u32) -> NonZeroU32 {
        NonZeroU32::new(size).unwrap()
    }

    fn header(sizes: [u32; 3], page_size: u32) -> BootImageHeader {
        BootImageHeader::new(sizes, page(page_size), LoadAddresses::default(), Default::default(), Default::default())
    }

    #[test]
    fn padding_examples() {
        assert_eq!(compute_padding(0, page(2048)), 0);
        assert_eq!(compute_padding(100, page(2048)), 1948);
        assert_eq!(compute_padding(2048, page(2048)), 0);
        assert_eq!(compute_padding(2049, page(2048)), 2047);
        assert_eq!(compute_padding(12345, page(1)), 0);
    }

    #[test]
    fn padding_law() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let size: u64 = rng.gen_range(0..1 << 40);
            let page_size: u32 = rng.gen_range(1..=1 << 20);
            let padding = compute_padding(size, page(page_size));
            assert!(padding < u64::from(page_size));
            assert_eq!((size + padding) % u64::from(page_size), 0);
        }
    }

    #[test]
    fn addresses_from_default_base() {
        let addrs = LoadAddresses::default();
        assert_eq!(addrs.kernel, 0x1000_8000);
        assert_eq!(addrs.ramdisk, 0x1100_0000);
        assert_eq!(addrs.second, 0x10F0_0000);
        assert_eq!(addrs.tags, 0x1000_0100);
        assert_eq!(addrs.base(), DEFAULT_BASE_ADDR);
    }

    #[test]
    fn addresses_wrap() {
        let addrs = LoadAddresses::from_base(0xFFFF_0000);
        assert_eq!(addrs.kernel, 0xFFFF_8000);
        assert_eq!(addrs.ramdisk, 0x00FF_0000);
        assert_eq!(addrs.base(), 0xFFFF_0000);
    }

    #[test]
    fn layout_of_small_sections() {
        let layout = header([100, 50, 0], 2048).layout();
        assert_eq!(layout.kernel, SectionSpan { offset: 2048, size: 100, padding: 1948 });
        assert_eq!(layout.ramdisk, SectionSpan { offset: 4096, size: 50, padding: 1998 });
        assert_eq!(layout.second, SectionSpan { offset: 6144, size: 0, padding: 0 });
        assert_eq!(layout.total_size, 6144);
    }

    #[test]
    fn layout_with_second() {
        let layout = Layout::compute([4096, 1, 4097], page(4096));
        assert_eq!(layout.ramdisk.offset, 8192);
        assert_eq!(layout.second.offset, 12288);
        assert_eq!(layout.total_size, 12288 + 8192);
    }

    #[test]
    fn validate_rejects_empty_kernel() {
        let err = header([0, 1, 0], 2048).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("kernel_size"));
    }

    #[test]
    fn validate_rejects_empty_ramdisk() {
        let err = header([1, 0, 0], 2048).validate().unwrap_err();
        assert!(err.to_string().contains("ramdisk_size"));
    }

    #[test]
    fn validate_rejects_small_page() {
        let err = header([1, 1, 0], 512).validate().unwrap_err();
        assert!(matches!(err, BootImgError::InvalidField { field: "page_size", value: 512, .. }));
        assert!(err.to_string().contains(">= 608"));
        header([1, 1, 0], 608).validate().unwrap();
    }

    #[test]
    fn write_then_parse() {
        let original = header([10, 20, 30], 2048).with_digest(&[0xAB; DIGEST_SIZE]);
        let mut out = Vec::new();
        original.write(&mut out).unwrap();
        assert_eq!(out.len(), 2048);
        assert_eq!(&out[..8], b"ANDROID!");
        assert!(out[HEADER_SIZE..].iter().all(|b| *b == 0));

        let parsed = BootImageHeader::parse(&mut Cursor::new(&out)).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(&parsed.id()[..DIGEST_SIZE], &[0xAB; DIGEST_SIZE]);
        assert_eq!(&parsed.id()[DIGEST_SIZE..], &[0; BOOT_ID_SIZE - DIGEST_SIZE]);
    }

    #[test]
    fn unused_words_survive() {
        let mut out = Vec::new();
        header([1, 1, 0], 2048).write(&mut out).unwrap();
        out[40..44].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        out[44..48].copy_from_slice(&7u32.to_le_bytes());

        let parsed = BootImageHeader::parse(&mut Cursor::new(&out)).unwrap();
        assert_eq!(parsed.unused(), [0xDEAD_BEEF, 7]);

        let mut again = Vec::new();
        parsed.write(&mut again).unwrap();
        assert_eq!(again, out);
    }

    #[test]
    fn parse_rejects_zero_page_size() {
        let mut out = Vec::new();
        header([1, 1, 0], 2048).write(&mut out).unwrap();
        out[36..40].copy_from_slice(&0u32.to_le_bytes());
        let err = BootImageHeader::parse(&mut Cursor::new(&out)).unwrap_err();
        assert!(matches!(err, BootImgError::InvalidField { field: "page_size", value: 0, .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn parse_short_header() {
        let err = BootImageHeader::parse(&mut Cursor::new(b"ANDROID!")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn properties_format() {
        let props = header([100, 50, 0], 2048).properties();
        assert_eq!(props[0], ("baseAddr", "0x10000000".to_string()));
        assert_eq!(props[2], ("kernelSize", "0x00000064".to_string()));
        assert_eq!(props[8], ("pageSize", "0x00000800".to_string()));
        assert_eq!(props[9], ("name", String::new()));
    }
}
