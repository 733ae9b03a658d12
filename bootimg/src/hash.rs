use sha1::{Digest, Sha1};

use crate::binary::digest_le32;

/// Length of the content digest copied into the header id
pub const DIGEST_SIZE: usize = 20;

/// Computes sha1 hash of a given byte slice
pub fn sha1(data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the content digest of in-memory sections
///
/// Each section's bytes are followed by its size as little-endian u32, in kernel, ramdisk,
/// second order. An absent second section still contributes its zero size.
pub fn content_digest(sections: [&[u8]; 3]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha1::new();
    for data in sections {
        hasher.update(data);
        // callers hand over sections whose length already came from a u32 field
        digest_le32(&mut hasher, data.len() as u32);
    }
    hasher.finalize().into()
}
