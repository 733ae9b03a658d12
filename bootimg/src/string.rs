use std::{borrow::Cow, fmt, str};

use thiserror::Error;

/// An error for SizedCString construction
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SizedCStringError {
    #[error("Input string too big to fit into storage: {len} bytes, at most {width} allowed")]
    TooBig { len: usize, width: usize },
}

/// A null-padded string stored in a fixed `SIZE`-byte field
///
/// The meaningful content ends one past the last non-zero byte, so zero bytes followed by
/// more text are kept as part of the string while the trailing run of zeroes is not.
#[derive(Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct SizedCString<const SIZE: usize>([u8; SIZE]);

impl<const SIZE: usize> SizedCString<SIZE> {
    /// Width of the field in bytes
    pub const WIDTH: usize = SIZE;

    /// Returns the content with trailing zero bytes trimmed
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().rposition(|b| *b != 0).map_or(0, |last| last + 1);
        &self.0[..len]
    }
    /// Returns a reference to string stored within, or str::Utf8Error if it's not valid UTF-8 data
    /// <https://doc.rust-lang.org/std/str/fn.from_utf8.html>
    pub fn as_str(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(self.as_bytes())
    }
    /// Converts to a string, replacing invalid UTF-8 sequences with replacement character
    /// <https://doc.rust-lang.org/std/string/struct.String.html#method.from_utf8_lossy>
    #[must_use]
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
    /// Checks if string inside this struct is all zeroes
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }
    /// Returns a reference to the whole field, padding included
    #[must_use]
    pub fn data(&self) -> &[u8; SIZE] {
        &self.0
    }
}

impl<const SIZE: usize> Default for SizedCString<SIZE> {
    fn default() -> Self {
        Self([0u8; SIZE])
    }
}

impl<const SIZE: usize> From<[u8; SIZE]> for SizedCString<SIZE> {
    fn from(other: [u8; SIZE]) -> SizedCString<SIZE> {
        SizedCString(other)
    }
}

impl<const SIZE: usize> TryFrom<&[u8]> for SizedCString<SIZE> {
    type Error = SizedCStringError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() > SIZE {
            return Err(SizedCStringError::TooBig { len: value.len(), width: SIZE });
        }
        let mut data = [0u8; SIZE];
        data[..value.len()].copy_from_slice(value);
        Ok(Self(data))
    }
}

impl<const SIZE: usize> TryFrom<&str> for SizedCString<SIZE> {
    type Error = SizedCStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.as_bytes())
    }
}

impl<const SIZE: usize> fmt::Debug for SizedCString<SIZE> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_fmt(format_args!("{:?}", self.to_string_lossy()))
    }
}

impl<const SIZE: usize> fmt::Display for SizedCString<SIZE> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.to_string_lossy())
    }
}
