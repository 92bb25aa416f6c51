//! Bounds-checked, endian-aware reads over an immutable byte buffer.
//!
//! Every structural read in the crate goes through [`ByteReader`]. Offsets are
//! `u64` because they come straight out of ELF fields; conversion to `usize`
//! and all offset arithmetic are checked.

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};

/// Byte order of multi-byte fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn is_little_endian(&self) -> bool {
        matches!(self, Endian::Little)
    }
}

/// Read-only view over the image with a fixed byte order.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'data> {
    data: &'data [u8],
    endian: Endian,
}

impl<'data> ByteReader<'data> {
    pub fn new(data: &'data [u8], endian: Endian) -> Self {
        Self { data, endian }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Same buffer, different byte order.
    pub fn with_endian(&self, endian: Endian) -> Self {
        Self {
            data: self.data,
            endian,
        }
    }

    /// Bytes `[offset, offset + len)`, or `OutOfBounds`.
    pub fn slice(&self, offset: u64, len: u64) -> Result<&'data [u8]> {
        let end = checked_add(offset, len, "slice end")?;
        if end > self.data.len() as u64 {
            return Err(self.out_of_bounds(offset, len));
        }
        // Both bounds are <= data.len(), which fits in usize.
        Ok(&self.data[offset as usize..end as usize])
    }

    /// True when `[offset, offset + len)` lies inside the buffer.
    pub fn contains_range(&self, offset: u64, len: u64) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.data.len() as u64)
    }

    fn array<const N: usize>(&self, offset: u64) -> Result<[u8; N]> {
        let bytes = self.slice(offset, N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&self, offset: u64) -> Result<u8> {
        Ok(self.array::<1>(offset)?[0])
    }

    pub fn read_u16(&self, offset: u64) -> Result<u16> {
        let bytes = self.array::<2>(offset)?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32> {
        let bytes = self.array::<4>(offset)?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        let bytes = self.array::<8>(offset)?;
        Ok(match self.endian {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        })
    }

    pub fn read_i32(&self, offset: u64) -> Result<i32> {
        self.read_u32(offset).map(|v| v as i32)
    }

    pub fn read_i64(&self, offset: u64) -> Result<i64> {
        self.read_u64(offset).map(|v| v as i64)
    }

    /// Unsigned integer of `width` bytes (1, 2, 4 or 8).
    pub fn read_uint(&self, offset: u64, width: usize) -> Result<u64> {
        match width {
            1 => self.read_u8(offset).map(u64::from),
            2 => self.read_u16(offset).map(u64::from),
            4 => self.read_u32(offset).map(u64::from),
            8 => self.read_u64(offset),
            _ => Err(self.out_of_bounds(offset, width as u64)),
        }
    }

    /// Null-terminated string starting at `start + rel` and not reading past
    /// `start + size`. A missing terminator ends the string at the range end.
    pub fn read_cstr_in(&self, start: u64, size: u64, rel: u64) -> Result<String> {
        let table = self.slice(start, size)?;
        if rel >= table.len() as u64 {
            return Err(self.out_of_bounds(checked_add(start, rel, "string offset")?, 1));
        }
        let tail = &table[rel as usize..];
        let end = memchr::memchr(0, tail).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    fn out_of_bounds(&self, offset: u64, width: u64) -> AnalysisError {
        AnalysisError::OutOfBounds {
            offset,
            width,
            length: self.data.len(),
        }
    }
}

/// `a + b`, or `IntegerOverflow` naming what was being computed.
pub fn checked_add(a: u64, b: u64, context: &str) -> Result<u64> {
    a.checked_add(b).ok_or_else(|| AnalysisError::IntegerOverflow {
        context: context.to_string(),
    })
}

/// `a * b`, or `IntegerOverflow`.
pub fn checked_mul(a: u64, b: u64, context: &str) -> Result<u64> {
    a.checked_mul(b).ok_or_else(|| AnalysisError::IntegerOverflow {
        context: context.to_string(),
    })
}

/// Table entry address `base + index * entry_size`.
pub fn entry_offset(base: u64, index: u64, entry_size: u64) -> Result<u64> {
    checked_add(base, checked_mul(index, entry_size, "entry offset")?, "entry offset")
}

/// Narrow a file quantity to the platform width.
pub fn to_usize(value: u64, context: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| AnalysisError::IntegerOverflow {
        context: context.to_string(),
    })
}
