//! H.264 Annex B byte-stream scanning (ITU-T H.264 Annex B).
//!
//! NAL units in a byte stream are delimited by start codes:
//! - 4-byte: `0x00 0x00 0x00 0x01`
//! - 3-byte: `0x00 0x00 0x01`
//!
//! [`NalUnits`] walks a buffer once, left to right, and yields the byte
//! range of each NAL unit with its start code removed. It holds no state
//! beyond its cursor: to rescan, build a new iterator over the buffer.

use std::ops::Range;

/// H.264 NAL unit types the server cares about (Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalType {
    /// Coded slice of a non-IDR picture (type 1).
    NonIdrSlice,
    /// Coded slice of an IDR picture (type 5).
    IdrSlice,
    /// Sequence parameter set (type 7).
    Sps,
    /// Picture parameter set (type 8).
    Pps,
    Other(u8),
}

impl NalType {
    /// Classify a NAL unit by its header byte (start code already removed).
    pub fn of(nal: &[u8]) -> Option<Self> {
        let header = *nal.first()?;
        Some(match header & 0x1f {
            1 => Self::NonIdrSlice,
            5 => Self::IdrSlice,
            7 => Self::Sps,
            8 => Self::Pps,
            other => Self::Other(other),
        })
    }
}

/// Length of the start code at the very beginning of `data`, if any.
pub fn start_code_len(data: &[u8]) -> Option<usize> {
    if data.starts_with(&[0, 0, 0, 1]) {
        Some(4)
    } else if data.starts_with(&[0, 0, 1]) {
        Some(3)
    } else {
        None
    }
}

/// Remove a leading 3- or 4-byte start code. Input without one is
/// returned unchanged (it is treated as already stripped).
pub fn strip_start_code(data: &[u8]) -> &[u8] {
    match start_code_len(data) {
        Some(len) => &data[len..],
        None => data,
    }
}

/// Iterator over the NAL unit ranges of an Annex B buffer.
///
/// - Bytes before the first start code form a unit of their own, so a
///   buffer with no start code at all yields itself once.
/// - Empty units (back-to-back start codes) are skipped.
/// - A `00 00 00 01` sequence is always consumed as one 4-byte start code,
///   so the zero byte never leaks into the preceding unit.
#[derive(Debug, Clone)]
pub struct NalUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NalUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Find the next start code at or after `from`; returns (offset, length).
    fn next_start_code(&self, from: usize) -> Option<(usize, usize)> {
        let data = self.data;
        let mut i = from;
        while i + 2 < data.len() {
            if data[i] == 0 && data[i + 1] == 0 {
                if data[i + 2] == 1 {
                    return Some((i, 3));
                }
                if data[i + 2] == 0 && i + 3 < data.len() && data[i + 3] == 1 {
                    return Some((i, 4));
                }
            }
            i += 1;
        }
        None
    }
}

impl Iterator for NalUnits<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let start = match self.next_start_code(self.pos) {
                Some((offset, len)) if offset == self.pos => self.pos + len,
                _ => self.pos,
            };
            let end = self
                .next_start_code(start)
                .map_or(self.data.len(), |(offset, _)| offset);
            self.pos = end;
            if start < end {
                return Some(start..end);
            }
        }
        None
    }
}

/// Convenience: split a buffer into NAL unit slices.
pub fn split_nal_units(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    NalUnits::new(data).map(move |range| &data[range])
}
