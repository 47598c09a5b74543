//! In-place keyword value rewriting for IPZ blobs.
//!
//! Writing never changes a keyword's length on the wire: a shorter value is
//! padded with `0x00` out to the existing capacity, and a longer one is
//! rejected with `ValueTooLong`. This mirrors the fixed-size-field
//! constraint real VPD EEPROMs impose — there's nowhere to grow into.

use std::fmt;
use std::ops::Range;

use crate::cursor::{self, Cursor};
use crate::ecc;
use crate::ipz::VtocEntry;
use crate::names::printable_name;

const SMALL_RESOURCE_END_TAG: u8 = 0x78;


#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    OutOfBounds,
    RecordNotFound,
    KeywordNotFound,
    ValueTooLong { capacity: usize, requested: usize },
    Ecc(ecc::Error),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds
                => write!(f, "record body falls outside the buffer"),
            Self::RecordNotFound
                => write!(f, "no VTOC entry names that record"),
            Self::KeywordNotFound
                => write!(f, "record has no keyword by that name"),
            Self::ValueTooLong { capacity, requested }
                => write!(f, "new value is {requested} bytes but the keyword only has room for {capacity}"),
            Self::Ecc(inner)
                => write!(f, "failed to recompute ECC after write: {inner}"),
        }
    }
}
impl std::error::Error for Error {
}
impl From<cursor::Error> for Error {
    fn from(_: cursor::Error) -> Self {
        Self::OutOfBounds
    }
}
impl From<ecc::Error> for Error {
    fn from(e: ecc::Error) -> Self {
        Self::Ecc(e)
    }
}

/// Walks a record's keyword list looking for `keyword_name` (compared by its
/// printable form), returning the byte range of its *value* if found.
fn locate_value(buf: &[u8], start: usize, end: usize, keyword_name: &str) -> Result<Option<Range<usize>>, Error> {
    if end > buf.len() {
        return Err(Error::OutOfBounds);
    }
    let window = &buf[..end];
    let mut cursor = Cursor::new(window);
    cursor.seek_forward(start)?;

    while cursor.position() < end {
        if cursor.peek(1)?[0] == SMALL_RESOURCE_END_TAG {
            break;
        }
        let name: [u8; 2] = cursor.read_bytes(2)?.try_into().unwrap();
        let len = if name[0] == b'#' {
            cursor.read_u16_le()? as usize
        } else {
            cursor.read_u8()? as usize
        };
        let value_start = cursor.position();
        let value_end = value_start.checked_add(len).ok_or(Error::OutOfBounds)?;
        if value_end > end {
            return Err(Error::OutOfBounds);
        }
        if printable_name(name) == keyword_name {
            return Ok(Some(value_start..value_end));
        }
        cursor.skip(len)?;
    }
    Ok(None)
}

/// Overwrites `keyword_name` within `record_name`, padding with `0x00` up to
/// its existing on-wire capacity, then recomputes that record's ECC.
/// Returns the number of bytes actually written (before padding).
pub fn write_keyword(
    buf: &mut [u8],
    vtoc: &[VtocEntry],
    record_name: &str,
    keyword_name: &str,
    new_value: &[u8],
) -> Result<usize, Error> {
    let entry = vtoc.iter().find(|e| e.record_name == record_name.as_bytes())
        .ok_or(Error::RecordNotFound)?;

    let body_start = entry.record_offset as usize + 3;
    let body_end = body_start.checked_add(entry.record_length as usize).ok_or(Error::OutOfBounds)?;
    if body_end > buf.len() {
        return Err(Error::OutOfBounds);
    }

    let value_range = locate_value(buf, body_start, body_end, keyword_name)?
        .ok_or(Error::KeywordNotFound)?;
    let capacity = value_range.len();
    if new_value.len() > capacity {
        return Err(Error::ValueTooLong { capacity, requested: new_value.len() });
    }

    let written = new_value.len();
    buf[value_range.start..value_range.start + written].copy_from_slice(new_value);
    for b in &mut buf[value_range.start + written..value_range.end] {
        *b = 0x00;
    }

    let ecc_start = entry.ecc_offset as usize;
    let ecc_end = ecc_start.checked_add(entry.ecc_length as usize).ok_or(Error::OutOfBounds)?;
    ecc::update(buf, body_start..body_end, ecc_start..ecc_end)?;

    Ok(written)
}
