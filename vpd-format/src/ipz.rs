//! IPZ: the record/keyword VPD format with a per-record ECC.
//!
//! Layout (all multi-byte fields little-endian):
//!
//! ```text
//! [0..17)   opaque header preamble
//! [17]      0x84 large-resource tag for VHDR
//! [18..20)  VHDR record length (u16 LE)
//! [20..61)  fixed VHDR body (opaque to this parser)
//! [61]      0x84 large-resource tag for VTOC
//! [62..64)  VTOC record length (u16 LE)
//! [64..)    VTOC body: RT keyword ("VTOC"), then PT keyword (VTOC entries)
//! ...       data records, each framed the same way as VTOC
//! ```
//!
//! The two-byte VHDR/VTOC length fields sit immediately after their tag
//! byte rather than overlapping it — this is the only framing that stays
//! internally consistent with how every data record and the VTOC entry
//! table lay out their own tag+length+body elsewhere in this format.

use std::fmt;

use display_bytes::DisplayBytes;

use crate::cursor::{self, Cursor};
use crate::ecc;

const VHDR_TAG_OFFSET: usize = 17;
const VHDR_LENGTH_OFFSET: usize = 18;
const VTOC_TAG_OFFSET: usize = 61;
const VTOC_LENGTH_OFFSET: usize = 62;
const VTOC_BODY_OFFSET: usize = 64;
const LARGE_RESOURCE_TAG: u8 = 0x84;
const SMALL_RESOURCE_END_TAG: u8 = 0x78;
const VTOC_ENTRY_LEN: usize = 12;


#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    OutOfBounds,
    MissingHeader,
    MissingVtoc,
    RtMismatch { record: [u8; 4] },
    MalformedLength,
    EccCheckFailed { record: [u8; 4] },
    EccUncorrectable { record: [u8; 4] },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds
                => write!(f, "IPZ data ends before its declared structure does"),
            Self::MissingHeader
                => write!(f, "VHDR large-resource tag is missing"),
            Self::MissingVtoc
                => write!(f, "VTOC tag or its PT keyword is missing"),
            Self::RtMismatch { record }
                => write!(f, "record {}'s RT keyword does not match its name", display_name(record)),
            Self::MalformedLength
                => write!(f, "a record or keyword length does not fit the surrounding frame"),
            Self::EccCheckFailed { record }
                => write!(f, "ECC check failed for record {}", display_name(record)),
            Self::EccUncorrectable { record }
                => write!(f, "ECC for record {} detected more errors than it can correct", display_name(record)),
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

fn display_name(name: &[u8; 4]) -> DisplayBytes<4> {
    DisplayBytes::from(*name)
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VtocEntry {
    pub record_name: [u8; 4],
    pub record_offset: u16,
    pub record_length: u16,
    pub ecc_offset: u16,
    pub ecc_length: u16,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Record {
    pub name: [u8; 4],
    /// Keywords in on-wire order; the first is always `RT`.
    pub keywords: Vec<([u8; 2], Vec<u8>)>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ParsedIpz {
    pub vtoc: Vec<VtocEntry>,
    pub records: Vec<Record>,
}

fn checked_range(buf: &[u8], start: usize, len: usize) -> Result<std::ops::Range<usize>, Error> {
    let end = start.checked_add(len).ok_or(Error::OutOfBounds)?;
    if end > buf.len() {
        return Err(Error::OutOfBounds);
    }
    Ok(start..end)
}

/// Parses keywords in `[start, end)`, stopping early if the small-resource
/// end tag is encountered before `end` is reached.
fn parse_keywords(buf: &[u8], start: usize, end: usize) -> Result<Vec<([u8; 2], Vec<u8>)>, Error> {
    if end > buf.len() {
        return Err(Error::OutOfBounds);
    }
    let window = &buf[..end];
    let mut cursor = Cursor::new(window);
    cursor.seek_forward(start)?;

    let mut keywords = Vec::new();
    while cursor.position() < end {
        if cursor.peek(1)?[0] == SMALL_RESOURCE_END_TAG {
            break;
        }
        let name: [u8; 2] = cursor.read_bytes(2)?.try_into().unwrap();
        let value = if name[0] == b'#' {
            let len = cursor.read_u16_le()? as usize;
            cursor.read_bytes(len)?.to_vec()
        } else {
            let len = cursor.read_u8()? as usize;
            cursor.read_bytes(len)?.to_vec()
        };
        keywords.push((name, value));
    }
    Ok(keywords)
}

fn require_rt(record_name: [u8; 4], keywords: &[([u8; 2], Vec<u8>)]) -> Result<(), Error> {
    match keywords.first() {
        Some((name, value)) if name == b"RT" && value.as_slice() == record_name => Ok(()),
        _ => Err(Error::RtMismatch { record: record_name }),
    }
}

fn parse_vtoc_entries(pt_value: &[u8]) -> Result<Vec<VtocEntry>, Error> {
    if pt_value.len() % VTOC_ENTRY_LEN != 0 {
        return Err(Error::MalformedLength);
    }
    pt_value.chunks_exact(VTOC_ENTRY_LEN).map(|chunk| {
        Ok(VtocEntry {
            record_name: chunk[0..4].try_into().unwrap(),
            record_offset: u16::from_le_bytes(chunk[4..6].try_into().unwrap()),
            record_length: u16::from_le_bytes(chunk[6..8].try_into().unwrap()),
            ecc_offset: u16::from_le_bytes(chunk[8..10].try_into().unwrap()),
            ecc_length: u16::from_le_bytes(chunk[10..12].try_into().unwrap()),
        })
    }).collect()
}

/// Parses one VTOC-referenced record, verifying (and auto-correcting) its ECC.
fn parse_record(buf: &mut [u8], entry: &VtocEntry) -> Result<Record, Error> {
    let frame_start = entry.record_offset as usize;
    let tag_range = checked_range(buf, frame_start, 3)?;
    if buf[tag_range.start] != LARGE_RESOURCE_TAG {
        return Err(Error::MalformedLength);
    }
    let declared_len = u16::from_le_bytes(buf[tag_range.start + 1..tag_range.end].try_into().unwrap());
    if declared_len != entry.record_length {
        return Err(Error::MalformedLength);
    }

    let body_start = tag_range.end;
    let body_range = checked_range(buf, body_start, entry.record_length as usize)?;
    let ecc_range = checked_range(buf, entry.ecc_offset as usize, entry.ecc_length as usize)?;

    ecc::verify(buf, body_range.clone(), ecc_range).map_err(|e| match e {
        ecc::Error::Uncorrectable => Error::EccUncorrectable { record: entry.record_name },
        _ => Error::EccCheckFailed { record: entry.record_name },
    })?;

    let keywords = parse_keywords(buf, body_range.start, body_range.end)?;
    require_rt(entry.record_name, &keywords)?;

    Ok(Record { name: entry.record_name, keywords })
}

/// Parses the full IPZ blob, validating the header, walking the VTOC, and
/// parsing+ECC-checking every record it names. Corrects single-bit ECC
/// errors in `buf` in place as a side effect.
pub fn parse(buf: &mut [u8]) -> Result<ParsedIpz, Error> {
    if buf.len() <= VHDR_TAG_OFFSET || buf[VHDR_TAG_OFFSET] != LARGE_RESOURCE_TAG {
        return Err(Error::MissingHeader);
    }
    if buf.len() < VHDR_LENGTH_OFFSET + 2 {
        return Err(Error::MissingHeader);
    }

    if buf.len() <= VTOC_TAG_OFFSET || buf[VTOC_TAG_OFFSET] != LARGE_RESOURCE_TAG {
        return Err(Error::MissingVtoc);
    }
    let vtoc_len_range = checked_range(buf, VTOC_LENGTH_OFFSET, 2).map_err(|_| Error::MissingVtoc)?;
    let vtoc_len = u16::from_le_bytes(buf[vtoc_len_range].try_into().unwrap()) as usize;
    let vtoc_body_range = checked_range(buf, VTOC_BODY_OFFSET, vtoc_len).map_err(|_| Error::MissingVtoc)?;

    let vtoc_keywords = parse_keywords(buf, vtoc_body_range.start, vtoc_body_range.end)
        .map_err(|_| Error::MissingVtoc)?;
    if vtoc_keywords.first().map(|(n, v)| n == b"RT" && v.as_slice() == b"VTOC") != Some(true) {
        return Err(Error::MissingVtoc);
    }
    let pt_value = vtoc_keywords.iter().find(|(n, _)| n == b"PT").map(|(_, v)| v.as_slice())
        .ok_or(Error::MissingVtoc)?;
    let vtoc = parse_vtoc_entries(pt_value)?;

    let mut records = Vec::with_capacity(vtoc.len());
    for entry in &vtoc {
        records.push(parse_record(buf, entry)?);
    }

    Ok(ParsedIpz { vtoc, records })
}
