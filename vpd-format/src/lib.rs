pub mod cursor;
pub mod detect;
pub mod ecc;
pub mod ipz;
pub mod keyword;
pub mod names;
pub mod store;
pub mod writer;

use std::fmt;

pub use detect::FormatKind;
pub use store::Store;

use tracing::{debug, warn};


#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    Detect(detect::Error),
    Invalid,
    Ipz(ipz::Error),
    Keyword(keyword::Error),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detect(inner) => write!(f, "{inner}"),
            Self::Invalid => write!(f, "buffer matches neither the IPZ nor the keyword VPD magic bytes"),
            Self::Ipz(inner) => write!(f, "{inner}"),
            Self::Keyword(inner) => write!(f, "{inner}"),
        }
    }
}
impl std::error::Error for Error {
}
impl From<detect::Error> for Error {
    fn from(e: detect::Error) -> Self {
        Self::Detect(e)
    }
}
impl From<ipz::Error> for Error {
    fn from(e: ipz::Error) -> Self {
        Self::Ipz(e)
    }
}
impl From<keyword::Error> for Error {
    fn from(e: keyword::Error) -> Self {
        Self::Keyword(e)
    }
}

/// Either variety of parsed VPD content, dispatched on by [`parse`].
pub enum VpdContent {
    Ipz {
        store: Store,
        vtoc: Vec<ipz::VtocEntry>,
    },
    Keyword(keyword::KeywordVpd),
}

/// Auto-detects the format of `buf` and parses it, correcting recoverable
/// IPZ ECC errors in `buf` in place as a side effect. Duplicate-keyword
/// warnings from the keyword format are logged rather than surfaced, since
/// the caller only gets the final merged value either way.
pub fn parse(buf: &mut [u8]) -> Result<VpdContent, Error> {
    match detect::detect(buf)? {
        FormatKind::Ipz => {
            let parsed = ipz::parse(buf)?;
            let vtoc = parsed.vtoc.clone();
            debug!(records = parsed.records.len(), "parsed IPZ VPD");
            Ok(VpdContent::Ipz { store: Store::from_parsed(parsed), vtoc })
        },
        FormatKind::Keyword => {
            let (content, warnings) = keyword::parse(buf)?;
            for w in &warnings {
                warn!(?w, "duplicate keyword in keyword VPD");
            }
            Ok(VpdContent::Keyword(content))
        },
        FormatKind::Invalid => Err(Error::Invalid),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_buffer_is_rejected() {
        let mut buf = vec![0u8; 32];
        assert_eq!(parse(&mut buf), Err(Error::Invalid));
    }

    #[test]
    fn too_short_buffer_is_rejected() {
        let mut buf = vec![0u8; 4];
        assert!(matches!(parse(&mut buf), Err(Error::Detect(detect::Error::EmptyBuffer))));
    }
}
