//! Printable-name transforms for keyword name classes.
//!
//! A keyword's on-wire name is always exactly two bytes, but large
//! keywords (`#` followed by an alphanumeric) and numeric keywords (a
//! leading ASCII digit) get a synthetic printable name for lookups and
//! `Debug` output, matching the `kw[0] == '#'` handling VPD inventory
//! interfaces apply when surfacing keyword data upstream.

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum KeywordClass {
    Standard,
    Large,
    Numeric,
}

pub fn classify(wire_name: [u8; 2]) -> KeywordClass {
    if wire_name[0] == b'#' {
        KeywordClass::Large
    } else if wire_name[0].is_ascii_digit() {
        KeywordClass::Numeric
    } else {
        KeywordClass::Standard
    }
}

/// The printable name used for `Store` lookups and re-encoding.
///
/// - Standard: the two wire bytes, as ASCII.
/// - Large (`#X`): `PD_X`, dropping the `#` and keeping the alphanumeric byte.
/// - Numeric (leading digit, e.g. `0A`): `N_0A`, a synthetic prefix that keeps
///   both wire bytes visible since the digit itself isn't a useful discriminator.
pub fn printable_name(wire_name: [u8; 2]) -> String {
    match classify(wire_name) {
        KeywordClass::Standard => {
            String::from_utf8_lossy(&wire_name).into_owned()
        },
        KeywordClass::Large => {
            format!("PD_{}", wire_name[1] as char)
        },
        KeywordClass::Numeric => {
            format!("N_{}{}", wire_name[0] as char, wire_name[1] as char)
        },
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_keyword_is_passthrough() {
        assert_eq!(printable_name(*b"SN"), "SN");
    }

    #[test]
    fn large_keyword_gets_pd_prefix() {
        assert_eq!(classify(*b"#D"), KeywordClass::Large);
        assert_eq!(printable_name(*b"#D"), "PD_D");
    }

    #[test]
    fn numeric_keyword_gets_synthetic_prefix() {
        assert_eq!(classify(*b"0A"), KeywordClass::Numeric);
        assert_eq!(printable_name(*b"0A"), "N_0A");
    }
}
