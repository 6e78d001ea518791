//! Charset detection and UTF-8 normalization.
//!
//! The extractor assumes UTF-8 unless a byte-order mark or an in-document
//! charset declaration says otherwise. Only the conversions the supported
//! formats actually need are implemented: UTF-16 (both endiannesses, BOM
//! selected) and ISO-8859-1; anything else falls back to lossy UTF-8.

/// UTF-8 byte-order mark.
pub const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Decode `data` under `charset` into UTF-8.
///
/// Charset names are matched case-insensitively and tolerate the usual
/// aliases. Unknown names decode as lossy UTF-8.
pub fn to_utf8(data: &[u8], charset: &str) -> String {
    let name = charset.trim().to_ascii_lowercase();
    match name.as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8_lossy(data).into_owned(),
        "iso-8859-1" | "iso8859-1" | "latin1" | "l1" | "windows-1252" | "cp1252" => {
            latin1_to_utf8(data)
        }
        "utf-16" | "utf16" | "ucs-2" => utf16_to_utf8(data),
        "utf-16le" | "utf16le" => utf16_units_to_utf8(data, false),
        "utf-16be" | "utf16be" => utf16_units_to_utf8(data, true),
        _ => String::from_utf8_lossy(data).into_owned(),
    }
}

/// ISO-8859-1 is a prefix of Unicode: each byte maps to the code point of
/// the same value.
pub fn latin1_to_utf8(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

/// Decode UTF-16, using a leading BOM to pick endianness (big-endian when
/// absent). The BOM itself is not emitted.
pub fn utf16_to_utf8(data: &[u8]) -> String {
    if data.starts_with(b"\xff\xfe") {
        utf16_units_to_utf8(&data[2..], false)
    } else if data.starts_with(b"\xfe\xff") {
        utf16_units_to_utf8(&data[2..], true)
    } else {
        utf16_units_to_utf8(data, true)
    }
}

fn utf16_units_to_utf8(data: &[u8], big_endian: bool) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Normalize a plain-text buffer: strip a UTF-8 BOM, or convert the whole
/// buffer from UTF-16 when it opens with a UTF-16 BOM; otherwise treat it
/// as UTF-8.
pub fn normalize_text(data: &[u8]) -> String {
    if data.starts_with(b"\xfe\xff") || data.starts_with(b"\xff\xfe") {
        utf16_to_utf8(data)
    } else if data.starts_with(UTF8_BOM) {
        String::from_utf8_lossy(&data[UTF8_BOM.len()..]).into_owned()
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_high_bytes_become_code_points() {
        assert_eq!(latin1_to_utf8(b"caf\xe9"), "café");
    }

    #[test]
    fn utf16_le_bom() {
        let data = b"\xff\xfeH\x00i\x00";
        assert_eq!(normalize_text(data), "Hi");
    }

    #[test]
    fn utf16_be_bom() {
        let data = b"\xfe\xff\x00H\x00i";
        assert_eq!(normalize_text(data), "Hi");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        assert_eq!(normalize_text(b"\xef\xbb\xbfHi"), "Hi");
    }

    #[test]
    fn plain_utf8_passes_through() {
        assert_eq!(normalize_text("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn surrogate_pairs_decode() {
        // U+1F600 as UTF-16LE with BOM.
        let data = b"\xff\xfe\x3d\xd8\x00\xde";
        assert_eq!(normalize_text(data), "\u{1f600}");
    }

    #[test]
    fn unknown_charset_falls_back_to_utf8() {
        assert_eq!(to_utf8(b"abc", "koi8-r"), "abc");
    }
}
