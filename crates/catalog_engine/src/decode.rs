use chardetng::EncodingDetector;
use encoding_rs::Encoding;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode bytes with {encoding}: {message}")]
    DecodeFailure { encoding: String, message: String },
}

/// Decode raw bytes into UTF-8 using: BOM -> Content-Type charset -> chardetng fallback.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedHtml, DecodeError> {
    let encoding = pick_encoding(bytes, content_type);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: encoding.name().to_string(),
            message: "decoding error".into(),
        });
    }
    Ok(DecodedHtml {
        html: text.into_owned(),
        encoding_label: encoding.name().to_string(),
    })
}

/// Like [`decode_html`], but malformed sequences become U+FFFD instead of failing.
///
/// Catalog pages are scraped for links only, so a few replaced characters
/// never matter.
pub fn decode_lossy(bytes: &[u8], content_type: Option<&str>) -> DecodedHtml {
    let encoding = pick_encoding(bytes, content_type);
    let (text, _, _) = encoding.decode(bytes);
    DecodedHtml {
        html: text.into_owned(),
        encoding_label: encoding.name().to_string(),
    }
}

fn pick_encoding(bytes: &[u8], content_type: Option<&str>) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    if let Some(label) = content_type.and_then(extract_charset) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            return enc;
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()))
        })
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_charset_wins_over_detection() {
        let bytes = [0x43, 0xe2, 0x6d, 0x65, 0x72, 0x61]; // "Câmera" in latin-1
        let decoded = decode_html(&bytes, Some("text/html; Charset=\"ISO-8859-1\"")).unwrap();
        assert_eq!(decoded.html, "Câmera");
        assert_eq!(decoded.encoding_label, "windows-1252");
    }

    #[test]
    fn bom_overrides_header() {
        let mut bytes = vec![0xef, 0xbb, 0xbf];
        bytes.extend_from_slice("ação".as_bytes());
        let decoded = decode_html(&bytes, Some("text/html; charset=iso-8859-1")).unwrap();
        assert_eq!(decoded.html, "ação");
        assert_eq!(decoded.encoding_label, "UTF-8");
    }

    #[test]
    fn lossy_decode_replaces_bad_sequences() {
        let bytes = [b'o', b'k', 0xff, b'!'];
        assert!(decode_html(&bytes, Some("text/html; charset=utf-8")).is_err());
        let decoded = decode_lossy(&bytes, Some("text/html; charset=utf-8"));
        assert_eq!(decoded.html, "ok\u{fffd}!");
    }
}
