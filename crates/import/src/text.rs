use crate::outcome::ParseError;

/// Decodes statement bytes to text.
///
/// UTF-8 is preferred (a leading BOM is dropped). Anything else without NUL
/// bytes is read as Latin-1, which many bank exports use; the second value
/// carries a warning in that case.
pub fn decode(bytes: &[u8]) -> Result<(String, Option<String>), ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ParseError::Empty);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok((s.to_string(), None)),
        Err(_) if bytes.contains(&0) => Err(ParseError::Unreadable),
        Err(_) => {
            let text = bytes.iter().map(|&b| char::from(b)).collect();
            Ok((
                text,
                Some("File is not UTF-8; decoded as Latin-1".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through_without_bom() {
        let (text, warning) = decode("\u{feff}data,descrição".as_bytes()).unwrap();
        assert_eq!(text, "data,descrição");
        assert!(warning.is_none());
    }

    #[test]
    fn latin1_fallback_warns() {
        // "Pão" in Latin-1
        let (text, warning) = decode(&[b'P', 0xE3, b'o']).unwrap();
        assert_eq!(text, "Pão");
        assert!(warning.is_some());
    }

    #[test]
    fn empty_and_binary_are_catastrophic() {
        assert!(matches!(decode(b""), Err(ParseError::Empty)));
        assert!(matches!(decode(b" \n\r\n"), Err(ParseError::Empty)));
        assert!(matches!(decode(&[0xFF, 0x00, 0xFE]), Err(ParseError::Unreadable)));
    }
}
