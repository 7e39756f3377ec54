use crate::error::ParseError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// How a raw table is stored by its publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableEncoding {
    #[serde(rename = "plain")]
    #[default]
    Plain,
    /// Base64 when it decodes cleanly, otherwise the raw text.
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "base64")]
    Base64,
    /// Base64, then XOR with the configured key.
    #[serde(rename = "base64_xor")]
    Base64Xor,
}

pub fn decode_table(
    raw: &str,
    encoding: TableEncoding,
    xor_key: Option<&str>,
) -> Result<String, ParseError> {
    match encoding {
        TableEncoding::Plain => Ok(raw.to_string()),
        // Base64 never carries tabs.
        TableEncoding::Auto if raw.contains('\t') => Ok(raw.to_string()),
        TableEncoding::Auto => match base64_text(raw, None) {
            Ok(text) => Ok(text),
            Err(_) => Ok(raw.to_string()),
        },
        TableEncoding::Base64 => base64_text(raw, None),
        TableEncoding::Base64Xor => {
            let key = xor_key
                .filter(|k| !k.is_empty())
                .ok_or_else(|| ParseError::Decode("base64_xor needs a non-empty xor_key".into()))?;
            base64_text(raw, Some(key.as_bytes()))
        }
    }
}

/// Inverse of [`decode_table`] for the base64 encodings.
pub fn encode_table(text: &str, xor_key: Option<&str>) -> String {
    let mut bytes = text.as_bytes().to_vec();
    if let Some(key) = xor_key.filter(|k| !k.is_empty()) {
        xor_in_place(&mut bytes, key.as_bytes());
    }
    STANDARD.encode(bytes)
}

fn base64_text(raw: &str, xor_key: Option<&[u8]>) -> Result<String, ParseError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ParseError::Decode(e.to_string()))?;
    if let Some(key) = xor_key {
        xor_in_place(&mut bytes, key);
    }
    String::from_utf8(bytes).map_err(|e| ParseError::Decode(e.to_string()))
}

fn xor_in_place(bytes: &mut [u8], key: &[u8]) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b ^= key[i % key.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "Serial\tName\tRoll\tGPA\tTotal\tInstitution\n1\tJohn Doe\t100234\t5.00\t980\tABC School";

    #[test]
    fn auto_falls_back_to_plain_text() {
        let decoded = decode_table(TABLE, TableEncoding::Auto, None).unwrap();
        assert_eq!(decoded, TABLE);
    }

    #[test]
    fn auto_decodes_base64() {
        let encoded = encode_table(TABLE, None);
        assert_eq!(decode_table(&encoded, TableEncoding::Auto, None).unwrap(), TABLE);
    }

    #[test]
    fn xor_layer_needs_the_same_key() {
        let encoded = encode_table(TABLE, Some("board"));
        let decoded = decode_table(&encoded, TableEncoding::Base64Xor, Some("board")).unwrap();
        assert_eq!(decoded, TABLE);

        let wrong = decode_table(&encoded, TableEncoding::Base64Xor, Some("other"));
        assert_ne!(wrong.ok().as_deref(), Some(TABLE));
    }

    #[test]
    fn xor_without_key_is_rejected() {
        let encoded = encode_table(TABLE, Some("board"));
        assert!(matches!(
            decode_table(&encoded, TableEncoding::Base64Xor, None),
            Err(ParseError::Decode(_))
        ));
    }

    #[test]
    fn wrapped_base64_lines_are_accepted() {
        let encoded = encode_table(TABLE, None);
        let wrapped = encoded
            .as_bytes()
            .chunks(16)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(decode_table(&wrapped, TableEncoding::Base64, None).unwrap(), TABLE);
    }
}
