//! Encoding helpers shared by the subscription and storage paths.
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::{Rng, distr::Alphanumeric};
use thiserror::Error;

/// Failures while unwrapping a remote subscription payload
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decoded payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid percent-encoding: {0}")]
    Percent(String),
}

/// Decode base64 text leniently: whitespace is ignored, the URL-safe alphabet is
/// accepted and missing padding is restored.
pub fn decode_base64(input: &str) -> Result<String, DecodeError> {
    let mut normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }

    let bytes = STANDARD.decode(normalized.as_bytes())?;
    Ok(String::from_utf8(bytes)?)
}

pub fn encode_base64(input: &str) -> String {
    STANDARD.encode(input.as_bytes())
}

/// Percent-decode once.
pub fn percent_decode(input: &str) -> Result<String, DecodeError> {
    urlencoding::decode(input)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| DecodeError::Percent(e.to_string()))
}

/// Random alphanumeric string of `length` characters.
pub fn random_code(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_accepts_unpadded_and_url_safe_input() {
        // "ss://a?b" encodes to "c3M6Ly9hP2I="
        assert_eq!(decode_base64("c3M6Ly9hP2I").unwrap(), "ss://a?b");
        assert_eq!(decode_base64("c3M6Ly9hP2I=\n").unwrap(), "ss://a?b");
        assert_eq!(decode_base64(&encode_base64("a\nb")).unwrap(), "a\nb");
        assert_eq!(decode_base64("Pz8_").unwrap(), "???");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_base64("<html>not base64</html>").is_err());
        // valid base64 of invalid UTF-8
        assert!(matches!(
            decode_base64("/w==").unwrap_err(),
            DecodeError::Utf8(_)
        ));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b%23c").unwrap(), "a b#c");
        assert!(percent_decode("%FF%FE").is_err());
    }

    #[test]
    fn test_random_code_shape() {
        let code = random_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(random_code(16), random_code(16));
    }
}
