//! Validation of client-supplied identifiers that end up in file paths.
//!
//! Match ids and temp-storage file names are joined onto storage
//! directories, so anything that could escape the directory (separators,
//! `..`, control characters) is rejected rather than sanitized.

use crate::{Error, Result};

/// Longest identifier accepted from a request path.
const MAX_ID_LEN: usize = 128;

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Validate a match identifier.
///
/// # Examples
///
/// ```
/// use courtside::utils::filename::validate_match_id;
///
/// assert!(validate_match_id("66f93f9c728b890c58714882").is_ok());
/// assert!(validate_match_id("../etc/passwd").is_err());
/// ```
pub fn validate_match_id(id: &str) -> Result<&str> {
    if id.is_empty() || id.len() > MAX_ID_LEN || !id.chars().all(is_id_char) {
        return Err(Error::validation(format!("Invalid match id: {id:?}")));
    }
    Ok(id)
}

/// Validate a bare file name of the form `stem.ext` (extension optional).
pub fn validate_file_name(name: &str) -> Result<&str> {
    let (stem, ext) = match name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };

    let valid_part = |part: &str| !part.is_empty() && part.chars().all(is_id_char);

    if name.len() > MAX_ID_LEN || !valid_part(stem) || !ext.is_none_or(valid_part) {
        return Err(Error::validation(format!("Invalid file name: {name:?}")));
    }
    Ok(name)
}

/// File stem of a validated file name (`clip.mp4` -> `clip`).
pub fn file_stem(name: &str) -> &str {
    name.split_once('.').map_or(name, |(stem, _)| stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_id_accepts_object_ids() {
        assert!(validate_match_id("507f1f77bcf86cd799439011").is_ok());
        assert!(validate_match_id("match_01-b").is_ok());
    }

    #[test]
    fn test_match_id_rejects_path_tricks() {
        for bad in ["", "..", "a/b", "a\\b", "a.b", "a b", "a\0b"] {
            assert!(validate_match_id(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_match_id_length_limit() {
        assert!(validate_match_id(&"a".repeat(MAX_ID_LEN)).is_ok());
        assert!(validate_match_id(&"a".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_file_name_validation() {
        assert!(validate_file_name("rally.mp4").is_ok());
        assert!(validate_file_name("rally").is_ok());
        assert!(validate_file_name("rally.tar.gz").is_err());
        assert!(validate_file_name(".hidden").is_err());
        assert!(validate_file_name("rally.").is_err());
        assert!(validate_file_name("../rally.mp4").is_err());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("rally.mp4"), "rally");
        assert_eq!(file_stem("rally"), "rally");
    }
}
