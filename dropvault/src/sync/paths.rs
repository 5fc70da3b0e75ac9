use std::path::{Path, PathBuf};

use percent_encoding::percent_decode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("identifier {identifier} is not under base {base}")]
    OutsideBase { identifier: String, base: String },
    #[error("malformed percent escape at byte {position} of {segment:?}")]
    MalformedEscape { segment: String, position: usize },
    #[error("decoded segment {0:?} is not valid UTF-8")]
    InvalidUtf8(String),
    #[error("decoded segment {0:?} contains a path separator")]
    EncodedSeparator(String),
    #[error("identifier contains unsupported component {0:?}")]
    UnsupportedComponent(String),
}

/// Maps remote identifiers to locations under the cache root.
///
/// The base identifier is fixed at construction, so mapping the same
/// identifier twice always yields the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    cache_root: PathBuf,
    base_identifier: String,
}

impl PathMapper {
    pub fn new(cache_root: impl Into<PathBuf>, base_identifier: impl Into<String>) -> Self {
        Self {
            cache_root: cache_root.into(),
            base_identifier: base_identifier.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn base_identifier(&self) -> &str {
        &self.base_identifier
    }

    pub fn local_path(&self, identifier: &str) -> Result<PathBuf, PathError> {
        let relative = self.relative_part(identifier)?;

        let mut out = self.cache_root.clone();
        for segment in relative.split('/') {
            match decode_segment(segment)?.as_str() {
                "" | "." => continue,
                ".." => return Err(PathError::UnsupportedComponent(segment.to_string())),
                decoded => out.push(decoded),
            }
        }
        Ok(out)
    }

    fn relative_part<'a>(&self, identifier: &'a str) -> Result<&'a str, PathError> {
        // Escape case only changes ASCII bytes, so offsets carry over.
        let normalized = normalize_escapes(identifier);
        let base = normalize_escapes(&self.base_identifier);
        if normalized.starts_with(base.as_str()) {
            return Ok(&identifier[base.len()..]);
        }
        // The root may be reported with or without its trailing slash.
        if normalized.trim_end_matches('/') == base.trim_end_matches('/') {
            return Ok("");
        }
        Err(PathError::OutsideBase {
            identifier: identifier.to_string(),
            base: self.base_identifier.clone(),
        })
    }
}

/// Uppercases the hex digits of every `%XX` escape.
fn normalize_escapes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_hex = 0;
    for ch in value.chars() {
        if pending_hex > 0 && ch.is_ascii_hexdigit() {
            out.push(ch.to_ascii_uppercase());
            pending_hex -= 1;
            continue;
        }
        pending_hex = if ch == '%' { 2 } else { 0 };
        out.push(ch);
    }
    out
}

fn decode_segment(segment: &str) -> Result<String, PathError> {
    let bytes = segment.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let valid = bytes
                .get(index + 1..index + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(PathError::MalformedEscape {
                    segment: segment.to_string(),
                    position: index,
                });
            }
            index += 3;
        } else {
            index += 1;
        }
    }

    let decoded = percent_decode(bytes)
        .decode_utf8()
        .map_err(|_| PathError::InvalidUtf8(segment.to_string()))?;
    if decoded.contains('/') || decoded.contains('\\') || decoded.contains('\0') {
        return Err(PathError::EncodedSeparator(segment.to_string()));
    }
    Ok(decoded.into_owned())
}
