//! src/services/path_sanitizer.rs
//!
//! Turns an untrusted, URL-derived pathname into a location beneath the
//! content directory, or rejects it. Everything here is pure: no filesystem
//! access, no shared state, so the same input always yields the same answer.
//!
//! Rules run in a fixed order and the first failure wins:
//! 1. non-empty after trimming whitespace
//! 2. no `..` anywhere in the raw input
//! 3. leading `/` stripped, remainder non-empty
//! 4. at most `max_len` characters
//! 5. no empty segments, no segment starting with `.`
//! 6. no control characters (including NUL)
//! 7. only ASCII letters, digits, `-`, `_`, `.` and `/`
//! 8. final segment carries an extension of 1..=`max_extension_len` chars
//! 9. the joined path stays strictly inside the base directory

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MAX_PATH_LEN: usize = 255;
pub const DEFAULT_MAX_EXTENSION_LEN: usize = 10;

/// Tunable strictness for pathname validation.
///
/// The defaults are the strict policy: extensions required, dotfiles refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    pub max_len: usize,
    pub max_extension_len: usize,
    pub require_extension: bool,
    pub allow_hidden_segments: bool,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_PATH_LEN,
            max_extension_len: DEFAULT_MAX_EXTENSION_LEN,
            require_extension: true,
            allow_hidden_segments: false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathRejection {
    #[error("pathname is empty")]
    Empty,
    #[error("pathname must not contain `..`")]
    Traversal,
    #[error("pathname is {len} characters long, the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("pathname contains an empty segment")]
    EmptySegment,
    #[error("segment `{0}` is hidden")]
    HiddenSegment(String),
    #[error("pathname contains control characters")]
    ControlCharacter,
    #[error("character {0:?} is not allowed in pathnames")]
    DisallowedCharacter(char),
    #[error("pathname must end with a file extension")]
    MissingExtension,
    #[error("file extension is longer than {max} characters")]
    ExtensionTooLong { max: usize },
    #[error("pathname resolves outside the storage directory")]
    OutsideBaseDirectory,
}

/// A pathname that passed every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedPath {
    pathname: String,
    absolute: PathBuf,
}

impl SanitizedPath {
    /// Slash-rooted key used for the metadata record, e.g. `/a/b.txt`.
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// Location of the content, always strictly inside the base directory.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }
}

/// Validate `raw` and resolve it against `base_dir`.
pub fn sanitize(
    raw: &str,
    base_dir: &Path,
    policy: &PathPolicy,
) -> Result<SanitizedPath, PathRejection> {
    if raw.trim().is_empty() {
        return Err(PathRejection::Empty);
    }

    // Checked on the raw input, before anything is stripped.
    if raw.contains("..") {
        return Err(PathRejection::Traversal);
    }

    let candidate = raw.trim_start_matches('/');
    if candidate.is_empty() {
        return Err(PathRejection::Empty);
    }

    let len = candidate.chars().count();
    if len > policy.max_len {
        return Err(PathRejection::TooLong {
            len,
            max: policy.max_len,
        });
    }

    for segment in candidate.split('/') {
        if segment.is_empty() {
            return Err(PathRejection::EmptySegment);
        }
        // A lone `.` would alias its parent, so it is refused under any policy.
        if segment == "." || (segment.starts_with('.') && !policy.allow_hidden_segments) {
            return Err(PathRejection::HiddenSegment(segment.to_string()));
        }
    }

    if candidate.chars().any(char::is_control) {
        return Err(PathRejection::ControlCharacter);
    }

    if let Some(c) = candidate.chars().find(|c| !is_allowed_char(*c)) {
        return Err(PathRejection::DisallowedCharacter(c));
    }

    if policy.require_extension {
        check_extension(candidate, policy.max_extension_len)?;
    }

    let absolute = resolve_within(base_dir, candidate)?;

    Ok(SanitizedPath {
        pathname: format!("/{candidate}"),
        absolute,
    })
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

fn check_extension(candidate: &str, max_extension_len: usize) -> Result<(), PathRejection> {
    let file_name = candidate.rsplit('/').next().unwrap_or(candidate);
    let extension = match file_name.rfind('.') {
        Some(idx) => &file_name[idx + 1..],
        None => return Err(PathRejection::MissingExtension),
    };
    if extension.is_empty() {
        return Err(PathRejection::MissingExtension);
    }
    if extension.len() > max_extension_len {
        return Err(PathRejection::ExtensionTooLong {
            max: max_extension_len,
        });
    }
    Ok(())
}

/// Join `candidate` onto `base_dir` and require the result to be a strict
/// descendant of it. Resolution is lexical so no I/O happens here.
fn resolve_within(base_dir: &Path, candidate: &str) -> Result<PathBuf, PathRejection> {
    let base = normalize_lexically(base_dir);
    let resolved = normalize_lexically(&base.join(candidate));

    if resolved != base && resolved.starts_with(&base) {
        Ok(resolved)
    } else {
        Err(PathRejection::OutsideBaseDirectory)
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
