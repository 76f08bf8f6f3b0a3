// Validation module for security and input sanitization
// Every string that ends up on a command line or in a filesystem path goes through here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{EdgeError, Result};

/// Maximum length of an identifier token (workload ids, script names)
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Maximum length of a launch argument token
const MAX_ARGUMENT_LENGTH: usize = 512;

/// Maximum length of an uploaded media filename
const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum length of a resolved media path passed to a worker
const MAX_PATH_LENGTH: usize = 4096;

/// PCI bus address: optional 4-hex-digit domain, then bus:device.function
static BUS_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9a-fA-F]{4}:)?[0-9a-fA-F]{2}:[0-9a-fA-F]{2}\.[0-7]$")
        .expect("bus address pattern is valid")
});

static MEDIA_FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*\.[A-Za-z0-9]{1,8}$")
        .expect("media filename pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenClass {
    Identifier,
    Argument,
}

impl TokenClass {
    fn allows(self, ch: char) -> bool {
        match self {
            TokenClass::Identifier => ch.is_ascii_alphanumeric() || ch == '_' || ch == '-',
            TokenClass::Argument => {
                ch.is_ascii_alphanumeric()
                    || matches!(ch, '_' | '-' | '.' | ':' | '/' | ',' | '=' | '@' | '+')
            }
        }
    }

    fn max_len(self) -> usize {
        match self {
            TokenClass::Identifier => MAX_IDENTIFIER_LENGTH,
            TokenClass::Argument => MAX_ARGUMENT_LENGTH,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TokenClass::Identifier => "identifier",
            TokenClass::Argument => "argument",
        }
    }
}

/// A string proven safe to place in a path or on a command line.
///
/// Construction never rewrites the input: a value containing anything outside
/// the allow-list is rejected, so a sanitized id can never silently alias
/// another workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SafeToken(String);

impl SafeToken {
    /// Token usable as a workload id or worker script folder name.
    ///
    /// Allowed: ASCII letters, digits, `_` and `-`.
    pub fn identifier(value: &str) -> Result<Self> {
        Self::build(value, TokenClass::Identifier)
    }

    /// Token usable as a single worker launch argument.
    ///
    /// Allowed: ASCII letters, digits and `_ - . : / , = @ +`.
    /// Path traversal (`..`) is rejected even though `.` is allowed.
    pub fn argument(value: &str) -> Result<Self> {
        let token = Self::build(value, TokenClass::Argument)?;
        if token.0.contains("..") {
            return Err(reject(format!(
                "argument '{}' contains path traversal (..)",
                value.escape_default()
            )));
        }
        Ok(token)
    }

    /// Token for a media file already proven to live inside a trusted directory.
    ///
    /// The directory itself is configuration, so spaces, backslashes and drive
    /// letters are accepted here; the path is absolute and reaches the worker
    /// as a single argv entry.
    pub fn contained_path(path: &ContainedPath) -> Result<Self> {
        let value = path.as_path().to_str().ok_or_else(|| {
            reject(format!(
                "path {} is not valid UTF-8",
                path.as_path().display()
            ))
        })?;
        Self::absolute_path(value)
    }

    fn absolute_path(value: &str) -> Result<Self> {
        if value.is_empty() || value.len() > MAX_PATH_LENGTH {
            return Err(reject(format!(
                "path has invalid length: {}",
                value.len()
            )));
        }
        if let Some(bad) = value.chars().find(|ch| ch.is_control()) {
            return Err(reject(format!(
                "path '{}' contains control character '{}'",
                value.escape_default(),
                bad.escape_default()
            )));
        }
        let path = Path::new(value);
        if !path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(reject(format!(
                "path '{}' is not an absolute, normalized path",
                value.escape_default()
            )));
        }
        Ok(Self(value.to_string()))
    }

    fn build(value: &str, class: TokenClass) -> Result<Self> {
        if value.is_empty() {
            return Err(reject(format!("{} cannot be empty", class.label())));
        }
        if value.len() > class.max_len() {
            return Err(reject(format!(
                "{} is too long ({} characters, max {})",
                class.label(),
                value.len(),
                class.max_len()
            )));
        }
        if let Some(bad) = value.chars().find(|ch| !class.allows(*ch)) {
            return Err(reject(format!(
                "{} '{}' contains disallowed character '{}'",
                class.label(),
                value.escape_default(),
                bad.escape_default()
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SafeToken {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        SafeToken::argument(&raw)
            .or_else(|_| SafeToken::absolute_path(&raw))
            .map_err(serde::de::Error::custom)
    }
}

/// A validated PCI bus address (`00:02.0`, `0000:03:00.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BusAddress(String);

impl BusAddress {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if !BUS_ADDRESS_RE.is_match(trimmed) {
            return Err(reject(format!(
                "'{}' is not a PCI bus address",
                value.escape_default()
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address without the domain prefix, used to dedupe `0000:03:00.0` against `03:00.0`
    pub fn short_form(&self) -> &str {
        match self.0.len() {
            12 => &self.0[5..],
            _ => &self.0,
        }
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BusAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        BusAddress::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Validates an uploaded media filename
/// Checks for:
/// - Empty or overlong names
/// - Path separators and traversal
/// - Characters outside `[A-Za-z0-9_.-]`
/// - Missing extension
pub fn validate_media_filename(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_FILENAME_LENGTH {
        return Err(EdgeError::path_traversal(format!(
            "media filename has invalid length: {}",
            name.len()
        )));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(EdgeError::path_traversal(format!(
            "media filename '{}' contains a path component",
            name.escape_default()
        )));
    }
    if !MEDIA_FILENAME_RE.is_match(name) {
        return Err(EdgeError::path_traversal(format!(
            "media filename '{}' contains disallowed characters",
            name.escape_default()
        )));
    }
    Ok(())
}

/// Canonical path of a regular file directly inside a trusted directory.
///
/// Only [`resolve_contained_file`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainedPath(PathBuf);

impl ContainedPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

/// Resolves `name` inside `trusted_dir` and proves the result stays inside it.
///
/// Both sides are canonicalized, so symlinks pointing out of the directory are
/// rejected too. The file must exist.
pub fn resolve_contained_file(trusted_dir: &Path, name: &str) -> Result<ContainedPath> {
    validate_media_filename(name)?;

    let root = trusted_dir.canonicalize().map_err(|e| {
        EdgeError::path_traversal(format!(
            "trusted directory {} cannot be resolved: {}",
            trusted_dir.display(),
            e
        ))
    })?;
    let candidate = root.join(name).canonicalize().map_err(|e| {
        EdgeError::path_traversal(format!("media file '{}' cannot be resolved: {}", name, e))
    })?;

    if candidate.parent() != Some(root.as_path()) || !candidate.is_file() {
        return Err(EdgeError::path_traversal(format!(
            "{} is not a file directly inside {}",
            candidate.display(),
            root.display()
        )));
    }

    Ok(ContainedPath(candidate))
}

fn reject(msg: String) -> EdgeError {
    log::warn!("Rejected input: {}", msg);
    EdgeError::validation(msg)
}
