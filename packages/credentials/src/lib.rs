#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Local credential files for S3 and Redshift access.
//!
//! Credentials live in plain text files named `<name>.txt` inside a
//! credentials directory (`keys/` by default). Each line is a
//! `KEY = value` pair; blank lines and lines starting with `#` are
//! ignored.
//!
//! ```text
//! # s3_creds.txt
//! AWS_ACCESS_KEY_ID = AKIA...
//! AWS_SECRET_ACCESS_ID = ...
//! ```
//!
//! Values are never logged. The [`Debug`] output of a [`CredentialSet`]
//! lists the keys only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default directory holding the credential files.
pub const DEFAULT_CREDENTIAL_DIR: &str = "keys";

/// Errors that can occur while reading credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The credential file does not exist.
    #[error("Credential does not exist: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// I/O error reading the credential file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A non-comment line has no `=` separator.
    #[error("Line {line} of {} has no = symbol", path.display())]
    Format {
        /// Credential file path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
    },

    /// A required key is absent from the credential set.
    #[error("Missing credential key: {key}")]
    MissingKey {
        /// Name of the missing key.
        key: String,
    },

    /// A key is present but its value cannot be used.
    #[error("Invalid value for credential key {key}: {message}")]
    Invalid {
        /// Name of the offending key.
        key: String,
        /// Description of what went wrong.
        message: String,
    },
}

/// An immutable mapping of credential keys to values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    values: BTreeMap<String, String>,
}

impl CredentialSet {
    /// Parses credential file contents.
    ///
    /// Keys and values are trimmed. A value may itself contain `=`; only
    /// the first one separates the key. Later duplicates win.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Format`] on a line without `=`. The
    /// `path` is only used for the error message.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, CredentialError> {
        let mut values = BTreeMap::new();

        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(CredentialError::Format {
                    path: path.to_path_buf(),
                    line: idx + 1,
                });
            };

            values.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self { values })
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingKey`] if the key is absent.
    pub fn require(&self, key: &str) -> Result<&str, CredentialError> {
        self.get(key).ok_or_else(|| CredentialError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Returns the value of the first key in `keys` that is present.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingKey`] naming the first key if
    /// none are present.
    pub fn require_any(&self, keys: &[&str]) -> Result<&str, CredentialError> {
        keys.iter()
            .find_map(|key| self.get(key))
            .ok_or_else(|| CredentialError::MissingKey {
                key: keys.first().copied().unwrap_or_default().to_string(),
            })
    }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.values.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

impl FromIterator<(String, String)> for CredentialSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Returns the path of the credential file `name` inside `dir`.
#[must_use]
pub fn credential_path(name: &str, dir: &Path) -> PathBuf {
    dir.join(format!("{name}.txt"))
}

/// Reads the credential file `<dir>/<name>.txt`.
///
/// # Errors
///
/// Returns [`CredentialError::NotFound`] if the file is missing,
/// [`CredentialError::Io`] if it cannot be read, and
/// [`CredentialError::Format`] on a malformed line.
pub fn read(name: &str, dir: &Path) -> Result<CredentialSet, CredentialError> {
    let path = credential_path(name, dir);

    if !path.exists() {
        return Err(CredentialError::NotFound { path });
    }

    let contents = std::fs::read_to_string(&path)?;
    let creds = CredentialSet::parse(&contents, &path)?;
    log::debug!("Loaded {} credential key(s) from {}", creds.len(), path.display());

    Ok(creds)
}
