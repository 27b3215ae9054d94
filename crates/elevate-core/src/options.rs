//! Elevation request options and their validation.
//!
//! Executors never see raw options: [`ValidatedOptions`] can only be
//! obtained through [`ElevationOptions::validate`], so every invariant
//! below holds by construction once a value reaches an executor.
//!
//! # Invariants
//!
//! | Field | Rule |
//! |-------|------|
//! | `name` | 1–70 chars, `[A-Za-z0-9 ]` only, non-empty after trimming |
//! | `icon_path` | optional; non-empty after trimming when present |
//! | `env` keys | `^[A-Za-z_][A-Za-z0-9_]*$` (POSIX identifier) |
//! | `env` values | no CR or LF |
//!
//! The name limit of 70 characters leaves headroom under filesystem name
//! limits even after Unicode normalization of the staged bundle path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted prompt name.
pub const MAX_NAME_LEN: usize = 70;

/// Errors produced by options validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    /// Name is empty, too long, or contains a character outside
    /// `[A-Za-z0-9 ]`.
    #[error("name must be 1-70 alphanumeric characters or spaces, got {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// An icon path was supplied but is empty after trimming.
    #[error("icon path must not be empty when provided")]
    EmptyIconPath,

    /// An environment variable name is not a POSIX identifier.
    #[error("invalid environment variable name: {key:?}")]
    InvalidEnvKey {
        /// The rejected key.
        key: String,
    },

    /// An environment variable value contains CR or LF.
    #[error("environment variable {key:?} has a value containing CR or LF")]
    InvalidEnvValue {
        /// The key whose value was rejected.
        key: String,
    },
}

/// Options for one elevation request, prior to validation.
///
/// Environment variables are kept sorted so generated scripts export them
/// in a deterministic order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElevationOptions {
    /// Name shown by the authorization prompt.
    pub name: String,

    /// Optional icon displayed by the prompt (macOS).
    #[serde(default)]
    pub icon_path: Option<PathBuf>,

    /// Environment variables exported for the wrapped command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ElevationOptions {
    /// Creates options with the given prompt name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon_path: None,
            env: BTreeMap::new(),
        }
    }

    /// Sets the prompt icon.
    #[must_use]
    pub fn with_icon(mut self, icon_path: impl Into<PathBuf>) -> Self {
        self.icon_path = Some(icon_path.into());
        self
    }

    /// Adds one environment variable for the wrapped command.
    #[must_use]
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Checks every invariant and wraps the options as [`ValidatedOptions`].
    ///
    /// # Errors
    ///
    /// Returns the first [`OptionsError`] encountered; nothing is mutated.
    pub fn validate(self) -> Result<ValidatedOptions, OptionsError> {
        if !valid_name(&self.name) {
            return Err(OptionsError::InvalidName { name: self.name });
        }
        if let Some(icon) = &self.icon_path {
            if icon.as_os_str().to_string_lossy().trim().is_empty() {
                return Err(OptionsError::EmptyIconPath);
            }
        }
        for (key, value) in &self.env {
            if !valid_env_key(key) {
                return Err(OptionsError::InvalidEnvKey { key: key.clone() });
            }
            if value.contains(['\r', '\n']) {
                return Err(OptionsError::InvalidEnvValue { key: key.clone() });
            }
        }
        Ok(ValidatedOptions(self))
    }
}

/// Options that have passed validation.
///
/// The only constructor is [`ElevationOptions::validate`]; executors trust
/// values of this type without re-checking.
#[derive(Debug, Clone)]
pub struct ValidatedOptions(ElevationOptions);

impl ValidatedOptions {
    /// Prompt name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Prompt icon, when one was supplied.
    #[must_use]
    pub fn icon_path(&self) -> Option<&Path> {
        self.0.icon_path.as_deref()
    }

    /// Environment variables, in sorted key order.
    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.0.env
    }
}

fn valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ')
}

fn valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
