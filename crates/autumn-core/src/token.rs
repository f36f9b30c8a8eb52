//! Call tokens and identifier checks.
//!
//! A token namespaces every artifact of one logical bridge. Fresh tokens are
//! drawn at random with no registry: two live calls on one instance collide
//! only if they draw the same number out of nine million.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

use crate::config::BridgeDefaults;
use crate::error::{BridgeError, Result};

/// Tokens and instance ids end up inside remote identifiers.
static NAME_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex"));

/// Remote variable names.
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static regex"));

/// Generate a fresh call token, e.g. `B4821937`.
pub fn new_token() -> String {
    let mut rng = rand::rng();
    let n = rng.random_range(BridgeDefaults::TOKEN_MIN..BridgeDefaults::TOKEN_MAX);
    format!("{}{}", BridgeDefaults::TOKEN_PREFIX, n)
}

/// Generate a default instance id from a v4 uuid.
pub fn new_instance_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..BridgeDefaults::GENERATED_ID_LEN].to_string()
}

/// Check a caller-supplied token or instance id.
pub fn validate_fragment(field: &str, value: &str) -> Result<()> {
    if NAME_FRAGMENT.is_match(value) {
        Ok(())
    } else {
        Err(BridgeError::Validation {
            field: field.to_string(),
            message: format!("{value:?} may only contain letters, digits and underscores"),
        })
    }
}

/// Check a remote workspace variable name.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.len() > BridgeDefaults::MAX_IDENTIFIER_LEN {
        return Err(BridgeError::Validation {
            field: "name".to_string(),
            message: format!(
                "{name:?} is longer than {} characters",
                BridgeDefaults::MAX_IDENTIFIER_LEN
            ),
        });
    }
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(BridgeError::Validation {
            field: "name".to_string(),
            message: format!("{name:?} is not a valid variable name"),
        })
    }
}
