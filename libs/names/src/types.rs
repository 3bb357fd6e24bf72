//! Name type definitions and validation rules.
//!
//! Namespaces are DNS-1123 labels, object names are DNS-1123 subdomains and
//! config payload keys follow the looser file-name rule the control plane
//! applies to config map keys.

use crate::{define_name, NameError, Ulid};

/// Maximum length of a DNS-1123 label.
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum length of a DNS-1123 subdomain.
pub const MAX_SUBDOMAIN_LEN: usize = 253;

/// Maximum length of a config payload key.
pub const MAX_CONFIG_KEY_LEN: usize = 253;

/// Length of a ULID rendered as text.
const ULID_LEN: usize = 26;

/// Default prefix for generated namespaces.
pub const DEFAULT_NAMESPACE_PREFIX: &str = "test-ns-";

/// Validates a DNS-1123 label.
pub fn validate_label(s: &str) -> Result<(), NameError> {
    if s.is_empty() {
        return Err(NameError::Empty);
    }
    if s.len() > MAX_LABEL_LEN {
        return Err(NameError::TooLong {
            max: MAX_LABEL_LEN,
            actual: s.len(),
        });
    }
    check_label(s, 0)
}

/// Validates a DNS-1123 subdomain.
pub fn validate_subdomain(s: &str) -> Result<(), NameError> {
    if s.is_empty() {
        return Err(NameError::Empty);
    }
    if s.len() > MAX_SUBDOMAIN_LEN {
        return Err(NameError::TooLong {
            max: MAX_SUBDOMAIN_LEN,
            actual: s.len(),
        });
    }

    let mut offset = 0;
    for label in s.split('.') {
        if label.is_empty() {
            return Err(NameError::InvalidBoundary {
                label: label.to_string(),
            });
        }
        check_label(label, offset)?;
        offset += label.len() + 1;
    }
    Ok(())
}

/// Validates a config payload key (`[-._a-zA-Z0-9]+`).
pub fn validate_config_key(s: &str) -> Result<(), NameError> {
    if s.is_empty() {
        return Err(NameError::Empty);
    }
    if s.len() > MAX_CONFIG_KEY_LEN {
        return Err(NameError::TooLong {
            max: MAX_CONFIG_KEY_LEN,
            actual: s.len(),
        });
    }
    if let Some((position, ch)) = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(NameError::InvalidCharacter { ch, position });
    }
    // "." and ".." would escape the mount directory.
    if s == "." || s == ".." {
        return Err(NameError::InvalidBoundary {
            label: s.to_string(),
        });
    }
    Ok(())
}

fn check_label(label: &str, offset: usize) -> Result<(), NameError> {
    if let Some((position, ch)) = label
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(NameError::InvalidCharacter {
            ch,
            position: offset + position,
        });
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(NameError::InvalidBoundary {
            label: label.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Name Types
// =============================================================================

define_name!(NamespaceName, validate_label);
define_name!(ObjectName, validate_subdomain);
define_name!(ConfigKey, validate_config_key);

impl NamespaceName {
    /// Generates a fresh namespace name from a prefix and a new ULID.
    ///
    /// The prefix must start with a lowercase alphanumeric character, contain
    /// only `[a-z0-9-]` and leave room for the 26 character suffix.
    pub fn generate(prefix: &str) -> Result<Self, NameError> {
        Self::with_ulid(prefix, Ulid::new())
    }

    /// Builds a namespace name from a prefix and a given ULID.
    pub fn with_ulid(prefix: &str, ulid: Ulid) -> Result<Self, NameError> {
        let invalid = |reason: &str| NameError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: reason.to_string(),
        };

        if prefix.is_empty() {
            return Err(invalid("prefix cannot be empty"));
        }
        if prefix.len() + ULID_LEN > MAX_LABEL_LEN {
            return Err(invalid("prefix leaves no room for the generated suffix"));
        }
        if !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid("prefix may only contain [a-z0-9-]"));
        }
        if prefix.starts_with('-') {
            return Err(invalid("prefix must start with an alphanumeric character"));
        }

        let name = format!("{prefix}{}", ulid.to_string().to_ascii_lowercase());
        Self::parse(&name)
    }
}

impl From<NamespaceName> for ObjectName {
    fn from(ns: NamespaceName) -> Self {
        // Every label is also a valid subdomain.
        ObjectName(ns.into_string())
    }
}
