//! # jobprobe-names
//!
//! Validated names for cluster objects created by the harness.
//!
//! ## Design Principles
//!
//! - Names are checked once, at construction; a value of a name type is
//!   always acceptable to the control plane
//! - Namespaces are generated per run and never reused
//! - Name types are distinct so a namespace cannot be passed where an
//!   object name is expected
//!
//! ## Name Format
//!
//! Namespaces are DNS-1123 labels (`[a-z0-9-]`, at most 63 characters, starting
//! and ending with an alphanumeric). Object names are DNS-1123 subdomains
//! (labels joined by `.`, at most 253 characters).
//!
//! Generated namespaces use a fixed prefix followed by a lowercased ULID:
//! - `test-ns-01hv4z2wqxkjnm8gpqy6vbkc3d`

mod error;
mod macros;
mod types;

pub use error::NameError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
