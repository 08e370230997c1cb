//! Destination naming for uploaded files.
//!
//! [`NamingResolver`] turns an original file name into a storage path under a
//! target directory according to a [`NamingRule`]. It never overwrites an
//! existing file unless the policy explicitly allows it.
//!
//! Probing and writing are separate steps, so two concurrent literal uploads
//! of the same name can both see the name as free. Callers that need
//! race-free naming should use [`NamingRule::ContentHash`] or
//! [`NamingRule::RandomId`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::integrity::content_hash;
use super::store::join_segments;
use crate::errors::TransferError;

/// How an uploaded file is named on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NamingRule {
    /// Keep the original name; collisions are overwritten, sequenced or
    /// rejected according to the policy.
    #[default]
    Literal,
    /// `base-{md5}{ext}`; identical content always maps to the same name.
    ContentHash,
    /// `{uuid}{ext}`, regenerated on the (unlikely) event of a collision.
    RandomId,
}

/// Naming rule plus the literal-collision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingPolicy {
    pub rule: NamingRule,
    pub overwrite: bool,
    pub use_sequenced_name: bool,
}

impl NamingPolicy {
    /// Literal naming with the given collision policy.
    pub fn literal(overwrite: bool, use_sequenced_name: bool) -> Self {
        Self {
            rule: NamingRule::Literal,
            overwrite,
            use_sequenced_name,
        }
    }
}

/// Outcome of name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub file_name: String,
    /// `directory/file_name`, relative to the backend root.
    pub relative_path: String,
}

/// Applies a [`NamingPolicy`] to produce a collision-free storage path.
#[derive(Debug, Clone, Copy)]
pub struct NamingResolver {
    policy: NamingPolicy,
}

impl NamingResolver {
    pub fn new(policy: NamingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NamingPolicy {
        self.policy
    }

    /// Resolve `original_name` under `directory`.
    ///
    /// `exists` probes a root-relative candidate path. `content` is only
    /// consulted by [`NamingRule::ContentHash`].
    pub fn resolve<F>(
        &self,
        directory: &str,
        original_name: &str,
        content: &[u8],
        mut exists: F,
    ) -> Result<ResolvedName, TransferError>
    where
        F: FnMut(&str) -> Result<bool, TransferError>,
    {
        if original_name.trim().is_empty() {
            return Err(TransferError::InvalidArgument(
                "file name must not be empty".to_string(),
            ));
        }

        match self.policy.rule {
            NamingRule::Literal => self.resolve_literal(directory, original_name, &mut exists),
            NamingRule::ContentHash => {
                let file_name = content_hash_name(original_name, &content_hash(content));
                Ok(resolved(directory, file_name))
            }
            NamingRule::RandomId => {
                let (_, ext) = split_name(original_name);
                loop {
                    let file_name = format!("{}{}", Uuid::new_v4(), ext);
                    let candidate = resolved(directory, file_name);
                    if !exists(&candidate.relative_path)? {
                        return Ok(candidate);
                    }
                    tracing::debug!(path = %candidate.relative_path, "random name collided, regenerating");
                }
            }
        }
    }

    fn resolve_literal<F>(
        &self,
        directory: &str,
        original_name: &str,
        exists: &mut F,
    ) -> Result<ResolvedName, TransferError>
    where
        F: FnMut(&str) -> Result<bool, TransferError>,
    {
        let literal = resolved(directory, original_name.to_string());
        if self.policy.overwrite {
            return Ok(literal);
        }
        if !exists(&literal.relative_path)? {
            return Ok(literal);
        }
        if !self.policy.use_sequenced_name {
            return Err(TransferError::DuplicateFile(literal.relative_path));
        }

        let (stem, ext) = split_name(original_name);
        let mut sequence: u64 = 1;
        loop {
            let candidate = resolved(directory, sequenced_name(stem, ext, sequence));
            if !exists(&candidate.relative_path)? {
                return Ok(candidate);
            }
            sequence += 1;
        }
    }
}

fn resolved(directory: &str, file_name: String) -> ResolvedName {
    ResolvedName {
        relative_path: join_segments(&[directory, &file_name]),
        file_name,
    }
}

/// Split `name` into stem and extension (with its leading dot).
///
/// A leading dot does not start an extension: `.profile` has none.
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// `base[sequence].ext`
pub fn sequenced_name(stem: &str, ext: &str, sequence: u64) -> String {
    format!("{stem}[{sequence}]{ext}")
}

/// `base-{hash}.ext` with spaces removed from the base.
pub fn content_hash_name(original_name: &str, hash: &str) -> String {
    let (stem, ext) = split_name(original_name);
    let base: String = stem.chars().filter(|c| *c != ' ').collect();
    format!("{base}-{hash}{ext}")
}
