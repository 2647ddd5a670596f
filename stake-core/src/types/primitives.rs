use serde::{Deserialize, Serialize};

use crate::error::{Result, StakeError};

/// Longest resource key accepted at the boundary.
pub const MAX_KEY_LEN: usize = 64;

const TOKEN_MIN_LEN: usize = 8;
const TOKEN_MAX_LEN: usize = 128;

/// A claimable resource in the registry.
///
/// Resources are created and edited by the management side; the lease and
/// commit protocol only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable slug (e.g. "drug-07"); unique and immutable
    pub key: String,
    /// Display name
    pub name: String,
    /// Inactive resources cannot be leased or committed
    pub is_active: bool,
    /// Display ordering, ascending
    pub sort_order: i64,
}

impl Resource {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            is_active: true,
            sort_order: 0,
        }
    }

    pub fn with_sort_order(mut self, sort_order: i64) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// The default catalog: `drug-01 .. drug-NN`, all active.
    pub fn catalog(count: usize) -> Vec<Resource> {
        (1..=count)
            .map(|i| {
                Resource::new(format!("drug-{:02}", i), format!("Drug {:02}", i))
                    .with_sort_order(i as i64)
            })
            .collect()
    }
}

/// Trims and lower-cases a raw key, then checks it is a slug.
pub fn normalize_key(raw: &str) -> Result<String> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
        return Err(StakeError::Invalid("resource_key is required".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StakeError::Invalid(format!(
            "resource_key must be at most {} characters",
            MAX_KEY_LEN
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(StakeError::Invalid(format!(
            "invalid resource_key '{}': must be lowercase alphanumeric with hyphens",
            key
        )));
    }
    Ok(key)
}

/// Fresh opaque holder token.
pub fn generate_token() -> String {
    nanoid::nanoid!()
}

/// Interprets an optional client-supplied token. Blank means "none".
pub fn normalize_token(raw: Option<&str>) -> Result<Option<String>> {
    let token = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(t) => t,
    };
    if token.len() < TOKEN_MIN_LEN || token.len() > TOKEN_MAX_LEN {
        return Err(StakeError::Invalid(format!(
            "holder_token must be {}-{} characters",
            TOKEN_MIN_LEN, TOKEN_MAX_LEN
        )));
    }
    if !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StakeError::Invalid(
            "holder_token may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }
    Ok(Some(token.to_string()))
}

/// Like [`normalize_token`] but the token must be present.
pub fn require_token(raw: Option<&str>) -> Result<String> {
    normalize_token(raw)?
        .ok_or_else(|| StakeError::Invalid("holder_token is required".to_string()))
}
