//! Validated tenant identifiers.
//!
//! Tenant names end up inside DDL identifiers (`CREATE SCHEMA`, `CREATE
//! DATABASE`), which cannot be bound as parameters. The naming policy here is
//! the only thing standing between caller input and the database, so it is
//! enforced at construction: a `TenantName` that exists is a name that already
//! passed validation.

use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Longest accepted tenant name, in bytes.
///
/// Matches the Postgres identifier limit (NAMEDATALEN - 1) so a tenant name is
/// never silently truncated by the server.
pub const MAX_TENANT_NAME_LEN: usize = 63;

/// A tenant name was rejected by the naming policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid tenant name {name:?}: {reason}")]
pub struct InvalidTenantName {
    pub name: String,
    pub reason: String,
}

impl InvalidTenantName {
    fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Identifier of a tenant (multi-tenant boundary).
///
/// Guaranteed by construction to be non-empty, at most
/// [`MAX_TENANT_NAME_LEN`] bytes, composed of ASCII alphanumerics and
/// underscores, and not starting with a digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantName(String);

impl TenantName {
    /// Validate and wrap a tenant name.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidTenantName> {
        let name = name.into();

        if name.is_empty() {
            return Err(InvalidTenantName::new(name, "must not be empty"));
        }
        if name.len() > MAX_TENANT_NAME_LEN {
            return Err(InvalidTenantName::new(
                name,
                format!("longer than {MAX_TENANT_NAME_LEN} bytes"),
            ));
        }
        if name.as_bytes()[0].is_ascii_digit() {
            return Err(InvalidTenantName::new(name, "must not start with a digit"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(InvalidTenantName::new(
                name,
                format!("contains {bad:?}; only ASCII alphanumerics and '_' are allowed"),
            ));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name double-quoted for use as an SQL identifier.
    ///
    /// Quoting is belt-and-braces: the naming policy already excludes quote
    /// characters, so no escaping is ever required.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl core::fmt::Display for TenantName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl AsRef<str> for TenantName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenantName {
    type Err = InvalidTenantName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantName {
    type Error = InvalidTenantName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for TenantName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        TenantName::new(raw).map_err(serde::de::Error::custom)
    }
}
