//! `tenement-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no database concerns):
//! the validated tenant identifier and its naming policy.

pub mod name;

pub use name::{InvalidTenantName, TenantName};
