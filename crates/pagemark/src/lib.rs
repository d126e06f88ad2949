//! Public facade crate for `pagemark`.
//!
//! This crate intentionally contains no IO or DOM-specific logic.
//! It re-exports the backend-agnostic types/traits from `pagemark-core`.

pub use pagemark_core::*;
