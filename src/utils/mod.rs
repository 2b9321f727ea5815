//! Shared helpers.

pub mod decimal;
