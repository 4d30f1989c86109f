//! Org outline patching.

pub mod patch;

pub use patch::{OutlinePatcher, patch};
