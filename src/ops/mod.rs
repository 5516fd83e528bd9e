//! Recursive trie operations.

pub mod get;
pub mod insert;
pub mod remove;
