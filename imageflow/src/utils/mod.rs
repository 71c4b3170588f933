//! Utility functions and types.

mod uuid_utils;

pub use uuid_utils::{generate_uuid_v7, TimeOrderedTokens, TokenGenerator};
