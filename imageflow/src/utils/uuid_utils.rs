//! Unique token generation for naming remote resources.

use uuid::Uuid;

/// Generates a new UUID v7 (time-ordered).
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Source of fresh unique tokens.
///
/// Tokens must not repeat across concurrent pipeline runs that share an
/// account, since they are the only thing keeping resource names apart.
pub trait TokenGenerator: Send + Sync {
    /// Returns a fresh token.
    fn next_token(&self) -> String;
}

/// Time-ordered tokens backed by UUID v7.
///
/// Tokens generated later sort after earlier ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeOrderedTokens;

impl TokenGenerator for TimeOrderedTokens {
    fn next_token(&self) -> String {
        generate_uuid_v7().to_string()
    }
}
