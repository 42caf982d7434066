//! Errors raised while building a modifier catalog or decoding a wire
//! envelope.
//!
//! The per-tick path never fails: invalid levels are no-ops and
//! out-of-bound payloads are clamped. Only construction and the envelope
//! boundary return `Result`.

/// Errors from catalog construction and message decoding.
#[derive(Debug, thiserror::Error)]
pub enum ModifierError {
    /// A category name was looked up that the catalog does not contain.
    #[error("unknown modifier category: {0}")]
    UnknownCategory(String),
    /// A category declares more levels than its mask width can represent.
    #[error("category {name}: {level_count} levels do not fit in {bits} bits")]
    LevelCountExceedsWidth {
        /// Category name.
        name: String,
        /// Declared level count.
        level_count: u8,
        /// Bits available in the configured width.
        bits: u8,
    },
    /// A category failed validation for a reason other than width.
    #[error("invalid category {name}: {reason}")]
    InvalidCategory {
        /// Category name.
        name: String,
        /// Human-readable reason.
        reason: String,
    },
    /// The catalog holds more categories than a `CategoryId` can address.
    #[error("{count} categories configured, at most {max} are addressable")]
    TooManyCategories {
        /// Categories configured.
        count: usize,
        /// Largest addressable catalog.
        max: usize,
    },
    /// The message envelope carries an unsupported protocol version.
    #[error("unsupported wire version: {0}")]
    WireVersion(u8),
    /// The message envelope is empty.
    #[error("empty payload")]
    EmptyPayload,
    /// Postcard encode or decode failure.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}
