//! Error types returned by the builders, the translators and the perfect hash map.

use thiserror::Error;

/// Errors reported while building a [`Bvh`] or [`SplitBvh`].
///
/// [`Bvh`]: ../bvh/struct.Bvh.html
/// [`SplitBvh`]: ../bvh/struct.SplitBvh.html
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("cannot build a hierarchy over zero primitives")]
    EmptyInput,

    #[error("invalid value for option `{name}`: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("unknown build option `{0}`")]
    UnknownOption(String),

    #[error("node arena exhausted (capacity {capacity})")]
    ArenaExhausted { capacity: usize },

    #[error("node slot {0} was allocated but never written")]
    UnfilledNode(usize),
}

/// Errors reported while flattening a hierarchy into a GPU layout.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error("leaf holds {count} primitives, the packed layout allows at most 15")]
    LeafTooLarge { count: usize },

    #[error("value {value} cannot be stored exactly in a 32-bit float")]
    IndexOverflow { value: usize },

    #[error("{trees} bottom-level trees but {offsets} primitive offsets")]
    OffsetCountMismatch { trees: usize, offsets: usize },

    #[error("no top-level tree has been flattened yet")]
    NoTopLevel,

    #[error(transparent)]
    Hash(#[from] PerfectHashError),
}

/// Errors reported while building a [`PerfectHashMap`].
///
/// [`PerfectHashMap`]: ../perfect_hash/struct.PerfectHashMap.html
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerfectHashError {
    #[error("{keys} keys but {values} values")]
    LengthMismatch { keys: usize, values: usize },

    #[error("key {key} exceeds the declared maximum {max_key}")]
    MaxKeyViolated { key: u64, max_key: u64 },

    #[error("key {key} does not fit the table index type")]
    KeyOutOfRange { key: String },
}
