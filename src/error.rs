use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The minimum bound is not strictly below the maximum bound.
    #[error("invalid bounds: min must be strictly less than max")]
    InvalidBounds,

    /// The key is one of the sentinel bounds or lies outside them.
    #[error("key is not strictly between the tree's bounds")]
    KeyOutOfBounds,

    /// `remove` was called on an iterator with no element to remove.
    #[error("no element was yielded since the last removal")]
    NoCurrentElement,
}
