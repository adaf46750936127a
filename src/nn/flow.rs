//! Single-or-tuple data flowing between graph stages
//!
//! Fan-out turns one input into a tuple of copies and parallel composition
//! consumes a tuple of matching arity. [`Flow`] tracks that structure for
//! both shapes ([`Signature`]) and runtime tensors.

use std::fmt;

use crate::error::{NetworkError, Result};

/// Either one item or an ordered tuple of nested flows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T> {
    Single(T),
    Tuple(Vec<Flow<T>>),
}

/// Per-example feature shapes, batch dimension excluded
pub type Signature = Flow<Vec<usize>>;

impl<T> Flow<T> {
    /// Number of items seen by the next stage (1 for a single item)
    pub fn arity(&self) -> usize {
        match self {
            Flow::Single(_) => 1,
            Flow::Tuple(items) => items.len(),
        }
    }

    /// Unwrap a single item, failing with the name of the consuming layer
    pub fn into_single(self, layer: &'static str) -> Result<T> {
        match self {
            Flow::Single(item) => Ok(item),
            Flow::Tuple(items) => Err(NetworkError::ExpectedSingle {
                layer,
                arity: items.len(),
            }),
        }
    }

    /// Borrowing form of [`Flow::into_single`]
    pub fn as_single(&self, layer: &'static str) -> Result<&T> {
        match self {
            Flow::Single(item) => Ok(item),
            Flow::Tuple(items) => Err(NetworkError::ExpectedSingle {
                layer,
                arity: items.len(),
            }),
        }
    }

    /// Unwrap a tuple of exactly `expected` entries
    pub fn into_tuple(self, layer: &'static str, expected: usize) -> Result<Vec<Flow<T>>> {
        match self {
            Flow::Tuple(items) if items.len() == expected => Ok(items),
            other => Err(NetworkError::ArityMismatch {
                layer,
                expected,
                found: other.arity(),
            }),
        }
    }

    /// Apply `f` to every leaf, keeping the tuple structure
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Flow<U> {
        fn go<T, U, F: FnMut(&T) -> U>(flow: &Flow<T>, f: &mut F) -> Flow<U> {
            match flow {
                Flow::Single(item) => Flow::Single(f(item)),
                Flow::Tuple(items) => Flow::Tuple(items.iter().map(|i| go(i, f)).collect()),
            }
        }
        let mut f = f;
        go(self, &mut f)
    }

    /// Leaf items in depth-first order
    pub fn leaves(&self) -> Vec<&T> {
        match self {
            Flow::Single(item) => vec![item],
            Flow::Tuple(items) => items.iter().flat_map(Flow::leaves).collect(),
        }
    }
}

impl<T> From<T> for Flow<T> {
    fn from(item: T) -> Self {
        Flow::Single(item)
    }
}

impl<T: fmt::Debug> fmt::Display for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Single(item) => write!(f, "{item:?}"),
            Flow::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
