//! Error taxonomy of the guarded stack.
//!
//! Usage errors ([`StackError::OutOfRange`], [`StackError::EmptyContainer`])
//! are recoverable: the stack stays usable. Any [`IntegrityError`] is
//! terminal: the stack dumps its state, becomes poisoned and rejects all
//! further work.

use thiserror::Error;

/// Which end of the buffer a guard region flanks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardEnd {
    /// Before the first element slot.
    Leading,
    /// After the last element slot.
    Trailing,
}

/// Errors returned by [`GuardedStack`](crate::GuardedStack) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// Malformed construction parameters.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the request.
        message: String,
    },

    /// Index past the current logical bounds.
    #[error("index {index} out of range for stack of {len} elements")]
    OutOfRange {
        /// The invalid index.
        index: usize,
        /// The current element count.
        len: usize,
    },

    /// `pop` or `top` on a stack with zero elements.
    #[error("operation on an empty stack")]
    EmptyContainer,

    /// Memory could not be obtained. A failed grow or shrink leaves the
    /// stack exactly as it was.
    #[error("memory allocation failed: requested {bytes} bytes")]
    AllocationFailed {
        /// Number of bytes requested.
        bytes: usize,
    },

    /// Corruption detected; the stack is poisoned from here on.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl StackError {
    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an out of range error.
    #[must_use]
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::OutOfRange { index, len }
    }

    /// Create an allocation failure error.
    #[must_use]
    pub fn allocation_failed(bytes: usize) -> Self {
        Self::AllocationFailed { bytes }
    }
}

/// The integrity violation family. Each kind names the invariant that broke,
/// so a harness can tell a smashed guard region from a tampered element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// A guard region no longer holds the sentinel constant: something
    /// wrote past the element slots.
    #[error(
        "guard region corrupted at the {end:?} end: \
         found {found:#018x}, expected {expected:#018x}"
    )]
    SentinelCorrupted {
        /// Which guard region was altered.
        end: GuardEnd,
        /// Value read from the guard region.
        found: u64,
        /// The sentinel constant that should be there.
        expected: u64,
    },

    /// The recomputed content digest disagrees with the one captured after
    /// the last mutation: an element was altered outside the stack's own
    /// operations.
    #[error("content digest mismatch: stored {stored}, computed {computed}")]
    ContentDigestMismatch {
        /// Digest captured after the last mutation.
        stored: u64,
        /// Digest recomputed from the live elements.
        computed: u64,
    },

    /// Capacity or element count broke an invariant that no legal operation
    /// can break.
    #[error("structural parameter corrupted: {detail}")]
    StructuralParameterCorrupted {
        /// Which invariant failed.
        detail: &'static str,
    },

    /// The live buffer identity and its redundant shadow copy disagree: the
    /// stack's own fields were overwritten externally.
    #[error(
        "buffer identity inconsistent: \
         base {live_base:#x} vs shadow {shadow_base:#x}, \
         capacity {live_capacity} vs shadow {shadow_capacity}"
    )]
    IdentityInconsistent {
        /// Address the buffer reports.
        live_base: usize,
        /// Address recorded at the last (re)allocation.
        shadow_base: usize,
        /// Capacity the buffer reports.
        live_capacity: usize,
        /// Capacity recorded at the last (re)allocation.
        shadow_capacity: usize,
    },

    /// The stack already reported a violation and rejects everything but
    /// diagnostic inspection.
    #[error("stack poisoned by an earlier integrity violation")]
    Poisoned,
}
