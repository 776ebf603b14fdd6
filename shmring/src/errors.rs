use thiserror::Error;

/// Errors surfaced at the ring buffer API boundary.
///
/// Nothing is retried internally; every failure is terminal for the call that
/// raised it and leaves the buffer in a well-defined state.
#[derive(Debug, Error)]
pub enum RingError {
    /// Requested capacity is zero, over `u32::MAX`, or not a power of two.
    #[error("ring capacity {0} must be a power of two in [1, 2^32)")]
    InvalidCapacity(usize),

    /// The record type does not fit in one system page.
    #[error("record size {record} exceeds the system page size {page}")]
    RecordTooLarge { record: usize, page: usize },

    /// The host environment is incompatible with the fixed region layout.
    #[error("host environment unsupported: {0}")]
    Environment(String),

    /// A shared memory object with this name already exists.
    #[error("shared memory object `{0}` already exists")]
    AlreadyExists(String),

    /// The name is not acceptable to the host shared memory namespace.
    #[error("`{0}` is not a valid shared memory object name")]
    InvalidName(String),

    /// No shared memory object is registered under this name.
    #[error("shared memory object `{0}` does not exist")]
    NotFound(String),

    /// The stored layout version differs from this implementation's.
    #[error("ring layout version {found} is incompatible with version {expected}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The stored record size differs from the reader's record type.
    #[error("stored record size {stored} does not match reader record size {reader}")]
    RecordSizeMismatch { stored: u64, reader: u64 },

    /// Any other host shared memory failure.
    #[error("shared memory failure: {0}")]
    Resource(#[from] shared_memory::ShmemError),
}
