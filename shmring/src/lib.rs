//! A lock-free single-producer/multiple-consumer ring buffer in named shared
//! memory, for streaming fixed-size records between processes.
//!
//! # Overview
//! One process creates a ring with [`RingWriter`](writer::RingWriter) and
//! publishes records; any number of processes open the same name with
//! [`RingReader`](reader::RingReader) and observe the stream at their own
//! pace. Readers never consume: the buffer keeps no per-reader state, every
//! reader sees the same sequence, and a slow reader is simply lapped rather
//! than slowing the producer down.
//!
//! Key components:
//! - [`RingWriter`](writer::RingWriter): creates the named region and
//!   publishes records with `push`/`push_with`.
//! - [`RingReader`](reader::RingReader): opens the region, validates the
//!   stored layout, and observes records with `get`/`try_get`/`advance`, or
//!   through the single-pass iterator from [`iter`](reader::RingReader::iter).
//! - [`RingStore`](core::RingStore): the named shared memory mapping both
//!   sides are built on.
//! - [`RingError`](errors::RingError): typed errors for every API boundary.
//!
//! # Concurrency model
//! The only shared mutable state is a single atomic word packing the `first`
//! and `last` position counters, plus the slot array; only the writer mutates
//! either. A `push` copies the record into its slot and then publishes both
//! counters in one release store. Readers load the word with acquire
//! ordering, copy the record at their private cursor, and reload the word to
//! detect an overwrite that raced with the copy.
//!
//! `push`, `try_get`, `advance`, `len` and `is_empty` are wait-free. `get`
//! spins until a record is visible and never times out on its own; use
//! `try_get` when the producer may go quiet.
//!
//! The writer keeps `last - first <= capacity - 1`, so the slot a reader at
//! position `first` is copying is never the slot being overwritten. A reader
//! that falls further behind is snapped forward past `first` and observes a
//! gap in the stream; record sequence numbers in the payload are the usual
//! way to detect how much was skipped.

pub mod core;
pub mod errors;
pub mod reader;
pub mod writer;

#[cfg(test)]
mod tests;

pub use crate::core::{AccessMode, RingConfig, RingStore, CACHE_LINE, RING_VERSION};
pub use crate::errors::RingError;
pub use crate::reader::{RingIter, RingReader, DEFAULT_UNDERFLOW_FIXUP};
pub use crate::writer::RingWriter;

/// Value types that may travel through a ring.
///
/// `Copy` is what the wire format needs: records are published and observed
/// as plain byte copies, so a value must not own anything outside itself and
/// must be safe to overwrite in place without running a destructor. The size
/// bound (one system page) is enforced when the writer is constructed.
pub trait RingValue: Copy + Send + 'static {}

impl<T: Copy + Send + 'static> RingValue for T {}
