use std::cell::Cell;
use std::hint;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::core::{first_of, last_of, Header, RingStore, Slot, RING_VERSION};
use crate::errors::RingError;
use crate::RingValue;

/// How many records past `first` a lapped reader is snapped forward.
///
/// Any non-negative value is correct; larger values skip more of the stream
/// per lap but make an immediate re-lap under sustained pressure less likely.
pub const DEFAULT_UNDERFLOW_FIXUP: u32 = 128;

/// An observer of a shared memory ring buffer.
///
/// A reader keeps its cursor in private memory and never touches the shared
/// region beyond atomic loads of the position word, so any number of readers
/// can follow the same ring independently. Readers that fall more than a
/// full ring behind the writer are lapped: their cursor snaps forward and the
/// skipped records are gone.
pub struct RingReader<T: RingValue> {
    store: Arc<RingStore>,
    header: NonNull<Header>,
    data: NonNull<Slot<T>>,
    capacity_mask: u32,
    underflow_fixup: u32,
    read_pos: Cell<u32>,
    _marker: PhantomData<T>,
}

// Readers move freely between threads; the `Cell` cursor keeps them !Sync.
unsafe impl<T: RingValue> Send for RingReader<T> {}

impl<T: RingValue> RingReader<T> {
    /// Attach to the named ring with the default underflow fixup.
    pub fn open(name: &str) -> Result<Self, RingError> {
        Self::open_with_fixup(name, DEFAULT_UNDERFLOW_FIXUP)
    }

    /// Attach to the named ring, validating the stored layout against this
    /// reader's record type before anything is read.
    pub fn open_with_fixup(name: &str, underflow_fixup: u32) -> Result<Self, RingError> {
        let store = Arc::new(RingStore::open(name)?);
        let header = store.address() as *mut Header;

        let (version, record_size, data_off, capacity) = unsafe {
            let h = &*header;
            (h.version, h.record_size, h.data_offset, h.capacity)
        };

        if version != RING_VERSION {
            return Err(RingError::VersionMismatch {
                expected: RING_VERSION,
                found: version,
            });
        }
        if record_size != mem::size_of::<T>() as u64 {
            return Err(RingError::RecordSizeMismatch {
                stored: record_size,
                reader: mem::size_of::<T>() as u64,
            });
        }

        let data = unsafe { store.address().add(data_off as usize) as *mut Slot<T> };
        let positions = unsafe { (*header).positions.load(Ordering::Acquire) };

        debug!(name, capacity, underflow_fixup, "ring opened for reading");

        Ok(RingReader {
            store,
            header: NonNull::new(header).expect("mapped region is never null"),
            data: NonNull::new(data).expect("mapped region is never null"),
            capacity_mask: capacity as u32 - 1,
            underflow_fixup,
            read_pos: Cell::new(first_of(positions)),
            _marker: PhantomData,
        })
    }

    /// Acquire-load the position word and snap the cursor forward if the
    /// writer has lapped it. Every observation goes through here.
    #[inline]
    fn load_positions(&self) -> u64 {
        let positions = unsafe { self.header.as_ref() }.positions.load(Ordering::Acquire);
        let first = first_of(positions);
        // Counters are monotone modulo 2^32; the wrapping difference read as
        // a signed distance stays far below 2^31 either way.
        if first.wrapping_sub(self.read_pos.get()) as i32 > 0 {
            self.read_pos.set(first.wrapping_add(self.underflow_fixup));
        }
        positions
    }

    #[inline]
    fn available(&self, positions: u64) -> usize {
        let ahead = last_of(positions).wrapping_sub(self.read_pos.get()) as i32;
        if ahead > 0 {
            ahead as usize
        } else {
            0
        }
    }

    #[inline]
    fn slot_ptr(&self, pos: u32) -> *const T {
        unsafe {
            let slot = self.data.as_ptr().add((pos & self.capacity_mask) as usize);
            (*slot).value.as_ptr()
        }
    }

    /// Number of records currently available to this reader.
    pub fn len(&self) -> usize {
        let positions = self.load_positions();
        self.available(positions)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the record at the cursor, spinning until one is available.
    ///
    /// Does not advance the cursor. Spins forever under a silent writer; use
    /// [`try_get`](Self::try_get) when that matters.
    pub fn get(&self) -> T {
        loop {
            let mut positions = self.load_positions();
            while self.available(positions) == 0 {
                hint::spin_loop();
                positions = self.load_positions();
            }
            if let Some(value) = self.copy_current() {
                return value;
            }
        }
    }

    /// Copy out the record at the cursor if one is available.
    ///
    /// Does not advance the cursor and never blocks.
    pub fn try_get(&self) -> Option<T> {
        loop {
            let positions = self.load_positions();
            if self.available(positions) == 0 {
                return None;
            }
            if let Some(value) = self.copy_current() {
                return Some(value);
            }
        }
    }

    /// Copy the record at the cursor, then revalidate the position word to
    /// see whether the slot was overwritten mid-copy. `None` means the
    /// cursor was snapped forward and the copy must be discarded.
    #[inline]
    fn copy_current(&self) -> Option<T> {
        let at = self.read_pos.get();
        let value = unsafe { ptr::read(self.slot_ptr(at)) };
        self.load_positions();
        (self.read_pos.get() == at).then_some(value)
    }

    /// Advance the cursor `n` records forward without touching shared memory.
    ///
    /// Never blocks; moving past the newest record just leaves the reader
    /// empty until the writer catches up.
    pub fn advance(&self, n: usize) {
        self.read_pos.set(self.read_pos.get().wrapping_add(n as u32));
    }

    /// A single-pass iterator that yields records until the ring is observed
    /// empty.
    pub fn iter(&self) -> RingIter<'_, T> {
        RingIter { reader: self }
    }

    /// The backing store handle, shareable within the process.
    pub fn store(&self) -> &Arc<RingStore> {
        &self.store
    }
}

impl<'a, T: RingValue> IntoIterator for &'a RingReader<T> {
    type Item = T;
    type IntoIter = RingIter<'a, T>;

    fn into_iter(self) -> RingIter<'a, T> {
        self.iter()
    }
}

/// Single-pass iterator over a [`RingReader`].
///
/// Emptiness is a snapshot: the iterator ends when no record is available at
/// the moment it is asked for the next one, which makes it suitable for
/// catch-up loops but not for algorithms needing a stable end.
pub struct RingIter<'a, T: RingValue> {
    reader: &'a RingReader<T>,
}

impl<T: RingValue> Iterator for RingIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.reader.is_empty() {
            return None;
        }
        let value = self.reader.get();
        self.reader.advance(1);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{pack_positions, RingStore};
    use crate::tests::unique_name;
    use crate::writer::RingWriter;

    const CAP: usize = 4096;

    #[test]
    fn fresh_reader_sees_an_empty_ring() -> Result<(), RingError> {
        let name = unique_name("reader-empty");
        let _ring = RingWriter::<i32>::create(&name, CAP, true)?;
        let reader = RingReader::<i32>::open(&name)?;

        assert_eq!(reader.len(), 0);
        assert!(reader.is_empty());
        assert_eq!(reader.try_get(), None);
        Ok(())
    }

    #[test]
    fn open_rejects_unknown_names() {
        let name = unique_name("reader-missing");
        assert!(matches!(
            RingReader::<i32>::open(&name),
            Err(RingError::NotFound(_))
        ));
    }

    #[test]
    fn open_rejects_mismatched_record_size() -> Result<(), RingError> {
        #[derive(Clone, Copy)]
        #[repr(C)]
        struct Pair {
            a: i32,
            b: f64,
        }

        let name = unique_name("reader-recsize");
        let _ring = RingWriter::<Pair>::create(&name, CAP, true)?;

        match RingReader::<i32>::open(&name) {
            Err(RingError::RecordSizeMismatch { stored, reader }) => {
                assert_eq!(stored, mem::size_of::<Pair>() as u64);
                assert_eq!(reader, mem::size_of::<i32>() as u64);
            }
            Err(other) => panic!("expected record size mismatch, got {other:?}"),
            Ok(_) => panic!("mismatched reader was accepted"),
        }
        Ok(())
    }

    #[test]
    fn open_rejects_mismatched_version() -> Result<(), RingError> {
        let name = unique_name("reader-version");
        // Hand-build a header with a bogus version.
        let store = RingStore::create(&name, 4096, true)?;
        let header = store.address() as *mut Header;
        unsafe {
            let mut h = Header::new(mem::size_of::<i32>() as u64, 128, 16);
            h.version = RING_VERSION + 1;
            header.write(h);
            (*header).positions.store(pack_positions(0, 0), Ordering::Release);
        }

        match RingReader::<i32>::open(&name) {
            Err(RingError::VersionMismatch { expected, found }) => {
                assert_eq!(expected, RING_VERSION);
                assert_eq!(found, RING_VERSION + 1);
            }
            Err(other) => panic!("expected version mismatch, got {other:?}"),
            Ok(_) => panic!("mismatched reader was accepted"),
        }
        Ok(())
    }

    #[test]
    fn get_returns_a_pushed_struct_record() -> Result<(), RingError> {
        #[derive(Clone, Copy, PartialEq, Debug)]
        #[repr(C)]
        struct Pair {
            a: i32,
            b: f64,
        }

        let name = unique_name("reader-struct");
        let mut ring = RingWriter::<Pair>::create(&name, CAP, true)?;
        let reader = RingReader::<Pair>::open(&name)?;

        ring.push_with(|| Pair { a: 0x1234abcd, b: 3.7142 });
        assert_eq!(reader.len(), 1);

        let record = reader.get();
        assert_eq!(record.a, 0x1234abcd);
        assert_eq!(record.b, 3.7142);
        // get does not advance
        assert_eq!(reader.len(), 1);
        Ok(())
    }

    #[test]
    fn advance_moves_the_cursor_without_blocking() -> Result<(), RingError> {
        let name = unique_name("reader-advance");
        let mut ring = RingWriter::<i32>::create(&name, CAP, true)?;
        let reader = RingReader::<i32>::open(&name)?;

        let count = 10;
        for i in 0..count {
            ring.push(i);
        }

        assert_eq!(reader.len(), count as usize);
        reader.advance(count as usize);
        assert_eq!(reader.len(), 0);

        // one short of the end
        for i in 0..count {
            ring.push(i);
        }
        assert_eq!(reader.len(), count as usize);
        reader.advance(count as usize - 1);
        assert_eq!(reader.len(), 1);
        reader.advance(1);
        assert_eq!(reader.len(), 0);

        // past the end is legal and leaves the reader empty
        for i in 0..count {
            ring.push(i);
        }
        reader.advance(count as usize + 1);
        assert_eq!(reader.len(), 0);
        assert_eq!(reader.try_get(), None);
        Ok(())
    }

    #[test]
    fn advance_zero_changes_nothing() -> Result<(), RingError> {
        let name = unique_name("reader-advance0");
        let mut ring = RingWriter::<i32>::create(&name, CAP, true)?;
        let reader = RingReader::<i32>::open(&name)?;

        ring.push(41);
        ring.push(42);
        let before = reader.len();
        reader.advance(0);
        assert_eq!(reader.len(), before);
        assert_eq!(reader.get(), 41);
        Ok(())
    }

    #[test]
    fn iterator_yields_the_pushed_sequence() -> Result<(), RingError> {
        let name = unique_name("reader-iter");
        let mut ring = RingWriter::<i32>::create(&name, CAP, true)?;
        let reader = RingReader::<i32>::open(&name)?;

        for i in 0..10 {
            ring.push(i);
        }

        let seen: Vec<i32> = reader.iter().collect();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert!(reader.is_empty());
        Ok(())
    }

    #[test]
    fn iterator_drains_a_nearly_full_ring() -> Result<(), RingError> {
        let name = unique_name("reader-iter-full");
        let mut ring = RingWriter::<u32>::create(&name, CAP, true)?;
        let reader = RingReader::<u32>::open(&name)?;

        for i in 0..(CAP as u32 - 1) {
            ring.push(i);
        }

        let mut expected = 0u32;
        for value in &reader {
            assert_eq!(value, expected);
            expected += 1;
        }
        assert_eq!(expected, CAP as u32 - 1);
        Ok(())
    }

    #[test]
    fn overrun_skips_forward_and_never_rereads_old_data() -> Result<(), RingError> {
        let name = unique_name("reader-overrun");
        let mut ring = RingWriter::<i64>::create(&name, CAP, true)?;
        let reader = RingReader::<i64>::open(&name)?;

        for i in 0..(CAP as i64 - 1) {
            ring.push(i);
        }
        assert_eq!(reader.get(), 0);
        reader.advance(1);

        // two more pushes lap the reader's neighborhood
        ring.push(CAP as i64);
        ring.push(CAP as i64 + 1);

        let next = reader.get();
        assert_ne!(next, 1, "overrun must not deliver the overwritten record");
        reader.advance(1);
        assert!(reader.len() <= CAP - 2);
        Ok(())
    }

    #[test]
    fn interleaved_stream_is_delivered_without_loss() -> Result<(), RingError> {
        let name = unique_name("reader-interleave");
        let mut ring = RingWriter::<i64>::create(&name, CAP, true)?;
        let reader = RingReader::<i64>::open(&name)?;

        // runs long enough to wrap the slot index many times over
        let mut diff: i64 = 0;
        for i in 0..(CAP as i64 * CAP as i64) {
            ring.push(i);
            diff += reader.get() - i;
            reader.advance(1);
        }
        assert_eq!(diff, 0);
        assert!(reader.is_empty());
        Ok(())
    }

    #[test]
    fn readers_do_not_disturb_each_other() -> Result<(), RingError> {
        let name = unique_name("reader-pair");
        let mut ring = RingWriter::<i32>::create(&name, CAP, true)?;
        let first = RingReader::<i32>::open(&name)?;

        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(first.get(), 0);
        first.advance(1);

        // a reader opened later starts at the stream's current first record
        let second = RingReader::<i32>::open(&name)?;
        assert_eq!(second.len(), 5);
        assert_eq!(second.get(), 0);
        second.advance(3);

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 3);
        Ok(())
    }
}
