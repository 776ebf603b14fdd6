use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::core::{
    data_offset, first_of, l1_cache_line_size, last_of, pack_positions, page_size, Header,
    RingStore, Slot, CACHE_LINE,
};
use crate::errors::RingError;
use crate::RingValue;

/// The producing side of a shared memory ring buffer.
///
/// Exactly one writer may exist per ring; the writer creates the backing
/// store, sizes it, and initializes the header in one step. Publication never
/// blocks and never waits for readers: when the ring is full the oldest
/// record is overwritten and `first` advances.
pub struct RingWriter<T: RingValue> {
    store: Arc<RingStore>,
    header: NonNull<Header>,
    data: NonNull<Slot<T>>,
    capacity: u32,
    _marker: PhantomData<T>,
}

// A writer may move to another thread; the pointers target the shared
// mapping, which lives as long as `store`.
unsafe impl<T: RingValue> Send for RingWriter<T> {}

impl<T: RingValue> RingWriter<T> {
    /// Create the named ring with `capacity` slots.
    ///
    /// `capacity` must be a power of two below 2³². One slot is always kept
    /// unused, so a ring holds at most `capacity - 1` records at a time.
    /// With `remove_on_close`, dropping the writer unlinks the name.
    pub fn create(name: &str, capacity: usize, remove_on_close: bool) -> Result<Self, RingError> {
        if capacity == 0 || capacity > u32::MAX as usize || !capacity.is_power_of_two() {
            return Err(RingError::InvalidCapacity(capacity));
        }

        // Slot isolation relies on the fixed 64-byte stride covering whole
        // host cache lines.
        if let Some(line) = l1_cache_line_size() {
            if line > CACHE_LINE {
                return Err(RingError::Environment(format!(
                    "cache line size {line} exceeds the layout's {CACHE_LINE} bytes"
                )));
            }
        }

        let page = page_size()?;
        if mem::size_of::<T>() > page {
            return Err(RingError::RecordTooLarge {
                record: mem::size_of::<T>(),
                page,
            });
        }

        let slot_size = mem::size_of::<Slot<T>>();
        let offset = data_offset(slot_size);
        let store_size = offset + capacity * slot_size;

        // All validation happens before the name is registered, so a failed
        // construction leaves nothing behind in the host namespace.
        let store = Arc::new(RingStore::create(name, store_size, remove_on_close)?);

        let header = store.address() as *mut Header;
        unsafe {
            header.write(Header::new(
                mem::size_of::<T>() as u64,
                offset as u64,
                capacity as u64,
            ));
            // Publish the initialized header; the first observer's acquire
            // load of the positions pairs with this.
            (*header).positions.store(pack_positions(0, 0), Ordering::Release);
        }
        let data = unsafe { store.address().add(offset) as *mut Slot<T> };

        debug!(name, capacity, record_size = mem::size_of::<T>(), "ring created");

        Ok(RingWriter {
            store,
            header: NonNull::new(header).expect("mapped region is never null"),
            data: NonNull::new(data).expect("mapped region is never null"),
            capacity: capacity as u32,
            _marker: PhantomData,
        })
    }

    /// Append a copy of `value` to the stream.
    pub fn push(&mut self, value: T) {
        self.push_with(|| value);
    }

    /// Append the record produced by `init`, constructing it straight into
    /// the target slot.
    pub fn push_with(&mut self, init: impl FnOnce() -> T) {
        let header = unsafe { self.header.as_ref() };

        // Writer is the only mutator, so a relaxed self-read is enough here.
        let positions = header.positions.load(Ordering::Relaxed);
        let first = first_of(positions);
        let last = last_of(positions);

        unsafe {
            let slot = self.data.as_ptr().add((last & (self.capacity - 1)) as usize);
            (*slot).value.write(init());
        }

        let new_last = last.wrapping_add(1);
        // Keep one slot of slack between last and first so the record a
        // reader at `first` is copying is never the one being replaced.
        let new_first = if new_last.wrapping_sub(first) > self.capacity - 1 {
            new_last.wrapping_sub(self.capacity - 1)
        } else {
            first
        };

        header
            .positions
            .store(pack_positions(new_first, new_last), Ordering::Release);
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Number of records currently held, at most `capacity() - 1`.
    pub fn len(&self) -> usize {
        let positions = unsafe { self.header.as_ref() }.positions.load(Ordering::Relaxed);
        last_of(positions).wrapping_sub(first_of(positions)) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The backing store handle, shareable within the process.
    pub fn store(&self) -> &Arc<RingStore> {
        &self.store
    }
}
