use std::mem::{self, MaybeUninit};
use std::sync::atomic::AtomicU64;

use serde_derive::{Deserialize, Serialize};
use shared_memory::{Shmem, ShmemConf, ShmemError};
use tracing::debug;

use crate::errors::RingError;

/// Layout version stamped into every ring header. Readers refuse anything else.
pub const RING_VERSION: u32 = 1;

/// Cache line size the on-region layout is built around. The host must not
/// report a larger line, or slot padding no longer isolates concurrent access.
pub const CACHE_LINE: usize = 64;

/// Longest shared memory object name accepted by POSIX hosts.
const NAME_MAX: usize = 255;

/// Ring buffer header, placed at offset 0 of the backing store.
///
/// The metadata fields occupy the first cache line and are written once by the
/// creating writer, then treated as immutable. The combined first/last counter
/// word sits alone on the second cache line so that position traffic never
/// contends with metadata reads.
#[repr(C, align(64))]
pub(crate) struct Header {
    pub(crate) version: u32,
    _pad0: u32,
    pub(crate) record_size: u64,
    pub(crate) data_offset: u64,
    pub(crate) capacity: u64,
    _pad1: [u8; 32],
    /// Packed positions: `first` in the low half, `last` in the high half.
    pub(crate) positions: AtomicU64,
}

const _: () = assert!(mem::size_of::<Header>() == 2 * CACHE_LINE);
const _: () = assert!(mem::align_of::<Header>() == CACHE_LINE);

impl Header {
    pub(crate) fn new(record_size: u64, data_offset: u64, capacity: u64) -> Header {
        Header {
            version: RING_VERSION,
            _pad0: 0,
            record_size,
            data_offset,
            capacity,
            _pad1: [0u8; 32],
            positions: AtomicU64::new(0),
        }
    }
}

/// One ring slot. Alignment pads every slot out to a cache line multiple, so
/// readers copying adjacent slots never share a line with the slot the writer
/// is currently filling.
#[repr(C, align(64))]
pub(crate) struct Slot<T> {
    pub(crate) value: MaybeUninit<T>,
}

/// Packs the two 32-bit position counters into the single atomic word.
///
/// Both counters always move in one store, so a reader can never observe a
/// `first`/`last` pair taken from two different publications.
#[inline]
pub(crate) const fn pack_positions(first: u32, last: u32) -> u64 {
    ((last as u64) << 32) | first as u64
}

#[inline]
pub(crate) const fn first_of(positions: u64) -> u32 {
    positions as u32
}

#[inline]
pub(crate) const fn last_of(positions: u64) -> u32 {
    (positions >> 32) as u32
}

/// Byte offset of the slot array: at least one header, rounded up to a slot
/// stride multiple so slot 0 keeps the stride alignment.
pub(crate) fn data_offset(slot_size: usize) -> usize {
    let min = mem::size_of::<Header>().max(slot_size);
    ((min - 1) / slot_size + 1) * slot_size
}

/// System page size. Shared memory mappings are page granular, and records
/// larger than a page are rejected at writer construction.
pub(crate) fn page_size() -> Result<usize, RingError> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(RingError::Environment("page size query failed".into()));
    }
    Ok(size as usize)
}

/// L1 data cache line size as reported by the host, `None` when unknown.
pub(crate) fn l1_cache_line_size() -> Option<usize> {
    let size = unsafe { libc::sysconf(libc::_SC_LEVEL1_DCACHE_LINESIZE) };
    if size <= 0 {
        None
    } else {
        Some(size as usize)
    }
}

fn validate_name(name: &str) -> Result<(), RingError> {
    if name.is_empty() || name.len() > NAME_MAX || name.contains('/') {
        return Err(RingError::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// Access mode a [`RingStore`] handle was established with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Creator side: may initialize the header and publish records.
    ReadWrite,
    /// Observer side: must never mutate the region.
    ReadOnly,
}

/// A named shared memory region backing one ring buffer.
///
/// The mapping is uniquely owned by the handle and stays valid for the
/// handle's lifetime. Writer and reader keep the handle behind an `Arc` so an
/// iterator or a second call site can share it without a double unmap. When
/// created with `remove_on_close`, dropping the handle also unlinks the name
/// from the host namespace.
pub struct RingStore {
    map: Shmem,
    mode: AccessMode,
}

// The raw mapping pointer pins shared memory, not thread-local state.
unsafe impl Send for RingStore {}
unsafe impl Sync for RingStore {}

impl RingStore {
    /// Create a new named region of `size` bytes and map it read-write.
    pub fn create(name: &str, size: usize, remove_on_close: bool) -> Result<RingStore, RingError> {
        validate_name(name)?;
        let mut map = match ShmemConf::new().size(size).os_id(name).create() {
            Ok(map) => map,
            Err(ShmemError::MappingIdExists) => {
                return Err(RingError::AlreadyExists(name.to_owned()))
            }
            Err(err) => return Err(RingError::Resource(err)),
        };
        map.set_owner(remove_on_close);
        debug!(name, size, remove_on_close, "created shared memory store");
        Ok(RingStore {
            map,
            mode: AccessMode::ReadWrite,
        })
    }

    /// Open an existing named region. The size is whatever the creator chose.
    pub fn open(name: &str) -> Result<RingStore, RingError> {
        let map = match ShmemConf::new().os_id(name).open() {
            Ok(map) => map,
            Err(ShmemError::MapOpenFailed(errno)) if errno == libc::ENOENT as u32 => {
                return Err(RingError::NotFound(name.to_owned()))
            }
            Err(err) => return Err(RingError::Resource(err)),
        };
        debug!(name, size = map.len(), "opened shared memory store");
        Ok(RingStore {
            map,
            mode: AccessMode::ReadOnly,
        })
    }

    /// Base address of the mapping.
    pub fn address(&self) -> *mut u8 {
        self.map.as_ptr()
    }

    /// Mapped size in bytes.
    pub fn size(&self) -> usize {
        self.map.len()
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}

/// Ring parameters for the demo and benchmark binaries, loaded from a config
/// file on the command line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingConfig {
    pub name: String,
    pub capacity: usize,
    pub remove_on_close: bool,
    pub underflow_fixup: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        RingConfig {
            name: String::from("shmring"),
            capacity: 4096,
            remove_on_close: false,
            underflow_fixup: crate::reader::DEFAULT_UNDERFLOW_FIXUP,
        }
    }
}
