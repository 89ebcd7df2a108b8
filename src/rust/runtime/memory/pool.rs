// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::ring::SpscRing,
    runtime::{
        fail::Fail,
        memory::{
            cache::CacheCoherency,
            dma::{
                DmaMemoryOps,
                DmaRegion,
            },
        },
    },
};
use ::std::{
    fmt,
    rc::Rc,
    slice,
    sync::atomic::{
        AtomicU32,
        AtomicU8,
        Ordering,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Ownership state of a single DMA buffer. Exactly one owner at a time: the pool (`Free`), the transmit path, the
/// device, or the stack dispatch path.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum BufferState {
    /// Resident in the free list.
    Free = 0,
    /// Claimed by `send`, being filled by the CPU.
    AllocatedForTx = 1,
    /// Handed to the device for transmission.
    InFlightTx = 2,
    /// Filled from the device's receive path.
    OwnedByDeviceRx = 3,
    /// Resident in the completion queue, awaiting stack dispatch.
    QueuedForStack = 4,
}

/// Opaque handle to a buffer in a [DmaBufferPool]. The generation counter detects use of a handle that was released
/// and whose buffer has since been recycled.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    index: u32,
    generation: u32,
}

/// Per-buffer bookkeeping.
struct PoolEntry {
    region: DmaRegion,
    state: AtomicU8,
    generation: AtomicU32,
}

/// Fixed-capacity pool of DMA-addressable buffers. All buffers are allocated once at construction and only their
/// ownership state cycles thereafter; the free list is an SPSC ring of buffer indices, so one endpoint of the pool
/// (release on tx completion) may run in interrupt context.
pub struct DmaBufferPool {
    entries: Box<[PoolEntry]>,
    free_list: SpscRing<u32>,
    buffer_size: usize,
    /// Keeps the DMA op table alive for as long as the pool references its regions.
    coherency: CacheCoherency,
}

/// Snapshot of how many buffers sit in each ownership state. The per-state counts always sum to the pool capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateCensus {
    pub free: usize,
    pub allocated_for_tx: usize,
    pub in_flight_tx: usize,
    pub owned_by_device_rx: usize,
    pub queued_for_stack: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl BufferState {
    fn from_u8(raw: u8) -> BufferState {
        match raw {
            0 => BufferState::Free,
            1 => BufferState::AllocatedForTx,
            2 => BufferState::InFlightTx,
            3 => BufferState::OwnedByDeviceRx,
            4 => BufferState::QueuedForStack,
            _ => unreachable!("invalid buffer state tag"),
        }
    }
}

impl BufferHandle {
    /// Returns the pool index this handle refers to.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl DmaBufferPool {
    /// Carves `capacity` buffers of `buffer_size` bytes out of DMA-addressable memory. Failure here is fatal to
    /// device bring-up and is reported as such.
    pub fn new(ops: &Rc<dyn DmaMemoryOps>, capacity: usize, buffer_size: usize) -> Result<Self, Fail> {
        if capacity == 0 || buffer_size == 0 {
            return Err(Fail::new(libc::EINVAL, "pool capacity and buffer size must be non-zero"));
        }

        let coherency: CacheCoherency = CacheCoherency::new(ops.clone());
        let free_list: SpscRing<u32> = SpscRing::with_room_for(capacity)?;
        let mut entries: Vec<PoolEntry> = Vec::with_capacity(capacity);

        for i in 0..capacity {
            let region: DmaRegion = match ops.dma_alloc(buffer_size, buffer_size) {
                Ok(region) => region,
                Err(e) => {
                    let cause: String = format!("failed to dma-allocate buffer {} of {}: {:?}", i, capacity, e);
                    error!("new(): {}", cause);
                    return Err(Fail::device_init(&cause));
                },
            };
            // The buffer has never crossed the coherence boundary; start it from a known-clean cache state.
            coherency.scrub(&region);

            entries.push(PoolEntry {
                region,
                state: AtomicU8::new(BufferState::Free as u8),
                generation: AtomicU32::new(0),
            });
            assert!(free_list.try_enqueue(i as u32).is_ok());
        }

        Ok(Self {
            entries: entries.into_boxed_slice(),
            free_list,
            buffer_size,
            coherency,
        })
    }

    /// Returns the cache-coherence bracketing helper bound to this pool's DMA op table.
    pub fn coherency(&self) -> &CacheCoherency {
        &self.coherency
    }

    /// Returns the fixed number of buffers owned by the pool.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the fixed size of each buffer in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the number of buffers currently resident in the free list.
    pub fn free_len(&self) -> usize {
        self.free_list.len()
    }

    /// Pops a buffer from the free list and tags it with its first owned state. Pool exhaustion is backpressure:
    /// the caller drops or defers the frame, it never aborts.
    pub fn allocate(&self, state: BufferState) -> Result<BufferHandle, Fail> {
        debug_assert!(matches!(state, BufferState::AllocatedForTx | BufferState::OwnedByDeviceRx));

        let index: u32 = match self.free_list.try_dequeue() {
            Some(index) => index,
            None => {
                let cause: &str = "out of preallocated dma buffers";
                warn!("allocate(): {}", cause);
                return Err(Fail::pool_exhausted(cause));
            },
        };

        let entry: &PoolEntry = &self.entries[index as usize];
        entry.state.store(state as u8, Ordering::Release);
        Ok(BufferHandle {
            index,
            generation: entry.generation.load(Ordering::Acquire),
        })
    }

    /// Returns a buffer to the free list. Releasing a stale handle or a buffer already in the free list is a usage
    /// error and is rejected.
    pub fn release(&self, handle: BufferHandle) -> Result<(), Fail> {
        let entry: &PoolEntry = self.checked(handle)?;

        let previous: u8 = entry.state.swap(BufferState::Free as u8, Ordering::AcqRel);
        if previous == BufferState::Free as u8 {
            let cause: String = format!("double release of buffer {}", handle.index);
            error!("release(): {}", cause);
            return Err(Fail::bad_handle(&cause));
        }

        // Retire every outstanding handle to this buffer before it becomes re-allocatable.
        entry.generation.fetch_add(1, Ordering::Release);
        assert!(
            self.free_list.try_enqueue(handle.index).is_ok(),
            "the free list always has room for a released index"
        );
        Ok(())
    }

    /// Transitions a buffer from `AllocatedForTx` to `InFlightTx` as it is handed to the device.
    pub fn mark_in_flight(&self, handle: BufferHandle) -> Result<(), Fail> {
        self.transition(handle, BufferState::AllocatedForTx, BufferState::InFlightTx)
    }

    /// Transitions a buffer from `OwnedByDeviceRx` to `QueuedForStack` as it enters the completion queue.
    pub fn mark_queued(&self, handle: BufferHandle) -> Result<(), Fail> {
        self.transition(handle, BufferState::OwnedByDeviceRx, BufferState::QueuedForStack)
    }

    /// Returns the current ownership state of a buffer.
    pub fn state(&self, handle: BufferHandle) -> Result<BufferState, Fail> {
        let entry: &PoolEntry = self.checked(handle)?;
        Ok(BufferState::from_u8(entry.state.load(Ordering::Acquire)))
    }

    /// Returns the DMA region backing a buffer. The physical address is what gets programmed into the device; the
    /// pool never leaks raw addresses through any other path.
    pub fn region(&self, handle: BufferHandle) -> Result<DmaRegion, Fail> {
        Ok(self.checked(handle)?.region)
    }

    /// Copies `bytes` into the front of a buffer.
    pub fn write(&self, handle: BufferHandle, bytes: &[u8]) -> Result<(), Fail> {
        if bytes.len() > self.buffer_size {
            return Err(Fail::oversized_frame("frame does not fit in a dma buffer"));
        }
        let entry: &PoolEntry = self.checked(handle)?;

        // Safety: `checked` proved the handle current, so this path is the buffer's unique owner, and the length
        // was bounded against the region size above.
        unsafe {
            slice::from_raw_parts_mut(entry.region.vaddr.as_ptr(), bytes.len()).copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Borrows the first `len` bytes of a buffer.
    pub fn read(&self, handle: BufferHandle, len: usize) -> Result<&[u8], Fail> {
        let entry: &PoolEntry = self.checked(handle)?;
        if len > entry.region.size {
            return Err(Fail::bad_handle("read length exceeds buffer size"));
        }

        // Safety: `checked` proved the handle current; the borrow is tied to `&self`, and the buffer cannot be
        // recycled without the owner releasing the handle first.
        Ok(unsafe { slice::from_raw_parts(entry.region.vaddr.as_ptr(), len) })
    }

    /// Counts buffers per ownership state. `census().total() == capacity()` in every reachable state.
    pub fn census(&self) -> StateCensus {
        let mut census: StateCensus = StateCensus::default();
        for entry in self.entries.iter() {
            match BufferState::from_u8(entry.state.load(Ordering::Acquire)) {
                BufferState::Free => census.free += 1,
                BufferState::AllocatedForTx => census.allocated_for_tx += 1,
                BufferState::InFlightTx => census.in_flight_tx += 1,
                BufferState::OwnedByDeviceRx => census.owned_by_device_rx += 1,
                BufferState::QueuedForStack => census.queued_for_stack += 1,
            }
        }
        census
    }

    /// Validates a handle's index and generation.
    fn checked(&self, handle: BufferHandle) -> Result<&PoolEntry, Fail> {
        let entry: &PoolEntry = match self.entries.get(handle.index()) {
            Some(entry) => entry,
            None => return Err(Fail::bad_handle("buffer index out of range")),
        };
        if entry.generation.load(Ordering::Acquire) != handle.generation {
            let cause: String = format!("stale handle for buffer {}", handle.index);
            error!("checked(): {}", cause);
            return Err(Fail::bad_handle(&cause));
        }
        Ok(entry)
    }

    /// Common state-machine transition with usage-error reporting.
    fn transition(&self, handle: BufferHandle, from: BufferState, to: BufferState) -> Result<(), Fail> {
        let entry: &PoolEntry = self.checked(handle)?;
        match entry
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(actual) => {
                let cause: String = format!(
                    "buffer {} is {:?}, expected {:?}",
                    handle.index,
                    BufferState::from_u8(actual),
                    from
                );
                error!("transition(): {}", cause);
                Err(Fail::bad_handle(&cause))
            },
        }
    }
}

impl StateCensus {
    pub fn total(&self) -> usize {
        self.free + self.allocated_for_tx + self.in_flight_tx + self.owned_by_device_rx + self.queued_for_stack
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferHandle({}@{})", self.index, self.generation)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
