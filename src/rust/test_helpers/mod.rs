// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Shared test doubles: a heap-backed DMA op table with identity physical/virtual mapping and call counters, a
//! scriptable network driver, and a frame-counting protocol stack.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    memory::{
        BufferHandle,
        DmaMemoryOps,
        DmaRegion,
    },
    network::{
        config::Config,
        NetworkDriver,
        ProtocolStack,
        RxFrame,
    },
};
use ::std::{
    alloc::{
        self,
        Layout,
    },
    cell::{
        Cell,
        RefCell,
    },
    collections::VecDeque,
    ptr::NonNull,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Heap-backed [DmaMemoryOps]: physical addresses are the virtual addresses, and the cache primitives only count
/// their invocations (the test host is cache-coherent).
pub struct HeapDma {
    allocations: RefCell<Vec<(NonNull<u8>, Layout)>>,
    clean_calls: Cell<usize>,
    invalidate_calls: Cell<usize>,
}

/// Scriptable [NetworkDriver]: inbound frames are queued by the test, outbound frames are logged, and transmit
/// acceptance can be toggled.
pub struct MockDriver {
    accept_tx: bool,
    tx_log: Vec<(u64, usize, BufferHandle)>,
    pending_rx: VecDeque<Vec<Vec<u8>>>,
    current_rx: Vec<Vec<u8>>,
}

/// [ProtocolStack] double that copies out every delivered frame and counts ticks.
#[derive(Default)]
pub struct CountingStack {
    pub frames: Vec<Vec<u8>>,
    pub ticks: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl HeapDma {
    pub fn new() -> Self {
        Self {
            allocations: RefCell::new(Vec::new()),
            clean_calls: Cell::new(0),
            invalidate_calls: Cell::new(0),
        }
    }

    /// Number of `cache_clean` calls observed.
    pub fn clean_calls(&self) -> usize {
        self.clean_calls.get()
    }

    /// Number of `cache_invalidate` calls observed.
    pub fn invalidate_calls(&self) -> usize {
        self.invalidate_calls.get()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            accept_tx: true,
            tx_log: Vec::new(),
            pending_rx: VecDeque::new(),
            current_rx: Vec::new(),
        }
    }

    /// Whether subsequent `transmit` calls are accepted or refused.
    pub fn set_accept_tx(&mut self, accept: bool) {
        self.accept_tx = accept;
    }

    /// Queues an inbound frame made of one driver-owned segment.
    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.pending_rx.push_back(vec![bytes.to_vec()]);
    }

    /// Queues an inbound frame split across several driver-owned segments.
    pub fn push_rx_split(&mut self, segments: &[&[u8]]) {
        self.pending_rx
            .push_back(segments.iter().map(|segment| segment.to_vec()).collect());
    }

    /// Frames handed to the hardware so far, as `(paddr, len, completion token)`.
    pub fn transmitted(&self) -> &[(u64, usize, BufferHandle)] {
        &self.tx_log
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl DmaMemoryOps for HeapDma {
    fn dma_alloc(&self, size: usize, align: usize) -> Result<DmaRegion, Fail> {
        let layout: Layout = match Layout::from_size_align(size, align) {
            Ok(layout) => layout,
            Err(_) => return Err(Fail::new(libc::EINVAL, "bad dma allocation layout")),
        };
        let vaddr: NonNull<u8> = match NonNull::new(unsafe { alloc::alloc_zeroed(layout) }) {
            Some(vaddr) => vaddr,
            None => return Err(Fail::new(libc::ENOMEM, "dma allocation failed")),
        };
        self.allocations.borrow_mut().push((vaddr, layout));
        Ok(DmaRegion {
            paddr: vaddr.as_ptr() as u64,
            vaddr,
            size,
        })
    }

    fn phys_to_virt(&self, paddr: u64) -> Option<NonNull<u8>> {
        NonNull::new(paddr as *mut u8)
    }

    fn cache_clean(&self, _vaddr: NonNull<u8>, _len: usize) {
        self.clean_calls.set(self.clean_calls.get() + 1);
    }

    fn cache_invalidate(&self, _vaddr: NonNull<u8>, _len: usize) {
        self.invalidate_calls.set(self.invalidate_calls.get() + 1);
    }
}

impl Drop for HeapDma {
    fn drop(&mut self) {
        for (vaddr, layout) in self.allocations.borrow_mut().drain(..) {
            unsafe { alloc::dealloc(vaddr.as_ptr(), layout) };
        }
    }
}

impl NetworkDriver for MockDriver {
    fn transmit(&mut self, paddr: u64, len: usize, handle: BufferHandle) -> Result<(), Fail> {
        if !self.accept_tx {
            return Err(Fail::new(libc::EIO, "mock driver refused frame"));
        }
        self.tx_log.push((paddr, len, handle));
        Ok(())
    }

    fn receive(&mut self) -> Option<RxFrame<'_>> {
        self.current_rx = self.pending_rx.pop_front()?;
        Some(RxFrame {
            segments: self.current_rx.iter().map(|segment| segment.as_slice()).collect(),
        })
    }
}

impl ProtocolStack for CountingStack {
    fn receive(&mut self, frame: &[u8]) {
        self.frames.push(frame.to_vec());
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for HeapDma {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Builds a bridge configuration with the given data-plane sizing and a fixed static network identity.
pub fn test_config(
    dma_buffer_count: usize,
    dma_buffer_size: usize,
    rx_queue_capacity: usize,
    tx_in_flight_max: usize,
) -> Config {
    let document: String = format!(
        "network:\n  \
           local_ipv4_addr: 192.168.0.2\n  \
           netmask: 255.255.255.0\n  \
           gateway: 192.168.0.1\n  \
           local_link_addr: \"00:1e:06:36:05:e5\"\n  \
           mtu: 1500\n\
         device:\n  \
           dma_buffer_count: {}\n  \
           dma_buffer_size: {}\n  \
           rx_queue_capacity: {}\n  \
           tx_in_flight_max: {}\n",
        dma_buffer_count, dma_buffer_size, rx_queue_capacity, tx_in_flight_max
    );
    Config::from_yaml_str(&document).expect("test configuration document is well-formed")
}
