// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::ptr::NonNull;

//======================================================================================================================
// Structures
//======================================================================================================================

/// A region of memory addressable by both the CPU and the device: the device sees `paddr`, the CPU sees `vaddr`.
#[derive(Clone, Copy, Debug)]
pub struct DmaRegion {
    /// Physical address, as programmed into the device.
    pub paddr: u64,
    /// Process-local virtual address.
    pub vaddr: NonNull<u8>,
    /// Size of the region in bytes.
    pub size: usize,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// DMA operation table supplied by the platform. The bridge consumes these primitives to carve out its buffer pool
/// and to order memory accesses across the CPU/device cache-coherence boundary; it never touches device registers
/// itself.
pub trait DmaMemoryOps {
    /// Allocates a DMA-addressable region of `size` bytes aligned to `align`.
    fn dma_alloc(&self, size: usize, align: usize) -> Result<DmaRegion, Fail>;

    /// Translates a physical address inside a previously allocated region back to its virtual address.
    fn phys_to_virt(&self, paddr: u64) -> Option<NonNull<u8>>;

    /// Flushes CPU-cached writes covering `[vaddr, vaddr + len)` to memory, so the device observes current data.
    fn cache_clean(&self, vaddr: NonNull<u8>, len: usize);

    /// Discards CPU-cached copies of `[vaddr, vaddr + len)`, so a subsequent read fetches current memory content.
    fn cache_invalidate(&self, vaddr: NonNull<u8>, len: usize);
}
