// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::memory::dma::{
    DmaMemoryOps,
    DmaRegion,
};
use ::std::rc::Rc;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Cache-coherence bracketing for buffer ownership transfers between the CPU and the device.
///
/// Every transfer must be bracketed by exactly one matching call: [Self::prepare_for_device_read] before the device
/// reads a buffer the CPU wrote, [Self::prepare_for_device_write] before the CPU reads a buffer the device wrote.
/// Omitting a call is a correctness bug (stale data observed by one side), not a performance issue. These are
/// hardware-ordering primitives and cannot fail.
pub struct CacheCoherency {
    ops: Rc<dyn DmaMemoryOps>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl CacheCoherency {
    pub fn new(ops: Rc<dyn DmaMemoryOps>) -> Self {
        Self { ops }
    }

    /// Invalidates the CPU cache lines covering `region`, so that data the device wrote (or is about to write) is
    /// never shadowed by stale cached lines.
    pub fn prepare_for_device_write(&self, region: &DmaRegion) {
        self.ops.cache_invalidate(region.vaddr, region.size);
    }

    /// Cleans (flushes) the first `len` bytes of `region`, so the device observes the frame the CPU just wrote.
    pub fn prepare_for_device_read(&self, region: &DmaRegion, len: usize) {
        self.ops.cache_clean(region.vaddr, len.min(region.size));
    }

    /// Clean+invalidate pass over a freshly allocated buffer, run once at pool construction before the buffer is
    /// ever handed to either side.
    pub fn scrub(&self, region: &DmaRegion) {
        self.ops.cache_clean(region.vaddr, region.size);
        self.ops.cache_invalidate(region.vaddr, region.size);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Clone for CacheCoherency {
    fn clone(&self) -> Self {
        Self { ops: self.ops.clone() }
    }
}
