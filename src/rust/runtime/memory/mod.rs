// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod cache;
pub mod dma;
pub mod pool;

pub use self::{
    cache::CacheCoherency,
    dma::{
        DmaMemoryOps,
        DmaRegion,
    },
    pool::{
        BufferHandle,
        BufferState,
        DmaBufferPool,
        StateCensus,
    },
};
