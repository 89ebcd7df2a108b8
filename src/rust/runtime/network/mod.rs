// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod consts;
pub mod types;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    memory::BufferHandle,
    network::consts::MAX_RX_SEGMENTS,
};
use ::arrayvec::ArrayVec;

//======================================================================================================================
// Structures
//======================================================================================================================

/// An inbound frame as reported by the driver. Segments reference driver-owned memory that the hardware reuses as
/// soon as the receive call returns, so every segment must be copied out before returning control to the driver.
///
/// A well-formed frame occupies a single segment. Drivers that split a frame across receive buffers report one
/// segment per buffer; the bridge treats such frames as unsupported and drops them whole.
pub struct RxFrame<'a> {
    pub segments: ArrayVec<&'a [u8], MAX_RX_SEGMENTS>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<'a> RxFrame<'a> {
    /// Builds a single-segment frame.
    pub fn contiguous(bytes: &'a [u8]) -> Self {
        let mut segments: ArrayVec<&'a [u8], MAX_RX_SEGMENTS> = ArrayVec::new();
        segments.push(bytes);
        Self { segments }
    }

    /// Total payload length across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// Transmit and receive primitives of the physical network driver. Register programming and link management live
/// behind this seam; the bridge only ever hands over physical addresses and copies frames out of driver memory.
pub trait NetworkDriver {
    /// Hands a filled DMA buffer to the hardware transmit path. The `handle` is an opaque completion token: the
    /// driver passes it back through the bridge's `tx_complete` once the hardware is done with the buffer. An error
    /// means the frame was not accepted and the buffer is still owned by the caller.
    fn transmit(&mut self, paddr: u64, len: usize, handle: BufferHandle) -> Result<(), Fail>;

    /// Polls the hardware for the next inbound frame. Returns `None` when the receive path is drained. The returned
    /// segments are only valid for the duration of the borrow.
    fn receive(&mut self) -> Option<RxFrame<'_>>;
}

/// The protocol-stack collaborator: an opaque consumer of inbound frames plus the clock/timer entry point that the
/// owning process's main loop drives through [crate::device::TickDriver]. Supplied at initialization as a registered
/// capability, so the bridge is mockable and never reaches for a global callback.
pub trait ProtocolStack {
    /// Accepts one inbound frame. The slice is only valid for the duration of the call; the stack copies what it
    /// keeps.
    fn receive(&mut self, frame: &[u8]);

    /// Advances the stack's internal timers (retransmission, ARP aging, and friends).
    fn tick(&mut self);
}
