// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    network::ProtocolStack,
    SharedObject,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Pass-through scheduling point that advances the protocol stack's internal clock and timers. The owning process's
/// main loop drives this periodically; together with [crate::device::EthernetBridge::poll] it is the full scheduling
/// contract of the subsystem.
pub struct TickDriver<S> {
    stack: SharedObject<S>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<S: ProtocolStack> TickDriver<S> {
    pub fn new(stack: SharedObject<S>) -> Self {
        Self { stack }
    }

    /// Advances the stack's timers (retransmission, ARP/DHCP aging, and friends).
    pub fn tick(&mut self) {
        self.stack.tick();
    }
}
