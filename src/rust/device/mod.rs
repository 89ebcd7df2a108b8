// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod completion;
pub mod shim;
pub mod tick;

pub use self::{
    completion::{
        CompletionQueue,
        EnqueueOutcome,
        OverflowPolicy,
        RxDescriptor,
    },
    shim::{
        BridgeStats,
        EthernetBridge,
    },
    tick::TickDriver,
};
