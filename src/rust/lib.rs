// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod collections;
pub mod device;
pub mod runtime;
pub mod test_helpers;

pub use crate::{
    device::{
        CompletionQueue,
        EthernetBridge,
        TickDriver,
    },
    runtime::{
        fail::Fail,
        memory::{
            BufferHandle,
            CacheCoherency,
            DmaBufferPool,
            DmaMemoryOps,
            DmaRegion,
        },
        network::{
            config::Config,
            types::MacAddress,
            NetworkDriver,
            ProtocolStack,
            RxFrame,
        },
        SharedObject,
    },
};

/// Asserts that two expressions are equal, bailing out of the enclosing function with an [anyhow::Error] otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => {{
        let left = $left;
        let right = $right;
        if left != right {
            ::anyhow::bail!(
                "ensure_eq failed: `{} == {}` (left: `{:?}`, right: `{:?}`)",
                stringify!($left),
                stringify!($right),
                left,
                right
            );
        }
    }};
}

/// Asserts that two expressions are not equal, bailing out of the enclosing function with an [anyhow::Error] otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => {{
        let left = $left;
        let right = $right;
        if left == right {
            ::anyhow::bail!(
                "ensure_neq failed: `{} != {}` (left: `{:?}`, right: `{:?}`)",
                stringify!($left),
                stringify!($right),
                left,
                right
            );
        }
    }};
}
