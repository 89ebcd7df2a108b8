// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Constants
//======================================================================================================================

/// Default number of DMA buffers carved out at device initialization.
pub const DEFAULT_DMA_BUFFER_COUNT: usize = 512;

/// Default size of a single DMA buffer. Large enough for a standard Ethernet frame; frames that do not fit in one
/// buffer are unsupported and dropped.
pub const DEFAULT_DMA_BUFFER_SIZE: usize = 2048;

/// Default capacity of the receive completion queue.
pub const DEFAULT_RX_QUEUE_CAPACITY: usize = 256;

/// Default bound on concurrently in-flight transmit buffers.
pub const DEFAULT_TX_IN_FLIGHT_MAX: usize = 128;

/// Default maximum transfer unit reported to the protocol stack.
pub const DEFAULT_MTU: u16 = 1500;

/// Upper bound on the number of driver-owned segments a single inbound frame may span. Anything above one segment is
/// dropped (frame splitting is unsupported), but the driver interface must still be able to describe the condition.
pub const MAX_RX_SEGMENTS: usize = 4;
