// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::libc::{
    c_int,
    EINVAL,
    EIO,
    EMSGSIZE,
    ENOBUFS,
    ENODEV,
    ENOSPC,
    EOPNOTSUPP,
};
use ::std::{
    error,
    fmt,
    io,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Failure
#[derive(Clone)]
pub struct Fail {
    /// Error code.
    pub errno: c_int,
    /// Cause.
    pub cause: String,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

/// Associated functions for failures.
impl Fail {
    /// Creates a new failure.
    pub fn new(errno: i32, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
        }
    }

    /// The buffer pool has no free buffers. Recoverable backpressure, never fatal.
    pub fn pool_exhausted(cause: &str) -> Self {
        Self::new(ENOBUFS, cause)
    }

    /// The completion queue is at capacity. Recoverable; the incoming frame is dropped.
    pub fn queue_full(cause: &str) -> Self {
        Self::new(ENOSPC, cause)
    }

    /// A frame is larger than a single DMA buffer. Recoverable; rejected without allocating.
    pub fn oversized_frame(cause: &str) -> Self {
        Self::new(EMSGSIZE, cause)
    }

    /// The driver delivered a frame split across multiple buffers. Recoverable; dropped whole.
    pub fn split_frame(cause: &str) -> Self {
        Self::new(EOPNOTSUPP, cause)
    }

    /// A buffer handle is stale, out of range, or used against the buffer state machine.
    pub fn bad_handle(cause: &str) -> Self {
        Self::new(EINVAL, cause)
    }

    /// Driver or stack initialization failed. Fatal: the owning process should abort startup.
    pub fn device_init(cause: &str) -> Self {
        Self::new(ENODEV, cause)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Display trait implementation for failures.
impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Debug trait implementation for failures.
impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Error trait implementation for failures.
impl error::Error for Fail {}

/// Conversion trait implementation for failures.
impl From<io::Error> for Fail {
    fn from(_: io::Error) -> Self {
        Self {
            errno: EIO,
            cause: "I/O error".to_string(),
        }
    }
}
