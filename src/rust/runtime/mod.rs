// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod fail;
pub mod logging;
pub mod memory;
pub mod network;

pub use self::fail::Fail;

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    ops::{
        Deref,
        DerefMut,
    },
    rc::Rc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// The SharedObject wraps a collaborator that is reachable from more than one place in the bridge: the driver is
/// shared between the device shim and the owner's completion path, and the protocol stack between the shim and the
/// tick driver.
pub struct SharedObject<T>(Rc<T>);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<T> SharedObject<T> {
    pub fn new(object: T) -> Self {
        Self(Rc::new(object))
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Dereferences a shared object for use.
impl<T> Deref for SharedObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

/// Dereferences a mutable reference to a shared object for use. This breaks Rust's ownership model because it allows
/// more than one mutable dereference of a shared object at a time. The bridge requires this because the control loop
/// and the device shim both hold the same driver and stack collaborators; the single-threaded scheduling contract
/// ensures that only one of them runs at a time, so the static borrow checker cannot see the exclusion and we do not
/// pay for the dynamic one. Shared objects must not be mutably dereferenced across a point where the other holder can
/// run.
impl<T> DerefMut for SharedObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        let ptr: *mut T = Rc::as_ptr(&self.0) as *mut T;
        unsafe { &mut *ptr }
    }
}

impl<T> Clone for SharedObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
