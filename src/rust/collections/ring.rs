// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{
        AtomicUsize,
        Ordering,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A lock-free, single-producer single-consumer, fixed-size circular buffer.
///
/// The store publishing a new `back` index is ordered (release) after the write of the slot it describes, and the
/// consumer acquires `back` before reading the slot; symmetrically for `front` when recycling slots. This is the
/// discipline that keeps the ring correct when one endpoint runs in interrupt context.
pub struct SpscRing<T> {
    /// Indexes the first item in the front of the ring. Owned by the consumer.
    front: AtomicUsize,
    /// Indexes the first empty slot after the item in the back of the ring. Owned by the producer.
    back: AtomicUsize,
    /// Underlying slots. One slot is kept vacant to distinguish full from empty.
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Pre-computed capacity mask.
    mask: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<T: Copy> SpscRing<T> {
    /// Creates a ring with `capacity` slots. The capacity must be a power of two; the effective capacity is one less.
    pub fn new(capacity: usize) -> Result<Self, Fail> {
        if !capacity.is_power_of_two() {
            return Err(Fail::new(
                libc::EINVAL,
                "cannot create a ring buffer that does not have a power of two capacity",
            ));
        }

        let slots: Box<[UnsafeCell<MaybeUninit<T>>]> = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            front: AtomicUsize::new(0),
            back: AtomicUsize::new(0),
            slots,
            mask: capacity - 1,
        })
    }

    /// Creates the smallest ring whose effective capacity is at least `room`.
    pub fn with_room_for(room: usize) -> Result<Self, Fail> {
        if room == 0 {
            return Err(Fail::new(libc::EINVAL, "cannot create a ring buffer with zero capacity"));
        }
        Self::new((room + 1).next_power_of_two())
    }

    /// Returns the effective capacity of the target ring.
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Returns the number of items currently resident in the ring.
    pub fn len(&self) -> usize {
        let front: usize = self.front.load(Ordering::Acquire);
        let back: usize = self.back.load(Ordering::Acquire);
        back.wrapping_sub(front) & self.mask
    }

    /// Peeks the target ring and checks if it is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Peeks the target ring and checks if it is full.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Attempts to insert an item at the back of the target ring. Fails without blocking if the ring is full,
    /// handing the item back to the caller.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        let back: usize = self.back.load(Ordering::Relaxed);
        let front: usize = self.front.load(Ordering::Acquire);

        if (back + 1) & self.mask == front {
            return Err(item);
        }

        // Write, then publish.
        unsafe { (*self.slots[back].get()).write(item) };
        self.back.store((back + 1) & self.mask, Ordering::Release);

        Ok(())
    }

    /// Attempts to remove the item at the front of the target ring. Yields `None` without blocking if the ring is
    /// empty.
    pub fn try_dequeue(&self) -> Option<T> {
        let front: usize = self.front.load(Ordering::Relaxed);
        let back: usize = self.back.load(Ordering::Acquire);

        if front == back {
            return None;
        }

        // The slot was published by the matching release store on `back`.
        let item: T = unsafe { (*self.slots[front].get()).assume_init() };
        self.front.store((front + 1) & self.mask, Ordering::Release);

        Some(item)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

unsafe impl<T: Copy + Send> Send for SpscRing<T> {}
unsafe impl<T: Copy + Send> Sync for SpscRing<T> {}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
