// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::ring::SpscRing,
    runtime::{
        fail::Fail,
        memory::BufferHandle,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// What to do when a frame arrives and the completion queue is at capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the incoming frame (the default and the safer choice).
    DropIncoming,
    /// Evict the oldest queued frame in favor of the incoming one. Eviction dequeues from the enqueue path, so this
    /// policy is only valid under the cooperative-polling model, never with an interrupt-context producer.
    EvictOldest,
}

/// A buffer that the device finished filling, awaiting dispatch to the stack.
#[derive(Clone, Copy, Debug)]
pub struct RxDescriptor {
    pub handle: BufferHandle,
    pub len: usize,
}

/// Outcome of offering a descriptor to the completion queue. The caller owns whichever buffer comes back.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// The descriptor is resident in the queue.
    Queued,
    /// The queue was full; the oldest descriptor was evicted to make room and its buffer must be released.
    Evicted(RxDescriptor),
    /// The queue was full; the incoming descriptor was rejected and its buffer must be released.
    Rejected(RxDescriptor),
}

/// Bounded FIFO of buffers ready for stack dispatch. The rx path (possibly interrupt context) is the producer, the
/// control thread's `poll` is the consumer. The backing ring rounds its slot count up to a power of two, so the
/// configured capacity is enforced here, not by the ring.
pub struct CompletionQueue {
    ring: SpscRing<RxDescriptor>,
    capacity: usize,
    policy: OverflowPolicy,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl CompletionQueue {
    /// Creates a completion queue holding exactly `capacity` descriptors.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self, Fail> {
        Ok(Self {
            ring: SpscRing::with_room_for(capacity)?,
            capacity,
            policy,
        })
    }

    /// Offers a descriptor to the queue, applying the configured overflow policy when it is at capacity. Existing
    /// entries are never corrupted; a rejected or evicted descriptor is handed back for buffer release.
    pub fn enqueue(&self, descriptor: RxDescriptor) -> EnqueueOutcome {
        if self.ring.len() >= self.capacity {
            return match self.policy {
                OverflowPolicy::DropIncoming => EnqueueOutcome::Rejected(descriptor),
                OverflowPolicy::EvictOldest => match self.ring.try_dequeue() {
                    Some(oldest) => {
                        // A slot just opened below the configured bound and we are the only producer.
                        assert!(self.ring.try_enqueue(descriptor).is_ok());
                        EnqueueOutcome::Evicted(oldest)
                    },
                    None => EnqueueOutcome::Rejected(descriptor),
                },
            };
        }

        // The ring's effective capacity is at least the configured one, so it never fills below the bound.
        match self.ring.try_enqueue(descriptor) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(rejected) => EnqueueOutcome::Rejected(rejected),
        }
    }

    /// Removes the descriptor at the front of the queue, if any.
    pub fn dequeue(&self) -> Option<RxDescriptor> {
        self.ring.try_dequeue()
    }

    /// Returns the number of descriptors awaiting dispatch.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns the configured capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        CompletionQueue,
        EnqueueOutcome,
        OverflowPolicy,
        RxDescriptor,
    };
    use crate::{
        runtime::memory::{
            dma::DmaMemoryOps,
            BufferHandle,
            BufferState,
            DmaBufferPool,
        },
        test_helpers::HeapDma,
    };
    use ::anyhow::Result;
    use ::std::rc::Rc;

    /// Allocates `n` rx-owned handles out of a fresh pool.
    fn handles(pool: &DmaBufferPool, n: usize) -> Result<Vec<BufferHandle>> {
        (0..n)
            .map(|_| Ok(pool.allocate(BufferState::OwnedByDeviceRx)?))
            .collect()
    }

    fn mkpool(capacity: usize) -> Result<DmaBufferPool> {
        let ops: Rc<dyn DmaMemoryOps> = Rc::new(HeapDma::new());
        Ok(DmaBufferPool::new(&ops, capacity, 256)?)
    }

    /// A full queue rejects the incoming descriptor without corrupting resident entries.
    #[test]
    fn drop_incoming_on_overflow() -> Result<()> {
        let pool: DmaBufferPool = mkpool(8)?;
        let handles: Vec<BufferHandle> = handles(&pool, 4)?;
        let queue: CompletionQueue = CompletionQueue::new(3, OverflowPolicy::DropIncoming)?;

        for (i, handle) in handles.iter().take(3).enumerate() {
            match queue.enqueue(RxDescriptor {
                handle: *handle,
                len: i + 1,
            }) {
                EnqueueOutcome::Queued => {},
                outcome => anyhow::bail!("expected Queued, got {:?}", outcome),
            }
        }

        match queue.enqueue(RxDescriptor {
            handle: handles[3],
            len: 99,
        }) {
            EnqueueOutcome::Rejected(rejected) => crate::ensure_eq!(rejected.handle, handles[3]),
            outcome => anyhow::bail!("expected Rejected, got {:?}", outcome),
        }

        for (i, handle) in handles.iter().take(3).enumerate() {
            let descriptor: RxDescriptor = queue.dequeue().ok_or(anyhow::anyhow!("queue should not be empty"))?;
            crate::ensure_eq!(descriptor.handle, *handle);
            crate::ensure_eq!(descriptor.len, i + 1);
        }
        crate::ensure_eq!(queue.dequeue().is_none(), true);
        Ok(())
    }

    /// Under the alternate policy, overflow evicts the oldest descriptor and keeps the incoming one.
    #[test]
    fn evict_oldest_on_overflow() -> Result<()> {
        let pool: DmaBufferPool = mkpool(8)?;
        let handles: Vec<BufferHandle> = handles(&pool, 4)?;
        let queue: CompletionQueue = CompletionQueue::new(3, OverflowPolicy::EvictOldest)?;

        for handle in handles.iter().take(3) {
            queue.enqueue(RxDescriptor { handle: *handle, len: 64 });
        }

        match queue.enqueue(RxDescriptor {
            handle: handles[3],
            len: 64,
        }) {
            EnqueueOutcome::Evicted(oldest) => crate::ensure_eq!(oldest.handle, handles[0]),
            outcome => anyhow::bail!("expected Evicted, got {:?}", outcome),
        }

        let resident: Vec<BufferHandle> = std::iter::from_fn(|| queue.dequeue()).map(|d| d.handle).collect();
        crate::ensure_eq!(resident, handles[1..4].to_vec());
        Ok(())
    }

    /// The queue holds exactly its configured capacity, even though the backing ring rounds its slot count up.
    #[test]
    fn configured_capacity_is_exact() -> Result<()> {
        let pool: DmaBufferPool = mkpool(8)?;
        let handles: Vec<BufferHandle> = handles(&pool, 5)?;
        let queue: CompletionQueue = CompletionQueue::new(4, OverflowPolicy::DropIncoming)?;
        crate::ensure_eq!(queue.capacity(), 4);

        for handle in handles.iter().take(4) {
            match queue.enqueue(RxDescriptor { handle: *handle, len: 64 }) {
                EnqueueOutcome::Queued => {},
                outcome => anyhow::bail!("expected Queued, got {:?}", outcome),
            }
        }
        crate::ensure_eq!(queue.len(), 4);

        match queue.enqueue(RxDescriptor {
            handle: handles[4],
            len: 64,
        }) {
            EnqueueOutcome::Rejected(rejected) => crate::ensure_eq!(rejected.handle, handles[4]),
            outcome => anyhow::bail!("expected Rejected, got {:?}", outcome),
        }
        crate::ensure_eq!(queue.len(), 4);
        Ok(())
    }

    /// Dequeue on an empty queue yields nothing.
    #[test]
    fn dequeue_on_empty() -> Result<()> {
        let queue: CompletionQueue = CompletionQueue::new(4, OverflowPolicy::DropIncoming)?;
        crate::ensure_eq!(queue.dequeue().is_none(), true);
        crate::ensure_eq!(queue.is_empty(), true);
        Ok(())
    }
}
