// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    device::completion::{
        CompletionQueue,
        EnqueueOutcome,
        RxDescriptor,
    },
    runtime::{
        fail::Fail,
        logging,
        memory::{
            BufferHandle,
            BufferState,
            CacheCoherency,
            DmaBufferPool,
            DmaMemoryOps,
            DmaRegion,
        },
        network::{
            config::{
                Config,
                Ipv4Config,
            },
            consts::MAX_RX_SEGMENTS,
            types::MacAddress,
            NetworkDriver,
            ProtocolStack,
            RxFrame,
        },
        SharedObject,
    },
};
use ::arrayvec::ArrayVec;
use ::std::sync::atomic::{
    AtomicUsize,
    Ordering,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Data-plane counters. Every dropped or rejected frame is accounted for somewhere below; nothing is retried
/// internally.
#[derive(Clone, Copy, Debug, Default)]
pub struct BridgeStats {
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub tx_rejected_oversize: u64,
    pub tx_rejected_backpressure: u64,
    pub tx_rejected_pool: u64,
    pub tx_rejected_driver: u64,
    pub rx_frames: u64,
    pub rx_bytes: u64,
    pub rx_dropped_overflow: u64,
    pub rx_dropped_split: u64,
    pub rx_dropped_oversize: u64,
    pub rx_dropped_pool: u64,
}

/// The device shim: the two-operation capability (`send`, `poll`) the protocol stack expects from a network device,
/// wired over the driver's raw transmit/receive primitives and this crate's DMA buffer pool.
///
/// One bridge per device; the bridge is an explicit handle, never process-wide state, so multiple instances and
/// test doubles coexist freely.
pub struct EthernetBridge<D, S> {
    pool: DmaBufferPool,
    completions: CompletionQueue,
    coherency: CacheCoherency,
    driver: SharedObject<D>,
    stack: SharedObject<S>,
    /// Number of buffers currently handed to the device for transmission. Atomic because transmit completions may
    /// arrive from interrupt context.
    tx_in_flight: AtomicUsize,
    tx_in_flight_max: usize,
    mtu: u16,
    link_addr: MacAddress,
    ipv4: Ipv4Config,
    name: String,
    stats: BridgeStats,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<D: NetworkDriver, S: ProtocolStack> EthernetBridge<D, S> {
    /// Brings up the bridge: carves the DMA buffer pool, sizes the completion queue, and binds the driver and stack
    /// collaborators. Failure here is fatal; the owning process should abort startup, since no further networking
    /// state is usable.
    pub fn new(
        config: &Config,
        ops: ::std::rc::Rc<dyn DmaMemoryOps>,
        driver: SharedObject<D>,
        stack: SharedObject<S>,
        name: &str,
    ) -> Result<Self, Fail> {
        logging::initialize();

        let link_addr: MacAddress = config.local_link_addr()?;
        let ipv4: Ipv4Config = config.ipv4_config()?;
        let mtu: u16 = config.mtu()?;
        let buffer_count: usize = config.dma_buffer_count()?;
        let buffer_size: usize = config.dma_buffer_size()?;
        let rx_queue_capacity: usize = config.rx_queue_capacity()?;
        let tx_in_flight_max: usize = config.tx_in_flight_max()?;

        if rx_queue_capacity > buffer_count {
            return Err(Fail::new(
                libc::EINVAL,
                "rx queue capacity cannot exceed the buffer pool capacity",
            ));
        }

        let coherency: CacheCoherency = CacheCoherency::new(ops.clone());
        let pool: DmaBufferPool = DmaBufferPool::new(&ops, buffer_count, buffer_size)?;
        let completions: CompletionQueue = CompletionQueue::new(rx_queue_capacity, config.rx_overflow_policy()?)?;

        info!(
            "initializing bridge {}: addr={} link={} mtu={} buffers={}x{}",
            name, ipv4.addr, link_addr, mtu, buffer_count, buffer_size
        );

        Ok(Self {
            pool,
            completions,
            coherency,
            driver,
            stack,
            tx_in_flight: AtomicUsize::new(0),
            tx_in_flight_max,
            mtu,
            link_addr,
            ipv4,
            name: name.to_string(),
            stats: BridgeStats::default(),
        })
    }

    /// Hands one outbound frame to the hardware. Returns the number of bytes accepted: all of them, or zero. Zero
    /// means backpressure or rejection, never a fatal condition; retry is the stack's decision.
    pub fn send(&mut self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        if bytes.len() > self.pool.buffer_size() {
            warn!("send(): frame of {} bytes exceeds buffer size {}", bytes.len(), self.pool.buffer_size());
            self.stats.tx_rejected_oversize += 1;
            return 0;
        }
        if self.tx_in_flight.load(Ordering::Acquire) >= self.tx_in_flight_max {
            self.stats.tx_rejected_backpressure += 1;
            return 0;
        }

        let handle: BufferHandle = match self.pool.allocate(BufferState::AllocatedForTx) {
            Ok(handle) => handle,
            Err(_) => {
                self.stats.tx_rejected_pool += 1;
                return 0;
            },
        };

        // The pool proved the handle current just above, so these cannot fail.
        if self.pool.write(handle, bytes).is_err() || self.pool.mark_in_flight(handle).is_err() {
            let _ = self.pool.release(handle);
            return 0;
        }
        let region: DmaRegion = match self.pool.region(handle) {
            Ok(region) => region,
            Err(_) => {
                let _ = self.pool.release(handle);
                return 0;
            },
        };

        // Flush the frame out of the CPU caches before the device reads it.
        self.coherency.prepare_for_device_read(&region, bytes.len());
        self.tx_in_flight.fetch_add(1, Ordering::AcqRel);

        let mut driver: SharedObject<D> = self.driver.clone();
        match driver.transmit(region.paddr, bytes.len(), handle) {
            Ok(()) => {
                self.stats.tx_frames += 1;
                self.stats.tx_bytes += bytes.len() as u64;
                // Partial acceptance is not modeled: the driver took the whole frame.
                bytes.len()
            },
            Err(e) => {
                warn!("send(): driver rejected frame: {:?}", e);
                self.tx_in_flight.fetch_sub(1, Ordering::AcqRel);
                let _ = self.pool.release(handle);
                self.stats.tx_rejected_driver += 1;
                0
            },
        }
    }

    /// Transmit-completion callback, invoked by the driver once hardware is done with a buffer. May run
    /// synchronously inside a poll or from an interrupt context. Returns the buffer to the pool and reopens the
    /// transmit window.
    pub fn tx_complete(&mut self, handle: BufferHandle) -> Result<(), Fail> {
        if self.pool.state(handle)? != BufferState::InFlightTx {
            let cause: String = format!("tx completion for a buffer that is not in flight: {:?}", handle);
            error!("tx_complete(): {}", cause);
            return Err(Fail::bad_handle(&cause));
        }

        self.pool.release(handle)?;
        self.tx_in_flight.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    /// Moves up to `budget` inbound frames from the hardware to the stack: drains the driver's receive path into
    /// the completion queue (copying frames out of driver-owned memory before the driver reuses it), then
    /// dispatches queued frames to the stack's receive capability. Returns the unused remainder of the budget; a
    /// zero budget or an idle device is a no-op.
    pub fn poll(&mut self, budget: usize) -> usize {
        if budget == 0 {
            return 0;
        }

        // Ingest phase. The driver borrow lives for each iteration only.
        let mut driver: SharedObject<D> = self.driver.clone();
        for _ in 0..budget {
            match driver.receive() {
                Some(frame) => self.ingest(&frame),
                None => break,
            }
        }

        // Dispatch phase; this is what consumes the budget.
        let mut remaining: usize = budget;
        let mut stack: SharedObject<S> = self.stack.clone();
        while remaining > 0 {
            let descriptor: RxDescriptor = match self.completions.dequeue() {
                Some(descriptor) => descriptor,
                None => break,
            };

            match self.pool.region(descriptor.handle) {
                Ok(region) => {
                    // The device wrote this buffer; discard any stale cached lines before the CPU reads it.
                    self.coherency.prepare_for_device_write(&region);
                    match self.pool.read(descriptor.handle, descriptor.len) {
                        Ok(frame) => {
                            stack.receive(frame);
                            self.stats.rx_frames += 1;
                            self.stats.rx_bytes += descriptor.len as u64;
                        },
                        Err(e) => error!("poll(): cannot read queued buffer: {:?}", e),
                    }
                },
                Err(e) => error!("poll(): queued descriptor went stale: {:?}", e),
            }

            if let Err(e) = self.pool.release(descriptor.handle) {
                error!("poll(): cannot release dispatched buffer: {:?}", e);
            }
            remaining -= 1;
        }

        remaining
    }

    /// Copies one driver-reported frame into pool buffers and offers it to the completion queue. All failure modes
    /// drop the frame and return every touched buffer to the pool.
    fn ingest(&mut self, frame: &RxFrame) {
        if frame.is_empty() {
            return;
        }

        let mut staged: ArrayVec<BufferHandle, MAX_RX_SEGMENTS> = ArrayVec::new();
        for segment in &frame.segments {
            if segment.len() > self.pool.buffer_size() {
                warn!("ingest(): segment of {} bytes exceeds buffer size", segment.len());
                self.discard(&staged);
                self.stats.rx_dropped_oversize += 1;
                return;
            }
            match self.pool.allocate(BufferState::OwnedByDeviceRx) {
                Ok(handle) => match self.pool.write(handle, segment) {
                    Ok(()) => staged.push(handle),
                    Err(e) => {
                        error!("ingest(): cannot copy segment: {:?}", e);
                        let _ = self.pool.release(handle);
                        self.discard(&staged);
                        return;
                    },
                },
                Err(_) => {
                    // Pool exhausted: backpressure, drop the frame whole.
                    self.discard(&staged);
                    self.stats.rx_dropped_pool += 1;
                    return;
                },
            }
        }

        // Frame splitting is not supported. Return the buffers to the pool and drop the frame; it must never be
        // partially delivered.
        if staged.len() > 1 {
            let cause: String = format!("frame split across {} buffers is not supported", staged.len());
            warn!("ingest(): dropping frame: {:?}", Fail::split_frame(&cause));
            self.discard(&staged);
            self.stats.rx_dropped_split += 1;
            return;
        }

        let handle: BufferHandle = staged[0];
        if self.pool.mark_queued(handle).is_err() {
            let _ = self.pool.release(handle);
            return;
        }
        match self.completions.enqueue(RxDescriptor {
            handle,
            len: frame.len(),
        }) {
            EnqueueOutcome::Queued => {},
            EnqueueOutcome::Rejected(rejected) => {
                warn!(
                    "ingest(): dropping incoming frame: {:?}",
                    Fail::queue_full("completion queue is at capacity")
                );
                let _ = self.pool.release(rejected.handle);
                self.stats.rx_dropped_overflow += 1;
            },
            EnqueueOutcome::Evicted(oldest) => {
                warn!(
                    "ingest(): evicting oldest frame: {:?}",
                    Fail::queue_full("completion queue is at capacity")
                );
                let _ = self.pool.release(oldest.handle);
                self.stats.rx_dropped_overflow += 1;
            },
        }
    }

    /// Releases a batch of staged rx buffers.
    fn discard(&mut self, staged: &[BufferHandle]) {
        for handle in staged {
            if let Err(e) = self.pool.release(*handle) {
                error!("discard(): cannot release staged buffer: {:?}", e);
            }
        }
    }

    /// Maximum transfer unit reported to the protocol stack.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Hardware address of the device.
    pub fn link_addr(&self) -> MacAddress {
        self.link_addr
    }

    /// Static IPv4 identity configured for this link.
    pub fn ipv4_config(&self) -> Ipv4Config {
        self.ipv4
    }

    /// Name of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of transmit buffers currently owned by the device.
    pub fn tx_in_flight(&self) -> usize {
        self.tx_in_flight.load(Ordering::Acquire)
    }

    /// Snapshot of the data-plane counters.
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// The backing buffer pool.
    pub fn pool(&self) -> &DmaBufferPool {
        &self.pool
    }

    /// Number of received frames awaiting dispatch.
    pub fn rx_backlog(&self) -> usize {
        self.completions.len()
    }
}
