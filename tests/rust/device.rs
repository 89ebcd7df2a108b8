// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! End-to-end scenarios for the device shim: backpressure, budget accounting, overflow and split-frame policy, and
//! pool conservation across mixed traffic.

use ::anyhow::Result;
use ::ethbridge::{
    ensure_eq,
    runtime::network::config::Config,
    test_helpers::{
        self,
        CountingStack,
        HeapDma,
        MockDriver,
    },
    DmaMemoryOps,
    EthernetBridge,
    SharedObject,
    TickDriver,
};
use ::std::rc::Rc;

//======================================================================================================================
// Helpers
//======================================================================================================================

struct Harness {
    bridge: EthernetBridge<MockDriver, CountingStack>,
    driver: SharedObject<MockDriver>,
    stack: SharedObject<CountingStack>,
    dma: Rc<HeapDma>,
}

fn setup(buffer_count: usize, buffer_size: usize, rx_queue_capacity: usize, tx_in_flight_max: usize) -> Result<Harness> {
    let config: Config = test_helpers::test_config(buffer_count, buffer_size, rx_queue_capacity, tx_in_flight_max);
    let dma: Rc<HeapDma> = Rc::new(HeapDma::new());
    let ops: Rc<dyn DmaMemoryOps> = dma.clone();
    let driver: SharedObject<MockDriver> = SharedObject::new(MockDriver::new());
    let stack: SharedObject<CountingStack> = SharedObject::new(CountingStack::default());
    let bridge: EthernetBridge<MockDriver, CountingStack> =
        EthernetBridge::new(&config, ops, driver.clone(), stack.clone(), "test0")?;

    Ok(Harness {
        bridge,
        driver,
        stack,
        dma,
    })
}

//======================================================================================================================
// Transmit Path
//======================================================================================================================

/// A frame larger than one DMA buffer is rejected without allocating.
#[test]
fn send_oversized_frame_is_rejected() -> Result<()> {
    let mut h: Harness = setup(4, 256, 4, 4)?;

    let free_before: usize = h.bridge.pool().free_len();
    ensure_eq!(h.bridge.send(&vec![0xAAu8; 257]), 0);
    ensure_eq!(h.bridge.pool().free_len(), free_before);
    ensure_eq!(h.driver.transmitted().len(), 0);
    Ok(())
}

/// With the in-flight maximum at two, the third send is backpressured until a completion reopens the window.
#[test]
fn send_honors_tx_in_flight_window() -> Result<()> {
    let mut h: Harness = setup(8, 2048, 4, 2)?;
    let frame: Vec<u8> = vec![0x55u8; 60];

    ensure_eq!(h.bridge.send(&frame), frame.len());
    ensure_eq!(h.bridge.send(&frame), frame.len());
    ensure_eq!(h.bridge.send(&frame), 0);
    ensure_eq!(h.bridge.tx_in_flight(), 2);

    let (_, _, handle) = h.driver.transmitted()[0];
    h.bridge.tx_complete(handle)?;
    ensure_eq!(h.bridge.tx_in_flight(), 1);
    ensure_eq!(h.bridge.send(&frame), frame.len());
    Ok(())
}

/// A driver that refuses a frame costs nothing: the buffer returns to the pool and the window stays open.
#[test]
fn send_recovers_from_driver_rejection() -> Result<()> {
    let mut h: Harness = setup(4, 2048, 4, 4)?;
    h.driver.set_accept_tx(false);

    ensure_eq!(h.bridge.send(&[1, 2, 3, 4]), 0);
    ensure_eq!(h.bridge.tx_in_flight(), 0);
    ensure_eq!(h.bridge.pool().free_len(), 4);
    ensure_eq!(h.bridge.stats().tx_rejected_driver, 1);
    Ok(())
}

/// The frame lands in device-visible memory exactly as the stack handed it over, and the written span was cleaned.
#[test]
fn send_copies_frame_into_dma_memory() -> Result<()> {
    let mut h: Harness = setup(4, 2048, 4, 4)?;
    let frame: Vec<u8> = (0..64u8).collect();

    let cleans_before: usize = h.dma.clean_calls();
    ensure_eq!(h.bridge.send(&frame), frame.len());
    ensure_eq!(h.dma.clean_calls(), cleans_before + 1);

    let (paddr, len, _) = h.driver.transmitted()[0];
    ensure_eq!(len, frame.len());
    // HeapDma maps physical addresses to themselves.
    let device_view: &[u8] = unsafe { std::slice::from_raw_parts(paddr as *const u8, len) };
    ensure_eq!(device_view, &frame[..]);
    Ok(())
}

/// Pool exhaustion on the transmit path surfaces as zero bytes accepted.
#[test]
fn send_backpressures_on_pool_exhaustion() -> Result<()> {
    let mut h: Harness = setup(2, 2048, 2, 8)?;
    let frame: Vec<u8> = vec![0u8; 32];

    ensure_eq!(h.bridge.send(&frame), frame.len());
    ensure_eq!(h.bridge.send(&frame), frame.len());
    ensure_eq!(h.bridge.send(&frame), 0);
    ensure_eq!(h.bridge.stats().tx_rejected_pool, 1);
    Ok(())
}

//======================================================================================================================
// Receive Path
//======================================================================================================================

/// Budget accounting: five inbound frames against a budget of three dispatch exactly three; the follow-up poll
/// dispatches the remaining two and returns the unused budget.
#[test]
fn poll_respects_budget() -> Result<()> {
    let mut h: Harness = setup(8, 2048, 8, 4)?;
    for i in 0..5u8 {
        h.driver.push_rx(&[i; 60]);
    }

    ensure_eq!(h.bridge.poll(3), 0);
    ensure_eq!(h.stack.frames.len(), 3);

    ensure_eq!(h.bridge.poll(5), 3);
    ensure_eq!(h.stack.frames.len(), 5);
    ensure_eq!(h.bridge.pool().free_len(), 8);
    // The counters account for delivered frames only.
    ensure_eq!(h.bridge.stats().rx_frames, 5);
    ensure_eq!(h.bridge.stats().rx_bytes, 5 * 60);

    for (i, frame) in h.stack.frames.iter().enumerate() {
        ensure_eq!(frame, &vec![i as u8; 60]);
    }
    Ok(())
}

/// Polling an idle device is an idempotent no-op: the budget comes back unchanged.
#[test]
fn poll_on_empty_is_noop() -> Result<()> {
    let mut h: Harness = setup(4, 2048, 4, 4)?;

    ensure_eq!(h.bridge.poll(5), 5);
    ensure_eq!(h.bridge.poll(0), 0);
    ensure_eq!(h.stack.frames.len(), 0);
    Ok(())
}

/// Dispatch invalidates the buffer before the CPU reads what the device wrote.
#[test]
fn poll_invalidates_before_dispatch() -> Result<()> {
    let mut h: Harness = setup(4, 2048, 4, 4)?;
    h.driver.push_rx(&[0xEE; 40]);

    let invalidates_before: usize = h.dma.invalidate_calls();
    ensure_eq!(h.bridge.poll(1), 0);
    ensure_eq!(h.dma.invalidate_calls(), invalidates_before + 1);
    ensure_eq!(h.stack.frames.len(), 1);
    Ok(())
}

/// A frame split across multiple driver buffers is dropped whole: all constituent buffers return to the pool and
/// the stack sees nothing.
#[test]
fn split_frame_is_dropped_whole() -> Result<()> {
    let mut h: Harness = setup(8, 2048, 8, 4)?;
    h.driver.push_rx_split(&[&[1u8; 100], &[2u8; 100]]);

    ensure_eq!(h.bridge.poll(4), 4);
    ensure_eq!(h.stack.frames.len(), 0);
    ensure_eq!(h.bridge.pool().free_len(), 8);
    ensure_eq!(h.bridge.stats().rx_dropped_split, 1);
    Ok(())
}

/// Completion-queue overflow fires at exactly the configured capacity: with room for four descriptors, seven
/// inbound frames against a budget of seven deliver four and drop three, and every dropped buffer returns to the
/// pool immediately.
#[test]
fn rx_overflow_drops_incoming() -> Result<()> {
    let mut h: Harness = setup(8, 2048, 4, 4)?;
    for i in 0..7u8 {
        h.driver.push_rx(&[i; 60]);
    }

    ensure_eq!(h.bridge.poll(7), 3);
    ensure_eq!(h.stack.frames.len(), 4);
    for (i, frame) in h.stack.frames.iter().enumerate() {
        ensure_eq!(frame, &vec![i as u8; 60]);
    }
    ensure_eq!(h.bridge.stats().rx_dropped_overflow, 3);
    ensure_eq!(h.bridge.pool().free_len(), 8);
    Ok(())
}

/// Pool exhaustion on the receive path drops frames instead of wedging the bridge.
#[test]
fn rx_backpressures_on_pool_exhaustion() -> Result<()> {
    let mut h: Harness = setup(2, 2048, 2, 2)?;
    for i in 0..4u8 {
        h.driver.push_rx(&[i; 60]);
    }

    let remaining: usize = h.bridge.poll(4);
    ensure_eq!(remaining <= 2, true);
    ensure_eq!(h.bridge.stats().rx_dropped_pool >= 1, true);
    ensure_eq!(h.bridge.pool().census().total(), 2);
    Ok(())
}

//======================================================================================================================
// Whole-Bridge Properties
//======================================================================================================================

/// The ownership census sums to the pool capacity at every point of a mixed tx/rx exchange.
#[test]
fn pool_is_conserved_across_mixed_traffic() -> Result<()> {
    let mut h: Harness = setup(8, 2048, 8, 4)?;

    ensure_eq!(h.bridge.send(&[7u8; 60]), 60);
    h.driver.push_rx(&[8u8; 60]);
    h.driver.push_rx(&[9u8; 60]);
    ensure_eq!(h.bridge.pool().census().total(), 8);

    // A budget of one ingests and dispatches a single frame; the other stays with the driver.
    ensure_eq!(h.bridge.poll(1), 0);
    ensure_eq!(h.bridge.pool().census().total(), 8);
    ensure_eq!(h.bridge.rx_backlog(), 0);
    ensure_eq!(h.stack.frames.len(), 1);

    let (_, _, handle) = h.driver.transmitted()[0];
    h.bridge.tx_complete(handle)?;
    ensure_eq!(h.bridge.poll(4), 3);
    ensure_eq!(h.bridge.pool().census().total(), 8);
    ensure_eq!(h.bridge.pool().free_len(), 8);
    ensure_eq!(h.stack.frames.len(), 2);
    Ok(())
}

/// A completed transmit handle cannot be completed twice.
#[test]
fn duplicate_tx_completion_is_rejected() -> Result<()> {
    let mut h: Harness = setup(4, 2048, 4, 4)?;

    ensure_eq!(h.bridge.send(&[1u8; 60]), 60);
    let (_, _, handle) = h.driver.transmitted()[0];
    h.bridge.tx_complete(handle)?;
    ensure_eq!(h.bridge.tx_complete(handle).is_err(), true);
    ensure_eq!(h.bridge.tx_in_flight(), 0);
    Ok(())
}

/// The capability surface exposes the configured identity, and ticks reach the stack's clock.
#[test]
fn capability_surface_and_tick() -> Result<()> {
    let h: Harness = setup(4, 2048, 4, 4)?;

    ensure_eq!(h.bridge.mtu(), 1500);
    ensure_eq!(h.bridge.name(), "test0");
    ensure_eq!(h.bridge.link_addr().octets(), [0x00, 0x1e, 0x06, 0x36, 0x05, 0xe5]);
    ensure_eq!(h.bridge.ipv4_config().addr.octets(), [192, 168, 0, 2]);

    let mut ticker: TickDriver<CountingStack> = TickDriver::new(h.stack.clone());
    ticker.tick();
    ticker.tick();
    ensure_eq!(h.stack.ticks, 2);
    Ok(())
}
