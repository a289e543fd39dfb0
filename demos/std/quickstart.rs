//! # Quickstart Example
//!
//! Minimal example demonstrating the basics of rp-can-manager:
//! - Bring up an RX manager and subscribe two listeners
//! - Register periodic and event-driven frames on a TX manager
//! - Drive the periodic scheduler from a timer signal (a tokio interval
//!   stands in for the hardware timer interrupt)
//! - Read statistics and the bus load
//!
//! The controller is a loopback: every transmitted frame is received again.
//!
//! ```bash
//! cargo run --example quickstart
//! ```

use embassy_time::Duration;
use rp_can_manager::{
    CanController, CanFrame, Filter, FilterId, FrameFlags, ManagerError, RxConfig, RxManager,
    SignalTicks, TickSignal, TransmitError, TxConfig, TxManager, TxScheduler,
};
use static_cell::StaticCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

type Rx = RxManager<'static, 32, 4>;
type Tx = TxManager<'static, Loopback, 4, 4>;

static RX: Rx = RxManager::new(RxConfig::DEFAULT);
static TX: StaticCell<Tx> = StaticCell::new();
static TICK: TickSignal = TickSignal::new();

#[derive(Debug, Clone, Copy)]
struct LoopbackError;

impl embedded_can::Error for LoopbackError {
    fn kind(&self) -> embedded_can::ErrorKind {
        embedded_can::ErrorKind::Other
    }
}

/// Controller feeding every transmitted frame straight back into `RX`.
struct Loopback;

impl CanController for Loopback {
    type Error = LoopbackError;

    fn start(&self) -> Result<(), LoopbackError> {
        Ok(())
    }

    fn add_rx_filter(&self, _filter: &Filter) -> Result<FilterId, LoopbackError> {
        Ok(0)
    }

    fn try_send(&self, frame: &CanFrame) -> Result<(), TransmitError<LoopbackError>> {
        RX.on_frame(frame);
        Ok(())
    }

    async fn send<'a>(
        &'a self,
        frame: &'a CanFrame,
        _timeout: Duration,
    ) -> Result<(), TransmitError<LoopbackError>> {
        RX.on_frame(frame);
        Ok(())
    }
}

static HEARTBEAT_SEQ: AtomicU8 = AtomicU8::new(0);

fn heartbeat(frame: &mut CanFrame) -> Result<(), ManagerError> {
    frame.payload_mut()[0] = HEARTBEAT_SEQ.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

fn speed_command(frame: &mut CanFrame) -> Result<(), ManagerError> {
    frame.payload_mut()[..2].copy_from_slice(&1500u16.to_le_bytes());
    Ok(())
}

fn print_heartbeat(frame: &CanFrame) {
    println!("   heartbeat seq={}", frame.payload()[0]);
}

fn print_command(frame: &CanFrame) {
    println!("   command 0x{:03X}: {:02X?}", frame.id, frame.payload());
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== rp-can-manager Quickstart ===\n");

    // ======================================================================
    // 1. RX manager: one hardware filter, software listeners
    // ======================================================================
    println!("1. Initialising the RX manager");
    let filter_id = RX.init(&Loopback).expect("loopback starts");
    println!("   hardware filter id: {}", filter_id);

    RX.register(&Filter::exact_standard(0x100), &print_heartbeat)
        .expect("listener slot");
    RX.register(&Filter::standard(0x140, 0x7F0), &print_command)
        .expect("listener slot");
    println!("   listeners: {}\n", RX.stats().listeners);

    // ======================================================================
    // 2. TX manager: a 10 Hz heartbeat and an event-driven command
    // ======================================================================
    println!("2. Registering TX frames");
    let tx: &'static Tx = TX.init(TxManager::new(Loopback, TxConfig::default()));
    tx.register(0x100, 0x180, 1, FrameFlags::NONE, 10, &heartbeat)
        .await
        .expect("heartbeat registers");
    tx.register(0x141, 0x241, 2, FrameFlags::NONE, 0, &speed_command)
        .await
        .expect("command registers");
    println!("   frames: {}\n", tx.stats().await.frames);

    // ======================================================================
    // 3. Run the RX worker and the scheduler for a third of a second
    // ======================================================================
    println!("3. Running for 350 ms");
    let managers = [tx];
    let scheduler = TxScheduler::new(&managers);
    let mut ticks = SignalTicks(&TICK);
    let mut timer = tokio::time::interval(std::time::Duration::from_millis(
        tx.config().tick_ms as u64,
    ));
    let started = Instant::now();
    let _ = RX.calculate_load_at(0, 1_000_000, 0);

    tokio::select! {
        _ = RX.run() => {}
        _ = scheduler.run(&mut ticks) => {}
        // Timer interrupt: raise the tick signal once per period.
        _ = async {
            loop {
                timer.tick().await;
                TICK.signal(());
            }
        } => {}
        _ = async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            tx.send(0x141, Duration::from_millis(10)).await.expect("command sent");
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        } => {}
    }

    // ======================================================================
    // 4. Statistics
    // ======================================================================
    println!("\n4. Statistics");
    let rx_stats = RX.stats();
    let tx_stats = tx.stats().await;
    println!(
        "   RX: queued={} dropped={} dispatched={}",
        rx_stats.queued, rx_stats.dropped, rx_stats.dispatched
    );
    println!(
        "   TX: periodic_sent={} periodic_failed={} fill_failed={}",
        tx_stats.periodic_sent, tx_stats.periodic_failed, tx_stats.fill_failed
    );
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match RX.calculate_load_at(elapsed_ms, 1_000_000, 0) {
        Ok(load) => println!("   bus load at 1 Mbit/s: {:.3} %", load),
        Err(e) => eprintln!("   load error: {}", e),
    }

    println!("\nQuickstart complete.");
}
