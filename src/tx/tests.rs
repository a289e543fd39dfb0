//! TX manager tests: registry bookkeeping, fill ordering, periodic cadence.
use super::*;
use crate::error::ManagerError;
use crate::frame::{CanFrame, FrameFlags};
use crate::traits::mock::MockController;
use crate::traits::tick_source::{TickSignal, TickSource};
use crate::tx::registry::interval_ticks;
use core::future::Future;
use embassy_futures::block_on;
use embassy_time::Duration;
use std::sync::Mutex;
use std::vec::Vec;

type Manager<'a> = TxManager<'a, MockController, 4, 4>;

const TIMEOUT: Duration = Duration::from_millis(10);

fn manager<'a>() -> Manager<'a> {
    TxManager::new(MockController::new(), TxConfig::default())
}

fn ok_fill(_frame: &mut CanFrame) -> Result<(), ManagerError> {
    Ok(())
}

//==================================================================================CONFIG
#[test]
/// Intervals round up and never reach zero for periodic frames.
fn test_interval_ticks_rounding() {
    assert_eq!(interval_ticks(100, 1), 10);
    assert_eq!(interval_ticks(1000, 1), 1);
    assert_eq!(interval_ticks(3, 1), 334);
    assert_eq!(interval_ticks(30, 10), 4);
    assert_eq!(interval_ticks(0, 1), 0);
}

#[test]
fn test_max_frequency_follows_tick() {
    assert_eq!(TxConfig::default().max_frequency(), 1000);
    assert_eq!(TxConfig { tick_ms: 10 }.max_frequency(), 100);
}

//==================================================================================REGISTER
#[test]
/// Malformed DLCs and rates above the tick rate are refused.
fn test_register_validates_arguments() {
    let tx: TxManager<'_, MockController, 4, 4> =
        TxManager::new(MockController::new(), TxConfig { tick_ms: 10 });
    block_on(async {
        assert_eq!(
            tx.register(0x100, 0x80, 8, FrameFlags::NONE, 101, &ok_fill).await,
            Err(ManagerError::InvalidArgument)
        );
        assert_eq!(
            tx.register(0x100, 0x80, 9, FrameFlags::NONE, 0, &ok_fill).await,
            Err(ManagerError::InvalidArgument)
        );
        assert_eq!(
            tx.register(0x100, 0x80, 16, FrameFlags::FD, 0, &ok_fill).await,
            Err(ManagerError::InvalidArgument)
        );
        assert_eq!(
            tx.register(0x100, 0x80, 15, FrameFlags::FD, 100, &ok_fill).await,
            Ok(SenderId(0))
        );
    });
}

#[test]
/// A second sender must match the frequency of the existing frame.
fn test_register_frequency_conflict() {
    let tx = manager();
    block_on(async {
        tx.register(0x100, 0x80, 8, FrameFlags::NONE, 10, &ok_fill)
            .await
            .unwrap();
        assert_eq!(
            tx.register(0x100, 0x81, 8, FrameFlags::NONE, 20, &ok_fill).await,
            Err(ManagerError::InvalidArgument)
        );
        assert_eq!(
            tx.register(0x100, 0x81, 8, FrameFlags::NONE, 10, &ok_fill).await,
            Ok(SenderId(1))
        );

        let stats = tx.stats().await;
        assert_eq!(stats.senders, 2);
        assert_eq!(stats.frames, 1);
    });
}

#[test]
/// A full table fails without leaving an orphan registry entry.
fn test_register_capacity_checked_first() {
    let tx: TxManager<'_, MockController, 1, 2> =
        TxManager::new(MockController::new(), TxConfig::default());
    block_on(async {
        tx.register(0x100, 0x80, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();
        assert_eq!(
            tx.register(0x200, 0x81, 8, FrameFlags::NONE, 0, &ok_fill).await,
            Err(ManagerError::ResourceExhausted)
        );
        assert_eq!(tx.frame_entry(0x200).await, None);
        assert_eq!(tx.stats().await.frames, 1);
    });

    let tx: TxManager<'_, MockController, 4, 1> =
        TxManager::new(MockController::new(), TxConfig::default());
    block_on(async {
        tx.register(0x100, 0x80, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();
        assert_eq!(
            tx.register(0x200, 0x81, 8, FrameFlags::NONE, 0, &ok_fill).await,
            Err(ManagerError::ResourceExhausted)
        );
        assert_eq!(tx.stats().await.senders, 1);
    });
}

//==================================================================================UNREGISTER
#[test]
/// The registry entry disappears with its last sender.
fn test_unregister_last_sender_removes_frame() {
    let tx = manager();
    block_on(async {
        tx.register(0x100, 0x80, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();
        tx.register(0x100, 0x81, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();
        tx.register(0x200, 0x82, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();

        assert_eq!(tx.unregister(0x100, 0x80).await, Ok(()));
        assert!(tx.frame_entry(0x100).await.is_some());
        assert_eq!(tx.send(0x100, TIMEOUT).await, Ok(()));

        assert_eq!(tx.unregister(0x100, 0x81).await, Ok(()));
        assert_eq!(tx.frame_entry(0x100).await, None);
        assert_eq!(tx.send(0x100, TIMEOUT).await, Err(ManagerError::NotFound));
        assert_eq!(
            tx.unregister(0x100, 0x81).await,
            Err(ManagerError::NotFound)
        );
    });
}

#[test]
/// Removing a middle entry keeps the registry dense and reusable.
fn test_registry_compaction() {
    let tx: TxManager<'_, MockController, 4, 3> =
        TxManager::new(MockController::new(), TxConfig::default());
    block_on(async {
        for (i, id) in [0x100, 0x200, 0x300].into_iter().enumerate() {
            tx.register(id, 0x80 + i as u32, 8, FrameFlags::NONE, 0, &ok_fill)
                .await
                .unwrap();
        }
        tx.unregister(0x100, 0x80).await.unwrap();
        assert_eq!(tx.stats().await.frames, 2);
        assert!(tx.frame_entry(0x300).await.is_some());

        tx.register(0x400, 0x90, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();
        assert_eq!(tx.stats().await.frames, 3);
        assert_eq!(tx.send(0x300, TIMEOUT).await, Ok(()));
        assert_eq!(tx.controller().sent()[0].id, 0x300);
    });
}

//==================================================================================SEND
#[test]
/// Every sender of a transmit id fills the same frame before one send.
fn test_send_runs_all_fills_in_slot_order() {
    let order = Mutex::new(Vec::new());
    let left = |frame: &mut CanFrame| -> Result<(), ManagerError> {
        order.lock().unwrap().push("left");
        frame.data[0] = 0xAA;
        Ok(())
    };
    let right = |frame: &mut CanFrame| -> Result<(), ManagerError> {
        order.lock().unwrap().push("right");
        frame.data[1] = 0xBB;
        Ok(())
    };

    let tx = manager();
    block_on(async {
        tx.register(0x100, 0x01, 8, FrameFlags::NONE, 0, &left)
            .await
            .unwrap();
        tx.register(0x100, 0x02, 8, FrameFlags::NONE, 0, &right)
            .await
            .unwrap();
        assert_eq!(tx.send(0x100, TIMEOUT).await, Ok(()));
    });

    let sent = tx.controller().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(&sent[0].payload()[..2], &[0xAA, 0xBB]);
    assert_eq!(*order.lock().unwrap(), ["left", "right"]);
}

#[test]
/// Send on an empty registry is an argument error, not a lookup miss.
fn test_send_empty_registry() {
    let tx = manager();
    assert_eq!(
        block_on(tx.send(0x100, TIMEOUT)),
        Err(ManagerError::InvalidArgument)
    );
}

#[test]
/// A failing fill cancels the send and leaves the template as it was.
fn test_send_fill_failure_not_sent() {
    let broken = |frame: &mut CanFrame| -> Result<(), ManagerError> {
        frame.data[0] = 0xEE;
        Err(ManagerError::Fault)
    };
    let tx = manager();
    block_on(async {
        tx.register(0x100, 0x01, 8, FrameFlags::NONE, 0, &broken)
            .await
            .unwrap();
        assert_eq!(tx.send(0x100, TIMEOUT).await, Err(ManagerError::Fault));
        let entry = tx.frame_entry(0x100).await.unwrap();
        assert_eq!(entry.frame.data[0], 0);
        assert_eq!(tx.stats().await.fill_failed, 1);
    });
    assert_eq!(tx.controller().sent_count(), 0);
}

#[test]
/// A controller that never frees a mailbox surfaces as a timeout.
fn test_send_timeout() {
    let tx = manager();
    tx.controller().set_busy(true);
    block_on(async {
        tx.register(0x100, 0x01, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();
        assert_eq!(tx.send(0x100, TIMEOUT).await, Err(ManagerError::Timeout));
    });
}

//==================================================================================PERIODIC
#[test]
/// 100 Hz on a 1 ms tick fires every tenth tick; event frames stay silent.
fn test_periodic_cadence() {
    let tx = manager();
    block_on(async {
        tx.register(0x100, 0x01, 8, FrameFlags::NONE, 100, &ok_fill)
            .await
            .unwrap();
        tx.register(0x200, 0x02, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();

        for tick in 1..=1000u32 {
            tx.tick().await;
            if tick == 9 {
                assert_eq!(tx.controller().sent_count(), 0);
            }
            if tick == 10 {
                assert_eq!(tx.controller().sent_count(), 1);
            }
        }
        assert_eq!(tx.stats().await.periodic_sent, 100);
    });
    assert!(tx.controller().sent().iter().all(|frame| frame.id == 0x100));
}

#[test]
/// A failing fill only skips its own frame for that cycle.
fn test_periodic_fill_failure_isolated() {
    let broken = |_: &mut CanFrame| -> Result<(), ManagerError> { Err(ManagerError::Fault) };
    let tx = manager();
    block_on(async {
        tx.register(0x100, 0x01, 8, FrameFlags::NONE, 1000, &broken)
            .await
            .unwrap();
        tx.register(0x200, 0x02, 8, FrameFlags::NONE, 1000, &ok_fill)
            .await
            .unwrap();
        tx.tick().await;
        tx.tick().await;

        let stats = tx.stats().await;
        assert_eq!(stats.fill_failed, 2);
        assert_eq!(stats.periodic_sent, 2);
    });
    assert!(tx.controller().sent().iter().all(|frame| frame.id == 0x200));
}

#[test]
/// A busy controller costs the cycle; nothing is retried on the next tick.
fn test_periodic_busy_not_retried() {
    let tx = manager();
    block_on(async {
        tx.register(0x100, 0x01, 8, FrameFlags::NONE, 500, &ok_fill)
            .await
            .unwrap();
        tx.controller().set_busy(true);
        tx.tick().await;
        tx.tick().await;
        tx.controller().set_busy(false);
        tx.tick().await;
        assert_eq!(tx.controller().sent_count(), 0);
        tx.tick().await;
        assert_eq!(tx.controller().sent_count(), 1);

        let stats = tx.stats().await;
        assert_eq!(stats.periodic_failed, 1);
        assert_eq!(stats.periodic_sent, 1);
    });
}

//==================================================================================SCHEDULER
/// Yields `remaining` ticks immediately, then raises `stop` and stalls.
struct CountedTicks<'s> {
    remaining: u32,
    stop: &'s TickSignal,
}

impl TickSource for CountedTicks<'_> {
    fn next_tick<'a>(&'a mut self) -> impl Future<Output = ()> + 'a {
        async move {
            if self.remaining == 0 {
                self.stop.signal(());
                core::future::pending::<()>().await;
            }
            self.remaining -= 1;
        }
    }
}

#[test]
/// The scheduler ticks every manager once per cycle until stopped.
fn test_scheduler_ticks_all_managers() {
    let a = manager();
    let b = manager();
    let stop = TickSignal::new();
    block_on(async {
        a.register(0x100, 0x01, 8, FrameFlags::NONE, 100, &ok_fill)
            .await
            .unwrap();
        b.register(0x200, 0x02, 8, FrameFlags::NONE, 50, &ok_fill)
            .await
            .unwrap();

        let managers = [&a, &b];
        let scheduler = TxScheduler::new(&managers);
        let mut ticks = CountedTicks {
            remaining: 100,
            stop: &stop,
        };
        assert_eq!(scheduler.run_until(&mut ticks, &stop).await, 100);
    });
    assert_eq!(a.controller().sent_count(), 10);
    assert_eq!(b.controller().sent_count(), 5);
}

#[test]
/// Managers with different controllers and capacities share one scheduler.
fn test_scheduler_mixed_manager_group() {
    let bus = MockController::new();
    let small: TxManager<'_, MockController, 1, 1> =
        TxManager::new(MockController::new(), TxConfig::default());
    let borrowed: TxManager<'_, &MockController, 2, 8> = TxManager::new(&bus, TxConfig::default());
    let stop = TickSignal::new();
    block_on(async {
        small
            .register(0x100, 0x01, 8, FrameFlags::NONE, 100, &ok_fill)
            .await
            .unwrap();
        borrowed
            .register(0x200, 0x02, 8, FrameFlags::NONE, 250, &ok_fill)
            .await
            .unwrap();
        borrowed
            .register(0x201, 0x03, 8, FrameFlags::NONE, 0, &ok_fill)
            .await
            .unwrap();

        let group = (&small, &borrowed);
        let scheduler = TxScheduler::new(&group);
        let mut ticks = CountedTicks {
            remaining: 20,
            stop: &stop,
        };
        assert_eq!(scheduler.run_until(&mut ticks, &stop).await, 20);
    });
    assert_eq!(small.controller().sent_count(), 2);
    assert_eq!(bus.sent_count(), 5);
    assert!(bus.sent().iter().all(|frame| frame.id == 0x200));
}

#[test]
/// Nested groups tick every member once per cycle.
fn test_nested_group_ticks_every_member() {
    let a = manager();
    let b = manager();
    let c: TxManager<'_, MockController, 2, 2> =
        TxManager::new(MockController::new(), TxConfig::default());
    block_on(async {
        for (index, m) in [&a, &b].into_iter().enumerate() {
            m.register(0x300 + index as u32, 0x10, 1, FrameFlags::NONE, 1000, &ok_fill)
                .await
                .unwrap();
        }
        c.register(0x400, 0x11, 1, FrameFlags::NONE, 1000, &ok_fill)
            .await
            .unwrap();

        let group = ([&a, &b], &c);
        let scheduler = TxScheduler::new(&group);
        for _ in 0..3 {
            scheduler.tick_all().await;
        }
    });
    assert_eq!(a.controller().sent_count(), 3);
    assert_eq!(b.controller().sent_count(), 3);
    assert_eq!(c.controller().sent_count(), 3);
}

#[test]
/// A hardware `Ticker` can pace the scheduler directly.
fn test_ticker_is_a_tick_source() {
    fn accepts<T: TickSource>() {}
    accepts::<embassy_time::Ticker>();
    accepts::<crate::traits::tick_source::SignalTicks<'static>>();
}
