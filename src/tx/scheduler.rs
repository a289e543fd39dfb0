//! Periodic TX scheduler: one task ticking every TX manager of the system.
//!
//! Managers of different controller types and capacities are grouped through
//! [`PeriodicTick`], implemented for [`TxManager`], references, arrays, slices
//! and tuples of up to four members.
use core::future::Future;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::traits::controller::CanController;
use crate::traits::tick_source::TickSource;
use crate::tx::manager::TxManager;

//==================================================================================PERIODIC_TICK
/// Something advanced by one scheduler cycle.
pub trait PeriodicTick {
    /// Run one periodic cycle.
    fn tick<'a>(&'a self) -> impl Future<Output = ()> + 'a;
}

impl<C: CanController, const SENDERS: usize, const FRAMES: usize> PeriodicTick
    for TxManager<'_, C, SENDERS, FRAMES>
{
    fn tick<'a>(&'a self) -> impl Future<Output = ()> + 'a {
        TxManager::tick(self)
    }
}

impl<T: PeriodicTick + ?Sized> PeriodicTick for &T {
    fn tick<'a>(&'a self) -> impl Future<Output = ()> + 'a {
        (**self).tick()
    }
}

/// Members tick in slice order.
impl<T: PeriodicTick> PeriodicTick for [T] {
    fn tick<'a>(&'a self) -> impl Future<Output = ()> + 'a {
        async move {
            for member in self {
                member.tick().await;
            }
        }
    }
}

impl<T: PeriodicTick, const N: usize> PeriodicTick for [T; N] {
    fn tick<'a>(&'a self) -> impl Future<Output = ()> + 'a {
        <[T] as PeriodicTick>::tick(self.as_slice())
    }
}

/// Members tick in field order.
macro_rules! tuple_group {
    ($($member:ident $index:tt),+) => {
        impl<$($member: PeriodicTick),+> PeriodicTick for ($($member,)+) {
            fn tick<'a>(&'a self) -> impl Future<Output = ()> + 'a {
                async move {
                    $(self.$index.tick().await;)+
                }
            }
        }
    };
}

tuple_group!(A 0, B 1);
tuple_group!(A 0, B 1, M 2);
tuple_group!(A 0, B 1, M 2, D 3);

//==================================================================================SCHEDULER
/// Drives [`PeriodicTick::tick`] on a group of managers from a [`TickSource`].
///
/// The tick source period must match the `tick_ms` of every manager.
pub struct TxScheduler<'m, G: PeriodicTick + ?Sized> {
    group: &'m G,
}

impl<'m, G: PeriodicTick + ?Sized> TxScheduler<'m, G> {
    pub const fn new(group: &'m G) -> Self {
        Self { group }
    }

    /// One scheduler cycle over every manager of the group.
    pub async fn tick_all(&self) {
        self.group.tick().await;
    }

    /// Scheduler task body; never returns.
    pub async fn run<T: TickSource>(&self, ticks: &mut T) -> ! {
        loop {
            ticks.next_tick().await;
            self.tick_all().await;
        }
    }

    /// Like [`run`](Self::run) but returns once `stop` is signalled, with the
    /// number of cycles performed.
    pub async fn run_until<T: TickSource>(
        &self,
        ticks: &mut T,
        stop: &Signal<CriticalSectionRawMutex, ()>,
    ) -> u32 {
        let mut cycles = 0;
        loop {
            let tick = ticks.next_tick();
            let stopped = stop.wait();
            pin_mut!(tick);
            pin_mut!(stopped);
            match select(tick, stopped).await {
                Either::Left(_) => {
                    self.tick_all().await;
                    cycles += 1;
                }
                Either::Right(_) => {
                    #[cfg(feature = "defmt")]
                    defmt::info!("can_tx_manager: scheduler stopped after {} cycles", cycles);
                    return cycles;
                }
            }
        }
    }
}
