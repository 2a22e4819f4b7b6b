//! Cooperative interval timers driven by an explicit clock.
//!
//! Nothing fires on its own: a driver calls [`Scheduler::advance_to`] (with
//! the host time in a live session, with virtual time in tests) and every
//! timer that fell due in between runs to completion, one at a time.

use crate::clock::GameClock;
use chrono::{DateTime, Duration, Utc};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use tracing::warn;

type Callback = Rc<RefCell<dyn FnMut()>>;

struct Timer {
    label: &'static str,
    period: Duration,
    next_due: DateTime<Utc>,
    callback: Callback,
}

#[derive(Default)]
struct TimerTable {
    timers: BTreeMap<u64, Timer>,
    next_id: u64,
}

struct SchedulerInner {
    clock: GameClock,
    table: RefCell<TimerTable>,
    advancing: Cell<bool>,
}

/// Owner of all timers in a session. Cloning yields another handle.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(clock: GameClock) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                clock,
                table: RefCell::new(TimerTable::default()),
                advancing: Cell::new(false),
            }),
        }
    }

    pub fn clock(&self) -> GameClock {
        self.inner.clock.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Arms a repeating timer whose first firing is one `period_ms` from now.
    /// A zero period is treated as one millisecond.
    pub fn set_interval(
        &self,
        label: &'static str,
        period_ms: u64,
        callback: impl FnMut() + 'static,
    ) -> TimerHandle {
        let period = Duration::milliseconds(i64::try_from(period_ms.max(1)).unwrap_or(i64::MAX));
        let next_due = later(self.now(), period);
        let mut table = self.inner.table.borrow_mut();
        let id = table.next_id;
        table.next_id += 1;
        table.timers.insert(
            id,
            Timer {
                label,
                period,
                next_due,
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        TimerHandle {
            id,
            scheduler: Rc::downgrade(&self.inner),
        }
    }

    pub fn active_timers(&self) -> usize {
        self.inner.table.borrow().timers.len()
    }

    pub fn advance_by(&self, ms: u64) -> usize {
        let step = Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX));
        self.advance_to(later(self.now(), step))
    }

    /// Moves time forward to `target`, firing every timer due on the way in
    /// (due time, arming order) order. Returns the number of firings.
    pub fn advance_to(&self, target: DateTime<Utc>) -> usize {
        if self.inner.advancing.replace(true) {
            warn!("scheduler advanced from inside a timer callback; ignoring");
            return 0;
        }
        let mut fired = 0;
        loop {
            let (due, retired) = {
                let mut table = self.inner.table.borrow_mut();
                let next = table
                    .timers
                    .iter()
                    .filter(|(_, timer)| timer.next_due <= target)
                    .min_by_key(|(id, timer)| (timer.next_due, **id))
                    .map(|(id, _)| *id);
                let Some(id) = next else {
                    break;
                };
                let Some(timer) = table.timers.get_mut(&id) else {
                    break;
                };
                let at = timer.next_due;
                let following = later(at, timer.period);
                let due = (at, timer.label, Rc::clone(&timer.callback));
                // A timer that cannot move past the end of time fires once more and is removed.
                let exhausted = following <= at;
                if !exhausted {
                    timer.next_due = following;
                }
                let retired = if exhausted {
                    warn!(timer = due.1, "timer reached the latest representable time; retired");
                    table.timers.remove(&id)
                } else {
                    None
                };
                (due, retired)
            };
            drop(retired);
            let (at, label, callback) = due;
            self.inner.clock.set(at);
            match callback.try_borrow_mut() {
                Ok(mut run) => (&mut *run)(),
                Err(_) => warn!(timer = label, "timer callback still running; skipped"),
            }
            fired += 1;
        }
        self.inner.clock.set(target);
        self.inner.advancing.set(false);
        fired
    }
}

fn later(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Keeps a timer armed. Dropping the handle cancels the timer.
pub struct TimerHandle {
    id: u64,
    scheduler: Weak<SchedulerInner>,
}

impl TimerHandle {
    pub fn cancel(self) {}

    pub fn is_active(&self) -> bool {
        self.scheduler
            .upgrade()
            .map(|inner| inner.table.borrow().timers.contains_key(&self.id))
            .unwrap_or(false)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.scheduler.upgrade() {
            // Release the table before the callback (and whatever it owns) drops.
            let removed = inner.table.borrow_mut().timers.remove(&self.id);
            drop(removed);
        }
    }
}
