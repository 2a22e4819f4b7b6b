//! Wall-clock time as seen by one game session.

use chrono::{DateTime, Duration, LocalResult, Offset, TimeZone, Timelike, Utc};
use std::cell::Cell;
use std::rc::Rc;

/// Shared, cloneable reading of the current time.
///
/// Every component of a session holds a handle to the same clock. Only the
/// [`Scheduler`](crate::scheduler::Scheduler) moves it, and never backwards.
#[derive(Clone, Debug)]
pub struct GameClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl GameClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    /// Clock starting at the host's current time.
    pub fn system() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        if now > self.now.get() {
            self.now.set(now);
        }
    }
}

/// The "no boost" sentinel and default for every persisted timestamp.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Adds `seconds` to the seconds field of `now` as read on a wall clock in
/// `tz`, dropping sub-second precision, and converts the result back.
///
/// Across a daylight-saving transition this differs from adding a fixed
/// duration: an ambiguous wall time resolves to its earlier instant and a
/// skipped one keeps the offset that was in force before the jump.
pub fn add_calendar_seconds<Tz: TimeZone>(
    now: DateTime<Utc>,
    tz: &Tz,
    seconds: u32,
) -> DateTime<Utc> {
    let local = now.with_timezone(tz);
    let wall = local.naive_local();
    let wall = wall.with_nanosecond(0).unwrap_or(wall);
    let target = wall + Duration::seconds(i64::from(seconds));
    match tz.from_local_datetime(&target) {
        LocalResult::Single(at) => at.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let offset = i64::from(local.offset().fix().local_minus_utc());
            Utc.from_utc_datetime(&(target - Duration::seconds(offset)))
        }
    }
}
