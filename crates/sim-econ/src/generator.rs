use crate::{boost_cost, upgrade_cost};
use chrono::{DateTime, Local, Utc};
use rust_decimal::Decimal;
use sim_core::snapshot::{format_timestamp, parse_timestamp};
use sim_core::{
    add_calendar_seconds, epoch, Bank, Computed, GameClock, MoneyGeneratorSnapshot, Observable,
    Scheduler, TimerHandle,
};
use tracing::{debug, info};

/// Period of the default time watch: once per second.
pub const TIME_WATCH_INTERVAL_MS: u64 = 1000;

/// Generates money out of thin air, one click at a time.
///
/// Yield, upgrade cost and remaining boost time are cached derived values.
/// The boost depends on wall-clock time, which no cell can observe, so
/// [`MoneyGenerator::watch_current_time`] periodically touches the boost
/// expiry to have them re-evaluated. Reading the yield or the remaining time
/// after the expiry instant also ends the boost on the spot.
pub struct MoneyGenerator {
    base_cash_per_click: Observable<u64>,
    boost_expires: Observable<DateTime<Utc>>,
    boosted_seconds_remaining: Computed<u64>,
    upgrade_cost: Computed<Decimal>,
    cash_per_click: Computed<u64>,
    clock: GameClock,
    time_watch: Option<TimerHandle>,
}

impl MoneyGenerator {
    pub fn new(clock: GameClock) -> Self {
        Self::from_parts(1, epoch(), clock)
    }

    fn from_parts(base: u64, boost_expires: DateTime<Utc>, clock: GameClock) -> Self {
        let base_cash_per_click = Observable::new(base);
        let boost_expires = Observable::new(boost_expires);

        let boosted_seconds_remaining = {
            let (expires, clock) = (boost_expires.clone(), clock.clone());
            Computed::new(vec![boost_expires.dependency()], move || {
                let millis = (expires.get() - clock.now()).num_milliseconds();
                if millis <= 0 {
                    return 0;
                }
                u64::try_from(millis).map_or(0, |ms| ms.div_ceil(1000))
            })
        };

        let upgrade_cost = {
            let base = base_cash_per_click.clone();
            Computed::new(vec![base_cash_per_click.dependency()], move || {
                upgrade_cost(base.get())
            })
        };

        let cash_per_click = {
            let (base, expires, clock) = (
                base_cash_per_click.clone(),
                boost_expires.clone(),
                clock.clone(),
            );
            Computed::new(
                vec![base_cash_per_click.dependency(), boost_expires.dependency()],
                move || {
                    if expires.get() > clock.now() {
                        base.get().saturating_mul(2)
                    } else {
                        base.get()
                    }
                },
            )
        };

        Self {
            base_cash_per_click,
            boost_expires,
            boosted_seconds_remaining,
            upgrade_cost,
            cash_per_click,
            clock,
            time_watch: None,
        }
    }

    /// Restores a generator, falling back per field to the values of a fresh one.
    pub fn restore(snapshot: Option<MoneyGeneratorSnapshot>, clock: GameClock) -> Self {
        let snapshot = snapshot.unwrap_or_default();
        let base = snapshot.base_cash_per_click.unwrap_or(1);
        let boost_expires = snapshot
            .boost_expires
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(epoch);
        Self::from_parts(base, boost_expires, clock)
    }

    pub fn to_snapshot(&self) -> MoneyGeneratorSnapshot {
        MoneyGeneratorSnapshot {
            base_cash_per_click: Some(self.base_cash_per_click()),
            boost_expires: Some(format_timestamp(self.boost_expires())),
        }
    }

    pub fn base_cash_per_click(&self) -> u64 {
        self.base_cash_per_click.get()
    }

    pub fn boost_expires(&self) -> DateTime<Utc> {
        self.boost_expires.get()
    }

    /// Whole seconds until the boost runs out, rounded up; zero when not boosted.
    pub fn boosted_seconds_remaining(&self) -> u64 {
        self.expire_lapsed_boost();
        self.boosted_seconds_remaining.get()
    }

    pub fn upgrade_cost(&self) -> Decimal {
        self.upgrade_cost.get()
    }

    /// Money per click: double the base while a boost is active.
    pub fn cash_per_click(&self) -> u64 {
        self.expire_lapsed_boost();
        self.cash_per_click.get()
    }

    /// A boost ends at its expiry instant, not at the next time-watch tick.
    fn expire_lapsed_boost(&self) {
        let lapsed = self.clock.now() >= self.boost_expires();
        if lapsed && self.boosted_seconds_remaining.get() > 0 {
            self.boost_expires.touch();
        }
    }

    pub fn is_boosted(&self) -> bool {
        self.boosted_seconds_remaining() > 0
    }

    pub fn boost_cost(&self, seconds: u32) -> Decimal {
        boost_cost(seconds, self.base_cash_per_click())
    }

    /// Doubles the click yield for `seconds`, paid from `bank`. Returns
    /// `false` and changes nothing when the bank cannot cover the cost.
    ///
    /// The new expiry replaces any running boost. It is computed on the local
    /// wall clock (see [`add_calendar_seconds`]), so it always lands on a
    /// whole second.
    pub fn boost_generator(&self, seconds: u32, bank: &Bank) -> bool {
        let cost = self.boost_cost(seconds);
        if !bank.try_withdraw(cost) {
            return false;
        }
        let expires = add_calendar_seconds(self.clock.now(), &Local, seconds);
        self.boost_expires.set(expires);
        info!(seconds, %cost, %expires, "generator boosted");
        true
    }

    /// Adds one to the base yield, paid from `bank`.
    pub fn upgrade_generator(&self, bank: &Bank) -> bool {
        let cost = self.upgrade_cost();
        if !bank.try_withdraw(cost) {
            return false;
        }
        self.base_cash_per_click.update(|base| *base = base.saturating_add(1));
        info!(base = self.base_cash_per_click(), %cost, "generator upgraded");
        true
    }

    /// Deposits one click's worth of money. Never fails.
    pub fn generate_cash(&self, bank: &Bank) {
        bank.deposit(Decimal::from(self.cash_per_click()));
    }

    /// Starts refreshing the time-dependent values every `period_ms`,
    /// replacing any previous watch.
    pub fn watch_current_time(&mut self, scheduler: &Scheduler, period_ms: u64) {
        let expires = self.boost_expires.clone();
        self.time_watch = None;
        self.time_watch = Some(scheduler.set_interval("time-watch", period_ms, move || {
            expires.touch();
        }));
        debug!(period_ms, "watching current time");
    }

    pub fn stop_watching(&mut self) {
        self.time_watch = None;
    }

    pub fn is_watching_time(&self) -> bool {
        self.time_watch.as_ref().is_some_and(TimerHandle::is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scheduler_at(rfc3339: &str) -> Scheduler {
        let start = DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc);
        Scheduler::new(GameClock::starting_at(start))
    }

    fn mid_second() -> Scheduler {
        scheduler_at("2024-01-15T12:00:00.400Z")
    }

    #[test]
    fn fresh_generator_defaults() {
        let g = MoneyGenerator::new(mid_second().clock());
        assert_eq!(g.base_cash_per_click(), 1);
        assert_eq!(g.boost_expires(), epoch());
        assert_eq!(g.cash_per_click(), 1);
        assert_eq!(g.upgrade_cost(), Decimal::from(20));
        assert_eq!(g.boosted_seconds_remaining(), 0);
    }

    #[test]
    fn upgrade_without_funds_changes_nothing() {
        let g = MoneyGenerator::new(mid_second().clock());
        let bank = Bank::new(Decimal::new(1999, 2));
        assert!(!g.upgrade_generator(&bank));
        assert_eq!(g.base_cash_per_click(), 1);
        assert_eq!(bank.balance(), Decimal::new(1999, 2));
    }

    #[test]
    fn upgrade_debits_exact_cost_and_increments() {
        let g = MoneyGenerator::new(mid_second().clock());
        let bank = Bank::new(Decimal::from(100));
        assert!(g.upgrade_generator(&bank));
        assert_eq!(bank.balance(), Decimal::from(80));
        assert_eq!(g.base_cash_per_click(), 2);
        assert_eq!(g.upgrade_cost(), Decimal::from(80));
        assert!(g.upgrade_generator(&bank));
        assert_eq!(bank.balance(), Decimal::ZERO);
        assert_eq!(g.cash_per_click(), 3);
    }

    #[test]
    fn generate_cash_deposits_yield() {
        let g = MoneyGenerator::restore(
            Some(MoneyGeneratorSnapshot {
                base_cash_per_click: Some(7),
                boost_expires: None,
            }),
            mid_second().clock(),
        );
        let bank = Bank::default();
        g.generate_cash(&bank);
        g.generate_cash(&bank);
        assert_eq!(bank.balance(), Decimal::from(14));
    }

    #[test]
    fn failed_boost_leaves_state() {
        let g = MoneyGenerator::new(mid_second().clock());
        let bank = Bank::new(Decimal::from(5));
        assert!(!g.boost_generator(10, &bank));
        assert_eq!(g.boost_expires(), epoch());
        assert_eq!(bank.balance(), Decimal::from(5));
    }

    #[test]
    fn boost_doubles_yield_until_expiry() {
        let scheduler = mid_second();
        let mut g = MoneyGenerator::new(scheduler.clock());
        g.watch_current_time(&scheduler, TIME_WATCH_INTERVAL_MS);
        let bank = Bank::new(Decimal::from(10));

        assert!(g.boost_generator(10, &bank));
        assert_eq!(bank.balance(), Decimal::ZERO);
        assert_eq!(g.boosted_seconds_remaining(), 10);
        assert_eq!(g.cash_per_click(), 2);

        // The expiry lands on a whole second, 9.6 s from now.
        scheduler.advance_by(9_000);
        assert_eq!(g.boosted_seconds_remaining(), 1);
        assert_eq!(g.cash_per_click(), 2);
        scheduler.advance_by(600);
        assert_eq!(scheduler.now(), g.boost_expires());
        scheduler.advance_by(400);
        assert_eq!(g.boosted_seconds_remaining(), 0);
        assert_eq!(g.cash_per_click(), 1);
    }

    #[test]
    fn boost_ends_between_time_watch_ticks() {
        let scheduler = mid_second();
        let mut g = MoneyGenerator::new(scheduler.clock());
        g.watch_current_time(&scheduler, TIME_WATCH_INTERVAL_MS);
        let bank = Bank::new(Decimal::from(10));
        assert!(g.boost_generator(10, &bank));

        // Last tick before expiry at 09.400; read at 09.500 while still boosted.
        scheduler.advance_by(9_100);
        assert_eq!(g.cash_per_click(), 2);

        // 10.100: expired, the next tick is not due until 10.400.
        scheduler.advance_by(600);
        assert!(scheduler.now() > g.boost_expires());
        assert_eq!(g.cash_per_click(), 1);
        assert_eq!(g.boosted_seconds_remaining(), 0);
        g.generate_cash(&bank);
        assert_eq!(bank.balance(), Decimal::ONE);
    }

    #[test]
    fn boost_ends_without_a_time_watch() {
        let scheduler = mid_second();
        let g = MoneyGenerator::new(scheduler.clock());
        let bank = Bank::new(Decimal::from(10));
        assert!(g.boost_generator(10, &bank));
        assert_eq!(g.cash_per_click(), 2);
        scheduler.advance_by(9_599);
        assert_eq!(g.cash_per_click(), 2);
        scheduler.advance_by(1);
        assert_eq!(g.cash_per_click(), 1);
        assert!(!g.is_boosted());
    }

    #[test]
    fn time_watch_refreshes_remaining_seconds() {
        let scheduler = mid_second();
        let mut g = MoneyGenerator::new(scheduler.clock());
        let bank = Bank::new(Decimal::from(100));
        assert!(g.boost_generator(30, &bank));
        assert_eq!(g.boosted_seconds_remaining(), 30);

        // Without a watch nothing observable changes, so the cached value is stale.
        scheduler.advance_by(5_000);
        assert_eq!(g.boosted_seconds_remaining(), 30);

        g.watch_current_time(&scheduler, TIME_WATCH_INTERVAL_MS);
        assert!(g.is_watching_time());
        scheduler.advance_by(1_000);
        assert_eq!(g.boosted_seconds_remaining(), 24);

        g.stop_watching();
        assert!(!g.is_watching_time());
        assert_eq!(scheduler.active_timers(), 0);
    }

    #[test]
    fn watching_twice_keeps_one_timer() {
        let scheduler = mid_second();
        let mut g = MoneyGenerator::new(scheduler.clock());
        g.watch_current_time(&scheduler, 1000);
        g.watch_current_time(&scheduler, 500);
        assert_eq!(scheduler.active_timers(), 1);
        drop(g);
        assert_eq!(scheduler.active_timers(), 0);
    }

    #[test]
    fn restore_none_matches_new() {
        let clock = mid_second().clock();
        assert_eq!(
            MoneyGenerator::restore(None, clock.clone()).to_snapshot(),
            MoneyGenerator::new(clock).to_snapshot()
        );
    }

    #[test]
    fn snapshot_round_trips() {
        let scheduler = mid_second();
        let clock = scheduler.clock();
        let bank = Bank::new(Decimal::from(1_000));

        let fresh = MoneyGenerator::new(clock.clone());
        let upgraded = MoneyGenerator::new(clock.clone());
        assert!(upgraded.upgrade_generator(&bank));
        let boosted = MoneyGenerator::new(clock.clone());
        assert!(boosted.boost_generator(45, &bank));

        for g in [&fresh, &upgraded, &boosted] {
            let json = serde_json::to_string(&g.to_snapshot()).unwrap();
            let back = MoneyGenerator::restore(serde_json::from_str(&json).unwrap(), clock.clone());
            assert_eq!(back.to_snapshot(), g.to_snapshot());
            assert_eq!(back.cash_per_click(), g.cash_per_click());
            assert_eq!(back.boosted_seconds_remaining(), g.boosted_seconds_remaining());
        }
    }

    #[test]
    fn snapshot_uses_camel_case_keys() {
        let g = MoneyGenerator::new(mid_second().clock());
        let json = serde_json::to_value(g.to_snapshot()).unwrap();
        assert_eq!(json["baseCashPerClick"], 1);
        assert_eq!(json["boostExpires"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn malformed_expiry_falls_back_to_epoch() {
        let snap = MoneyGeneratorSnapshot {
            base_cash_per_click: Some(3),
            boost_expires: Some("not a date".into()),
        };
        let g = MoneyGenerator::restore(Some(snap), mid_second().clock());
        assert_eq!(g.base_cash_per_click(), 3);
        assert_eq!(g.boost_expires(), epoch());
    }

    #[test]
    fn restored_boost_is_live() {
        let scheduler = mid_second();
        let expires = scheduler.now() + Duration::milliseconds(2_600);
        let snap = MoneyGeneratorSnapshot {
            base_cash_per_click: Some(4),
            boost_expires: Some(format_timestamp(expires)),
        };
        let g = MoneyGenerator::restore(Some(snap), scheduler.clock());
        assert_eq!(g.cash_per_click(), 8);
        assert_eq!(g.boosted_seconds_remaining(), 3);
    }
}
