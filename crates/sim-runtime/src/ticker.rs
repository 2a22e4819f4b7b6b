use crate::GameSettings;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_core::{
    tracked, Company, Computed, Observable, Scheduler, StockExchange, Subscription, TickerSnapshot,
    TimerHandle, Tracked,
};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

pub const DEFAULT_TICKER_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_MAX_PREVIEWED_COMPANIES: usize = 5;

/// Timer state shared between the ticker and its interval callback.
struct TickerSchedule {
    companies: Observable<Vec<Company>>,
    rng: RefCell<ChaCha8Rng>,
    max_swing: f64,
    fired: Cell<u64>,
    scheduler: RefCell<Option<Scheduler>>,
    handle: RefCell<Option<TimerHandle>>,
}

impl TickerSchedule {
    /// Replaces any armed timer with one firing every `period_ms`.
    fn arm(self: &Rc<Self>, scheduler: &Scheduler, period_ms: u64) {
        let previous = self.handle.borrow_mut().take();
        drop(previous);
        let schedule: Weak<Self> = Rc::downgrade(self);
        let clock = scheduler.clock();
        let handle = scheduler.set_interval("ticker", period_ms, move || {
            if let Some(schedule) = schedule.upgrade() {
                schedule.tick(clock.now());
            }
        });
        *self.handle.borrow_mut() = Some(handle);
    }

    fn disarm(&self) {
        let previous = self.handle.borrow_mut().take();
        drop(previous);
        self.scheduler.borrow_mut().take();
    }

    fn is_armed(&self) -> bool {
        self.handle.borrow().as_ref().is_some_and(TimerHandle::is_active)
    }

    fn reschedule(self: &Rc<Self>, period_ms: u64) {
        let scheduler = self.scheduler.borrow().clone();
        match scheduler {
            Some(scheduler) if self.handle.borrow().is_some() => {
                self.arm(&scheduler, period_ms);
                info!(period_ms, "ticker rescheduled");
            }
            _ => {}
        }
    }

    /// Moves every listed company once, in listing order. A company that
    /// fails to move is logged and skipped.
    fn tick(&self, now: DateTime<Utc>) {
        let companies = self.companies.get();
        let mut rng = self.rng.borrow_mut();
        let mut failed = 0usize;
        for company in &companies {
            if let Err(err) = company.make_random_change(&mut *rng, self.max_swing, now) {
                failed += 1;
                warn!(company = company.name(), %err, "company mutation failed");
            }
        }
        let tick = self.fired.get() + 1;
        self.fired.set(tick);
        debug!(tick, companies = companies.len(), failed, "ticker fired");
    }
}

/// Periodically moves every company on its exchange and keeps a preview of
/// the most recently changed ones.
///
/// The ticker owns the exchange. Timers only run after
/// [`start_ticking`](Ticker::start_ticking) and are cancelled when the ticker
/// stops or is dropped.
pub struct Ticker {
    ticker_interval: Observable<u64>,
    max_previewed_companies: Observable<usize>,
    stock_exchange: StockExchange,
    companies_preview: Computed<Vec<Company>>,
    schedule: Rc<TickerSchedule>,
    _interval_watch: Subscription,
}

impl Ticker {
    pub fn new(stock_exchange: StockExchange, settings: &GameSettings) -> Self {
        Self::from_parts(
            stock_exchange,
            DEFAULT_TICKER_INTERVAL_MS,
            DEFAULT_MAX_PREVIEWED_COMPANIES,
            settings,
        )
    }

    fn from_parts(
        stock_exchange: StockExchange,
        ticker_interval: u64,
        max_previewed_companies: usize,
        settings: &GameSettings,
    ) -> Self {
        let ticker_interval = Observable::new(ticker_interval);
        let max_previewed_companies = Observable::new(max_previewed_companies);
        let companies = stock_exchange.companies_cell().clone();

        let companies_preview = {
            let (companies, max) = (companies.clone(), max_previewed_companies.clone());
            let listing = companies.clone();
            let any_company_moved = tracked(move || {
                listing.with(|cs| {
                    cs.iter()
                        .map(Company::preview_stamp)
                        .fold(listing.stamp(), u64::max)
                })
            });
            Computed::new(
                vec![max_previewed_companies.dependency(), any_company_moved],
                move || preview(&companies.get(), max.get()),
            )
        };

        let schedule = Rc::new(TickerSchedule {
            companies,
            rng: RefCell::new(ChaCha8Rng::seed_from_u64(settings.rng_seed)),
            max_swing: settings.max_swing,
            fired: Cell::new(0),
            scheduler: RefCell::new(None),
            handle: RefCell::new(None),
        });

        let interval_watch = {
            let schedule = Rc::downgrade(&schedule);
            ticker_interval.subscribe(move |period_ms| {
                if let Some(schedule) = schedule.upgrade() {
                    schedule.reschedule(*period_ms);
                }
            })
        };

        Self {
            ticker_interval,
            max_previewed_companies,
            stock_exchange,
            companies_preview,
            schedule,
            _interval_watch: interval_watch,
        }
    }

    /// Restores a ticker. Missing or unusable fields fall back to defaults
    /// one by one; an absent snapshot gives a fresh ticker over an empty exchange.
    pub fn restore(snapshot: Option<TickerSnapshot>, settings: &GameSettings) -> Self {
        let snapshot = snapshot.unwrap_or_default();
        let interval = match snapshot.ticker_interval {
            Some(0) => {
                warn!("saved ticker interval of 0 ms ignored");
                DEFAULT_TICKER_INTERVAL_MS
            }
            Some(ms) => ms,
            None => DEFAULT_TICKER_INTERVAL_MS,
        };
        let max_previewed = snapshot
            .max_previewed_companies
            .unwrap_or(DEFAULT_MAX_PREVIEWED_COMPANIES);
        Self::from_parts(
            StockExchange::restore(snapshot.stock_exchange),
            interval,
            max_previewed,
            settings,
        )
    }

    pub fn to_snapshot(&self) -> TickerSnapshot {
        TickerSnapshot {
            stock_exchange: Some(self.stock_exchange.to_snapshot()),
            max_previewed_companies: Some(self.max_previewed_companies()),
            ticker_interval: Some(self.ticker_interval()),
        }
    }

    /// Starts moving the market every [`ticker_interval`](Ticker::ticker_interval).
    /// Calling it again restarts the period from now with a single timer.
    pub fn start_ticking(&self, scheduler: &Scheduler) {
        *self.schedule.scheduler.borrow_mut() = Some(scheduler.clone());
        self.schedule.arm(scheduler, self.ticker_interval());
        info!(period_ms = self.ticker_interval(), "ticker started");
    }

    pub fn stop_ticking(&self) {
        if self.is_ticking() {
            info!(ticks = self.ticks_fired(), "ticker stopped");
        }
        self.schedule.disarm();
    }

    pub fn is_ticking(&self) -> bool {
        self.schedule.is_armed()
    }

    /// Number of firings since this ticker was built.
    pub fn ticks_fired(&self) -> u64 {
        self.schedule.fired.get()
    }

    pub fn ticker_interval(&self) -> u64 {
        self.ticker_interval.get()
    }

    /// Changes the cadence. A running timer is cancelled and re-armed at the
    /// new period before this returns. Zero is treated as one millisecond.
    pub fn set_ticker_interval(&self, period_ms: u64) {
        self.ticker_interval.set(period_ms.max(1));
    }

    pub fn max_previewed_companies(&self) -> usize {
        self.max_previewed_companies.get()
    }

    pub fn set_max_previewed_companies(&self, max: usize) {
        self.max_previewed_companies.set(max);
    }

    pub fn stock_exchange(&self) -> &StockExchange {
        &self.stock_exchange
    }

    /// Companies with a nonzero last change, most recently updated first.
    pub fn companies_preview(&self) -> Vec<Company> {
        self.companies_preview.get()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.schedule.disarm();
    }
}

fn preview(companies: &[Company], max: usize) -> Vec<Company> {
    let mut moved: Vec<Company> = companies
        .iter()
        .filter(|c| !c.stock_value_change().is_zero())
        .cloned()
        .collect();
    // Stable: equal timestamps keep listing order.
    moved.sort_by(|a, b| b.last_updated().cmp(&a.last_updated()));
    moved.truncate(max);
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use sim_core::snapshot::format_timestamp;
    use sim_core::{epoch, CompanySnapshot, GameClock, StockExchangeSnapshot};

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(GameClock::starting_at(start()))
    }

    fn listed(names: &[&str]) -> StockExchange {
        let exchange = StockExchange::new();
        for name in names {
            exchange
                .list(Company::new(*name, Decimal::from(100), epoch()).unwrap())
                .unwrap();
        }
        exchange
    }

    fn saved_company(name: &str, change: i64, seconds_after_start: i64) -> CompanySnapshot {
        CompanySnapshot {
            name: Some(name.to_string()),
            value: Some(Decimal::from(50)),
            stock_value_change: Some(Decimal::from(change)),
            last_updated: Some(format_timestamp(
                start() + Duration::seconds(seconds_after_start),
            )),
        }
    }

    fn names(companies: &[Company]) -> Vec<&str> {
        companies.iter().map(Company::name).collect()
    }

    #[test]
    fn fresh_ticker_defaults() {
        let ticker = Ticker::new(StockExchange::new(), &GameSettings::default());
        assert_eq!(ticker.ticker_interval(), 5000);
        assert_eq!(ticker.max_previewed_companies(), 5);
        assert!(ticker.companies_preview().is_empty());
        assert!(!ticker.is_ticking());
    }

    #[test]
    fn preview_filters_sorts_and_truncates() {
        // Ten companies, three unchanged; recency is the third argument.
        let saved = vec![
            saved_company("A", 1, 10),
            saved_company("B", 0, 90),
            saved_company("C", -2, 30),
            saved_company("D", 3, 70),
            saved_company("E", 0, 80),
            saved_company("F", 1, 50),
            saved_company("G", -1, 60),
            saved_company("H", 0, 100),
            saved_company("I", 2, 20),
            saved_company("J", 5, 40),
        ];
        let snapshot = TickerSnapshot {
            stock_exchange: Some(StockExchangeSnapshot {
                companies: Some(saved),
            }),
            max_previewed_companies: Some(5),
            ticker_interval: None,
        };
        let ticker = Ticker::restore(Some(snapshot), &GameSettings::default());
        let preview = ticker.companies_preview();
        assert_eq!(names(&preview), ["D", "G", "F", "J", "C"]);

        ticker.set_max_previewed_companies(2);
        assert_eq!(names(&ticker.companies_preview()), ["D", "G"]);
    }

    #[test]
    fn preview_ties_keep_listing_order() {
        let saved = ["X", "Y", "Z"].map(|n| saved_company(n, 1, 5)).to_vec();
        let ticker = Ticker::restore(
            Some(TickerSnapshot {
                stock_exchange: Some(StockExchangeSnapshot {
                    companies: Some(saved),
                }),
                ..TickerSnapshot::default()
            }),
            &GameSettings::default(),
        );
        assert_eq!(names(&ticker.companies_preview()), ["X", "Y", "Z"]);
    }

    #[test]
    fn preview_follows_market_and_listing_changes() {
        let scheduler = scheduler();
        let ticker = Ticker::new(listed(&["A", "B"]), &GameSettings::default());
        assert!(ticker.companies_preview().is_empty());

        ticker.start_ticking(&scheduler);
        scheduler.advance_by(5000);
        let preview = ticker.companies_preview();
        assert!(preview.iter().all(|c| c.last_updated() == scheduler.now()));
        assert!(preview.len() <= 2);

        for company in ticker.stock_exchange().companies() {
            ticker.stock_exchange().delist(company.name()).unwrap();
        }
        assert!(ticker.companies_preview().is_empty());
    }

    #[test]
    fn every_company_moves_once_per_firing() {
        let scheduler = scheduler();
        let ticker = Ticker::new(listed(&["A", "B", "C"]), &GameSettings::default());
        ticker.start_ticking(&scheduler);
        assert_eq!(scheduler.advance_by(4999), 0);
        assert_eq!(scheduler.advance_by(1), 1);
        assert_eq!(ticker.ticks_fired(), 1);
        for company in ticker.stock_exchange().companies() {
            assert_eq!(company.last_updated(), start() + Duration::milliseconds(5000));
        }
    }

    #[test]
    fn interval_change_reschedules_without_gaps_or_doubles() {
        let scheduler = scheduler();
        let ticker = Ticker::new(listed(&["A"]), &GameSettings::default());
        ticker.start_ticking(&scheduler);

        scheduler.advance_by(12_000);
        assert_eq!(ticker.ticks_fired(), 2);

        ticker.set_ticker_interval(2000);
        assert_eq!(scheduler.active_timers(), 1);
        scheduler.advance_by(6000);
        assert_eq!(ticker.ticks_fired(), 5);

        // Unchanged value: no reschedule, the phase is kept.
        ticker.set_ticker_interval(2000);
        scheduler.advance_by(2000);
        assert_eq!(ticker.ticks_fired(), 6);
    }

    #[test]
    fn interval_change_while_stopped_only_stores_value() {
        let scheduler = scheduler();
        let ticker = Ticker::new(listed(&["A"]), &GameSettings::default());
        ticker.set_ticker_interval(1000);
        assert_eq!(scheduler.active_timers(), 0);
        ticker.start_ticking(&scheduler);
        scheduler.advance_by(3000);
        assert_eq!(ticker.ticks_fired(), 3);
    }

    #[test]
    fn starting_twice_keeps_one_timer() {
        let scheduler = scheduler();
        let ticker = Ticker::new(listed(&["A"]), &GameSettings::default());
        ticker.start_ticking(&scheduler);
        ticker.start_ticking(&scheduler);
        assert_eq!(scheduler.active_timers(), 1);
        scheduler.advance_by(10_000);
        assert_eq!(ticker.ticks_fired(), 2);
    }

    #[test]
    fn stop_and_drop_cancel_the_timer() {
        let scheduler = scheduler();
        let ticker = Ticker::new(listed(&["A"]), &GameSettings::default());
        ticker.start_ticking(&scheduler);
        ticker.stop_ticking();
        assert!(!ticker.is_ticking());
        assert_eq!(scheduler.advance_by(20_000), 0);

        ticker.start_ticking(&scheduler);
        drop(ticker);
        assert_eq!(scheduler.active_timers(), 0);
    }

    #[test]
    fn same_seed_moves_market_identically() {
        let run = || {
            let scheduler = scheduler();
            let ticker = Ticker::new(listed(&["A", "B"]), &GameSettings::default());
            ticker.start_ticking(&scheduler);
            scheduler.advance_by(50_000);
            ticker.to_snapshot()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn failing_company_does_not_block_the_rest() {
        let scheduler = scheduler();
        let settings = GameSettings {
            max_swing: f64::MAX,
            ..GameSettings::default()
        };
        let ticker = Ticker::new(listed(&["A", "B"]), &settings);
        ticker.start_ticking(&scheduler);
        scheduler.advance_by(5000);
        assert_eq!(ticker.ticks_fired(), 1);
        assert!(ticker.companies_preview().is_empty());
    }

    #[test]
    fn restore_none_matches_new() {
        let settings = GameSettings::default();
        assert_eq!(
            Ticker::restore(None, &settings).to_snapshot(),
            Ticker::new(StockExchange::new(), &settings).to_snapshot()
        );
    }

    #[test]
    fn partial_snapshot_restores_field_by_field() {
        let settings = GameSettings::default();
        let json = r#"{"tickerInterval": "soon", "maxPreviewedCompanies": 3}"#;
        let ticker = Ticker::restore(serde_json::from_str(json).unwrap(), &settings);
        assert_eq!(ticker.ticker_interval(), 5000);
        assert_eq!(ticker.max_previewed_companies(), 3);

        let zero = Ticker::restore(
            Some(TickerSnapshot {
                ticker_interval: Some(0),
                ..TickerSnapshot::default()
            }),
            &settings,
        );
        assert_eq!(zero.ticker_interval(), 5000);
    }

    #[test]
    fn snapshot_round_trips() {
        let settings = GameSettings::default();
        let scheduler = scheduler();
        let empty = Ticker::new(StockExchange::new(), &settings);
        let moved = Ticker::new(listed(&["A", "B", "C"]), &settings);
        moved.set_ticker_interval(750);
        moved.set_max_previewed_companies(2);
        moved.start_ticking(&scheduler);
        scheduler.advance_by(3000);

        for ticker in [&empty, &moved] {
            let json = serde_json::to_string(&ticker.to_snapshot()).unwrap();
            let back = Ticker::restore(serde_json::from_str(&json).unwrap(), &settings);
            assert_eq!(back.to_snapshot(), ticker.to_snapshot());
            assert_eq!(
                back.companies_preview().iter().map(Company::to_snapshot).collect::<Vec<_>>(),
                ticker.companies_preview().iter().map(Company::to_snapshot).collect::<Vec<_>>()
            );
        }
    }
}
