use crate::ticker::Ticker;
use crate::GameSettings;
use rust_decimal::Decimal;
use sim_core::{
    Bank, ConfigError, GameConfig, GameSnapshot, Observable, Player, Scheduler, StockExchange,
};
use sim_econ::MoneyGenerator;
use tracing::{debug, info};

/// Panel shown when a game starts.
pub const DEFAULT_PANEL: &str = "MoneyGenerator";

/// One running session: the player, their money generator and the market.
///
/// Timers are live from construction until [`Game::stop`] or drop.
pub struct Game {
    player: Player,
    money_generator: MoneyGenerator,
    ticker: Ticker,
    current_panel: Observable<String>,
    settings: GameSettings,
}

impl Game {
    /// An empty game: no money, no listed companies.
    pub fn new(scheduler: &Scheduler, settings: GameSettings) -> Self {
        let ticker = Ticker::new(StockExchange::new(), &settings);
        Self::assemble(
            Player::default(),
            MoneyGenerator::new(scheduler.clock()),
            ticker,
            DEFAULT_PANEL.to_string(),
            settings,
            scheduler,
        )
    }

    /// A fresh game with the configured listings, balance and cadence.
    pub fn new_game(config: &GameConfig, scheduler: &Scheduler) -> Result<Self, ConfigError> {
        config.validate()?;
        let settings = GameSettings::from(config);
        let exchange = StockExchange::new();
        for company in config.companies(scheduler.now())? {
            exchange
                .list(company)
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        let ticker = Ticker::new(exchange, &settings);
        ticker.set_ticker_interval(config.ticker_interval_ms);
        ticker.set_max_previewed_companies(config.max_previewed_companies);
        let game = Self::assemble(
            Player::new(Bank::new(config.starting_balance)),
            MoneyGenerator::new(scheduler.clock()),
            ticker,
            DEFAULT_PANEL.to_string(),
            settings,
            scheduler,
        );
        info!(
            listings = game.ticker.stock_exchange().len(),
            balance = %config.starting_balance,
            "new game"
        );
        Ok(game)
    }

    /// Restores a saved game field by field; `None` gives the same game as
    /// [`Game::new`]. Timers are running when this returns.
    pub fn restore(
        snapshot: Option<GameSnapshot>,
        scheduler: &Scheduler,
        settings: GameSettings,
    ) -> Self {
        let snapshot = snapshot.unwrap_or_default();
        let ticker = Ticker::restore(snapshot.ticker, &settings);
        Self::assemble(
            Player::restore(snapshot.player),
            MoneyGenerator::restore(snapshot.money_generator, scheduler.clock()),
            ticker,
            snapshot
                .current_panel
                .unwrap_or_else(|| DEFAULT_PANEL.to_string()),
            settings,
            scheduler,
        )
    }

    fn assemble(
        player: Player,
        money_generator: MoneyGenerator,
        ticker: Ticker,
        current_panel: String,
        settings: GameSettings,
        scheduler: &Scheduler,
    ) -> Self {
        let mut game = Self {
            player,
            money_generator,
            ticker,
            current_panel: Observable::new(current_panel),
            settings,
        };
        game.initialise(scheduler);
        game
    }

    fn initialise(&mut self, scheduler: &Scheduler) {
        self.money_generator
            .watch_current_time(scheduler, self.settings.time_watch_interval_ms);
        self.ticker.start_ticking(scheduler);
        debug!(timers = scheduler.active_timers(), "game initialised");
    }

    pub fn to_snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            player: Some(self.player.to_snapshot()),
            money_generator: Some(self.money_generator.to_snapshot()),
            ticker: Some(self.ticker.to_snapshot()),
            current_panel: Some(self.current_panel()),
        }
    }

    /// Cancels the ticker and the time watch.
    pub fn stop(&mut self) {
        self.ticker.stop_ticking();
        self.money_generator.stop_watching();
        info!("game stopped");
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn money_generator(&self) -> &MoneyGenerator {
        &self.money_generator
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn current_panel(&self) -> String {
        self.current_panel.get()
    }

    /// Switches panels. The selected company never survives a panel change.
    pub fn change_panel(&self, name: impl Into<String>) {
        self.current_panel.set(name.into());
        self.ticker.stock_exchange().clear_selection();
    }

    pub fn balance(&self) -> Decimal {
        self.player.bank().balance()
    }

    pub fn generate_cash(&self) {
        self.money_generator.generate_cash(self.player.bank());
    }

    pub fn upgrade_generator(&self) -> bool {
        self.money_generator.upgrade_generator(self.player.bank())
    }

    pub fn boost_generator(&self, seconds: u32) -> bool {
        self.money_generator
            .boost_generator(seconds, self.player.bank())
    }

    pub fn buy_shares(&self, company: &str, shares: u64) -> bool {
        self.ticker
            .stock_exchange()
            .buy(company, shares, self.player.bank(), self.player.portfolio())
    }

    pub fn sell_shares(&self, company: &str, shares: u64) -> bool {
        self.ticker
            .stock_exchange()
            .sell(company, shares, self.player.bank(), self.player.portfolio())
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        self.ticker.stop_ticking();
        self.money_generator.stop_watching();
    }
}
