#![deny(warnings)]

//! Headless CLI: plays a Stock Clicker session for a while and saves it.

use anyhow::{Context, Result};
use chrono::Utc;
use persistence::{default_save_path, read_save, write_save};
use rust_decimal::Decimal;
use sim_core::{Company, GameClock, GameConfig, Scheduler};
use sim_runtime::{Game, GameSettings};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Length of the boost the autoplayer buys.
const AUTOPLAY_BOOST_SECONDS: u32 = 30;

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    save: Option<PathBuf>,
    seconds: u64,
    clicks: u32,
    realtime: bool,
    fresh: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config: None,
        save: None,
        seconds: 60,
        clicks: 5,
        realtime: false,
        fresh: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().map(PathBuf::from),
            "--save" => args.save = it.next().map(PathBuf::from),
            "--seconds" => {
                args.seconds = it.next().and_then(|s| s.parse().ok()).unwrap_or(args.seconds)
            }
            "--clicks" => {
                args.clicks = it.next().and_then(|s| s.parse().ok()).unwrap_or(args.clicks)
            }
            "--realtime" => args.realtime = true,
            "--fresh" => args.fresh = true,
            _ => {}
        }
    }
    args
}

/// One second of play: click, then spend on an upgrade or a boost.
fn autoplay_second(game: &Game, clicks: u32) {
    for _ in 0..clicks {
        game.generate_cash();
    }
    let generator = game.money_generator();
    if game.balance() >= generator.upgrade_cost() {
        game.upgrade_generator();
    }
    if !generator.is_boosted() && game.balance() >= generator.boost_cost(AUTOPLAY_BOOST_SECONDS) {
        game.boost_generator(AUTOPLAY_BOOST_SECONDS);
    }
}

fn signed(amount: Decimal) -> String {
    if amount > Decimal::ZERO {
        format!("+{amount}")
    } else {
        amount.to_string()
    }
}

fn print_preview(preview: &[Company]) {
    if preview.is_empty() {
        println!("Preview | no recent movers");
        return;
    }
    println!("Preview | {} recent movers", preview.len());
    for company in preview {
        println!(
            "  {:<24} ${:>10} {:>9}  {}",
            company.name(),
            company.value(),
            signed(company.stock_value_change()),
            company.last_updated().format("%H:%M:%S")
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(?args, git_sha = env!("GIT_SHA"), "starting CLI");

    let config = match &args.config {
        Some(path) => GameConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GameConfig::default(),
    };
    let save_path = args.save.clone().unwrap_or_else(default_save_path);

    let scheduler = Scheduler::new(GameClock::system());
    let saved = if args.fresh {
        None
    } else {
        read_save(&save_path).await?
    };
    let mut game = match saved {
        Some(snapshot) => Game::restore(Some(snapshot), &scheduler, GameSettings::from(&config)),
        None => Game::new_game(&config, &scheduler)?,
    };

    if args.realtime {
        let mut second = tokio::time::interval(Duration::from_secs(1));
        second.tick().await;
        for _ in 0..args.seconds {
            second.tick().await;
            scheduler.advance_to(Utc::now());
            autoplay_second(&game, args.clicks);
        }
    } else {
        for _ in 0..args.seconds {
            scheduler.advance_by(1000);
            autoplay_second(&game, args.clicks);
        }
    }
    game.stop();

    let generator = game.money_generator();
    println!("Build | git: {} | date: {}", env!("GIT_SHA"), env!("BUILD_DATE"));
    println!(
        "KPI | seconds: {} | balance: ${} | per click: {} | base: {} | boost left: {}s | next upgrade: ${} | ticks: {} | listed: {}",
        args.seconds,
        game.balance(),
        generator.cash_per_click(),
        generator.base_cash_per_click(),
        generator.boosted_seconds_remaining(),
        generator.upgrade_cost(),
        game.ticker().ticks_fired(),
        game.ticker().stock_exchange().len()
    );
    print_preview(&game.ticker().companies_preview());

    write_save(&save_path, &game.to_snapshot())
        .await
        .with_context(|| format!("writing save {}", save_path.display()))?;
    Ok(())
}
