use criterion::{criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use sim_core::{epoch, Company, GameClock, Scheduler, StockExchange};
use sim_runtime::{GameSettings, Ticker};

fn bench_ticks(c: &mut Criterion) {
    let exchange = StockExchange::new();
    for i in 0..200 {
        let value = Decimal::new(10_000 + i, 2);
        let company = Company::new(format!("Co{i:03}"), value, epoch()).unwrap();
        exchange.list(company).unwrap();
    }
    let scheduler = Scheduler::new(GameClock::starting_at(epoch()));
    let ticker = Ticker::new(exchange, &GameSettings::default());
    ticker.set_ticker_interval(1000);
    ticker.start_ticking(&scheduler);

    c.bench_function("ticker_fire_200_companies", |b| {
        b.iter(|| {
            scheduler.advance_by(1000);
        })
    });
    c.bench_function("companies_preview_after_tick", |b| {
        b.iter(|| {
            scheduler.advance_by(1000);
            ticker.companies_preview().len()
        })
    });
}

criterion_group!(benches, bench_ticks);
criterion_main!(benches);
