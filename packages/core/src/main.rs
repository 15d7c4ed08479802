use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use tokio::sync::{watch, RwLock};
use tower_http::cors::{Any, CorsLayer};

use fare_watch::alerts::{DeliveryGate, LogNotifier, Notifier, TelegramNotifier, WebhookNotifier};
use fare_watch::api::{self, fares::MAX_LIST_LIMIT, ApiState};
use fare_watch::cache::{FareCache, FareSnapshot};
use fare_watch::cli::{Cli, Command};
use fare_watch::config::{Config, NotifierKind};
use fare_watch::db;
use fare_watch::engine::AlertEngine;
use fare_watch::error::{AppError, PersistenceError};
use fare_watch::fares::{Fare, FareSource, RyanairFareSource};
use fare_watch::logging::init_logging;
use fare_watch::metrics::AppMetrics;
use fare_watch::repository::SqliteSubscriptionRepository;
use fare_watch::scheduler::{run_alert_loop, ScheduleSettings};
use fare_watch::store::SubscriptionStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command();
    init_logging(if command == Command::Serve { "info" } else { "warn" });

    if let Err(err) = run(cli, command).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, command: Command) -> Result<(), AppError> {
    let mut config = Config::from_env().map_err(AppError::Config)?;
    config.apply_cli(&cli).map_err(AppError::Config)?;
    tracing::info!("Service started with config: {:?}", config);

    let source: Arc<dyn FareSource + Send + Sync> = Arc::new(RyanairFareSource::new(
        config.fare_api_url.clone(),
        config.route.clone(),
        config.fetch_timeout,
    )?);

    match command {
        Command::Serve => serve(config, source).await,
        Command::Lowest => print_lowest(&config, source).await,
        Command::Prices {
            days,
            date,
            max_price,
            limit,
        } => print_prices(&config, source, date, days, max_price, limit).await,
    }
}

async fn load_store(database_url: &str) -> Result<Arc<SubscriptionStore>, AppError> {
    let pool = db::create_pool(database_url)
        .await
        .map_err(PersistenceError::from)?;
    let repository = Arc::new(SqliteSubscriptionRepository::new(pool));
    Ok(Arc::new(SubscriptionStore::load(repository).await?))
}

fn build_engine(
    config: &Config,
    source: Arc<dyn FareSource + Send + Sync>,
    store: Arc<SubscriptionStore>,
) -> Result<AlertEngine, AppError> {
    let engine = AlertEngine::new(
        source,
        Arc::new(RwLock::new(FareCache::new())),
        store,
        config.lookahead_days,
    )?;
    Ok(engine.with_retry(config.retry))
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier + Send + Sync>, AppError> {
    let notifier: Arc<dyn Notifier + Send + Sync> = match config.notifier {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Webhook => Arc::new(WebhookNotifier::new(config.notify_timeout)),
        NotifierKind::Telegram => {
            let token = config.telegram_bot_token.clone().ok_or_else(|| {
                AppError::Config("TELEGRAM_BOT_TOKEN is required when NOTIFIER=telegram".to_string())
            })?;
            Arc::new(TelegramNotifier::new(token, config.notify_timeout))
        }
    };
    Ok(notifier)
}

async fn serve(config: Config, source: Arc<dyn FareSource + Send + Sync>) -> Result<(), AppError> {
    let metrics = Arc::new(
        AppMetrics::new().map_err(|err| AppError::Config(format!("Metrics registry: {}", err)))?,
    );
    let store = load_store(&config.database_url).await?;
    let engine = Arc::new(build_engine(&config, source, store)?.with_metrics(metrics.clone()));
    let notifier = build_notifier(&config)?;

    tracing::info!(
        "Watching {} over the next {} days via {}",
        config.route,
        config.lookahead_days,
        engine.provider_name()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = {
        let engine = engine.clone();
        let metrics = metrics.clone();
        let warm_engine = engine.clone();
        let mut stop = shutdown_rx.clone();
        let settings = ScheduleSettings {
            period: config.poll_interval,
            first_tick_delay: config.first_tick_delay,
        };
        tokio::spawn(run_alert_loop(
            engine,
            notifier,
            DeliveryGate::new(config.repeat_policy),
            Some(metrics),
            settings,
            async move {
                if let Err(err) = warm_engine.refresh().await {
                    tracing::warn!("Initial fare fetch failed, serving empty cache: {}", err);
                }
            },
            async move {
                let _ = stop.changed().await;
            },
        ))
    };

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
                std::future::pending::<()>().await;
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = api::create_router(ApiState {
        engine: engine.clone(),
        metrics,
    })
    .layer(cors);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api_port)).await?;
    tracing::info!("HTTP API listening on port {}", config.api_port);

    let mut stop = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop.changed().await;
        })
        .await?;

    if let Err(err) = scheduler.await {
        tracing::error!("Scheduler task failed: {}", err);
    }
    tracing::info!("Shut down cleanly");
    Ok(())
}

/// One-shot commands never touch the subscription database.
async fn one_shot_engine(
    config: &Config,
    source: Arc<dyn FareSource + Send + Sync>,
) -> Result<AlertEngine, AppError> {
    let store = load_store("sqlite::memory:").await?;
    build_engine(config, source, store)
}

async fn print_lowest(config: &Config, source: Arc<dyn FareSource + Send + Sync>) -> Result<(), AppError> {
    let engine = one_shot_engine(config, source).await?;
    let snapshot = engine.refresh().await?;

    match snapshot.lowest() {
        Some(fare) => println!("Cheapest {} fare: {}", config.route, describe(fare)),
        None => println!(
            "No available {} fares between {} and {}",
            config.route,
            snapshot.window().start(),
            snapshot.window().end()
        ),
    }
    Ok(())
}

async fn print_prices(
    config: &Config,
    source: Arc<dyn FareSource + Send + Sync>,
    date: Option<NaiveDate>,
    days: Option<u32>,
    max_price: Option<Decimal>,
    limit: usize,
) -> Result<(), AppError> {
    let engine = one_shot_engine(config, source).await?;
    let start = date.unwrap_or_else(|| Utc::now().date_naive());
    let set = engine
        .fetch_range(start, days.unwrap_or(config.lookahead_days))
        .await?;
    let snapshot = FareSnapshot::new(set, Utc::now());
    let fares = snapshot.cheapest(limit.clamp(1, MAX_LIST_LIMIT), max_price);

    println!(
        "{} fares from {} to {}",
        config.route,
        snapshot.window().start(),
        snapshot.window().end()
    );
    if fares.is_empty() {
        println!("No available fares match.");
        return Ok(());
    }
    for fare in &fares {
        println!("  {}", describe(fare));
    }
    if let Some(stats) = snapshot.stats() {
        println!(
            "{} available: min {:.2}, avg {:.2}, max {:.2} {} (best day {})",
            stats.count, stats.min, stats.average, stats.max, stats.currency, stats.best_date
        );
    }
    Ok(())
}

fn describe(fare: &Fare) -> String {
    let time = |t: Option<chrono::NaiveTime>| {
        t.map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    };
    format!(
        "{} ({}) {:.2} {}  {} -> {}",
        fare.date.format("%Y-%m-%d"),
        fare.date.format("%a"),
        fare.price,
        fare.currency,
        time(fare.departure_time),
        time(fare.arrival_time)
    )
}
