use std::sync::Arc;

use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

mod config;
mod database;
mod debounce;
mod dedup;
mod discord;
mod error;
mod fingerprint;
mod format;
mod models;
mod normalizer;
mod offer_finder;
mod publisher;
mod sources;
mod state;
mod traits;

use config::Config;
use database::Database;
use discord::DiscordNotifier;
use offer_finder::{OfferFinder, Trigger};
use publisher::Publisher;
use sources::{EpicSource, ItadSource};
use state::JsonStateStore;
use traits::OfferSource;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting free games watcher");

    let config = Config::from_env()?;
    let client = sources::http_client(&config.user_agent, config.request_timeout)?;

    let database = Database::new(&config.history_database_url).await?;
    if let Some(last) = database.recent(1).await?.first() {
        info!(
            "Last notification {} published at {} ({}, fingerprint {}, {} buckets)",
            last.message_id.as_deref().unwrap_or("-"),
            last.published_at,
            if last.is_forced() { "forced" } else { "change" },
            last.fingerprint,
            last.snapshot.buckets.len()
        );
    }

    let store = Arc::new(JsonStateStore::new(config.state_path.clone()));
    info!("State file: {}", store.path().display());

    let mut offer_sources: Vec<Box<dyn OfferSource>> = vec![Box::new(EpicSource::new(
        client.clone(),
        config.epic.clone(),
    ))];
    match config.itad.clone() {
        Some(settings) => offer_sources.push(Box::new(ItadSource::new(client.clone(), settings))),
        None => warn!("ITAD_API_KEY not set, deals source disabled"),
    }

    let channel = Arc::new(DiscordNotifier::new(client, &config.discord_webhook_url));
    let publisher = Publisher::new(channel, store.clone(), Arc::new(database));
    let finder = OfferFinder::new(
        offer_sources,
        store,
        publisher,
        config.confirm_threshold,
        config.request_timeout,
    );

    let boot_trigger = if config.force_publish_on_boot {
        Trigger::Forced
    } else {
        Trigger::Periodic
    };
    match finder.check_for_offers(boot_trigger).await {
        Ok(outcome) => info!("Initial check: {:?}", outcome),
        Err(e) => error!("Error during initial check: {:#}", e),
    }

    let mut sched = JobScheduler::new().await?;

    let job_finder = finder.clone();
    sched
        .add(Job::new_async(config.check_schedule.as_str(), move |_uuid, _l| {
            let finder = job_finder.clone();
            Box::pin(async move {
                if let Err(e) = finder.check_for_offers(Trigger::Periodic).await {
                    error!("Error checking for offers: {:#}", e);
                }
            })
        })?)
        .await?;

    info!("Scheduler started with schedule {}", config.check_schedule);
    sched.start().await?;

    // Operator refresh: `kill -USR1 <pid>` publishes now
    let mut refresh = signal(SignalKind::user_defined1())?;
    let refresh_finder = finder.clone();
    tokio::spawn(async move {
        while refresh.recv().await.is_some() {
            info!("Manual refresh requested");
            match refresh_finder.check_for_offers(Trigger::Forced).await {
                Ok(outcome) => info!("Manual refresh: {:?}", outcome),
                Err(e) => error!("Manual refresh failed: {:#}", e),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, waiting for the running check");
    sched.shutdown().await?;
    // Held until exit so no queued or scheduled cycle starts behind it
    let _idle = finder.shut_down().await;
    info!("No check in flight, exiting");

    Ok(())
}
