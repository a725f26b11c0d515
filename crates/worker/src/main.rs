use printforge_worker::{Services, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    printforge_observability::init();

    let config = WorkerConfig::from_env()?;
    let services = Services::in_memory(&config);

    if config.seed_demo {
        services.seed_demo().await?;
    }

    tracing::info!(
        delay_ms = config.queue.start_delay.as_millis() as u64,
        "Fulfillment worker booting"
    );
    tokio::select! {
        _ = tokio::time::sleep(config.queue.start_delay) => {
            services.processor.start();
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested before the queue started");
            return Ok(());
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    services.processor.stop().await;

    let stats = services.processor.stats();
    tracing::info!(
        sweeps = stats.sweeps_run,
        skipped = stats.sweeps_skipped,
        completed = stats.jobs_completed,
        retried = stats.jobs_retried,
        failed = stats.jobs_failed,
        "Fulfillment worker stopped"
    );
    Ok(())
}
