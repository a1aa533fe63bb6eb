use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use weave_core::events::WeaveEvent;

/// Run cleanup once after the startup delay, then every interval, until ctrl-c.
pub fn run(root: &Path, interval_override: Option<u64>) -> anyhow::Result<()> {
    let weave = Arc::new(super::open(root)?);
    let retention = weave.config().retention.clone();
    let period = Duration::from_secs(
        interval_override
            .unwrap_or(retention.maintenance_interval_secs)
            .max(1),
    );
    let delay = Duration::from_secs(retention.startup_delay_secs);

    let root_display = root.display().to_string();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        tokio::spawn(log_events(weave.subscribe()));

        tracing::info!(
            root = %root_display,
            coherence = weave.field_state().coherence,
            interval_secs = period.as_secs(),
            delay_secs = delay.as_secs(),
            "maintenance started"
        );

        let mut ticker = interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let w = Arc::clone(&weave);
                    let outcome = tokio::task::spawn_blocking(move || w.cleanup())
                        .await
                        .context("cleanup task panicked")?;
                    if let Err(e) = outcome {
                        tracing::warn!(error = %e, "cleanup failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("maintenance stopped");
                    return Ok(());
                }
            }
        }
    })
}

async fn log_events(mut rx: tokio::sync::broadcast::Receiver<WeaveEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => tracing::debug!(event = %line, "weave event"),
                Err(e) => tracing::warn!(error = %e, "unserializable event"),
            },
            Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event listener lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
