use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::SharedState;

/// How often the rate-limit windows and the intake/login limiters are swept.
const RESET_TICK: Duration = Duration::from_secs(60);

/// Start the background mail loops. Each stops once `shutdown` turns true.
pub fn spawn(state: SharedState, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let handles = vec![
        tokio::spawn(queue_tick(state.clone(), shutdown.clone())),
        tokio::spawn(reset_tick(state.clone(), shutdown.clone())),
        tokio::spawn(follow_up_loop(state, shutdown)),
    ];
    tracing::info!("Mail workers started");
    handles
}

/// Sleep for `period` or until shutdown. Returns false when shutting down.
async fn wait(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(period) => {}
        _ = shutdown.changed() => return false,
    }
    !*shutdown.borrow()
}

/// Wake the in-memory queue in case a parked head job has become due.
async fn queue_tick(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let period = state.config.mail.queue_tick;
    while wait(period, &mut shutdown).await {
        state.queue.trigger();
    }
    tracing::debug!("Queue tick stopped");
}

async fn reset_tick(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    while wait(RESET_TICK, &mut shutdown).await {
        if state.send_limiter.reset_if_expired() {
            state.queue.trigger();
        }
        state.intake_limiter.cleanup();
        state.login_limiter.cleanup();
    }
    tracing::debug!("Rate limit reset tick stopped");
}

async fn follow_up_loop(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let period = state.config.mail.processor_interval;
    tracing::info!(
        "Follow-up processor running every {} minutes",
        period.as_secs() / 60
    );

    loop {
        if let Err(e) = state.processor.run_batch().await {
            tracing::error!("Follow-up batch failed: {e}");
        }

        if !wait(period, &mut shutdown).await {
            break;
        }
    }
    tracing::debug!("Follow-up processor stopped");
}
