mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use common::{RecordingTransport, manual_clock, snapshot};
use leadflow::clock::{Clock, ManualClock};
use leadflow::mail::notifications::{EmailKind, Notifier};
use leadflow::mail::queue::{DrainOutcome, EmailJob, EmailQueue, QueueSettings};
use leadflow::rate_limit::{SendRateLimiter, WindowKind};

struct Harness {
    queue: Arc<EmailQueue>,
    limiter: Arc<SendRateLimiter>,
    transport: Arc<RecordingTransport>,
    clock: Arc<ManualClock>,
}

fn harness(hourly: u32, daily: u32, transport: RecordingTransport) -> Harness {
    let clock = manual_clock();
    let limiter = Arc::new(SendRateLimiter::new(clock.clone(), hourly, daily));
    let transport = Arc::new(transport);
    let queue = Arc::new(EmailQueue::new(
        limiter.clone(),
        transport.clone(),
        Notifier {
            from: "studio@test.com".to_string(),
            admin_recipient: "owner@test.com".to_string(),
            base_url: "http://localhost".to_string(),
        },
        clock.clone(),
        QueueSettings {
            send_delay: Duration::ZERO,
            max_retries: 3,
            transport_timeout: Duration::from_secs(2),
        },
    ));
    Harness {
        queue,
        limiter,
        transport,
        clock,
    }
}

fn user_job(name: &str, email: &str) -> EmailJob {
    EmailJob::new(EmailKind::UserConfirmation, snapshot(name, email))
}

// ── Ordering ────────────────────────────────────────────────────

#[tokio::test]
async fn drain_sends_in_enqueue_order() {
    let h = harness(50, 500, RecordingTransport::new());

    h.queue.push(user_job("Anna", "anna@test.com"));
    h.queue.push(user_job("Ben", "ben@test.com"));
    h.queue.push(user_job("Cleo", "cleo@test.com"));

    assert_eq!(h.queue.drain().await, DrainOutcome::Empty);
    assert_eq!(
        h.transport.sent_to(),
        vec!["anna@test.com", "ben@test.com", "cleo@test.com"]
    );
    assert!(h.queue.is_empty());
    assert_eq!(h.limiter.usage().hourly.used, 3);
    assert_eq!(h.limiter.usage().daily.used, 3);
}

#[tokio::test]
async fn admin_notification_goes_to_admin_recipient() {
    let h = harness(50, 500, RecordingTransport::new());

    h.queue.push(EmailJob::new(
        EmailKind::AdminNotification,
        snapshot("Anna", "anna@test.com"),
    ));
    h.queue.drain().await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@test.com");
    assert!(sent[0].subject.contains("Anna"));
}

#[tokio::test]
async fn future_head_blocks_the_queue() {
    let h = harness(50, 500, RecordingTransport::new());

    let mut later = user_job("Anna", "anna@test.com");
    let due_at = h.clock.now() + ChronoDuration::minutes(10);
    later.scheduled_for = Some(due_at);
    h.queue.push(later);
    h.queue.push(user_job("Ben", "ben@test.com"));

    assert_eq!(h.queue.drain().await, DrainOutcome::Waiting(due_at));
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.queue.len(), 2);

    h.clock.advance(ChronoDuration::minutes(10));
    assert_eq!(h.queue.drain().await, DrainOutcome::Empty);
    assert_eq!(h.transport.sent_to(), vec!["anna@test.com", "ben@test.com"]);
}

// ── Rate limits ─────────────────────────────────────────────────

#[tokio::test]
async fn hourly_cap_parks_head_until_window_reset() {
    let h = harness(2, 500, RecordingTransport::new());

    h.queue.push(user_job("Anna", "anna@test.com"));
    h.queue.push(user_job("Ben", "ben@test.com"));
    h.queue.push(user_job("Cleo", "cleo@test.com"));

    let outcome = h.queue.drain().await;
    let DrainOutcome::RateLimited(blocked) = outcome else {
        panic!("expected rate limit, got {outcome:?}");
    };
    assert_eq!(blocked.window, WindowKind::Hourly);
    assert_eq!(blocked.used, 2);
    assert_eq!(blocked.resets_at, h.clock.now() + ChronoDuration::hours(1));
    assert_eq!(h.transport.sent().len(), 2);
    assert_eq!(h.queue.len(), 1);

    // Still blocked until the hour is over.
    h.clock.advance(ChronoDuration::minutes(30));
    assert!(matches!(h.queue.drain().await, DrainOutcome::Waiting(_)));
    assert_eq!(h.transport.sent().len(), 2);

    h.clock.advance(ChronoDuration::minutes(30));
    assert_eq!(h.queue.drain().await, DrainOutcome::Empty);
    assert_eq!(h.transport.sent_to().last().unwrap(), "cleo@test.com");
    assert_eq!(h.limiter.usage().hourly.used, 1);
}

#[tokio::test]
async fn daily_cap_blocks_even_with_hourly_budget() {
    let h = harness(50, 1, RecordingTransport::new());

    h.queue.push(user_job("Anna", "anna@test.com"));
    h.queue.push(user_job("Ben", "ben@test.com"));

    let outcome = h.queue.drain().await;
    let DrainOutcome::RateLimited(blocked) = outcome else {
        panic!("expected rate limit, got {outcome:?}");
    };
    assert_eq!(blocked.window, WindowKind::Daily);
    assert_eq!(h.transport.sent_to(), vec!["anna@test.com"]);
}

// ── Retries ─────────────────────────────────────────────────────

#[tokio::test]
async fn failed_job_goes_to_tail_and_is_dropped_after_max_retries() {
    let h = harness(50, 500, RecordingTransport::new());
    h.transport.fail_for("bounce@test.com");

    h.queue.push(user_job("Bounce", "bounce@test.com"));
    h.queue.push(user_job("Anna", "anna@test.com"));

    assert_eq!(h.queue.drain().await, DrainOutcome::Empty);

    assert_eq!(
        h.transport.attempts(),
        vec![
            "bounce@test.com",
            "anna@test.com",
            "bounce@test.com",
            "bounce@test.com",
        ]
    );
    assert_eq!(h.transport.sent_to(), vec!["anna@test.com"]);
    assert!(h.queue.is_empty());
    // Failed attempts do not use up the budget.
    assert_eq!(h.limiter.usage().hourly.used, 1);
}

#[tokio::test]
async fn job_that_fails_once_is_retried_after_the_rest() {
    let h = harness(50, 500, RecordingTransport::new());
    h.transport.fail_times("anna@test.com", 1);

    h.queue.push(user_job("Anna", "anna@test.com"));
    h.queue.push(user_job("Ben", "ben@test.com"));
    h.queue.push(user_job("Cleo", "cleo@test.com"));

    assert_eq!(h.queue.drain().await, DrainOutcome::Empty);

    assert_eq!(
        h.transport.attempts(),
        vec!["anna@test.com", "ben@test.com", "cleo@test.com", "anna@test.com"]
    );
    assert_eq!(
        h.transport.sent_to(),
        vec!["ben@test.com", "cleo@test.com", "anna@test.com"]
    );
    assert_eq!(h.limiter.usage().hourly.used, 3);
}

#[tokio::test]
async fn timeout_counts_as_failed_attempt() {
    let clock = manual_clock();
    let limiter = Arc::new(SendRateLimiter::new(clock.clone(), 50, 500));
    let transport = Arc::new(RecordingTransport::with_delay(Duration::from_millis(200)));
    let queue = EmailQueue::new(
        limiter.clone(),
        transport.clone(),
        Notifier {
            from: "studio@test.com".to_string(),
            admin_recipient: "owner@test.com".to_string(),
            base_url: "http://localhost".to_string(),
        },
        clock,
        QueueSettings {
            send_delay: Duration::ZERO,
            max_retries: 2,
            transport_timeout: Duration::from_millis(20),
        },
    );

    queue.push(user_job("Anna", "anna@test.com"));
    assert_eq!(queue.drain().await, DrainOutcome::Empty);

    assert!(transport.sent().is_empty());
    assert_eq!(limiter.usage().hourly.used, 0);
}

// ── Concurrency ─────────────────────────────────────────────────

#[tokio::test]
async fn drain_is_not_reentrant() {
    let h = harness(50, 500, RecordingTransport::with_delay(Duration::from_millis(50)));

    h.queue.push(user_job("Anna", "anna@test.com"));
    h.queue.push(user_job("Ben", "ben@test.com"));

    let (first, second) = tokio::join!(h.queue.drain(), h.queue.drain());

    let mut outcomes = [first, second];
    outcomes.sort_by_key(|o| *o != DrainOutcome::AlreadyRunning);
    assert_eq!(outcomes, [DrainOutcome::AlreadyRunning, DrainOutcome::Empty]);
    assert_eq!(h.transport.sent_to(), vec!["anna@test.com", "ben@test.com"]);
    assert!(!h.queue.is_processing());
}

#[tokio::test]
async fn enqueue_starts_a_drain() {
    let h = harness(50, 500, RecordingTransport::new());

    h.queue.enqueue(user_job("Anna", "anna@test.com"));

    for _ in 0..40 {
        if !h.transport.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(h.transport.sent_to(), vec!["anna@test.com"]);
}

#[tokio::test]
async fn job_enqueued_during_a_drain_is_sent_by_that_drain() {
    let h = harness(50, 500, RecordingTransport::with_delay(Duration::from_millis(50)));
    h.queue.push(user_job("Anna", "anna@test.com"));

    let queue = h.queue.clone();
    let late = async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(user_job("Ben", "ben@test.com"));
    };

    let (outcome, ()) = tokio::join!(h.queue.drain(), late);

    assert_eq!(outcome, DrainOutcome::Empty);
    assert_eq!(h.transport.sent_to(), vec!["anna@test.com", "ben@test.com"]);
    assert!(h.queue.is_empty());
    assert!(!h.queue.is_processing());
}

// ── Stats ───────────────────────────────────────────────────────

#[tokio::test]
async fn stats_report_usage_strings() {
    let h = harness(50, 500, RecordingTransport::new());

    h.queue.push(user_job("Anna", "anna@test.com"));
    h.queue.drain().await;
    h.queue.push(user_job("Ben", "ben@test.com"));

    let stats = h.queue.stats();
    assert_eq!(stats.pending, 1);
    assert!(!stats.processing);
    assert_eq!(stats.rate_limits.hourly, "1/50");
    assert_eq!(stats.rate_limits.daily, "1/500");
}
