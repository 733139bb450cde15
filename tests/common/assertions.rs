//! Event-driven waits for integration tests

use std::time::Duration;

use course_loader::{Event, ProgressiveLoader};
use tokio::sync::broadcast;

/// Outcome of waiting for a loader event
#[derive(Debug)]
pub enum WaitResult {
    /// The event arrived
    Seen(Event),
    /// Timeout waiting for the event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait until `rx` yields an event matching `predicate`
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: impl Fn(&Event) -> bool,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return WaitResult::Seen(event),
                Ok(_) => continue,
                // Lagged receivers keep waiting; the event may still come
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Assert that a tier's leading units can be played
pub async fn assert_belt_ready(loader: &ProgressiveLoader, tier: &str) {
    assert!(
        loader.is_belt_ready(tier).await,
        "expected {tier} to be ready, completed: {:?}",
        loader.completed_tiers().await
    );
}
