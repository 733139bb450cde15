//! Loader behaviour tests, driven through the in-memory content source.


use std::time::Duration;

use tokio::sync::broadcast;

use crate::types::Event;

/// Poll `condition` until it holds, failing the test after five seconds
async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// Everything currently buffered on `rx`
fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
