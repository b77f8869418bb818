use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

/// Collect events until `done` returns true for one of them (that event
/// included), or `limit` elapses.
pub async fn collect_until<E, F>(
    rx: &mut UnboundedReceiver<E>,
    limit: Duration,
    mut done: F,
) -> Vec<E>
where
    F: FnMut(&E) -> bool,
{
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(limit, async {
        while let Some(event) = rx.recv().await {
            let finished = done(&event);
            seen.push(event);
            if finished {
                break;
            }
        }
    })
    .await;
    seen
}

/// Everything already queued, without waiting.
pub fn drain<E>(rx: &mut UnboundedReceiver<E>) -> Vec<E> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    seen
}
