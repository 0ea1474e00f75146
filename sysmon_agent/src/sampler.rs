//! Background samplers: collect on a fixed period, record history, refresh the
//! snapshot cache and fan the frame out to every dashboard subscriber.

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, warn};

use crate::state::AppState;
use crate::types::{Envelope, HistoryPoint, Snapshot};

pub const CONTAINER_PERIOD: Duration = Duration::from_secs(5);

/// Record one snapshot and push it to subscribers. Returns how many received it.
pub async fn publish_snapshot(state: &AppState, snap: &Snapshot) -> usize {
    state.history.append(HistoryPoint::from(snap));
    let js = match Envelope::Snapshot(snap).to_json() {
        Ok(js) => js,
        Err(e) => {
            warn!("snapshot serialization failed: {e}");
            return 0;
        }
    };
    *state.last_snapshot.write().await = js.clone();
    state.hub.broadcast(&js).await
}

/// Cached snapshot frame; on a cold cache, collect one now (not added to history).
pub async fn latest_snapshot_frame(state: &AppState) -> Option<String> {
    let cached = state.last_snapshot.read().await.clone();
    if !cached.is_empty() {
        return Some(cached);
    }
    let snap = state.source.lock().await.collect();
    let js = Envelope::Snapshot(&snap).to_json().ok()?;
    *state.last_snapshot.write().await = js.clone();
    Some(js)
}

pub fn spawn_sampler(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let snap = state.source.lock().await.collect();
            let delivered = publish_snapshot(&state, &snap).await;
            debug!(delivered, "snapshot published");
        }
    })
}

/// Container stats on their own, slower period. Nothing is sent while Docker is unavailable.
pub fn spawn_container_sampler(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(containers) = state.docker.list().await else {
                continue;
            };
            match Envelope::Docker(&containers).to_json() {
                Ok(js) => {
                    state.hub.broadcast(&js).await;
                }
                Err(e) => warn!("docker serialization failed: {e}"),
            }
        }
    })
}
