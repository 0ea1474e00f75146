//! Subscriber set and fan-out for telemetry frames.
//!
//! One mutex guards both membership and the broadcast pass, so a subscriber is
//! never half-removed while a frame is being delivered. There is no per-subscriber
//! queue: a slow peer stalls the pass for everyone until its write completes.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::transport::FrameSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Members<S> {
    next_id: u64,
    conns: HashMap<SubscriberId, S>,
}

pub struct Hub<S> {
    members: Mutex<Members<S>>,
}

impl<S: FrameSink> Hub<S> {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(Members {
                next_id: 1,
                conns: HashMap::new(),
            }),
        }
    }

    /// Take ownership of a connection's send half and start delivering to it.
    pub async fn register(&self, sink: S) -> SubscriberId {
        let mut m = self.members.lock().await;
        let id = SubscriberId(m.next_id);
        m.next_id += 1;
        m.conns.insert(id, sink);
        info!(%id, subscribers = m.conns.len(), "subscriber registered");
        id
    }

    /// Drop a subscriber and close its connection. Unknown ids are ignored.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut m = self.members.lock().await;
        let Some(mut sink) = m.conns.remove(&id) else {
            return false;
        };
        sink.close().await;
        info!(%id, subscribers = m.conns.len(), "subscriber removed");
        true
    }

    /// Write `payload` to every subscriber. Returns how many writes succeeded.
    pub async fn broadcast(&self, payload: &str) -> usize {
        let mut m = self.members.lock().await;
        let ids: Vec<SubscriberId> = m.conns.keys().copied().collect();
        let mut delivered = 0;
        for id in ids {
            let sent = match m.conns.get_mut(&id) {
                Some(sink) => sink.send_text(payload).await,
                None => continue,
            };
            match sent {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(%id, error = %e, "broadcast write failed; dropping subscriber");
                    if let Some(mut dead) = m.conns.remove(&id) {
                        dead.close().await;
                    }
                }
            }
        }
        delivered
    }

    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.members.lock().await.conns.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.conns.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<S: FrameSink> Default for Hub<S> {
    fn default() -> Self {
        Self::new()
    }
}
