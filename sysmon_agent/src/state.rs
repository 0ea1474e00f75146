//! Shared agent state: collaborators built once in `main` and handed to every handler.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::auth::Authenticator;
use crate::config::Config;
use crate::docker::DockerClient;
use crate::history::HistoryBuffer;
use crate::hub::Hub;
use crate::metrics::{SnapshotSource, SystemCollector};
use crate::pty::{self, NativeSpawner, SharedSpawner, ShellSpawner};
use crate::transport::WsSink;

pub type SharedSource = Arc<Mutex<Box<dyn SnapshotSource>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<Authenticator>,
    pub hub: Arc<Hub<WsSink>>,
    pub history: Arc<HistoryBuffer>,
    pub source: SharedSource,
    pub docker: Arc<DockerClient>,
    pub spawner: SharedSpawner,

    // Last serialized snapshot envelope, sent first to new dashboard connections
    pub last_snapshot: Arc<RwLock<String>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let collector = SystemCollector::new(config.max_processes);
        Self::with_source(config, Box::new(collector))
    }

    pub fn with_source(config: Config, source: Box<dyn SnapshotSource>) -> Self {
        Self {
            history: Arc::new(HistoryBuffer::new(config.history_capacity())),
            config: Arc::new(config),
            auth: Arc::new(Authenticator::new()),
            hub: Arc::new(Hub::new()),
            source: Arc::new(Mutex::new(source)),
            docker: Arc::new(DockerClient::default()),
            spawner: pty::shared(NativeSpawner::default()),
            last_snapshot: Arc::new(RwLock::new(String::new())),
        }
    }

    /// Replace the shell spawner used by `/ws/shell`.
    pub fn with_spawner<T: ShellSpawner>(mut self, spawner: T) -> Self {
        self.spawner = pty::shared(spawner);
        self
    }
}
