use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use crate::audit::AuditSink;
use crate::config::Config;
use crate::dispatch::RunProgress;
use crate::roster::Roster;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub roster: Roster,
    pub audit: Arc<dyn AuditSink>,
    pub progress: watch::Sender<RunProgress>,
    /// Held for the duration of a run; only one run at a time.
    pub run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config, roster: Roster, audit: Arc<dyn AuditSink>) -> SharedState {
        let (progress, _) = watch::channel(RunProgress::default());
        Arc::new(Self {
            config,
            roster,
            audit,
            progress,
            run_lock: Arc::new(Mutex::new(())),
        })
    }
}
