//! Long-running pipeline loops as `Service` implementations, supervised by
//! heartbeat (§4.4: "all four background loops publish a heartbeat per
//! iteration; a watchdog checks every 60s that each heartbeat is within a
//! configurable liveness bound and restarts any stale or finished task").
//! Grounded on `kernel/jobs/worker.rs`'s `Service` trait plus the
//! `ServiceHost::new().with_service(...).run_until_shutdown()` shape
//! documented there.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[async_trait::async_trait]
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Runs until `shutdown` is cancelled or the loop decides to exit on
    /// its own (the latter is treated by the supervisor as a crash and
    /// triggers a respawn).
    async fn run(&self, shutdown: CancellationToken, heartbeat: HeartbeatHandle) -> Result<()>;
}

/// Handed to a running service so it can record a heartbeat once per
/// iteration without reaching back into the supervisor's internals.
#[derive(Clone)]
pub struct HeartbeatHandle {
    name: &'static str,
    heartbeats: Arc<RwLock<HashMap<&'static str, Instant>>>,
}

impl HeartbeatHandle {
    pub async fn beat(&self) {
        self.heartbeats.write().await.insert(self.name, Instant::now());
    }
}

/// A factory re-creates a fresh `Box<dyn Service>` each time the supervisor
/// needs to respawn one — services are stateless enough (all state lives in
/// the database) that restart-from-scratch is always correct.
pub type ServiceFactory = Box<dyn Fn() -> Box<dyn Service> + Send + Sync>;

pub struct Supervisor {
    factories: Vec<ServiceFactory>,
    liveness_bound: Duration,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(liveness_bound: Duration) -> Self {
        Self {
            factories: Vec::new(),
            liveness_bound,
            poll_interval: Duration::from_secs(60),
        }
    }

    pub fn with_service(mut self, factory: ServiceFactory) -> Self {
        self.factories.push(factory);
        self
    }

    /// Spawns every registered service, then polls heartbeats until
    /// `shutdown` fires, respawning any service whose heartbeat has gone
    /// stale or whose task has already finished (crashed or returned).
    pub async fn run_until_shutdown(self, shutdown: CancellationToken) -> Result<()> {
        let heartbeats: Arc<RwLock<HashMap<&'static str, Instant>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let mut handles: Vec<(ServiceFactory, tokio::task::JoinHandle<()>, &'static str)> =
            Vec::new();

        for factory in self.factories {
            let (handle, name) = spawn_one(&factory, shutdown.child_token(), heartbeats.clone());
            handles.push((factory, handle, name));
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let now = Instant::now();
            let stale_names: Vec<&'static str> = {
                let beats = heartbeats.read().await;
                handles
                    .iter()
                    .filter(|(_, handle, name)| {
                        handle.is_finished()
                            || beats
                                .get(name)
                                .map(|t| now.duration_since(*t) > self.liveness_bound)
                                .unwrap_or(false)
                    })
                    .map(|(_, _, name)| *name)
                    .collect()
            };

            for name in stale_names {
                if shutdown.is_cancelled() {
                    break;
                }
                warn!(service = name, "heartbeat stale or task finished, respawning");
                if let Some(slot) = handles.iter_mut().find(|(_, _, n)| *n == name) {
                    slot.1.abort();
                    let (handle, respawned_name) =
                        spawn_one(&slot.0, shutdown.child_token(), heartbeats.clone());
                    slot.1 = handle;
                    slot.2 = respawned_name;
                }
            }
        }

        for (_, handle, name) in &handles {
            handle.abort();
            info!(service = name, "stopped");
        }
        Ok(())
    }
}

fn spawn_one(
    factory: &ServiceFactory,
    shutdown: CancellationToken,
    heartbeats: Arc<RwLock<HashMap<&'static str, Instant>>>,
) -> (tokio::task::JoinHandle<()>, &'static str) {
    let service = factory();
    let name = service.name();
    let handle_for_beat = HeartbeatHandle { name, heartbeats };
    let handle = tokio::spawn(async move {
        if let Err(err) = service.run(shutdown, handle_for_beat).await {
            error!(service = name, error = %err, "service exited with error");
        }
    });
    (handle, name)
}
