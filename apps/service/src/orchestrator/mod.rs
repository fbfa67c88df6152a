/// Orchestrator module - coordinates all components
///
/// The orchestrator is the composition root:
/// - Opens the store and builds the checker and notifier registries
/// - Wires the executor's result bus into the alert pipeline
/// - Drives monitors on their intervals and runs the maintenance scheduler
/// - Shuts everything down on ctrl-c
pub mod pipeline;


pub use pipeline::AlertPipeline;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::{ChannelStore, LibsqlStore, MaintenanceStore, MonitorStore, ResultStore};
use crate::maintenance::{Job, JobQueue, LocalJobQueue, MaintenanceScheduler, MaintenanceSuppressor};
use crate::models::{CheckResult, Monitor};
use crate::monitoring::{CheckerRegistry, MonitoringExecutor, MonitoringScheduler};
use crate::notification::{
    EmailNotifier, NotificationRouter, NotifierRegistry, NtfyNotifier, WebhookNotifier,
};

/// The store seams the orchestrator needs
#[derive(Clone)]
pub struct Stores {
    pub monitors: Arc<dyn MonitorStore>,
    pub results: Arc<dyn ResultStore>,
    pub channels: Arc<dyn ChannelStore>,
    pub maintenance: Arc<dyn MaintenanceStore>,
}

impl Stores {
    /// All four seams served by one backend
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: MonitorStore + ResultStore + ChannelStore + MaintenanceStore + 'static,
    {
        Self { monitors: store.clone(), results: store.clone(), channels: store.clone(), maintenance: store }
    }
}

/// Open the configured libsql database, remote when a URL is set
pub async fn open_store(config: &Config) -> Result<Arc<LibsqlStore>> {
    let store = match &config.database.url {
        Some(url) => {
            info!("Connecting to remote database at {}", url);
            LibsqlStore::open_remote(url, config.database.auth_token.as_deref().unwrap_or_default()).await?
        }
        None => {
            info!("Opening database at {}", config.database.path);
            LibsqlStore::open_local(&config.database.path).await?
        }
    };
    Ok(Arc::new(store))
}

/// Main orchestrator for the sentinel service
pub struct Orchestrator {
    config: Arc<Config>,
    stores: Stores,
    executor: Arc<MonitoringExecutor>,
    router: Arc<NotificationRouter>,
    pipeline: Arc<AlertPipeline>,
    suppressor: MaintenanceSuppressor,
    email: Arc<EmailNotifier>,
    queue: Arc<LocalJobQueue>,
    maintenance: Arc<MaintenanceScheduler>,
    job_rx: Option<mpsc::UnboundedReceiver<Job>>,
    task_handles: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create and start a new orchestrator
    /// This is a convenience method that creates and immediately runs the orchestrator
    pub async fn start(config: Config) -> Result<()> {
        let store = open_store(&config).await?;
        let mut orchestrator = Self::new(config, Stores::shared(store))?;
        orchestrator.run().await
    }

    /// Create a new orchestrator instance over the given stores
    pub fn new(config: Config, stores: Stores) -> Result<Self> {
        let checkers = CheckerRegistry::with_defaults().context("Failed to build checker registry")?;
        Self::with_checkers(config, stores, checkers)
    }

    /// Like `new`, with a caller-supplied checker registry
    pub fn with_checkers(config: Config, stores: Stores, checkers: CheckerRegistry) -> Result<Self> {
        let config = Arc::new(config);
        info!("Registered checkers: {:?}", checkers.kinds());

        let executor = Arc::new(MonitoringExecutor::new(
            Arc::new(checkers),
            config.engine.default_timeout(),
            config.engine.event_capacity,
        ));

        let email = Arc::new(EmailNotifier::new(config.email_settings()));
        let mut notifiers = NotifierRegistry::new();
        notifiers.register(Arc::new(WebhookNotifier::new()?));
        notifiers.register(Arc::new(NtfyNotifier::new(config.notifications.ntfy_server.clone())?));
        notifiers.register(email.clone());
        info!("Registered notifiers: {:?}", notifiers.kinds());

        let router = Arc::new(NotificationRouter::new(
            stores.monitors.clone(),
            stores.results.clone(),
            stores.channels.clone(),
            Arc::new(notifiers),
        ));
        let pipeline = Arc::new(AlertPipeline::new(stores.results.clone(), router.clone()));
        let suppressor = MaintenanceSuppressor::new(stores.maintenance.clone());

        let (queue, job_rx) = LocalJobQueue::new();
        let queue = Arc::new(queue);
        let maintenance = Arc::new(MaintenanceScheduler::new(
            stores.maintenance.clone(),
            router.clone(),
            queue.clone(),
            config.maintenance.tick(),
            config.maintenance.lookahead(),
        ));

        Ok(Self {
            config,
            stores,
            executor,
            router,
            pipeline,
            suppressor,
            email,
            queue,
            maintenance,
            job_rx: Some(job_rx),
            task_handles: Vec::new(),
        })
    }

    pub fn executor(&self) -> &Arc<MonitoringExecutor> {
        &self.executor
    }

    pub fn router(&self) -> &Arc<NotificationRouter> {
        &self.router
    }

    pub fn suppressor(&self) -> &MaintenanceSuppressor {
        &self.suppressor
    }

    /// Start background work: alert pipeline, maintenance scheduler and monitor schedules
    pub async fn spawn_background(&mut self) -> Result<()> {
        // Subscribe before any check can run so no result is missed
        let results = self.executor.subscribe();
        self.task_handles.push(tokio::spawn(self.pipeline.clone().run(results)));

        if self.config.maintenance.enabled {
            if let Some(job_rx) = self.job_rx.take() {
                self.maintenance.bootstrap().await?;
                self.task_handles.push(tokio::spawn(self.maintenance.clone().run(job_rx)));
                // Catch boundaries already inside the lookahead without waiting a tick
                if let Err(e) = self.maintenance.scan(chrono::Utc::now()).await {
                    warn!("Initial maintenance scan failed: {}", e);
                }
            }
        } else {
            info!("Maintenance scheduler disabled");
        }

        info!("Loading monitors from database...");
        let monitors = self.stores.monitors.enabled_monitors().await?;
        info!("Found {} enabled monitors", monitors.len());

        let scheduler = MonitoringScheduler::new(self.executor.clone(), self.stores.monitors.clone());
        self.task_handles.extend(scheduler.schedule_monitors(monitors));
        Ok(())
    }

    /// Run the orchestrator until ctrl-c
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting Uppe sentinel...");
        self.spawn_background().await?;

        tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
        info!("Shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Run monitors once, through the alert pipeline unless `dry_run`
    ///
    /// With no ids, every enabled monitor runs.
    pub async fn check_once(&self, monitor_ids: &[Uuid], dry_run: bool) -> Result<Vec<(Monitor, CheckResult)>> {
        let monitors = if monitor_ids.is_empty() {
            self.stores.monitors.enabled_monitors().await?
        } else {
            let mut monitors = Vec::with_capacity(monitor_ids.len());
            for id in monitor_ids {
                match self.stores.monitors.get_monitor(*id).await? {
                    Some(monitor) => monitors.push(monitor),
                    None => warn!("Monitor {} not found", id),
                }
            }
            monitors
        };

        let outcomes = self.executor.run_batch(&monitors).await;
        let mut results = Vec::with_capacity(monitors.len());
        for (monitor, outcome) in monitors.into_iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    if !dry_run {
                        self.pipeline.handle(&result).await?;
                    }
                    results.push((monitor, result));
                }
                Err(e) => {
                    warn!(monitor = %monitor.id, "Cannot run '{}': {}", monitor.name, e);
                }
            }
        }
        Ok(results)
    }

    /// Stop background tasks and release shared resources
    pub async fn shutdown(&mut self) {
        for handle in self.task_handles.drain(..) {
            handle.abort();
        }
        match self.queue.clear().await {
            Ok(dropped) if dropped > 0 => info!("Dropped {} pending maintenance jobs", dropped),
            Ok(_) => {}
            Err(e) => warn!("Failed to clear maintenance jobs: {}", e),
        }
        self.email.shutdown().await;
        info!("Uppe sentinel stopped");
    }
}
