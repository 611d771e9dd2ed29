//! # Monitor Engine
//!
//! Owns everything the source loops share and starts them.
//!
//! ## Overview
//!
//! An engine instance holds the coordinator, resolver, sync, counter store
//! and the submitted-count gauge. Two engines never share state, which keeps
//! tests isolated.
//!
//! Startup reads the total play count to seed the gauge. That read is the
//! only failure that stops the engine from starting.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = MonitorEngine::new(parts)
//!     .await?
//!     .with_source("audirvana".into(), audirvana)
//!     .with_source("roon".into(), roon);
//!
//! let handle = engine.spawn(CancellationToken::new());
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! ```

use crate::coordinator::{self, CoordinatorHandle};
use crate::error::{MonitorError, Result};
use crate::monitor::{MonitorContext, PlaybackMonitor};
use bridge_traits::notify::NotificationSink;
use bridge_traits::player::{PlayerStateProvider, SourceId};
use bridge_traits::time::Clock;
use core_library::repositories::PlayCountRepository;
use core_metadata::MetadataResolver;
use core_runtime::config::MonitorSettings;
use core_sync::ScrobbleSync;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Collaborators needed to build a [`MonitorEngine`].
pub struct EngineParts {
    pub resolver: Arc<MetadataResolver>,
    pub sync: Arc<ScrobbleSync>,
    pub counts: Arc<dyn PlayCountRepository>,
    pub sink: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
    pub settings: MonitorSettings,
    /// Period of the background catch-up pass; `None` disables it
    pub reconcile_interval: Option<Duration>,
}

pub struct MonitorEngine {
    context: MonitorContext,
    sources: Vec<(SourceId, Arc<dyn PlayerStateProvider>)>,
    reconcile_interval: Option<Duration>,
    coordinator_task: JoinHandle<()>,
}

impl MonitorEngine {
    /// Seed the gauge and start the coordinator.
    ///
    /// # Errors
    ///
    /// [`MonitorError::GaugeSeed`] if the play total cannot be read.
    pub async fn new(parts: EngineParts) -> Result<Self> {
        parts
            .settings
            .validate()
            .map_err(|e| MonitorError::Config(e.to_string()))?;

        let total = parts
            .counts
            .total_plays()
            .await
            .map_err(MonitorError::GaugeSeed)?;
        let seed = u64::try_from(total).unwrap_or(0);
        info!(seed, "Seeded submitted-count gauge");

        let (coordinator, coordinator_task) = coordinator::spawn(parts.sink);

        Ok(Self {
            context: MonitorContext {
                resolver: parts.resolver,
                sync: parts.sync,
                counts: parts.counts,
                coordinator,
                clock: parts.clock,
                submitted: Arc::new(AtomicU64::new(seed)),
                settings: parts.settings,
            },
            sources: Vec::new(),
            reconcile_interval: parts.reconcile_interval,
            coordinator_task,
        })
    }

    pub fn with_source(mut self, source: SourceId, provider: Arc<dyn PlayerStateProvider>) -> Self {
        self.add_source(source, provider);
        self
    }

    /// Register a source. A repeated id replaces the earlier provider.
    pub fn add_source(&mut self, source: SourceId, provider: Arc<dyn PlayerStateProvider>) {
        if let Some(existing) = self.sources.iter_mut().find(|(id, _)| *id == source) {
            warn!(source = %source, "Replacing provider for source");
            existing.1 = provider;
        } else {
            self.sources.push((source, provider));
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceId> {
        self.sources.iter().map(|(id, _)| id)
    }

    pub fn submitted_count(&self) -> u64 {
        self.context.submitted.load(Ordering::Relaxed)
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.context.coordinator
    }

    /// Build a monitor for `source` without starting it.
    pub fn monitor(&self, source: &SourceId) -> Option<PlaybackMonitor> {
        self.sources
            .iter()
            .find(|(id, _)| id == source)
            .map(|(id, provider)| {
                PlaybackMonitor::new(id.clone(), Arc::clone(provider), self.context.clone())
            })
    }

    /// Start one loop per source plus the optional catch-up loop.
    pub fn spawn(self, cancel: CancellationToken) -> EngineHandle {
        if self.sources.is_empty() {
            warn!("Monitor engine started without sources");
        }

        let monitors: Vec<JoinHandle<()>> = self
            .sources
            .into_iter()
            .map(|(source, provider)| {
                let monitor = PlaybackMonitor::new(source, provider, self.context.clone());
                tokio::spawn(monitor.run(cancel.child_token()))
            })
            .collect();

        let reconciler = self.reconcile_interval.map(|period| {
            tokio::spawn(run_reconciler(
                Arc::clone(&self.context.sync),
                period,
                cancel.child_token(),
            ))
        });

        info!("Monitor engine started");
        EngineHandle {
            cancel,
            monitors,
            reconciler,
            coordinator: self.context.coordinator,
            coordinator_task: self.coordinator_task,
            submitted: self.context.submitted,
        }
    }
}

async fn run_reconciler(sync: Arc<ScrobbleSync>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match sync.catch_up(None).await {
                    Ok(report) if report.attempted > 0 => info!(
                        submitted = report.submitted,
                        failed = report.failed,
                        "Background catch-up finished"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Background catch-up failed"),
                }
            }
        }
    }
}

/// Running engine.
pub struct EngineHandle {
    cancel: CancellationToken,
    monitors: Vec<JoinHandle<()>>,
    reconciler: Option<JoinHandle<()>>,
    coordinator: CoordinatorHandle,
    coordinator_task: JoinHandle<()>,
    submitted: Arc<AtomicU64>,
}

impl EngineHandle {
    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every loop and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for task in self.monitors {
            if let Err(e) = task.await {
                error!(error = %e, "Monitor task ended abnormally");
            }
        }
        if let Some(task) = self.reconciler {
            if let Err(e) = task.await {
                error!(error = %e, "Catch-up task ended abnormally");
            }
        }

        drop(self.coordinator);
        if let Err(e) = self.coordinator_task.await {
            error!(error = %e, "Coordinator task ended abnormally");
        }
        info!("Monitor engine stopped");
    }
}
