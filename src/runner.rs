//! Run orchestration
//!
//! Ties every stage together through the pipeline's state machine:
//!
//! `Configuring -> InputPrepared -> Resolving -> (WildcardIndexing ->
//! WildcardClassifying -> WildcardEmitting)? -> Draining -> Closed`
//!
//! Stream mode skips input preparation (hosts flow straight into the work
//! channel as they're read) and the wildcard branch entirely. `Runner` is
//! the one struct owning every collaborator for a run.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::RunConfig;
use crate::dns::ResolverClient;
use crate::host_store::HostStore;
use crate::input::InputMaterializer;
use crate::model::ResumeState;
use crate::output::OutputStage;
use crate::rate_limit;
use crate::resolver_pool::ResolverPool;
use crate::resume::ResumeController;
use crate::stats::RunStats;
use crate::wildcard::WildcardFilter;

const WORK_CHANNEL_CAPACITY: usize = 4096;

pub struct Runner {
    config: Arc<RunConfig>,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let stats = Arc::new(RunStats::new());
        let resolver = Arc::new(ResolverClient::new(&self.config).await?);
        let rate_limiter = Arc::new(rate_limit::from_queries_per_second(self.config.rate_limit));
        let mut output = OutputStage::start(self.config.output.clone(), self.config.flush_interval);

        let wildcard_mode = self.config.wildcard_domain.is_some();
        let store = if wildcard_mode || !self.config.stream {
            Some(Arc::new(HostStore::with_defaults()))
        } else {
            None
        };

        let (work_tx, work_rx) = mpsc::channel(WORK_CHANNEL_CAPACITY);

        if self.config.stream {
            info!("stream mode: bypassing host store and resume support");
            let materializer = InputMaterializer::new(&self.config);
            materializer.stream(work_tx).await?;
        } else {
            let store = store
                .as_ref()
                .expect("host store is always built in batch mode");
            let resume_controller = if self.config.resume {
                let path = ResumeController::default_path(self.config.output.as_deref());
                Some(ResumeController::new(path))
            } else {
                None
            };
            let resume_state = match &resume_controller {
                Some(controller) => controller.load().await,
                None => ResumeState::default(),
            };

            let materializer = InputMaterializer::new(&self.config);
            let inserted = materializer.prepare(store).await?;
            stats.add_hosts_materialized(inserted);
            info!("input prepared: {} hosts", inserted);

            feed_work_channel(store, &resume_state, work_tx, resume_controller.as_ref()).await?;
        }

        info!("resolving with {} workers", self.config.threads);
        ResolverPool::run(
            self.config.clone(),
            resolver.clone(),
            rate_limiter,
            work_rx,
            output.sender(),
            if wildcard_mode { store.clone() } else { None },
            stats.clone(),
        )
        .await?;

        if wildcard_mode {
            let store = store
                .as_ref()
                .expect("host store is always built in wildcard mode");
            info!("running wildcard classification and emission");
            let filter = WildcardFilter::new(resolver.clone());
            filter.run(store, &self.config, &mut output, &stats).await?;
        }

        output.close().await?;
        if let Some(store) = &store {
            store.close().await?;
        }

        if self.config.stats {
            stats.log_summary();
        }

        info!("run closed");
        Ok(())
    }
}

const RESUME_SAVE_INTERVAL: u64 = 100;

/// Feeds every stored host onto the work channel, honoring a resume
/// position by index when one was loaded, and periodically checkpointing
/// progress so an interrupted run can pick back up close to where it left
/// off.
async fn feed_work_channel(
    store: &HostStore,
    resume_state: &ResumeState,
    work_tx: mpsc::Sender<String>,
    resume_controller: Option<&ResumeController>,
) -> Result<()> {
    let mut index = 0u64;
    let resume_from = resume_state.index;
    let mut pending = Vec::new();

    store
        .scan(|key, _value| {
            pending.push(key.to_string());
        })
        .await?;

    // `HostStore::scan` merges its in-memory and overflow tiers in an
    // arbitrary order, so indices assigned straight off it aren't stable
    // across the two separate process runs a resume cycle requires. Sorting
    // by key first makes the index-to-host mapping reproducible.
    pending.sort();

    for host in pending {
        index += 1;
        if index <= resume_from {
            continue;
        }
        if let Some(controller) = resume_controller {
            if index % RESUME_SAVE_INTERVAL == 0 {
                let state = ResumeState {
                    index,
                    resume_from: host.clone(),
                };
                controller.save(&state).await?;
            }
        }
        if work_tx.send(host).await.is_err() {
            break;
        }
    }

    if let Some(controller) = resume_controller {
        controller
            .save(&ResumeState {
                index,
                resume_from: String::new(),
            })
            .await?;
    }

    Ok(())
}
