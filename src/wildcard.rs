//! Wildcard DNS filtering
//!
//! Runs as a post-processing pass once the resolver pool has drained, when
//! a `wildcard_domain` is configured. The idea is borrowed from bulk
//! subdomain enumerators that probe a random, almost-certainly-nonexistent
//! sibling label before trusting a positive answer: if `foo.example.com`
//! and `<random>.example.com` resolve to the same address set, `foo` isn't
//! a real host, it's just catching the domain's wildcard record.
//!
//! Four phases, run in order:
//! 1. **Index** — scan the host store, group hosts by their A-record set.
//! 2. **Candidate selection** — any address shared by at least
//!    `wildcard_threshold` hosts is wildcard-suspect; queue every host in
//!    that group for classification.
//! 3. **Classification** — workers probe each queued host with synthetic
//!    sibling labels and mark confirmed wildcards in a shared set.
//! 4. **Emission** — replay the indexed hosts in first-seen order, skipping
//!    anything confirmed as a wildcard (except the configured root itself).

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::info;

use crate::config::RunConfig;
use crate::dns::ResolverClient;
use crate::host_store::HostStore;
use crate::model::DnsRecordBundle;
use crate::output::OutputStage;
use crate::stats::RunStats;

const PROBE_COUNT: usize = 3;
const PROBE_LABEL_LEN: usize = 10;

/// Hosts confirmed to be wildcard responders, written once during
/// classification and read during emission.
#[derive(Default)]
pub struct WildcardSet {
    hosts: RwLock<std::collections::HashSet<String>>,
}

impl WildcardSet {
    pub fn new() -> Self {
        Self::default()
    }

    async fn mark(&self, host: &str) {
        self.hosts.write().await.insert(host.to_string());
    }

    async fn contains(&self, host: &str) -> bool {
        self.hosts.read().await.contains(host)
    }
}

/// Memoizes the probed answer set per parent suffix, so repeated candidates
/// under the same suffix only touch the network once. Each host still
/// compares its own address set against the cached one rather than trusting
/// a shared verdict, since two hosts under the same suffix can have
/// genuinely different, non-wildcard addresses.
#[derive(Default)]
pub struct WildcardCache {
    probed: Mutex<HashMap<String, Vec<String>>>,
}

impl WildcardCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, suffix: &str) -> Option<Vec<String>> {
        self.probed.lock().await.get(suffix).cloned()
    }

    async fn put(&self, suffix: &str, addrs: Vec<String>) {
        self.probed.lock().await.insert(suffix.to_string(), addrs);
    }
}

pub struct WildcardFilter {
    resolver: Arc<ResolverClient>,
    cache: Arc<WildcardCache>,
    set: Arc<WildcardSet>,
}

impl WildcardFilter {
    pub fn new(resolver: Arc<ResolverClient>) -> Self {
        Self {
            resolver,
            cache: Arc::new(WildcardCache::new()),
            set: Arc::new(WildcardSet::new()),
        }
    }

    /// Runs all four phases and replays the filtered host set through a
    /// freshly restarted `output`.
    pub async fn run(
        &self,
        store: &HostStore,
        config: &RunConfig,
        output: &mut OutputStage,
        stats: &RunStats,
    ) -> anyhow::Result<()> {
        let wildcard_root = config
            .wildcard_domain
            .as_deref()
            .expect("wildcard filter invoked without a configured wildcard_domain");

        // Phase 1 — Index: address -> hosts sharing it, in first-seen order.
        let mut first_seen_order: Vec<String> = Vec::new();
        let mut address_to_hosts: HashMap<String, Vec<String>> = HashMap::new();
        let mut host_bundles: HashMap<String, DnsRecordBundle> = HashMap::new();

        store
            .scan(|key, value| {
                let Ok(bundle) = DnsRecordBundle::from_bytes(value) else {
                    return;
                };
                first_seen_order.push(key.to_string());
                for addr in &bundle.a {
                    address_to_hosts
                        .entry(addr.clone())
                        .or_default()
                        .push(key.to_string());
                }
                host_bundles.insert(key.to_string(), bundle);
            })
            .await?;

        // Phase 2 — Candidate selection: de-duplicated across addresses.
        let mut candidates: std::collections::HashSet<String> = std::collections::HashSet::new();
        for hosts in address_to_hosts.values() {
            if hosts.len() >= config.wildcard_threshold {
                candidates.extend(hosts.iter().cloned());
            }
        }

        info!(
            "wildcard filter: {} distinct addresses, {} candidate hosts",
            address_to_hosts.len(),
            candidates.len()
        );

        // Phase 3 — Classification: sized off the distinct-address count from
        // Phase 1, not the (generally larger) candidate-host count.
        let worker_count = config.threads.min(address_to_hosts.len().max(1));
        let (tx, rx) = tokio::sync::mpsc::channel::<(String, Vec<String>)>(candidates.len().max(1));
        for candidate in candidates {
            let mut addrs = host_bundles
                .get(&candidate)
                .map(|b| b.a.clone())
                .unwrap_or_default();
            addrs.sort();
            let _ = tx.send((candidate, addrs)).await;
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let rx = rx.clone();
            let resolver = self.resolver.clone();
            let cache = self.cache.clone();
            let set = self.set.clone();
            workers.spawn(async move {
                loop {
                    let item = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some((host, host_addrs)) = item else { break };
                    if is_wildcard(&resolver, &cache, &host, &host_addrs).await {
                        set.mark(&host).await;
                    }
                }
            });
        }
        while let Some(result) = workers.join_next().await {
            result?;
        }

        // Phase 4 — Emission.
        output.restart().await?;
        let sender = output.sender();
        let mut removed = 0u64;
        for host in first_seen_order {
            if host == wildcard_root {
                let _ = sender.send(host).await;
                stats.inc_results_emitted();
                continue;
            }
            if self.set.contains(&host).await {
                removed += 1;
                continue;
            }
            let _ = sender.send(host).await;
            stats.inc_results_emitted();
        }
        drop(sender);
        output.close().await?;

        stats.add_wildcards_removed(removed);
        info!("wildcard filter: removed {} wildcard subdomains", removed);
        Ok(())
    }
}

/// Determines whether `host`'s A-record answer set (`host_addrs`, already
/// sorted) is indistinguishable from synthetic sibling labels under the
/// same parent domain. The probed address set is cached per parent suffix
/// so repeated candidates under it skip the network probe, but every host
/// still compares its own addresses against that cached set rather than
/// reusing a shared yes/no verdict.
async fn is_wildcard(
    resolver: &ResolverClient,
    cache: &WildcardCache,
    host: &str,
    host_addrs: &[String],
) -> bool {
    let Some(suffix) = parent_suffix(host) else {
        return false;
    };

    if host_addrs.is_empty() {
        return false;
    }

    let probed = match cache.get(&suffix).await {
        Some(addrs) => addrs,
        None => {
            let addrs = probe_suffix(resolver, &suffix).await;
            cache.put(&suffix, addrs.clone()).await;
            addrs
        }
    };

    !probed.is_empty() && probed.as_slice() == host_addrs
}

/// Probes `suffix` with synthetic sibling labels and returns the first
/// non-empty A-record answer set observed, or an empty vec if every probe
/// came back empty or unanswered.
async fn probe_suffix(resolver: &ResolverClient, suffix: &str) -> Vec<String> {
    for _ in 0..PROBE_COUNT {
        let label: String = {
            let mut rng = rand::thread_rng();
            (&mut rng)
                .sample_iter(Alphanumeric)
                .take(PROBE_LABEL_LEN)
                .map(char::from)
                .collect()
        };
        let probe_name = format!("{}.{}", label.to_ascii_lowercase(), suffix);

        let Some(probe_bundle) = resolver.query_multiple(&probe_name).await else {
            continue;
        };
        let mut probe_addrs = probe_bundle.a.clone();
        probe_addrs.sort();

        if !probe_addrs.is_empty() {
            return probe_addrs;
        }
    }
    Vec::new()
}

/// The immediate parent domain of `host` (everything after the first
/// label), or `None` for a bare top-level name with no parent to probe.
fn parent_suffix(host: &str) -> Option<String> {
    host.split_once('.').map(|(_, rest)| rest.to_string())
}
