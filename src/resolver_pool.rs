//! Resolver worker pool
//!
//! Spawns a fixed-size group of workers (`threads`) that drain a shared work
//! channel, rate-limit themselves, resolve each host, and dispatch the
//! result to exactly one sink in priority order: wildcard-mode storage,
//! JSON, raw, response-code display, or the per-question-type emitter.
//! Rate limiter acquired per item, errors absorbed and counted rather than
//! aborting the batch; workers read off a long-lived `mpsc` channel instead
//! of a one-shot chunk loop.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::{EmitStyle, RunConfig};
use crate::dns::ResolverClient;
use crate::errors::ErrorKind;
use crate::host_store::HostStore;
use crate::rate_limit::RateLimiter;
use crate::stats::RunStats;

pub struct ResolverPool;

impl ResolverPool {
    /// Spawns `config.threads` workers draining `work_rx`, and awaits all of
    /// them. In wildcard mode, results are stored in `wildcard_store`
    /// instead of being emitted to `output_tx`.
    pub async fn run(
        config: Arc<RunConfig>,
        resolver: Arc<ResolverClient>,
        rate_limiter: Arc<RateLimiter>,
        work_rx: Receiver<String>,
        output_tx: Sender<String>,
        wildcard_store: Option<Arc<HostStore>>,
        stats: Arc<RunStats>,
    ) -> Result<()> {
        let work_rx = Arc::new(Mutex::new(work_rx));
        let mut workers = JoinSet::new();

        for id in 0..config.threads {
            let work_rx = work_rx.clone();
            let config = config.clone();
            let resolver = resolver.clone();
            let rate_limiter = rate_limiter.clone();
            let output_tx = output_tx.clone();
            let wildcard_store = wildcard_store.clone();
            let stats = stats.clone();

            workers.spawn(async move {
                worker_loop(
                    id,
                    work_rx,
                    config,
                    resolver,
                    rate_limiter,
                    output_tx,
                    wildcard_store,
                    stats,
                )
                .await
            });
        }

        while let Some(result) = workers.join_next().await {
            result?;
        }

        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    id: usize,
    work_rx: Arc<Mutex<Receiver<String>>>,
    config: Arc<RunConfig>,
    resolver: Arc<ResolverClient>,
    rate_limiter: Arc<RateLimiter>,
    output_tx: Sender<String>,
    wildcard_store: Option<Arc<HostStore>>,
    stats: Arc<RunStats>,
) -> Result<()> {
    loop {
        let host = {
            let mut rx = work_rx.lock().await;
            rx.recv().await
        };
        let Some(host) = host else {
            break;
        };

        let hostname = extract_hostname(&host);

        let _permit = rate_limiter.acquire().await.context(ErrorKind::Transient)?;
        stats.inc_queries_issued();

        let mut bundle = match resolver.query_multiple(&hostname).await {
            Some(bundle) if !bundle.is_discardable() => bundle,
            Some(_) => continue,
            None => {
                debug!("worker {}: no resolver contact for {}", id, hostname);
                stats.inc_errors_absorbed();
                continue;
            }
        };

        if let Some(allowlist) = &config.rcode_filter {
            if !allowlist.contains(&bundle.status_code) {
                continue;
            }
        }

        if !config.raw {
            bundle.raw = None;
        }

        if config.trace {
            let steps = resolver.trace(&hostname).await;
            if config.raw {
                let mut aggregate = Vec::new();
                for step in &steps {
                    if let Some(raw) = &step.raw {
                        aggregate.extend_from_slice(raw);
                    }
                }
                if !aggregate.is_empty() {
                    bundle.raw = Some(aggregate);
                }
            }
            let steps = steps
                .into_iter()
                .map(|mut step| {
                    step.raw = None;
                    step
                })
                .collect();
            bundle.trace = Some(steps);
        }

        if let Some(store) = &wildcard_store {
            match bundle.to_bytes() {
                Ok(serialized) => {
                    if let Err(err) = store.put(&bundle.host, serialized).await {
                        warn!("worker {}: failed to store {} for wildcard pass: {}", id, bundle.host, err);
                        stats.inc_errors_absorbed();
                    }
                }
                Err(err) => {
                    warn!("worker {}: failed to serialize {}: {}", id, bundle.host, err);
                    stats.inc_errors_absorbed();
                }
            }
            continue;
        }

        if config.json {
            match serde_json::to_string(&bundle) {
                Ok(line) => send(&output_tx, line, &stats).await,
                Err(err) => {
                    warn!("worker {}: failed to serialize {}: {}", id, bundle.host, err);
                    stats.inc_errors_absorbed();
                }
            }
            continue;
        }

        if config.raw {
            if let Some(raw) = &bundle.raw {
                send(&output_tx, format!("{} {}", bundle.host, hex_encode(raw)), &stats).await;
            }
            continue;
        }

        if config.rcode_filter.is_some() {
            let name = crate::config::rcode_name(bundle.status_code);
            send(&output_tx, format!("{} [{}]", bundle.host, name), &stats).await;
            continue;
        }

        for &qt in &config.question_types {
            emit_per_type(&bundle.host, bundle.items_for(qt), config.emit_style, &output_tx, &stats).await;
        }
    }

    Ok(())
}

async fn send(tx: &Sender<String>, line: String, stats: &RunStats) {
    if tx.send(line).await.is_ok() {
        stats.inc_results_emitted();
    }
}

async fn emit_per_type(
    domain: &str,
    items: &[String],
    style: EmitStyle,
    tx: &Sender<String>,
    stats: &RunStats,
) {
    match style {
        EmitStyle::ResponseOnly => {
            for item in items {
                send(tx, item.to_ascii_lowercase(), stats).await;
            }
        }
        EmitStyle::Response => {
            for item in items {
                send(tx, format!("{} [{}]", domain, item.to_ascii_lowercase()), stats).await;
            }
        }
        EmitStyle::Presence => {
            if !items.is_empty() {
                send(tx, domain.to_string(), stats).await;
            }
        }
    }
}

/// Extracts the hostname component when `host` parses as a URL; otherwise
/// returns it unchanged. Lets `--hosts` sources carry `https://host/path`
/// entries without the caller preprocessing them.
fn extract_hostname(host: &str) -> String {
    match url::Url::parse(host) {
        Ok(url) => url.host_str().map(str::to_string).unwrap_or_else(|| host.to_string()),
        Err(_) => host.to_string(),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_hostname_handles_urls_and_plain_hosts() {
        assert_eq!(extract_hostname("https://example.com/path"), "example.com");
        assert_eq!(extract_hostname("example.com"), "example.com");
        assert_eq!(extract_hostname("192.0.2.1"), "192.0.2.1");
    }

    #[tokio::test]
    async fn emit_per_type_presence_emits_once() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let stats = RunStats::new();
        emit_per_type(
            "example.com",
            &["1.2.3.4".to_string(), "5.6.7.8".to_string()],
            EmitStyle::Presence,
            &tx,
            &stats,
        )
        .await;
        drop(tx);

        let mut seen = Vec::new();
        while let Some(line) = rx.recv().await {
            seen.push(line);
        }
        assert_eq!(seen, vec!["example.com".to_string()]);
    }

    #[tokio::test]
    async fn emit_per_type_response_emits_each_item() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let stats = RunStats::new();
        emit_per_type(
            "example.com",
            &["Mixed.Case".to_string()],
            EmitStyle::Response,
            &tx,
            &stats,
        )
        .await;
        drop(tx);

        assert_eq!(rx.recv().await, Some("example.com [mixed.case]".to_string()));
    }

    #[test]
    fn hex_encode_matches_known_vector() {
        assert_eq!(hex_encode(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }
}
