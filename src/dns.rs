//! DNS resolution client: multi-endpoint, multi-question-type queries with
//! retry/rotation across upstream resolvers
//!
//! This module wraps `trust-dns-resolver`'s `TokioAsyncResolver` with the
//! behavior the resolution pipeline needs that the bare resolver doesn't
//! provide on its own:
//!
//! - Querying an explicit list of upstream resolvers instead of (or as well
//!   as) the system configuration, and rotating across them on failure
//! - Issuing every configured question type for a name and merging the
//!   results into a single bundle, tolerating partial per-type failure
//! - An optional hosts-file override consulted before any network query
//! - A bounded root-to-answer trace for `--trace`
//!
//! Timeouts wrap every lookup so a single unresponsive resolver can't stall
//! a worker indefinitely, and rotation backs off with jitter between
//! resolvers rather than hammering a flapping upstream.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver as AsyncResolver;

use crate::config::RunConfig;
use crate::model::{now_millis, DnsRecordBundle, QuestionType, ResolverEndpoint};
use crate::retry::{with_exponential_backoff, RetryConfig};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// A DNS resolution client configured with a pool of upstream resolvers, a
/// retry/rotation policy, the active question types, and an optional hosts
/// file override.
pub struct ResolverClient {
    resolvers: Vec<AsyncResolver>,
    max_retries: u32,
    question_types: Vec<QuestionType>,
    hosts_table: HashMap<String, Vec<IpAddr>>,
    trace_max_recursion: u32,
    retry_config: RetryConfig,
}

impl ResolverClient {
    /// Builds a client from the validated run configuration. Falls back to
    /// the system resolver configuration when no upstream resolvers were
    /// specified.
    pub async fn new(config: &RunConfig) -> Result<Self> {
        let resolvers = if config.resolvers.is_empty() {
            vec![AsyncResolver::tokio_from_system_conf()
                .context("failed to load system DNS configuration")?]
        } else {
            config
                .resolvers
                .iter()
                .map(build_resolver_for_endpoint)
                .collect::<Result<Vec<_>>>()?
        };

        let hosts_table = match &config.hosts_file {
            Some(path) => load_hosts_file(path).await?,
            None => HashMap::new(),
        };

        Ok(Self {
            resolvers,
            max_retries: config.retries.max(1),
            question_types: config.question_types.clone(),
            hosts_table,
            trace_max_recursion: config.trace_max_recursion,
            retry_config: RetryConfig {
                max_retries: config.retries.max(1),
                initial_backoff_ms: 50,
                backoff_factor: 2.0,
                max_backoff_ms: 1000,
                add_jitter: true,
            },
        })
    }

    /// Queries every configured question type for `name` and returns the
    /// union of successful answers. Returns `None` only when every endpoint
    /// failed to respond at all, for every question type (catastrophic
    /// failure); a name that simply has no records for any configured type
    /// still yields `Some` with empty answer lists.
    pub async fn query_multiple(&self, name: &str) -> Option<DnsRecordBundle> {
        if name.is_empty() {
            return None;
        }

        let mut bundle = DnsRecordBundle::new(name);
        let mut any_contact = false;
        let mut status_code: Option<u16> = None;
        let mut pinned = PinnedTypes::default();

        if let Some(ips) = self.hosts_table.get(name) {
            for ip in ips {
                match ip {
                    IpAddr::V4(v4) => {
                        bundle.a.push(v4.to_string());
                        pinned.a = true;
                    }
                    IpAddr::V6(v6) => {
                        bundle.aaaa.push(v6.to_string());
                        pinned.aaaa = true;
                    }
                }
            }
            any_contact = true;
        }

        for &qt in &self.question_types {
            if (qt == QuestionType::A && pinned.a) || (qt == QuestionType::Aaaa && pinned.aaaa) {
                continue;
            }
            let outcome = if qt == QuestionType::Ptr {
                self.query_ptr(name).await
            } else {
                self.query_typed(name, qt).await
            };

            match outcome {
                QueryOutcome::Answers(items, raw) => {
                    any_contact = true;
                    status_code.get_or_insert(0);
                    if !raw.is_empty() {
                        bundle.raw.get_or_insert_with(Vec::new).extend(raw);
                    }
                    extend_bundle(&mut bundle, qt, items);
                }
                QueryOutcome::NoRecords(code) => {
                    any_contact = true;
                    status_code.get_or_insert(code);
                }
                QueryOutcome::NoContact => {}
            }
        }

        if !any_contact {
            return None;
        }

        bundle.status_code = status_code.unwrap_or(0);
        bundle.timestamp_ms = now_millis();
        Some(bundle)
    }

    /// Captures the recursion chain from root to authoritative answer,
    /// bounded by `trace_max_recursion`. Each step records the NS set
    /// observed for a progressively longer suffix of `name`.
    pub async fn trace(&self, name: &str) -> Vec<DnsRecordBundle> {
        let labels: Vec<&str> = name.trim_end_matches('.').split('.').rev().collect();
        let mut steps = Vec::new();
        let mut suffix = String::new();

        for label in labels.into_iter().take(self.trace_max_recursion as usize) {
            suffix = if suffix.is_empty() {
                label.to_string()
            } else {
                format!("{}.{}", label, suffix)
            };

            let mut step = DnsRecordBundle::new(suffix.clone());
            if let QueryOutcome::Answers(items, raw) =
                self.query_typed(&suffix, QuestionType::Ns).await
            {
                step.ns = items;
                if !raw.is_empty() {
                    step.raw = Some(raw);
                }
            }
            step.timestamp_ms = now_millis();
            steps.push(step);
        }

        steps
    }

    async fn query_typed(&self, name: &str, qt: QuestionType) -> QueryOutcome {
        let record_type = match qt {
            QuestionType::A => RecordType::A,
            QuestionType::Aaaa => RecordType::AAAA,
            QuestionType::Cname => RecordType::CNAME,
            QuestionType::Soa => RecordType::SOA,
            QuestionType::Txt => RecordType::TXT,
            QuestionType::Mx => RecordType::MX,
            QuestionType::Ns => RecordType::NS,
            QuestionType::Ptr => unreachable!("PTR is handled by query_ptr"),
        };

        let outcome = self
            .with_rotation(|resolver| {
                let name = name.to_string();
                Box::pin(async move { resolver.lookup(name, record_type).await })
            })
            .await;

        match outcome {
            RawOutcome::Success(lookup) => {
                let (items, raw) = render_rdata(lookup);
                QueryOutcome::Answers(items, raw)
            }
            RawOutcome::NoRecords(code) => QueryOutcome::NoRecords(code),
            RawOutcome::NoContact => QueryOutcome::NoContact,
        }
    }

    async fn query_ptr(&self, name: &str) -> QueryOutcome {
        let Ok(ip) = name.parse::<IpAddr>() else {
            return QueryOutcome::NoContact;
        };

        let outcome = self
            .with_rotation(|resolver| Box::pin(async move { resolver.reverse_lookup(ip).await }))
            .await;

        match outcome {
            RawOutcome::Success(lookup) => {
                let items: Vec<String> = lookup.iter().map(|name| name.to_string()).collect();
                let raw = items.join("\n").into_bytes();
                QueryOutcome::Answers(items, raw)
            }
            RawOutcome::NoRecords(code) => QueryOutcome::NoRecords(code),
            RawOutcome::NoContact => QueryOutcome::NoContact,
        }
    }

    /// Runs `attempt` against each configured resolver in turn, rotating to
    /// the next resolver on every retry, via the shared exponential-backoff
    /// helper. A per-attempt timeout turns an unresponsive resolver into a
    /// retriable error rather than stalling the whole rotation; a definitive
    /// `NoRecordsFound` response is treated as non-retriable since it is a
    /// real answer, not a transient failure.
    async fn with_rotation<F, T>(&self, attempt: F) -> RawOutcome<T>
    where
        F: Fn(
            &AsyncResolver,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<T, ResolveError>> + Send + '_>,
        >,
    {
        let round = std::sync::atomic::AtomicUsize::new(0);

        let result: Result<T> = with_exponential_backoff(
            || async {
                let idx = round.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                    % self.resolvers.len();
                let resolver = &self.resolvers[idx];
                let outcome = tokio::time::timeout(QUERY_TIMEOUT, attempt(resolver))
                    .await
                    .context("resolver query timed out")?;
                outcome.map_err(anyhow::Error::from)
            },
            |err: &anyhow::Error| match err.downcast_ref::<ResolveError>() {
                Some(resolve_err) => {
                    !matches!(resolve_err.kind(), ResolveErrorKind::NoRecordsFound { .. })
                }
                None => true,
            },
            &self.retry_config,
        )
        .await;

        match result {
            Ok(value) => RawOutcome::Success(value),
            Err(err) => {
                if let Some(resolve_err) = err.downcast_ref::<ResolveError>() {
                    if let ResolveErrorKind::NoRecordsFound { response_code, .. } =
                        resolve_err.kind()
                    {
                        return RawOutcome::NoRecords(u16::from(*response_code));
                    }
                }
                debug!(
                    "resolver rotation exhausted after {} attempts: {}",
                    self.max_retries, err
                );
                RawOutcome::NoContact
            }
        }
    }
}

#[derive(Default)]
struct PinnedTypes {
    a: bool,
    aaaa: bool,
}

enum RawOutcome<T> {
    Success(T),
    NoRecords(u16),
    NoContact,
}

enum QueryOutcome {
    Answers(Vec<String>, Vec<u8>),
    NoRecords(u16),
    NoContact,
}

fn extend_bundle(bundle: &mut DnsRecordBundle, qt: QuestionType, items: Vec<String>) {
    match qt {
        QuestionType::A => bundle.a.extend(items),
        QuestionType::Aaaa => bundle.aaaa.extend(items),
        QuestionType::Cname => bundle.cname.extend(items),
        QuestionType::Ptr => bundle.ptr.extend(items),
        QuestionType::Mx => bundle.mx.extend(items),
        QuestionType::Ns => bundle.ns.extend(items),
        QuestionType::Soa => bundle.soa.extend(items),
        QuestionType::Txt => bundle.txt.extend(items),
    }
}

/// Renders each answer record to its display form and, separately, to the
/// raw byte string carried in `DnsRecordBundle.raw` for `--raw` output.
/// `trust-dns-resolver`'s `Lookup` doesn't expose the original wire bytes of
/// the response, so the raw form here is the newline-joined rendered
/// answers rather than a true on-the-wire encoding.
fn render_rdata(lookup: trust_dns_resolver::lookup::Lookup) -> (Vec<String>, Vec<u8>) {
    let items: Vec<String> = lookup
        .record_iter()
        .filter_map(|record| record.data())
        .map(|data| match data {
            RData::A(ip) => ip.to_string(),
            RData::AAAA(ip) => ip.to_string(),
            RData::CNAME(name) => name.to_string(),
            RData::NS(name) => name.to_string(),
            RData::MX(mx) => format!("{} {}", mx.preference(), mx.exchange()),
            RData::TXT(txt) => txt
                .txt_data()
                .iter()
                .map(|chunk| String::from_utf8_lossy(chunk).to_string())
                .collect::<Vec<_>>()
                .join(""),
            RData::SOA(soa) => format!(
                "{} {} {} {} {} {} {}",
                soa.mname(),
                soa.rname(),
                soa.serial(),
                soa.refresh(),
                soa.retry(),
                soa.expire(),
                soa.minimum()
            ),
            other => format!("{:?}", other),
        })
        .collect();
    let raw = items.join("\n").into_bytes();
    (items, raw)
}

fn build_resolver_for_endpoint(endpoint: &ResolverEndpoint) -> Result<AsyncResolver> {
    let ip: IpAddr = endpoint
        .host
        .parse()
        .with_context(|| format!("resolver '{}' is not a valid IP address", endpoint.host))?;

    let socket = SocketAddr::new(ip, endpoint.port);
    let group = NameServerConfigGroup::from_ips_clear(&[socket.ip()], socket.port(), true);
    let config = ResolverConfig::from_parts(None, Vec::new(), group);

    let mut opts = ResolverOpts::default();
    opts.timeout = QUERY_TIMEOUT;
    opts.attempts = 1;
    opts.cache_size = 0;

    Ok(AsyncResolver::tokio(config, opts))
}

async fn load_hosts_file(path: &Path) -> Result<HashMap<String, Vec<IpAddr>>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open hosts file override: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut table: HashMap<String, Vec<IpAddr>> = HashMap::new();
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(addr_str) = parts.next() else {
            continue;
        };
        let Ok(addr) = addr_str.parse::<IpAddr>() else {
            warn!("skipping malformed hosts-file line: {}", trimmed);
            continue;
        };
        for host in parts {
            table
                .entry(host.to_ascii_lowercase())
                .or_default()
                .push(addr);
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_bundle_routes_by_question_type() {
        let mut bundle = DnsRecordBundle::new("example.test");
        extend_bundle(&mut bundle, QuestionType::A, vec!["1.2.3.4".to_string()]);
        extend_bundle(&mut bundle, QuestionType::Txt, vec!["v=spf1".to_string()]);
        assert_eq!(bundle.a, vec!["1.2.3.4"]);
        assert_eq!(bundle.txt, vec!["v=spf1"]);
        assert!(bundle.aaaa.is_empty());
    }

    #[tokio::test]
    async fn hosts_file_override_is_consulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        tokio::fs::write(&path, b"127.0.0.1 internal.test\n# comment\n")
            .await
            .unwrap();

        let table = load_hosts_file(&path).await.unwrap();
        assert_eq!(table.get("internal.test").map(|v| v.len()), Some(1usize));
    }

    #[tokio::test]
    async fn malformed_hosts_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        tokio::fs::write(&path, b"not-an-ip broken.test\n127.0.0.1 ok.test\n")
            .await
            .unwrap();

        let table = load_hosts_file(&path).await.unwrap();
        assert!(!table.contains_key("broken.test"));
        assert!(table.contains_key("ok.test"));
    }
}
