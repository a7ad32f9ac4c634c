//! Command-line interface and validated run configuration
//!
//! This module provides the command-line surface for swarmdns using the
//! clap framework, and the single validated `RunConfig` every other
//! component is built from, featuring:
//!
//! - Declarative flag parsing with per-flag documentation
//! - Cross-flag validation performed once, before any worker starts
//! - A small typed `ConfigError` so the runner can tell configuration
//!   failures (fatal, pre-startup) apart from every other error kind
//!
//! # Security Considerations
//!
//! - **Input Validation**: resolver lists and rcode filters are parsed and
//!   validated here so malformed values never reach the resolver pool.
//! - **Resource Limits**: `threads` and `rate_limit` bound the concurrency
//!   and query rate of the whole run.
//!
//! # Usage
//!
//! ```no_run
//! use swarmdns::config::{Cli, RunConfig};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! let config = RunConfig::try_from(cli)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use crate::model::{QuestionType, ResolverEndpoint};

/// Command-line interface for swarmdns.
///
/// Unlike a request/response tool, a bulk resolver has one flat mode of
/// operation (resolve everything, filter, emit) rather than
/// subcommand-separated verbs, so every flag below applies to a single run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "swarmdns",
    about = "Concurrent bulk DNS resolution and subdomain enumeration engine",
    version
)]
pub struct Cli {
    /// Host/IP/CIDR list: file path, inline value, or `-` for stdin
    #[arg(short = 'l', long = "hosts")]
    pub hosts: Option<String>,

    /// Base domain list, used alone or with --wordlist for the Cartesian
    /// product: file path, inline value, or `-` for stdin
    #[arg(short = 'd', long = "domains")]
    pub domains: Option<String>,

    /// Subdomain prefix wordlist: file path, inline value, or `-` for stdin
    #[arg(short = 'w', long = "wordlist")]
    pub wordlist: Option<String>,

    /// Upstream resolvers: comma-separated list, or a file path (one per
    /// line); empty uses the resolver library's defaults
    #[arg(short = 'r', long = "resolvers")]
    pub resolvers: Option<String>,

    /// Override hosts-file path consulted before any network query
    #[arg(long = "hosts-file")]
    pub hosts_file: Option<PathBuf>,

    /// Resolver rotations attempted per question type before giving up
    #[arg(long = "retries", default_value = "2")]
    pub retries: u32,

    /// Worker-pool size for concurrent resolution
    #[arg(short = 't', long = "threads", default_value = "25")]
    pub threads: usize,

    /// Queries per second across the whole process; 0 means unlimited
    #[arg(long = "rate-limit", default_value = "0")]
    pub rate_limit: u64,

    /// Query A records
    #[arg(short = 'a', long = "a")]
    pub a: bool,
    /// Query AAAA records
    #[arg(long = "aaaa")]
    pub aaaa: bool,
    /// Query CNAME records
    #[arg(long = "cname")]
    pub cname: bool,
    /// Query PTR records
    #[arg(long = "ptr")]
    pub ptr: bool,
    /// Query SOA records
    #[arg(long = "soa")]
    pub soa: bool,
    /// Query TXT records
    #[arg(long = "txt")]
    pub txt: bool,
    /// Query MX records
    #[arg(long = "mx")]
    pub mx: bool,
    /// Query NS records
    #[arg(long = "ns")]
    pub ns: bool,

    /// Emit each result as a JSON object
    #[arg(long = "json")]
    pub json: bool,

    /// Emit the raw wire response instead of formatted records
    #[arg(long = "raw")]
    pub raw: bool,

    /// Emit `<host> [<item>]` instead of presence-only output
    #[arg(long = "resp")]
    pub resp: bool,

    /// Emit only the lowercased item, one per line, instead of the host
    #[arg(long = "resp-only")]
    pub resp_only: bool,

    /// Restrict output to these response codes (comma-separated RCODE names)
    #[arg(long = "rcode")]
    pub rcode: Option<String>,

    /// Capture the recursion chain from root to authoritative answer
    #[arg(long = "trace")]
    pub trace: bool,

    /// Maximum recursion depth captured by --trace
    #[arg(long = "trace-max-recursion", default_value = "10")]
    pub trace_max_recursion: u32,

    /// Parent domain under which wildcard responses are detected and removed
    #[arg(long = "wildcard-domain")]
    pub wildcard_domain: Option<String>,

    /// Minimum number of hosts sharing an address before it is treated as a
    /// wildcard-candidate anchor
    #[arg(long = "wildcard-threshold", default_value = "5")]
    pub wildcard_threshold: usize,

    /// Append results to this file in addition to standard output
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Seconds between periodic output-file flushes; negative disables
    #[arg(long = "flush-interval", default_value = "5")]
    pub flush_interval: i64,

    /// Stream hosts directly to the resolver pool, bypassing the host store
    /// (no de-duplication count, no resume support)
    #[arg(long = "stream")]
    pub stream: bool,

    /// Resume a previous batch run from its saved position
    #[arg(long = "resume")]
    pub resume: bool,

    /// Log a run summary (hosts materialized, queries issued, wildcards
    /// removed) at shutdown
    #[arg(long = "stats")]
    pub stats: bool,
}

/// Configuration errors: conflicting flags, missing inputs, unreadable
/// resolver files. Every variant is fatal and surfaces before any worker
/// starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--stream and --resume cannot be combined: resume requires batch mode")]
    StreamAndResume,
    #[error("no input provided: specify --hosts, --domains, or pipe input on stdin")]
    InputMissing,
    #[error("--wildcard-domain cannot be empty")]
    EmptyWildcardDomain,
    #[error("--wildcard-threshold must be at least 1")]
    WildcardThresholdZero,
    #[error("--threads must be at least 1")]
    ThreadsZero,
    #[error("unknown response code name: {0}")]
    UnknownRcode(String),
    #[error("failed to parse resolver endpoint: {0}")]
    InvalidResolver(#[from] anyhow::Error),
}

/// How a single question type's answers are formatted for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitStyle {
    /// Emit the domain once if any answer exists, then stop.
    Presence,
    /// Emit `<domain> [<item>]` per answer.
    Response,
    /// Emit only the lowercased item per answer.
    ResponseOnly,
}

/// The validated, immutable configuration every component is built from.
/// Constructing it is the only place cross-flag validation happens; once
/// built, no component needs to re-check flag combinations.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub hosts: Option<String>,
    pub domains: Option<String>,
    pub wordlist: Option<String>,
    pub resolvers: Vec<ResolverEndpoint>,
    pub hosts_file: Option<PathBuf>,
    pub retries: u32,
    pub threads: usize,
    pub rate_limit: u64,
    pub question_types: Vec<QuestionType>,
    pub json: bool,
    pub raw: bool,
    pub emit_style: EmitStyle,
    pub rcode_filter: Option<HashSet<u16>>,
    pub trace: bool,
    pub trace_max_recursion: u32,
    pub wildcard_domain: Option<String>,
    pub wildcard_threshold: usize,
    pub output: Option<PathBuf>,
    pub flush_interval: i64,
    pub stream: bool,
    pub resume: bool,
    pub stats: bool,
}

impl TryFrom<Cli> for RunConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.stream && cli.resume {
            return Err(ConfigError::StreamAndResume);
        }

        if cli.hosts.is_none() && cli.domains.is_none() && !cli.stream && !stdin_is_usable() {
            return Err(ConfigError::InputMissing);
        }

        if let Some(ref wd) = cli.wildcard_domain {
            if wd.trim().is_empty() {
                return Err(ConfigError::EmptyWildcardDomain);
            }
        }

        if cli.wildcard_domain.is_some() && cli.wildcard_threshold == 0 {
            return Err(ConfigError::WildcardThresholdZero);
        }

        if cli.threads == 0 {
            return Err(ConfigError::ThreadsZero);
        }

        let resolvers = parse_resolvers(cli.resolvers.as_deref())?;

        let mut question_types = Vec::new();
        if cli.a {
            question_types.push(QuestionType::A);
        }
        if cli.aaaa {
            question_types.push(QuestionType::Aaaa);
        }
        if cli.cname {
            question_types.push(QuestionType::Cname);
        }
        if cli.ptr {
            question_types.push(QuestionType::Ptr);
        }
        if cli.soa {
            question_types.push(QuestionType::Soa);
        }
        if cli.txt {
            question_types.push(QuestionType::Txt);
        }
        if cli.mx {
            question_types.push(QuestionType::Mx);
        }
        if cli.ns {
            question_types.push(QuestionType::Ns);
        }

        // Wildcard filtering only ever needs the A record, regardless of
        // what the operator asked for; an empty selection also falls back
        // to A.
        if cli.wildcard_domain.is_some() || question_types.is_empty() {
            question_types = vec![QuestionType::A];
        }

        let rcode_filter = match cli.rcode {
            Some(ref list) => Some(parse_rcode_filter(list)?),
            None => None,
        };

        let emit_style = if cli.resp_only {
            EmitStyle::ResponseOnly
        } else if cli.resp {
            EmitStyle::Response
        } else {
            EmitStyle::Presence
        };

        Ok(RunConfig {
            hosts: cli.hosts,
            domains: cli.domains,
            wordlist: cli.wordlist,
            resolvers,
            hosts_file: cli.hosts_file,
            retries: cli.retries,
            threads: cli.threads,
            rate_limit: cli.rate_limit,
            question_types,
            json: cli.json,
            raw: cli.raw,
            emit_style,
            rcode_filter,
            trace: cli.trace,
            trace_max_recursion: cli.trace_max_recursion,
            wildcard_domain: cli.wildcard_domain,
            wildcard_threshold: cli.wildcard_threshold,
            output: cli.output,
            flush_interval: cli.flush_interval,
            stream: cli.stream,
            resume: cli.resume,
            stats: cli.stats,
        })
    }
}

fn stdin_is_usable() -> bool {
    use std::io::IsTerminal;
    !std::io::stdin().is_terminal()
}

fn parse_resolvers(spec: Option<&str>) -> Result<Vec<ResolverEndpoint>, ConfigError> {
    let Some(spec) = spec else {
        return Ok(Vec::new());
    };
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(Vec::new());
    }

    let contents = if spec.contains(',') || !PathBuf::from(spec).exists() {
        spec.to_string()
    } else {
        std::fs::read_to_string(spec)
            .map_err(|e| ConfigError::InvalidResolver(anyhow::anyhow!(e)))?
    };

    contents
        .split(|c| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ResolverEndpoint::from_str)
        .map(|r| r.map_err(ConfigError::InvalidResolver))
        .collect()
}

fn parse_rcode_filter(list: &str) -> Result<HashSet<u16>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            rcode_from_name(name).ok_or_else(|| ConfigError::UnknownRcode(name.to_string()))
        })
        .collect()
}

/// Maps an RCODE name to its numeric value, per RFC 1035 / RFC 2136.
pub fn rcode_from_name(name: &str) -> Option<u16> {
    Some(match name.to_ascii_uppercase().as_str() {
        "NOERROR" => 0,
        "FORMERR" => 1,
        "SERVFAIL" => 2,
        "NXDOMAIN" => 3,
        "NOTIMP" => 4,
        "REFUSED" => 5,
        "YXDOMAIN" => 6,
        "YXRRSET" => 7,
        "NXRRSET" => 8,
        "NOTAUTH" => 9,
        "NOTZONE" => 10,
        _ => return None,
    })
}

/// Maps an RCODE numeric value back to its name for `--rcode` mode output.
pub fn rcode_name(code: u16) -> &'static str {
    match code {
        0 => "NOERROR",
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        6 => "YXDOMAIN",
        7 => "YXRRSET",
        8 => "NXRRSET",
        9 => "NOTAUTH",
        10 => "NOTZONE",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            hosts: Some("example.com".to_string()),
            domains: None,
            wordlist: None,
            resolvers: None,
            hosts_file: None,
            retries: 2,
            threads: 10,
            rate_limit: 0,
            a: false,
            aaaa: false,
            cname: false,
            ptr: false,
            soa: false,
            txt: false,
            mx: false,
            ns: false,
            json: false,
            raw: false,
            resp: false,
            resp_only: false,
            rcode: None,
            trace: false,
            trace_max_recursion: 10,
            wildcard_domain: None,
            wildcard_threshold: 5,
            output: None,
            flush_interval: 5,
            stream: false,
            resume: false,
            stats: false,
        }
    }

    #[test]
    fn rejects_stream_and_resume() {
        let mut cli = base_cli();
        cli.stream = true;
        cli.resume = true;
        assert!(matches!(
            RunConfig::try_from(cli),
            Err(ConfigError::StreamAndResume)
        ));
    }

    #[test]
    fn rejects_empty_wildcard_domain() {
        let mut cli = base_cli();
        cli.wildcard_domain = Some("   ".to_string());
        assert!(matches!(
            RunConfig::try_from(cli),
            Err(ConfigError::EmptyWildcardDomain)
        ));
    }

    #[test]
    fn rejects_zero_threads() {
        let mut cli = base_cli();
        cli.threads = 0;
        assert!(matches!(
            RunConfig::try_from(cli),
            Err(ConfigError::ThreadsZero)
        ));
    }

    #[test]
    fn defaults_to_a_when_no_question_type_selected() {
        let cli = base_cli();
        let config = RunConfig::try_from(cli).unwrap();
        assert_eq!(config.question_types, vec![QuestionType::A]);
    }

    #[test]
    fn non_wildcard_mode_keeps_requested_types() {
        let mut cli = base_cli();
        cli.aaaa = true;
        cli.txt = true;
        let config = RunConfig::try_from(cli).unwrap();
        assert_eq!(config.question_types, vec![QuestionType::Aaaa, QuestionType::Txt]);
    }

    #[test]
    fn wildcard_mode_forces_a_only() {
        let mut cli = base_cli();
        cli.aaaa = true;
        cli.txt = true;
        cli.wildcard_domain = Some("x.test".to_string());
        let config = RunConfig::try_from(cli).unwrap();
        assert_eq!(config.question_types, vec![QuestionType::A]);
    }

    #[test]
    fn emit_style_prefers_resp_only() {
        let mut cli = base_cli();
        cli.resp = true;
        cli.resp_only = true;
        let config = RunConfig::try_from(cli).unwrap();
        assert_eq!(config.emit_style, EmitStyle::ResponseOnly);
    }

    #[test]
    fn parses_rcode_filter() {
        let mut cli = base_cli();
        cli.rcode = Some("NXDOMAIN, servfail".to_string());
        let config = RunConfig::try_from(cli).unwrap();
        let filter = config.rcode_filter.unwrap();
        assert!(filter.contains(&3));
        assert!(filter.contains(&2));
    }

    #[test]
    fn rejects_unknown_rcode() {
        let mut cli = base_cli();
        cli.rcode = Some("NOTAREALCODE".to_string());
        assert!(matches!(
            RunConfig::try_from(cli),
            Err(ConfigError::UnknownRcode(_))
        ));
    }
}
