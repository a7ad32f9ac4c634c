//! Input materialization: turns CLI-level sources into a concrete host set
//!
//! Two modes, both applying the same per-line expansion rules:
//!
//! - `prepare()` (batch mode) reads every configured source to completion,
//!   expands CIDRs and wordlist x domain products, and inserts each unique
//!   host into the [`HostStore`] so the pipeline knows its total size and
//!   can resume a partial run.
//! - `stream()` pushes each produced host directly onto the work channel as
//!   it is read, without touching the store — no pre-count, no resume.
//!
//! Both read with a `BufReader` + `read_line` loop, trimming and skipping
//! blank/comment lines, rather than loading a source fully into memory.

use anyhow::{Context, Result};
use ipnetwork::IpNetwork;
use std::path::Path;
use std::str::FromStr;
use tokio::fs::File;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::host_store::HostStore;

/// Reads configured input sources and expands them into concrete hosts.
pub struct InputMaterializer<'a> {
    config: &'a RunConfig,
}

impl<'a> InputMaterializer<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Batch mode: reads every configured source to completion, inserting
    /// each unique expanded host into `store`. Returns the number of hosts
    /// actually inserted (duplicates count once).
    pub async fn prepare(&self, store: &HostStore) -> Result<u64> {
        let wordlist = match &self.config.wordlist {
            Some(path) => Some(load_wordlist(path).await?),
            None => None,
        };

        let mut inserted: u64 = 0;

        if let Some(domains) = &self.config.domains {
            inserted += self
                .materialize_source(domains, wordlist.as_deref(), store)
                .await?;
        }

        if let Some(hosts) = &self.config.hosts {
            inserted += self.materialize_source(hosts, None, store).await?;
        }

        if self.config.domains.is_none() && self.config.hosts.is_none() {
            inserted += self
                .materialize_reader(stdin(), wordlist.as_deref(), store)
                .await?;
        }

        info!("materialized {} unique hosts", inserted);
        Ok(inserted)
    }

    /// Stream mode: identical per-line expansion, but each host goes
    /// straight onto `tx` with no store insertion or counting.
    pub async fn stream(&self, tx: Sender<String>) -> Result<()> {
        let wordlist = match &self.config.wordlist {
            Some(path) => Some(load_wordlist(path).await?),
            None => None,
        };

        let source = self
            .config
            .domains
            .as_deref()
            .or(self.config.hosts.as_deref());

        match source {
            Some(spec) if spec == "-" => {
                self.stream_reader(stdin(), wordlist.as_deref(), &tx).await
            }
            Some(spec) if Path::new(spec).is_file() => {
                let file = File::open(spec)
                    .await
                    .with_context(|| format!("failed to open input file: {}", spec))?;
                self.stream_reader(BufReader::new(file), wordlist.as_deref(), &tx)
                    .await
            }
            Some(inline) => {
                for line in inline.replace(',', "\n").lines() {
                    self.emit_expanded(line, wordlist.as_deref(), &tx).await?;
                }
                Ok(())
            }
            None => self.stream_reader(stdin(), wordlist.as_deref(), &tx).await,
        }
    }

    async fn materialize_source(
        &self,
        spec: &str,
        wordlist: Option<&[String]>,
        store: &HostStore,
    ) -> Result<u64> {
        if spec == "-" {
            return self.materialize_reader(stdin(), wordlist, store).await;
        }
        if Path::new(spec).is_file() {
            let file = File::open(spec)
                .await
                .with_context(|| format!("failed to open input file: {}", spec))?;
            return self
                .materialize_reader(BufReader::new(file), wordlist, store)
                .await;
        }

        let mut inserted = 0u64;
        for line in spec.replace(',', "\n").lines() {
            inserted += self.expand_and_insert(line, wordlist, store).await?;
        }
        Ok(inserted)
    }

    async fn materialize_reader<R: tokio::io::AsyncRead + Unpin>(
        &self,
        reader: R,
        wordlist: Option<&[String]>,
        store: &HostStore,
    ) -> Result<u64> {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut inserted = 0u64;

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                break;
            }
            inserted += self.expand_and_insert(&line, wordlist, store).await?;
        }

        Ok(inserted)
    }

    async fn stream_reader<R: tokio::io::AsyncRead + Unpin>(
        &self,
        reader: R,
        wordlist: Option<&[String]>,
        tx: &Sender<String>,
    ) -> Result<()> {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                break;
            }
            self.emit_expanded(&line, wordlist, tx).await?;
        }

        Ok(())
    }

    async fn expand_and_insert(
        &self,
        raw_line: &str,
        wordlist: Option<&[String]>,
        store: &HostStore,
    ) -> Result<u64> {
        let mut inserted = 0u64;
        for host in expand_line(raw_line, wordlist) {
            if !store.has(&host) {
                store.put(&host, Vec::new()).await?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn emit_expanded(
        &self,
        raw_line: &str,
        wordlist: Option<&[String]>,
        tx: &Sender<String>,
    ) -> Result<()> {
        for host in expand_line(raw_line, wordlist) {
            if tx.send(host).await.is_err() {
                debug!("work channel closed early, stopping stream ingestion");
                break;
            }
        }
        Ok(())
    }
}

/// Applies the per-line expansion rules: wordlist product, else CIDR
/// expansion, else the line verbatim.
fn expand_line(raw_line: &str, wordlist: Option<&[String]>) -> Vec<String> {
    let line = raw_line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Vec::new();
    }

    if let Some(prefixes) = wordlist {
        return prefixes
            .iter()
            .map(|prefix| format!("{}.{}", prefix, line))
            .collect();
    }

    if let Ok(network) = IpNetwork::from_str(line) {
        return network.iter().map(|ip| ip.to_string()).collect();
    }

    vec![line.to_string()]
}

async fn load_wordlist(path: &str) -> Result<Vec<String>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("failed to open wordlist: {}", path))?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let mut prefixes = Vec::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            prefixes.push(trimmed.to_string());
        }
    }

    Ok(prefixes)
}
