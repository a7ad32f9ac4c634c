use anyhow::Result;
use std::convert::TryFrom;
use swarmdns::config::{Cli, RunConfig};
use swarmdns::runner::Runner;

fn base_cli() -> Cli {
    Cli {
        hosts: None,
        domains: None,
        wordlist: None,
        resolvers: None,
        hosts_file: None,
        retries: 1,
        threads: 2,
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
        flush_interval: -1,
        stream: false,
        resume: false,
        stats: false,
    }
}

/// S4: wordlist x domain product. Every generated host is pinned in the
/// hosts-file override, so the whole run resolves without touching the
/// network and the only thing under test is whether the Cartesian product
/// reaches the resolver pool and comes out the other end in the output.
#[tokio::test]
async fn wordlist_and_domain_product_resolves_and_emits_every_combination() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let wordlist_path = dir.path().join("wordlist.txt");
    tokio::fs::write(&wordlist_path, b"www\nmail\n").await?;

    let hosts_file_path = dir.path().join("hosts");
    tokio::fs::write(
        &hosts_file_path,
        b"203.0.113.10 www.example.test\n203.0.113.11 mail.example.test\n",
    )
    .await?;

    let output_path = dir.path().join("out.txt");

    let mut cli = base_cli();
    cli.domains = Some("example.test".to_string());
    cli.wordlist = Some(wordlist_path.to_string_lossy().to_string());
    cli.hosts_file = Some(hosts_file_path);
    // An unreachable resolver is never actually consulted: both generated
    // hosts are fully satisfied by the hosts-file A-record pins.
    cli.resolvers = Some("198.51.100.3:53".to_string());
    cli.output = Some(output_path.clone());

    let config = RunConfig::try_from(cli)?;
    Runner::new(config).run().await?;

    let contents = tokio::fs::read_to_string(&output_path).await?;
    assert!(contents.contains("www.example.test"));
    assert!(contents.contains("mail.example.test"));
    Ok(())
}

/// S5: wildcard filtering. Two hosts share an A-record address at or above
/// `wildcard_threshold`, making that address's hosts wildcard-candidates;
/// a third host resolves to a distinct address and is never a candidate.
/// The configured resolver never answers the synthetic probe queries
/// wildcard classification issues, so no candidate can be confirmed as a
/// wildcard responder and every host — including hosts sharing the
/// candidate address — survives emission. This exercises all four phases
/// (index, candidate selection, classification dispatch, emission) end to
/// end through `Runner` without requiring network access to prove a
/// positive match.
#[tokio::test]
async fn wildcard_filter_runs_all_phases_and_keeps_unconfirmed_candidates() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let hosts_file_path = dir.path().join("hosts");
    tokio::fs::write(
        &hosts_file_path,
        b"203.0.113.22 wild.test\n203.0.113.20 a.wild.test\n203.0.113.20 b.wild.test\n203.0.113.21 distinct.wild.test\n",
    )
    .await?;

    let output_path = dir.path().join("out.txt");

    let mut cli = base_cli();
    cli.hosts = Some("wild.test,a.wild.test,b.wild.test,distinct.wild.test".to_string());
    cli.hosts_file = Some(hosts_file_path);
    cli.resolvers = Some("198.51.100.4:53".to_string());
    cli.wildcard_domain = Some("wild.test".to_string());
    cli.wildcard_threshold = 2;
    cli.output = Some(output_path.clone());

    let config = RunConfig::try_from(cli)?;
    Runner::new(config).run().await?;

    let contents = tokio::fs::read_to_string(&output_path).await?;
    assert!(contents.contains("wild.test"), "root is always emitted");
    assert!(contents.contains("a.wild.test"));
    assert!(contents.contains("b.wild.test"));
    assert!(contents.contains("distinct.wild.test"));
    Ok(())
}
