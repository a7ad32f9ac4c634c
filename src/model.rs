//! Shared data types for the resolution pipeline
//!
//! This module defines the plain, serializable structures that flow between
//! every stage of the pipeline: the normalized host, the per-host DNS answer
//! bundle, the upstream resolver endpoint, and the small persisted resume
//! record. Keeping these types free of behavior (beyond basic parsing/display
//! helpers) lets every other module depend on them without circular imports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A DNS record class that can be queried for a host.
///
/// Mirrors the question types a resolver can be asked about; `Default`
/// yields `A` since that is the fallback the resolver client applies when no
/// question types are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    A,
    Aaaa,
    Cname,
    Ptr,
    Soa,
    Txt,
    Mx,
    Ns,
}

impl QuestionType {
    pub fn all() -> [QuestionType; 8] {
        [
            QuestionType::A,
            QuestionType::Aaaa,
            QuestionType::Cname,
            QuestionType::Ptr,
            QuestionType::Soa,
            QuestionType::Txt,
            QuestionType::Mx,
            QuestionType::Ns,
        ]
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionType::A => "A",
            QuestionType::Aaaa => "AAAA",
            QuestionType::Cname => "CNAME",
            QuestionType::Ptr => "PTR",
            QuestionType::Soa => "SOA",
            QuestionType::Txt => "TXT",
            QuestionType::Mx => "MX",
            QuestionType::Ns => "NS",
        };
        f.write_str(s)
    }
}

/// A canonicalized upstream resolver address.
///
/// `scheme` is currently informational (the resolver client only speaks
/// plain UDP/TCP DNS) but is retained so a future DoT/DoH upstream can be
/// expressed without changing the wire format of `--resolvers` files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverEndpoint {
    pub host: String,
    pub port: u16,
    pub scheme: Option<String>,
}

impl ResolverEndpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 53,
            scheme: None,
        }
    }
}

impl std::str::FromStr for ResolverEndpoint {
    type Err = anyhow::Error;

    /// Parses `host`, `host:port`, or `scheme://host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            anyhow::bail!("empty resolver endpoint");
        }

        let (scheme, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (Some(scheme.to_string()), rest),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port: u16 = port_str
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid resolver port in '{}'", s))?;
                (host.to_string(), port)
            }
            None => (rest.to_string(), 53),
        };

        if host.is_empty() {
            anyhow::bail!("empty resolver host in '{}'", s);
        }

        Ok(Self { host, port, scheme })
    }
}

/// The result of resolving a single host.
///
/// Timestamp is recorded as milliseconds since the Unix epoch (a zero value,
/// per the resolver-client contract, marks a bundle to be discarded by the
/// pool). `raw` carries the opaque wire bytes when raw-output mode is
/// enabled; it is cleared by the pool otherwise to avoid needlessly growing
/// the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsRecordBundle {
    pub host: String,
    pub timestamp_ms: u64,
    pub status_code: u16,
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    pub cname: Vec<String>,
    pub ptr: Vec<String>,
    pub mx: Vec<String>,
    pub ns: Vec<String>,
    pub soa: Vec<String>,
    pub txt: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<DnsRecordBundle>>,
}

impl DnsRecordBundle {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            timestamp_ms: now_millis(),
            ..Default::default()
        }
    }

    /// A bundle is discardable when it carries no identity: an empty host or
    /// a zero timestamp.
    pub fn is_discardable(&self) -> bool {
        self.host.is_empty() || self.timestamp_ms == 0
    }

    /// Returns the answer items for a given question type, for the per-type
    /// emitter in the resolver pool.
    pub fn items_for(&self, qt: QuestionType) -> &[String] {
        match qt {
            QuestionType::A => &self.a,
            QuestionType::Aaaa => &self.aaaa,
            QuestionType::Cname => &self.cname,
            QuestionType::Ptr => &self.ptr,
            QuestionType::Mx => &self.mx,
            QuestionType::Ns => &self.ns,
            QuestionType::Soa => &self.soa,
            QuestionType::Txt => &self.txt,
        }
    }

    /// Serializes the bundle to the opaque byte string the HostStore
    /// persists.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_record_bundle_round_trips_every_field_through_bytes() {
        let mut bundle = DnsRecordBundle::new("example.test");
        bundle.status_code = 3;
        bundle.a = vec!["1.2.3.4".to_string()];
        bundle.aaaa = vec!["::1".to_string()];
        bundle.cname = vec!["alias.example.test".to_string()];
        bundle.ptr = vec!["host.example.test".to_string()];
        bundle.mx = vec!["10 mail.example.test".to_string()];
        bundle.ns = vec!["ns1.example.test".to_string()];
        bundle.soa = vec!["ns1.example.test admin.example.test 1 2 3 4 5".to_string()];
        bundle.txt = vec!["v=spf1 -all".to_string()];
        bundle.raw = Some(vec![0xde, 0xad, 0xbe, 0xef]);
        bundle.trace = Some(vec![DnsRecordBundle::new("test")]);

        let bytes = bundle.to_bytes().unwrap();
        let restored = DnsRecordBundle::from_bytes(&bytes).unwrap();

        assert_eq!(restored.host, bundle.host);
        assert_eq!(restored.timestamp_ms, bundle.timestamp_ms);
        assert_eq!(restored.status_code, bundle.status_code);
        assert_eq!(restored.a, bundle.a);
        assert_eq!(restored.aaaa, bundle.aaaa);
        assert_eq!(restored.cname, bundle.cname);
        assert_eq!(restored.ptr, bundle.ptr);
        assert_eq!(restored.mx, bundle.mx);
        assert_eq!(restored.ns, bundle.ns);
        assert_eq!(restored.soa, bundle.soa);
        assert_eq!(restored.txt, bundle.txt);
        assert_eq!(restored.raw, bundle.raw);
        assert_eq!(
            restored.trace.as_ref().map(|t| t.len()),
            bundle.trace.as_ref().map(|t| t.len())
        );
        assert_eq!(
            restored.trace.as_ref().unwrap()[0].host,
            bundle.trace.as_ref().unwrap()[0].host
        );
    }

    #[test]
    fn dns_record_bundle_omits_none_fields_from_serialized_form() {
        let bundle = DnsRecordBundle::new("bare.test");
        let bytes = bundle.to_bytes().unwrap();
        let json = String::from_utf8(bytes).unwrap();
        assert!(!json.contains("\"raw\""));
        assert!(!json.contains("\"trace\""));
    }
}

/// The persisted (index, resume_from) pair written at shutdown and read back
/// in when `--resume` is set. Only meaningful in batch mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeState {
    pub index: u64,
    pub resume_from: String,
}
