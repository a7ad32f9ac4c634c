//! Broad failure categories
//!
//! `ErrorKind` is attached to an `anyhow::Error` via `.context(ErrorKind::X)`
//! at the point a failure is first classified, so a caller further up the
//! stack can recover the category with `.downcast_ref::<ErrorKind>()`
//! without parsing the error's message text.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid CLI flags or configuration discovered before any worker
    /// starts.
    Configuration,
    /// A transient failure in a retried or concurrency-bounded operation
    /// (resolver contact, rate-limit permits) that a caller might retry.
    Transient,
    /// A host store read/write/spill failure.
    Storage,
    /// An output sink (file or stdout) write/flush failure.
    OutputIo,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Transient => "transient error",
            ErrorKind::Storage => "storage error",
            ErrorKind::OutputIo => "output I/O error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_ref_recovers_the_attached_kind() {
        let err = anyhow::anyhow!("disk full").context(ErrorKind::Storage);
        assert_eq!(err.downcast_ref::<ErrorKind>(), Some(&ErrorKind::Storage));
    }

    #[test]
    fn missing_kind_downcasts_to_none() {
        let err = anyhow::anyhow!("no category attached");
        assert_eq!(err.downcast_ref::<ErrorKind>(), None);
    }
}
