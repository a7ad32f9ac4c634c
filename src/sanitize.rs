//! Output line sanitization
//!
//! Strips control characters from a line before it reaches standard output
//! or the output file, so a malformed DNS answer (an A record can carry
//! arbitrary bytes up to validation elsewhere) cannot smuggle terminal
//! escapes or embedded newlines into the operator's output stream.

/// Removes control characters (including CR/LF) from `line`.
pub fn sanitize_line(line: &str) -> String {
    line.chars().filter(|c| !c.is_control()).collect()
}
