//! Log sanitization for patient-identifying content.
//!
//! Formatted log lines can carry fragments of clinical payloads: the
//! base64-encoded feature vectors handed to model scripts, patient contact
//! details echoed back in subprocess stderr, French social security numbers
//! (NIR) typed into free-text fields. This module scrubs those patterns from
//! log output before it reaches a sink.
//!
//! String scrubbing is a fallback layer: the primary protection is keeping
//! sensitive values out of logging calls in the first place. Prediction
//! payloads are logged by visit id only, never by content.
//!
//! `sanitize()` caps the bytes it scans per call (see
//! `PREVOIR_SANITIZE_MAX_BYTES`) so a runaway subprocess dumping megabytes to
//! stderr cannot turn logging into a CPU sink.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static PII_PATTERNS: OnceLock<PiiPatterns> = OnceLock::new();

/// Maximum number of bytes to sanitize per call.
///
/// Defaults to 16 KiB; can be overridden via `PREVOIR_SANITIZE_MAX_BYTES`.
const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

struct PiiPattern {
    regex: Regex,
    replacement: &'static str,
}

struct PiiPatterns {
    set: RegexSet,
    patterns: Vec<PiiPattern>,
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }

    // Ensure we don't panic on UTF-8 boundaries.
    let mut end = max_bytes.min(input.len());
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

fn max_sanitize_bytes() -> usize {
    std::env::var("PREVOIR_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn get_patterns() -> &'static PiiPatterns {
    PII_PATTERNS.get_or_init(|| {
        // The `regex` crate is linear-time, but scanning large strings is
        // still CPU work; patterns stay simple and input size is capped.
        let rules: Vec<(&'static str, &'static str)> = vec![
            // French NIR (social security number): 13 digits plus a 2-digit
            // key, with or without the usual spacing.
            (
                r"\b[12]\s?\d{2}\s?(?:0[1-9]|1[0-2])\s?(?:\d{2}|2[AB])\s?\d{3}\s?\d{3}\s?\d{2}\b",
                "[REDACTED-NIR]",
            ),
            // Email addresses (bounded labels; case-insensitive).
            (
                r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
                "[REDACTED-EMAIL]",
            ),
            // French phone numbers (0X or +33 forms).
            (
                r"\b(?:\+33\s?|0)[1-9](?:[\s.-]?\d{2}){4}\b",
                "[REDACTED-PHONE]",
            ),
            // Long base64 runs: encoded feature payloads that leak every
            // clinical value of a visit if printed.
            (
                r"\b[A-Za-z0-9+/]{64,}={0,2}",
                "[REDACTED-PAYLOAD]",
            ),
        ];

        let set = RegexSet::new(rules.iter().map(|(p, _)| *p)).expect("Valid regex set");
        let patterns = rules
            .into_iter()
            .map(|(pattern, replacement)| PiiPattern {
                regex: Regex::new(pattern).expect("Valid regex"),
                replacement,
            })
            .collect();

        PiiPatterns { set, patterns }
    })
}

/// Sanitize a string by replacing patient-identifying patterns.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let patterns = get_patterns();

    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    // Fast path: single scan for "any match".
    if !patterns.set.is_match(prefix) {
        let mut out = prefix.to_string();
        if truncated {
            out.push_str(" [TRUNCATED]");
        }
        return out;
    }

    // Only apply patterns that matched the original prefix.
    let matched: Vec<usize> = patterns.set.matches(prefix).into_iter().collect();
    let mut result = prefix.to_string();
    for idx in matched {
        let pattern = &patterns.patterns[idx];
        result = pattern
            .regex
            .replace_all(&result, pattern.replacement)
            .to_string();
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
    }
    result
}

/// A `tracing_subscriber` writer wrapper that sanitizes formatted log output
/// before it is written to the underlying sink.
///
/// Keeps sanitization centralized; no need to call `sanitize()` at every
/// callsite.
#[derive(Debug)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<M> Clone for SanitizingMakeWriter<M>
where
    M: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub struct SanitizingWriter<W> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W> SanitizingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }
}

impl<W> SanitizingWriter<W>
where
    W: std::io::Write,
{
    fn flush_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.drain(..=pos).collect::<Vec<u8>>();
            let line_str = String::from_utf8_lossy(&line);
            let sanitized = sanitize(&line_str);
            self.inner.write_all(sanitized.as_bytes())?;
        }
        Ok(())
    }
}

impl<W> std::io::Write for SanitizingWriter<W>
where
    W: std::io::Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // Prevent unbounded buffering if the formatter writes a huge line
        // with no newlines.
        let hard_cap = max_sanitize_bytes().saturating_mul(2);
        if hard_cap > 0 && self.buffer.len() > hard_cap {
            let s = String::from_utf8_lossy(&self.buffer).to_string();
            let sanitized = sanitize(&s);
            self.inner.write_all(sanitized.as_bytes())?;
            self.inner.write_all(b"\n[TRUNCATED]\n")?;
            self.buffer.clear();
            return Ok(buf.len());
        }

        self.flush_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_lines()?;

        if !self.buffer.is_empty() {
            let s = String::from_utf8_lossy(&self.buffer);
            let sanitized = sanitize(&s);
            self.inner.write_all(sanitized.as_bytes())?;
            self.buffer.clear();
        }

        self.inner.flush()
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter::new(self.inner.make_writer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_nir() {
        let input = "patient 1 85 05 78 006 084 36 admitted";
        let sanitized = sanitize(input);
        assert!(sanitized.contains("[REDACTED-NIR]"));
        assert!(!sanitized.contains("084"));
    }

    #[test]
    fn test_sanitize_email() {
        let input = "Contact: patient@hopital.fr";
        let sanitized = sanitize(input);
        assert!(sanitized.contains("[REDACTED-EMAIL]"));
        assert!(!sanitized.contains("hopital.fr"));
    }

    #[test]
    fn test_sanitize_french_phone() {
        let input = "rappeler le 06 12 34 56 78 demain";
        let sanitized = sanitize(input);
        assert!(sanitized.contains("[REDACTED-PHONE]"));
    }

    #[test]
    fn test_sanitize_base64_payload() {
        let payload = "QWxhZGRpbjpvcGVuIHNlc2FtZQ".repeat(4);
        let input = format!("running python3 predict.py {payload} model_dir");
        let sanitized = sanitize(&input);
        assert!(sanitized.contains("[REDACTED-PAYLOAD]"));
        assert!(!sanitized.contains("QWxhZGRpbj"));
    }

    #[test]
    fn test_short_base64_left_alone() {
        let input = "phase=encode len=48";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn test_clean_lines_pass_through_unchanged() {
        let input = "prediction 12 stored for visit 7";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn test_sanitize_truncates_large_inputs() {
        let input = "x".repeat(64);
        let sanitized = sanitize_with_limit(&input, 16);
        assert!(sanitized.contains("[TRUNCATED]"));
        assert!(sanitized.len() < input.len() + 16);
    }
}
