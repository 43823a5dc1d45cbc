//! Shannon-entropy secret detection.
//!
//! Long tokens with near-random byte distribution are flagged as probable
//! embedded secrets. The candidate extractor is a bounded pull: at most
//! 2000 tokens are examined per file and at most 10 findings emitted.

use std::sync::LazyLock;

use regex::Regex;

use crate::engine::LineIndex;
use crate::limits::MAX_HEURISTIC_FINDINGS;
use crate::rules::types::{Finding, Severity};

/// Entropy at or above this is flagged.
pub const ENTROPY_THRESHOLD: f64 = 4.2;
/// Candidate tokens examined per file.
const MAX_CANDIDATES: usize = 2000;
/// Minimum token length worth measuring.
const MIN_TOKEN_LEN: usize = 20;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}+/_=-]{20,}").expect("token pattern"));

/// Base-2 Shannon entropy over the token's characters.
pub fn shannon_entropy(token: &str) -> f64 {
    if token.is_empty() {
        return 0.0;
    }

    let mut counts = std::collections::HashMap::new();
    let mut total = 0usize;
    for c in token.chars() {
        *counts.entry(c).or_insert(0usize) += 1;
        total += 1;
    }

    let total = total as f64;
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

pub fn scan(content: &str, file: &str, index: &LineIndex, findings: &mut Vec<Finding>) {
    let mut emitted = 0usize;

    for (seen, m) in TOKEN.find_iter(content).enumerate() {
        if seen >= MAX_CANDIDATES || emitted >= MAX_HEURISTIC_FINDINGS {
            break;
        }

        let token = m.as_str();
        debug_assert!(token.len() >= MIN_TOKEN_LEN);

        let entropy = shannon_entropy(token);
        if entropy < ENTROPY_THRESHOLD {
            continue;
        }

        let mut finding = Finding::heuristic(
            "HEURISTIC_HIGH_ENTROPY_STRING",
            Severity::High,
            "heuristic_secrets",
            format!(
                "high-entropy string ({:.2} bits/char, {} chars) may be an embedded secret",
                entropy,
                token.len()
            ),
            file,
            Some(index.line_of(m.start())),
        );
        // The confidence pass reads the measured entropy back out of here.
        finding.message.push_str(&format!(" [entropy={entropy:.2}]"));
        findings.push(finding);
        emitted += 1;
    }
}

/// Pull the measured entropy back out of an entropy-secret finding message.
pub fn entropy_of_finding(finding: &Finding) -> Option<f64> {
    let marker = finding.message.rfind("[entropy=")?;
    let rest = &finding.message[marker + "[entropy=".len()..];
    rest.strip_suffix(']')?.parse().ok()
}
