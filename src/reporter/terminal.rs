use colored::Colorize;

use crate::pipeline::ScanResult;
use crate::reporter::Reporter;
use crate::rules::types::Severity;

pub struct TerminalReporter {
    show_confidence: bool,
    verbose: bool,
}

impl TerminalReporter {
    pub fn new(show_confidence: bool, verbose: bool) -> Self {
        Self {
            show_confidence,
            verbose,
        }
    }

    fn severity_label(&self, severity: Severity) -> colored::ColoredString {
        let label = format!("[{severity}]");
        match severity {
            Severity::Critical => label.red().bold(),
            Severity::High => label.yellow().bold(),
            Severity::Medium => label.cyan(),
            Severity::Low => label.white(),
        }
    }
}

impl Reporter for TerminalReporter {
    fn report(&self, result: &ScanResult) -> String {
        let summary = result.summary();
        let mut out = String::new();

        out.push_str(&format!(
            "Scanned {} files in {}ms | Findings {} | CRITICAL:{} | HIGH:{} | MEDIUM:{} | LOW:{}\n",
            result.scanned_files,
            result.elapsed_ms,
            summary.total(),
            summary.critical,
            summary.high,
            summary.medium,
            summary.low,
        ));

        if result.findings.is_empty() {
            out.push_str(&format!("{}\n", "No findings.".green()));
            return out;
        }

        out.push('\n');
        for finding in &result.findings {
            let location = match finding.line {
                Some(line) => format!("{}:{}", finding.file, line),
                None => finding.file.clone(),
            };

            out.push_str(&format!(
                "{} {} {}",
                self.severity_label(finding.severity),
                finding.rule_id.bold(),
                location
            ));
            if self.show_confidence {
                if let Some(confidence) = finding.confidence {
                    out.push_str(&format!(" ({confidence:.2})"));
                }
            }
            out.push('\n');
            out.push_str(&format!("  {}\n", finding.message.dimmed()));

            if self.verbose {
                if let Some(remediation) = &finding.remediation {
                    out.push_str(&format!("  Remediation: {remediation}\n"));
                }
                if let Some(reason) = &finding.confidence_reason {
                    out.push_str(&format!("  Confidence: {reason}\n"));
                }
            }
        }

        out
    }
}
