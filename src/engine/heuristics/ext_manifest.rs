//! Browser-extension manifest inspection.
//!
//! Applies to `manifest.json` files whose `manifest_version` is 2 or 3.
//! Flags permissions and configuration that grant an extension outsized
//! reach: native messaging, debugger attachment, blocking webRequest,
//! proxy control, broad host access, weak CSP, and plaintext update URLs.

use serde::Deserialize;
use serde_json::Value;

use crate::rules::types::{Finding, Severity};

#[derive(Debug, Deserialize)]
struct ExtensionManifest {
    manifest_version: Option<u64>,
    #[serde(default)]
    permissions: Vec<Value>,
    #[serde(default)]
    optional_permissions: Vec<Value>,
    #[serde(default)]
    host_permissions: Vec<String>,
    #[serde(default)]
    externally_connectable: Option<Value>,
    #[serde(default)]
    web_accessible_resources: Option<Value>,
    #[serde(default)]
    content_security_policy: Option<Value>,
    #[serde(default)]
    update_url: Option<String>,
}

pub fn scan(content: &str, file: &str, findings: &mut Vec<Finding>) {
    let Ok(manifest) = serde_json::from_str::<ExtensionManifest>(content) else {
        return;
    };
    if !matches!(manifest.manifest_version, Some(2) | Some(3)) {
        return;
    }

    let mut emit = |rule_id: &str, severity: Severity, message: String| {
        findings.push(Finding::heuristic(
            rule_id,
            severity,
            "extension_permissions",
            message,
            file,
            None,
        ));
    };

    let permissions: Vec<String> = manifest
        .permissions
        .iter()
        .chain(manifest.optional_permissions.iter())
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    let hosts: Vec<&str> = permissions
        .iter()
        .map(String::as_str)
        .chain(manifest.host_permissions.iter().map(String::as_str))
        .collect();

    if hosts
        .iter()
        .any(|h| *h == "<all_urls>" || h.starts_with("*://") || *h == "http://*/*" || *h == "https://*/*")
    {
        emit(
            "EXT_MANIFEST_ALL_URLS",
            Severity::High,
            "extension requests access to all URLs".to_string(),
        );
    }

    for perm in &permissions {
        match perm.as_str() {
            "nativeMessaging" => emit(
                "EXT_MANIFEST_NATIVE_MESSAGING",
                Severity::Critical,
                "nativeMessaging permission allows launching native host binaries".to_string(),
            ),
            "debugger" => emit(
                "EXT_MANIFEST_DEBUGGER",
                Severity::Critical,
                "debugger permission allows attaching to any tab".to_string(),
            ),
            "webRequestBlocking" => emit(
                "EXT_MANIFEST_WEB_REQUEST_BLOCKING",
                Severity::High,
                "webRequestBlocking permission can rewrite all traffic".to_string(),
            ),
            "proxy" => emit(
                "EXT_MANIFEST_PROXY",
                Severity::High,
                "proxy permission can reroute all browser traffic".to_string(),
            ),
            "history" => emit(
                "EXT_MANIFEST_HISTORY",
                Severity::High,
                "history permission exposes full browsing history".to_string(),
            ),
            "cookies" => emit(
                "EXT_MANIFEST_COOKIES",
                Severity::High,
                "cookies permission exposes session cookies".to_string(),
            ),
            _ => {}
        }
    }

    if let Some(ec) = &manifest.externally_connectable {
        if !ec.is_null() {
            emit(
                "EXT_MANIFEST_EXTERNALLY_CONNECTABLE",
                Severity::Medium,
                "externally_connectable lets web pages message the extension".to_string(),
            );
        }
    }

    if web_resources_overly_broad(manifest.web_accessible_resources.as_ref()) {
        emit(
            "EXT_MANIFEST_BROAD_WEB_RESOURCES",
            Severity::Medium,
            "web_accessible_resources exposes resources to all sites".to_string(),
        );
    }

    if csp_is_unsafe(manifest.content_security_policy.as_ref()) {
        emit(
            "EXT_MANIFEST_UNSAFE_CSP",
            Severity::High,
            "content security policy allows unsafe-eval or unsafe-inline".to_string(),
        );
    }

    if let Some(url) = &manifest.update_url {
        if url.starts_with("http://") {
            emit(
                "EXT_MANIFEST_INSECURE_UPDATE_URL",
                Severity::High,
                format!("update_url uses plaintext HTTP: {url}"),
            );
        }
    }
}

/// v2 is a list of patterns; v3 a list of `{resources, matches}` objects.
fn web_resources_overly_broad(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(entries)) => entries.iter().any(|entry| match entry {
            Value::String(s) => s == "*" || s.contains("*"),
            Value::Object(obj) => obj
                .get("matches")
                .and_then(Value::as_array)
                .is_some_and(|m| {
                    m.iter().any(|v| {
                        v.as_str()
                            .is_some_and(|s| s == "<all_urls>" || s.starts_with("*://"))
                    })
                }),
            _ => false,
        }),
        _ => false,
    }
}

/// v2 is a string; v3 an object keyed by context.
fn csp_is_unsafe(value: Option<&Value>) -> bool {
    fn unsafe_directive(s: &str) -> bool {
        s.contains("unsafe-eval") || s.contains("unsafe-inline")
    }

    match value {
        Some(Value::String(s)) => unsafe_directive(s),
        Some(Value::Object(obj)) => obj
            .values()
            .any(|v| v.as_str().is_some_and(unsafe_directive)),
        _ => false,
    }
}
