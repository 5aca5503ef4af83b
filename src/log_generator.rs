//! Template-driven synthetic log entries (§4.5).
//!
//! A pure function of `(event_type, severity, source_key, details) ->
//! log line`. Nothing here touches `Simulation` directly — callers in
//! `crate::simulation` supply the details map and get a formatted line
//! back, ready to wrap in a `LogFeedUpdate` event.

use std::collections::HashMap;

use rand::Rng;

/// Maps a status/event-type's leading token to a severity level. Unknown
/// tokens default to `INFO`.
pub fn severity_for(token: &str) -> &'static str {
    match token {
        "NOMINAL" | "UNKNOWN" | "AUTH_SUCCESS_TOKEN" => "INFO",
        "AUTH_SUCCESS" | "WEB_ACCESS" | "DNS_QUERY" | "LOW" => "LOW",
        "WARN" | "HIGH_LOAD" | "DEGRADED" | "ANOMALOUS_TRAFFIC" | "ANOMALOUS_ACCESS" => "WARN",
        "HIGH" | "HIGH_FAILURES" | "HIGH_EGRESS" | "ANOMALOUS_ADMIN_LOGIN" | "ENCRYPTING"
        | "ISOLATING" | "OFFLINE" | "ISOLATED" => "HIGH",
        "CRITICAL" | "ENCRYPTED" | "COMPROMISED" => "CRITICAL",
        _ => "INFO",
    }
}

/// Host-name-pattern source registry, keyed by `system_key`. A `.*`
/// wildcard resolves to a random digit 1-9 at generation time.
fn source_patterns(source_key: &str) -> Vec<&'static str> {
    match source_key {
        "Website_Public" => vec!["web-prod-01", "web-prod-02", "lb-ext-main", "cdn-pop-3"],
        "Auth_System" => vec!["auth-svc-01", "switch-corp-access-.*", "idp-primary"],
        "Network_Segment_Internal" => vec!["switch-corp-internal-.*", "core-router-2"],
        "File_Servers" => vec!["fs-prod-.*", "nas-backup-01"],
        "Network_Edge" => vec!["edge-fw-01", "edge-fw-02", "lb-ext-main"],
        "VPN_Access" => vec!["vpn-gw-01", "vpn-gw-02"],
        "Customer_Database" => vec!["db-prod-primary", "db-prod-replica-.*"],
        "HR_System" => vec!["hr-app-01", "hr-db-01"],
        _ => vec!["unknown_system"],
    }
}

fn resolve_source(source_key: &str) -> String {
    let patterns = source_patterns(source_key);
    let mut rng = rand::thread_rng();
    let pattern = patterns[rng.gen_range(0..patterns.len())];
    if pattern.ends_with(".*") {
        let digit = rng.gen_range(1..=9);
        format!("{}{}", &pattern[..pattern.len() - 2], digit)
    } else {
        pattern.to_string()
    }
}

/// Format-string registry keyed by event type; `GENERIC_<SEVERITY>` is the
/// fallback for event types with no specific template.
fn template_for(event_type: &str) -> &'static str {
    match event_type {
        "AUTH_SUCCESS" => "user='{user}' src_ip='{src_ip}' domain='{domain}' status='success'",
        "AUTH_FAILURE" => "user='{user}' src_ip='{src_ip}' domain='{domain}' status='failed'",
        "WEB_ACCESS" => "src_ip='{src_ip}' method='GET' path='{path}' status=200",
        "DNS_QUERY" => "src_ip='{src_ip}' query='{domain}' type=A",
        "SYS_STATUS_CHANGE" => "status changed: {old_status} -> {new_status} ({reason})",
        "SYS_INITIAL_STATE" => "initial state: {status} ({reason})",
        "BLOCK_RULE_APPLIED" => "firewall rule applied: block src_ip='{ip}'",
        "ESCALATION" => "{reason}",
        "GENERIC_INFO" => "{message}",
        "GENERIC_WARN" => "{message}",
        "GENERIC_HIGH" => "{message}",
        "GENERIC_CRITICAL" => "{message}",
        "LOG_TEMPLATE_ERROR" => "log template error for event '{event_type}'",
        _ => "",
    }
}

fn fallback_template_for_severity(severity: &str) -> &'static str {
    match severity {
        "WARN" => "GENERIC_WARN",
        "HIGH" => "GENERIC_HIGH",
        "CRITICAL" => "GENERIC_CRITICAL",
        "LOW" | "MEDIUM" => "GENERIC_WARN",
        _ => "GENERIC_INFO",
    }
}

fn random_internal_ip() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "10.{}.{}.{}",
        rng.gen_range(0..=255),
        rng.gen_range(0..=255),
        rng.gen_range(1..=254)
    )
}

fn random_external_ip() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let a = rng.gen_range(1..=223);
        if a == 10 || a == 127 {
            continue;
        }
        let b = rng.gen_range(0..=255);
        if a == 172 && (16..=31).contains(&b) {
            continue;
        }
        if a == 192 && b == 168 {
            continue;
        }
        let c = rng.gen_range(0..=255);
        let d = rng.gen_range(1..=254);
        return format!("{}.{}.{}.{}", a, b, c, d);
    }
}

fn default_placeholder(name: &str) -> String {
    let mut rng = rand::thread_rng();
    match name {
        "src_ip" => random_external_ip(),
        "ip" => random_external_ip(),
        "internal_ip" => random_internal_ip(),
        "user" => {
            const USERS: &[&str] = &["jsmith", "mchen", "rpatel", "svc-backup", "admin"];
            USERS[rng.gen_range(0..USERS.len())].to_string()
        }
        "domain" => {
            const DOMAINS: &[&str] = &["corp.internal", "auth.corp.internal", "example.com"];
            DOMAINS[rng.gen_range(0..DOMAINS.len())].to_string()
        }
        "path" => "/index.html".to_string(),
        "process" => {
            const PROCS: &[&str] = &["svchost.exe", "powershell.exe", "bash"];
            PROCS[rng.gen_range(0..PROCS.len())].to_string()
        }
        "policy" => format!("policy-{}", rng.gen_range(100..999)),
        _ => String::new(),
    }
}

/// Renders a template against a details map, filling any `{placeholder}`
/// missing from `details` with a plausible random default.
fn render_template(template: &str, details: &HashMap<String, String>) -> String {
    let mut out = String::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let name = &template[i + 1..i + end];
                let value = details
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| default_placeholder(name));
                out.push_str(&value);
                i += end + 1;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// Generates one formatted log line, mirroring `_generate_log_entry`.
///
/// `severity_hint` is the status/event-type's leading token (e.g. the
/// first whitespace-delimited word of a status label); `details` carries
/// whatever the caller already knows (old/new status, reason, etc.).
pub fn generate_log_entry(
    event_type: &str,
    severity_hint: &str,
    source_key: &str,
    details: &HashMap<String, String>,
) -> (String, &'static str) {
    let severity = severity_for(severity_hint);
    let mut template = template_for(event_type);
    if template.is_empty() {
        template = template_for(fallback_template_for_severity(severity));
    }
    let source = resolve_source(source_key);
    let body = render_template(template, details);
    (format!("[{}] {}: {}", source, event_type, body), severity)
}

/// Picks 2-5 background-noise log entries of the ambient types the
/// original emits between escalations, to keep the feed alive.
pub fn generate_background_noise() -> Vec<(String, &'static str)> {
    const NOISE_TYPES: &[&str] = &["AUTH_SUCCESS", "WEB_ACCESS", "DNS_QUERY"];
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(2..=5);
    (0..count)
        .map(|_| {
            let event_type = NOISE_TYPES[rng.gen_range(0..NOISE_TYPES.len())];
            generate_log_entry(event_type, event_type, "Website_Public", &HashMap::new())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_lookup_defaults_to_info_for_unknown() {
        assert_eq!(severity_for("NOMINAL"), "INFO");
        assert_eq!(severity_for("HIGH_FAILURES"), "HIGH");
        assert_eq!(severity_for("ENCRYPTED"), "CRITICAL");
        assert_eq!(severity_for("NONSENSE_TOKEN"), "INFO");
    }

    #[test]
    fn unknown_event_type_falls_back_to_generic_template() {
        let (line, severity) = generate_log_entry("TOTALLY_UNKNOWN", "CRITICAL", "Auth_System", &HashMap::new());
        assert_eq!(severity, "CRITICAL");
        assert!(line.contains("TOTALLY_UNKNOWN"));
    }

    #[test]
    fn wildcard_source_resolves_to_a_single_digit() {
        for _ in 0..20 {
            let source = resolve_source("File_Servers");
            assert!(source.starts_with("fs-prod-") || source == "nas-backup-01");
        }
    }

    #[test]
    fn background_noise_yields_between_two_and_five_entries() {
        let noise = generate_background_noise();
        assert!(noise.len() >= 2 && noise.len() <= 5);
    }
}
