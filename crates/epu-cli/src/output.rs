use serde_json::Value;

/// Render a list of domains as a plain-text table. Falls back to raw JSON
/// if a row is missing a field this renderer expects.
pub fn render_domains_text(domains: &[Value]) -> String {
    if domains.is_empty() {
        return "No domains.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!("{:<24} {:<24} {:<24} {}\n", "DOMAIN", "OWNER", "DEFINITION", "SUBSCRIBERS"));
    out.push_str(&"-".repeat(90));
    out.push('\n');
    for d in domains {
        let domain_id = d.get("domain_id").and_then(Value::as_str).unwrap_or("-");
        let owner = d.get("owner").and_then(Value::as_str).unwrap_or("-");
        let definition_id = d.get("definition_id").and_then(Value::as_str).unwrap_or("-");
        let subscribers = d
            .get("subscribers")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        out.push_str(&format!("{:<24} {:<24} {:<24} {}\n", domain_id, owner, definition_id, subscribers));
    }
    out
}

pub fn render_domain_definitions_text(defs: &[Value]) -> String {
    if defs.is_empty() {
        return "No domain definitions.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!("{:<24} {:<20} {}\n", "DEFINITION", "ENGINE", "MONITOR_HEALTH"));
    out.push_str(&"-".repeat(70));
    out.push('\n');
    for d in defs {
        let definition_id = d.get("definition_id").and_then(Value::as_str).unwrap_or("-");
        let engine_class = d.get("engine_class").and_then(Value::as_str).unwrap_or("-");
        let monitor_health = d.get("monitor_health").and_then(Value::as_bool).unwrap_or(false);
        out.push_str(&format!("{:<24} {:<20} {}\n", definition_id, engine_class, monitor_health));
    }
    out
}
