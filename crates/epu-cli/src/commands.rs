use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::output;

// ── Token helpers ────────────────────────────────────────────────────────────

fn default_token_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".epu").join("token")
}

pub fn login(token: &str) -> Result<()> {
    let path = default_token_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(&path, token).with_context(|| format!("failed to write token to {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }
    println!("Token written to {}", path.display());
    Ok(())
}

fn resolve_token(explicit: Option<String>) -> Result<String> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let path = default_token_path();
    std::fs::read_to_string(&path).map(|s| s.trim().to_string()).with_context(|| {
        format!(
            "no token provided and could not read token file at {}. Use --token, EPU_TOKEN, or `epu-cli login`",
            path.display()
        )
    })
}

fn client(token: &str) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    let bearer = format!("Bearer {token}");
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&bearer).context("token contains invalid header characters")?,
    );
    reqwest::Client::builder().default_headers(headers).build().context("failed to build HTTP client")
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON in {}", path.display()))
}

async fn expect_success(resp: reqwest::Response, action: &str) -> Result<Value> {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = body.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        anyhow::bail!("{action} failed: {status} — {message}");
    }
    Ok(body)
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(url: &str, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .get(format!("{}/readyz", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    if resp.status().is_success() {
        println!("ready");
    } else {
        println!("not ready: {}", resp.status());
    }
    Ok(())
}

// ── Domain definitions ───────────────────────────────────────────────────────

pub async fn domain_definition_list(url: &str, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .get(format!("{}/domain-definitions", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    let body = expect_success(resp, "list domain definitions").await?;
    let defs = body.as_array().cloned().unwrap_or_default();
    print!("{}", output::render_domain_definitions_text(&defs));
    Ok(())
}

pub async fn domain_definition_describe(url: &str, token: Option<String>, id: &str) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .get(format!("{}/domain-definitions/{}", url.trim_end_matches('/'), id))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    let body = expect_success(resp, "describe domain definition").await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn domain_definition_add(url: &str, token: Option<String>, file: &Path) -> Result<()> {
    let token = resolve_token(token)?;
    let def = read_json(file)?;
    let resp = client(&token)?
        .post(format!("{}/domain-definitions", url.trim_end_matches('/')))
        .json(&def)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "add domain definition").await?;
    println!("domain definition added.");
    Ok(())
}

pub async fn domain_definition_update(url: &str, token: Option<String>, id: &str, file: &Path) -> Result<()> {
    let token = resolve_token(token)?;
    let def = read_json(file)?;
    let resp = client(&token)?
        .put(format!("{}/domain-definitions/{}", url.trim_end_matches('/'), id))
        .json(&def)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "update domain definition").await?;
    println!("domain definition updated.");
    Ok(())
}

pub async fn domain_definition_remove(url: &str, token: Option<String>, id: &str) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .delete(format!("{}/domain-definitions/{}", url.trim_end_matches('/'), id))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "remove domain definition").await?;
    println!("domain definition removed.");
    Ok(())
}

// ── Domains ───────────────────────────────────────────────────────────────────

pub async fn domain_list(url: &str, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .get(format!("{}/domains", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    let body = expect_success(resp, "list domains").await?;
    let domains = body.as_array().cloned().unwrap_or_default();
    print!("{}", output::render_domains_text(&domains));
    Ok(())
}

pub async fn domain_describe(url: &str, token: Option<String>, id: &str) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .get(format!("{}/domains/{}", url.trim_end_matches('/'), id))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    let body = expect_success(resp, "describe domain").await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn domain_add(
    url: &str,
    token: Option<String>,
    caller: &str,
    domain_id: &str,
    definition_id: &str,
    config_file: Option<PathBuf>,
    subscribers: Vec<String>,
) -> Result<()> {
    let token = resolve_token(token)?;
    let config = match config_file {
        Some(path) => read_json(&path)?,
        None => json!({}),
    };
    let body = json!({
        "domain_id": domain_id,
        "definition_id": definition_id,
        "config": config,
        "subscribers": subscribers,
    });
    let resp = client(&token)?
        .post(format!("{}/domains", url.trim_end_matches('/')))
        .header("x-epu-caller", caller)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "add domain").await?;
    println!("domain added.");
    Ok(())
}

pub async fn domain_remove(url: &str, token: Option<String>, caller: &str, id: &str) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .delete(format!("{}/domains/{}", url.trim_end_matches('/'), id))
        .header("x-epu-caller", caller)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "remove domain").await?;
    println!("domain removed.");
    Ok(())
}

pub async fn domain_reconfigure(url: &str, token: Option<String>, caller: &str, id: &str, config_file: &Path) -> Result<()> {
    let token = resolve_token(token)?;
    let config = read_json(config_file)?;
    let resp = client(&token)?
        .put(format!("{}/domains/{}/config", url.trim_end_matches('/'), id))
        .header("x-epu-caller", caller)
        .json(&config)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "reconfigure domain").await?;
    println!("domain reconfigured.");
    Ok(())
}

pub async fn domain_subscribe(url: &str, token: Option<String>, caller: &str, id: &str, subscriber: &str) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .post(format!("{}/domains/{}/subscribers", url.trim_end_matches('/'), id))
        .header("x-epu-caller", caller)
        .json(&json!({ "subscriber": subscriber }))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "subscribe").await?;
    println!("subscribed.");
    Ok(())
}

pub async fn domain_unsubscribe(url: &str, token: Option<String>, caller: &str, id: &str, subscriber: &str) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .delete(format!("{}/domains/{}/subscribers/{}", url.trim_end_matches('/'), id, subscriber))
        .header("x-epu-caller", caller)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "unsubscribe").await?;
    println!("unsubscribed.");
    Ok(())
}

// ── Provisioner passthrough ───────────────────────────────────────────────────

pub async fn provision(url: &str, token: Option<String>, request_file: &Path) -> Result<()> {
    let token = resolve_token(token)?;
    let request = read_json(request_file)?;
    let resp = client(&token)?
        .post(format!("{}/provision", url.trim_end_matches('/')))
        .json(&json!({ "request": request }))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    let body = expect_success(resp, "provision").await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn terminate_nodes(url: &str, token: Option<String>, node_ids: Vec<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .post(format!("{}/terminate-nodes", url.trim_end_matches('/')))
        .json(&json!({ "node_ids": node_ids }))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "terminate nodes").await?;
    println!("termination requested.");
    Ok(())
}

pub async fn terminate_launches(url: &str, token: Option<String>, launch_ids: Vec<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .post(format!("{}/terminate-launches", url.trim_end_matches('/')))
        .json(&json!({ "launch_ids": launch_ids }))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "terminate launches").await?;
    println!("termination requested.");
    Ok(())
}

pub async fn terminate_all(url: &str, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .post(format!("{}/terminate-all", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "terminate all").await?;
    println!("termination of all launches requested.");
    Ok(())
}

pub async fn check_terminate_all(url: &str, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .get(format!("{}/terminate-all", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    let body = expect_success(resp, "check terminate all").await?;
    let done = body.get("terminate_all_complete").and_then(Value::as_bool).unwrap_or(false);
    println!("terminate_all_complete: {done}");
    Ok(())
}

pub async fn dump_state(url: &str, token: Option<String>, node_ids: Vec<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let resp = client(&token)?
        .post(format!("{}/dump-state", url.trim_end_matches('/')))
        .json(&json!({ "node_ids": node_ids }))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    expect_success(resp, "dump state").await?;
    println!("dump requested.");
    Ok(())
}
