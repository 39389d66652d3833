use std::path::Path;

use anyhow::{Context, Result};
use infrastructure::config::AgentConfig;
use infrastructure::constants::STORE_KEY_ENV;

use crate::api_client::{AlertListQuery, AlertResponse, ApiClient};
use crate::cli::OutputFormat;

// ── Health ──────────────────────────────────────────────────────────────

pub async fn cmd_health(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let health = client.healthz().await?;
    let ready = client.readyz().await?;

    if output == OutputFormat::Json {
        let combined = serde_json::json!({
            "health": health,
            "ready": ready,
        });
        println!("{}", serde_json::to_string_pretty(&combined)?);
        return Ok(());
    }

    println!("Health:      {}", health.status);
    println!("Ready:       {}", ready.status);
    println!("Feed state:  {}", ready.feed_state);
    println!("Alerts:      {}", ready.alert_count);
    println!("Uptime:      {}", format_uptime(ready.uptime_secs));
    Ok(())
}

// ── Metrics ─────────────────────────────────────────────────────────────

pub async fn cmd_metrics(client: &ApiClient) -> Result<()> {
    let text = client.metrics().await?;
    print!("{text}");
    Ok(())
}

// ── Config ──────────────────────────────────────────────────────────────

/// Load and validate the config the way the agent would, then print it
/// with keys masked.
pub fn cmd_check_config(path: &str, output: OutputFormat) -> Result<()> {
    let mut config = AgentConfig::load(Path::new(path))
        .with_context(|| format!("failed to load config from {path}"))?;
    if let Ok(key) = std::env::var(STORE_KEY_ENV) {
        config.apply_store_key(&key);
    }
    let sanitized = config.sanitized();

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&sanitized)?);
    } else {
        print!("{}", serde_yaml_ng::to_string(&sanitized)?);
    }
    eprintln!("config OK: {path}");
    Ok(())
}

// ── Alerts ──────────────────────────────────────────────────────────────

pub async fn cmd_alerts_list(
    client: &ApiClient,
    query: &AlertListQuery<'_>,
    output: OutputFormat,
) -> Result<()> {
    let resp = client.list_alerts(query).await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    if resp.loading {
        println!("Feed is still loading.");
    }
    if let Some(ref err) = resp.error {
        println!("Last refresh failed: {err}");
    }
    if resp.alerts.is_empty() {
        println!("No alerts found.");
        return Ok(());
    }

    println!(
        "{:<12}  {:<25}  {:<8}  {:<39}  {:<40}",
        "ID", "TIMESTAMP", "SEVERITY", "SOURCE IP", "EVENT"
    );
    for alert in &resp.alerts {
        println!(
            "{:<12}  {:<25}  {:<8}  {:<39}  {:<40}",
            truncate(&alert.id, 12),
            alert.timestamp,
            alert.severity,
            alert.source_ip,
            truncate(&alert.event, 40),
        );
    }

    println!(
        "\nShowing {} of {} alert(s) (offset={}).",
        resp.alerts.len(),
        resp.total,
        resp.offset
    );
    Ok(())
}

pub async fn cmd_alerts_get(client: &ApiClient, id: &str, output: OutputFormat) -> Result<()> {
    let alert = client.get_alert(id).await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&alert)?);
        return Ok(());
    }

    print_alert(&alert);
    Ok(())
}

fn print_alert(alert: &AlertResponse) {
    println!("Alert {}", alert.id);
    println!("  Event:      {}", alert.event);
    println!("  Severity:   {}", alert.severity);
    println!("  Source IP:  {}", alert.source_ip);
    println!("  Timestamp:  {}", alert.timestamp);
    println!("  Location:   {}", format_coords(alert.lat, alert.lng));
}

pub async fn cmd_alerts_stats(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let stats = client.alert_stats().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Alert feed ({}, version {})", stats.state, stats.version);
    println!("  Total:          {}", stats.total);
    println!("  Critical:       {}", stats.critical);
    println!("  DDoS:           {}", stats.ddos);
    println!("  High:           {}", stats.high);
    println!("  Medium:         {}", stats.medium);
    println!("  Low:            {}", stats.low);
    println!("  Unique sources: {}", stats.unique_sources);
    println!("  Latest:         {}", or_dash(stats.latest.as_deref()));
    println!("  Refreshed at:   {}", or_dash(stats.refreshed_at.as_deref()));
    println!("  Served by:      {}", or_dash(stats.source.as_deref()));
    if let Some(ref err) = stats.error {
        println!("  Last error:     {err}");
    }
    Ok(())
}

pub async fn cmd_alerts_refresh(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let resp = client.refresh().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("Feed refreshed: {} alert(s) retained.", resp.count);
    Ok(())
}

pub async fn cmd_alerts_map(
    client: &ApiClient,
    limit: Option<usize>,
    output: OutputFormat,
) -> Result<()> {
    let map = client.alert_map(limit).await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    if map.markers.is_empty() {
        println!("No threat markers.");
        return Ok(());
    }

    println!(
        "{:<12}  {:<8}  {:<20}  {:<39}  {:<30}",
        "ID", "SEVERITY", "LAT, LNG", "SOURCE IP", "EVENT"
    );
    for marker in &map.markers {
        println!(
            "{:<12}  {:<8}  {:<20}  {:<39}  {:<30}",
            truncate(&marker.id, 12),
            marker.severity,
            format_coords(marker.lat, marker.lng),
            marker.source_ip,
            truncate(&marker.event, 30),
        );
    }
    println!("\n{} marker(s).", map.markers.len());
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        s.to_string()
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn format_coords(lat: f64, lng: f64) -> String {
    format!("{lat:.2}, {lng:.2}")
}

fn format_uptime(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
