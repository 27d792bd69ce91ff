use anyhow::Context;
use breaker::circuit_breaker::{CircuitBreaker, TracingListener};
use breaker::config::AppConfig;
use breaker::metrics::MetricsService;
use breaker::{demo, init_tracing};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Optional config file path; defaults apply when omitted
    let config = match env::args().nth(1) {
        Some(path) => AppConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AppConfig::default(),
    };
    config.validate().context("Invalid configuration")?;

    let metrics = MetricsService::new()?;

    let breaker = Arc::new(CircuitBreaker::new(
        config.breaker.name.clone(),
        config.breaker.settings.clone(),
    )?);
    breaker.add_listener(Arc::new(TracingListener::new(breaker.name())));

    let report = demo::run(&config.demo, breaker).await?;

    println!("\n=== Demo Complete ===");
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("\n=== Metrics ===");
    println!("{}", metrics.render());

    Ok(())
}
