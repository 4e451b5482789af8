//! Get command - fetches one endpoint through the shared cache

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde_json::Value;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::{FetchOptions, FetchParams, FetchState};
use crate::infrastructure::cache::CacheStore;
use crate::infrastructure::http::HttpTransport;
use crate::infrastructure::logging;
use crate::infrastructure::observability::init_metrics;
use crate::infrastructure::services::FetchCoordinator;

/// Arguments for the get command
#[derive(Args, Clone, Debug)]
pub struct GetArgs {
    /// Endpoint to fetch, absolute or relative to the configured base URL
    pub endpoint: String,

    /// Request parameter as key=value. Values are parsed as JSON when
    /// possible and fall back to plain strings.
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// Number of additional ensure_fetched calls with the same params
    #[arg(long, default_value_t = 0)]
    pub repeat: u32,

    /// Force a refetch after the initial load
    #[arg(long)]
    pub refetch: bool,

    /// Skip the automatic initial fetch
    #[arg(long)]
    pub manual: bool,

    /// Print Prometheus metrics to stderr after the run
    #[arg(long)]
    pub print_metrics: bool,

    /// Base URL override
    #[arg(long)]
    pub base_url: Option<String>,
}

/// Run the get command
pub async fn run(args: GetArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load().unwrap_or_default();
    if args.print_metrics {
        config.metrics.enabled = true;
    }
    if let Some(base_url) = &args.base_url {
        config.http.base_url = Some(base_url.clone());
    }

    logging::init_logging(&config.logging);
    let metrics = init_metrics(&config.metrics);

    let transport = HttpTransport::from_config(&config.http)?;
    let params: FetchParams = args.params.iter().cloned().collect();
    let options = if args.manual {
        FetchOptions::manual()
    } else {
        FetchOptions::default()
    };

    let coordinator: FetchCoordinator<Value> = FetchCoordinator::new(
        args.endpoint.clone(),
        params.clone(),
        CacheStore::new(),
        Arc::new(transport),
    )?
    .with_options(options);

    info!(endpoint = %coordinator.endpoint(), "Fetching");

    let mut state = if args.manual {
        coordinator.ensure_fetched(params.clone(), false).await
    } else {
        coordinator.initialize().await
    };

    for _ in 0..args.repeat {
        state = coordinator.ensure_fetched(params.clone(), false).await;
    }

    if args.refetch {
        state = coordinator.refetch(None).await;
    }

    coordinator.teardown();
    print_state(&state)?;

    if let Some(metrics) = metrics {
        eprintln!("{}", metrics.render());
    }

    Ok(())
}

fn print_state(state: &FetchState<Value>) -> anyhow::Result<()> {
    let rendered =
        serde_json::to_string_pretty(state).context("Failed to serialize fetch state")?;
    println!("{}", rendered);
    Ok(())
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{}': expected key=value", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid parameter '{}': empty key", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    use crate::cli::{Cli, Command};

    #[test]
    fn test_parse_param_json_values() {
        assert_eq!(parse_param("userId=1").unwrap(), ("userId".to_string(), json!(1)));
        assert_eq!(parse_param("draft=true").unwrap(), ("draft".to_string(), json!(true)));
        assert_eq!(
            parse_param("ids=[1,2]").unwrap(),
            ("ids".to_string(), json!([1, 2]))
        );
    }

    #[test]
    fn test_parse_param_falls_back_to_string() {
        assert_eq!(
            parse_param("title=hello world").unwrap(),
            ("title".to_string(), json!("hello world"))
        );
        assert_eq!(parse_param("q=").unwrap(), ("q".to_string(), json!("")));
        assert_eq!(parse_param("expr=a=b").unwrap(), ("expr".to_string(), json!("a=b")));
    }

    #[test]
    fn test_parse_param_rejects_malformed() {
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_cli_parses_get_command() {
        let cli = Cli::try_parse_from([
            "pmp-fetch",
            "get",
            "/posts",
            "-p",
            "userId=1",
            "--repeat",
            "2",
            "--refetch",
        ])
        .unwrap();

        let Command::Get(args) = cli.command;
        assert_eq!(args.endpoint, "/posts");
        assert_eq!(args.params, vec![("userId".to_string(), json!(1))]);
        assert_eq!(args.repeat, 2);
        assert!(args.refetch);
        assert!(!args.manual);
    }
}
