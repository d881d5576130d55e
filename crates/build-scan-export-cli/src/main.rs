//! fetch-build-validation-data
//!
//! Fetches build validation data (root project, requested tasks, git
//! metadata, outcome) for one or more build scans and prints it as CSV or
//! JSON.
//!
//! ```text
//! fetch-build-validation-data https://ge.example.com/s/abc123 https://ge.example.com/s/def456
//! fetch-build-validation-data --mapping-file keys.properties --format json https://ge.example.com/s/abc123
//! ```

mod output;
mod scan_url;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use build_scan_export::{
    lookup_access_key, BuildValidationClient, BuildValidationRecord, ClientConfig,
    CustomValueKeys, ExportError, Url, ACCESS_KEY_ENV,
};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, Level};

use output::OutputFormat;
use scan_url::BuildScanUrl;

#[derive(Parser)]
#[command(name = "fetch-build-validation-data")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch build validation data from build scans", long_about = None)]
struct Cli {
    /// Build scan URLs, e.g. https://ge.example.com/s/abc123
    #[arg(required = true)]
    build_scans: Vec<String>,

    /// Custom value key mapping (git.repository, git.branch, git.commitId)
    #[arg(short, long)]
    mapping_file: Option<PathBuf>,

    /// Access keys as host=key[;host=key...]
    #[arg(long, env = ACCESS_KEY_ENV, hide_env_values = true)]
    access_key: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    build_scan_export::init_tracing(cli.json_logs, level);

    let keys = match &cli.mapping_file {
        Some(path) => CustomValueKeys::from_mapping_file(path)
            .with_context(|| format!("Failed to load mapping file {}", path.display()))?,
        None => CustomValueKeys::default(),
    };
    let scans = cli
        .build_scans
        .iter()
        .map(|url| BuildScanUrl::parse(url))
        .collect::<Result<Vec<_>>>()?;
    let clients = build_clients(&scans, &keys, cli.access_key.as_deref())?;

    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling outstanding fetches");
            interrupt_tx.send_replace(true);
        }
    });

    let results = fetch_all(&clients, &scans, interrupt_rx).await;
    let (records, failures) = split_results(results);
    for failure in &failures {
        error!(
            build_scan_id = %failure.build_scan_id(),
            kind = failure.kind(),
            "failed to fetch build scan"
        );
        eprintln!("{failure}");
    }

    print!("{}", output::render(cli.format, &records)?);

    if failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// One client per distinct server.
fn build_clients(
    scans: &[BuildScanUrl],
    keys: &CustomValueKeys,
    access_keys: Option<&str>,
) -> Result<HashMap<Url, BuildValidationClient>> {
    let mut clients = HashMap::new();
    for scan in scans {
        if clients.contains_key(&scan.server_url) {
            continue;
        }
        let mut config = ClientConfig::from_url(scan.server_url.clone())?
            .with_custom_value_keys(keys.clone());
        if let Some(spec) = access_keys {
            if let Some(key) = lookup_access_key(spec, config.host())? {
                config = config.with_access_key(key);
            }
        }
        let client = BuildValidationClient::new(config)
            .with_context(|| format!("Failed to create client for {}", scan.server_url))?;
        clients.insert(scan.server_url.clone(), client);
    }
    Ok(clients)
}

/// Fetch every scan concurrently; results come back in input order.
async fn fetch_all(
    clients: &HashMap<Url, BuildValidationClient>,
    scans: &[BuildScanUrl],
    interrupt: watch::Receiver<bool>,
) -> Vec<Result<BuildValidationRecord, ExportError>> {
    let fetches = scans.iter().map(|scan| {
        let mut interrupt = interrupt.clone();
        async move {
            let scan_ref = build_scan_export::ScanRef::new(
                scan.build_scan_id.clone(),
                scan.server_url.clone(),
            );
            let Some(client) = clients.get(&scan.server_url) else {
                return Err(ExportError::unexpected(&scan_ref, &"no client for server"));
            };
            client
                .fetch_with_interrupt(&scan.build_scan_id, async move {
                    // A dropped sender means no interrupt will ever come.
                    if interrupt.wait_for(|interrupted| *interrupted).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
                .await
        }
    });
    futures::future::join_all(fetches).await
}

fn split_results(
    results: Vec<Result<BuildValidationRecord, ExportError>>,
) -> (Vec<BuildValidationRecord>, Vec<ExportError>) {
    let mut records = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(record) => records.push(record),
            Err(err) => failures.push(err),
        }
    }
    (records, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use build_scan_export::fakes::{ScriptedEventSources, StreamSignal};
    use serde_json::json;
    use std::sync::Arc;

    fn scripted_client(server: &str, script: Vec<StreamSignal>) -> BuildValidationClient {
        let config = ClientConfig::new(server).unwrap();
        BuildValidationClient::with_event_sources(
            config,
            Arc::new(ScriptedEventSources::new(script)),
        )
    }

    fn full_script() -> Vec<StreamSignal> {
        vec![
            StreamSignal::build_event("ProjectStructure", json!({ "rootProjectName": "app" })),
            StreamSignal::build_event("BuildRequestedTasks", json!({ "requested": ["clean", "build"] })),
            StreamSignal::build_event(
                "UserNamedValue",
                json!({ "key": "Git repository", "value": "https://github.com/acme/app, fork" }),
            ),
            StreamSignal::build_event("UserNamedValue", json!({ "key": "Git branch", "value": "main" })),
            StreamSignal::build_event("BuildFinished", json!({ "failure": null })),
            StreamSignal::Closed,
        ]
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_argument_order_and_skips_failures() {
        let good = BuildScanUrl::parse("https://ge.example.com/s/good").unwrap();
        let bad = BuildScanUrl::parse("https://other.example.com/s/bad").unwrap();

        let mut clients = HashMap::new();
        clients.insert(
            good.server_url.clone(),
            scripted_client("https://ge.example.com/", full_script()),
        );
        clients.insert(
            bad.server_url.clone(),
            scripted_client("https://other.example.com/", vec![StreamSignal::http_status(404)]),
        );

        let (_tx, rx) = watch::channel(false);
        let scans = vec![bad.clone(), good.clone(), good];
        let results = fetch_all(&clients, &scans, rx).await;
        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(ExportError::BuildScanNotFound { .. })));

        let (records, failures) = split_results(results);
        assert_eq!(records.len(), 2);
        assert_eq!(failures.len(), 1);

        let csv = output::render_csv(&records[..1]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "app,https://ge.example.com/,https://ge.example.com/s/good,good,\"https://github.com/acme/app, fork\",main,,clean build,SUCCESS"
        );
    }

    #[tokio::test]
    async fn test_interrupt_stops_hanging_fetches() {
        let scan = BuildScanUrl::parse("https://ge.example.com/s/slow").unwrap();
        let mut clients = HashMap::new();
        clients.insert(
            scan.server_url.clone(),
            scripted_client("https://ge.example.com/", vec![StreamSignal::Hang]),
        );

        let (tx, rx) = watch::channel(false);
        tx.send_replace(true);
        let results = fetch_all(&clients, &[scan], rx).await;
        assert!(matches!(
            results[0],
            Err(ExportError::InterruptedWhileFetchingBuildScan { .. })
        ));
    }

    #[test]
    fn test_build_clients_groups_by_server_and_picks_access_key() {
        let scans = vec![
            BuildScanUrl::parse("https://ge.example.com/s/a").unwrap(),
            BuildScanUrl::parse("https://ge.example.com/s/b").unwrap(),
            BuildScanUrl::parse("https://other.example.com/ctx/s/c").unwrap(),
        ];
        let clients = build_clients(
            &scans,
            &CustomValueKeys::default(),
            Some("ge.example.com=key-1"),
        )
        .unwrap();

        assert_eq!(clients.len(), 2);
        let ge = &clients[&scans[0].server_url];
        assert_eq!(ge.config().access_key.as_deref(), Some("key-1"));
        let other = &clients[&scans[2].server_url];
        assert_eq!(other.config().access_key, None);
        assert_eq!(other.server_url().as_str(), "https://other.example.com/ctx/");
    }

    #[test]
    fn test_mapping_file_feeds_custom_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.properties");
        std::fs::write(
            &path,
            "# custom keys\ngit.repository=Repo\ngit.branch=Branch\ngit.commitId=Sha\n",
        )
        .unwrap();

        let keys = CustomValueKeys::from_mapping_file(&path).unwrap();
        assert_eq!(keys.git_repository_key(), "Repo");
        assert_eq!(keys.git_branch_key(), "Branch");
        assert_eq!(keys.git_commit_id_key(), "Sha");
    }

    #[test]
    fn test_cli_parses_arguments() {
        let cli = Cli::try_parse_from([
            "fetch-build-validation-data",
            "--format",
            "json",
            "--access-key",
            "ge.example.com=k",
            "https://ge.example.com/s/abc",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.build_scans, ["https://ge.example.com/s/abc"]);
        assert_eq!(cli.access_key.as_deref(), Some("ge.example.com=k"));

        assert!(Cli::try_parse_from(["fetch-build-validation-data"]).is_err());
    }
}
