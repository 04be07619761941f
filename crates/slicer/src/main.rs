use clap::{Parser, Subcommand, ValueEnum};
use slicer_client::{ApiClient, ClusterConfig, DEFAULT_KUBECONFIG};
use slicer_core::annotations::{last_scheduled_at, SCHEDULER_TIMESTAMP_ANNOTATION};
use slicer_core::{object_name, Pod};
use slicer_scheduler::{
    ClusterSnapshot, DedupStrategy, DryRunAnnotator, NodeResourceView, PodAnnotator, Scheduler,
    SchedulerConfig, SchedulingContext, SnapshotLister,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "slicer",
    about = "Fractional accelerator memory scheduler for Kubernetes"
)]
struct Cli {
    /// Base URL of the Kubernetes API server
    #[arg(long, env = "SLICER_API_URL", global = true)]
    api_url: Option<String>,
    /// Bearer token for the API server
    #[arg(long, env = "SLICER_API_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,
    /// Kubeconfig used when --api-url is unset and not running in a cluster
    #[arg(long, env = "SLICER_KUBECONFIG", default_value = DEFAULT_KUBECONFIG, global = true)]
    kubeconfig: PathBuf,
    /// How repeated slice ids in an assignment are counted
    #[arg(long, default_value = "distinct", global = true)]
    dedup: DedupStrategy,
    /// Timeout for the scheduler-timestamp patch, in milliseconds
    #[arg(long, default_value_t = 5000, global = true)]
    patch_timeout_ms: u64,
    /// Log the timestamp patch instead of sending it
    #[arg(long, global = true)]
    dry_run: bool,
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the admission filter for a pod against every node
    Filter {
        /// Cluster snapshot file (YAML or JSON)
        #[arg(long)]
        snapshot: PathBuf,
        /// Pod manifest to schedule (YAML or JSON)
        #[arg(long)]
        pod: PathBuf,
    },
    /// Filter, score and normalize every node, then pick the best one
    Rank {
        /// Cluster snapshot file (YAML or JSON)
        #[arg(long)]
        snapshot: PathBuf,
        /// Pod manifest to schedule (YAML or JSON)
        #[arg(long)]
        pod: PathBuf,
    },
    /// Show per-device accounting for every node
    Inspect {
        /// Cluster snapshot file (YAML or JSON)
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    let config = SchedulerConfig {
        dedup_strategy: cli.dedup,
        patch_timeout: Duration::from_millis(cli.patch_timeout_ms),
    };

    match &cli.command {
        Commands::Filter { snapshot, pod } => run_filter(snapshot, pod, config),
        Commands::Rank { snapshot, pod } => {
            let annotator = create_annotator(&cli)?;
            run_rank(snapshot, pod, annotator, config).await
        }
        Commands::Inspect { snapshot } => run_inspect(snapshot, config.dedup_strategy),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Pick the annotator used for the scheduler-timestamp patch
fn create_annotator(cli: &Cli) -> miette::Result<Arc<dyn PodAnnotator>> {
    if cli.dry_run {
        info!("Dry run: pod annotations will only be logged");
        return Ok(Arc::new(DryRunAnnotator));
    }

    let mut client = match &cli.api_url {
        Some(api_url) => ApiClient::new(api_url),
        None => {
            let config = ClusterConfig::infer(&cli.kubeconfig)?;
            ApiClient::from_config(config)?
        }
    };
    if let Some(token) = &cli.token {
        client = client.with_bearer_token(token.clone());
    }
    info!("Using API server at {}", client.base_url());
    Ok(Arc::new(client))
}

fn load_snapshot(path: &Path) -> miette::Result<ClusterSnapshot> {
    Ok(ClusterSnapshot::load(path)?)
}

fn load_pod(path: &Path) -> miette::Result<Pod> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read pod manifest '{}': {}", path.display(), e))?;
    Ok(slicer_core::from_yaml(&data)?)
}

/// Print the filter outcome of every node
fn run_filter(snapshot: &Path, pod: &Path, config: SchedulerConfig) -> miette::Result<()> {
    let snapshot = load_snapshot(snapshot)?;
    let context = SchedulingContext::new(load_pod(pod)?);

    // Filtering never stamps, so no annotator is contacted
    let scheduler = Scheduler::new(Arc::new(DryRunAnnotator), config);

    println!(
        "pod {} requests {} units",
        context.pod_name(),
        context.request.device_memory
    );
    for info in snapshot.list() {
        let result = scheduler.filter(&context, &info);
        match &result.reason {
            Some(reason) => println!("{:<24} {:<14} {}", result.node_name, result.code, reason),
            None => println!("{:<24} {}", result.node_name, result.code),
        }
    }

    Ok(())
}

/// Run a full scheduling attempt; ctrl-c cancels any in-flight stamps
async fn run_rank(
    snapshot: &Path,
    pod: &Path,
    annotator: Arc<dyn PodAnnotator>,
    config: SchedulerConfig,
) -> miette::Result<()> {
    let snapshot = load_snapshot(snapshot)?;
    let pod = load_pod(pod)?;
    let scheduler = Scheduler::new(annotator, config);

    let token = CancellationToken::new();
    let signal_token = token.clone();
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling scheduling attempt");
            signal_token.cancel();
        }
    });

    let result = scheduler.schedule(pod, &snapshot, &token).await;
    signal_handle.abort();
    let decision = result?;

    for node_score in &decision.scores {
        println!("{:<24} {:>3}", node_score.name, node_score.score);
    }
    for rejected in &decision.rejected {
        println!(
            "{:<24} {} ({})",
            rejected.node_name,
            rejected.code,
            rejected.reason.clone().unwrap_or_default()
        );
    }
    println!("selected: {}", decision.selected);

    Ok(())
}

/// Print capacity, usage and free memory per device, plus stamp times
fn run_inspect(snapshot: &Path, dedup: DedupStrategy) -> miette::Result<()> {
    let snapshot = load_snapshot(snapshot)?;

    for info in snapshot.list() {
        let view = NodeResourceView::from_node_info(&info, dedup);
        println!("node {} ({} devices)", view.node_name(), view.device_count());

        let capacities = view.all_capacities();
        let used = view.used_capacities();
        for index in 0..view.device_count() {
            match (capacities.get(&index), view.available(index)) {
                (Some(capacity), Some(free)) => println!(
                    "  device {:<4} capacity {:<8} used {:<8} available {}",
                    index,
                    capacity,
                    used.get(&index).copied().unwrap_or(0),
                    free
                ),
                _ => println!("  device {:<4} capacity unknown", index),
            }
        }

        for pod in &info.pods {
            let stamped = last_scheduled_at(pod)
                .present_or_warn_invalid(
                    SCHEDULER_TIMESTAMP_ANNOTATION,
                    &object_name(&pod.metadata),
                )
                .map(|nanos| nanos.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  pod {:<30} scheduled-at {}",
                object_name(&pod.metadata),
                stamped
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    const POD: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: trainer
  namespace: ml
spec:
  containers:
    - name: main
      resources:
        limits:
          alnair/vgpu-memory: "4"
"#;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rank_flags() {
        let cli = Cli::try_parse_from([
            "slicer",
            "--dedup",
            "adjacent",
            "--patch-timeout-ms",
            "250",
            "--dry-run",
            "rank",
            "--snapshot",
            "cluster.yaml",
            "--pod",
            "pod.yaml",
        ])
        .unwrap();

        assert_eq!(cli.dedup, DedupStrategy::Adjacent);
        assert_eq!(cli.patch_timeout_ms, 250);
        assert!(cli.dry_run);
        assert!(matches!(cli.command, Commands::Rank { .. }));
    }

    #[test]
    fn test_rejects_unknown_dedup() {
        assert!(Cli::try_parse_from([
            "slicer",
            "--dedup",
            "sometimes",
            "inspect",
            "--snapshot",
            "cluster.yaml",
        ])
        .is_err());
    }

    fn outside_cluster() -> bool {
        std::env::var("KUBERNETES_SERVICE_HOST").is_err()
            && std::env::var("SLICER_API_URL").is_err()
    }

    fn rank_cli(extra: &[&str]) -> Cli {
        let mut args = vec!["slicer"];
        args.extend_from_slice(extra);
        args.extend_from_slice(&["rank", "--snapshot", "cluster.yaml", "--pod", "pod.yaml"]);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_kubeconfig_default_path() {
        if std::env::var("SLICER_KUBECONFIG").is_ok() {
            return;
        }
        assert_eq!(rank_cli(&[]).kubeconfig, PathBuf::from(DEFAULT_KUBECONFIG));
    }

    #[test]
    fn test_annotator_from_kubeconfig() {
        if !outside_cluster() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.conf");
        std::fs::write(
            &path,
            "clusters:\n  - name: local\n    cluster:\n      server: http://127.0.0.1:8080\n",
        )
        .unwrap();

        let cli = rank_cli(&["--kubeconfig", path.to_str().unwrap()]);
        assert!(create_annotator(&cli).is_ok());
    }

    #[test]
    fn test_annotator_without_any_configuration() {
        if !outside_cluster() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.conf");
        let cli = rank_cli(&["--kubeconfig", missing.to_str().unwrap()]);
        assert!(create_annotator(&cli).is_err());

        // Dry run never needs a connection
        let cli = rank_cli(&["--dry-run", "--kubeconfig", missing.to_str().unwrap()]);
        assert!(create_annotator(&cli).is_ok());
    }

    #[test]
    fn test_load_pod() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(POD.as_bytes()).unwrap();

        let pod = load_pod(file.path()).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("trainer"));
        assert_eq!(SchedulingContext::new(pod).request.device_memory, 4);
    }

    #[test]
    fn test_load_pod_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_pod(&dir.path().join("absent.yaml")).is_err());
    }
}
