use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use nmap_runner_rs::types::Run;
use nmap_runner_rs::{ports, ScanContext, ScannerBuilder};

/// Command line front end for the scanner library.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nmap-runner-rs",
    version,
    about = "Run nmap with live progress and print typed results.",
    long_about = None
)]
struct Cli {
    /// Targets: addresses, CIDRs, ranges or host names.
    #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
    targets: Vec<String>,

    /// Port specification, e.g. `22,80,8000-8010`.
    #[arg(long, conflicts_with = "ports_file")]
    ports: Option<String>,

    /// Path to a ports list file (one port or range per line, `#` comments).
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Probe open ports for service and version information (`-sV`).
    #[arg(long = "service-detection", default_value_t = false)]
    service_detection: bool,

    /// Enable OS fingerprinting (`-O`).
    #[arg(long = "os-detection", default_value_t = false)]
    os_detection: bool,

    /// Treat all hosts as online (`-Pn`).
    #[arg(long = "skip-discovery", default_value_t = false)]
    skip_discovery: bool,

    /// Timing template 0-5 (`-T`).
    #[arg(long)]
    timing: Option<u8>,

    /// NSE scripts to run, comma separated.
    #[arg(long = "script", value_delimiter = ',')]
    scripts: Vec<String>,

    /// Abort the scan after this many seconds.
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Path to the nmap executable. Defaults to `nmap` on PATH.
    #[arg(long = "nmap-path")]
    nmap_path: Option<PathBuf>,

    /// Let nmap write its XML here instead of stdout.
    #[arg(long = "xml-file", conflicts_with = "progress")]
    xml_file: Option<PathBuf>,

    /// Print task progress every N seconds while scanning.
    #[arg(long)]
    progress: Option<u64>,

    /// Only report hosts with at least one open port, and only their open ports.
    #[arg(long = "open-only", default_value_t = false)]
    open_only: bool,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    println!("nmap-runner-rs configuration:");
    println!("  targets      : {}", cli.targets.join(", "));
    println!(
        "  ports        : {}",
        cli.ports
            .clone()
            .or_else(|| cli.ports_file.as_ref().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "<nmap default>".to_string())
    );
    println!(
        "  timeout      : {}",
        cli.timeout_secs
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!(
        "  output       : {}",
        cli.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );

    let scanner = build_scanner(&cli)?;

    let mut ctx = ScanContext::new();
    if let Some(secs) = cli.timeout_secs {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    // Ctrl-C cancels the scan; nmap is killed and the run reports an interrupt.
    let cancel = ctx.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = scanner.execute(&ctx).await.context("failed to start nmap")?;
    for w in &outcome.run.warnings {
        warn!("{w}");
    }
    let run = outcome.into_result().context("nmap scan failed")?;

    print_results_table(&run);
    if let Some(path) = cli.output.as_deref() {
        write_results_json(path, &run)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON results to {}", path.display());
    }
    Ok(())
}

fn build_scanner(cli: &Cli) -> Result<nmap_runner_rs::Scanner> {
    let mut builder = ScannerBuilder::new().targets(&cli.targets)?;
    if let Some(path) = &cli.nmap_path {
        builder = builder.binary_path(path);
    }
    if let Some(spec) = &cli.ports {
        builder = builder.ports(spec)?;
    } else if let Some(path) = &cli.ports_file {
        let ranges = ports::load_ports_from_path(path)?;
        builder = builder.ports(&ports::format_ports(&ranges))?;
    }
    if cli.service_detection {
        builder = builder.service_version_detection();
    }
    if cli.os_detection {
        builder = builder.os_detection();
    }
    if cli.skip_discovery {
        builder = builder.skip_host_discovery();
    }
    if let Some(level) = cli.timing {
        builder = builder.timing_template(level)?;
    }
    if !cli.scripts.is_empty() {
        builder = builder.scripts(&cli.scripts)?;
    }
    if let Some(path) = &cli.xml_file {
        builder = builder.output_file(path)?;
    }
    if let Some(secs) = cli.progress {
        builder = builder.progress_handler(Duration::from_secs(secs.max(1)), |p| {
            eprintln!("  [{:>6.2}%] {} (~{}s remaining)", p.percent, p.task, p.remaining);
        })?;
    }
    if cli.open_only {
        builder = builder
            .host_filter(|h| h.open_ports().next().is_some())
            .port_filter(|p| p.is_open());
    }
    Ok(builder.build()?)
}

fn print_results_table(run: &Run) {
    let host_w = run
        .hosts
        .iter()
        .filter_map(|h| h.address())
        .map(str::len)
        .fold("host".len(), usize::max);
    let port_w = "port/proto".len();
    let state_w = "filtered".len();
    let svc_w = 12usize;

    println!(
        "\nHosts: {} up, {} down ({} total) in {:.2}s",
        run.stats.hosts.up, run.stats.hosts.down, run.stats.hosts.total, run.stats.finished.elapsed
    );
    println!(
        "{:<host_w$}  {:<port_w$}  {:<state_w$}  {:<svc_w$}  product",
        "host", "port/proto", "state", "service"
    );
    println!(
        "{:-<host_w$}  {:-<port_w$}  {:-<state_w$}  {:-<svc_w$}  {:-<7}",
        "", "", "", "", ""
    );
    for host in &run.hosts {
        let addr = host.address().unwrap_or("?");
        if host.ports.ports.is_empty() {
            println!("{:<host_w$}  {:<port_w$}  {:<state_w$}", addr, "-", host.status.state);
            continue;
        }
        for port in &host.ports.ports {
            let product = [port.service.product.as_str(), port.service.version.as_str()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "{:<host_w$}  {:<port_w$}  {:<state_w$}  {:<svc_w$}  {}",
                addr,
                format!("{}/{}", port.id, port.protocol),
                port.state.state,
                port.service.name,
                product
            );
        }
    }
}

fn write_results_json(path: &std::path::Path, run: &Run) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, run)?;
    Ok(())
}
