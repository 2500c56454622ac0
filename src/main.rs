use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use homegate::config::Overrides;
use homegate::{
    Aggregator, BuildState, Config, Connector, JsonPresenter, Presenter, SoapConnector, SoapSession,
    TextPresenter,
};

/// Homegate - status snapshot of a home network gateway over TR-064
#[derive(Parser)]
#[command(name = "homegate", version, about)]
struct Cli {
    /// Gateway hostname or IP address
    #[arg(short, long, visible_alias = "ip", env = "HOMEGATE_ADDRESS")]
    address: Option<String>,

    /// TR-064 port (default 49000, or 49443 with --tls)
    #[arg(long, env = "HOMEGATE_PORT")]
    port: Option<u16>,

    /// Username
    #[arg(short, long, env = "HOMEGATE_USERNAME")]
    username: Option<String>,

    /// Password
    #[arg(short, long, env = "HOMEGATE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Connect over HTTPS
    #[arg(long, env = "HOMEGATE_TLS")]
    tls: bool,

    /// List every discovered service
    #[arg(long)]
    show_services: bool,

    /// Include offline hosts
    #[arg(long)]
    all_hosts: bool,

    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Per-call timeout in seconds
    #[arg(long, env = "HOMEGATE_TIMEOUT")]
    timeout: Option<u64>,

    /// Retry attempts for read-only actions (0-3)
    #[arg(long, env = "HOMEGATE_RETRIES")]
    retries: Option<u32>,

    /// Parallel host lookup channels (1-4)
    #[arg(long, env = "HOMEGATE_WORKERS")]
    workers: Option<usize>,

    /// Skip IPv6 lookups per host
    #[arg(long)]
    no_ipv6: bool,

    /// Probe LAN/WLAN services for traffic counters
    #[arg(long, env = "HOMEGATE_PROBE_TELEMETRY")]
    probe_telemetry: bool,

    /// Config file (default: <config dir>/homegate/config.toml)
    #[arg(short, long, env = "HOMEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            address: self.address.clone(),
            port: self.port,
            tls: self.tls.then_some(true),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout_secs: self.timeout,
            retries: self.retries,
            workers: self.workers,
            ipv6: self.no_ipv6.then_some(false),
            probe_telemetry: self.probe_telemetry.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let started = Instant::now();
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,homegate=info",
        1 => "info,homegate=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli, started).await {
        Ok(BuildState::Complete) => ExitCode::SUCCESS,
        Ok(state) => {
            tracing::error!(?state, "snapshot incomplete");
            ExitCode::FAILURE
        }
        Err(e) => {
            match e.downcast_ref::<homegate::Error>() {
                Some(err) if err.is_fatal() => tracing::error!("fatal: {e}"),
                _ => tracing::error!("run aborted: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        "(none)".to_string()
    } else {
        "*".repeat(secret.chars().count())
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli, started: Instant) -> anyhow::Result<BuildState> {
    let config = Config::load(cli.config.as_deref(), &cli.overrides())?;
    tracing::debug!(?config, "loaded configuration");

    let conn = &config.connection;
    eprintln!(
        "Connecting to {}:{} as {} (password: {})",
        conn.address,
        conn.port,
        if conn.username.is_empty() { "(anonymous)" } else { conn.username.as_str() },
        mask(conn.password.expose_secret())
    );

    let aggregator = Aggregator::new(&config);
    let cancel = aggregator.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing after the current call");
            cancel.cancel();
        }
    });

    let session = SoapSession::connect(&config.connection).await?;
    let connector = SoapConnector::new(config.connection.clone());
    let connector: &dyn Connector = &connector;

    let snapshot = aggregator.run(&session, Some(connector)).await?;

    let mut stdout = std::io::stdout().lock();
    if cli.json {
        JsonPresenter.present(&snapshot, &mut stdout)?;
    } else {
        let presenter = TextPresenter {
            show_services: cli.show_services,
            all_hosts: cli.all_hosts,
            program_started: Some(started),
        };
        presenter.present(&snapshot, &mut stdout)?;
    }
    stdout.flush()?;

    Ok(snapshot.state())
}
