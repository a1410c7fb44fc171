use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use table_properties::connection::ConnectionParams;
use table_properties::document::ConfigDocument;
use table_properties::{diff, executor, extract, report};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "table-properties")]
#[command(about = "Export keyspace and table properties from the schema catalog")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct ConnectionArgs {
    /// cqlshrc-style file with [connection], [authentication] and [ssl] sections
    #[arg(long, env = "SCYLLA_RCFILE")]
    rcfile: Option<PathBuf>,

    /// Contact point; repeat or comma-separate for several
    #[arg(long = "host", env = "SCYLLA_HOSTS", value_delimiter = ',')]
    hosts: Vec<String>,

    #[arg(long, env = "SCYLLA_PORT")]
    port: Option<u16>,

    #[arg(long, env = "SCYLLA_USER")]
    username: Option<String>,

    #[arg(long, env = "SCYLLA_PASS", hide_env_values = true)]
    password: Option<String>,

    /// Require TLS
    #[arg(long, env = "SCYLLA_SSL", value_parser = BoolishValueParser::new())]
    ssl: bool,

    /// CA bundle used to verify the cluster certificate
    #[arg(long, env = "SCYLLA_CA_BUNDLE")]
    ca_file: Option<PathBuf>,

    /// Skip peer certificate verification
    #[arg(long, env = "SCYLLA_SSL_INSECURE", value_parser = BoolishValueParser::new())]
    ssl_insecure: bool,
}

impl ConnectionArgs {
    /// Defaults, then the rc file, then flags and environment.
    fn resolve(self) -> Result<ConnectionParams> {
        let mut params = match &self.rcfile {
            Some(path) => ConnectionParams::load_from_rcfile(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ConnectionParams::default(),
        };
        if !self.hosts.is_empty() {
            params.set_hosts(self.hosts);
        }
        if let Some(port) = self.port {
            params.set_port(port);
        }
        if self.username.is_some() {
            params.set_username(self.username);
        }
        if self.password.is_some() {
            params.set_password(self.password);
        }
        if self.ca_file.is_some() {
            params.set_ssl_ca_file(self.ca_file)?;
        }
        if self.ssl_insecure {
            params.set_ssl_validate(false)?;
        }
        if self.ssl {
            params.set_ssl_required(true)?;
        }
        Ok(params)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print keyspaces, replication and tables (default)
    Summary,
    /// Write the normalized configuration document as JSON
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Single-line JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },
    /// Compare a previously exported document against the live cluster
    Diff {
        /// Exported JSON document to compare against
        baseline: PathBuf,
    },
    /// Verify the cluster is reachable
    Check,
}

/// `RUST_LOG` directives when given, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let params = cli.connection.resolve()?;
    info!(hosts = ?params.hosts(), port = params.port(), "resolved connection");

    match cli.command.unwrap_or(Command::Summary) {
        Command::Summary => {
            let doc = extract::get_current_config(&params).await?;
            let mut stdout = std::io::stdout().lock();
            report::write_summary(&doc, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Export { output, compact } => {
            let doc = extract::get_current_config(&params).await?;
            let json = if compact {
                serde_json::to_string(&doc)?
            } else {
                serde_json::to_string_pretty(&doc)?
            };
            match output {
                Some(path) => std::fs::write(&path, json + "\n")
                    .with_context(|| format!("writing {}", path.display()))?,
                None => writeln!(std::io::stdout().lock(), "{json}")?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Diff { baseline } => {
            let text = std::fs::read_to_string(&baseline)
                .with_context(|| format!("reading {}", baseline.display()))?;
            let baseline_doc: ConfigDocument = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", baseline.display()))?;
            let current = extract::get_current_config(&params).await?;
            let changes = diff::diff_configs(&baseline_doc, &current);
            let mut stdout = std::io::stdout().lock();
            for change in &changes {
                writeln!(stdout, "{change}")?;
            }
            if changes.is_empty() {
                info!("no differences");
                Ok(ExitCode::SUCCESS)
            } else {
                info!(count = changes.len(), "configuration differs from baseline");
                Ok(ExitCode::from(1))
            }
        }
        Command::Check => {
            executor::check_connection(&params).await?;
            writeln!(std::io::stdout().lock(), "connection ok")?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
