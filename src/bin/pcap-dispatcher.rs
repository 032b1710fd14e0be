//! pcap-dispatcher: feeds newly captured PCAP files to moloch-capture or zeek.

use clap::{CommandFactory, Parser, Subcommand};
use pcap_dispatcher::config::{
    AnalysisConfig, BackendConfig, CaptureConfig, Config, DispatcherConfig, MOLOCH_CAPTURE_PATH,
    ZEEK_PATH, normalize_endpoint, resolve_executable,
};
use pcap_dispatcher::engine::Dispatcher;
use pcap_dispatcher::lifecycle::Lifecycle;
use pcap_dispatcher::model::{Backend, ExtractionMode};
use pcap_dispatcher::subscriber::ZmqSource;
use pcap_dispatcher::telemetry::{TelemetryConfig, init_telemetry};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(
    name = "pcap-dispatcher",
    about = "Process newly captured PCAP files with moloch-capture or zeek"
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Super verbose output
    #[arg(long, global = true)]
    extra_verbose: bool,
    /// Sleep for this many seconds before starting
    #[arg(long, value_name = "SECONDS", default_value_t = 0, global = true)]
    start_sleep: u64,
    /// Worker threads
    #[arg(
        short = 't',
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..),
        global = true
    )]
    threads: u16,
    /// Autotag logs based on PCAP file tags
    #[arg(long, global = true)]
    autotag: bool,
    /// Notification endpoint (host:port), overrides PCAP_TOPIC_ADDR/PCAP_TOPIC_PORT
    #[arg(long, env = "PCAP_TOPIC", global = true)]
    topic: Option<String>,
    /// Give up waiting for in-flight work this many seconds after shutdown
    #[arg(long, value_name = "SECONDS", global = true)]
    drain_timeout: Option<u64>,
    #[command(subcommand)]
    backend: BackendCommand,
}

#[derive(Subcommand)]
enum BackendCommand {
    /// Index captures with moloch-capture
    Moloch {
        /// moloch-capture executable path
        #[arg(long = "moloch", default_value = MOLOCH_CAPTURE_PATH)]
        executable: PathBuf,
        /// Allow Moloch to manage PCAP files
        #[arg(long)]
        managed: bool,
    },
    /// Analyze captures with zeek and archive the logs
    Zeek {
        /// zeek executable path
        #[arg(long = "zeek", default_value = ZEEK_PATH)]
        executable: PathBuf,
        /// Autoanalyze all PCAP files with Zeek
        #[arg(long)]
        autozeek: bool,
        /// Zeek file carving mode (interesting|mapped|none)
        #[arg(long, default_value = "none")]
        extract: ExtractionMode,
        /// Destination directory for Zeek log files
        #[arg(long = "zeek-directory", value_name = "DIRECTORY")]
        output_dir: PathBuf,
        /// Parent directory for temporary Zeek work directories
        #[arg(long, value_name = "DIRECTORY")]
        scratch_dir: Option<PathBuf>,
    },
}

impl Cli {
    fn log_level(&self, config: &Config) -> String {
        if self.extra_verbose {
            "trace".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else {
            config.log_level.clone()
        }
    }

    fn dispatcher_config(&self) -> anyhow::Result<DispatcherConfig> {
        let backend = match &self.backend {
            BackendCommand::Moloch {
                executable,
                managed,
            } => BackendConfig::Capture(CaptureConfig {
                executable: resolve_executable(executable.clone())?,
                managed: *managed,
            }),
            BackendCommand::Zeek {
                executable,
                autozeek,
                extract,
                output_dir,
                scratch_dir,
            } => BackendConfig::Analysis(AnalysisConfig {
                executable: resolve_executable(executable.clone())?,
                autoanalyze: *autozeek,
                extract_mode: *extract,
                output_dir: output_dir.clone(),
                scratch_dir: scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
            }),
        };

        Ok(DispatcherConfig::new(backend)
            .workers(usize::from(self.threads))
            .autotag(self.autotag)
            .drain_timeout(self.drain_timeout.map(Duration::from_secs)))
    }
}

/// Insert the backend subcommand implied by the program name, if any.
///
/// A symlink named e.g. `pcap_zeek_processor` runs the analysis backend
/// without naming it on the command line.
fn backend_args(mut args: Vec<OsString>) -> Result<Vec<OsString>, String> {
    let asks_for_help = args
        .iter()
        .skip(1)
        .any(|arg| matches!(arg.to_str(), Some("-h" | "--help" | "-V" | "--version")));
    if asks_for_help || matches!(first_positional(&args), Some("moloch" | "zeek" | "help")) {
        return Ok(args);
    }

    let program = args
        .first()
        .map(|arg| {
            Path::new(arg)
                .file_name()
                .unwrap_or(arg.as_os_str())
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_default();
    let lowered = program.to_ascii_lowercase();

    match Backend::from_program_name(&program) {
        Some(backend) => {
            args.insert(1.min(args.len()), OsString::from(backend.command_name()));
            Ok(args)
        }
        None if lowered.contains("moloch") && lowered.contains("zeek") => Err(format!(
            "{program} could not determine PCAP processing mode. Use the 'moloch' or 'zeek' \
             subcommand, or run through a name containing only one of them."
        )),
        None => Ok(args),
    }
}

/// First argument that is neither an option nor an option's value.
fn first_positional(args: &[OsString]) -> Option<&str> {
    let command = Cli::command();
    let options: Vec<&clap::Arg> = command
        .get_arguments()
        .chain(command.get_subcommands().flat_map(|sub| sub.get_arguments()))
        .filter(|arg| arg.get_action().takes_values())
        .collect();
    let takes_value = |token: &str| {
        if let Some(long) = token.strip_prefix("--") {
            options.iter().any(|arg| arg.get_long() == Some(long))
        } else if let Some(short) = token.strip_prefix('-') {
            let mut chars = short.chars();
            match (chars.next(), chars.next()) {
                (Some(flag), None) => options.iter().any(|arg| arg.get_short() == Some(flag)),
                _ => false,
            }
        } else {
            false
        }
    };

    let mut tokens = args.iter().skip(1);
    while let Some(token) = tokens.next() {
        let token = token.to_str()?;
        if token == "--" {
            return tokens.next().and_then(|next| next.to_str());
        }
        if token.starts_with('-') && token.len() > 1 {
            if !token.contains('=') && takes_value(token) {
                tokens.next();
            }
            continue;
        }
        return Some(token);
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = match backend_args(std::env::args_os().collect()) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };
    let cli = Cli::parse_from(args);
    let env = Config::from_env()?;

    let telemetry = init_telemetry(TelemetryConfig {
        endpoint: env.otel_endpoint.clone(),
        service_name: "pcap-dispatcher".to_string(),
        log_level: cli.log_level(&env),
    })?;

    let config = cli.dispatcher_config()?;
    let endpoint = cli
        .topic
        .as_deref()
        .map(normalize_endpoint)
        .unwrap_or_else(|| env.topic_endpoint());
    debug!(?config, endpoint = %endpoint, "configuration");

    if let BackendConfig::Analysis(ref analysis) = config.backend
        && !analysis.output_dir.is_dir()
    {
        warn!(
            output_dir = %analysis.output_dir.display(),
            "output directory does not exist, logs will not be archived until it does"
        );
    }

    let lifecycle = Lifecycle::new().with_verbosity(telemetry.verbosity());
    let (control, _controller) = lifecycle.spawn_controller();
    lifecycle.forward_signals(control)?;

    if !lifecycle
        .startup_delay(Duration::from_secs(cli.start_sleep))
        .await
    {
        return Ok(());
    }

    let Some(source) = ZmqSource::connect(&endpoint, &lifecycle.token()).await? else {
        return Ok(());
    };

    let stats = Dispatcher::new(config).run(source, &lifecycle).await?;
    info!(?stats, "dispatcher stopped");
    Ok(())
}
