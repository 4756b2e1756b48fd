use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ferros_core::events::EventBus;
use ferros_core::platform::sim::{ImageEvaluator, ProgramImage, SimulatedProcess};
use ferros_core::{spawn_resync, Debugger, FerrosError};
use ferros_protocol::{Client, ClientError, Server, ServerError};
use ferros_ui::{Terminal, TerminalError, TerminalOptions};
use ferros_utils::{
    debug, info, init_logging, init_logging_for_terminal, warn, ConfigError, ConfigOverrides, FerrosConfig,
    LogLevel, LoggingError,
};
use tokio_util::sync::CancellationToken;

const GOODBYE: &str = "[Hope I was of service hunting your bug!]";

/// Debugger control plane with a remote terminal front-end.
#[derive(Parser, Debug)]
#[command(name = "ferros")]
#[command(version)]
#[command(about = "Debugger control plane with a remote terminal front-end", long_about = None)]
struct Cli
{
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level: error, warn, info, debug, or trace (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Resync period in milliseconds
    #[arg(long, global = true)]
    resync_ms: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Run a debugger server until ctrl-c
    Serve
    {
        /// Program image to debug (defaults to the built-in demo)
        #[arg(long)]
        image: Option<PathBuf>,
        /// Address to listen on
        #[arg(long)]
        addr: Option<String>,
    },
    /// Open a terminal against a running server
    Connect
    {
        /// Server address, e.g. 127.0.0.1:4711
        addr: String,
        /// Program image used by `print`, `info`, and `goroutines`
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Start a server and a terminal in one process
    Run
    {
        /// Program image to debug (defaults to the built-in demo)
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError
{
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Debugger(#[from] FerrosError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CliError
{
    fn exit_code(&self) -> i32
    {
        match self {
            Self::Terminal(err) => err.exit_code(),
            _ => 1,
        }
    }
}

fn main()
{
    let cli = Cli::parse();

    let result = tokio::runtime::Runtime::new()
        .map_err(CliError::from)
        .and_then(|rt| rt.block_on(run_command(cli)));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        process::exit(err.exit_code());
    }
}

async fn run_command(cli: Cli) -> Result<(), CliError>
{
    let mut overrides = ConfigOverrides {
        config_file: cli.config,
        listen_addr: None,
        resync_interval_ms: cli.resync_ms,
    };

    match cli.command {
        Commands::Serve { image, addr } => {
            let _guard = init_logging(cli.log_level)?;
            overrides.listen_addr = addr;
            let config = FerrosConfig::resolve(&overrides)?;
            serve(&config, image.as_deref()).await
        }
        Commands::Connect { addr, image } => {
            let (log_path, _guard) = init_logging_for_terminal(cli.log_level)?;
            debug!("Logging to {}", log_path.display());
            let config = FerrosConfig::resolve(&overrides)?;

            let client = Client::open(&addr).await?;
            let mut terminal = Terminal::new(client, TerminalOptions::from(&config));
            if let Some(path) = image {
                let image = ProgramImage::load(path)?;
                terminal = terminal.with_evaluator(Arc::new(ImageEvaluator::new(Arc::new(image))));
            }
            terminal.run().await?;
            println!("{GOODBYE}");
            Ok(())
        }
        Commands::Run { image } => {
            let (log_path, _guard) = init_logging_for_terminal(cli.log_level)?;
            debug!("Logging to {}", log_path.display());
            let config = FerrosConfig::resolve(&overrides)?;
            run_local(&config, image.as_deref()).await
        }
    }
}

fn load_image(path: Option<&Path>) -> Result<ProgramImage, FerrosError>
{
    match path {
        Some(path) => ProgramImage::load(path),
        None => Ok(ProgramImage::demo()),
    }
}

/// A started debugger, its server, and the resync timer.
struct Session
{
    debugger: Debugger,
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl Session
{
    async fn start(config: &FerrosConfig, image: ProgramImage) -> Result<Self, CliError>
    {
        let debugger =
            Debugger::start(move || SimulatedProcess::launch(image), EventBus::new(config.event_buffer)).await?;
        let server = Server::bind(&config.listen_addr, debugger.clone()).await?;
        let addr = server.local_addr()?;

        let cancel = CancellationToken::new();
        tokio::spawn(server.run(cancel.clone()));
        spawn_resync(debugger.clone(), config.resync_interval(), cancel.clone());

        Ok(Self { debugger, addr, cancel })
    }

    /// Stop accepting, stop the resync timer, then drain the Process Owner.
    async fn shutdown(self)
    {
        self.cancel.cancel();
        self.debugger.shutdown().await;
        info!("Debugger shut down");
    }
}

async fn serve(config: &FerrosConfig, image: Option<&Path>) -> Result<(), CliError>
{
    let session = Session::start(config, load_image(image)?).await?;
    info!(addr = %session.addr, "Listening");
    println!("Listening on {}", session.addr);

    let signal = tokio::signal::ctrl_c().await;
    if let Err(err) = signal {
        warn!("Waiting for ctrl-c failed: {err}");
    }
    session.shutdown().await;
    Ok(())
}

async fn run_local(config: &FerrosConfig, image: Option<&Path>) -> Result<(), CliError>
{
    let image = load_image(image)?;
    let evaluator = Arc::new(ImageEvaluator::new(Arc::new(image.clone())));
    let session = Session::start(config, image).await?;

    let result = match Client::open(&session.addr.to_string()).await {
        Ok(client) => Terminal::new(client, TerminalOptions::from(config))
            .with_evaluator(evaluator)
            .run()
            .await
            .map_err(CliError::from),
        Err(err) => Err(err.into()),
    };

    session.shutdown().await;
    if result.is_ok() {
        println!("{GOODBYE}");
    }
    result
}
