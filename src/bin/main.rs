//! scripter-pool CLI - warm and serve a pool of script environments

use clap::{Parser, Subcommand};
use scripter_pool::api::Server;
use scripter_pool::{
    Dynamic, EnvironmentBuilder, EnvironmentPool, PoolSettings, ScriptEnvironment, StatusReporter, WarmupCoordinator,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "scripter-pool")]
#[command(about = "Pre-warmed pool of script environments for the update service")]
#[command(version)]
struct Cli {
    /// Settings file (.properties or .json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Directory holding the distributions tree
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
    /// Distribution to load the entry point from
    #[arg(long, global = true)]
    install_name: Option<String>,
    /// Requested number of environments (clamped to 5..=100)
    #[arg(long, global = true)]
    pool_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Warm the pool in the background and serve health/status endpoints
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Build every environment and report the outcome
    Warm,
    /// Borrow an environment and call a script function
    Call {
        /// Function name
        function: String,
        /// Arguments; integers are passed as numbers, anything else as strings
        args: Vec<String>,
        /// Give up if no environment is ready in time (seconds)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

type AppPool = Arc<EnvironmentPool<ScriptEnvironment>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scripter_pool=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let pool: AppPool = Arc::new(EnvironmentPool::new());
    let warmup = WarmupCoordinator::new(Arc::new(EnvironmentBuilder::new()), Arc::clone(&pool));

    match cli.command {
        Commands::Serve { host, port } => {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

            warmup.start(&settings)?;

            println!("Serving on http://{}", addr);
            println!();
            println!("Endpoints:");
            println!("  GET  /health            Liveness");
            println!("  GET  /api/v1/status     Pool status");
            println!("  GET  /api/v1/ready      503 until every environment is built");
            println!();

            let reporter = StatusReporter::new(pool.clone());
            Server::new(reporter, addr).run().await?;
        }
        Commands::Warm => {
            let Some(handle) = warmup.start(&settings)? else {
                return Ok(());
            };
            let report = tokio::task::spawn_blocking(move || handle.join()).await?;

            println!(
                "Built {} of {} environments in {} ms",
                report.built,
                report.target,
                report.duration.as_millis()
            );
            for failure in &report.failures {
                println!("  #{}: {}", failure.index, failure.error);
            }
            if !report.is_complete() {
                std::process::exit(1);
            }
        }
        Commands::Call { function, args, timeout } => {
            warmup.start(&settings)?;
            let timeout = timeout.map(Duration::from_secs);
            let result = tokio::task::spawn_blocking(move || call(&pool, &function, &args, timeout)).await??;
            println!("{}", result);
        }
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> scripter_pool::Result<PoolSettings> {
    let mut settings = match &cli.settings {
        Some(path) => PoolSettings::load(path)?,
        None => PoolSettings::default(),
    };

    if let Some(dir) = &cli.base_dir {
        settings.base_dir = dir.clone();
    }
    if let Some(name) = &cli.install_name {
        settings.install_name = name.clone();
    }
    if let Some(size) = cli.pool_size {
        settings.pool_size = size;
    }

    settings.validate()?;
    Ok(settings)
}

fn call(pool: &AppPool, function: &str, args: &[String], timeout: Option<Duration>) -> scripter_pool::Result<Dynamic> {
    let mut env = match timeout {
        Some(timeout) => pool.acquire_timeout(timeout)?,
        None => pool.acquire(),
    };

    let args = args
        .iter()
        .map(|arg| match arg.parse::<i64>() {
            Ok(n) => Dynamic::from(n),
            Err(_) => Dynamic::from(arg.clone()),
        })
        .collect();

    env.call_function(function, args)
}
