use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolforge::installer::{self, Installer};
use toolforge::{improve, mcp, AppContext, Config};

#[derive(Debug, Parser)]
#[command(name = "toolforge")]
#[command(version)]
#[command(about = "Self-improving MCP tool server over stdio")]
struct Cli {
    /// IDE MCP configuration file (default: ~/.cursor/mcp.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the JSON-RPC server on stdin/stdout (default)
    Serve,
    /// Register a published npm MCP server (launched with npx)
    #[command(alias = "url")]
    Install {
        package: String,
        /// Extra arguments passed to the server
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        args: Vec<String>,
        /// Environment variables in KEY=VALUE format
        #[arg(long, num_args = 1..)]
        env: Vec<String>,
    },
    /// Register a local Node MCP server directory
    Local {
        path: PathBuf,
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        args: Vec<String>,
        #[arg(long, num_args = 1..)]
        env: Vec<String>,
    },
    /// Register this executable as an MCP server
    Register {
        #[arg(long, default_value = "toolforge")]
        name: String,
    },
    /// Remove a server entry
    Remove { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries protocol traffic only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolforge=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Install { package, args, env } => match open_installer(cli.config) {
            Ok(i) => i.install_package(&package, &args, installer::parse_env_pairs(&env)).await,
            Err(e) => Err(e),
        },
        Command::Local { path, args, env } => open_installer(cli.config)
            .and_then(|i| i.install_local(&path, &args, installer::parse_env_pairs(&env)))
            .map(|name| tracing::info!("Installed {}", name)),
        Command::Register { name } => {
            open_installer(cli.config).and_then(|i| i.register_self(&name))
        }
        Command::Remove { name } => open_installer(cli.config)
            .and_then(|i| i.remove(&name))
            .map(|_| ()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<()> {
    tracing::info!("Starting Toolforge MCP server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::detect()?;
    tracing::info!("Project root: {:?}", config.project_root);

    let ctx = AppContext::new(config)?;

    if let Some(secs) = ctx.config().settings.analyzer.interval_secs.filter(|s| *s > 0) {
        tracing::info!("Updating rules document every {}s", secs);
        improve::spawn_periodic_updates(
            ctx.analyzer().clone(),
            ctx.usage().clone(),
            Duration::from_secs(secs),
        );
    }

    let server = mcp::Server::new(&ctx);
    mcp::run_stdio(&server).await?;

    tracing::info!("Input closed, shutting down");
    Ok(())
}

fn open_installer(config: Option<PathBuf>) -> Result<Installer> {
    let config_path = match config {
        Some(path) => path,
        None => installer::default_config_path()?,
    };
    Ok(Installer::new(config_path))
}
