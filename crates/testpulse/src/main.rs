use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use testpulse::config::ServerConfig;
use testpulse::prelude::*;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "testpulse", version, about = "Real-time test analytics server")]
struct Cli {
    /// TOML configuration file. Defaults plus TESTPULSE_* variables if omitted.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server (the default).
    Serve,
    /// Read a password from stdin and print its bcrypt hash.
    HashPassword {
        /// bcrypt cost factor.
        #[arg(long)]
        cost: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config).await,
        Command::HashPassword { cost } => hash_password(cost).await,
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "testpulse failed");
            eprintln!("testpulse: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<(), TestpulseError> {
    let config = ServerConfig::load(config_path.as_deref())?;
    testpulse::logging::init(&config.logging)?;
    info!(
        bind_addr = %config.server.bind_addr,
        auth_policy = ?config.session.auth_policy,
        push_interval_secs = config.session.push_interval_secs,
        "starting testpulse"
    );

    let store = Arc::new(
        MySqlStore::connect(&config.store.database_url, &config.store.pool_options()).await?,
    );
    if config.store.create_schema {
        store.ensure_schema().await?;
    }

    let auth = PasswordAuthenticator::new(
        Arc::clone(&store),
        CredentialVerifier::new(config.auth.bcrypt_cost),
        TokenIssuer::new(config.auth.jwt_secret.as_bytes(), config.auth.token_ttl()),
    )
    .await?
    .with_distinct_errors(config.auth.distinct_errors);

    let server = TestpulseServerBuilder::from_config(&config)
        .build(auth, Arc::clone(&store))
        .await?;
    let result = server.run_until(shutdown_signal()).await;
    store.close().await;
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn hash_password(cost: Option<u32>) -> Result<(), TestpulseError> {
    let verifier = cost.map_or_else(CredentialVerifier::default, CredentialVerifier::new);
    let mut password = String::new();
    std::io::stdin().lock().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty password").into());
    }
    println!("{}", verifier.hash(password).await?);
    Ok(())
}
