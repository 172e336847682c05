//! sqldocx - run SQL Server scripts into Word reports.

use sqldocx::app::{run_all, run_selection, run_until_interrupted, RunOptions, RunOutcome};
use sqldocx::cli::Cli;
use sqldocx::config::{Config, ConnectionConfig};
use sqldocx::document::StdinPrompter;
use sqldocx::error::{Result, SqlDocxError};
use sqldocx::logging;
use sqldocx::session::Session;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    let log_path = cli.log_path();
    match &log_path {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    let cancel = CancellationToken::new();
    let interrupts = || async { tokio::signal::ctrl_c().await.is_ok() };

    match run_until_interrupted(run(&cli, cancel.clone()), cancel, interrupts).await {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            error!("{}: {}", e.category(), e);
            if log_path.is_some() {
                eprintln!("{}: {}", e.category(), e);
            }
            std::process::exit(1);
        }
        None => {
            error!("Interrupted again; exiting without finishing the report");
            if log_path.is_some() {
                eprintln!("Interrupted");
            }
            std::process::exit(130);
        }
    }
}

async fn run(cli: &Cli, cancel: CancellationToken) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let mut report = config.report.clone();
    cli.apply_report_overrides(&mut report);
    report.validate()?;

    let mut session = if cli.mock_db {
        Session::mock()
    } else {
        Session::new(resolve_connection(cli, &config)?, report.connect_retries)
    };
    info!("Connection: {}", session.target());

    let options = RunOptions::from_config(&report).with_cancellation(cancel);
    let outcome = match cli.selection()? {
        None => run_all(&mut session, cli.script(), &options, &StdinPrompter).await,
        Some(selection) => {
            run_selection(&mut session, cli.script(), &selection, &options, &StdinPrompter).await
        }
    };

    if let Err(e) = session.close().await {
        warn!("Failed to close connection: {}", e);
    }

    print_outcome(&outcome?, cli.json)
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> Result<()> {
    if json {
        let summary = serde_json::to_string_pretty(outcome)
            .map_err(|e| SqlDocxError::internal(format!("Failed to serialize summary: {e}")))?;
        println!("{summary}");
        return Ok(());
    }

    match outcome {
        RunOutcome::Written {
            path,
            backup,
            merged,
            sections,
            errors,
            ..
        } => {
            println!("Results saved to {}", path.display());
            println!("{sections} queries executed, {errors} failed");
            if let Some(backup) = backup {
                println!("Previous report backed up to {}", backup.display());
                if !merged {
                    println!("Previous content could not be merged; it remains in the backup");
                }
            }
        }
        RunOutcome::Cancelled { path } => {
            println!("Cancelled; {} left unchanged", path.display());
        }
    }
    Ok(())
}

/// Resolves the final connection configuration.
///
/// Precedence: connection string, individual flags (over the named or default
/// connection), named connection, default connection, environment variables.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let base = match cli.connection_name() {
        Some(name) => Some(config.get_connection(Some(name)).cloned().ok_or_else(|| {
            SqlDocxError::config(format!("Connection '{name}' not found in config file"))
        })?),
        None => config.get_connection(None).cloned(),
    };

    let mut connection = match (cli.url.is_some(), cli.to_connection_config()?, base) {
        (true, from_url, _) => from_url,
        (false, Some(flags), Some(mut base)) => {
            base.merge(&flags);
            if let Some(trust_cert) = cli.trust_cert {
                base.trust_cert = trust_cert;
            }
            Some(base)
        }
        (false, flags, base) => flags.or(base),
    };

    if connection.is_none() && std::env::var("MSSQL_HOST").is_ok() {
        connection = Some(ConnectionConfig::default());
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}
