use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use autologout_sync::sync::models::{parse_time_of_day, UNLIMITED};
use autologout_sync::{
    AuthRejection, AuthorizeOutcome, Config, HttpStateApi, NetworkState, RemoteState,
    RemoteStatePatch, SqliteStore, SyncEngine,
};

/// Remotely manage time limits and downtime on computers running AutoLogout
#[derive(Parser)]
#[command(name = "autologout-sync")]
#[command(about = "Manage AutoLogout accounts from the command line", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected accounts
    List,

    /// Connect a computer, or sign a signed-out account back in
    Add {
        /// Account UUID shown by "Connect to your phone"
        uuid: String,

        /// Display name for this account
        name: String,

        /// Parent password set on the computer
        #[arg(long, env = "AUTOLOGOUT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show the cached state of an account
    Show { uuid: String },

    /// Fetch the latest state from the server (all accounts when no UUID is given)
    Refresh { uuid: Option<String> },

    /// Push new settings to a computer
    Set {
        uuid: String,

        /// Daily limit in minutes, or "off"
        #[arg(long)]
        daily_limit: Option<String>,

        /// Today's limit in minutes, or "off"
        #[arg(long)]
        today_limit: Option<String>,

        /// Downtime window as BEDTIME-WAKETIME (e.g. 22:00-07:00), or "off"
        #[arg(long)]
        downtime: Option<String>,
    },

    /// Remove an account from this device
    Remove { uuid: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Arc::new(
        SqliteStore::new(config.database_path())
            .await
            .context("Failed to open local database")?,
    );
    let api = Arc::new(
        HttpStateApi::new(config.api_url()?, config.request_timeout())
            .context("Failed to create HTTP client")?,
    );
    let engine = SyncEngine::with_recency_threshold(store, api, config.recency_threshold());

    let outcome = engine.start().await.context("Failed to load accounts")?;
    debug!("Startup refresh: {:?}", outcome);

    match cli.command {
        Commands::List => list(&engine).await,
        Commands::Add {
            uuid,
            name,
            password,
        } => add(&engine, &uuid, &name, &password).await,
        Commands::Show { uuid } => show(&engine, &uuid).await,
        Commands::Refresh { uuid } => refresh(&engine, uuid.as_deref()).await,
        Commands::Set {
            uuid,
            daily_limit,
            today_limit,
            downtime,
        } => {
            let mut patch = RemoteStatePatch::default();
            if let Some(value) = daily_limit {
                patch = patch.with_daily_limit(parse_limit(&value)?);
            }
            if let Some(value) = today_limit {
                patch = patch.with_today_limit(parse_limit(&value)?);
            }
            if let Some(value) = downtime {
                patch = patch.with_downtime(parse_downtime(&value)?);
            }
            set(&engine, &uuid, patch).await
        }
        Commands::Remove { uuid } => {
            let Some(account) = engine.account(&uuid).await else {
                bail!("No account {}", uuid);
            };
            engine.remove(&uuid).await;
            if engine.account(&uuid).await.is_some() {
                bail!("Failed to remove '{}'", account.name);
            }
            println!("Removed '{}'. It keeps working with any other connected devices.", account.name);
            Ok(())
        }
    }
}

async fn list(engine: &SyncEngine) -> Result<()> {
    let accounts = engine.accounts().await;
    if accounts.is_empty() {
        println!("No accounts connected. Use `add` with the UUID shown by AutoLogout.");
        return Ok(());
    }

    let now = Utc::now().timestamp_millis();
    for (uuid, account) in &accounts {
        println!(
            "{}  {:<20} {:<14} last sync: {}",
            uuid,
            account.name,
            account.state.to_string(),
            relative_time(account.last_sync, now)
        );
    }
    Ok(())
}

async fn add(engine: &SyncEngine, uuid: &str, name: &str, password: &str) -> Result<()> {
    match engine.authorize(uuid, name, password).await {
        AuthorizeOutcome::Authorized(state) => {
            info!("Account {} connected", uuid);
            print_state(name, &state);
            Ok(())
        }
        AuthorizeOutcome::Rejected(AuthRejection::WrongPassword) => bail!(
            "Incorrect password. Use the password you set when opening AutoLogout on this account."
        ),
        AuthorizeOutcome::Rejected(AuthRejection::UnknownAccount) => bail!(
            "Account not found. Make sure the computer is online; you may need to click 'Connect to your phone' again."
        ),
        AuthorizeOutcome::Invalid(e) => bail!("{}", e),
        AuthorizeOutcome::Failed => {
            let registered = engine
                .account(uuid)
                .await
                .is_some_and(|account| account.state != NetworkState::Active);
            if registered {
                bail!(
                    "Account saved, but its state could not be fetched yet. Try `refresh {}`.",
                    uuid
                );
            }
            bail!("Failed to add account. Double-check your internet connection and try again.")
        }
    }
}

async fn show(engine: &SyncEngine, uuid: &str) -> Result<()> {
    let Some(account) = engine.account(uuid).await else {
        bail!("No account {}", uuid);
    };
    report_health(account.state);

    match engine.state(uuid).await {
        Some(state) => print_state(&account.name, &state),
        None => println!("{}: no state fetched yet", account.name),
    }
    Ok(())
}

async fn refresh(engine: &SyncEngine, uuid: Option<&str>) -> Result<()> {
    let targets: Vec<String> = match uuid {
        Some(uuid) => vec![uuid.to_string()],
        None => engine.accounts().await.into_keys().collect(),
    };

    for uuid in targets {
        let Some(account) = engine.account(&uuid).await else {
            bail!("No account {}", uuid);
        };
        match engine.refresh(&uuid).await {
            Some(state) => print_state(&account.name, &state),
            None => {
                println!("{}: refresh failed", account.name);
                if let Some(account) = engine.account(&uuid).await {
                    report_health(account.state);
                }
            }
        }
    }
    Ok(())
}

async fn set(engine: &SyncEngine, uuid: &str, patch: RemoteStatePatch) -> Result<()> {
    let Some(account) = engine.account(uuid).await else {
        bail!("No account {}", uuid);
    };
    if patch.is_empty() {
        bail!("Nothing to change. Pass --daily-limit, --today-limit or --downtime.");
    }
    if let Some(current) = engine.state(uuid).await {
        if !patch.differs_from(&current) {
            println!("{}: already up to date", account.name);
            return Ok(());
        }
    }

    if !engine.push(uuid, &patch, &account.auth_key).await {
        if let Some(account) = engine.account(uuid).await {
            report_health(account.state);
        }
        bail!("The new settings were not accepted");
    }

    // Pick up anything else the server changed in the meantime
    let state = match engine.refresh(uuid).await {
        Some(state) => Some(state),
        None => engine.state(uuid).await,
    };
    if let Some(state) = state {
        print_state(&account.name, &state);
    }
    Ok(())
}

fn report_health(state: NetworkState) {
    match state {
        NetworkState::NetworkError => {
            println!("Unable to sync account. Check your network connection.")
        }
        NetworkState::Unauthorized => println!(
            "You have been signed out of this account. Run `add` again with the password to sign back in."
        ),
        NetworkState::Unknown | NetworkState::Active => {}
    }
}

fn print_state(name: &str, state: &RemoteState) {
    println!("{}", name);
    println!(
        "  Last usage:   {} (on {}, {:.0}% of today)",
        format_seconds(state.used_time),
        state.usage_date,
        state.usage_ratio() * 100.0
    );
    println!("  Today limit:  {}", format_limit(state.today_time_limit));
    println!("  Daily limit:  {}", format_limit(state.daily_time_limit));
    if state.has_downtime() {
        println!("  Downtime:     {} until {}", state.bedtime, state.waketime);
    } else {
        println!("  Downtime:     no restrictions");
    }
}

fn format_limit(seconds: i64) -> String {
    if seconds == UNLIMITED {
        "unlimited".to_string()
    } else {
        format_seconds(seconds)
    }
}

fn format_seconds(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds / 60) % 60;
    format!("{}h {:02}m", hours, minutes)
}

fn relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    if timestamp_ms <= 0 {
        return "never".to_string();
    }
    let seconds = (now_ms - timestamp_ms).max(0) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("{} minute{} ago", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        format!("{} second{} ago", seconds, if seconds == 1 { "" } else { "s" })
    }
}

/// Minutes, or "off" for unlimited.
fn parse_limit(value: &str) -> Result<Option<i64>> {
    if value.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    let minutes: i64 = value
        .parse()
        .with_context(|| format!("Invalid limit '{}', expected minutes or 'off'", value))?;
    if !(0..=24 * 60).contains(&minutes) {
        bail!("Limit must be between 0 and 1440 minutes");
    }
    Ok(Some(minutes * 60))
}

/// `BEDTIME-WAKETIME`, or "off" to lift the downtime.
fn parse_downtime(value: &str) -> Result<Option<(chrono::NaiveTime, chrono::NaiveTime)>> {
    if value.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    let Some((bed, wake)) = value.split_once('-') else {
        bail!("Invalid downtime '{}', expected e.g. 22:00-07:00", value);
    };
    let bed = parse_time_of_day(bed.trim()).with_context(|| format!("Invalid bedtime '{}'", bed))?;
    let wake =
        parse_time_of_day(wake.trim()).with_context(|| format!("Invalid waketime '{}'", wake))?;
    if bed == wake {
        bail!("Bedtime and waketime must differ; use 'off' to lift the downtime");
    }
    Ok(Some((bed, wake)))
}
