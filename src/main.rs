use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{self, EnvFilter};

use followback::config::Config;
use followback::error::{ErrorRecovery, FollowbackError, GitHubError};
use followback::github::{GitHubClient, GitHubUser};
use followback::status::check_status;
use followback::store::{FileFollowCounter, FileFollowLog};
use followback::worker::{FollowBackWorker, RetryPolicy};

#[derive(Parser)]
#[command(name = "followback")]
#[command(about = "Follows back every GitHub follower you are not following yet")]
#[command(version)]
struct Cli {
    /// Path to configuration file (can also be set via FOLLOWBACK_CONFIG env var)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Enable verbose logging (equivalent to --log-level debug)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Follow back every pending follower (default)
    Run,
    /// Show how many followers are left and how many can be followed now
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every follower with id, avatar and profile URL
    Followers {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var("FOLLOWBACK_CONFIG").ok().map(PathBuf::from))
    }
}

fn init_logging(config: &Config, cli: &Cli) -> Result<(), FollowbackError> {
    let log_level = if cli.verbose {
        "debug"
    } else if let Some(ref level) = cli.log_level {
        level.as_str()
    } else {
        config.logging.level.as_deref().unwrap_or("info")
    };

    if log_level.parse::<Level>().is_err() {
        return Err(FollowbackError::InvalidData(format!(
            "Invalid log level: {log_level}. Valid levels are: error, warn, info, debug, trace"
        )));
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| FollowbackError::InvalidData(format!("Failed to create log filter: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .init();

    debug!("Logging initialized with level: {}", log_level);
    Ok(())
}

/// Log the error; only errors that should stop the process are passed back
fn handle_error(error: FollowbackError) -> Result<(), FollowbackError> {
    match &error {
        FollowbackError::Config(_) => {
            error!("Configuration error: {}", error);
            error!("Set GITHUB_USER and PERSONAL_GITHUB_TOKEN in the environment or a .env file");
        }
        FollowbackError::GitHub(GitHubError::AuthenticationFailed(_)) => {
            error!("{}", error);
            error!("Check that PERSONAL_GITHUB_TOKEN is valid and has the user:follow scope");
        }
        FollowbackError::GitHub(GitHubError::RateLimitExceeded { .. }) => {
            warn!("{}", error);
            info!("The next scheduled run will pick up where this one stopped");
        }
        FollowbackError::Store(_) => {
            error!("{}", error);
        }
        _ => {
            error!("Application error: {}", error);
            debug!("Error details: {:?}", error);
        }
    }

    if ErrorRecovery::should_shutdown(&error) {
        return Err(error);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), FollowbackError> {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    let config = match Config::load(cli.config_path()) {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().init();
            return handle_error(FollowbackError::Config(e));
        }
    };

    if let Err(e) = init_logging(&config, &cli) {
        eprintln!("Failed to initialize logging: {e}");
        return Err(e);
    }

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    }

    info!("Starting followback v{}", env!("CARGO_PKG_VERSION"));
    info!("GitHub account: {}", config.github.user);
    debug!("GitHub API: {}", config.github.api_url());

    let command = cli.command.clone().unwrap_or(Command::Run);
    match run_application(config, command).await {
        Ok(()) => {
            info!("Bot execution completed");
            Ok(())
        }
        Err(e) => handle_error(e),
    }
}

fn render_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, FollowbackError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| FollowbackError::InvalidData(format!("Failed to render {what}: {e}")))
}

fn render_followers(followers: &[GitHubUser]) -> String {
    let mut lines: Vec<String> = followers
        .iter()
        .map(|f| {
            format!(
                "{} (id {}) {}",
                f.login,
                f.id,
                f.html_url.as_deref().unwrap_or("-")
            )
        })
        .collect();
    lines.push(format!("Total: {}", followers.len()));
    lines.join("\n")
}

async fn run_application(config: Config, command: Command) -> Result<(), FollowbackError> {
    let client = GitHubClient::new(&config.github)?;
    let account = config.github.user.as_str();

    match command {
        Command::Run => {
            let log = FileFollowLog::open(config.storage.log_path())?;
            let counter = FileFollowCounter::open(config.storage.counter_path())?;
            let mut worker =
                FollowBackWorker::new(client, log, counter, RetryPolicy::from(&config.retry));
            let report = worker.run(account).await?;
            println!("{report}");
        }
        Command::Status { json } => {
            let log = FileFollowLog::open(config.storage.log_path())?;
            let counter = FileFollowCounter::open(config.storage.counter_path())?;
            let report = check_status(&client, account, &log, &counter).await?;
            if json {
                println!("{}", render_json(&report, "status")?);
            } else {
                println!("{report}");
            }
        }
        Command::Followers { json } => {
            let followers = client.follower_details(account).await?;
            if json {
                println!("{}", render_json(&followers, "followers")?);
            } else {
                println!("{}", render_followers(&followers));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["followback"]);
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
        assert!(!cli.verbose);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["followback", "--config", "/path/to/followback.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/followback.toml")));

        let cli = Cli::parse_from(["followback", "--log-level", "debug", "run"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert_eq!(cli.command, Some(Command::Run));

        let cli = Cli::parse_from(["followback", "-v", "status", "--json"]);
        assert!(cli.verbose);
        assert_eq!(cli.command, Some(Command::Status { json: true }));

        let cli = Cli::parse_from(["followback", "followers", "--json"]);
        assert_eq!(cli.command, Some(Command::Followers { json: true }));
    }

    #[test]
    fn test_render_followers() {
        let followers = vec![
            GitHubUser {
                login: "mona".to_string(),
                id: 583231,
                avatar_url: None,
                html_url: Some("https://github.com/mona".to_string()),
            },
            GitHubUser {
                login: "hubot".to_string(),
                id: 1,
                avatar_url: None,
                html_url: None,
            },
        ];

        let output = render_followers(&followers);
        assert_eq!(
            output,
            "mona (id 583231) https://github.com/mona\nhubot (id 1) -\nTotal: 2"
        );

        let json = render_json(&followers, "followers").unwrap();
        assert!(json.contains("\"avatar_url\": null"));
    }

    #[test]
    fn test_followback_config_env_var() {
        std::env::set_var("FOLLOWBACK_CONFIG", "/env/path/followback.toml");

        let cli = Cli::parse_from(["followback"]);
        assert_eq!(
            cli.config_path(),
            Some(PathBuf::from("/env/path/followback.toml"))
        );

        let cli = Cli::parse_from(["followback", "--config", "/cli/path/followback.toml"]);
        assert_eq!(
            cli.config_path(),
            Some(PathBuf::from("/cli/path/followback.toml"))
        );

        std::env::remove_var("FOLLOWBACK_CONFIG");

        let cli = Cli::parse_from(["followback"]);
        assert_eq!(cli.config_path(), None);
    }

    #[test]
    fn test_handle_error_rate_limit_is_not_fatal() {
        let error = FollowbackError::GitHub(GitHubError::RateLimitExceeded { reset_at: None });
        assert!(handle_error(error).is_ok());

        let error = FollowbackError::GitHub(GitHubError::AuthenticationFailed(
            "Bad credentials".to_string(),
        ));
        assert!(handle_error(error).is_err());
    }
}
