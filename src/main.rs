//! Credkeep -- inspect and manage the stored OAuth credential.
//!
//! Startup order:
//!   - Configuration loading (file + `CREDKEEP_*` env overrides)
//!   - Tracing initialisation (stderr)
//!   - Backend probe and selection
//!   - Legacy token migration
//!   - Command dispatch

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use credkeep::bootstrap::{Bootstrapped, open_token_store};
use credkeep::config::Config;
use credkeep::{MigrationOutcome, TokenError};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Logout,
    Migrate,
    Path,
    Config,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Self::Status),
            "logout" => Some(Self::Logout),
            "migrate" => Some(Self::Migrate),
            "path" => Some(Self::Path),
            "config" => Some(Self::Config),
            _ => None,
        }
    }
}

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    let mut command = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("credkeep {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => match Command::parse(other) {
                Some(cmd) if command.is_none() => command = Some(cmd),
                _ => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Run with --help for usage information.");
                    std::process::exit(1);
                }
            },
        }
    }

    CliArgs {
        config_path,
        command: command.unwrap_or(Command::Status),
    }
}

fn print_usage() {
    println!(
        "\
credkeep {version} -- OAuth credential storage

USAGE:
    credkeep [OPTIONS] [COMMAND]

COMMANDS:
    status     Show the active backend and whether a token is stored [default]
    logout     Delete the stored token
    migrate    Import the legacy plaintext token file, if any
    path       Print where the token is stored
    config     Print the effective configuration

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: <config-dir>/config.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG                      Override log level (e.g. RUST_LOG=debug)
    CREDKEEP_CONFIG               Alternative to --config flag
    CREDKEEP_STORAGE_BACKEND      auto | keychain | secret-helper | file
    CREDKEEP_CONFIG_DIR           Directory holding token.json
    CREDKEEP_LEGACY_TOKEN_PATH    Plaintext token file to import
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    let config_path = cli
        .config_path
        .or_else(|| std::env::var_os("CREDKEEP_CONFIG").map(PathBuf::from))
        .unwrap_or_else(Config::default_path);

    let config = Config::load(&config_path)?;
    init_tracing(&config);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        command = ?cli.command,
        "Starting credkeep"
    );

    if cli.command == Command::Config {
        print_config(&config, &config_path)?;
        return Ok(());
    }

    let boot = open_token_store(&config.storage)?;

    match cli.command {
        Command::Status => status(&boot),
        Command::Logout => logout(&boot),
        Command::Migrate => migrate(&boot),
        Command::Path => {
            println!("{}", boot.store.location());
            Ok(())
        }
        Command::Config => Ok(()),
    }
}

fn status(boot: &Bootstrapped) -> anyhow::Result<()> {
    let store = &boot.store;
    let security = if store.is_secure_storage() {
        "secure"
    } else {
        "best-effort"
    };
    println!("backend:  {} ({security})", store.active_backend());
    println!("location: {}", store.location());

    match store.get_token() {
        Ok(token) => {
            println!("token:    present");
            if !token.has_refresh_token() {
                println!("refresh:  none (re-authorization needed once the token expires)");
            }
            match token.expiry {
                Some(expiry) if token.is_expired() => println!("expiry:   {expiry} (expired)"),
                Some(expiry) => println!("expiry:   {expiry}"),
                None => println!("expiry:   unknown"),
            }
        }
        Err(TokenError::NotFound) => println!("token:    none"),
        Err(e) => println!("token:    unreadable ({e})"),
    }
    if let Err(e) = &boot.migration {
        println!("migration: failed ({e})");
    }
    Ok(())
}

fn logout(boot: &Bootstrapped) -> anyhow::Result<()> {
    boot.store.delete_token()?;
    tracing::info!(backend = %boot.store.active_backend(), "token deleted");
    println!("Logged out.");
    Ok(())
}

fn migrate(boot: &Bootstrapped) -> anyhow::Result<()> {
    // Startup already ran the import; report what it did.
    match &boot.migration {
        Ok(MigrationOutcome::Imported { from }) => {
            println!("Imported {} into {}", from.display(), boot.store.active_backend());
            Ok(())
        }
        Ok(other) => {
            println!("{other}");
            Ok(())
        }
        Err(e) => anyhow::bail!("legacy token migration failed: {e}"),
    }
}

fn print_config(config: &Config, config_path: &std::path::Path) -> anyhow::Result<()> {
    println!("# {}", config_path.display());
    print!("{}", toml::to_string_pretty(config)?);

    let mut overrides: Vec<_> = config.env_overrides.all().iter().collect();
    if !overrides.is_empty() {
        overrides.sort();
        println!();
        for (key, var) in overrides {
            println!("# {key} overridden by {var}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("credkeep={level},warn"))
    });

    // Command output owns stdout.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
