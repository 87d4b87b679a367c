use log::{error, info, warn};
use std::path::PathBuf;

use terneo_lan::config::{self, Config};
use terneo_lan::services::poll;
use terneo_lan::TerneoClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Poll forever.
    Poll,
    /// One update cycle, then print the snapshot.
    Status,
    Restart,
}

#[derive(Debug)]
struct Cli {
    env_file: Option<PathBuf>,
    command: Command,
}

fn parse_cli() -> Result<Cli, String> {
    let mut args = std::env::args_os().skip(1);
    let mut env_file = None;
    let mut command = None;

    while let Some(arg) = args.next() {
        let arg = arg.to_str().ok_or_else(|| "argument contains invalid UTF-8".to_string())?;
        let path = match arg {
            "--env-file" => Some(
                args.next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?
                    .into(),
            ),
            s if s.starts_with("--env-file=") => Some(PathBuf::from(&s["--env-file=".len()..])),
            _ => None,
        };
        if let Some(path) = path {
            if env_file.replace(path).is_some() {
                return Err("`--env-file` provided more than once".to_string());
            }
            continue;
        }

        let next = match arg {
            "poll" => Command::Poll,
            "status" => Command::Status,
            "restart" => Command::Restart,
            other => return Err(format!("unrecognised argument: {}", other)),
        };
        if command.replace(next).is_some() {
            return Err("only one command may be given".to_string());
        }
    }

    Ok(Cli {
        env_file,
        command: command.unwrap_or(Command::Poll),
    })
}

/// Returns the file that was loaded, if any.
fn load_environment(explicit: Option<&PathBuf>) -> Result<Option<PathBuf>, String> {
    let path = match explicit {
        Some(path) if !path.is_file() => return Err(format!("env file not found: {}", path.display())),
        Some(path) => path.clone(),
        None => {
            let default = std::env::current_dir()
                .map_err(|e| format!("unable to read current directory: {}", e))?
                .join(".env");
            if !default.is_file() {
                return Ok(None);
            }
            default
        }
    };
    config::load_env_file(&path)?;
    Ok(Some(path))
}

fn run(command: Command) -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (host={}, serial={}, generation={}, timeout={}s, poll_interval={}s)",
        cfg.host,
        cfg.serial,
        cfg.generation.map(|g| g.to_string()).unwrap_or_else(|| "detect".to_string()),
        cfg.timeout.as_secs(),
        cfg.poll_interval.as_secs()
    );

    // Pairing hands its transport over to the client.
    let client = match cfg.generation {
        Some(g) => TerneoClient::connect(cfg.identity(g), cfg.timeout),
        None => terneo_lan::pair(&cfg.host, &cfg.serial, cfg.timeout)
            .map_err(|e| format!("Pairing with {} failed: {}", cfg.host, e))?,
    };
    let generation = client.generation();
    if !client.is_available() {
        warn!("Thermostat {} did not answer the liveness probe; continuing", cfg.serial);
    }

    match command {
        Command::Poll => {
            info!(
                "Starting poll loop: thermostat={}, generation={}, interval={}s",
                cfg.serial,
                generation,
                cfg.poll_interval.as_secs()
            );
            poll::run_loop(&client, cfg.poll_interval)
        }
        Command::Status => {
            client.update().map_err(|e| format!("Status read failed: {}", e))?;
            println!("{} {}", cfg.serial, poll::summary(&client.state()));
            Ok(())
        }
        Command::Restart => client.restart().map_err(|e| format!("Restart failed: {}", e)),
    }
}

fn main() {
    let (cli, loaded_env) = match parse_cli().and_then(|cli| Ok((load_environment(cli.env_file.as_ref())?, cli))) {
        Ok((loaded, cli)) => (cli, loaded),
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from {}", path.display());
    }

    info!(
        "terneo-lan {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
