use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use castwatch::{
    config::Config,
    config_persistence::{default_config_path, load_config_file},
    protocol::{Message, SessionMessage, StatusMessage},
    replay::replay_reports,
    session::ObserverSession,
    session_manager::SessionManager,
    simulator::{default_script, run_simulation, DEFAULT_POLL_INTERVAL},
};
use log::{debug, info, warn};
use tokio::sync::broadcast;

const USAGE: &str = "usage: castwatch [--config <path>] [--verbose] <replay <file> | simulate [--seconds N] [--echo-stale]>";
const DEFAULT_SIMULATION_SECONDS: u64 = 16;

#[derive(Debug, PartialEq)]
enum Command {
    Replay { path: PathBuf },
    Simulate { seconds: u64, echo_stale: bool },
}

#[derive(Debug, PartialEq)]
struct CliArgs {
    config_path: Option<PathBuf>,
    verbose: bool,
    command: Command,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut config_path = None;
    let mut verbose = false;
    let mut command_name = None;
    let mut positional = Vec::new();
    let mut seconds = DEFAULT_SIMULATION_SECONDS;
    let mut echo_stale = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config requires a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--verbose" | "-v" => verbose = true,
            "--seconds" => {
                let value = args.next().ok_or("--seconds requires a value")?;
                seconds = value
                    .parse::<u64>()
                    .map_err(|err| format!("invalid --seconds value '{}': {}", value, err))?;
            }
            "--echo-stale" => echo_stale = true,
            other if other.starts_with('-') => return Err(format!("unknown flag '{}'", other)),
            other if command_name.is_none() => command_name = Some(other.to_string()),
            other => positional.push(other.to_string()),
        }
    }

    let command = match command_name.as_deref() {
        Some("replay") => {
            let path = positional.first().ok_or("replay requires a file")?;
            Command::Replay {
                path: PathBuf::from(path),
            }
        }
        Some("simulate") => Command::Simulate {
            seconds,
            echo_stale,
        },
        Some(other) => return Err(format!("unknown command '{}'", other)),
        None => return Err("missing command".to_string()),
    };

    Ok(CliArgs {
        config_path,
        verbose,
        command,
    })
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        config.logging.level_filter()
    };
    let mut clog = colog::default_builder();
    clog.filter(None, level);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));
}

fn run_replay(config: &Config, path: &Path) -> Result<(), String> {
    let file = File::open(path)
        .map_err(|err| format!("failed to open replay file {}: {}", path.display(), err))?;
    let mut session = ObserverSession::new(config);
    let summary = replay_reports(BufReader::new(file), &mut session, Instant::now())?;
    session.teardown();
    info!(
        "Replay finished: accepted={} rejected={} suppressed={} clamped={}",
        summary.accepted, summary.rejected, summary.suppressed, summary.clamped
    );
    match session.status() {
        Some(status) => info!(
            "Final status: {} at {:.2}s",
            status.kind(),
            session.display_time()
        ),
        None => info!("Final status: none"),
    }
    Ok(())
}

fn log_observer_view(mut bus_receiver: broadcast::Receiver<Message>) {
    loop {
        match bus_receiver.blocking_recv() {
            Ok(Message::Status(StatusMessage::StatusChanged(status))) => {
                info!("Observer: status {}", status.kind());
            }
            Ok(Message::Status(StatusMessage::DisplayTimeChanged { seconds, paused })) => {
                let state = if paused { "paused" } else { "playing" };
                info!("Observer: {:>6.2}s ({})", seconds, state);
            }
            Ok(Message::Status(StatusMessage::VisibilityChanged(visibility))) => {
                info!("Observer: visibility {:?}", visibility);
            }
            Ok(Message::Status(StatusMessage::ReportRejected { channel, reason })) => {
                debug!("Observer: {} report rejected ({:?})", channel, reason);
            }
            Ok(Message::Session(SessionMessage::Shutdown)) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Observer: lagged by {} messages", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn run_simulate(config: &Config, seconds: u64, echo_stale: bool) -> Result<(), String> {
    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);

    let observer_receiver = bus_sender.subscribe();
    let observer = thread::Builder::new()
        .name("observer".to_string())
        .spawn(move || log_observer_view(observer_receiver))
        .map_err(|err| format!("failed to spawn observer thread: {}", err))?;

    let manager_receiver = bus_sender.subscribe();
    let manager_sender = bus_sender.clone();
    let manager_config = config.clone();
    let manager = thread::Builder::new()
        .name("session-manager".to_string())
        .spawn(move || {
            let mut session_manager =
                SessionManager::new(manager_receiver, manager_sender, &manager_config);
            session_manager.run();
        })
        .map_err(|err| format!("failed to spawn session manager thread: {}", err))?;

    let simulator_sender = bus_sender.clone();
    thread::Builder::new()
        .name("simulator".to_string())
        .spawn(move || {
            run_simulation(
                simulator_sender,
                default_script(),
                DEFAULT_POLL_INTERVAL,
                echo_stale,
            )
        })
        .map_err(|err| format!("failed to spawn simulator thread: {}", err))?;

    thread::sleep(Duration::from_secs(seconds));
    let _ = bus_sender.send(Message::Session(SessionMessage::Shutdown));

    manager
        .join()
        .map_err(|_| "session manager thread panicked".to_string())?;
    observer
        .join()
        .map_err(|_| "observer thread panicked".to_string())?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{}\n{}", err, USAGE);
            std::process::exit(2);
        }
    };

    let config_path = cli
        .config_path
        .clone()
        .or_else(default_config_path)
        .ok_or("could not determine config directory; pass --config <path>")?;
    let config = load_config_file(&config_path);
    init_logging(&config, cli.verbose);
    info!("Using config {}", config_path.display());

    match &cli.command {
        Command::Replay { path } => run_replay(&config, path)?,
        Command::Simulate {
            seconds,
            echo_stale,
        } => run_simulate(&config, *seconds, *echo_stale)?,
    }
    Ok(())
}
