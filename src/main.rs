use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use hotkey_repeater::config::parse_duration;
use hotkey_repeater::{
    AutomationEngine, ConfigStore, Configuration, EngineParts, EngineSettings, JsonFileStore,
    KeyCode, Status, WindowHandle, WindowRegistry,
};
use hotkey_repeater::window::NativeWindowRegistry;

#[derive(Parser)]
#[command(name = "hkr", version, about = "Repeat a key on an interval, toggled by global hotkeys")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the hotkeys and wait for them until Ctrl+C
    Run {
        /// Config file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<String>,
        /// Key to repeat, e.g. F6 or space
        #[arg(short, long)]
        trigger: Option<String>,
        /// Interval between presses, e.g. 100ms or 2s
        #[arg(short, long)]
        interval: Option<String>,
        /// Hotkey that starts repeating
        #[arg(long)]
        start: Option<String>,
        /// Hotkey that stops repeating
        #[arg(long)]
        stop: Option<String>,
        /// Send presses to this window handle instead of the focused window
        #[arg(long, value_parser = parse_handle)]
        window: Option<u64>,
        /// Apply overrides without writing them back to the config file
        #[arg(long)]
        no_save: bool,
    },
    /// List visible top-level windows
    Windows {
        /// Only windows whose title contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Check whether a window handle is still live
    CheckWindow {
        #[arg(value_parser = parse_handle)]
        handle: u64,
    },
    /// Print every supported key name
    Keys,
    /// Validate a config file
    Validate {
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn parse_handle(text: &str) -> std::result::Result<u64, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid window handle '{text}': {e}"))
}

fn store_for(path: Option<String>) -> Result<JsonFileStore> {
    match path {
        Some(path) => Ok(JsonFileStore::new(path)),
        None => JsonFileStore::default_location().context("no config directory available"),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "hotkey_repeater=debug,hkr=debug"
    } else {
        "hotkey_repeater=info,hkr=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            config,
            trigger,
            interval,
            start,
            stop,
            window,
            no_save,
        } => {
            let store = store_for(config)?;
            let mut cfg = store.load().context("failed to load configuration")?;
            let overridden = trigger.is_some()
                || interval.is_some()
                || start.is_some()
                || stop.is_some()
                || window.is_some();

            if let Some(trigger) = trigger {
                cfg.trigger_key = trigger;
            }
            if let Some(interval) = interval {
                cfg.interval_ms = parse_duration(&interval)?.as_millis() as u64;
            }
            if let Some(start) = start {
                cfg.start_hotkey = start;
            }
            if let Some(stop) = stop {
                cfg.stop_hotkey = stop;
            }
            if let Some(id) = window {
                cfg.key_mode = hotkey_repeater::KeyMode::Window;
                cfg.target_window = Some(describe_window(id));
            }
            run(store, cfg, overridden && !no_save).await
        }
        Command::Windows { filter } => {
            let windows = NativeWindowRegistry::new()
                .list_windows(filter.as_deref())
                .context("failed to list windows")?;
            if windows.is_empty() {
                println!("{}", "No matching windows".yellow());
            }
            for window in windows {
                println!(
                    "{}  {}  {}",
                    format!("{:#010x}", window.id).cyan(),
                    window.display_name(),
                    window.class_name.dimmed()
                );
            }
            Ok(())
        }
        Command::CheckWindow { handle } => {
            let valid = NativeWindowRegistry::new().is_valid(&WindowHandle::new(handle));
            if valid {
                println!("{} window {handle:#x} is live", "✔".green());
            } else {
                println!("{} window {handle:#x} is gone", "✘".red());
            }
            Ok(())
        }
        Command::Keys => {
            let names: Vec<&str> = KeyCode::ALL.iter().map(|k| k.name()).collect();
            println!("{}", names.join(" "));
            println!("Modifiers: Ctrl Alt Shift Super");
            Ok(())
        }
        Command::Validate { config } => {
            let store = store_for(config)?;
            let cfg = store.load().context("failed to load configuration")?;
            match cfg.validate() {
                Ok(()) => {
                    println!("{} {}", "✔".green(), store.path().display());
                    Ok(())
                }
                Err(e) => bail!("{}: {e}", store.path().display()),
            }
        }
    }
}

fn describe_window(id: u64) -> WindowHandle {
    NativeWindowRegistry::new()
        .list_windows(None)
        .ok()
        .and_then(|windows| windows.into_iter().find(|w| w.id == id))
        .unwrap_or_else(|| WindowHandle::new(id))
}

async fn run(store: JsonFileStore, config: Configuration, persist: bool) -> Result<()> {
    let engine = AutomationEngine::new(EngineParts::native(store.clone()), EngineSettings::default());
    let mut events = engine.subscribe();

    if persist {
        engine
            .save_config(config.clone())
            .await
            .context("configuration rejected")?;
    } else {
        config.validate().context("configuration rejected")?;
        engine.init(config.clone()).await;
    }
    engine.spawn_hotkey_loop();

    println!(
        "Repeating {} every {} ms. {} starts, {} stops, Ctrl+C quits.",
        config.trigger_key.bold(),
        config.interval_ms,
        config.start_hotkey.green(),
        config.stop_hotkey.red()
    );

    loop {
        tokio::select! {
            status = events.recv() => match status {
                Some(status) => print_status(&status),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn print_status(status: &Status) {
    let state = if status.running {
        "RUNNING".green().bold()
    } else {
        "IDLE".yellow().bold()
    };
    let hotkeys = if status.registered {
        "hotkeys active".normal()
    } else {
        "hotkeys inactive".red()
    };
    match &status.last_error {
        Some(err) => println!("{state}  {hotkeys}  {}", err.red()),
        None => println!("{state}  {hotkeys}"),
    }
}
