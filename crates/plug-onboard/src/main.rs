//! Smart-plug onboarding host entry point.
//!
//! Loads the configuration, wires the UDP probe, TCP device link and file
//! store into an [`AppState`], then runs one operator command.
//!
//! # Usage
//!
//! ```text
//! plug-onboard [OPTIONS] [COMMAND]
//!
//! Commands:
//!   onboard   Discover a plug, enter its local key, and store it (default)
//!   list      Show stored plugs
//!   remove    Delete a stored plug
//!   options   Show or change a stored plug's options
//!
//! Options:
//!   --config <PATH>        Config file [env: PLUG_CONFIG]
//!   -v, --verbose          Log every announcement seen during the scan
//!   --retry-budget <N>     Quiet listen windows before the scan ends
//! ```
//!
//! Log level comes from `general.log_level` in the config file and is
//! overridden by `RUST_LOG`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::EnvFilter;

use plug_onboard::infrastructure::storage::config::{
    config_file_path, load_config_from, ConfigDeviceStore,
};
use plug_onboard::infrastructure::ui_bridge::{
    begin_onboarding, cancel_onboarding, list_devices, options_form, remove_device,
    submit_device_key, submit_options, submit_scan, submit_selection, AppState, ChoiceDto,
    CommandResult, FieldDto, OnboardingDto, StepView,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Guided LAN onboarding for smart plugs.
#[derive(Debug, Parser)]
#[command(
    name = "plug-onboard",
    about = "Discover smart plugs on the LAN, validate their local key, and store them",
    version
)]
struct Cli {
    /// Path to the TOML config file.  Defaults to the platform config directory.
    #[arg(long, env = "PLUG_CONFIG")]
    config: Option<PathBuf>,

    /// Log every announcement seen during the scan.
    #[arg(short, long)]
    verbose: bool,

    /// Quiet listen windows allowed before the scan ends.
    #[arg(long)]
    retry_budget: Option<u32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover a plug, enter its local key, and store it.
    Onboard,
    /// Show stored plugs.
    List,
    /// Delete a stored plug.
    Remove { entry_id: String },
    /// Show or change a stored plug's options.
    Options {
        entry_id: String,
        /// New polling interval in seconds.
        #[arg(long)]
        scan_interval: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("no --config given and no platform config dir")?,
    };
    let mut config = load_config_from(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    let store = Arc::new(ConfigDeviceStore::with_config(&path, config.clone()));
    info!(
        "loaded {} stored device(s) from {}",
        config.devices.len(),
        store.path().display()
    );

    if cli.verbose {
        config.discovery.verbose = true;
    }
    if let Some(budget) = cli.retry_budget {
        config.discovery.retry_budget = budget;
    }
    let state = AppState::from_config(&config, store).context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Onboard) {
        Command::Onboard => run_onboarding(state).await,
        Command::List => print_devices(state).await,
        Command::Remove { entry_id } => {
            into_data(remove_device(state, entry_id.clone()).await)?;
            println!("Removed {entry_id}");
            Ok(())
        }
        Command::Options {
            entry_id,
            scan_interval,
        } => run_options(state, entry_id, scan_interval).await,
    }
}

// ── Onboarding ────────────────────────────────────────────────────────────────

async fn run_onboarding(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut prompt = Prompt::stdin();
    let mut dto = into_data(begin_onboarding(Arc::clone(&state)).await)?;

    loop {
        let session_id = dto.session_id.clone();
        let (step_id, fields, placeholders) = match &dto.view {
            StepView::Form {
                step_id,
                fields,
                errors,
                placeholders,
            } => {
                print_errors(errors);
                (step_id.clone(), fields.clone(), placeholders.clone())
            }
            StepView::Abort { reason } => {
                println!("Onboarding stopped: {}", describe(reason));
                return Ok(());
            }
            StepView::CreateEntry { title, data } => {
                println!(
                    "Added {title} ({} at {}, protocol v{})",
                    data.get("device_id").map_or("?", String::as_str),
                    data.get("ip").map_or("?", String::as_str),
                    data.get("version").map_or("?", String::as_str),
                );
                return Ok(());
            }
        };

        let next = match step_id.as_str() {
            "user" => {
                let Some(_) = prompt.ask("Press Enter to scan the network (Ctrl-D to quit): ").await?
                else {
                    return cancel(state, session_id).await;
                };
                println!("Scanning...");
                submit_scan(Arc::clone(&state), session_id).await
            }
            "select_device" => {
                let Some(address) = choose_device(&mut prompt, &fields).await? else {
                    return cancel(state, session_id).await;
                };
                submit_selection(Arc::clone(&state), session_id, address).await
            }
            "device_key" => {
                let question = format!(
                    "Local key for {} at {}: ",
                    placeholders.get("device_id").map_or("?", String::as_str),
                    placeholders.get("ip").map_or("?", String::as_str),
                );
                let Some(key) = prompt.ask(&question).await? else {
                    return cancel(state, session_id).await;
                };
                submit_device_key(Arc::clone(&state), session_id, key).await
            }
            other => bail!("unexpected onboarding step {other}"),
        };
        dto = into_data::<OnboardingDto>(next)?;
    }
}

/// Lists the `device` choices and reads a number.  `None` on end of input.
async fn choose_device(prompt: &mut Prompt, fields: &[FieldDto]) -> anyhow::Result<Option<String>> {
    let choices: &[ChoiceDto] = fields
        .iter()
        .find(|f| f.name == "device")
        .map(|f| f.options.as_slice())
        .unwrap_or_default();
    if choices.is_empty() {
        bail!("selection form has no devices");
    }

    println!("New devices:");
    for (i, choice) in choices.iter().enumerate() {
        println!("  {}) {}", i + 1, choice.label);
    }

    loop {
        let Some(answer) = prompt.ask("Select a device: ").await? else {
            return Ok(None);
        };
        match answer.trim().parse::<usize>() {
            Ok(n) if (1..=choices.len()).contains(&n) => {
                return Ok(Some(choices[n - 1].value.clone()))
            }
            _ => println!("Enter a number between 1 and {}", choices.len()),
        }
    }
}

async fn cancel(state: Arc<AppState>, session_id: String) -> anyhow::Result<()> {
    into_data(cancel_onboarding(state, session_id).await)?;
    println!("Onboarding cancelled.");
    Ok(())
}

// ── Catalogue ─────────────────────────────────────────────────────────────────

async fn print_devices(state: Arc<AppState>) -> anyhow::Result<()> {
    let devices = into_data(list_devices(state).await)?;
    if devices.is_empty() {
        println!("No devices configured.");
        return Ok(());
    }
    for d in devices {
        println!(
            "{}  {}  {} at {}  v{}  every {}s",
            d.entry_id, d.title, d.device_id, d.ip, d.version, d.scan_interval
        );
    }
    Ok(())
}

async fn run_options(
    state: Arc<AppState>,
    entry_id: String,
    scan_interval: Option<u32>,
) -> anyhow::Result<()> {
    let view = match scan_interval {
        None => into_data(options_form(state, entry_id).await)?,
        Some(n) => into_data(submit_options(state, entry_id, n).await)?,
    };
    match view {
        StepView::Form { fields, errors, .. } => {
            print_errors(&errors);
            for f in fields {
                let current = f.default.map(|v| v.to_string()).unwrap_or_default();
                println!("{} = {current}", f.name);
            }
        }
        StepView::CreateEntry { data, .. } => {
            for (k, v) in data {
                println!("{k} set to {v}");
            }
        }
        StepView::Abort { reason } => println!("{}", describe(&reason)),
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Line-oriented reader over stdin.
struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Prints `question` and reads one line.  `None` on end of input.
    async fn ask(&mut self, question: &str) -> anyhow::Result<Option<String>> {
        use std::io::Write;
        print!("{question}");
        std::io::stdout().flush()?;
        Ok(self.lines.next_line().await?)
    }
}

fn into_data<T: Serialize>(result: CommandResult<T>) -> anyhow::Result<T> {
    match (result.success, result.data) {
        (true, Some(data)) => Ok(data),
        _ => Err(anyhow!(result
            .error
            .unwrap_or_else(|| "command returned no data".to_string()))),
    }
}

fn print_errors(errors: &BTreeMap<String, String>) {
    for code in errors.values() {
        println!("! {}", describe(code));
    }
}

fn describe(code: &str) -> &str {
    match code {
        "no_devices_found" => "No devices answered the scan. Check the plug is powered and on this network.",
        "scan_failed" => "The network scan could not run. See the log for details.",
        "no_new_devices" => "Every device found is already configured.",
        "invalid_key" => "The device rejected that local key.",
        "cannot_connect" => "Could not connect to the device.",
        "already_configured" => "This device was just configured by another session.",
        "invalid_scan_interval" => "The scan interval must be at least 1 second.",
        "cancelled" => "Cancelled.",
        "unknown" => "Unexpected error. See the log for details.",
        other => other,
    }
}
