use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use craig::answer;
use craig::config::Config;
use craig::controller::{Controller, ControllerMsg};
use craig::engine::CommandEngine;
use craig::hook;
use craig::hud::StatusLine;
use craig::injector;
use craig::state::RuntimeState;
use craig::triggers::TriggerRegistry;

#[derive(Parser)]
#[command(name = "craig", about = "Inline AI commands for any textbox", version)]
struct Cli {
    /// Path to a config file (default: config.toml in the working directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the keyboard and answer inline commands (default)
    Run,
    /// Ask one question from the terminal and print the answer
    Ask {
        /// The question, as one or more words
        question: Vec<String>,
    },
    /// List the configured trigger phrases
    Triggers,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config),
        Command::Ask { question } => ask(config, question),
        Command::Triggers => {
            list_triggers(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(config: Config) -> anyhow::Result<()> {
    let state = RuntimeState::new();

    // Fail before the hook goes up: a watcher that can see keys but cannot
    // retract them would leave half-typed commands in the host application.
    let (injector_tx, _injector) = injector::spawn(config.injection.settle_ms, state.clone())
        .context("input injection unavailable")?;

    let supported: Vec<&str> = config
        .triggers
        .supported
        .iter()
        .map(String::as_str)
        .collect();
    let mut registry =
        TriggerRegistry::new(&supported).context("no usable trigger phrases in config")?;
    if let Err(e) = registry.set_active(&config.triggers.active) {
        warn!("{e}; keeping \"{}\"", registry.label());
    }

    let engine = Arc::new(Mutex::new(CommandEngine::new(
        registry,
        &config.triggers.mention,
        injector_tx.clone(),
    )));

    let (tx, rx) = flume::unbounded::<ControllerMsg>();

    let _hook = hook::spawn(engine, tx.clone(), state.clone());

    let backend = answer::from_config(&config.answer, &config.system_prompt)
        .map_err(|e| anyhow::anyhow!("cannot start answer backend: {e}"))?;

    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(ControllerMsg::Interrupt);
    })
    .context("cannot install Ctrl-C handler")?;

    info!(
        "watching for {} and {} (Ctrl-C to quit)",
        config.triggers.active, config.triggers.mention
    );

    let controller = Controller::new(Box::new(StatusLine::new()), backend, injector_tx, state, tx)
        .with_auto_insert(config.injection.auto_insert)
        .with_insert_method(config.injection.insert_method)
        .with_history(config.history.file.as_deref());

    controller.run(rx);
    info!("bye");
    Ok(())
}

fn ask(config: Config, question: Vec<String>) -> anyhow::Result<()> {
    let question = question.join(" ");
    if question.trim().is_empty() {
        bail!("no question given");
    }

    let mut backend = answer::from_config(&config.answer, &config.system_prompt)
        .map_err(|e| anyhow::anyhow!("cannot start answer backend: {e}"))?;

    backend
        .ask_stream(&question, &mut |token| {
            print!("{token}");
            io::stdout().flush().ok();
        })
        .map_err(|e| anyhow::anyhow!("answer failed: {e}"))?;
    println!();
    Ok(())
}

fn list_triggers(config: &Config) {
    for phrase in &config.triggers.supported {
        if *phrase == config.triggers.active {
            println!("{phrase} (active)");
        } else {
            println!("{phrase}");
        }
    }
    println!("{} (live mention)", config.triggers.mention);
}
