//! CLI binary for cabin.

use anyhow::Context;
use cabin::audio::{CaptureOutcome, CpalMicrophone, CpalPlayback, Microphone, UtteranceRecorder};
use cabin::config::CabinConfig;
use cabin::{SharedVehicle, VoiceAssistant, wakeword};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Cabin: voice-driven command pipeline for a simulated vehicle.
#[derive(Parser)]
#[command(name = "cabin", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "CABIN_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Listen for the wake word and accept typed commands on stdin.
    Run {
        /// Skip wake-word detection; typed commands and /listen only.
        #[arg(long)]
        no_wakeword: bool,
    },

    /// Send one typed command and print the reply and vehicle state.
    Send {
        /// Command text, e.g. "turn on the AC to 18 degrees".
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// List available audio devices.
    Devices,

    /// Record wake word reference samples.
    RecordWakeword {
        /// Number of samples to record.
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Also write it to the default config path.
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the status feed.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cabin=info,reqwest=warn,hyper=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CabinConfig::load_or_default(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run { no_wakeword: false }) {
        Command::Run { no_wakeword } => run(config, no_wakeword).await,
        Command::Send { text } => send(config, &text.join(" ")).await,
        Command::Devices => list_devices(),
        Command::RecordWakeword { count } => {
            tokio::task::spawn_blocking(move || record_wakeword(&config, count)).await?
        }
        Command::Config { write } => print_config(&config, write),
    }
}

async fn run(config: CabinConfig, no_wakeword: bool) -> anyhow::Result<()> {
    println!("Cabin v{}", env!("CARGO_PKG_VERSION"));

    let assistant = VoiceAssistant::builder(config).build()?;
    let cancel = CancellationToken::new();

    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_on_signal.cancel();
        }
    });

    let mut events = assistant.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("[{}] {}", event.timestamp.format("%H:%M:%S"), event.text),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    println!("[...] {n} status messages skipped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if no_wakeword {
        println!("Wake word disabled.");
    } else {
        assistant.start();
    }
    println!("Type a command, /listen to talk, /state for vehicle state, /quit to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/listen" => {
                if assistant.trigger_listen().is_none() {
                    println!("Already listening.");
                }
            }
            "/state" => print_state(assistant.vehicle())?,
            text => {
                let _ = assistant.submit_text(text);
            }
        }
    }

    assistant.stop().await;
    printer.abort();
    Ok(())
}

async fn send(config: CabinConfig, text: &str) -> anyhow::Result<()> {
    let assistant = VoiceAssistant::builder(config).build()?;
    let outcome = assistant.submit_text(text).await??;
    println!("{}", outcome.reply);
    print_state(assistant.vehicle())
}

fn print_state(vehicle: &SharedVehicle) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&vehicle.snapshot())?);
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in CpalMicrophone::list_input_devices()? {
        println!("  {name}");
    }
    println!("\nOutput devices:");
    for name in CpalPlayback::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

fn record_wakeword(config: &CabinConfig, count: usize) -> anyhow::Result<()> {
    let dir = &config.wakeword.references_dir;
    let phrase = &config.wakeword.phrase;
    let microphone = CpalMicrophone::new(&config.audio);
    let recorder = UtteranceRecorder::new(&config.capture);
    let never = CancellationToken::new();

    println!("Recording {count} samples of \"{phrase}\" into {}", dir.display());
    println!("Speak clearly, at normal volume, about arm's length from the mic.\n");

    let mut saved = 0;
    while saved < count {
        print!("Sample {}/{count}: press ENTER, then say \"{phrase}\"... ", saved + 1);
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let mut source = microphone.open().context("cannot open microphone")?;
        match recorder.record(source.as_mut(), &never)? {
            CaptureOutcome::Speech(utterance) => {
                let path = wakeword::save_reference(dir, &utterance.samples, utterance.sample_rate)?;
                println!("saved {:.2}s to {}", utterance.duration().as_secs_f32(), path.display());
                saved += 1;
            }
            CaptureOutcome::Timeout | CaptureOutcome::Cancelled => {
                println!("didn't hear anything, try again.");
            }
        }
    }

    println!("\n{saved} reference(s) recorded.");
    Ok(())
}

fn print_config(config: &CabinConfig, write: bool) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    if write {
        let path = CabinConfig::default_config_path();
        config.save_to_file(&path)?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}
