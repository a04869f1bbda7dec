//! Vocall console host.
//!
//! Places a voice call with one agent and maps single-key commands read from
//! stdin onto the engine: `c` call, `m` mute, `h` hang up, `s` status, `q` quit.
//! Engine signals are printed as they arrive.

mod agents;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use settings::{default_settings_path, load_settings, save_settings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use vocall_core::session::VoiceConnector;
use vocall_core::{
    format_duration, list_input_devices, AgentConfig, CallEngine, CallState, CpalBackend,
    GeminiLiveConnector, LoopbackConnector,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent to call, by id (see --list-agents).
    #[arg(long, short)]
    agent: Option<String>,

    /// Echo your own voice back instead of calling the live service.
    #[arg(long)]
    loopback: bool,

    /// Print input devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Print the agent catalog and exit.
    #[arg(long)]
    list_agents: bool,

    /// Settings file. Defaults to the platform data directory.
    #[arg(long, env = "VOCALL_SETTINGS")]
    settings: Option<PathBuf>,

    /// Write the normalized settings file and exit.
    #[arg(long)]
    write_settings: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vocall=info,vocall_core=info".into()),
        )
        .init();

    let args = Args::parse();

    if args.list_devices {
        for device in list_input_devices() {
            let marker = if device.is_default { "*" } else { " " };
            println!("{marker} {}", device.name);
        }
        return Ok(());
    }

    // ── Settings ──────────────────────────────────────────────────────────
    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut app_settings = load_settings(&settings_path);
    if args.write_settings {
        save_settings(&settings_path, &app_settings)
            .with_context(|| format!("writing {}", settings_path.display()))?;
        println!("settings written to {}", settings_path.display());
        return Ok(());
    }
    app_settings.apply_env_overrides();
    info!(settings_path = ?settings_path, settings = ?app_settings, "settings loaded");

    if args.list_agents {
        for agent in &app_settings.agents {
            let marker = if agent.id == app_settings.default_agent { "*" } else { " " };
            println!("{marker} {:<12} {}", agent.id, agent.name);
        }
        return Ok(());
    }

    let agent = match args.agent.as_deref() {
        Some(id) => app_settings.agent(id).cloned(),
        None => app_settings.default_agent().cloned(),
    };
    let Some(agent) = agent else {
        bail!(
            "unknown agent {:?}; run with --list-agents",
            args.agent.unwrap_or_default()
        );
    };

    // ── Engine setup ──────────────────────────────────────────────────────
    let connector: Arc<dyn VoiceConnector> = if args.loopback {
        info!("loopback mode: your speech is echoed back");
        Arc::new(LoopbackConnector)
    } else {
        let live = app_settings.live_config().context(
            "no API key configured: set VOCALL_API_KEY or apiKey in the settings file, \
             or run with --loopback",
        )?;
        Arc::new(GeminiLiveConnector::new(live))
    };
    let engine = CallEngine::new(
        app_settings.engine_config(),
        Arc::new(CpalBackend),
        connector,
    );

    spawn_printers(&engine);
    print_help(&agent);

    if let Err(e) = engine.start_call(agent.clone()).await {
        warn!("could not start call: {e}");
    }

    // ── Console loop ──────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                match line.trim() {
                    "c" => {
                        engine.start_call(agent.clone()).await?;
                    }
                    "m" => {
                        let muted = engine.toggle_mute().await?;
                        println!("{}", if muted { "muted" } else { "unmuted" });
                    }
                    "h" => engine.end_call().await?,
                    "s" => {
                        let snap = engine.snapshot();
                        println!(
                            "state={:?} duration={} level={:.2} muted={}",
                            snap.state,
                            format_duration(snap.duration_secs),
                            snap.level,
                            snap.muted
                        );
                    }
                    "q" => break,
                    "" => {}
                    _ => print_help(&agent),
                }
            }
        }
    }

    engine.shutdown().await?;
    info!("vocall stopped");
    Ok(())
}

fn print_help(agent: &AgentConfig) {
    println!("agent: {} ({})", agent.name, agent.id);
    println!("  c  call    m  mute/unmute    h  hang up    s  status    q  quit");
}

/// Forward engine signals to stdout until the engine goes away.
fn spawn_printers(engine: &CallEngine) {
    forward(engine.subscribe_status(), |event| {
        let label = match event.state {
            CallState::Connecting => "connecting...".to_string(),
            CallState::Connected => "connected".to_string(),
            CallState::Ended => match (&event.reason, &event.detail) {
                (Some(reason), Some(detail)) => format!("ended ({reason:?}: {detail})"),
                (Some(reason), None) => format!("ended ({reason:?})"),
                _ => "ended".to_string(),
            },
        };
        println!("[call {}] {label}", event.call_id);
    });

    forward(engine.subscribe_duration(), |event| {
        if event.seconds % 10 == 0 {
            println!("[call {}] {}", event.call_id, format_duration(event.seconds));
        }
    });

    forward(engine.subscribe_summaries(), |summary| {
        let at = summary.ended_at.with_timezone(&chrono::Local).format("%H:%M");
        println!(
            "[call {}] {} with {} at {at}",
            summary.call_id,
            summary.headline(),
            summary.agent_name
        );
    });
}

fn forward<T, F>(mut rx: broadcast::Receiver<T>, mut print: F)
where
    T: Clone + Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print(event),
                Err(RecvError::Lagged(n)) => warn!("console fell behind by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
