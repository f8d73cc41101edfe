//! Run a full cooking session in the terminal.
//!
//! The CLI plays the session layer the engine expects around it: it owns
//! the step list, renders countdowns from the event bus and snapshots,
//! rings the terminal bell as the completion trigger, and prints delivered
//! background alerts. The session ends when no timer is running anymore.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde::Deserialize;
use simmer_core::{
    CompletionSignal, Config, DeliveredAlert, Event, LocalScheduler, TimerService,
};
use tokio::sync::broadcast;
use tokio::sync::mpsc;

#[derive(Args)]
pub struct RunArgs {
    /// TOML file with the session's steps
    pub steps: PathBuf,
    /// Print every engine event as JSON instead of the live countdown
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Deserialize)]
struct StepFile {
    #[serde(rename = "step")]
    steps: Vec<StepEntry>,
}

#[derive(Debug, Deserialize)]
struct StepEntry {
    id: String,
    title: String,
    duration_secs: u64,
}

/// Rings the terminal bell when a step's countdown finishes.
struct BellSignal;

impl CompletionSignal for BellSignal {
    fn timer_completed(&self, _id: &str, title: &str) {
        println!("\x07done: {title}");
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(&args.steps)?;
    let file: StepFile = toml::from_str(&raw)?;
    if file.steps.is_empty() {
        return Err(format!("no steps in {}", args.steps.display()).into());
    }
    let config = Config::load()?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(session(file, config, args.json))
}

async fn session(
    file: StepFile,
    config: Config,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (alert_tx, mut alert_rx) = mpsc::unbounded_channel::<DeliveredAlert>();
    let scheduler = LocalScheduler::new(alert_tx);
    let service = TimerService::spawn(scheduler, BellSignal, config);
    let mut events = service.subscribe();
    let mut status = tokio::time::interval(Duration::from_secs(1));

    for step in &file.steps {
        service.start(&step.id, &step.title, step.duration_secs);
    }
    if service.active_count().await? == 0 {
        return Err("no step produced a running timer".into());
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if json {
                            println!("{}", serde_json::to_string(&event)?);
                        } else {
                            render_event(&event);
                        }
                        if matches!(event, Event::TimerCompleted { .. })
                            && service.active_count().await? == 0
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            Some(alert) = alert_rx.recv() => {
                println!("alert: {}", alert.message);
            }
            _ = status.tick(), if !json => {
                print_status(&service).await?;
            }
        }
    }

    // An alert scheduled for the last step lands at the same instant as its
    // completion; give it a beat to arrive before tearing down.
    while let Ok(Some(alert)) =
        tokio::time::timeout(Duration::from_millis(250), alert_rx.recv()).await
    {
        println!("alert: {}", alert.message);
    }

    let snapshot = service.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn render_event(event: &Event) {
    match event {
        Event::TimerStarted {
            title,
            duration_secs,
            ..
        } => println!("started: {title} ({duration_secs}s)"),
        Event::TimerPaused {
            id, time_left_secs, ..
        } => println!("paused: {id} ({time_left_secs}s left)"),
        Event::TimerResumed {
            id, time_left_secs, ..
        } => println!("resumed: {id} ({time_left_secs}s left)"),
        Event::TimerAdjusted {
            id, time_left_secs, ..
        } => println!("adjusted: {id} ({time_left_secs}s left)"),
        Event::TimerCompleted { .. } => {} // BellSignal already reported it.
        Event::TimersCleared { count, .. } => println!("cleared {count} timers"),
    }
}

async fn print_status(service: &TimerService) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = service.snapshot().await?;
    let line: Vec<String> = snapshot
        .iter()
        .filter(|(_, view)| view.running)
        .map(|(id, view)| format!("{id}: {}s", view.time_left))
        .collect();
    if !line.is_empty() {
        println!("  {}", line.join("  "));
    }
    Ok(())
}
