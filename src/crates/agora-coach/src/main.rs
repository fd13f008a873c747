//! agora debate coach - CLI entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};

use agora_coach::{report, CoachConfig, DebateCoach, Result};
use agora_graph::{ChannelSink, EngineEvent};

/// Multi-agent debate coaching sessions
#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(version)]
#[command(about = "Practice debating against a panel of coaching agents", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to ./agora.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new session and run it to the final report
    Start {
        /// Debate topic
        topic: String,

        /// Your opening position on the topic
        #[arg(short, long)]
        position: String,

        /// Session id (generated when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Rounds before the final report (overrides config)
        #[arg(short = 'r', long)]
        max_rounds: Option<u64>,
    },
    /// Resume an interrupted session from its checkpoint
    Resume {
        /// Session id
        session: String,
    },
    /// Print the stored report for a session
    Show {
        /// Session id
        session: String,
    },
    /// List stored sessions
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let config = CoachConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Start {
            topic,
            position,
            session,
            max_rounds,
        } => {
            let session_id =
                session.unwrap_or_else(|| format!("debate-{}", uuid::Uuid::new_v4()));
            let rounds = max_rounds.unwrap_or(config.run.max_rounds);
            start(&config, &topic, &position, &session_id, rounds).await
        }
        Command::Resume { session } => resume(&config, &session).await,
        Command::Show { session } => show(&config, &session).await,
        Command::List => list(&config).await,
    }
}

async fn start(
    config: &CoachConfig,
    topic: &str,
    position: &str,
    session_id: &str,
    max_rounds: u64,
) -> Result<()> {
    let (coach, printer) = reporting_coach(config)?;
    let cancel = cancel_on_ctrl_c();

    println!("Session {session_id}: \"{topic}\" ({max_rounds} rounds)");
    let outcome = coach
        .start_session_with_cancellation(topic, position, session_id, Some(max_rounds), cancel)
        .await?;

    drop(coach);
    let _ = printer.await;
    finish(session_id, outcome);
    Ok(())
}

async fn resume(config: &CoachConfig, session_id: &str) -> Result<()> {
    let (coach, printer) = reporting_coach(config)?;
    let cancel = cancel_on_ctrl_c();

    let outcome = coach
        .resume_session_with_cancellation(session_id, cancel)
        .await?;

    drop(coach);
    let _ = printer.await;
    finish(session_id, outcome);
    Ok(())
}

async fn show(config: &CoachConfig, session_id: &str) -> Result<()> {
    let coach = quiet_coach(config)?;
    let snapshot = coach.inspect(session_id).await?;
    println!(
        "Session {} (step {}, next: {})",
        snapshot.session_id, snapshot.step, snapshot.cursor
    );
    println!("{}", report::render(&snapshot.session));
    Ok(())
}

async fn list(config: &CoachConfig) -> Result<()> {
    let coach = quiet_coach(config)?;
    let sessions = coach.list_sessions().await?;
    if sessions.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }
    for session_id in sessions {
        println!("{session_id}");
    }
    Ok(())
}

/// A coach that narrates engine progress to stdout. The printer task ends
/// once the coach (and with it the event channel) is dropped.
fn reporting_coach(config: &CoachConfig) -> Result<(DebateCoach, tokio::task::JoinHandle<()>)> {
    let model = config.model.build()?;
    let store = config.storage.open_store()?;
    let (sink, events) = ChannelSink::unbounded();
    let printer = tokio::spawn(narrate(events));
    let coach = DebateCoach::new(model, store)
        .with_event_sink(Arc::new(sink))
        .with_cancellation_grace(config.run.cancellation_grace());
    Ok((coach, printer))
}

fn quiet_coach(config: &CoachConfig) -> Result<DebateCoach> {
    Ok(DebateCoach::new(
        config.model.build()?,
        config.storage.open_store()?,
    ))
}

async fn narrate(events: mpsc::UnboundedReceiver<EngineEvent>) {
    let mut stream = UnboundedReceiverStream::new(events);
    while let Some(event) = stream.next().await {
        match &event {
            EngineEvent::NodeFinished { node, step } => {
                println!("  step {step}: {node} done");
            }
            EngineEvent::GroupStarted {
                group, members, ..
            } => {
                println!("  running {} analysts ({group})", members.len());
            }
            EngineEvent::GroupFinished {
                group,
                step,
                branch: Some(branch),
            } => {
                println!("  step {step}: {group} complete, branch \"{branch}\"");
            }
            EngineEvent::StepFailed { unit, step, error } => {
                eprintln!("  step {step}: {unit} failed: {error}");
            }
            EngineEvent::RunCancelled { session_id, .. } => {
                println!("  session {session_id} stopped at the last checkpoint");
            }
            _ => {}
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next step boundary");
            token.cancel();
        }
    });
    cancel
}

fn finish(session_id: &str, outcome: agora_coach::SessionOutcome) {
    if outcome.is_completed() {
        println!("{}", report::render(&outcome.session));
    } else {
        println!(
            "Session {session_id} paused after {} steps. Pick it up with: agora resume {session_id}",
            outcome.steps
        );
    }
}
