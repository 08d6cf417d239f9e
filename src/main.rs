use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;

use warden::agent::approval::ApprovalGate;
use warden::agent::backend::OllamaBackend;
use warden::agent::AgentRequest;
use warden::cli::{Cli, Commands, PolicyAction};
use warden::config::{load_config, AppConfig};
use warden::normalize::ToolCall;
use warden::orchestration::types::SpawnRequest;
use warden::policy::{CapabilityRegistry, ExecutionMode};
use warden::runtime::{Collaborators, Runtime};

/// Asks on the controlling terminal before each step while the mode is `manual`.
struct TerminalApproval;

#[async_trait]
impl ApprovalGate for TerminalApproval {
    async fn approve(&self, call: &ToolCall, capability: &str) -> bool {
        let question = format!(
            "Allow `{}` [{capability}] with {}? [y/N] ",
            call.name,
            Value::Object(call.arguments.clone())
        );
        tokio::task::spawn_blocking(move || {
            eprint!("{question}");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).is_ok() && matches!(line.trim(), "y" | "Y" | "yes")
        })
        .await
        .unwrap_or(false)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::info!(
        model = %config.model,
        workspace = %config.workspace.display(),
        policy = %config.policy_path.display(),
        "Config loaded"
    );

    match cli.command {
        Commands::Policy { action } => run_policy(&config, action),
        Commands::Run { prompt, specialist, .. } => run_foreground(config, prompt, specialist).await,
        Commands::Spawn { task, name, wait_secs } => run_spawn(config, task, name, wait_secs).await,
        Commands::Heartbeat { .. } => run_heartbeat(config).await,
    }
}

fn run_policy(config: &AppConfig, action: PolicyAction) -> anyhow::Result<()> {
    let policy = CapabilityRegistry::load(config.policy_path.clone());
    match action {
        PolicyAction::Show => {}
        PolicyAction::Profiles => {
            println!("{}", serde_json::to_string_pretty(&policy.profiles())?);
            return Ok(());
        }
        PolicyAction::Mode { mode } => policy.set_execution_mode(mode.parse::<ExecutionMode>()?),
        PolicyAction::Enable { capability } => policy.enable(&capability)?,
        PolicyAction::Disable { capability } => policy.disable(&capability)?,
        PolicyAction::Apply { profile } => policy.apply_profile(&profile)?,
    }
    println!("{}", serde_json::to_string_pretty(&policy.current_state())?);
    Ok(())
}

async fn connect(config: &AppConfig, collaborators: Collaborators) -> anyhow::Result<Runtime> {
    let backend = Arc::new(OllamaBackend::new(&config.ollama_url));
    backend.check_ready(&config.model).await?;
    Runtime::with_backend(config.clone(), backend, collaborators)
}

async fn run_foreground(config: AppConfig, prompt: String, specialist: Option<String>) -> anyhow::Result<()> {
    let collaborators = Collaborators {
        approval: std::io::stdin()
            .is_terminal()
            .then(|| Arc::new(TerminalApproval) as Arc<dyn ApprovalGate>),
        ..Default::default()
    };
    let mut runtime = connect(&config, collaborators).await?;
    // Nothing reads events in this command.
    drop(runtime.take_events());
    let _reaper = runtime.start_background();

    let mut request = AgentRequest::new(prompt);
    request.specialist = specialist;
    let outcome = runtime.pipeline.run_turn(&request).await?;

    for step in &outcome.steps {
        let verdict = match (step.result.success, step.result.denied) {
            (_, true) => "denied",
            (true, _) => "ok",
            (false, _) => "failed",
        };
        eprintln!("[{verdict}] {} ({})", step.call.name, step.capability);
    }
    if outcome.truncated {
        eprintln!("[warn] stopped after {} iterations", outcome.iterations);
    }
    println!("{}", outcome.content);

    runtime.shutdown().await;
    Ok(())
}

async fn run_spawn(config: AppConfig, task: String, name: Option<String>, wait_secs: u64) -> anyhow::Result<()> {
    let mut runtime = connect(&config, Collaborators::default()).await?;
    drop(runtime.take_events());
    let _reaper = runtime.start_background();

    let info = runtime.subagents.spawn(SpawnRequest {
        name,
        ..SpawnRequest::new(task)
    })?;
    eprintln!("Spawned {} ({})", info.record.name, info.record.id);

    let settled = runtime
        .subagents
        .wait_for(&info.record.id, Duration::from_secs(wait_secs))
        .await
        .context("sub-agent record disappeared")?;
    println!("{}", serde_json::to_string_pretty(&settled)?);

    runtime.shutdown().await;
    Ok(())
}

async fn run_heartbeat(config: AppConfig) -> anyhow::Result<()> {
    let mut runtime = connect(&config, Collaborators::default()).await?;
    let mut events = runtime.take_events().context("event receiver already taken")?;
    let _reaper = runtime.start_background();
    if !runtime.heartbeat.is_running() {
        anyhow::bail!("heartbeat did not start (is it enabled with a non-zero interval?)");
    }
    eprintln!(
        "Heartbeat every {} ms. Press Ctrl+C to stop.",
        runtime.heartbeat.config().interval_ms
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
        }
    }

    runtime.shutdown().await;
    eprintln!("{}", serde_json::to_string_pretty(&runtime.heartbeat.status())?);
    Ok(())
}
