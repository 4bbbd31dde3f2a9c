use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tokio::sync::oneshot;

use tessera_model::{ModelContext, ReferenceGroup, Scene, SyncRegistry};
use tessera_protocol::PanelDescriptor;
use tessera_store::{Project, ReplayEngine, Transaction};
use tessera_sync::{Replica, ReplicaId};
use tessera_types::{key_timestamp_ms, KeyGenerator, Path};

use crate::cli::*;
use crate::config::TesseraConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = TesseraConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Keys(args) => cmd_keys(args, cli.format),
        Command::Replay(args) => cmd_replay(args, cli.format),
        Command::Simulate(args) => cmd_simulate(args, &config, cli.format),
    }
}

fn cmd_keys(args: KeysArgs, format: OutputFormat) -> anyhow::Result<()> {
    let keys = KeyGenerator::new();
    let generated: Vec<String> = (0..args.count).map(|_| keys.generate_key()).collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&generated)?),
        OutputFormat::Text => {
            for key in &generated {
                let ms = key_timestamp_ms(key).unwrap_or_default();
                println!("{}  {}", key.yellow().bold(), format!("@{ms}ms").dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_replay(args: ReplayArgs, format: OutputFormat) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.timeline)
        .with_context(|| format!("reading timeline {}", args.timeline.display()))?;
    let timeline: Vec<Transaction> = serde_json::from_str(&text)
        .with_context(|| format!("parsing timeline {}", args.timeline.display()))?;

    let result = ReplayEngine::replay(&timeline);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.state)?),
        OutputFormat::Text => {
            println!(
                "{} Replayed {} transactions ({} set, {} delete)",
                "✓".green().bold(),
                result.applied.to_string().bold(),
                result.sets,
                result.deletes
            );
            println!("{}", serde_json::to_string_pretty(&result.state)?);
        }
    }
    Ok(())
}

fn cmd_simulate(args: SimulateArgs, config: &TesseraConfig, format: OutputFormat) -> anyhow::Result<()> {
    let children = args.replicas.unwrap_or(config.simulate.replicas);
    let writes = args.writes.unwrap_or(config.simulate.writes);

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let reports = runtime.block_on(simulate(children, writes, config))?;
    let converged = reports.iter().all(|r| r.matches_hub && r.replay_verified);

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = reports
                .iter()
                .map(|r| {
                    json!({
                        "replica": r.id.to_string(),
                        "role": r.role,
                        "scenes": r.scenes,
                        "timeline": r.timeline,
                        "replayVerified": r.replay_verified,
                        "matchesHub": r.matches_hub,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({"converged": converged, "replicas": rows}))?);
        }
        OutputFormat::Text => {
            println!(
                "Simulated {} + {} replicas, {} writes each",
                "hub".cyan(),
                children.to_string().bold(),
                writes
            );
            for r in &reports {
                let status = if r.matches_hub && r.replay_verified {
                    "✓ in sync".green()
                } else {
                    "✗ diverged".red()
                };
                println!(
                    "  {} {:<5} scenes: {:<4} timeline: {:<5} {}",
                    r.id.to_string().yellow(),
                    r.role,
                    r.scenes,
                    r.timeline,
                    status
                );
            }
            if converged {
                println!("{} All replicas converged.", "✓".green().bold());
            } else {
                println!("{} Replicas diverged.", "✗".red().bold());
            }
        }
    }

    if !converged {
        anyhow::bail!("replicas did not converge");
    }
    Ok(())
}

/// Per-replica outcome of a simulation run.
#[derive(Debug)]
pub struct ReplicaReport {
    pub id: ReplicaId,
    pub role: &'static str,
    pub scenes: usize,
    pub timeline: usize,
    pub replay_verified: bool,
    pub matches_hub: bool,
}

/// Run a hub with `children` child replicas, each on its own task, let every
/// replica create `writes` scenes, and report whether they all converged.
pub async fn simulate(
    children: usize,
    writes: usize,
    config: &TesseraConfig,
) -> anyhow::Result<Vec<ReplicaReport>> {
    let timeout = Duration::from_millis(config.simulate.timeout_ms);
    let keys = Arc::new(KeyGenerator::new());
    let (hub, hub_inbox) = Replica::root(Arc::new(Project::new(keys)), config.replica.clone());
    hub.set_panel(Some(PanelDescriptor {
        kind: "sceneEditor".into(),
        model_path: None,
    }));

    let mut nodes = vec![(hub.clone(), hub_inbox)];
    for _ in 0..children {
        nodes.push(hub.spawn_child());
    }

    let mut replicas = Vec::with_capacity(nodes.len());
    let mut stops = Vec::with_capacity(nodes.len());
    let mut tasks = Vec::with_capacity(nodes.len());
    for (replica, mut inbox) in nodes {
        let (stop, stopped) = oneshot::channel::<()>();
        let runner = replica.clone();
        tasks.push(tokio::spawn(async move {
            runner
                .run(&mut inbox, async {
                    let _ = stopped.await;
                })
                .await
        }));
        stops.push(stop);
        replicas.push(replica);
    }

    for child in &replicas[1..] {
        child.announce_ready();
    }
    wait_until(timeout, || replicas.iter().all(Replica::is_loaded))
        .await
        .context("child replicas did not complete the handshake")?;

    let registry = Arc::new(SyncRegistry::editor());
    for replica in &replicas {
        let scenes = scene_group(replica, &registry)?;
        for n in 0..writes {
            scenes.add_new(|scene| scene.set_name(&format!("{} #{n}", replica.id())))?;
        }
    }

    // Trees only match once every write has been delivered everywhere.
    let expected = replicas.len() * writes;
    let settled = wait_until(timeout, || {
        let hub_data = hub.project().map(|project| project.data());
        let complete = scene_group(&hub, &registry)
            .map(|scenes| scenes.len() == expected)
            .unwrap_or(false);
        complete
            && replicas
                .iter()
                .all(|replica| replica.project().map(|project| project.data()) == hub_data)
    })
    .await;
    if settled.is_err() {
        tracing::warn!(expected, "timed out waiting for replicas to settle");
    }

    for stop in stops {
        let _ = stop.send(());
    }
    for task in tasks {
        task.await.context("replica task failed")?;
    }

    let hub_data = hub.project().map(|project| project.data());
    replicas
        .iter()
        .enumerate()
        .map(|(index, replica)| -> anyhow::Result<ReplicaReport> {
            let project = replica.project().context("replica has no project")?;
            Ok(ReplicaReport {
                id: replica.id(),
                role: if index == 0 { "hub" } else { "child" },
                scenes: scene_group(replica, &registry)?.model_list().len(),
                timeline: project.timeline_len(),
                replay_verified: ReplayEngine::verify(&project),
                matches_hub: hub_data.as_ref() == Some(&project.data()),
            })
        })
        .collect()
}

fn scene_group(replica: &Replica, registry: &Arc<SyncRegistry>) -> anyhow::Result<ReferenceGroup<Scene>> {
    let project = replica.project().context("replica has no project")?;
    Ok(ReferenceGroup::new(
        ModelContext::new(project, Arc::clone(registry)),
        Path::root(Scene::COLLECTION),
    ))
}

async fn wait_until(
    timeout: Duration,
    mut done: impl FnMut() -> bool,
) -> Result<(), tokio::time::error::Elapsed> {
    tokio::time::timeout(timeout, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
