use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;
use uuid::Uuid;

use crate::compiler::Program;
use crate::config::Config;
use crate::model;
use crate::vm::{FileCheckpointStore, RunOutcome, Runtime, State};

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "Tempo - compile and run suspendable process definitions", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Working directory for tasks (overrides config file and env vars)
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,

    /// Checkpoint directory (overrides config file and env vars)
    #[arg(long, global = true)]
    pub checkpoint_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a definition and print the command tree
    Compile {
        /// Process definition (JSON)
        definition: PathBuf,

        /// Only compile this flow (default: all flows)
        #[arg(short = 'f', long = "flow")]
        flow: Option<String>,
    },

    /// Start a process
    Run {
        /// Process definition (JSON)
        definition: PathBuf,

        /// Flow to run (default: the definition's entry point)
        #[arg(short = 'f', long = "flow")]
        flow: Option<String>,

        /// Process argument as key=value; values are parsed as JSON when possible
        #[arg(short = 'a', long = "arg", value_parser = parse_arg)]
        args: Vec<(String, JsonValue)>,
    },

    /// Deliver an event to a suspended process
    Resume {
        /// Instance ID of the suspended process
        instance_id: Uuid,

        /// Process definition the instance was started from
        #[arg(short = 'd', long = "definition")]
        definition: PathBuf,

        /// Event name
        #[arg(short = 'e', long = "event")]
        event: String,

        /// Event payload (JSON object)
        #[arg(short = 'p', long = "payload", default_value = "{}")]
        payload: String,
    },

    /// Cancel a suspended process
    Cancel {
        /// Instance ID of the suspended process
        instance_id: Uuid,

        /// Process definition the instance was started from
        #[arg(short = 'd', long = "definition")]
        definition: PathBuf,

        /// Cancellation reason
        #[arg(short = 'r', long = "reason", default_value = "Cancelled from CLI")]
        reason: String,
    },

    /// List suspended processes
    List,

    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Load configuration with this invocation's overrides applied
    pub fn load_config(&self) -> Result<Config> {
        Config::builder()
            .config_path(self.config.as_ref().map(PathBuf::from))
            .working_dir(self.working_dir.clone())
            .checkpoint_dir(self.checkpoint_dir.clone())
            .build()
    }
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Load configuration, install logging, and dispatch the command
pub async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Config errors are reported before any command output
    let config = cli.load_config()?;
    init_tracing(&config.log_filter);

    let store = FileCheckpointStore::new(&config.checkpoint_dir);
    let runtime = Runtime::builder()
        .with_stdlib()
        .working_dir(&config.working_dir)
        .build();

    match cli.command {
        Commands::Compile { definition, flow } => {
            let mut program = Program::new(model::load(&definition)?);
            let names: Vec<String> = match flow {
                Some(name) => vec![name],
                None => program.definition().flows.keys().cloned().collect(),
            };

            let mut compiled = Map::new();
            for name in names {
                let command = program
                    .flow(&name)
                    .with_context(|| format!("Failed to compile flow '{}'", name))?;
                compiled.insert(name, serde_json::to_value(command)?);
            }
            println!("{}", serde_json::to_string_pretty(&compiled)?);
        }

        Commands::Run {
            definition,
            flow,
            args,
        } => {
            let mut program = Program::new(model::load(&definition)?);
            let arguments: Map<String, JsonValue> = args.into_iter().collect();

            let mut state = match flow {
                Some(flow) => {
                    let mut locals = program.definition().configuration.arguments.clone();
                    locals.extend(arguments);
                    runtime.prepare_flow(&mut program, &flow, locals)?
                }
                None => runtime.prepare(&mut program, arguments)?,
            };

            let outcome = runtime.start(&mut program, &mut state)?;
            report(&store, &state, outcome).await?;
        }

        Commands::Resume {
            instance_id,
            definition,
            event,
            payload,
        } => {
            let payload: Map<String, JsonValue> =
                serde_json::from_str(&payload).context("Payload must be a JSON object")?;
            let mut program = Program::new(model::load(&definition)?);
            let mut state = store.load(instance_id).await?.state;

            let outcome = runtime.resume(&mut program, &mut state, &event, payload)?;
            report(&store, &state, outcome).await?;
        }

        Commands::Cancel {
            instance_id,
            definition,
            reason,
        } => {
            let mut program = Program::new(model::load(&definition)?);
            let mut state = store.load(instance_id).await?.state;

            let outcome = runtime.cancel(&mut program, &mut state, &reason)?;
            report(&store, &state, outcome).await?;
        }

        Commands::List => {
            let ids = store.list().await?;
            if ids.is_empty() {
                println!("No suspended processes in {}", store.dir().display());
                return Ok(());
            }

            println!("{:<38} {:<26} Events", "Instance", "Saved");
            for id in ids {
                let checkpoint = store.load(id).await?;
                println!(
                    "{:<38} {:<26} {}",
                    id,
                    checkpoint.saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    checkpoint.events.join(", ")
                );
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Persist or discard the checkpoint depending on where the process stopped
async fn report(store: &FileCheckpointStore, state: &State, outcome: RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Done => {
            store.delete(state.instance_id).await?;
            println!("Process {} completed", state.instance_id);
            if let Some(vars) = state.root_variables() {
                println!("{}", serde_json::to_string_pretty(vars)?);
            }
            Ok(())
        }
        RunOutcome::Suspended { events } => {
            let path = store.save(state).await?;
            println!("Process {} suspended", state.instance_id);
            println!("Waiting for: {}", events.join(", "));
            println!("Checkpoint: {}", path.display());
            Ok(())
        }
        RunOutcome::Failed { error } => {
            store.delete(state.instance_id).await?;
            anyhow::bail!("Process {} failed: {}", state.instance_id, error)
        }
    }
}

fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A subscriber may already be installed by an embedding application
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse `key=value`, keeping the value as a string when it is not valid JSON
fn parse_arg(raw: &str) -> Result<(String, JsonValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("count=3").unwrap(), ("count".to_string(), json!(3)));
        assert_eq!(
            parse_arg("name=world").unwrap(),
            ("name".to_string(), json!("world"))
        );
        assert_eq!(
            parse_arg("opts={\"a\":true}").unwrap(),
            ("opts".to_string(), json!({"a": true}))
        );
        assert_eq!(parse_arg("eq=a=b").unwrap(), ("eq".to_string(), json!("a=b")));
        assert!(parse_arg("novalue").is_err());
        assert!(parse_arg("=1").is_err());
    }

    #[test]
    fn test_parse_resume_command() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "tempo",
            "--checkpoint-dir",
            "/tmp/cp",
            "resume",
            &id.to_string(),
            "--definition",
            "flow.json",
            "--event",
            "approved",
        ])
        .unwrap();

        assert_eq!(cli.checkpoint_dir, Some(PathBuf::from("/tmp/cp")));
        let Commands::Resume {
            instance_id,
            event,
            payload,
            ..
        } = cli.command
        else {
            unreachable!("expected resume command")
        };
        assert_eq!(instance_id, id);
        assert_eq!(event, "approved");
        assert_eq!(payload, "{}");
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from(["tempo", "run", "flow.json", "-a", "x=1", "-a", "y=two"])
            .unwrap();

        let Commands::Run { args, flow, .. } = cli.command else {
            unreachable!("expected run command")
        };
        assert_eq!(flow, None);
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], ("y".to_string(), json!("two")));
    }
}
