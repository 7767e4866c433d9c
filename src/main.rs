use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use tracing::info;

use kube_task_executor::config::ConfigManager;
use kube_task_executor::core::init_structured_logging;
use kube_task_executor::domain::entities::{TaskInvocation, TaskPayload};
use kube_task_executor::executor::TaskExecutor;

fn task_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("dispatch-id")
                .long("dispatch-id")
                .value_name("ID")
                .required(true)
                .help("Dispatch the task belongs to"),
        )
        .arg(
            Arg::new("node-id")
                .long("node-id")
                .value_name("ID")
                .required(true)
                .help("Node of the task within the dispatch"),
        )
}

fn cli() -> Command {
    Command::new("kube-task")
        .about("Run serialized tasks as Kubernetes batch jobs")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("YAML or JSON configuration file"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("check-config").about("Load, validate and print the configuration"))
        .subcommand(
            task_args(Command::new("run").about("Execute one task and print its result")).arg(
                Arg::new("payload")
                    .long("payload")
                    .value_name("FILE")
                    .required(true)
                    .help("JSON task payload"),
            ),
        )
        .subcommand(task_args(
            Command::new("cleanup").about("Delete the job created for a task"),
        ))
}

fn ids(matches: &ArgMatches) -> anyhow::Result<(String, String)> {
    let dispatch = matches
        .get_one::<String>("dispatch-id")
        .context("missing --dispatch-id")?;
    let node = matches
        .get_one::<String>("node-id")
        .context("missing --node-id")?;
    Ok((dispatch.clone(), node.clone()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_structured_logging()?;

    let matches = cli().get_matches();
    let manager = match matches.get_one::<String>("config") {
        Some(path) => ConfigManager::with_config_file(path),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;

    match matches.subcommand() {
        Some(("check-config", _)) => {
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Some(("run", sub)) => {
            let (dispatch, node) = ids(sub)?;
            let payload_path = sub
                .get_one::<String>("payload")
                .map(PathBuf::from)
                .context("missing --payload")?;
            let payload: TaskPayload = serde_json::from_slice(
                &tokio::fs::read(&payload_path)
                    .await
                    .with_context(|| format!("reading {}", payload_path.display()))?,
            )
            .context("payload is not a valid task payload")?;

            let executor = TaskExecutor::from_config(config).await?;
            let invocation = TaskInvocation::new(dispatch, node, payload);
            let result = executor.run(&invocation).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Some(("cleanup", sub)) => {
            let (dispatch, node) = ids(sub)?;
            let executor = TaskExecutor::from_config(config).await?;
            let invocation = TaskInvocation::new(dispatch, node, TaskPayload::new(Vec::new()));
            let handle = executor.job_handle(&invocation);
            executor.cleanup(&handle).await?;
            info!(job = %handle, "Job deleted");
        }
        other => anyhow::bail!("unknown command {:?}", other.map(|(name, _)| name)),
    }

    Ok(())
}
