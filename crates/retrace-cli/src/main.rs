//! `retrace` command line tool
//!
//! Works on graphs saved by a graph manager (`{desc, dump}` records) or on
//! bare dumps. Graphs are loaded structurally, without executors.

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use retrace_graph::{GraphManager, JsonFileStore, ProvenanceGraph, RetraceConfig, StaticActionRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod load;
mod rules;

use rules::Rule;

fn cli() -> Command {
    let file = || {
        Arg::new("file")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Stored graph or dump (JSON)")
    };
    let json = || {
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Output as JSON")
    };

    Command::new("retrace")
        .version(retrace_graph::VERSION)
        .about("Inspect and compress provenance graphs")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML file with [graph] and [manager] tables"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Write logs as JSON lines"),
        )
        .subcommand(
            Command::new("list")
                .about("List the graphs stored in a directory")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Store directory"),
                )
                .arg(json()),
        )
        .subcommand(
            Command::new("inspect")
                .about("Show description, size and states of a graph")
                .arg(file())
                .arg(json()),
        )
        .subcommand(
            Command::new("path")
                .about("Show the actions from the root to the current state")
                .arg(file())
                .arg(json()),
        )
        .subcommand(
            Command::new("compress")
                .about("Export the compressed path to the current state as a new dump")
                .arg(file())
                .arg(
                    Arg::new("last-only")
                        .long("last-only")
                        .action(ArgAction::Append)
                        .value_name("F_ID:PARAMETER")
                        .help("Keep only the last action per object and parameter value"),
                )
                .arg(
                    Arg::new("last-consecutive")
                        .long("last-consecutive")
                        .action(ArgAction::Append)
                        .value_name("F_ID:PARAMETER")
                        .help("Keep only the last of each run of equal-keyed actions"),
                )
                .arg(
                    Arg::new("cancel-pair")
                        .long("cancel-pair")
                        .action(ArgAction::Append)
                        .value_name("ADD_ID:REMOVE_ID")
                        .help("Drop additions that are removed later on"),
                )
                .arg(
                    Arg::new("create-remove")
                        .long("create-remove")
                        .action(ArgAction::Append)
                        .value_name("CREATE_ID:REMOVE_ID")
                        .help("Drop objects created and removed within the path"),
                )
                .arg(json())
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the compressed dump to this file"),
                ),
        )
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn read_config(path: Option<&PathBuf>) -> anyhow::Result<RetraceConfig> {
    let Some(path) = path else {
        return Ok(RetraceConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config {}", path.display()))?;
    RetraceConfig::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> anyhow::Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("missing argument <{name}>"))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn list(dir: &Path, config: &RetraceConfig, json: bool) -> anyhow::Result<()> {
    let manager = GraphManager::new(Arc::new(JsonFileStore::new(dir)), Arc::new(StaticActionRegistry::new()))
        .with_config(config.manager.clone())
        .with_graph_config(config.graph.clone());
    let descs = manager.list().await?;
    if json {
        return print_json(&descs);
    }
    for d in descs {
        println!(
            "{:<16} {:<32} {:>4} states  {}",
            d.id,
            d.name,
            d.size.states,
            d.modified_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn inspect(graph: &ProvenanceGraph, json: bool) -> anyhow::Result<()> {
    let desc = graph.desc();
    let dim = graph.dim();
    if json {
        return print_json(&serde_json::json!({
            "desc": desc,
            "size": dim,
            "currentStateId": graph.current(),
        }));
    }

    println!("{} ({})", desc.name, desc.id);
    if !desc.description.is_empty() {
        println!("  {}", desc.description.replace('\n', "\n  "));
    }
    println!("Creator: {}", desc.creator);
    println!(
        "States: {}  Actions: {}  Objects: {}  Stories: {}",
        dim.states, dim.actions, dim.objects, dim.stories
    );
    println!();

    let current = graph.current();
    for state in graph.states() {
        let marker = if state.id == current { "*" } else { " " };
        let name = state.name.as_deref().unwrap_or("");
        println!("{marker} {:<6} {:<32} {} children", state.id.to_string(), name, state.children.len());
    }
    Ok(())
}

fn show_path(graph: &ProvenanceGraph, json: bool) -> anyhow::Result<()> {
    let path = graph.current_path();
    if json {
        let dump = graph.persist();
        let on_path: Vec<_> = dump
            .actions
            .into_iter()
            .filter(|a| path.iter().any(|p| p.id() == a.id))
            .collect();
        return print_json(&on_path);
    }
    for action in &path {
        let marker = if action.is_reversible() { " " } else { "!" };
        println!(
            "{marker} {:<6} {:<24} {}",
            action.id().to_string(),
            action.f_id(),
            action.meta().name
        );
    }
    Ok(())
}

fn collect_rules(args: &ArgMatches) -> anyhow::Result<Vec<Rule>> {
    let parsers: [(&str, fn(&str) -> Result<Rule, retrace_compression::CompressionError>); 4] = [
        ("last-only", Rule::last_only),
        ("last-consecutive", Rule::last_consecutive),
        ("cancel-pair", Rule::cancel_pair),
        ("create-remove", Rule::create_remove),
    ];
    let mut rules = Vec::new();
    for (name, parse) in parsers {
        let (Some(indices), Some(values)) = (args.indices_of(name), args.get_many::<String>(name)) else {
            continue;
        };
        for (index, value) in indices.zip(values) {
            rules.push((index, parse(value)?));
        }
    }
    // Compressors run in registration order, so keep the order given
    rules.sort_by_key(|(index, _)| *index);
    Ok(rules.into_iter().map(|(_, rule)| rule).collect())
}

async fn compress(graph: &ProvenanceGraph, args: &ArgMatches) -> anyhow::Result<()> {
    let rules = collect_rules(args)?;
    let registry = rules::build(&rules)?;
    let export = graph.export_compressed(&registry);
    tracing::info!(
        graph = %graph.id(),
        rules = rules.len(),
        before = graph.current_path().len(),
        after = export.actions.len(),
        "compressed graph"
    );

    let output = args.get_one::<PathBuf>("output");
    if output.is_none() && !args.get_flag("json") {
        for action in &export.actions {
            println!("{:<6} {:<24} {}", action.id.to_string(), action.f_id, action.meta.name);
        }
        return Ok(());
    }

    let text = export.to_json()?;
    match output {
        Some(out) => tokio::fs::write(out, text)
            .await
            .with_context(|| format!("failed to write {}", out.display()))?,
        None => println!("{text}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));
    let config = read_config(matches.get_one::<PathBuf>("config")).await?;

    match matches.subcommand() {
        Some(("list", args)) => list(required(args, "dir")?, &config, args.get_flag("json")).await,
        Some(("inspect", args)) => {
            let graph = load::load(required(args, "file")?, &config).await?;
            inspect(&graph, args.get_flag("json"))
        }
        Some(("path", args)) => {
            let graph = load::load(required(args, "file")?, &config).await?;
            show_path(&graph, args.get_flag("json"))
        }
        Some(("compress", args)) => {
            let graph = load::load(required(args, "file")?, &config).await?;
            compress(&graph, args).await
        }
        _ => Ok(()),
    }
}
