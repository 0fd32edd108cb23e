//! `swarm` command-line entry point.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use swarm::agents::build_agent;
use swarm::core::gate::WriteFlags;
use swarm::core::patch::{applied_note, extract_patch_targets};
use swarm::core::plan::parse_git_plan;
use swarm::core::preview::render_diff_preview;
use swarm::core::state::{Event, RunState, Stage};
use swarm::error::RunError;
use swarm::exit_codes;
use swarm::io::config::{SwarmConfig, default_config_path, load_config, write_config};
use swarm::io::git::Git;
use swarm::io::patcher::apply_self_edit_patches;
use swarm::io::prompt::PromptBuilder;
use swarm::io::search::KeywordSearch;
use swarm::logging;
use swarm::pipeline::{Engine, RunRequest, SELF_EDIT_DRY_RUN};

#[derive(Parser)]
#[command(
    name = "swarm",
    version,
    about = "Staged agent pipeline with gated repository writes"
)]
struct Cli {
    /// Config file (default: .swarm/config.toml under the current directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline for a goal.
    Run(RunArgs),
    /// Extract and optionally apply patch targets from a recommendation file.
    Patch {
        file: PathBuf,
        /// Apply the patches (default: preview only).
        #[arg(long)]
        write: bool,
    },
    /// Parse a delivery plan and print the branch and commit message.
    Plan { file: PathBuf },
    /// Manage the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Goal text; multiple words are joined with spaces.
    #[arg(required = true)]
    goal: Vec<String>,
    #[arg(long, default_value = "default")]
    thread_id: String,
    /// Permit git writes in the delivery stage.
    #[arg(long)]
    allow_git_write: bool,
    /// Skip the interactive confirmation for writes.
    #[arg(long)]
    auto_confirm: bool,
    /// Enable the self-edit stage.
    #[arg(long)]
    self_edit: bool,
    /// Additionally confirm that self-edit may modify files.
    #[arg(long)]
    confirm_self_edit_write: bool,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    self_edit_iterations: u32,
    /// Print events and final state as JSON.
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn request(&self) -> RunRequest {
        RunRequest {
            goal: self.goal.join(" "),
            thread_id: self.thread_id.clone(),
            flags: WriteFlags {
                allow_write: self.allow_git_write,
                auto_confirm: self.auto_confirm,
                confirm_self_edit_write: self.confirm_self_edit_write,
            },
            enable_self_edit: self.self_edit,
            self_edit_iterations: self.self_edit_iterations,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    events: &'a [Event],
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a RunState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&root));
    match cli.command {
        Command::Run(args) => cmd_run(&root, &config_path, &args),
        Command::Patch { file, write } => cmd_patch(&root, &file, write),
        Command::Plan { file } => cmd_plan(&file),
        Command::Config {
            command: ConfigCommand::Init { force },
        } => cmd_config_init(&config_path, force),
    }
}

fn cmd_run(root: &Path, config_path: &Path, args: &RunArgs) -> Result<i32> {
    let cfg = match load_config(config_path) {
        Ok(cfg) => cfg,
        Err(err) => return report_failure(&RunError::configuration(format!("{err:#}")), args.json),
    };
    let agent = match build_agent(&cfg, root, |name| std::env::var(name).ok()) {
        Ok(agent) => agent,
        Err(err) => {
            return report_failure(&RunError::from_agent(err, Stage::Critique, Vec::new()), args.json);
        }
    };
    let prompts = PromptBuilder::new(cfg.prompt.budget_bytes)?;
    let mut engine = Engine::new(
        agent,
        Git::new(root),
        KeywordSearch::new(&cfg.search),
        root,
        prompts,
    );

    match engine.run(&args.request()) {
        Ok(outcome) => {
            if args.json {
                print_json(&JsonReport {
                    events: &outcome.events,
                    state: Some(&outcome.state),
                    error: None,
                })?;
            } else {
                print_events(&outcome.events);
            }
            Ok(exit_codes::OK)
        }
        Err(err) => report_failure(&err, args.json),
    }
}

fn report_failure(err: &RunError, json: bool) -> Result<i32> {
    if json {
        print_json(&JsonReport {
            events: err.events(),
            state: None,
            error: Some(err.to_string()),
        })?;
    } else {
        print_events(err.events());
        eprintln!("{err}");
    }
    Ok(err.exit_code())
}

fn print_events(events: &[Event]) {
    for event in events {
        println!("== {} ==", event.label());
        println!("{}\n", event.content.trim_end());
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn cmd_patch(root: &Path, file: &Path, write: bool) -> Result<i32> {
    let text = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let targets = extract_patch_targets(&text);
    println!("Extracted {} patch target(s):", targets.len());
    for target in &targets {
        println!("- {}: {}", target.path, target.action);
    }

    let preview = render_diff_preview(&text);
    if !preview.is_empty() {
        println!("\n{preview}");
    }

    if write {
        let applied = apply_self_edit_patches(&text, root);
        println!("\n{}", applied_note(&applied));
    } else {
        println!("\n{SELF_EDIT_DRY_RUN}");
    }
    Ok(exit_codes::OK)
}

fn cmd_plan(file: &Path) -> Result<i32> {
    let text = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let plan = parse_git_plan(&text);
    println!("Branch Name: {}", plan.branch);
    println!("Commit Message: {}", plan.commit_message);
    Ok(exit_codes::OK)
}

fn cmd_config_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &SwarmConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}
