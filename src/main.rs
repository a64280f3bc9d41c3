// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! aicoder main entry point - CLI and commands.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tokio::sync::watch;

use aicoder::agent::{AgentKind, Artifact};
use aicoder::config::{self, CliOptions, ResolvedConfig, ToolServerMode};
use aicoder::error::PipelineError;
use aicoder::ipc::{ToolClient, ToolServer};
use aicoder::pipeline::{Pipeline, PipelineObserver, PipelineOptions, PipelinePhase, PipelineResult, RoleProviders};
use aicoder::providers::create_provider_from_config;
use aicoder::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};
use aicoder::tools::{OutputRoot, ToolRegistry};
use aicoder::{EXAMPLE_DESCRIPTION, VERSION};

/// aicoder - turn a software description into code and tests.
#[derive(Parser)]
#[command(name = "aicoder")]
#[command(author, version, about = "Multi-agent code generator", long_about = None)]
struct Cli {
    /// Model provider to use (gemini, openai, ollama, openai-compatible)
    #[arg(short, long, global = true, env = "AICODER_PROVIDER")]
    provider: Option<String>,

    /// Model to use for every agent
    #[arg(short, long, global = true, env = "AICODER_MODEL")]
    model: Option<String>,

    /// Base URL for the API
    #[arg(long, global = true, env = "AICODER_BASE_URL")]
    base_url: Option<String>,

    /// Output root for generated files
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Where the tool server runs
    #[arg(long, global = true, value_parser = parse_tool_server)]
    tool_server: Option<ToolServerMode>,

    /// Socket of a running tool server (with --tool-server socket)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Show debug logs and a metrics report
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Subcommands for aicoder.
#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a description
    Run {
        /// Software description; the Expense Comparator example when omitted
        description: Option<String>,

        /// Read the description from a file
        #[arg(short, long, conflicts_with = "description")]
        file: Option<PathBuf>,

        /// Minimum number of generated test cases
        #[arg(long)]
        min_tests: Option<usize>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Serve the tool set over a socket or stdio
    ServeTools {
        /// Output root the tools are confined to
        #[arg(long)]
        root: PathBuf,

        /// Listen on this socket path
        #[arg(long, conflicts_with = "stdio")]
        socket_path: Option<PathBuf>,

        /// Serve on stdin/stdout
        #[arg(long)]
        stdio: bool,
    },

    /// List the tools offered by the tool server
    Tools {
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Initialize a new configuration file
    Init,

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print an example configuration
    Example,
}

fn parse_tool_server(value: &str) -> Result<ToolServerMode, String> {
    value.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = match (&cli.command, cli.verbose) {
        (_, true) => TelemetryConfig::development(),
        (Commands::ServeTools { .. }, false) => TelemetryConfig::tool_server(),
        _ => TelemetryConfig::default(),
    };
    init_telemetry(&telemetry)?;

    let cli_options = CliOptions {
        provider: cli.provider,
        model: cli.model,
        base_url: cli.base_url,
        output_dir: cli.output,
        min_test_cases: None,
        tool_server: cli.tool_server,
        socket_path: cli.socket,
    };

    match cli.command {
        Commands::Run {
            description,
            file,
            min_tests,
            format,
        } => {
            let description = match (description, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading description from {}", path.display()))?,
                (None, None) => EXAMPLE_DESCRIPTION.to_string(),
            };
            let cli_options = CliOptions {
                min_test_cases: min_tests,
                ..cli_options
            };
            let config = config::load_config(&workspace_root()?, cli_options)?;
            handle_run(&config, &description, format, cli.verbose).await
        }
        Commands::ServeTools {
            root,
            socket_path,
            stdio,
        } => handle_serve_tools(&root, socket_path, stdio).await,
        Commands::Tools { format } => {
            let config = config::load_config(&workspace_root()?, cli_options)?;
            handle_tools(&config, format).await
        }
        Commands::Config { action } => {
            match action {
                Some(ConfigAction::Show) | None => {
                    let config = config::load_config(&workspace_root()?, cli_options)?;
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                Some(ConfigAction::Example) => {
                    println!("{}", serde_json::to_string_pretty(&config::starter_config())?);
                }
            }
            Ok(())
        }
        Commands::Init => {
            let cwd = std::env::current_dir()?;
            let path = config::write_workspace_config(&cwd, &config::starter_config())?;
            println!("Created config file: {}", path.display());
            Ok(())
        }
        Commands::Version => {
            println!("aicoder {VERSION}");
            println!("Tool set version {}", aicoder::tools::TOOLSET_VERSION);
            Ok(())
        }
    }
}

/// Nearest directory holding a project config, else the current directory.
fn workspace_root() -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(config::discover_workspace_root(&cwd).unwrap_or(cwd))
}

/// Connect to the tool server the configuration asks for.
async fn connect_tools(config: &ResolvedConfig) -> anyhow::Result<Arc<ToolClient>> {
    let client = match config.tool_server {
        ToolServerMode::InProcess => {
            let root = OutputRoot::new(&config.output_dir)?;
            let server = Arc::new(ToolServer::new(ToolRegistry::for_output_root(root)));
            ToolClient::in_process(server).await?
        }
        ToolServerMode::Spawn => {
            let exe = std::env::current_exe().context("locating the aicoder executable")?;
            let args = vec![
                "serve-tools".to_string(),
                "--root".to_string(),
                config.output_dir.display().to_string(),
                "--stdio".to_string(),
            ];
            ToolClient::spawn(exe, &args).await?
        }
        ToolServerMode::Socket => {
            let Some(path) = &config.socket_path else {
                bail!("toolServer is 'socket' but no socketPath is configured");
            };
            ToolClient::connect(path).await?
        }
    };
    Ok(Arc::new(client))
}

fn role_providers(config: &ResolvedConfig) -> anyhow::Result<RoleProviders> {
    Ok(RoleProviders {
        requirements: create_provider_from_config(config, config.models.requirements.as_deref())?,
        code: create_provider_from_config(config, config.models.code.as_deref())?,
        tests: create_provider_from_config(config, config.models.tests.as_deref())?,
    })
}

async fn handle_run(
    config: &ResolvedConfig,
    description: &str,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    let providers = role_providers(config)?;
    let tools = connect_tools(config).await?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling after the current step...".yellow());
            let _ = cancel_tx.send(true);
        }
    });

    let mut pipeline = Pipeline::with_role_providers(tools, providers, PipelineOptions::from(config))
        .with_cancellation(cancel_rx);
    if matches!(format, OutputFormat::Text) {
        println!(
            "{} Generating into {}",
            "→".cyan(),
            config.output_dir.display().to_string().bright_white()
        );
        pipeline = pipeline.with_observer(Arc::new(ConsoleObserver::new(verbose)));
    }

    let result = pipeline.run(description).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_result(config, &result),
    }
    if verbose {
        eprintln!("\n{}", GLOBAL_METRICS.snapshot().format_report().dimmed());
    }

    if !result.is_success() {
        bail!(
            "pipeline failed in {}",
            result
                .failed_phase
                .map(|p| p.to_string())
                .unwrap_or_else(|| "startup".to_string())
        );
    }
    Ok(())
}

fn print_result(config: &ResolvedConfig, result: &PipelineResult) {
    println!();
    if result.is_success() {
        println!("{} Run {} completed", "✓".green(), result.run_id.short());
    } else {
        println!(
            "{} Run {} failed in {}: {}",
            "✗".red(),
            result.run_id.short(),
            result
                .failed_phase
                .map(|p| p.to_string())
                .unwrap_or_default()
                .bright_red(),
            result.error_kind.map(|k| k.to_string()).unwrap_or_default()
        );
        if let Some(error) = &result.error {
            println!("  {}", error.dimmed());
        }
    }

    if !result.files.is_empty() {
        println!("\n{}", "Source files:".bright_cyan());
        for file in &result.files {
            println!("  {file}");
        }
    }
    if !result.test_files.is_empty() {
        println!(
            "\n{} ({} test cases)",
            "Test files:".bright_cyan(),
            result.test_case_count
        );
        for file in &result.test_files {
            println!("  {file}");
        }
    }

    println!("\n{}", "Model usage:".bright_cyan());
    for (model, usage) in result.usage_report.models() {
        println!(
            "  {}: {} calls, {} tokens",
            model.bright_white(),
            usage.num_api_calls,
            usage.total_tokens
        );
    }
    if let Some(path) = &result.report_path {
        println!(
            "\nUsage report: {}",
            config.output_dir.join(path).display().to_string().dimmed()
        );
    }
}

async fn handle_serve_tools(root: &Path, socket_path: Option<PathBuf>, stdio: bool) -> anyhow::Result<()> {
    let registry = ToolRegistry::for_output_root(OutputRoot::new(root)?);
    let server = Arc::new(ToolServer::new(registry));

    match socket_path {
        Some(path) if !stdio => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(true);
                }
            });
            server.listen(&path, shutdown_rx).await?;
        }
        _ => server.serve_stdio().await?,
    }
    Ok(())
}

async fn handle_tools(config: &ResolvedConfig, format: OutputFormat) -> anyhow::Result<()> {
    let client = connect_tools(config).await?;
    match format {
        OutputFormat::Json => {
            let listing = serde_json::json!({
                "version": client.version(),
                "tools": client.tools(),
            });
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        OutputFormat::Text => {
            println!("{} (v{})", "Tools".bright_blue().bold(), client.version());
            for tool in client.tools() {
                let marker = if tool.is_mutating() { "✎".yellow() } else { "·".dimmed() };
                println!("{marker} {} - {}", tool.name.bright_white(), tool.description);
            }
            println!("\n{}", "Agent capabilities:".bright_cyan());
            for kind in [AgentKind::RequirementsAnalyzer, AgentKind::CodeGenerator, AgentKind::TestGenerator] {
                println!("  {kind}: {}", kind.capabilities().join(", "));
            }
        }
    }
    Ok(())
}

/// Renders pipeline progress with one spinner per phase.
struct ConsoleObserver {
    spinner: Mutex<Option<ProgressBar>>,
    verbose: bool,
}

impl ConsoleObserver {
    fn new(verbose: bool) -> Self {
        Self {
            spinner: Mutex::new(None),
            verbose,
        }
    }

    fn with_spinner(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(spinner) = guard.as_ref() {
            f(spinner);
        }
    }

    fn take_spinner(&self) -> Option<ProgressBar> {
        self.spinner.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl PipelineObserver for ConsoleObserver {
    fn on_phase_start(&self, phase: PipelinePhase, agent: AgentKind) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("{phase}: {agent} working..."));
        spinner.enable_steady_tick(Duration::from_millis(100));
        *self.spinner.lock().unwrap_or_else(PoisonError::into_inner) = Some(spinner);
    }

    fn on_phase_complete(&self, phase: PipelinePhase, artifact: &Artifact) {
        if let Some(spinner) = self.take_spinner() {
            spinner.finish_and_clear();
        }
        let summary = match (artifact.as_requirements(), artifact.as_source_files(), artifact.as_test_files()) {
            (Some(spec), _, _) => format!(
                "{} requirements, entities: {}",
                spec.requirements.len(),
                spec.entity_names().join(", ")
            ),
            (_, Some(set), _) => format!("{} files passed the syntax check", set.files.len()),
            (_, _, Some(set)) => format!("{} test cases", set.test_case_count()),
            _ => String::new(),
        };
        println!("{} {phase} {}", "✓".green(), summary.dimmed());
    }

    fn on_phase_failed(&self, phase: PipelinePhase, error: &PipelineError) {
        if let Some(spinner) = self.take_spinner() {
            spinner.finish_and_clear();
        }
        println!("{} {phase} {}", "✗".red(), error.kind().to_string().red());
    }

    fn on_iteration(&self, agent: AgentKind, iteration: usize, budget: usize) {
        self.with_spinner(|s| s.set_message(format!("{agent}: step {iteration}/{budget}")));
    }

    fn on_tool_call(&self, agent: AgentKind, tool: &str, arguments: &Value) {
        let target = arguments.get("path").and_then(Value::as_str).unwrap_or("");
        self.with_spinner(|s| s.set_message(format!("{agent}: {tool} {target}")));
        if self.verbose {
            self.with_spinner(|s| s.println(format!("  {} {tool} {target}", "▸".dimmed())));
        }
    }

    fn on_tool_result(&self, _agent: AgentKind, tool: &str, result: &str, is_error: bool) {
        if is_error {
            let first_line = result.lines().next().unwrap_or_default();
            self.with_spinner(|s| s.println(format!("  {} {tool}: {}", "!".yellow(), first_line.dimmed())));
        }
    }
}
