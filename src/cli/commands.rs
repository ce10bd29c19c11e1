//! CLI command definitions for promptforge.
//!
//! The CLI drives the engine end to end: scaffold a project file, validate
//! it, preview a section's assembled prompt, or run every pending section
//! against the execution backend.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use crate::assembly::{AssemblyOptions, PromptAssembler};
use crate::backend::{FsOutputWriter, HttpBackendClient};
use crate::config::EngineConfig;
use crate::pipeline::{derive_input, PipelineExecutor};
use crate::project::Project;
use crate::template::{DirSource, ReferenceCatalog, TemplateStore};

/// Template-driven content pipeline runner.
#[derive(Parser)]
#[command(name = "promptforge")]
#[command(about = "Assemble step prompts from templates and execute them in dependency order")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Write a blueprint project file with the canonical step chain.
    Init(InitArgs),

    /// Validate a project file without running anything.
    Validate(ValidateArgs),

    /// Print the assembled prompt for one section.
    Assemble(AssembleArgs),

    /// Execute all pending sections against the backend.
    Run(RunArgs),
}

/// Arguments for `promptforge init`.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Project identifier.
    #[arg(long, default_value = "project")]
    pub id: String,

    /// Workflow case number (1-7).
    #[arg(long, default_value = "1")]
    pub case: u8,

    /// Output path for the project file.
    #[arg(short = 'o', long, default_value = "project.yaml")]
    pub output: String,
}

/// Arguments for `promptforge validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the project YAML file.
    pub project: String,
}

/// Arguments for `promptforge assemble`.
#[derive(Parser, Debug)]
pub struct AssembleArgs {
    /// Path to the project YAML file.
    pub project: String,

    /// Id of the section to assemble.
    pub section: String,

    /// Comma-separated template roots tried in order.
    #[arg(long, env = "PROMPTFORGE_TEMPLATE_ROOTS")]
    pub templates: Option<String>,

    /// Substitute the section's derived input into the prompt, as a copy
    /// action would.
    #[arg(long)]
    pub with_input: bool,
}

/// Arguments for `promptforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the project YAML file.
    pub project: String,

    /// Scope directory handed to the backend; overrides the project's.
    #[arg(long)]
    pub scope_dir: Option<String>,

    /// Backend base URL.
    #[arg(long, env = "PROMPTFORGE_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Comma-separated template roots tried in order.
    #[arg(long, env = "PROMPTFORGE_TEMPLATE_ROOTS")]
    pub templates: Option<String>,

    /// Skip writing section outputs to the automation directory.
    #[arg(long)]
    pub no_save: bool,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the CLI with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init(args) => init(args).await,
        Commands::Validate(args) => validate(args).await,
        Commands::Assemble(args) => assemble(args).await,
        Commands::Run(args) => run(args).await,
    }
}

fn engine_config(template_roots: Option<&str>, backend_url: Option<&str>) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::from_env().context("invalid engine configuration")?;
    if let Some(roots) = template_roots {
        config.template_roots = roots
            .split(',')
            .map(|s| PathBuf::from(s.trim()))
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
    }
    if let Some(url) = backend_url {
        config.backend_url = url.to_string();
    }
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

fn build_stores(config: &EngineConfig) -> (Arc<TemplateStore>, Arc<ReferenceCatalog>) {
    let source = Arc::new(DirSource::new());
    let store = Arc::new(TemplateStore::new(
        source.clone(),
        config.template_roots.clone(),
    ));
    let catalog = Arc::new(ReferenceCatalog::new(source, config.template_roots.clone()));
    (store, catalog)
}

async fn init(args: InitArgs) -> anyhow::Result<()> {
    let project = Project::standard(&args.id, args.case);
    project
        .validate()
        .with_context(|| format!("blueprint for case {} is invalid", args.case))?;
    project
        .save_to_file(&args.output)
        .await
        .with_context(|| format!("failed to write '{}'", args.output))?;
    info!(path = %args.output, id = %args.id, "project file written");
    Ok(())
}

async fn validate(args: ValidateArgs) -> anyhow::Result<()> {
    let project = Project::from_file(&args.project)
        .await
        .with_context(|| format!("failed to load '{}'", args.project))?;

    let warnings = project.validate()?;
    for warning in &warnings {
        warn!("{}", warning);
    }
    println!(
        "project '{}': {} sections, {} warnings",
        project.id,
        project.sections.len(),
        warnings.len()
    );
    Ok(())
}

async fn assemble(args: AssembleArgs) -> anyhow::Result<()> {
    let config = engine_config(args.templates.as_deref(), None)?;
    let (store, catalog) = build_stores(&config);
    let assembler = PromptAssembler::new(store, catalog);

    let project = Project::from_file(&args.project)
        .await
        .with_context(|| format!("failed to load '{}'", args.project))?;
    let section = project
        .section(&args.section)
        .with_context(|| format!("no section '{}' in project '{}'", args.section, project.id))?;

    let input = args.with_input.then(|| derive_input(&project, section));
    let options = AssemblyOptions {
        input: input.as_deref(),
        include_references: config.include_references,
    };

    match assembler.assemble(section, &project, &options).await {
        Some(prompt) => {
            println!("{}", prompt);
            Ok(())
        }
        None => bail!(
            "no template resolved for step '{}' of section '{}'",
            section.step_name,
            section.section_id
        ),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = engine_config(args.templates.as_deref(), args.backend_url.as_deref())?;

    let mut project = Project::from_file(&args.project)
        .await
        .with_context(|| format!("failed to load '{}'", args.project))?;
    for warning in project.validate()? {
        warn!("{}", warning);
    }

    let (store, catalog) = build_stores(&config);
    let core_steps: Vec<&str> = project
        .sections
        .iter()
        .filter(|s| !s.is_process_step && !s.is_inference_step)
        .map(|s| s.step_name.as_str())
        .collect();
    let loaded = store.preload(&core_steps).await;
    info!(requested = core_steps.len(), loaded, "core templates preloaded");

    let assembler = PromptAssembler::new(store, catalog);
    let backend = Arc::new(HttpBackendClient::new(config.backend_url.clone()));

    let mut executor = PipelineExecutor::new(assembler, backend, config);
    if !args.no_save {
        executor = executor.with_writer(Arc::new(FsOutputWriter::new()));
    }

    let report = executor
        .start(&mut project, args.scope_dir.as_deref())
        .await?;

    // Persist updated statuses and outputs back to the project file.
    project
        .save_to_file(&args.project)
        .await
        .with_context(|| format!("failed to write '{}'", args.project))?;

    println!(
        "run {} {:?}: {} completed, {} skipped, {:.1}s",
        report.run_id,
        report.outcome,
        report.completed.len(),
        report.skipped_missing_template.len(),
        report.duration.as_secs_f64()
    );
    Ok(())
}
