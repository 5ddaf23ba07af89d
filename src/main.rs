use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use saffron_engine::{EngineConfig, RecipeEngine, RecipeSource, RunOptions};

/// Saffron - a recipe engine for project scaffolding and automation
#[derive(Parser)]
#[command(name = "saffron")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Extra template directory (default: ~/.saffron/templates)
  #[arg(long, global = true)]
  templates_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a recipe
  Run {
    /// Path to the recipe file (YAML or JSON)
    recipe: PathBuf,

    /// Variable override, repeatable: --var name=value
    #[arg(long = "var", value_parser = parse_var)]
    variables: Vec<(String, serde_json::Value)>,

    /// Project root to operate on (default: current directory)
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Plan everything, write nothing
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Keep going past step failures
    #[arg(long)]
    continue_on_error: bool,

    /// Never prompt; unanswered template content renders empty
    #[arg(long)]
    skip_prompts: bool,

    /// Concurrency limit for the top-level step list
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// JSON file with pre-computed answers for template answer() calls
    #[arg(long)]
    answers: Option<PathBuf>,
  },

  /// Validate a recipe without executing it
  Validate {
    /// Path to the recipe file (YAML or JSON)
    recipe: PathBuf,
  },

  /// Report the answer keys a recipe's templates ask for
  Collect {
    /// Path to the recipe file (YAML or JSON)
    recipe: PathBuf,

    /// Project root to operate on (default: current directory)
    #[arg(long)]
    working_dir: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let templates_dir = cli.templates_dir.clone().or_else(|| {
    dirs::home_dir().map(|home| home.join(".saffron").join("templates"))
  });
  let engine = build_engine(templates_dir);

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_command(cli.command, engine).await })
}

fn build_engine(templates_dir: Option<PathBuf>) -> RecipeEngine {
  let mut config = EngineConfig::default();
  if let Some(dir) = templates_dir {
    config.template_dirs.push(dir);
  }
  RecipeEngine::with_config(config)
}

async fn run_command(command: Commands, engine: RecipeEngine) -> Result<()> {
  match command {
    Commands::Run {
      recipe,
      variables,
      working_dir,
      dry_run,
      force,
      continue_on_error,
      skip_prompts,
      concurrency,
      answers,
    } => {
      let answers = match answers {
        Some(path) => {
          let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read answers file: {}", path.display()))?;
          serde_json::from_str::<HashMap<String, serde_json::Value>>(&content)
            .with_context(|| format!("failed to parse answers file: {}", path.display()))?
        }
        None => HashMap::new(),
      };

      let options = RunOptions {
        variables: variables.into_iter().collect(),
        working_dir,
        dry_run,
        force,
        continue_on_error,
        skip_prompts,
        max_concurrency: concurrency,
        answers,
        ..Default::default()
      };

      let report = engine
        .execute(RecipeSource::path(&recipe), options)
        .await
        .with_context(|| format!("failed to run recipe: {}", recipe.display()))?;

      eprintln!(
        "{}: {} completed, {} failed, {} skipped in {}ms",
        report.recipe,
        report.metadata.completed_steps,
        report.metadata.failed_steps,
        report.metadata.skipped_steps,
        report.duration_ms
      );
      for warning in &report.warnings {
        eprintln!("warning: {}", warning);
      }
      println!("{}", serde_json::to_string_pretty(&report)?);

      if !report.success {
        std::process::exit(1);
      }
      Ok(())
    }

    Commands::Validate { recipe } => {
      let report = engine
        .validate(RecipeSource::path(&recipe))
        .await
        .with_context(|| format!("failed to validate recipe: {}", recipe.display()))?;

      println!("{}", serde_json::to_string_pretty(&report)?);
      if !report.is_valid() {
        bail!("recipe is invalid ({} error(s))", report.errors.len());
      }
      eprintln!("recipe is valid");
      Ok(())
    }

    Commands::Collect {
      recipe,
      working_dir,
    } => {
      let options = RunOptions {
        working_dir,
        ..Default::default()
      };
      let report = engine
        .collect(RecipeSource::path(&recipe), options)
        .await
        .with_context(|| format!("failed to collect from recipe: {}", recipe.display()))?;

      println!("{}", serde_json::to_string_pretty(&report)?);
      Ok(())
    }
  }
}

/// Parse a --var name=value argument. Values parse as JSON when they can,
/// and fall back to plain strings.
fn parse_var(raw: &str) -> Result<(String, serde_json::Value), String> {
  let (name, value) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
  if name.is_empty() {
    return Err(format!("expected name=value, got '{}'", raw));
  }
  let value = serde_json::from_str(value)
    .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
  Ok((name.to_string(), value))
}
