//! `verdict` — evaluate events against rule and matrix documents from the
//! command line, and validate or export the configuration.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use verdict_core::{Config, EvaluationContext, MatrixConfig};
use verdict_engine::{DecisionEngine, DecisionMatrix, Pipeline};
use verdict_rules::{
    default_matrix, validate_matrix, validate_rule_set, LoadStatus, MatrixDocument, RuleLoader,
};

#[derive(Parser)]
#[command(name = "verdict", about = "Fraud rule evaluation and decision matrix engine")]
struct Cli {
    /// Directory of rule/composition documents (overrides VERDICT_RULES_DIR).
    #[arg(long, global = true)]
    rules_dir: Option<PathBuf>,

    /// Decision matrix document (overrides VERDICT_MATRIX_PATH).
    #[arg(long, global = true)]
    matrix: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate an evaluation-context JSON file and print the decision.
    Evaluate {
        /// Path of the EvaluationContext JSON document.
        #[arg(long)]
        context: PathBuf,
    },
    /// Validate the rule set and matrix; non-zero exit on errors.
    Validate,
    /// Print the matrix configuration as a YAML document.
    Matrix {
        /// Print the built-in default matrix instead of the configured one.
        #[arg(long)]
        builtin: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    verdict_core::config::load_dotenv();
    let mut config = Config::from_env();

    let cli = Cli::parse();
    if let Some(rules_dir) = cli.rules_dir {
        config.rules_dir = rules_dir;
    }
    if let Some(matrix) = cli.matrix {
        config.matrix_path = matrix;
    }

    match cli.command {
        Command::Evaluate { context } => evaluate(&config, &context),
        Command::Validate => validate(&config),
        Command::Matrix { builtin } => print_matrix(&config, builtin),
    }
}

/// Load every document in the rules directory, reporting failures.
fn load_rules(config: &Config) -> Result<RuleLoader> {
    let loader = RuleLoader::new(config.rules_dir.clone());
    let results = loader
        .load_all()
        .with_context(|| format!("failed to scan {}", config.rules_dir.display()))?;

    for result in &results {
        if let LoadStatus::Failed { error } = &result.status {
            warn!(path = %result.path.display(), error = %error, "document failed to load");
        }
    }
    Ok(loader)
}

/// Resolve the matrix config: explicit document path first, then a matrix
/// document from the rules directory, then the built-in default.
fn load_matrix(config: &Config, loader: &RuleLoader) -> Result<MatrixConfig> {
    if config.matrix_path.exists() {
        let contents = fs::read_to_string(&config.matrix_path)
            .with_context(|| format!("failed to read {}", config.matrix_path.display()))?;
        let doc: MatrixDocument = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", config.matrix_path.display()))?;
        return Ok(doc.compile());
    }

    if let Some(matrix) = loader.matrix() {
        return Ok(matrix);
    }

    warn!("no matrix document found, using the built-in default matrix");
    Ok(default_matrix())
}

fn evaluate(config: &Config, context_path: &PathBuf) -> Result<()> {
    let loader = load_rules(config)?;
    let rule_set = loader.rule_set();

    let report = validate_rule_set(&rule_set);
    if !report.valid {
        println!("{}", serde_json::to_string_pretty(&report)?);
        bail!("rule set failed validation");
    }

    let matrix_config = load_matrix(config, &loader)?;
    let matrix = DecisionMatrix::new(&matrix_config).context("failed to build decision matrix")?;

    let contents = fs::read_to_string(context_path)
        .with_context(|| format!("failed to read {}", context_path.display()))?;
    let ctx: EvaluationContext =
        serde_json::from_str(&contents).context("failed to parse evaluation context")?;

    let engine = DecisionEngine::new(matrix);
    let pipeline = Pipeline::compile(&rule_set);
    let decision = engine.decide(&pipeline, &ctx);

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    let loader = load_rules(config)?;

    let mut report = validate_rule_set(&loader.rule_set());
    let matrix_config = load_matrix(config, &loader)?;
    report.merge(validate_matrix(&matrix_config));

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.valid {
        bail!("configuration failed validation");
    }
    Ok(())
}

fn print_matrix(config: &Config, builtin: bool) -> Result<()> {
    let matrix_config = if builtin {
        default_matrix()
    } else {
        let loader = load_rules(config)?;
        load_matrix(config, &loader)?
    };

    let doc = MatrixDocument::from_config("default", "Decision matrix", &matrix_config);
    print!("{}", serde_yaml::to_string(&doc)?);
    Ok(())
}
