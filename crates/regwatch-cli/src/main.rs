//! regwatch command-line interface.
//!
//! # Usage
//!
//! ```bash
//! # Analyze a document against every loaded framework
//! regwatch analyze policy.txt
//!
//! # Only GDPR and HIPAA, JSON output
//! regwatch analyze policy.txt --framework gdpr --framework hipaa --format json
//!
//! # Inspect and check rule files
//! regwatch rules list --rules-dir rules
//! regwatch rules validate rules
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success, no violations
//! - 1: Violations found (analyze) or invalid rule files (validate)
//! - 2: Configuration or input error

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use regwatch_core::{render_text, RuleSet};
use regwatch_runtime::{ComplianceEngine, EngineConfig};

/// Compliance analysis of documents against GDPR, HIPAA, SOX and other rule sets.
#[derive(Parser, Debug)]
#[command(name = "regwatch")]
#[command(about = "Regwatch - rule and LLM based compliance analysis", long_about = None)]
#[command(version)]
struct Cli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SettingsArgs {
    /// YAML configuration file
    #[arg(long, global = true, env = "REGWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of `*_rules.json` files (overrides the configuration)
    #[arg(long, global = true)]
    rules_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a text document
    Analyze {
        /// UTF-8 text file to analyze
        file: PathBuf,

        /// Framework to check (repeatable); defaults to all loaded frameworks
        #[arg(short, long = "framework")]
        frameworks: Vec<String>,

        /// Document identifier; defaults to the file name
        #[arg(long)]
        doc_id: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Inspect rule files
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
}

#[derive(Subcommand, Debug)]
enum RulesCommands {
    /// List loaded frameworks and rules
    List {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Load every rule file in a directory and report failures
    Validate {
        /// Directory of rule files
        dir: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    /// Violations found, or rule files failed to load
    Findings = 1,
    /// Configuration or input error
    ConfigError = 2,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::ConfigError
        }
    };
    std::process::exit(code.into());
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Analyze {
            file,
            frameworks,
            doc_id,
            format,
        } => {
            let config = load_config(&cli.settings)?;
            analyze(&config, &file, &frameworks, doc_id, format).await
        }
        Commands::Rules {
            command: RulesCommands::List { format },
        } => {
            let config = load_config(&cli.settings)?;
            list_rules(&config.rules_dir, format)
        }
        Commands::Rules {
            command: RulesCommands::Validate { dir },
        } => validate_rules(&dir),
    }
}

/// Configuration file, then `REGWATCH_*` environment, then flags.
fn load_config(settings: &SettingsArgs) -> Result<EngineConfig> {
    let config = match &settings.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(dir) = &settings.rules_dir {
        config.rules_dir = dir.clone();
    }
    Ok(config)
}

async fn analyze(
    config: &EngineConfig,
    file: &Path,
    frameworks: &[String],
    doc_id: Option<String>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("reading document {}", file.display()))?;
    let doc_id = doc_id.unwrap_or_else(|| document_id_for(file));

    let engine = ComplianceEngine::from_config(config)
        .with_context(|| format!("loading rules from {}", config.rules_dir.display()))?;
    tracing::info!(
        frameworks = engine.rules().len(),
        rules = engine.rules().total_rules(),
        provider = engine.provider_name().unwrap_or("none"),
        "Engine ready"
    );

    let filter = (!frameworks.is_empty()).then_some(frameworks);
    let verdicts = engine.analyze_document(&doc_id, &content, filter).await;
    let report = engine.generate_compliance_report(&verdicts);

    match format {
        OutputFormat::Text => print!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    let usage = engine.usage();
    tracing::debug!(
        llm_calls = usage.llm_calls,
        total_tokens = usage.total_tokens,
        failures = usage.failures,
        "LLM usage"
    );

    Ok(if report.has_violations() {
        ExitCode::Findings
    } else {
        ExitCode::Success
    })
}

fn list_rules(dir: &Path, format: OutputFormat) -> Result<ExitCode> {
    let loaded = RuleSet::load_dir(dir)
        .with_context(|| format!("reading rules directory {}", dir.display()))?;
    for failure in &loaded.failures {
        tracing::warn!(path = %failure.path.display(), error = %failure.error, "Rule file not loaded");
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&loaded.rule_set)?),
        OutputFormat::Text => print!("{}", format_rule_list(&loaded.rule_set)),
    }
    Ok(ExitCode::Success)
}

fn format_rule_list(rules: &RuleSet) -> String {
    let mut out = String::new();
    for framework in rules.iter() {
        out.push_str(&format!(
            "{} ({} rules) {}\n",
            framework.framework,
            framework.rules.len(),
            framework.description
        ));
        for rule in &framework.rules {
            out.push_str(&format!("  [{}] {} {}\n", rule.severity, rule.id, rule.name));
        }
    }
    out
}

fn validate_rules(dir: &Path) -> Result<ExitCode> {
    let loaded = RuleSet::load_dir(dir)
        .with_context(|| format!("reading rules directory {}", dir.display()))?;

    for failure in &loaded.failures {
        println!("INVALID {}: {}", failure.path.display(), failure.error);
    }
    println!(
        "{} frameworks, {} rules loaded, {} files failed",
        loaded.rule_set.len(),
        loaded.rule_set.total_rules(),
        loaded.failures.len()
    );

    Ok(if loaded.is_clean() {
        ExitCode::Success
    } else {
        ExitCode::Findings
    })
}

/// File stem, falling back to the full path.
fn document_id_for(file: &Path) -> String {
    file.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| file.display().to_string())
}
