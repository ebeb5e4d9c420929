//! `genloop` command line.
//!
//! Generates a project from a requirements document through repeated
//! generate/test passes, and exposes the structure maintenance helpers
//! (organize, archive, migrate) plus environment checks.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use genloop::agents::generator::LlmCodeSource;
use genloop::core::classifier::destination_path;
use genloop::core::requirements::ProjectProfile;
use genloop::core::sanitize::source_dir_name;
use genloop::core::strategy::TestingMode;
use genloop::exit_codes;
use genloop::io::archive::create_project_archive;
use genloop::io::config::{CONFIG_FILE_NAME, PipelineConfig, load_config, write_config};
use genloop::io::fs::read_tree;
use genloop::io::llm::{CommandLlm, LlmClient};
use genloop::io::migrate::migrate_from_old_structure;
use genloop::io::process::{CommandRunner, SystemCommandRunner};
use genloop::io::structure::{ProjectStructure, StructureManager};
use genloop::io::testing_env::{EnvironmentSettings, TestingEnvironment};
use genloop::logging;
use genloop::pipeline::Pipeline;

#[derive(Parser)]
#[command(
    name = "genloop",
    version,
    about = "Iterative multi-file project generation with automatic testing"
)]
struct Cli {
    /// Pipeline config file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a project from a requirements JSON file.
    Run {
        requirements: PathBuf,
        #[arg(long)]
        project_id: String,
        /// Defaults to `project.name` from the requirements, then the id.
        #[arg(long)]
        project_name: Option<String>,
        #[arg(long)]
        max_iterations: Option<u32>,
        #[arg(long, value_enum)]
        testing_mode: Option<TestingMode>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        output_root: Option<PathBuf>,
    },
    /// Print where each file of a directory would be placed.
    Organize {
        dir: PathBuf,
        #[arg(long)]
        requirements: Option<PathBuf>,
        #[arg(long, default_value = "project")]
        project_name: String,
    },
    /// Package a generated project as `.tar.gz`.
    Archive {
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        project_name: String,
        #[arg(long)]
        include_tests: bool,
    },
    /// Move the latest `iter-<n>` directory into the canonical layout.
    Migrate {
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        project_name: String,
        #[arg(long)]
        old_path: PathBuf,
    },
    /// Provision a testing environment in place and report its readiness.
    VerifyEnv { dir: PathBuf },
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::InitConfig { force } => cmd_init_config(&cli.config, force),
        Command::Run {
            requirements,
            project_id,
            project_name,
            max_iterations,
            testing_mode,
            provider,
            output_root,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(max) = max_iterations {
                config.max_iterations = max;
            }
            if let Some(mode) = testing_mode {
                config.testing_mode = mode;
            }
            if let Some(provider) = provider {
                config.provider = provider;
            }
            if let Some(root) = output_root {
                config.output_root = root;
            }
            config.validate()?;
            cmd_run(config, &requirements, &project_id, project_name).await
        }
        Command::Organize {
            dir,
            requirements,
            project_name,
        } => cmd_organize(&dir, requirements.as_deref(), &project_name),
        Command::Archive {
            project_id,
            project_name,
            include_tests,
        } => {
            let config = load_config(&cli.config)?;
            cmd_archive(&config, &project_id, &project_name, include_tests)
        }
        Command::Migrate {
            project_id,
            project_name,
            old_path,
        } => {
            let config = load_config(&cli.config)?;
            let manager = StructureManager::new(&config.output_root);
            let report = migrate_from_old_structure(&manager, &project_id, &project_name, &old_path)?;
            print_json(&report)?;
            Ok(exit_codes::OK)
        }
        Command::VerifyEnv { dir } => {
            let config = load_config(&cli.config)?;
            cmd_verify_env(&config, &dir).await
        }
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &PipelineConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

async fn cmd_run(
    config: PipelineConfig,
    requirements_path: &Path,
    project_id: &str,
    project_name: Option<String>,
) -> Result<i32> {
    let requirements = read_requirements(requirements_path)?;
    let project_name = project_name
        .or_else(|| {
            requirements
                .get("project")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| project_id.to_string());

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let llm: Arc<dyn LlmClient> = Arc::new(CommandLlm::new(
        config.llm.clone(),
        config.output_limit_bytes,
        runner.clone(),
    ));
    let code_source = Arc::new(LlmCodeSource::new(llm.clone())?);
    let pipeline = Pipeline::new(config, code_source, llm, runner)?;

    let outcome = pipeline
        .run(&requirements, project_id, &project_name, |result| {
            eprintln!(
                "iteration {}: {} ({} files, {} failing suites, {:.1}s)",
                result.iteration,
                result.status.as_str(),
                result.code_files_count,
                result.test_results.failure_count(),
                result.duration,
            );
        })
        .await?;

    print_json(&json!({
        "project_path": outcome.structure.base_path,
        "final_status": outcome.final_status,
        "stop": outcome.stop,
        "iterations": outcome.iterations.len(),
    }))?;
    Ok(exit_codes::OK)
}

fn cmd_organize(dir: &Path, requirements: Option<&Path>, project_name: &str) -> Result<i32> {
    let requirements = match requirements {
        Some(path) => read_requirements(path)?,
        None => json!({}),
    };
    let profile = ProjectProfile::from_requirements(&requirements);
    let source_dir = source_dir_name(project_name);
    let mapping: Vec<Value> = read_tree(dir)?
        .keys()
        .map(|path| json!({ "from": path, "to": destination_path(path, &source_dir, &profile) }))
        .collect();
    print_json(&json!({ "source_dir": source_dir, "files": mapping }))?;
    Ok(exit_codes::OK)
}

fn cmd_archive(
    config: &PipelineConfig,
    project_id: &str,
    project_name: &str,
    include_tests: bool,
) -> Result<i32> {
    let structure = ProjectStructure::new(&config.output_root, project_id, project_name);
    if !structure.source_path.is_dir() {
        bail!("no generated source at {}", structure.source_path.display());
    }
    let path = create_project_archive(&structure, include_tests)?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

async fn cmd_verify_env(config: &PipelineConfig, dir: &Path) -> Result<i32> {
    let files = read_tree(dir)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let env = TestingEnvironment::bootstrap(
        dir,
        &files,
        EnvironmentSettings::from_config(config),
        runner,
    )
    .await?;
    let verification = env.verify_environment().await;
    print_json(&json!({
        "path": env.path(),
        "deps_setup_complete": env.deps_setup_complete(),
        "setup_error": env.setup_error().map(ToString::to_string),
        "verification": verification,
    }))?;
    Ok(if verification.overall_ready {
        exit_codes::OK
    } else {
        exit_codes::INVALID
    })
}

fn read_requirements(path: &Path) -> Result<Value> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "genloop",
            "run",
            "req.json",
            "--project-id",
            "demo",
            "--testing-mode",
            "on-demand",
            "--max-iterations",
            "2",
        ])
        .expect("parse");
        match cli.command {
            Command::Run {
                project_id,
                testing_mode,
                max_iterations,
                project_name,
                ..
            } => {
                assert_eq!(project_id, "demo");
                assert_eq!(testing_mode, Some(TestingMode::OnDemand));
                assert_eq!(max_iterations, Some(2));
                assert_eq!(project_name, None);
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILE_NAME));
    }

    #[test]
    fn run_requires_project_id() {
        assert!(Cli::try_parse_from(["genloop", "run", "req.json"]).is_err());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["genloop", "init-config", "--config", "x.toml", "--force"])
            .expect("parse");
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(cli.command, Command::InitConfig { force: true }));
    }
}
