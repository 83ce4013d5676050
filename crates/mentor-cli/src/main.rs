//! Mentor CLI
//!
//! Serves the course generation API, or runs a single pipeline step from the
//! command line against the configured database.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use mentor_orchestrator::{
    create_router, AppState, Config, CourseDetail, CourseRepository, HttpLanguageModel,
    LanguageModel, LearnerProfile, MentorService, ModuleContent, SkillLevel, TimedModel,
};
use mentor_report::{json::JsonGenerator, CourseReport, MarkdownGenerator};
use mentor_store::SqliteRepository;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Mentor - LLM course generator
///
/// Plans a course for a topic, expands its modules into lessons and writes
/// the lesson material with a language model.
#[derive(Parser, Debug)]
#[command(name = "mentor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: mentor.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and event stream
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate and store a syllabus for a topic
    Course {
        /// Topic to build the course for
        topic: String,

        /// Free-text instructions for the syllabus
        #[arg(short, long)]
        instructions: Option<String>,

        #[command(flatten)]
        profile: ProfileArgs,

        /// Print the stored course as JSON
        #[arg(long)]
        json: bool,
    },

    /// Expand a stored module and generate its lessons
    Module {
        /// Course the module belongs to
        course_id: String,

        /// Module to generate
        module_id: String,

        #[command(flatten)]
        profile: ProfileArgs,

        /// Print the generated content as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a stored course with its generated lessons
    Export {
        /// Course to export
        course_id: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Markdown)]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Learner profile flags. Without `--skill-level` no profile is sent and the
/// stored one (or the default) applies.
#[derive(clap::Args, Debug)]
struct ProfileArgs {
    /// Learner skill level: beginner, intermediate or advanced
    #[arg(long)]
    skill_level: Option<SkillLevel>,

    /// Preferred learning style
    #[arg(long, default_value = "hands-on")]
    learning_style: String,

    /// Weekly time budget in hours
    #[arg(long, default_value_t = 5)]
    hours_per_week: u32,

    /// Topics the learner already knows (repeatable)
    #[arg(long = "prior")]
    prior_knowledge: Vec<String>,
}

impl ProfileArgs {
    fn profile(&self) -> Option<LearnerProfile> {
        self.skill_level.map(|skill_level| LearnerProfile {
            skill_level,
            learning_style: self.learning_style.clone(),
            time_commitment: self.hours_per_week,
            prior_knowledge: self.prior_knowledge.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    tracing::debug!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        database = %config.database.path,
        "Configuration loaded"
    );

    match args.command {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Course {
            topic,
            instructions,
            profile,
            json,
        } => {
            let service = build_service(&config)?;
            let (_, course_id) = service
                .create_syllabus(&topic, instructions.as_deref(), profile.profile().as_ref())
                .await?;
            let detail = service.course_detail(&course_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print_course(&detail);
            }
            Ok(())
        }
        Command::Module {
            course_id,
            module_id,
            profile,
            json,
        } => {
            let service = build_service(&config)?;
            let (content, _) = service
                .create_module_content(&course_id, &module_id, profile.profile().as_ref())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&content)?);
            } else {
                print_module(&content);
            }
            Ok(())
        }
        Command::Export {
            course_id,
            format,
            output,
        } => export(&config, &course_id, format, output.as_deref()),
    }
}

/// Loads configuration from the specified path or default location, then
/// applies environment overrides.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    let config = match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path)?
        }
        None => Config::load()?,
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn open_repository(config: &Config) -> anyhow::Result<Arc<dyn CourseRepository>> {
    let repo = SqliteRepository::open(Path::new(&config.database.path)).map_err(|e| {
        anyhow::anyhow!(
            "Failed to open database '{}': {e}\n\nSuggestion: Check database.path in mentor.json or MENTOR_DATABASE",
            config.database.path
        )
    })?;
    Ok(Arc::new(repo))
}

fn build_model(config: &Config) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let model = HttpLanguageModel::from_config(&config.llm)?;
    tracing::info!(
        provider = %config.llm.provider,
        model = model.model(),
        timeout_secs = config.llm.timeout_secs,
        "Language model ready"
    );
    Ok(Arc::new(TimedModel::new(
        model,
        Duration::from_secs(config.llm.timeout_secs),
    )))
}

fn build_service(config: &Config) -> anyhow::Result<MentorService> {
    Ok(MentorService::new(
        build_model(config)?,
        open_repository(config)?,
        config.generation.expansion_policy,
    ))
}

async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config.clone(), build_model(&config)?, open_repository(&config)?);
    let router = create_router(state);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("Mentor API running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    println!();
    println!("Shutting down...");
}

fn export(
    config: &Config,
    course_id: &str,
    format: ExportFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let repo = open_repository(config)?;
    let report = CourseReport::load(repo.as_ref(), course_id)?;

    match (format, output) {
        (ExportFormat::Json, Some(path)) => {
            JsonGenerator::new(&report).write_to_file(path, true)?;
            println!("Exported {} to {}", report.course_title, path.display());
        }
        (ExportFormat::Json, None) => {
            println!("{}", JsonGenerator::new(&report).generate_pretty()?);
        }
        (ExportFormat::Markdown, Some(path)) => {
            std::fs::write(path, MarkdownGenerator::new(&report).generate())?;
            println!("Exported {} to {}", report.course_title, path.display());
        }
        (ExportFormat::Markdown, None) => {
            print!("{}", MarkdownGenerator::new(&report).generate());
        }
    }

    Ok(())
}

fn print_course(detail: &CourseDetail) {
    println!("Course:      {}", detail.course_title);
    println!("Id:          {}", detail.id);
    println!("Difficulty:  {}", detail.difficulty_level);
    println!("Duration:    {} hours", detail.estimated_duration);
    if !detail.prerequisites.is_empty() {
        println!("Requires:    {}", detail.prerequisites.join(", "));
    }
    println!();
    println!("Modules:");
    for module in &detail.modules {
        println!(
            "  {}  {} ({} hours)",
            module.id, module.title, module.estimated_duration
        );
    }
}

fn print_module(content: &ModuleContent) {
    println!("Module:   {}", content.title);
    println!("Id:       {}", content.module_id);
    println!("Lessons:  {}", content.lessons.len());
    println!("Minutes:  {}", content.total_lesson_minutes());
    println!();
    for lesson in &content.lessons {
        println!(
            "  {:<12} {:<10} {:>3} min  {}",
            lesson.id,
            lesson.lesson_type.as_str(),
            lesson.estimated_duration,
            lesson.title
        );
    }
}
