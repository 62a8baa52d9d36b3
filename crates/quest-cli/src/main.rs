//! quest CLI: author, render and grade randomized question templates.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "quest", version, about = "Randomized question templates and auto-grading")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile templates and report warnings
    Validate {
        /// Path to a .qset file or a directory of them
        #[arg(long)]
        templates: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Render a template into a randomized instance
    Render {
        /// Path to a .qset file
        #[arg(long)]
        template: PathBuf,

        /// Which template of the file to render (0-based)
        #[arg(long, default_value = "0")]
        index: usize,

        /// Seed for reproducible rendering (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Render one instance per test-taker (repeatable)
        #[arg(long = "taker")]
        takers: Vec<String>,

        /// Write JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Grade one submission against a rendered instance
    Grade {
        /// Rendered instance JSON
        #[arg(long)]
        instance: PathBuf,

        /// Submission JSON
        #[arg(long)]
        submission: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Grade a file of jobs concurrently
    Batch {
        /// JSON array of grading jobs
        #[arg(long)]
        jobs: PathBuf,

        /// Max concurrent grading jobs (defaults to config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Output directory (defaults to config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, markdown, all
        #[arg(long, default_value = "json")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two grade reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Score change threshold, as a fraction of the max grade
        #[arg(long, default_value = "0.05")]
        threshold: f64,

        /// Exit code 1 if any score went down
        #[arg(long)]
        fail_on_regression: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create starter config and example template set
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quest=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { templates, config } => commands::validate::execute(templates, config),
        Commands::Render {
            template,
            index,
            seed,
            takers,
            output,
            config,
        } => commands::render::execute(template, index, seed, takers, output, config),
        Commands::Grade {
            instance,
            submission,
            config,
        } => commands::grade::execute(instance, submission, config),
        Commands::Batch {
            jobs,
            parallelism,
            output,
            format,
            config,
        } => commands::batch::execute(jobs, parallelism, output, format, config).await,
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_regression,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_regression, format),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
