//! PanelPrint CLI - Print artifact generation for order archives
//!
//! Commands: process, fetch, classify, catalog
//! Outputs JSON to stdout, logs to stderr
//! Exit code 2 means the panel type needs operator confirmation

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use panelprint_core::{
    DirectoryArchiveProvider, PanelCatalog, PipelineConfig, PipelineError, PrintAreaSpec, PrintPipeline,
    ProcessRequest, RunOutcome,
};

#[derive(Parser)]
#[command(name = "panelprint-cli")]
#[command(about = "PanelPrint CLI - heating panel print artifacts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Panel catalog file, overrides the configured path
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// Order identifier, used for the artifact name
    #[arg(short, long)]
    order: String,

    /// Position within a multi-position order
    #[arg(short, long)]
    position: Option<u32>,

    /// Where to write the artifact (defaults to the archive directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Continue even if no panel type matches the ratio
    #[arg(long)]
    accept_unmatched: bool,

    /// Aspect ratio tolerance override
    #[arg(long)]
    tolerance: Option<f64>,
}

impl RunArgs {
    fn request(&self) -> ProcessRequest {
        ProcessRequest {
            order_id: self.order.clone(),
            position: self.position,
            output_dir: self.output_dir.clone(),
            accept_unmatched: self.accept_unmatched,
            aspect_tolerance: self.tolerance,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process an extracted archive directory
    Process {
        /// Archive directory
        #[arg(short, long)]
        archive: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Process the archive stored under <root>/<order>
    Fetch {
        /// Directory holding one sub-directory per order
        #[arg(short, long)]
        root: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Classify a print area against the panel catalog
    Classify {
        #[arg(long)]
        width: f64,

        #[arg(long)]
        height: f64,
    },

    /// Show the panel catalog (creates the default file if missing)
    Catalog,
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => println!(r#"{{"success": false, "error": "{}"}}"#, e),
    }
}

fn fail(error: &PipelineError) -> ExitCode {
    print_json(&serde_json::json!({
        "success": false,
        "error": error.to_string(),
    }));
    ExitCode::FAILURE
}

fn outcome_exit(outcome: Result<RunOutcome, PipelineError>) -> ExitCode {
    match outcome {
        Ok(RunOutcome::Completed(report)) => {
            print_json(&serde_json::json!({
                "success": true,
                "report": report,
            }));
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::AwaitingConfirmation(request)) => {
            print_json(&serde_json::json!({
                "success": false,
                "confirmation_required": request,
            }));
            ExitCode::from(2)
        }
        Err(e) => fail(&e),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::load(path) {
            Ok(c) => c,
            Err(e) => return fail(&e),
        },
        None => PipelineConfig::default(),
    };
    if let Some(path) = cli.catalog {
        config.catalog_path = path;
    }

    let catalog = match PanelCatalog::load_or_init(&config.catalog_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    let pipeline = PrintPipeline::new(catalog, config);

    match cli.command {
        Commands::Process { archive, run } => outcome_exit(pipeline.process_archive(&archive, &run.request())),

        Commands::Fetch { root, run } => {
            let provider = DirectoryArchiveProvider::new(root);
            outcome_exit(pipeline.process_order(&provider, &run.request()))
        }

        Commands::Classify { width, height } => {
            let spec = match PrintAreaSpec::new(width, height) {
                Ok(s) => s,
                Err(e) => return fail(&e),
            };
            let result = pipeline.classify(&spec);
            print_json(&serde_json::json!({
                "ratio": spec.ratio,
                "classification": result,
            }));
            if result.is_matched() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Catalog => {
            let entries: Vec<_> = pipeline
                .catalog()
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "name": e.name,
                        "width_mm": e.width_mm,
                        "height_mm": e.height_mm,
                        "ratio": e.target_ratio(),
                        "tolerance": e.tolerance,
                        "wattage": e.wattage.to_string(),
                        "description": e.description,
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(entries));
            ExitCode::SUCCESS
        }
    }
}
