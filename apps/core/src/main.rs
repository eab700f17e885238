// IntentForge command-line entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use intentforge_core::config::AppConfig;
use intentforge_core::database;
use intentforge_core::detection::{ConversationAnalyzer, DetectionOptions, EntityDetector};
use intentforge_core::export::{self, ExportFormat};
use intentforge_core::services::{analytics, intents, ServiceContext, StaticAuth};
use intentforge_core::telemetry;

#[derive(Debug, Parser)]
#[command(name = "intentforge")]
#[command(about = "Conversational asset store, entity detection and export")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect entities in text (logged when INTENTFORGE_USER_ID is set)
    Detect {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Entity types the text is expected to contain
        #[arg(long = "expect")]
        expected: Vec<String>,
    },
    /// Write an export file into data/exports
    Export {
        /// An intent id, or `all` for a dated bundle of every intent
        target: String,
        #[arg(value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
    },
    /// Import intents from an exported JSON file
    Import { file: PathBuf },
    /// Entity usage summary for a trailing window such as 7d
    Analytics {
        #[arg(default_value = "7d")]
        window: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config)?;

    let paths = config.paths();
    paths.init().context("Failed to create data directories")?;

    let pool = database::init_db(&config.database_url)
        .await
        .context("Failed to initialize database")?;

    let auth = match &config.user_id {
        Some(id) => StaticAuth::user(id.clone()),
        None => StaticAuth::anonymous(),
    };
    let ctx = ServiceContext::new(pool, Arc::new(auth));

    match cli.command {
        Command::Detect { text, expected } => {
            let text = text.join(" ");
            let detector = match config.detection_seed {
                Some(seed) => EntityDetector::with_seed(seed),
                None => EntityDetector::new(),
            };
            let analyzer = ConversationAnalyzer::new(detector);
            let options = DetectionOptions {
                min_confidence: config.min_confidence,
                expected_entities: expected,
                ..Default::default()
            };

            let detection = if config.user_id.is_some() {
                analyzer.analyze_and_log(&ctx, &text, &options).await?.detection
            } else {
                analyzer.detect(&ctx, &text, &options).await
            };
            println!("{}", serde_json::to_string_pretty(&detection)?);
        }
        Command::Export { target, format } => {
            let format = ExportFormat::from(format);
            let (artifact, count) = if target == "all" {
                let all = intents::load_all_intents(&ctx).await?;
                (export::export_bundle(&all, format, Utc::now())?, all.len())
            } else {
                let one = intents::get_intent(&ctx, &target).await?;
                (export::export_intents(&[one], format, Utc::now())?, 1)
            };

            let path = paths
                .write_export(&artifact.filename, &artifact.bytes)
                .with_context(|| format!("Failed to write {}", artifact.filename))?;
            info!("Exported {} intent(s) as {}", count, format);
            println!("{}", path.display());
        }
        Command::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let parsed = export::parse_bundle_json(&raw)?;
            let saved = intents::import_intents(&ctx, parsed).await?;
            let ids: Vec<&str> = saved.iter().map(|i| i.id.as_str()).collect();
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        Command::Analytics { window } => {
            let summary = analytics::get_entity_analytics(&ctx, &window).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
