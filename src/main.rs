//! KrishiLok advisory CLI
//!
//! Runs the classifier, the advice synthesizer and the knowledge base from
//! the command line with the same configuration the server uses.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use krishilok::advice::{AdvicePayload, AdviceRequest};
use krishilok::bootstrap::AdvisoryServices;
use krishilok::config::AppConfig;
use krishilok::utils::logging::{init_logging, LogConfig};
use krishilok::CropCategory;

/// Crop disease detection and treatment advice
#[derive(Parser, Debug)]
#[command(name = "krishilok")]
#[command(version)]
#[command(about = "Crop disease detection and treatment advice", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level name (trace, debug, info, warn, error)
    #[arg(long, env = "KRISHILOK_LOG_LEVEL")]
    log_level: Option<String>,

    /// TOML configuration file
    #[arg(short, long, env = "KRISHILOK_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify one crop image
    Classify {
        /// Path to the image
        #[arg(short, long)]
        image: PathBuf,

        /// Crop category: chilli, groundnut or rice
        #[arg(short, long)]
        crop: String,

        /// Number of ranked labels to print
        #[arg(long, default_value = "3")]
        top: usize,
    },

    /// Synthesize treatment advice for a disease label
    Advise {
        /// Disease label as produced by the classifier
        #[arg(short, long)]
        disease: String,

        /// Crop category
        #[arg(short, long)]
        crop: String,

        /// Language code for the advice
        #[arg(short, long, default_value = "en")]
        language: String,

        /// Confidence to mention in the prompt (0-100)
        #[arg(long, default_value = "100.0")]
        confidence: f64,
    },

    /// List knowledge base entries
    Knowledge {
        /// Only diseases of this crop
        #[arg(short, long)]
        crop: Option<String>,
    },

    /// Show which services are available
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(level) = cli.log_level.as_deref() {
        log_config = log_config.with_level_name(level);
    }
    init_logging(&log_config)?;

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let services = AdvisoryServices::from_config(&config)?;

    match cli.command {
        Commands::Classify { image, crop, top } => cmd_classify(&services, &image, &crop, top).await?,
        Commands::Advise {
            disease,
            crop,
            language,
            confidence,
        } => cmd_advise(&services, &disease, &crop, &language, confidence).await?,
        Commands::Knowledge { crop } => cmd_knowledge(&services, crop.as_deref()),
        Commands::Health => {
            println!("{}", serde_json::to_string_pretty(&services.health())?);
        }
    }

    Ok(())
}

async fn cmd_classify(services: &AdvisoryServices, image: &Path, crop: &str, top: usize) -> Result<()> {
    let crop: CropCategory = crop.parse()?;
    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    info!("Classifying {} as {}", image.display(), crop);

    let classifier = services.orchestrator.classifier();
    let prediction = tokio::task::block_in_place(|| classifier.predict(&bytes, crop))?;

    println!(
        "{} {} ({:.2}%)",
        "Detected:".green().bold(),
        prediction.label.bold(),
        prediction.confidence
    );
    for entry in prediction.top_k(top) {
        println!("  {:<32} {:>6.2}%", entry.label, entry.probability);
    }
    println!(
        "{}",
        format!(
            "Device: {}  Inference: {:.1} ms",
            prediction.device, prediction.inference_time_ms
        )
        .dimmed()
    );
    Ok(())
}

async fn cmd_advise(
    services: &AdvisoryServices,
    disease: &str,
    crop: &str,
    language: &str,
    confidence: f64,
) -> Result<()> {
    let crop: CropCategory = crop.parse()?;
    let orchestrator = &services.orchestrator;
    let knowledge = orchestrator.knowledge();

    let entry = knowledge.lookup(disease);
    if entry.is_none() {
        println!("{} no knowledge entry for '{}'", "Note:".yellow(), disease);
    }
    let disease_name = knowledge.display_name(disease);
    let context = knowledge.format_for_generation(disease);

    let outcome = orchestrator
        .synthesizer()
        .synthesize(AdviceRequest {
            label: disease,
            disease_name: &disease_name,
            crop: crop.as_str(),
            knowledge_context: &context,
            confidence,
            entry,
            language,
        })
        .await;

    if outcome.degraded {
        println!("{}", "Generation unavailable, showing knowledge base advice".yellow());
    }
    print_advice(&disease_name, &outcome.payload);
    Ok(())
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}", title.cyan().bold());
    for item in items {
        println!("  - {}", item);
    }
}

fn print_advice(disease_name: &str, advice: &AdvicePayload) {
    println!();
    println!("{} {}", disease_name.green().bold(), format!("[urgency: {}]", advice.urgency).yellow());
    println!("{}", advice.summary);
    println!();
    print_list("Immediate actions", &advice.immediate_actions);
    print_list("Chemical treatment", &advice.treatment_plan.chemical);
    print_list("Organic treatment", &advice.treatment_plan.organic);
    print_list("Prevention", &advice.prevention_tips);
    println!("{} {}", "Timeline:".cyan().bold(), advice.timeline);
    println!("{} {}", "Cost:".cyan().bold(), advice.cost_estimate);
}

fn cmd_knowledge(services: &AdvisoryServices, crop: Option<&str>) {
    let knowledge = services.orchestrator.knowledge();
    if knowledge.is_empty() {
        println!("{}", "Knowledge base is empty or missing".yellow());
        return;
    }

    match crop {
        Some(crop) => {
            let entries = knowledge.diseases_by_crop(crop);
            println!("{} {} diseases for {}", "Knowledge:".green().bold(), entries.len(), crop);
            for (label, entry) in entries {
                println!("  {:<32} {}", label, entry.disease_name);
            }
        }
        None => {
            let names = knowledge.disease_names();
            println!("{} {} diseases", "Knowledge:".green().bold(), names.len());
            for label in names {
                println!("  {:<32} {}", label, knowledge.display_name(&label));
            }
        }
    }
}
