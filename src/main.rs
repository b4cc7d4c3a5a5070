use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use notetaker::llm::client::{
    GENERAL_NER_MODEL, INTENT_MODEL, MEDICAL_NER_MODEL, QA_MODEL, SENTIMENT_MODEL,
};
use notetaker::llm::{GenerativeModel, HfIntent, HfNer, HfQa, HfSentiment};
use notetaker::models::Speaker;
use notetaker::{
    parse_transcript_file, run_pipeline, write_outputs, AggregatorConfig, Collaborators,
    GeminiClient, GeminiConfig, HfClient, HfConfig, PipelineConfig, ServiceError,
};

#[derive(Parser)]
#[command(name = "notetaker")]
#[command(author, version, about = "Clinical dialogue summarization pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a physician-patient transcript into structured outputs
    Process {
        /// Input transcript file (speaker-prefixed text)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the JSON output artifacts
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Aggregator configuration file (JSON: thresholds, synonyms)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the default acceptance threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// Override the multi-model agreement bonus
        #[arg(long)]
        agreement_bonus: Option<f64>,

        /// Maximum concurrent collaborator calls
        #[arg(long, default_value = "4")]
        max_concurrency: usize,

        /// Overall deadline in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Skip SOAP note synthesis (structured outputs only)
        #[arg(long)]
        skip_soap: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Analyze a transcript without calling any models
    Analyze {
        /// Input transcript file (speaker-prefixed text)
        #[arg(short, long)]
        input: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output_dir,
            config,
            threshold,
            agreement_bonus,
            max_concurrency,
            timeout_secs,
            skip_soap,
            verbose,
        } => {
            setup_logging(verbose);
            process_transcript(
                input,
                output_dir,
                config,
                threshold,
                agreement_bonus,
                max_concurrency,
                timeout_secs,
                skip_soap,
            )
            .await
        }
        Commands::Analyze { input, verbose } => {
            setup_logging(verbose);
            analyze_transcript(input)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Stand-in generative collaborator for --skip-soap runs. The pipeline
/// never calls it when synthesis is skipped.
struct DisabledGenerative;

#[async_trait]
impl GenerativeModel for DisabledGenerative {
    async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Malformed(
            "generative model disabled".to_string(),
        ))
    }
}

fn build_collaborators(skip_soap: bool) -> Result<Collaborators> {
    let hf = Arc::new(HfClient::new(HfConfig::from_env()?));

    let generative: Arc<dyn GenerativeModel> = if skip_soap {
        Arc::new(DisabledGenerative)
    } else {
        Arc::new(GeminiClient::new(GeminiConfig::from_env()?))
    };

    Ok(Collaborators {
        medical_ner: Arc::new(HfNer::new(hf.clone(), MEDICAL_NER_MODEL)),
        general_ner: Arc::new(HfNer::new(hf.clone(), GENERAL_NER_MODEL)),
        qa: Arc::new(HfQa::new(hf.clone(), QA_MODEL)),
        sentiment: Arc::new(HfSentiment::new(hf.clone(), SENTIMENT_MODEL)),
        intent: Arc::new(HfIntent::new(hf, INTENT_MODEL)),
        generative,
    })
}

async fn process_transcript(
    input: PathBuf,
    output_dir: PathBuf,
    config_path: Option<PathBuf>,
    threshold: Option<f64>,
    agreement_bonus: Option<f64>,
    max_concurrency: usize,
    timeout_secs: Option<u64>,
    skip_soap: bool,
) -> Result<()> {
    info!("Loading transcript from {:?}", input);
    let transcript_text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read transcript: {:?}", input))?;

    let mut aggregator = match &config_path {
        Some(path) => AggregatorConfig::from_file(path)
            .with_context(|| format!("Failed to load aggregator config: {:?}", path))?,
        None => AggregatorConfig::default(),
    };
    if let Some(threshold) = threshold {
        aggregator.default_threshold = threshold;
    }
    if let Some(bonus) = agreement_bonus {
        aggregator.agreement_bonus = bonus;
    }

    let mut config = PipelineConfig {
        aggregator,
        skip_soap,
        timeout: timeout_secs.map(Duration::from_secs),
        ..Default::default()
    };
    config.extract.max_concurrency = max_concurrency;
    config.sentiment.max_concurrency = max_concurrency;

    let collaborators = build_collaborators(skip_soap)?;

    let output = run_pipeline(&transcript_text, &collaborators, &config).await?;

    info!(
        "Record: {} symptom(s), {} treatment(s), diagnosis {:?}",
        output.record.symptoms.len(),
        output.record.treatment.len(),
        output.record.diagnosis
    );
    info!(
        "Patient profile: {} utterance(s), dominant sentiment {:?}, dominant intent {:?}",
        output.profile.utterances.len(),
        output.profile.dominant_sentiment,
        output.profile.dominant_intent
    );
    for warning in &output.warnings {
        tracing::warn!("{}", warning);
    }

    let paths = write_outputs(&output_dir, &output)?;
    info!("Summary written to {:?}", paths.summary);
    info!("Sentiment profile written to {:?}", paths.sentiment);
    match paths.soap {
        Some(path) => info!("SOAP note written to {:?}", path),
        None => info!("No SOAP note produced"),
    }

    Ok(())
}

fn analyze_transcript(input: PathBuf) -> Result<()> {
    info!("Analyzing transcript from {:?}", input);
    let transcript = parse_transcript_file(&input).context("Failed to parse input transcript")?;

    println!("Transcript Analysis");
    println!("==================");
    println!("Total utterances: {}", transcript.len());
    println!();

    println!("Speaker Statistics");
    println!("------------------");
    for speaker in [Speaker::Physician, Speaker::Patient, Speaker::Unknown] {
        let utterances: Vec<_> = transcript
            .utterances
            .iter()
            .filter(|u| u.speaker == speaker)
            .collect();
        if utterances.is_empty() {
            continue;
        }
        let word_count: usize = utterances
            .iter()
            .map(|u| u.text.split_whitespace().count())
            .sum();
        println!(
            "{:?}: {} utterance(s), {} words, avg {:.1} words/utterance",
            speaker,
            utterances.len(),
            word_count,
            word_count as f64 / utterances.len() as f64
        );
    }

    Ok(())
}
