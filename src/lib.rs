pub mod error;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stages;

pub use error::{PipelineError, ServiceError};
pub use io::{parse_transcript_file, parse_transcript_text, write_outputs};
pub use llm::{Collaborators, GeminiClient, GeminiConfig, HfClient, HfConfig};
pub use models::{
    MedicalRecord, SentimentIntentProfile, SoapNote, Speaker, Transcript, Utterance,
};
pub use pipeline::{run_pipeline, PipelineConfig, PipelineOutput};
pub use stages::{
    aggregate, classify_sentiment, extract_entities, synthesize_soap, AggregatorConfig,
    ExtractConfig, SentimentConfig, SoapConfig,
};
