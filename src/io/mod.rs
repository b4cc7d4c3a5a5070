pub mod input;
pub mod output;

pub use input::{parse_transcript_file, parse_transcript_text};
pub use output::{write_outputs, SummaryDocument, WrittenPaths};
