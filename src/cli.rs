use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_TOKENS};
use crate::model::FinishReason;

#[derive(Parser, Debug)]
#[command(
    name = "llm-lab",
    version,
    about = "Sweep LLM sampling parameters and score the responses"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Sweep(SweepArgs),
    Summary(SummaryArgs),
    Score(ScoreArgs),
    Status(StatusArgs),
    Responses(ResponsesArgs),
    Delete(DeleteArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    #[arg(long, default_value = ".cache/llm-lab")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub name: String,

    #[arg(long, conflicts_with = "prompt_file", required_unless_present = "prompt_file")]
    pub prompt: Option<String>,

    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    #[arg(long = "temperature", value_delimiter = ',', required = true)]
    pub temperatures: Vec<f64>,

    #[arg(long = "top-p", value_delimiter = ',', required = true)]
    pub top_ps: Vec<f64>,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    #[arg(long, default_value = ".cache/llm-lab")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub experiment_id: i64,

    #[arg(long, default_value_t = false)]
    pub with_samples: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum FinishReasonArg {
    Stop,
    Length,
    Other,
}

impl From<FinishReasonArg> for FinishReason {
    fn from(value: FinishReasonArg) -> Self {
        match value {
            FinishReasonArg::Stop => FinishReason::Stop,
            FinishReasonArg::Length => FinishReason::Length,
            FinishReasonArg::Other => FinishReason::Other,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub text: Option<String>,

    #[arg(long)]
    pub file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FinishReasonArg::Stop)]
    pub finish_reason: FinishReasonArg,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/llm-lab")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ResponsesArgs {
    #[arg(long, default_value = ".cache/llm-lab")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub experiment_id: i64,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    #[arg(long, default_value = ".cache/llm-lab")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub experiment_id: i64,
}
