use anyhow::Result;
use clap::{Parser, ValueEnum};
use friendrec::{
    CandidateEmitter, ChannelPipeline, ExecutablePipeline, LocalPipeline, ParsePolicy, RecommendationReducer,
    RuntimeConfig, RuntimePipeline,
};
use friendrec::recommend::DEFAULT_MAX_RECOMMENDATIONS;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    /// In-memory grouping in one process
    Local,
    /// Map and reduce worker threads exchanging batches over channels
    Channel,
    /// Spill, external sort and streaming reduce through a scratch directory
    Staged,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnParseError {
    Skip,
    Abort,
}

impl From<OnParseError> for ParsePolicy {
    fn from(v: OnParseError) -> Self {
        match v {
            OnParseError::Skip => ParsePolicy::Skip,
            OnParseError::Abort => ParsePolicy::Abort,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "People-you-may-know recommendations ranked by mutual friends")]
struct Args {
    /// Input file or directory of edge-list files (repeatable)
    #[arg(long, required = true)]
    input: Vec<String>,
    /// Output directory (cleared before writing)
    #[arg(long)]
    output: String,
    #[arg(long, value_enum, default_value_t = Engine::Local)]
    engine: Engine,
    /// Maximum recommendations per user
    #[arg(long, default_value_t = DEFAULT_MAX_RECOMMENDATIONS)]
    top_k: usize,
    #[arg(long, value_enum, default_value_t = OnParseError::Skip)]
    on_parse_error: OnParseError,
    /// Parallel map tasks (defaults to FRIENDREC_LOCAL_TASKS or the CPU count)
    #[arg(long)]
    workers: Option<usize>,
}

fn run<P: ExecutablePipeline>(mut pipeline: P, args: &Args) -> Result<()> {
    for input in &args.input {
        pipeline.add_input(input);
    }
    pipeline.add_output(&args.output);
    let emitter = CandidateEmitter::new(args.on_parse_error.into());
    let reducer = RecommendationReducer::new(args.top_k);
    info!(policy = ?emitter.policy(), top_k = reducer.limit(), "job configured");
    let skipped = emitter.skip_counter();
    pipeline.map_reduce(emitter, reducer)?;
    let skipped = skipped.load(Ordering::Relaxed);
    if skipped > 0 {
        warn!(skipped, "malformed input lines were skipped");
    }
    info!(output = %args.output, "recommend finished");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut config = RuntimeConfig::from_env();
    if let Some(n) = args.workers {
        config = config.with_tasks(n);
    }
    info!(engine = ?args.engine, tasks = config.local_tasks, "recommend starting");

    match args.engine {
        Engine::Local => run(LocalPipeline::new().with_config(config), &args)?,
        Engine::Channel => run(ChannelPipeline::with_config(config), &args)?,
        Engine::Staged => run(RuntimePipeline::with_config(config), &args)?,
    }
    Ok(())
}
