use clap::Parser;
use emotion_classifier::LazyClassifier;
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::{Pipeline, PipelineOutput, Progress, ViewSet};
use reddit_client::RedditClient;
use redmood_core::{
    AppConfig, CoreError, ErrorExt, ErrorReporter, FanoutSink, MetricsRecorder, MetricsSink,
    NoopSink, PostRecord, QueryKey, SentimentRow, StatsdConfig, StatsdSink, TimeFilter,
    DEFAULT_ITEM_LIMIT, DEFAULT_SUBREDDIT, MAX_ITEM_LIMIT, MIN_ITEM_LIMIT,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "redmood=info,pipeline=info,reddit_client=info,emotion_classifier=info";

/// Scores the emotions of a subreddit's top posts
#[derive(Parser, Debug)]
#[command(name = "redmood", version)]
struct Args {
    /// Subreddit to analyse, without the r/ prefix
    #[arg(default_value = DEFAULT_SUBREDDIT)]
    subreddit: String,

    /// Ranking window of the top listing: day, week or month
    #[arg(long, short = 't', default_value_t = TimeFilter::Day)]
    time_filter: TimeFilter,

    /// Number of posts to fetch
    #[arg(
        long,
        short = 'l',
        default_value_t = DEFAULT_ITEM_LIMIT,
        value_parser = clap::value_parser!(u32).range(MIN_ITEM_LIMIT as i64..=MAX_ITEM_LIMIT as i64)
    )]
    limit: u32,

    /// TOML configuration file; environment variables override it
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Include the aggregated view data in the output
    #[arg(long)]
    views: bool,

    /// Print a summary of emitted metrics to stderr
    #[arg(long)]
    metrics: bool,

    /// Hide the progress bar
    #[arg(long, short = 'q')]
    quiet: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    query: &'a QueryKey,
    posts: &'a [PostRecord],
    sentiments: &'a [SentimentRow],
    #[serde(skip_serializing_if = "Option::is_none")]
    views: Option<ViewSet>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ErrorReporter::new().report_error(&e);
            eprintln!("{}", e.user_friendly_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CoreError> {
    let config = AppConfig::load(args.config.as_deref())?;

    let recorder = Arc::new(MetricsRecorder::new());
    let mut sink = FanoutSink::default().with(statsd_sink(&config.statsd));
    if args.metrics {
        sink = sink.with(recorder.clone());
    }

    let pipeline = Pipeline::new(
        Arc::new(RedditClient::new(config.reddit.clone())?),
        Arc::new(LazyClassifier::new(config.classifier.clone())),
        Arc::new(sink),
    );

    info!(
        "Analysing r/{} (top of the {}, {} posts)",
        args.subreddit, args.time_filter, args.limit
    );
    let bar = progress_bar(args.quiet);
    let observer = |progress: Progress| {
        bar.set_length(progress.total as u64);
        bar.set_position(progress.processed as u64);
    };
    let output = pipeline
        .run(&args.subreddit, args.time_filter, args.limit, &observer)
        .await;
    bar.finish_and_clear();

    print_report(&output?, args.views)?;

    if args.metrics {
        eprintln!("{}", recorder.export_metrics()?);
    }
    Ok(())
}

fn statsd_sink(config: &StatsdConfig) -> Arc<dyn MetricsSink> {
    if !config.enabled {
        info!("statsd metrics disabled");
        return Arc::new(NoopSink);
    }

    match StatsdSink::from_config(config) {
        Ok(sink) => {
            info!("Sending metrics to {}", sink.target());
            Arc::new(sink)
        }
        Err(e) => {
            e.log_warn();
            warn!("Continuing without statsd metrics");
            Arc::new(NoopSink)
        }
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} scored")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}

fn print_report(output: &PipelineOutput, with_views: bool) -> Result<(), CoreError> {
    let views = if with_views {
        Some(output.views()?)
    } else {
        None
    };

    let report = Report {
        query: output.posts.query(),
        posts: output.posts.rows(),
        sentiments: output.sentiments.rows(),
        views,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
