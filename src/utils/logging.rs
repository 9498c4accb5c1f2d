use std::fs;
use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

use crate::config::Config;
use crate::utils::timing::TIMING_TARGET;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Keeps the background writers alive; logs stop flushing once this is dropped.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    General,
    Timing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Text,
    Json,
}

/// Daily-rolling files under `LOG_DIR`.
const LOG_FILES: &[(&str, Stream, Encoding)] = &[
    ("studio.log", Stream::General, Encoding::Text),
    ("studio.jsonl", Stream::General, Encoding::Json),
    ("timing.log", Stream::Timing, Encoding::Text),
    ("timing.jsonl", Stream::Timing, Encoding::Json),
];

fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn stream_targets(stream: Stream, level: LevelFilter) -> Targets {
    match stream {
        Stream::General => Targets::new()
            .with_default(level)
            .with_target(TIMING_TARGET, LevelFilter::OFF)
            .with_target("hyper", LevelFilter::WARN)
            .with_target("hyper_util", LevelFilter::WARN)
            .with_target("reqwest", LevelFilter::WARN),
        Stream::Timing => Targets::new()
            .with_default(LevelFilter::OFF)
            .with_target(TIMING_TARGET, LevelFilter::INFO),
    }
}

/// Console output never goes below WARN; everything else lives in the files.
fn console_targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_target(TIMING_TARGET, LevelFilter::OFF)
}

fn file_layer<S>(
    dir: &Path,
    name: &str,
    encoding: Encoding,
    targets: Targets,
) -> (BoxedLayer<S>, WorkerGuard)
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
    let layer = match encoding {
        Encoding::Text => fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(targets)
            .boxed(),
        Encoding::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(targets)
            .boxed(),
    };
    (layer, guard)
}

/// Console output goes to stderr so stdout stays free for command results.
pub fn init_logging(config: &Config) -> LoggingGuards {
    let logs_dir = config.log_dir.as_path();
    if let Err(err) = fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create logs directory {}: {err}", logs_dir.display());
    }

    let level = parse_log_level(&config.log_level);
    let mut layers: Vec<BoxedLayer<Registry>> = Vec::with_capacity(LOG_FILES.len() + 1);
    let mut guards = Vec::with_capacity(LOG_FILES.len());
    for &(name, stream, encoding) in LOG_FILES {
        let (layer, guard) = file_layer(logs_dir, name, encoding, stream_targets(stream, level));
        layers.push(layer);
        guards.push(guard);
    }
    layers.push(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(console_targets(level))
            .boxed(),
    );

    tracing_subscriber::registry().with(layers).init();
    LoggingGuards { _guards: guards }
}
