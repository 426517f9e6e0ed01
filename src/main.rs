mod config;
mod output;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use lx_logs::{
    AlertEngine, ContextWindow, EntryPool, ExcludeFilter, FilterChain, GrokParser, KeywordFilter,
    LevelFilter, LogLevel, MatchMode, Pipeline, RateDetector, RegexFilter, RingBuffer,
};
use lx_source::{ContainerSource, ExecSource, FileSource, Source, StdinSource};

use config::{
    AlertConfig, Config, DEFAULT_BUFFER_SIZE, DEFAULT_RATE_WINDOW_SECS, DEFAULT_SPIKE_THRESHOLD,
};
use output::{FileSink, JsonSink, OutputFormat, TerminalSink};

/// lx - Real-time log monitoring for commands, files, pipes and containers
///
/// Examples:
///   lx -k ERROR -- ./server --port 8080
///   tail -f app.log | lx -l warn,error
///   lx -f app.log --follow -r "timeout after \d+ms" -B 2 -A 1
#[derive(Parser, Debug)]
#[command(name = "lx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Keep lines containing this text (repeatable)
    #[arg(short = 'k', long = "keyword", value_name = "TEXT")]
    keywords: Vec<String>,

    /// Keep lines matching this regex
    #[arg(short = 'r', long)]
    regex: Option<String>,

    /// Match --regex case-insensitively
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Keep lines at these levels (comma separated)
    #[arg(short = 'l', long = "level", value_delimiter = ',', value_name = "LEVELS")]
    levels: Vec<String>,

    /// Keep lines at this level or more severe
    #[arg(long, value_name = "LEVEL")]
    min_level: Option<String>,

    /// Drop lines containing this text (repeatable)
    #[arg(short = 'e', long = "exclude", value_name = "TEXT")]
    excludes: Vec<String>,

    /// How keyword, regex and level filters combine: and, or
    #[arg(long, default_value = "or", value_parser = parse_match_mode)]
    match_mode: MatchMode,

    /// Lines of context before each match
    #[arg(short = 'B', long, default_value_t = 0)]
    before: usize,

    /// Lines of context after each match
    #[arg(short = 'A', long, default_value_t = 0)]
    after: usize,

    /// Read from a file instead of running a command
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Keep reading new lines (file and container input)
    #[arg(long)]
    follow: bool,

    /// Read a container's logs
    #[arg(long, value_name = "ID")]
    container: Option<String>,

    /// Container runtime binary (default: docker)
    #[arg(long)]
    runtime: Option<String>,

    /// Also write matched lines to this file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Colorize output by log level
    #[arg(long)]
    color: bool,

    /// Print summary statistics on exit
    #[arg(long)]
    stats: bool,

    /// Ring buffer capacity (entries)
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Extract fields with a grok pattern, e.g. "%{IP:client} %{WORD:method}"
    #[arg(long)]
    grok: Option<String>,

    /// Extract fields from JSON log lines
    #[arg(long)]
    json_fields: bool,

    /// Alert rule as name=regex or a bare regex (repeatable)
    #[arg(long = "alert", value_name = "RULE")]
    alerts: Vec<String>,

    /// Warn when the line rate exceeds this multiple of its average
    #[arg(long)]
    spike_threshold: Option<f64>,

    /// Rate averaging window in seconds
    #[arg(long, value_name = "SECS")]
    rate_window: Option<u64>,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command to run and monitor
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn parse_match_mode(s: &str) -> std::result::Result<MatchMode, String> {
    MatchMode::parse(s).ok_or_else(|| format!("invalid match mode {s:?} (use 'and' or 'or')"))
}

/// How long exit waits on blocking reads still in flight (stdin)
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let args = Args::parse();

    // Diagnostics go to stderr, stdout carries the log lines
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = block_on_and_shutdown(run(args));

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// Drive `future` on a fresh runtime, then shut it down without waiting
/// for a stdin read that may never return
fn block_on_and_shutdown<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let result = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let chain = build_filter(&args)?;
    let pool = EntryPool::new();
    let source = build_source(&args, pool.clone())?;

    let buffer_size = args
        .buffer_size
        .or(config.buffer_size)
        .unwrap_or(DEFAULT_BUFFER_SIZE);
    let format = args.format.or(config.format).unwrap_or_default();
    let color = args.color || config.color.unwrap_or(false);
    let json_fields = args.json_fields || config.json_fields.unwrap_or(false);

    let mut builder = Pipeline::builder()
        .source(source)
        .ring_buffer(RingBuffer::new(buffer_size))
        .pool(pool)
        .json_fields(json_fields)
        .show_stats(args.stats);

    builder = if args.before > 0 || args.after > 0 {
        builder.context(ContextWindow::new(chain, args.before, args.after))
    } else {
        builder.filter(chain)
    };

    if let Some(pattern) = args.grok.as_ref().or(config.grok.as_ref()) {
        let grok = GrokParser::new(pattern).context("compiling grok pattern")?;
        builder = builder.grok(grok);
    }

    let alerts = build_alerts(&args.alerts, &config.alerts)?;
    if !alerts.is_empty() {
        builder = builder.alerts(Arc::new(alerts));
    }

    if let Some(threshold) = args.spike_threshold.or(config.spike_threshold) {
        let window = args
            .rate_window
            .or(config.rate_window_secs)
            .unwrap_or(DEFAULT_RATE_WINDOW_SECS);
        let threshold = if threshold > 0.0 {
            threshold
        } else {
            DEFAULT_SPIKE_THRESHOLD
        };
        builder = builder.rate_detector(Arc::new(RateDetector::new(
            Duration::from_secs(window),
            threshold,
        )));
    }

    builder = match format {
        OutputFormat::Text => builder.sink(TerminalSink::stdout(color)),
        OutputFormat::Json => builder.sink(JsonSink::stdout()),
    };
    if let Some(path) = &args.output {
        let sink = FileSink::open(path, format)
            .with_context(|| format!("opening output file {}", path.display()))?;
        builder = builder.sink(sink);
    }

    let mut pipeline = builder.build()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    pipeline.run(cancel).await?;
    Ok(())
}

/// Positive criteria combine by match mode; excludes always apply on top
fn build_filter(args: &Args) -> Result<FilterChain> {
    let mut positive = FilterChain::new(args.match_mode);

    for keyword in &args.keywords {
        positive.push(KeywordFilter::new(keyword));
    }

    if let Some(pattern) = &args.regex {
        let filter = if args.ignore_case {
            RegexFilter::new_case_insensitive(pattern)
        } else {
            RegexFilter::new(pattern)
        };
        positive.push(filter.context("invalid --regex")?);
    }

    if !args.levels.is_empty() {
        let levels = args
            .levels
            .iter()
            .map(|level| parse_level(level))
            .collect::<Result<Vec<_>>>()?;
        positive.push(LevelFilter::new(levels));
    }

    if let Some(min) = &args.min_level {
        positive.push(LevelFilter::at_least(parse_level(min)?));
    }

    if positive.is_empty() && args.excludes.is_empty() {
        bail!(
            "at least one filter flag is required: --keyword, --regex, --level, --min-level or --exclude"
        );
    }

    let mut chain = FilterChain::new(MatchMode::All);
    if !positive.is_empty() {
        chain.push(positive);
    }
    if !args.excludes.is_empty() {
        chain.push(ExcludeFilter::new(args.excludes.iter().cloned()));
    }
    Ok(chain)
}

fn parse_level(s: &str) -> Result<LogLevel> {
    match LogLevel::parse(s) {
        LogLevel::Unknown => {
            bail!("unknown log level: {s:?} (valid: DEBUG, INFO, WARN, ERROR, FATAL)")
        }
        level => Ok(level),
    }
}

fn build_source(args: &Args, pool: EntryPool) -> Result<Box<dyn Source>> {
    let inputs = [
        args.file.is_some(),
        args.container.is_some(),
        !args.command.is_empty(),
    ];
    if inputs.iter().filter(|&&set| set).count() > 1 {
        bail!("choose one input: --file, --container or a command after --");
    }

    if let Some(path) = &args.file {
        return Ok(Box::new(FileSource::new(path, args.follow).with_pool(pool)));
    }

    if let Some(id) = &args.container {
        let mut source = ContainerSource::new(id, args.follow);
        if let Some(runtime) = &args.runtime {
            source = source.with_runtime(runtime);
        }
        return Ok(Box::new(source.with_pool(pool)));
    }

    if let Some((command, rest)) = args.command.split_first() {
        return Ok(Box::new(
            ExecSource::new(command, rest.to_vec()).with_pool(pool),
        ));
    }

    if std::io::stdin().is_terminal() {
        bail!(
            "no command provided and stdin is not a pipe\nUsage: lx [flags] -- <command> [args...]\n   or: <command> | lx [flags]"
        );
    }
    Ok(Box::new(StdinSource::new().with_pool(pool)))
}

/// Flag rules (`name=regex` or a bare regex) followed by config rules
fn build_alerts(flags: &[String], configured: &[AlertConfig]) -> Result<AlertEngine> {
    let mut rules: Vec<(&str, &str)> = flags.iter().map(|rule| split_alert(rule)).collect();
    rules.extend(
        configured
            .iter()
            .map(|rule| (rule.name.as_str(), rule.pattern.as_str())),
    );
    Ok(AlertEngine::from_rules(rules)?)
}

/// `name=regex` when the part before `=` is a plain identifier
fn split_alert(rule: &str) -> (&str, &str) {
    match rule.split_once('=') {
        Some((name, pattern))
            if !name.is_empty()
                && !pattern.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') =>
        {
            (name, pattern)
        }
        _ => (rule, rule),
    }
}
