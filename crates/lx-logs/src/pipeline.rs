use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lx_source::{EntryReceiver, Source};
use lx_types::{EntryPool, LogEntry};

use crate::buffer::RingBuffer;
use crate::context::ContextWindow;
use crate::error::{LogError, Result};
use crate::filter::Filter;
use crate::grok::GrokParser;
use crate::monitor::{AlertEngine, RateDetector, Stats};
use crate::parser::{detect_level, extract_json_fields};
use crate::sink::Sink;

/// Lifecycle of a pipeline run. It only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    SourceStarted,
    Streaming,
    Draining,
    Closed,
}

/// Notifications for an interactive consumer
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// An entry that passed filtering
    Entry(Arc<LogEntry>),

    /// Alert rules matched by the preceding entry
    Alert {
        rules: Vec<String>,
        entry: Arc<LogEntry>,
    },

    /// The line rate started spiking
    Spike {
        /// Events in the current second
        latest: u64,
        /// Average events per second over the window
        average: f64,
    },

    /// The pipeline closed
    Done,
}

/// Collects the parts of a [`Pipeline`].
///
/// A source and at least one consumer (a sink or an event channel) are
/// required.
#[derive(Default)]
pub struct PipelineBuilder {
    source: Option<Box<dyn Source>>,
    filter: Option<Box<dyn Filter>>,
    context: Option<ContextWindow>,
    sinks: Vec<Box<dyn Sink>>,
    events: Option<mpsc::Sender<PipelineEvent>>,
    stats: Option<Arc<Stats>>,
    rate: Option<Arc<RateDetector>>,
    alerts: Option<Arc<AlertEngine>>,
    ring: Option<RingBuffer>,
    grok: Option<GrokParser>,
    json_fields: bool,
    pool: Option<EntryPool>,
    show_stats: bool,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Entries not passing the filter are dropped. Ignored when a context
    /// window is set.
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Route entries through a context window instead of the plain filter
    pub fn context(mut self, context: ContextWindow) -> Self {
        self.context = Some(context);
        self
    }

    /// Add a sink. Sinks receive entries in the order they were added.
    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Send entries and notifications over a channel
    pub fn events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Share the stats with the caller
    pub fn stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn rate_detector(mut self, rate: Arc<RateDetector>) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn alerts(mut self, alerts: Arc<AlertEngine>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Keep every entry read, matched or not
    pub fn ring_buffer(mut self, ring: RingBuffer) -> Self {
        self.ring = Some(ring);
        self
    }

    pub fn grok(mut self, grok: GrokParser) -> Self {
        self.grok = Some(grok);
        self
    }

    /// Extract fields from JSON object messages
    pub fn json_fields(mut self, enabled: bool) -> Self {
        self.json_fields = enabled;
        self
    }

    /// Return entries no longer referenced to this pool
    pub fn pool(mut self, pool: EntryPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Print the stats summary to stderr on close
    pub fn show_stats(mut self, show: bool) -> Self {
        self.show_stats = show;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let source = self.source.ok_or(LogError::MissingSource)?;
        if self.sinks.is_empty() && self.events.is_none() {
            return Err(LogError::MissingConsumer);
        }

        Ok(Pipeline {
            source,
            filter: self.filter,
            context: self.context,
            sinks: self.sinks,
            events: self.events,
            stats: self.stats.unwrap_or_default(),
            rate: self.rate,
            alerts: self.alerts,
            ring: self.ring,
            grok: self.grok,
            json_fields: self.json_fields,
            pool: self.pool,
            show_stats: self.show_stats,
            state: PipelineState::Idle,
            spiking: false,
        })
    }
}

/// Source to sinks orchestration.
///
/// For every entry read: count it, normalize the level, extract fields,
/// buffer it, filter it (or route it through the context window), update
/// the monitors and hand the survivors to every consumer.
pub struct Pipeline {
    source: Box<dyn Source>,
    filter: Option<Box<dyn Filter>>,
    context: Option<ContextWindow>,
    sinks: Vec<Box<dyn Sink>>,
    events: Option<mpsc::Sender<PipelineEvent>>,
    stats: Arc<Stats>,
    rate: Option<Arc<RateDetector>>,
    alerts: Option<Arc<AlertEngine>>,
    ring: Option<RingBuffer>,
    grok: Option<GrokParser>,
    json_fields: bool,
    pool: Option<EntryPool>,
    show_stats: bool,
    state: PipelineState,
    spiking: bool,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Run until the source is exhausted or `cancel` fires.
    ///
    /// Sinks are always flushed and closed once streaming started. The
    /// first write, flush or close failure is returned. Cancellation is
    /// not an error. A pipeline runs once; later calls fail with
    /// [`LogError::AlreadyRun`].
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(LogError::AlreadyRun);
        }

        // The source gets its own token so a failing sink can stop it
        // without cancelling the caller
        let source_cancel = cancel.child_token();
        let mut rx = self.source.start(source_cancel.clone())?;
        self.set_state(PipelineState::SourceStarted);

        self.set_state(PipelineState::Streaming);
        let streamed = self.stream(&mut rx, &source_cancel).await;

        self.set_state(PipelineState::Draining);
        source_cancel.cancel();
        drop(rx);
        let drained = self.drain();

        self.set_state(PipelineState::Closed);
        if self.show_stats {
            eprintln!();
            eprintln!("{}", self.stats.summary());
            if let Some(alerts) = self.alerts.as_ref().filter(|a| !a.is_empty()) {
                eprintln!("{}", alerts.summary());
            }
        }
        if let Some(tx) = &self.events {
            emit(tx, PipelineEvent::Done, &cancel).await;
        }

        streamed.and(drained)
    }

    /// Run on a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        let mut pipeline = self;
        tokio::spawn(async move { pipeline.run(cancel).await })
    }

    fn set_state(&mut self, state: PipelineState) {
        debug!(source = %self.source.name(), from = ?self.state, to = ?state, "pipeline state");
        self.state = state;
    }

    async fn stream(&mut self, rx: &mut EntryReceiver, cancel: &CancellationToken) -> Result<()> {
        loop {
            let entry = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                entry = rx.recv() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            if !self.process(entry, cancel).await? {
                debug!("event receiver dropped, stopping");
                break;
            }
        }
        Ok(())
    }

    /// Returns false once the event receiver is gone
    async fn process(&mut self, mut entry: LogEntry, cancel: &CancellationToken) -> Result<bool> {
        self.stats.record_line();

        if self.json_fields {
            extract_json_fields(&mut entry);
        }
        entry.ensure_level(detect_level);
        if let Some(grok) = &self.grok {
            grok.apply(&mut entry);
        }

        let entry = Arc::new(entry);
        if let Some(ring) = &self.ring {
            if let Some(evicted) = ring.push(Arc::clone(&entry)) {
                self.recycle(evicted);
            }
        }

        let emitted = if let Some(window) = &mut self.context {
            window.process(&entry)
        } else if self.filter.as_ref().is_none_or(|f| f.matches(&entry)) {
            vec![entry]
        } else {
            self.recycle(entry);
            return Ok(true);
        };

        for entry in emitted {
            self.stats.record_match(entry.level);

            let alerts = match &self.alerts {
                Some(engine) => engine.check(&entry),
                None => Vec::new(),
            };
            if !alerts.is_empty() {
                info!(rules = ?alerts, seq = entry.seq, "alert triggered");
            }

            let mut spike = None;
            if let Some(rate) = &self.rate {
                let spiking = rate.record();
                if spiking && !self.spiking {
                    let latest = rate.latest_second_rate();
                    let average = rate.current_rate();
                    warn!(latest, average, "line rate spike");
                    spike = Some(PipelineEvent::Spike { latest, average });
                }
                self.spiking = spiking;
            }

            for sink in &mut self.sinks {
                sink.write(&entry).map_err(|source| LogError::Sink {
                    sink: sink.name(),
                    operation: "write",
                    source,
                })?;
            }

            if let Some(tx) = &self.events {
                if !emit(tx, PipelineEvent::Entry(Arc::clone(&entry)), cancel).await {
                    return Ok(false);
                }
                if !alerts.is_empty() {
                    let event = PipelineEvent::Alert {
                        rules: alerts,
                        entry: Arc::clone(&entry),
                    };
                    if !emit(tx, event, cancel).await {
                        return Ok(false);
                    }
                }
                if let Some(event) = spike {
                    if !emit(tx, event, cancel).await {
                        return Ok(false);
                    }
                }
            }

            self.recycle(entry);
        }

        Ok(true)
    }

    /// Flush then close every sink, keeping the first failure
    fn drain(&mut self) -> Result<()> {
        let mut first = None;
        for sink in &mut self.sinks {
            let name = sink.name();
            if let Err(source) = sink.flush() {
                warn!(sink = %name, error = %source, "sink flush failed");
                if first.is_none() {
                    first = Some(LogError::Sink {
                        sink: name.clone(),
                        operation: "flush",
                        source,
                    });
                }
            }
            if let Err(source) = sink.close() {
                warn!(sink = %name, error = %source, "sink close failed");
                if first.is_none() {
                    first = Some(LogError::Sink {
                        sink: name,
                        operation: "close",
                        source,
                    });
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Hand an entry back to the pool once nothing else holds it
    fn recycle(&self, entry: Arc<LogEntry>) {
        if let Some(pool) = &self.pool {
            if let Ok(entry) = Arc::try_unwrap(entry) {
                pool.release(entry);
            }
        }
    }
}

/// Send an event unless cancelled. Returns false when the receiver is gone.
async fn emit(
    tx: &mpsc::Sender<PipelineEvent>,
    event: PipelineEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        sent = tx.send(event) => sent.is_ok(),
    }
}
