use crate::config::StatsdConfig;
use crate::error::{ConfigError, CoreError};
use cadence::prelude::*;
use cadence::{StatsdClient, UdpMetricSink};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::UdpSocket;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Counter bumped once per fetch that reaches the content source.
pub const REQUEST_COUNTER: &str = "reddit_api.request";
/// Counter bumped once per post received from the content source.
pub const POST_COUNTER: &str = "reddit_api.post";
/// Timer covering one whole sentiment aggregation.
pub const SENTIMENT_TIMER: &str = "sentiment_analysis.run_time";

/// Fire-and-forget metric delivery. Implementations must never fail the
/// caller; delivery problems are theirs to swallow.
pub trait MetricsSink: Send + Sync {
    fn incr(&self, key: &str);
    fn timing(&self, key: &str, elapsed: Duration);
}

/// Records the time between its creation and drop into `key`.
pub struct TimerScope<'a> {
    sink: &'a dyn MetricsSink,
    key: &'static str,
    started: Instant,
}

impl<'a> TimerScope<'a> {
    pub fn start(sink: &'a dyn MetricsSink, key: &'static str) -> Self {
        Self {
            sink,
            key,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for TimerScope<'_> {
    fn drop(&mut self) {
        self.sink.timing(self.key, self.started.elapsed());
    }
}

/// statsd over UDP.
pub struct StatsdSink {
    client: StatsdClient,
    target: String,
}

impl StatsdSink {
    pub fn new(host: &str, port: u16, prefix: Option<&str>) -> Result<Self, CoreError> {
        let target = format!("{}:{}", host, port);
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;

        let sink = UdpMetricSink::from((host, port), socket).map_err(|e| {
            ConfigError::InvalidValue {
                field: "statsd".to_string(),
                value: format!("{} ({})", target, e),
            }
        })?;
        let client = StatsdClient::from_sink(prefix.unwrap_or(""), sink);

        info!("Sending metrics to statsd at {}", target);
        Ok(Self { client, target })
    }

    pub fn from_config(config: &StatsdConfig) -> Result<Self, CoreError> {
        Self::new(&config.host, config.port, config.prefix.as_deref())
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Debug for StatsdSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdSink")
            .field("target", &self.target)
            .finish()
    }
}

impl MetricsSink for StatsdSink {
    fn incr(&self, key: &str) {
        if let Err(e) = self.client.incr(key) {
            debug!("Dropped statsd counter {}: {}", key, e);
        }
    }

    fn timing(&self, key: &str, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if let Err(e) = self.client.time(key, millis) {
            debug!("Dropped statsd timer {}: {}", key, e);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn incr(&self, _key: &str) {}

    fn timing(&self, _key: &str, _elapsed: Duration) {}
}

/// Forwards every metric to each of its sinks.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for FanoutSink {
    fn incr(&self, key: &str) {
        for sink in &self.sinks {
            sink.incr(key);
        }
    }

    fn timing(&self, key: &str, elapsed: Duration) {
        for sink in &self.sinks {
            sink.timing(key, elapsed);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerStats {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl TimerStats {
    fn new() -> Self {
        Self {
            count: 0,
            total: Duration::from_millis(0),
            min: Duration::MAX,
            max: Duration::from_millis(0),
        }
    }

    fn update(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::from_millis(0)
        } else {
            Duration::from_nanos((self.total.as_nanos() / self.count as u128) as u64)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub timers: BTreeMap<String, TimerStats>,
}

/// Keeps every metric in memory. Used as the sink in tests and for the
/// end-of-run summary.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    metrics: RwLock<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.snapshot().counters.get(key).copied().unwrap_or(0)
    }

    pub fn timer(&self, key: &str) -> Option<TimerStats> {
        self.snapshot().timers.get(key).cloned()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        match self.metrics.read() {
            Ok(metrics) => metrics.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reset(&self) {
        self.with_metrics(|metrics| *metrics = MetricsSnapshot::default());
    }

    pub fn export_metrics(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    fn with_metrics(&self, update: impl FnOnce(&mut MetricsSnapshot)) {
        match self.metrics.write() {
            Ok(mut metrics) => update(&mut metrics),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }
}

impl MetricsSink for MetricsRecorder {
    fn incr(&self, key: &str) {
        self.with_metrics(|metrics| {
            *metrics.counters.entry(key.to_string()).or_insert(0) += 1;
        });
    }

    fn timing(&self, key: &str, elapsed: Duration) {
        self.with_metrics(|metrics| {
            metrics
                .timers
                .entry(key.to_string())
                .or_insert_with(TimerStats::new)
                .update(elapsed);
        });
    }
}
