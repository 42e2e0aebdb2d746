use std::{
    io,
    sync::{Arc, Mutex, Weak},
};

use opentelemetry::{metrics::Meter, KeyValue};
use opentelemetry_sdk::{
    metrics::{
        data::{Histogram, ResourceMetrics, Sum},
        reader::MetricReader,
        InstrumentKind, ManualReader, MetricResult, Pipeline, SdkMeterProvider, Temporality,
    },
    Resource,
};
use tracing_subscriber::fmt::MakeWriter;

use crate::{
    metrics::GraphqlMetrics,
    query_log::{QueryLogEntry, QueryLogError, QueryLogSink},
};

#[derive(Debug, Clone)]
struct SharedReader(Arc<ManualReader>);

impl MetricReader for SharedReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.0.register_pipeline(pipeline)
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> MetricResult<()> {
        self.0.collect(rm)
    }

    fn force_flush(&self) -> MetricResult<()> {
        self.0.force_flush()
    }

    fn shutdown(&self) -> MetricResult<()> {
        self.0.shutdown()
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.0.temporality(kind)
    }
}

#[derive(Debug, PartialEq)]
enum PointValue {
    Counter(u64),
    Histogram { count: u64, sum: Option<u64> },
}

#[derive(Debug)]
struct Point {
    name: String,
    attributes: Vec<(String, String)>,
    value: PointValue,
}

impl Point {
    fn new(name: &str, attributes: &[KeyValue], value: PointValue) -> Self {
        let mut attributes = attributes
            .iter()
            .map(|kv| (kv.key.as_str().to_string(), kv.value.as_str().into_owned()))
            .collect::<Vec<_>>();
        attributes.sort();

        Self {
            name: name.to_string(),
            attributes,
            value,
        }
    }

    fn matches(&self, name: &str, filters: &[(&str, &str)]) -> bool {
        self.name == name
            && filters
                .iter()
                .all(|(key, value)| self.attributes.iter().any(|(k, v)| k == key && v == value))
    }
}

/// A meter provider whose recordings can be read back synchronously.
pub struct TestMeter {
    reader: SharedReader,
    provider: SdkMeterProvider,
}

impl Default for TestMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl TestMeter {
    pub fn new() -> Self {
        let reader = SharedReader(Arc::new(ManualReader::builder().build()));
        let provider = SdkMeterProvider::builder().with_reader(reader.clone()).build();

        Self { reader, provider }
    }

    pub fn meter(&self) -> Meter {
        crate::metrics::meter(&self.provider)
    }

    pub fn metrics(&self) -> GraphqlMetrics {
        GraphqlMetrics::build(&self.meter())
    }

    fn points(&self) -> Vec<Point> {
        let mut resource_metrics = ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: Vec::new(),
        };
        self.reader.collect(&mut resource_metrics).unwrap();

        let mut points = Vec::new();

        for metric in resource_metrics.scope_metrics.iter().flat_map(|scope| &scope.metrics) {
            let data = metric.data.as_any();

            if let Some(sum) = data.downcast_ref::<Sum<u64>>() {
                points.extend(
                    sum.data_points
                        .iter()
                        .map(|point| Point::new(&metric.name, &point.attributes, PointValue::Counter(point.value))),
                );
            } else if let Some(histogram) = data.downcast_ref::<Histogram<u64>>() {
                points.extend(histogram.data_points.iter().map(|point| {
                    let value = PointValue::Histogram {
                        count: point.count,
                        sum: Some(point.sum),
                    };
                    Point::new(&metric.name, &point.attributes, value)
                }));
            } else if let Some(histogram) = data.downcast_ref::<Histogram<f64>>() {
                // durations are not deterministic, only their count is
                points.extend(histogram.data_points.iter().map(|point| {
                    let value = PointValue::Histogram {
                        count: point.count,
                        sum: None,
                    };
                    Point::new(&metric.name, &point.attributes, value)
                }));
            }
        }

        points
    }

    /// Sum of the counter over all series matching `filters`.
    pub fn counter(&self, name: &str, filters: &[(&str, &str)]) -> u64 {
        self.points()
            .iter()
            .filter(|point| point.matches(name, filters))
            .map(|point| match point.value {
                PointValue::Counter(value) => value,
                PointValue::Histogram { .. } => 0,
            })
            .sum()
    }

    /// Number of observations over all histogram series matching `filters`.
    pub fn histogram_count(&self, name: &str, filters: &[(&str, &str)]) -> u64 {
        self.points()
            .iter()
            .filter(|point| point.matches(name, filters))
            .map(|point| match point.value {
                PointValue::Histogram { count, .. } => count,
                PointValue::Counter(_) => 0,
            })
            .sum()
    }

    /// Sum of the observed values, for integer histograms.
    pub fn histogram_sum(&self, name: &str, filters: &[(&str, &str)]) -> u64 {
        self.points()
            .iter()
            .filter(|point| point.matches(name, filters))
            .map(|point| match point.value {
                PointValue::Histogram { sum, .. } => sum.unwrap_or_default(),
                PointValue::Counter(_) => 0,
            })
            .sum()
    }

    /// Nothing was recorded on any series.
    pub fn is_empty(&self) -> bool {
        self.render().is_empty()
    }

    /// One sorted line per series with at least one recording.
    pub fn render(&self) -> String {
        let mut lines = self
            .points()
            .into_iter()
            .filter(|point| match point.value {
                PointValue::Counter(value) => value > 0,
                PointValue::Histogram { count, .. } => count > 0,
            })
            .map(|point| {
                let attributes = point
                    .attributes
                    .iter()
                    .map(|(key, value)| format!("{key}=\"{value}\""))
                    .collect::<Vec<_>>()
                    .join(",");

                let value = match point.value {
                    PointValue::Counter(value) => value.to_string(),
                    PointValue::Histogram { count, sum: Some(sum) } => format!("count={count} sum={sum}"),
                    PointValue::Histogram { count, sum: None } => format!("count={count}"),
                };

                format!("{}{{{attributes}}} {value}", point.name)
            })
            .collect::<Vec<_>>();

        lines.sort();
        lines.join("\n")
    }
}

/// Keeps every entry it receives, serialized.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<serde_json::Value>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<serde_json::Value> {
        self.entries.lock().unwrap().clone()
    }
}

impl QueryLogSink for RecordingSink {
    fn emit(&self, entry: &QueryLogEntry<'_>) -> Result<(), QueryLogError> {
        let entry = serde_json::to_value(entry)?;
        self.entries.lock().unwrap().push(entry);

        Ok(())
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a subscriber collecting every event down to debug level, returns the output.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> String {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .finish();

    tracing::subscriber::with_default(subscriber, f);

    let output = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&output).into_owned()
}
