use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;


lazy_static! {
    pub static ref TICKS_TOTAL_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("ticks_total", "Evaluator ticks by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref TICK_DURATION_METRIC: HistogramVec = HistogramVec::new(
        HistogramOpts::new("tick_duration_ms", "Histogram of evaluator stage duration in ms")
            .buckets(exponential_buckets(1.0, 2.0, 16).expect("valid buckets")),
        &["stage"]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_DEPTH_METRIC: IntGauge =
        IntGauge::new("queue_depth", "Ticks enqueued but not finished")
            .expect("metric can not be created");

    pub static ref RECONCILED_ENTITIES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("reconciled_entities", "Entities added or removed by commit"),
        &["entity", "action"]
    )
    .expect("metric can not be created");

    pub static ref FLUSHED_SAMPLES_METRIC: IntCounter =
        IntCounter::new("flushed_samples", "Samples handed over to the evaluator")
            .expect("metric can not be created");
}

pub const TICK_COMPLETED: &str = "completed";
pub const TICK_FAILED: &str = "failed";

pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(TICKS_TOTAL_METRIC.clone()))?;
    registry.register(Box::new(TICK_DURATION_METRIC.clone()))?;
    registry.register(Box::new(QUEUE_DEPTH_METRIC.clone()))?;
    registry.register(Box::new(RECONCILED_ENTITIES_METRIC.clone()))?;
    registry.register(Box::new(FLUSHED_SAMPLES_METRIC.clone()))?;
    Ok(())
}

/// Renders every metric of `registry` in the prometheus text exposition format.
pub fn gather_text(registry: &Registry) -> prometheus::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub(crate) fn record_entities(
    entity: &str,
    added: usize,
    removed: usize,
) {
    if added > 0 {
        RECONCILED_ENTITIES_METRIC
            .with_label_values(&[entity, "added"])
            .inc_by(added as u64);
    }
    if removed > 0 {
        RECONCILED_ENTITIES_METRIC
            .with_label_values(&[entity, "removed"])
            .inc_by(removed as u64);
    }
}
