use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref STORE_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "gateway_store_requests_total",
            "Total calls made to the time-series store"
        ),
        &["operation"]
    )
    .expect("valid metric definition");
    pub static ref STORE_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "gateway_store_failures_total",
            "Total store calls that failed or timed out"
        ),
        &["operation"]
    )
    .expect("valid metric definition");
    pub static ref STORE_LATENCY_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "gateway_store_latency_seconds",
            "Time spent waiting on the time-series store"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0
        ]),
        &["operation"]
    )
    .expect("valid metric definition");
    pub static ref READINGS_WRITTEN_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_readings_written_total",
        "Total readings written, including updates"
    ))
    .expect("valid metric definition");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(STORE_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(READINGS_WRITTEN_TOTAL.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
