use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;

pub struct Metrics {
    frames_processed: Counter<u64>,
    inference_duration: Histogram<u64>,
    camera_fps: Gauge<f64>,
    inspections: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        // TODO: deprecated crate to be replaced with an OLTP exporter
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .unwrap();

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("defect_inspector");
        global::set_meter_provider(provider);

        let frames_processed = meter
            .u64_counter("frames_processed_total")
            .with_description("Total number of frames read from the camera")
            .build();

        let inference_duration = meter
            .u64_histogram("inference_duration_ms")
            .with_boundaries(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])
            .with_description("Duration of model inference in milliseconds")
            .build();

        let camera_fps = meter
            .f64_gauge("camera_fps")
            .with_description("Frames processed in the last wall-clock second")
            .build();

        let inspections = meter
            .u64_counter("inspections_total")
            .with_description("Counted production units by verdict")
            .build();

        Metrics {
            frames_processed,
            inference_duration,
            camera_fps,
            inspections,
            registry,
        }
    }

    pub fn record_frame(&self) {
        self.frames_processed.add(1, &[]);
    }

    pub fn record_inference_duration(&self, duration_ms: u64) {
        self.inference_duration.record(duration_ms, &[]);
    }

    pub fn record_camera_fps(&self, fps: f64) {
        self.camera_fps.record(fps, &[]);
    }

    pub fn record_inspection(&self, verdict: &str) {
        let attributes = vec![KeyValue::new("verdict", verdict.to_string())];
        self.inspections.add(1, &attributes);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
