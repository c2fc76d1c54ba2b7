use async_trait::async_trait;
use framepipe::core::{
    ConfigBlock, Datum, EdgeError, EdgeReceiver, Payload, PortFlags, PortSet, Process, ProcessIo,
    StepOutcome,
};
use framepipe::engine::{Pipeline, PipelineConfig, PipelineState};
use framepipe::error::{PipelineError, PipelineResult};
use framepipe::processes::DebugSinkProcess;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Emits `count` copies of a JSON value on `out`, then completes.
struct RepeatSource {
    count: usize,
    shared: bool,
    value: Arc<serde_json::Value>,
}

impl RepeatSource {
    fn new(count: usize, shared: bool) -> Self {
        Self {
            count,
            shared,
            value: Arc::new(json!({ "payload": [1, 2, 3] })),
        }
    }
}

#[async_trait]
impl Process for RepeatSource {
    fn type_name(&self) -> &'static str {
        "repeat_source"
    }

    fn make_ports(&self, ports: &mut PortSet) -> PipelineResult<()> {
        let flags = if self.shared {
            PortFlags::optional().shared()
        } else {
            PortFlags::optional()
        };
        ports.declare_output("out", "generic", flags, "")
    }

    async fn configure(&mut self, _config: &ConfigBlock) -> PipelineResult<()> {
        Ok(())
    }

    async fn step(&mut self, io: &mut ProcessIo) -> PipelineResult<StepOutcome> {
        if self.count == 0 {
            return Ok(StepOutcome::Complete);
        }
        self.count -= 1;
        io.push("out", Datum::Value(Payload::Generic(self.value.clone())))
            .await?;
        Ok(StepOutcome::Continue)
    }
}

/// Fails on its first step.
struct FailingProcess;

#[async_trait]
impl Process for FailingProcess {
    fn type_name(&self) -> &'static str {
        "failing"
    }

    fn make_ports(&self, ports: &mut PortSet) -> PipelineResult<()> {
        ports.declare_output("out", "generic", PortFlags::optional(), "")
    }

    async fn configure(&mut self, _config: &ConfigBlock) -> PipelineResult<()> {
        Ok(())
    }

    async fn step(&mut self, io: &mut ProcessIo) -> PipelineResult<StepOutcome> {
        Err(PipelineError::data(io.process_name(), "corrupt frame"))
    }
}

fn generic(datum: &Datum) -> &Arc<serde_json::Value> {
    match datum.payload() {
        Some(Payload::Generic(value)) => value,
        other => panic!("expected generic payload, got {:?}", other),
    }
}

async fn pull_value(rx: &mut EdgeReceiver) -> Datum {
    let datum = rx.pull().await.unwrap();
    assert!(!datum.is_end_of_stream());
    datum
}

#[tokio::test]
async fn test_from_json_assembles_pipeline() {
    let config = json!({
        "pipeline_config": { "channel_capacity": 4 },
        "processes": [
            { "name": "ds", "type": "downsample", "config": { "target_frame_rate": "2" } },
            { "name": "sink", "type": "debug_sink" }
        ],
        "connections": [
            { "from": "ds.timestamp", "to": "sink.input" }
        ]
    });

    let pipeline = Pipeline::from_json(config).await.unwrap();
    assert_eq!(pipeline.config().channel_capacity, 4);
    assert_eq!(pipeline.process_names(), &["ds".to_string(), "sink".to_string()]);
    assert_eq!(pipeline.connections().len(), 1);
    assert_eq!(pipeline.connections()[0].to.to_string(), "sink.input");
    assert_eq!(*pipeline.state(), PipelineState::Idle);
}

#[tokio::test]
async fn test_from_json_default_capacity() {
    let pipeline = Pipeline::from_json(json!({ "processes": [] })).await.unwrap();
    assert_eq!(pipeline.config().channel_capacity, 100);
}

#[tokio::test]
async fn test_from_json_errors() {
    let unknown_type = json!({
        "processes": [ { "name": "x", "type": "nonexistent" } ]
    });
    assert!(matches!(
        Pipeline::from_json(unknown_type).await,
        Err(PipelineError::UnknownProcessType(_))
    ));

    let duplicate = json!({
        "processes": [
            { "name": "x", "type": "debug_sink" },
            { "name": "x", "type": "debug_sink" }
        ]
    });
    assert!(matches!(
        Pipeline::from_json(duplicate).await,
        Err(PipelineError::Configuration { .. })
    ));

    let bad_address = json!({
        "processes": [ { "name": "x", "type": "debug_sink" } ],
        "connections": [ { "from": "x", "to": "x.input" } ]
    });
    assert!(Pipeline::from_json(bad_address).await.is_err());

    let zero_capacity = json!({ "pipeline_config": { "channel_capacity": 0 } });
    assert!(Pipeline::from_json(zero_capacity).await.is_err());
}

#[tokio::test]
async fn test_fan_out_copies_unshared_payloads() {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline
        .add_process_instance("src", Box::new(RepeatSource::new(1, false)), ConfigBlock::new())
        .await
        .unwrap();
    let mut a = pipeline.tap("src", "out").unwrap();
    let mut b = pipeline.tap("src", "out").unwrap();
    pipeline.run().await.unwrap();

    let first = pull_value(&mut a).await;
    let second = pull_value(&mut b).await;
    assert_eq!(generic(&first), generic(&second));
    assert!(!Arc::ptr_eq(generic(&first), generic(&second)));
}

#[tokio::test]
async fn test_fan_out_shares_shared_payloads() {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline
        .add_process_instance("src", Box::new(RepeatSource::new(1, true)), ConfigBlock::new())
        .await
        .unwrap();
    let mut a = pipeline.tap("src", "out").unwrap();
    let mut b = pipeline.tap("src", "out").unwrap();
    pipeline.run().await.unwrap();

    let first = pull_value(&mut a).await;
    let second = pull_value(&mut b).await;
    assert!(Arc::ptr_eq(generic(&first), generic(&second)));
}

#[tokio::test]
async fn test_sink_counts_datums() {
    let sink = DebugSinkProcess::new();
    let counter = sink.counter();

    let mut pipeline = Pipeline::new(PipelineConfig { channel_capacity: 2 }).unwrap();
    pipeline
        .add_process_instance("src", Box::new(RepeatSource::new(10, false)), ConfigBlock::new())
        .await
        .unwrap();
    pipeline
        .add_process_instance("sink", Box::new(sink), ConfigBlock::new())
        .await
        .unwrap();
    pipeline.connect("src.out", "sink.input").unwrap();

    pipeline.run().await.unwrap();

    assert_eq!(counter.load(Ordering::Relaxed), 10);
    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot["src"].datums_pushed, 10);
    assert_eq!(snapshot["sink"].datums_pulled, 11);
    assert!(pipeline.monitor().generate_report().contains("[sink]"));
}

#[tokio::test]
async fn test_failure_cancels_pipeline() {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline
        .add_process_instance("bad", Box::new(FailingProcess), ConfigBlock::new())
        .await
        .unwrap();
    pipeline
        .add_process("sink", "debug_sink", json!({}))
        .await
        .unwrap();
    // the downsample stage waits on an edge nobody feeds; only cancellation ends it
    pipeline
        .add_process("ds", "downsample", json!({}))
        .await
        .unwrap();
    pipeline.connect("bad.out", "sink.input").unwrap();
    let _idle_feed = pipeline.feed("ds", "timestamp").unwrap();

    pipeline.start().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), pipeline.wait())
        .await
        .expect("pipeline did not stop after a failure");

    assert!(matches!(result, Err(PipelineError::RuntimeData { .. })));
    assert!(matches!(pipeline.state(), PipelineState::Error { .. }));
    assert_eq!(pipeline.metrics().snapshot()["bad"].errors_count, 1);
}

#[tokio::test]
async fn test_cancel_stops_blocked_processes() {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline
        .add_process("ds", "downsample", json!({}))
        .await
        .unwrap();
    let _feed = pipeline.feed("ds", "timestamp").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();

    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    tokio::time::timeout(Duration::from_secs(5), pipeline.stop())
        .await
        .expect("cancel did not unblock the pipeline")
        .unwrap();
    assert_eq!(*pipeline.state(), PipelineState::Cancelled);

    // a cancelled process stops without sending end of stream downstream
    assert!(!matches!(ts_out.try_pull(), Some(Ok(_))));
    assert_eq!(ts_out.pull().await, Err(EdgeError::Cancelled));
}

#[tokio::test]
async fn test_wiring_frozen_after_start() {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline
        .add_process_instance("src", Box::new(RepeatSource::new(0, false)), ConfigBlock::new())
        .await
        .unwrap();
    pipeline.start().await.unwrap();

    assert!(pipeline.tap("src", "out").is_err());
    assert!(pipeline
        .add_process("late", "debug_sink", json!({}))
        .await
        .is_err());
    assert!(matches!(
        pipeline.start().await,
        Err(PipelineError::InvalidTransition { .. })
    ));

    pipeline.wait().await.unwrap();
    assert!(matches!(pipeline.state(), PipelineState::Completed { .. }));
}
