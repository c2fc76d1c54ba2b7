use framepipe::core::{
    BoundingBox, Datum, DetectedObject, DetectedObjectSet, EdgeError, EdgeReceiver, EdgeSender,
    ObjectTrackSet, Payload, Timestamp, Track, TrackState,
};
use framepipe::engine::{Pipeline, PipelineConfig, PipelineState};
use framepipe::error::PipelineError;
use serde_json::{json, Value};
use std::sync::Arc;

async fn downsample(config: Value) -> Pipeline {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline.add_process("ds", "downsample", config).await.unwrap();
    pipeline
}

async fn drain(rx: &mut EdgeReceiver) -> Vec<Datum> {
    let mut out = Vec::new();
    loop {
        let datum = rx.pull().await.unwrap();
        if datum.is_end_of_stream() {
            return out;
        }
        out.push(datum);
    }
}

fn frames(datums: &[Datum]) -> Vec<Option<i64>> {
    datums
        .iter()
        .map(|d| d.try_as::<Timestamp>().unwrap().frame)
        .collect()
}

async fn feed_times(tx: &mut EdgeSender, times: &[f64]) {
    for (frame, t) in times.iter().enumerate() {
        tx.push(Datum::new(Timestamp::from_seconds(*t).with_frame(frame as i64)))
            .await
            .unwrap();
    }
    tx.push(Datum::EndOfStream).await.unwrap();
}

fn detections(count: usize) -> DetectedObjectSet {
    DetectedObjectSet::new(
        (0..count)
            .map(|_| DetectedObject::new(BoundingBox::new(0.0, 0.0, 4.0, 4.0), 0.9))
            .collect(),
    )
}

#[tokio::test]
async fn test_halves_two_per_second() {
    let mut pipeline = downsample(json!({ "target_frame_rate": "2.0" })).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    let mut orig_out = pipeline.tap("ds", "original_timestamp").unwrap();
    pipeline.start().await.unwrap();

    feed_times(&mut ts_in, &[0.0, 0.25, 0.5, 0.75, 1.0]).await;

    let kept = drain(&mut ts_out).await;
    assert_eq!(frames(&kept), vec![Some(0), Some(2), Some(4)]);
    let times: Vec<f64> = kept
        .iter()
        .map(|d| d.try_as::<Timestamp>().unwrap().time_seconds().unwrap())
        .collect();
    assert_eq!(times, vec![0.0, 0.5, 1.0]);
    assert_eq!(drain(&mut orig_out).await.len(), 3);

    pipeline.wait().await.unwrap();
    assert!(matches!(pipeline.state(), PipelineState::Completed { .. }));
}

#[tokio::test]
async fn test_end_of_stream_reaches_every_output_once() {
    let mut pipeline = downsample(json!({})).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut data_in = pipeline.feed("ds", "input_1").unwrap();

    let outputs = [
        "timestamp",
        "original_timestamp",
        "rate",
        "output_1",
        "output_2",
        "output_3",
        "output_4",
        "output_5",
    ];
    let mut taps: Vec<EdgeReceiver> = outputs
        .iter()
        .map(|port| pipeline.tap("ds", port).unwrap())
        .collect();
    pipeline.start().await.unwrap();

    ts_in.push(Datum::EndOfStream).await.unwrap();
    data_in.push(Datum::new(json!("ignored"))).await.unwrap();

    for (port, tap) in outputs.iter().zip(taps.iter_mut()) {
        let before_end = drain(tap).await;
        if *port == "rate" {
            assert_eq!(before_end.len(), 1, "rate carries the target rate first");
        } else {
            assert!(before_end.is_empty(), "{} emitted data after end of stream", port);
        }
        assert_eq!(tap.pull().await, Err(EdgeError::Closed), "{}", port);
    }

    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_rate_output_carries_target() {
    let mut pipeline = downsample(json!({ "target_frame_rate": 5.0 })).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut rate_out = pipeline.tap("ds", "rate").unwrap();
    pipeline.start().await.unwrap();

    feed_times(&mut ts_in, &[0.0, 0.1, 0.2]).await;

    let rates = drain(&mut rate_out).await;
    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0].try_as::<f64>(), Some(&5.0));
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_burst_keeps_two_drops_one() {
    let mut pipeline = downsample(json!({
        "target_frame_rate": 10.0,
        "burst_frame_count": 2,
        "burst_frame_break": 1
    }))
    .await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    pipeline.start().await.unwrap();

    let times: Vec<f64> = (0..6).map(|i| f64::from(i) * 0.1).collect();
    feed_times(&mut ts_in, &times).await;

    let kept = drain(&mut ts_out).await;
    assert_eq!(frames(&kept), vec![Some(0), Some(1), Some(3), Some(4)]);
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_time_window() {
    let mut pipeline = downsample(json!({
        "start_time": "00:00:01",
        "duration": "00:00:01"
    }))
    .await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    pipeline.start().await.unwrap();

    feed_times(&mut ts_in, &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0]).await;

    assert_eq!(
        frames(&drain(&mut ts_out).await),
        vec![Some(2), Some(3), Some(4)]
    );
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_duration_alone_starts_at_zero() {
    let mut pipeline = downsample(json!({ "duration": "1.5" })).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    pipeline.start().await.unwrap();

    feed_times(&mut ts_in, &[0.0, 1.0, 2.0]).await;

    assert_eq!(frames(&drain(&mut ts_out).await), vec![Some(0), Some(1)]);
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_missing_time_fails_open() {
    let mut pipeline = downsample(json!({ "target_frame_rate": 1.0 })).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    pipeline.start().await.unwrap();

    for frame in 0..4 {
        ts_in.push(Datum::new(Timestamp::from_frame(frame))).await.unwrap();
    }
    ts_in.push(Datum::EndOfStream).await.unwrap();

    assert_eq!(drain(&mut ts_out).await.len(), 4);
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_time_derived_from_input_rate() {
    let mut pipeline = downsample(json!({ "target_frame_rate": 10.0 })).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut rate_in = pipeline.feed("ds", "rate").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    pipeline.start().await.unwrap();

    for frame in 1..=10 {
        ts_in.push(Datum::new(Timestamp::from_frame(frame))).await.unwrap();
        rate_in.push(Datum::frame_rate(30.0)).await.unwrap();
    }
    ts_in.push(Datum::EndOfStream).await.unwrap();
    rate_in.push(Datum::EndOfStream).await.unwrap();

    let kept = drain(&mut ts_out).await;
    assert_eq!(frames(&kept), vec![Some(1), Some(3), Some(6), Some(9)]);
    assert!(kept
        .iter()
        .all(|d| d.try_as::<Timestamp>().unwrap().has_valid_time()));
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_only_frames_with_detections() {
    let mut pipeline = downsample(json!({ "only_frames_with_dets": true })).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut dets_in = pipeline.feed("ds", "input_1").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    let mut dets_out = pipeline.tap("ds", "output_1").unwrap();
    pipeline.start().await.unwrap();

    for (frame, count) in [2, 0, 1, 0].into_iter().enumerate() {
        ts_in
            .push(Datum::new(Timestamp::from_frame(frame as i64)))
            .await
            .unwrap();
        dets_in.push(Datum::new(detections(count))).await.unwrap();
    }
    ts_in.push(Datum::EndOfStream).await.unwrap();
    dets_in.push(Datum::EndOfStream).await.unwrap();

    assert_eq!(frames(&drain(&mut ts_out).await), vec![Some(0), Some(2)]);
    let sizes: Vec<usize> = drain(&mut dets_out)
        .await
        .iter()
        .map(|d| d.try_as::<DetectedObjectSet>().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![2, 1]);
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_renumber_patches_tracks() {
    let mut pipeline = downsample(json!({
        "renumber_frames": true,
        "only_frames_with_dets": true
    }))
    .await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut dets_in = pipeline.feed("ds", "input_1").unwrap();
    let mut tracks_in = pipeline.feed("ds", "input_2").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    let mut orig_out = pipeline.tap("ds", "original_timestamp").unwrap();
    let mut tracks_out = pipeline.tap("ds", "output_2").unwrap();
    pipeline.start().await.unwrap();

    let states = |frames: &[i64]| frames.iter().map(|f| TrackState::new(*f)).collect::<Vec<_>>();

    for frame in 1..=4 {
        let count = if frame == 4 { 0 } else { 1 };
        let tracks = ObjectTrackSet::new(vec![Track::new(1, states(&[1, 2, 3, 5]))]);
        ts_in
            .push(Datum::new(Timestamp::from_frame(frame)))
            .await
            .unwrap();
        dets_in.push(Datum::new(detections(count))).await.unwrap();
        tracks_in.push(Datum::new(tracks)).await.unwrap();
    }
    ts_in.push(Datum::EndOfStream).await.unwrap();
    dets_in.push(Datum::EndOfStream).await.unwrap();
    tracks_in.push(Datum::EndOfStream).await.unwrap();

    assert_eq!(
        frames(&drain(&mut ts_out).await),
        vec![Some(0), Some(1), Some(2)]
    );
    assert_eq!(
        frames(&drain(&mut orig_out).await),
        vec![Some(1), Some(2), Some(3)]
    );

    let patched = drain(&mut tracks_out).await;
    assert_eq!(patched.len(), 3);
    let last = patched[2].try_as::<ObjectTrackSet>().unwrap();
    assert_eq!(last.tracks[0].frames(), vec![0, 1, 2]);
    let first = patched[0].try_as::<ObjectTrackSet>().unwrap();
    assert_eq!(first.tracks[0].frames(), vec![0]);

    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_payloads_share_instance() {
    let mut pipeline = downsample(json!({})).await;
    let mut data_in = pipeline.feed("ds", "input_3").unwrap();
    let mut data_out = pipeline.tap("ds", "output_3").unwrap();
    pipeline.start().await.unwrap();

    let value = Arc::new(json!({ "id": 42 }));
    data_in
        .push(Datum::Value(Payload::Generic(value.clone())))
        .await
        .unwrap();
    data_in.push(Datum::EndOfStream).await.unwrap();

    let received = drain(&mut data_out).await;
    match received[0].payload() {
        Some(Payload::Generic(out)) => assert!(Arc::ptr_eq(out, &value)),
        other => panic!("unexpected payload {:?}", other),
    }
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn test_wrong_payload_on_timestamp_fails() {
    let mut pipeline = downsample(json!({})).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let _ts_out = pipeline.tap("ds", "timestamp").unwrap();
    pipeline.start().await.unwrap();

    ts_in.push(Datum::frame_rate(3.0)).await.unwrap();

    let err = pipeline.wait().await.unwrap_err();
    assert!(matches!(err, PipelineError::RuntimeData { .. }));
    assert!(matches!(pipeline.state(), PipelineState::Error { .. }));
}

#[tokio::test]
async fn test_bad_configuration_rejected() {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();

    let err = pipeline
        .add_process("ds", "downsample", json!({ "start_time": "1:75:00" }))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration { .. }));

    let err = pipeline
        .add_process("ds", "downsample", json!({ "burst_frame_count": "many" }))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration { .. }));
    assert!(pipeline.process_names().is_empty());
}

#[tokio::test]
async fn test_rate_ports_wire_by_name() {
    let config = json!({
        "processes": [
            { "name": "up", "type": "downsample", "config": { "target_frame_rate": 10.0 } },
            { "name": "ds", "type": "downsample", "config": { "target_frame_rate": 5.0 } }
        ],
        "connections": [
            { "from": "up.rate", "to": "ds.rate" }
        ]
    });
    let mut pipeline = Pipeline::from_json(config).await.unwrap();
    assert!(matches!(
        pipeline.feed("ds", "frame_rate"),
        Err(PipelineError::UnknownPort { .. })
    ));
    assert!(matches!(
        pipeline.feed("ds", "rate"),
        Err(PipelineError::PortAlreadyConnected(_))
    ));

    let mut up_in = pipeline.feed("up", "timestamp").unwrap();
    let mut rate_out = pipeline.tap("ds", "rate").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    pipeline.start().await.unwrap();

    feed_times(&mut up_in, &[0.0, 0.1]).await;

    let rates = drain(&mut rate_out).await;
    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0].try_as::<f64>(), Some(&5.0));

    // the single upstream rate datum gives ds one cycle with a derived time
    let kept = drain(&mut ts_out).await;
    assert_eq!(kept.len(), 1);
    assert!(kept[0].try_as::<Timestamp>().unwrap().has_valid_time());
    pipeline.wait().await.unwrap();
}

fn track_with_frames(frames: &[i64]) -> ObjectTrackSet {
    ObjectTrackSet::new(vec![Track::new(
        7,
        frames.iter().map(|f| TrackState::new(*f)).collect(),
    )])
}

/// Feeds frames 5 and 9, each with one detection and a track over both.
async fn run_tracks_through(config: Value) -> (Vec<Option<i64>>, Vec<Vec<i64>>) {
    let mut pipeline = downsample(config).await;
    let mut ts_in = pipeline.feed("ds", "timestamp").unwrap();
    let mut dets_in = pipeline.feed("ds", "input_1").unwrap();
    let mut tracks_in = pipeline.feed("ds", "input_2").unwrap();
    let mut ts_out = pipeline.tap("ds", "timestamp").unwrap();
    let mut tracks_out = pipeline.tap("ds", "output_2").unwrap();
    pipeline.start().await.unwrap();

    for frame in [5, 9] {
        ts_in
            .push(Datum::new(Timestamp::from_frame(frame)))
            .await
            .unwrap();
        dets_in.push(Datum::new(detections(1))).await.unwrap();
        tracks_in
            .push(Datum::new(track_with_frames(&[5, 9])))
            .await
            .unwrap();
    }
    ts_in.push(Datum::EndOfStream).await.unwrap();
    dets_in.push(Datum::EndOfStream).await.unwrap();
    tracks_in.push(Datum::EndOfStream).await.unwrap();

    let kept = frames(&drain(&mut ts_out).await);
    let tracks = drain(&mut tracks_out)
        .await
        .iter()
        .map(|d| d.try_as::<ObjectTrackSet>().unwrap().tracks[0].frames())
        .collect();
    pipeline.wait().await.unwrap();
    (kept, tracks)
}

#[tokio::test]
async fn test_renumber_without_det_gate_leaves_tracks() {
    let (kept, tracks) = run_tracks_through(json!({ "renumber_frames": true })).await;
    assert_eq!(kept, vec![Some(0), Some(1)]);
    assert_eq!(tracks, vec![vec![5, 9], vec![5, 9]]);
}

#[tokio::test]
async fn test_det_gate_without_renumber_leaves_tracks() {
    let (kept, tracks) = run_tracks_through(json!({ "only_frames_with_dets": true })).await;
    assert_eq!(kept, vec![Some(5), Some(9)]);
    assert_eq!(tracks, vec![vec![5, 9], vec![5, 9]]);
}

#[tokio::test]
async fn test_both_flags_patch_tracks() {
    let (kept, tracks) = run_tracks_through(json!({
        "renumber_frames": true,
        "only_frames_with_dets": true
    }))
    .await;
    assert_eq!(kept, vec![Some(0), Some(1)]);
    // frame 9 is not mapped yet on the first cycle
    assert_eq!(tracks, vec![vec![0], vec![0, 1]]);
}
