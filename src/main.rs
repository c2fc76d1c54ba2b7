use framepipe::core::{Datum, Timestamp};
use framepipe::engine::Pipeline;
use framepipe::logging;
use serde_json::json;

/// Usage: `framepipe [image_list_file] [target_frame_rate]`
///
/// With an image list the frames come from `frame_list`; without one a
/// synthetic 30 fps timestamp stream is fed in.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let image_list = args.next();
    let target_rate: f64 = match args.next() {
        Some(rate) => rate.parse()?,
        None => 5.0,
    };

    let mut processes = vec![
        json!({
            "name": "decimate",
            "type": "downsample",
            "config": { "target_frame_rate": target_rate.to_string() }
        }),
        json!({ "name": "sink", "type": "debug_sink", "config": { "label": "kept" } }),
    ];
    let mut connections = vec![json!({ "from": "decimate.timestamp", "to": "sink.input" })];

    if let Some(list) = &image_list {
        processes.push(json!({
            "name": "frames",
            "type": "frame_list",
            "config": { "image_list_file": list }
        }));
        connections.push(json!({ "from": "frames.timestamp", "to": "decimate.timestamp" }));
        connections.push(json!({ "from": "frames.frame_rate", "to": "decimate.rate" }));
    }

    let description = json!({
        "pipeline_config": { "channel_capacity": 16 },
        "processes": processes,
        "connections": connections,
    });

    let mut pipeline = Pipeline::from_json(description).await?;
    let feed = match image_list {
        Some(_) => None,
        None => Some(pipeline.feed("decimate", "timestamp")?),
    };

    pipeline.start().await?;

    if let Some(mut feed) = feed {
        for frame in 0..90 {
            let ts = Timestamp::new(frame * 1_000_000 / 30, frame);
            feed.push(Datum::new(ts)).await?;
        }
        feed.push(Datum::EndOfStream).await?;
    }

    pipeline.wait().await?;

    println!("{}", pipeline.monitor().generate_report());
    Ok(())
}
