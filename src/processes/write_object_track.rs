use crate::core::{
    ConfigBlock, Datum, ObjectTrackSet, PortFlags, PortSet, Process, ProcessIo, StepOutcome,
    Timestamp, Track, TrackState,
};
use crate::error::{PipelineError, PipelineResult};
use crate::registry::port_types::{TYPE_FILE_NAME, TYPE_OBJECT_TRACK_SET, TYPE_TIMESTAMP};
use async_trait::async_trait;
use framepipe_macros::ProcessMeta;
use std::collections::BTreeMap;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

pub const PORT_OBJECT_TRACK_SET: &str = "object_track_set";
pub const PORT_TIMESTAMP: &str = "timestamp";
pub const PORT_IMAGE_FILE_NAME: &str = "image_file_name";

const CURRENT_TIME_TAG: &str = "[CURRENT_TIME]";

const KW18_HEADER: &str = "# 1:Track-id 2:Track-length 3:Frame-number \
4-5:Tracking-plane-loc(x,y) 6-7:velocity(x,y) 8-9:Image-loc(x,y) \
10-13:Img-bbox(TL_x,TL_y,BR_x,BR_y) 14:Area 15-17:World-loc(x,y,z) \
18:timestamp 19:confidence";

/// Replace the first `[CURRENT_TIME]` in `name` with `stamp`.
pub fn substitute_current_time(name: &str, stamp: &str) -> String {
    name.replacen(CURRENT_TIME_TAG, stamp, 1)
}

/// One KW18 row for `state` of `track`.
pub fn kw18_line(track: &Track, state: &TrackState, fallback_time_usec: i64) -> String {
    let (min_x, min_y, max_x, max_y, area, (cx, cy), confidence) = match &state.detection {
        Some(det) => (
            det.bbox.min_x,
            det.bbox.min_y,
            det.bbox.max_x,
            det.bbox.max_y,
            det.bbox.area(),
            det.bbox.center(),
            det.confidence,
        ),
        None => (0.0, 0.0, 0.0, 0.0, 0.0, (0.0, 0.0), 1.0),
    };

    format!(
        "{} {} {} {} {} 0 0 {} {} {} {} {} {} {} 0 0 0 {} {}",
        track.id,
        track.len(),
        state.frame,
        cx,
        cy,
        cx,
        cy,
        min_x,
        min_y,
        max_x,
        max_y,
        area,
        state.time_usec.unwrap_or(fallback_time_usec),
        confidence
    )
}

/// Writes object tracks as KW18 rows when the stream ends.
#[derive(ProcessMeta)]
#[process_meta(
    name = "write_object_track",
    category = "Sinks",
    description = "Write object tracks to a KW18 file"
)]
pub struct WriteObjectTrackProcess {
    #[config(description = "Output file; [CURRENT_TIME] expands to the local time")]
    pub file_name: String,

    #[config(description = "Optional file receiving one image name per frame")]
    pub frame_list_output: String,

    writer: Option<BufWriter<File>>,
    frame_list_writer: Option<BufWriter<File>>,
    /// Latest version of every track seen, by id
    tracks: BTreeMap<u64, Track>,
    last_time_usec: i64,
}

impl Default for WriteObjectTrackProcess {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            frame_list_output: String::new(),
            writer: None,
            frame_list_writer: None,
            tracks: BTreeMap::new(),
            last_time_usec: 0,
        }
    }
}

impl WriteObjectTrackProcess {
    pub fn new() -> Self {
        Self::default()
    }

    async fn create(path: &str) -> PipelineResult<BufWriter<File>> {
        File::create(path)
            .await
            .map(BufWriter::new)
            .map_err(|e| PipelineError::io(path, e))
    }

    fn write_set(&mut self, set: &ObjectTrackSet) {
        for track in &set.tracks {
            self.tracks.insert(track.id, track.clone());
        }
    }

    fn kw18_text(&self) -> String {
        let mut text = String::from(KW18_HEADER);
        text.push('\n');
        for track in self.tracks.values() {
            for state in &track.states {
                text.push_str(&kw18_line(track, state, self.last_time_usec));
                text.push('\n');
            }
        }
        text
    }

    async fn flush_tracks(&mut self) -> PipelineResult<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        let text = self.kw18_text();
        let written = match writer.write_all(text.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| PipelineError::io(&self.file_name, e))?;

        tracing::info!(
            file = %self.file_name,
            tracks = self.tracks.len(),
            "tracks written"
        );
        Ok(())
    }
}

#[async_trait]
impl Process for WriteObjectTrackProcess {
    fn type_name(&self) -> &'static str {
        "write_object_track"
    }

    fn make_ports(&self, ports: &mut PortSet) -> PipelineResult<()> {
        ports.declare_input(
            PORT_OBJECT_TRACK_SET,
            TYPE_OBJECT_TRACK_SET,
            PortFlags::required(),
            "Tracks to write",
        )?;
        ports.declare_input(PORT_TIMESTAMP, TYPE_TIMESTAMP, PortFlags::optional(), "Frame timestamp")?;
        ports.declare_input(
            PORT_IMAGE_FILE_NAME,
            TYPE_FILE_NAME,
            PortFlags::optional(),
            "Image file name",
        )?;
        Ok(())
    }

    async fn configure(&mut self, config: &ConfigBlock) -> PipelineResult<()> {
        let file_name: String = config.value_or("file_name", String::new())?;
        let frame_list_output: String = config.value_or("frame_list_output", String::new())?;

        if file_name.trim().is_empty() {
            return Err(PipelineError::config(
                config.process_name(),
                "Required file name not specified",
            ));
        }

        if file_name.contains(CURRENT_TIME_TAG) {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
            self.file_name = substitute_current_time(&file_name, &stamp);
            self.frame_list_output = substitute_current_time(&frame_list_output, &stamp);
        } else {
            self.file_name = file_name;
            self.frame_list_output = frame_list_output;
        }
        Ok(())
    }

    async fn init(&mut self) -> PipelineResult<()> {
        self.writer = Some(Self::create(&self.file_name).await?);
        if !self.frame_list_output.is_empty() {
            self.frame_list_writer = Some(Self::create(&self.frame_list_output).await?);
        }
        self.tracks.clear();
        Ok(())
    }

    async fn step(&mut self, io: &mut ProcessIo) -> PipelineResult<StepOutcome> {
        let tracks = io.pull(PORT_OBJECT_TRACK_SET).await?;
        let timestamp = io.pull_if_connected(PORT_TIMESTAMP).await?;
        let file_name = io.pull_if_connected(PORT_IMAGE_FILE_NAME).await?;

        if tracks.is_end_of_stream() {
            return Ok(StepOutcome::Complete);
        }

        let set = tracks.try_as::<ObjectTrackSet>().ok_or_else(|| {
            PipelineError::data(io.process_name(), "object_track_set port carried another kind")
        })?;
        self.write_set(set);

        if let Some(t) = timestamp
            .as_ref()
            .and_then(|d| d.try_as::<Timestamp>())
            .and_then(|ts| ts.time_usec)
        {
            self.last_time_usec = t;
        }

        if let Some(writer) = self.frame_list_writer.as_mut() {
            let name = file_name
                .as_ref()
                .and_then(|d: &Datum| d.try_as::<str>())
                .unwrap_or_default();
            writer
                .write_all(format!("{}\n", name).as_bytes())
                .await
                .map_err(|e| PipelineError::io(&self.frame_list_output, e))?;
        }

        Ok(StepOutcome::Continue)
    }

    async fn finish(&mut self) -> PipelineResult<()> {
        if let Some(mut writer) = self.frame_list_writer.take() {
            writer
                .flush()
                .await
                .map_err(|e| PipelineError::io(&self.frame_list_output, e))?;
        }
        self.flush_tracks().await
    }
}
