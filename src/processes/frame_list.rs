use crate::core::{
    ConfigBlock, Datum, FrameId, PortFlags, PortSet, Process, ProcessIo, StepOutcome, Timestamp,
};
use crate::core::types::seconds_to_usec;
use crate::error::{PipelineError, PipelineResult};
use crate::registry::port_types::{TYPE_FILE_NAME, TYPE_FRAME_RATE, TYPE_TIMESTAMP};
use async_trait::async_trait;
use framepipe_macros::ProcessMeta;
use std::path::{Path, PathBuf};

pub const PORT_TIMESTAMP: &str = "timestamp";
pub const PORT_IMAGE_FILE_NAME: &str = "image_file_name";
pub const PORT_FRAME_RATE: &str = "frame_rate";

/// Emits one frame per entry of an image list file.
#[derive(ProcessMeta)]
#[process_meta(
    name = "frame_list",
    category = "Sources",
    description = "Read image file names from a list file"
)]
pub struct FrameListProcess {
    #[config(description = "File with one image file name per line")]
    pub image_list_file: String,

    #[config(default = "0.03333333", description = "Seconds between frames", min = 0.0)]
    pub frame_time: f64,

    #[config(default = "true", description = "Number the first frame 0 instead of 1")]
    pub zero_based_id: bool,

    #[config(default = "true", description = "Strip directories from emitted file names")]
    pub no_path_in_name: bool,

    #[config(description = "Colon separated directories searched for relative entries")]
    pub path: String,

    search_path: Vec<PathBuf>,
    files: Vec<PathBuf>,
    next_file: usize,
    frame_number: FrameId,
    frame_time_usec: i64,
}

impl Default for FrameListProcess {
    fn default() -> Self {
        Self {
            image_list_file: String::new(),
            frame_time: 0.03333333,
            zero_based_id: true,
            no_path_in_name: true,
            path: String::new(),
            search_path: Vec::new(),
            files: Vec::new(),
            next_file: 0,
            frame_number: 0,
            frame_time_usec: 0,
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Locate `entry`: as given first, then relative to each search directory.
pub async fn resolve_entry(search_path: &[PathBuf], entry: &str) -> Option<PathBuf> {
    let direct = Path::new(entry);
    if is_file(direct).await {
        return Some(direct.to_path_buf());
    }
    if direct.is_absolute() {
        return None;
    }
    for dir in search_path {
        let candidate = dir.join(entry);
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

impl FrameListProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved image files, available after `init`
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn output_rate(&self) -> f64 {
        if self.frame_time > 0.0 {
            1.0 / self.frame_time
        } else {
            1.0
        }
    }

    fn display_name(&self, file: &Path) -> String {
        if self.no_path_in_name {
            if let Some(name) = file.file_name() {
                return name.to_string_lossy().into_owned();
            }
        }
        file.to_string_lossy().into_owned()
    }
}

#[async_trait]
impl Process for FrameListProcess {
    fn type_name(&self) -> &'static str {
        "frame_list"
    }

    fn make_ports(&self, ports: &mut PortSet) -> PipelineResult<()> {
        let optional = PortFlags::optional();
        ports.declare_output(PORT_TIMESTAMP, TYPE_TIMESTAMP, optional, "Frame id and time")?;
        ports.declare_output(PORT_IMAGE_FILE_NAME, TYPE_FILE_NAME, optional, "Image file name")?;
        ports.declare_output(PORT_FRAME_RATE, TYPE_FRAME_RATE, optional, "Frames per second")?;
        Ok(())
    }

    async fn configure(&mut self, config: &ConfigBlock) -> PipelineResult<()> {
        self.image_list_file = config.value("image_list_file")?;
        self.frame_time = config.value_or("frame_time", 0.03333333)?;
        self.zero_based_id = config.value_or("zero_based_id", true)?;
        self.no_path_in_name = config.value_or("no_path_in_name", true)?;
        self.path = config.value_or("path", String::new())?;

        if self.image_list_file.trim().is_empty() {
            return Err(PipelineError::config(
                config.process_name(),
                "image_list_file is required",
            ));
        }
        if !self.frame_time.is_finite() {
            return Err(PipelineError::config(
                config.process_name(),
                format!("frame_time must be finite, got {}", self.frame_time),
            ));
        }

        self.search_path = self
            .path
            .split(':')
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .collect();
        self.search_path.push(PathBuf::from("."));
        Ok(())
    }

    async fn init(&mut self) -> PipelineResult<()> {
        let list = tokio::fs::read_to_string(&self.image_list_file)
            .await
            .map_err(|e| PipelineError::io(&self.image_list_file, e))?;

        let mut files = Vec::new();
        for entry in list.lines().map(str::trim) {
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            let file = resolve_entry(&self.search_path, entry).await.ok_or_else(|| {
                PipelineError::io(
                    entry,
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "could not locate file in search path",
                    ),
                )
            })?;
            files.push(file);
        }

        tracing::debug!(
            list = %self.image_list_file,
            frames = files.len(),
            "image list loaded"
        );
        self.files = files;
        self.next_file = 0;
        self.frame_number = if self.zero_based_id { 0 } else { 1 };
        self.frame_time_usec = 0;
        Ok(())
    }

    async fn step(&mut self, io: &mut ProcessIo) -> PipelineResult<StepOutcome> {
        let Some(file) = self.files.get(self.next_file).cloned() else {
            tracing::debug!(process = io.process_name(), "end of image list");
            return Ok(StepOutcome::Complete);
        };
        self.next_file += 1;

        let ts = Timestamp::new(self.frame_time_usec, self.frame_number);
        self.frame_number += 1;
        self.frame_time_usec += seconds_to_usec(self.frame_time);

        io.push_value(PORT_TIMESTAMP, ts).await?;
        io.push(PORT_IMAGE_FILE_NAME, Datum::file_name(self.display_name(&file)))
            .await?;
        io.push(PORT_FRAME_RATE, Datum::frame_rate(self.output_rate()))
            .await?;
        Ok(StepOutcome::Continue)
    }

    async fn finish(&mut self) -> PipelineResult<()> {
        self.files.clear();
        Ok(())
    }
}
