//! Per-file loader: one candidate in, one populated [`FileRecord`] out.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::Path;

use crate::engine::tools::media_type_for;
use crate::pipeline::IngestContext;
use crate::utils::config::ToolConsts;
use crate::{CandidateFile, ExportStandard, FileRecord};

/// Field names stamped in Camtrap DP mode.
pub const MEDIA_ID_FIELD: &str = "mediaID";
pub const OBSERVATION_ID_FIELD: &str = "observationID";
pub const MEDIA_TYPE_FIELD: &str = "fileMediatype";

/// Builds records for one ingestion run. Metadata failures never fail a record.
pub struct FileLoader {
    ctx: IngestContext,
    /// Tags requested per file: the imported tags plus the capture-time tag.
    query_tags: Vec<String>,
}

impl FileLoader {
    pub fn new(ctx: IngestContext) -> Self {
        let mut query_tags = ctx.load.tags();
        if !query_tags.iter().any(|t| t == ToolConsts::CAPTURE_TIME_TAG) {
            query_tags.push(ToolConsts::CAPTURE_TIME_TAG.to_string());
        }
        Self { ctx, query_tags }
    }

    /// Load `candidate`, whose folder relative to the root is `relative_path`, then call
    /// `on_complete` with the finished record.
    pub fn load(
        &self,
        candidate: &CandidateFile,
        relative_path: &str,
        on_complete: impl FnOnce(&FileRecord),
    ) -> FileRecord {
        let file = candidate
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let date_time = candidate
            .earliest_time()
            .unwrap_or_else(|| Local::now().fixed_offset());
        let mut record = FileRecord::new(relative_path, file, date_time);

        let metadata = self.fetch_metadata(&candidate.path);
        for (tag, label) in &self.ctx.load.metadata_fields {
            if let Some(value) = metadata.get(tag) {
                record.fields.insert(label.clone(), value.clone());
            }
        }
        if let Some(taken) = metadata
            .get(ToolConsts::CAPTURE_TIME_TAG)
            .and_then(|v| parse_capture_time(v))
        {
            record.date_time = taken;
        }

        if self.ctx.load.export_standard == ExportStandard::CamtrapDp {
            stamp_camtrap_fields(&mut record);
        }

        on_complete(&record);
        record
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }

    /// One tool round trip per file. Empty when no tool is configured or the call fails.
    fn fetch_metadata(&self, path: &Path) -> HashMap<String, String> {
        let Some(tool) = &self.ctx.tool else {
            return HashMap::new();
        };
        if !path.is_file() {
            return HashMap::new();
        }
        match tool.fetch_metadata(path, Some(&self.query_tags)) {
            Ok(map) => map,
            Err(e) => {
                warn!("Metadata unavailable for {}: {}", path.display(), e);
                HashMap::new()
            }
        }
    }
}

/// Capture time as printed by the tool (`%Y-%m-%d %H:%M:%S`), taken as local time.
pub fn parse_capture_time(value: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), ToolConsts::CAPTURE_TIME_FORMAT)
        .map_err(|e| debug!("Unparsable capture time {value:?}: {e}"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}

/// Fresh media and observation ids plus the media type.
fn stamp_camtrap_fields(record: &mut FileRecord) {
    let media_type = media_type_for(&record.extension());
    record
        .fields
        .insert(MEDIA_ID_FIELD.to_string(), uuid::Uuid::new_v4().to_string());
    record.fields.insert(
        OBSERVATION_ID_FIELD.to_string(),
        uuid::Uuid::new_v4().to_string(),
    );
    record
        .fields
        .insert(MEDIA_TYPE_FIELD.to_string(), media_type);
}
