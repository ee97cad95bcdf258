//! Load `.imgload.toml` from the image-set folder (CLI only). The lib takes its settings
//! through `IngestOpts` and `IngestContext`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::config::PackagePaths;
use crate::{ExportStandard, Opts};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ImgloadToml {
    #[serde(default)]
    settings: LoadSection,
    /// Metadata tag → data label.
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoadSection {
    db_path: Option<String>,
    tool_path: Option<String>,
    verbose: Option<bool>,
    camtrap: Option<bool>,
    jobs: Option<usize>,
    progress_ms: Option<u64>,
}

/// Load the settings file from `dir` if present. Returns None if missing or unreadable.
pub(crate) fn load_imgload_toml(dir: &Path) -> Option<ImgloadToml> {
    let path = dir.join(PackagePaths::get().toml_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    toml::from_str(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident) => {
        if let Some(v) = $sec.$sec_field {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI.
pub(crate) fn apply_file_to_opts(file: &ImgloadToml, opts: &mut Opts) {
    let sec = &file.settings;
    if let Some(ref p) = sec.db_path {
        opts.db_path = Some(PathBuf::from(p));
    }
    if let Some(ref p) = sec.tool_path {
        opts.tool_path = Some(PathBuf::from(p));
    }
    apply_file_opt!(sec, opts, verbose => verbose);
    if let Some(camtrap) = sec.camtrap {
        opts.load.export_standard = export_standard(camtrap);
    }
    if sec.jobs.is_some() {
        opts.max_concurrency = sec.jobs;
    }
    if let Some(ms) = sec.progress_ms {
        opts.progress_interval = Some(Duration::from_millis(ms.max(1)));
    }
    for (tag, label) in &file.tags {
        opts.load
            .metadata_fields
            .insert(tag.clone(), label.clone());
    }
}

pub(crate) fn export_standard(camtrap: bool) -> ExportStandard {
    if camtrap {
        ExportStandard::CamtrapDp
    } else {
        ExportStandard::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_settings_fill_opts() {
        let file: ImgloadToml = toml::from_str(
            r#"
            [settings]
            tool_path = "/opt/exiftool"
            camtrap = true
            jobs = 3

            [tags]
            Make = "camera"
            "#,
        )
        .unwrap();
        let mut opts = Opts::default();
        apply_file_to_opts(&file, &mut opts);
        assert_eq!(opts.tool_path, Some(PathBuf::from("/opt/exiftool")));
        assert_eq!(opts.load.export_standard, ExportStandard::CamtrapDp);
        assert_eq!(opts.max_concurrency, Some(3));
        assert_eq!(opts.load.metadata_fields["Make"], "camera");
        assert!(opts.db_path.is_none());
    }
}
