//! Application configuration constants.
//! Tuning, timeouts and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived paths: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    db_filename: String,
    toml_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache paths from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                db_filename: format!(".{pkg}"),
                toml_filename: format!(".{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Default database filename inside the image-set folder (e.g. `.imgload`).
    pub fn db_filename(&self) -> &str {
        &self.db_filename
    }

    /// Settings file read by the CLI from the image-set folder (e.g. `.imgload.toml`).
    pub fn toml_filename(&self) -> &str {
        &self.toml_filename
    }
}

// ---- Metadata tool ----

/// Timeouts and names for the stay-open metadata tool.
pub struct ToolConsts;

impl ToolConsts {
    /// Executable looked up next to the running binary when no path is configured.
    #[cfg(windows)]
    pub const EXE_NAME: &'static str = "exiftool(-k).exe";
    #[cfg(not(windows))]
    pub const EXE_NAME: &'static str = "exiftool(-k)";

    /// Startup arguments: stay-open session reading commands from stdin, fixed date and
    /// coordinate formats, group-qualified tab-separated output.
    pub const STARTUP_ARGS: &'static [&'static str] = &[
        "-a",
        "-m",
        "-q",
        "-q",
        "-stay_open",
        "True",
        "-@",
        "-",
        "-common_args",
        "-G1",
        "-s",
        "-d",
        "%Y-%m-%d %H:%M:%S",
        "-c",
        "%d %d %.6f",
        "-t",
    ];

    /// How long to wait for stderr when a command produced no stdout.
    pub const ERROR_GRACE: Duration = Duration::from_secs(1);
    /// How long a graceful stop may take before the process is killed.
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
    /// Upper bound on one command's round trip.
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);
    /// Upper bound on the version handshake after spawning.
    pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
    /// Delay before the manager sweeps lingering tool processes after a stop.
    pub const KILL_SWEEP_DELAY: Duration = Duration::from_secs(1);

    /// Emitted on stderr by the `(-k)` build when it exits; answered with a newline.
    pub const EXIT_PROMPT: &'static str = "-- press RETURN --";

    /// Lowercased error fragments that make an `Auto` command retry via an argument file.
    /// Best effort only: the wording is not stable across tool versions.
    pub const VIA_FILE_TRIGGERS: &'static [&'static str] =
        &["file not found", "invalid filename encoding"];

    /// Tag carrying the capture timestamp, and the format the startup args ask for.
    pub const CAPTURE_TIME_TAG: &'static str = "DateTimeOriginal";
    pub const CAPTURE_TIME_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";
}

// ---- Paths ----

/// Full paths at or above this length are skipped (classic Windows MAX_PATH).
pub const MAX_PATH_LEN: usize = 260;
/// Directory parts at or above this length are skipped.
pub const MAX_DIR_LEN: usize = 248;

// ---- Media ----

/// Extensions (lowercase, no dot) treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
/// Extensions (lowercase, no dot) treated as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["asf", "avi", "mp4", "mov"];

// ---- Progress ----

/// Default interval between progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// How often the Phase 1 wait wakes up to look at the cancellation signal.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ---- Database ----

/// Batch size for DB insert chunks (balance transaction size vs round-trips).
pub const DB_INSERT_BATCH_SIZE: usize = 1000;
