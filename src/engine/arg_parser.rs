use clap::Parser;
use std::path::PathBuf;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Load camera-trap images and videos into an image-set database.
#[derive(Clone, Parser)]
#[command(name = "imgload")]
#[command(about = "Load new images and videos from DIR into its image-set database; use --dry-run to only list them.")]
pub struct Cli {
    /// Image-set folder. Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Path to the image-set database. Default: `.imgload` in DIR.
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Metadata tool executable. Default: `exiftool(-k)` next to this binary.
    #[arg(long, short)]
    pub tool: Option<PathBuf>,

    /// Import a metadata tag into a data label. Repeatable: --tag Make=camera --tag Model=model
    #[arg(long = "tag", value_name = "TAG=LABEL", value_parser = parse_tag_mapping)]
    pub tags: Vec<(String, String)>,

    /// Stamp Camtrap DP media/observation ids and media type on every record.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub camtrap: Option<bool>,

    /// Maximum concurrent load tasks. Default: rayon's global pool.
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// List new files; do not load or insert anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

/// `TAG=LABEL`, or a bare `TAG` stored under its own name.
pub fn parse_tag_mapping(s: &str) -> Result<(String, String), String> {
    let (tag, label) = s.split_once('=').unwrap_or((s, s));
    let (tag, label) = (tag.trim(), label.trim());
    if tag.is_empty() || label.is_empty() {
        return Err(format!("expected TAG=LABEL, got {s:?}"));
    }
    Ok((tag.to_string(), label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_mapping_accepts_bare_tag() {
        assert_eq!(
            parse_tag_mapping("Make=camera"),
            Ok(("Make".into(), "camera".into()))
        );
        assert_eq!(parse_tag_mapping("Model"), Ok(("Model".into(), "Model".into())));
        assert!(parse_tag_mapping("=x").is_err());
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from([
            "imgload", "/set", "--tag", "Make=camera", "--tag", "Model", "--camtrap", "-j", "4",
        ]);
        assert_eq!(cli.dir, PathBuf::from("/set"));
        assert_eq!(cli.tags.len(), 2);
        assert_eq!(cli.camtrap, Some(true));
        assert_eq!(cli.jobs, Some(4));
        assert_eq!(cli.db, None);
    }
}
