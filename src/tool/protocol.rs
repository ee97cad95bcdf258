//! Wire format of the stay-open session: command blocks, execute sentinels, responses,
//! and the tab-separated metadata listing.

use std::collections::HashMap;
use std::path::Path;

use crate::utils::config::ToolConsts;

/// One command: the command lines followed by positional arguments, one per line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    command: String,
    args: Vec<String>,
}

impl CommandRequest {
    /// `command` may span several lines (e.g. `"-Orientation\n-n"`).
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Request for everything the tool reports about one file.
    pub fn for_file(path: &Path) -> Self {
        Self::new(path.to_string_lossy())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Limit the listing to `tags`: one `-TAG` option each.
    pub fn tags(self, tags: &[String]) -> Self {
        tags.iter().fold(self, |req, tag| req.arg(format!("-{tag}")))
    }

    /// Non-empty command lines, then the arguments.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.command
            .lines()
            .filter(|l| !l.is_empty())
            .chain(self.args.iter().map(String::as_str))
    }

    /// Command block as written to an argument file (no sentinel).
    pub fn to_arg_file_contents(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// What came back for one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResponse {
    pub success: bool,
    /// stdout lines on success, stderr lines on failure.
    pub payload: String,
}

impl CommandResponse {
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: payload.into(),
        }
    }

    pub fn failure(payload: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: payload.into(),
        }
    }

    /// Best-effort heuristic: the error text suggests the direct path mangled the file name.
    pub fn suggests_via_file(&self) -> bool {
        if self.success {
            return false;
        }
        let err = self.payload.to_lowercase();
        ToolConsts::VIA_FILE_TRIGGERS
            .iter()
            .any(|trigger| err.contains(trigger))
    }
}

pub(crate) fn execute_line(tag: u64) -> String {
    format!("-execute{tag}")
}

pub(crate) fn ready_line(tag: u64) -> String {
    format!("{{ready{tag}}}")
}

/// True if `line` is the ready sentinel for command `tag`.
pub(crate) fn is_ready_for(line: &str, tag: u64) -> bool {
    line.trim().eq_ignore_ascii_case(&ready_line(tag))
}

/// True for any `{readyN}` line (N all digits).
pub(crate) fn is_ready_line(line: &str) -> bool {
    line.trim()
        .strip_prefix("{ready")
        .and_then(|rest| rest.strip_suffix('}'))
        .is_some_and(|n| n.chars().all(|c| c.is_ascii_digit()))
}

/// Bytes written to stdin for a direct command.
pub(crate) fn direct_payload(request: &CommandRequest, tag: u64) -> String {
    let mut out = request.to_arg_file_contents();
    out.push_str(&execute_line(tag));
    out.push('\n');
    out
}

/// Bytes written to stdin when the command sits in an argument file.
pub(crate) fn via_file_payload(arg_file: &Path, tag: u64) -> String {
    format!(
        "-charset\nfilename=UTF8\n-@\n{}\n{}\n",
        arg_file.display(),
        execute_line(tag)
    )
}

/// Bytes written to stdin to end the stay-open session.
pub(crate) const STOP_PAYLOAD: &str = "-stay_open\nFalse\n";

/// Parse the tab-separated listing into tag → value.
///
/// Accepts `Group\tTag\tValue`, `[Group]Tag\tValue` and `Tag\tValue`. The first
/// occurrence of a tag wins. With `tags`, only those tags are kept; absent tags are
/// simply missing from the map.
pub fn parse_metadata(
    payload: &str,
    tags: Option<&[String]>,
    keep_empty: bool,
) -> HashMap<String, String> {
    let filter = tags.filter(|t| !t.is_empty());
    let mut out = HashMap::new();
    for line in payload.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || is_ready_line(line) {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        let (tag, value) = match cols.as_slice() {
            [_group, tag, value] => (tag.trim(), *value),
            [tag, value] => (strip_group(tag), *value),
            _ => continue,
        };
        if !keep_empty && value.is_empty() {
            continue;
        }
        if let Some(wanted) = filter
            && !wanted.iter().any(|w| w == tag)
        {
            continue;
        }
        out.entry(tag.to_string())
            .or_insert_with(|| value.to_string());
    }
    out
}

/// `[Group]Tag` → `Tag`.
fn strip_group(tag: &str) -> &str {
    match (tag.starts_with('['), tag.find(']')) {
        (true, Some(close)) => tag[close + 1..].trim(),
        _ => tag.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_payload_ends_with_numbered_sentinel() {
        let req = CommandRequest::new("-DateTimeOriginal\n-s3").arg("/a/b.jpg");
        assert_eq!(
            direct_payload(&req, 7),
            "-DateTimeOriginal\n-s3\n/a/b.jpg\n-execute7\n"
        );
    }

    #[test]
    fn file_request_names_each_requested_tag() {
        let tags = vec!["Make".to_string(), "DateTimeOriginal".to_string()];
        let req = CommandRequest::for_file(Path::new("/set/a b.jpg")).tags(&tags);
        assert_eq!(
            req.to_arg_file_contents(),
            "/set/a b.jpg\n-Make\n-DateTimeOriginal\n"
        );
        assert_eq!(
            CommandRequest::for_file(Path::new("/x.jpg")).tags(&[]),
            CommandRequest::for_file(Path::new("/x.jpg"))
        );
    }

    #[test]
    fn ready_sentinel_matches_only_its_tag() {
        assert!(is_ready_for("{ready3}", 3));
        assert!(is_ready_for("{READY3}\r", 3));
        assert!(!is_ready_for("{ready3}", 4));
        assert!(is_ready_line("{ready0000}"));
        assert!(!is_ready_line("{ready}x"));
        assert!(!is_ready_line("EXIF\tMake\tReconyx"));
    }

    #[test]
    fn parse_three_and_two_column_lines() {
        let payload = "ExifIFD\tDateTimeOriginal\t2021-04-05 18:05:01\n\
                       [IFD0]Make\tRECONYX\n\
                       Model\tHC600\n\
                       {ready0000}\n\
                       garbage line";
        let map = parse_metadata(payload, None, true);
        assert_eq!(map.len(), 3);
        assert_eq!(map["DateTimeOriginal"], "2021-04-05 18:05:01");
        assert_eq!(map["Make"], "RECONYX");
        assert_eq!(map["Model"], "HC600");
    }

    #[test]
    fn parse_filters_requested_tags_and_keeps_first() {
        let payload = "G\tA\t1\nG\tB\t2\nG\tC\t3\nH\tA\t9";
        let tags = vec!["A".to_string(), "C".to_string(), "Z".to_string()];
        let map = parse_metadata(payload, Some(&tags), true);
        assert_eq!(map.len(), 2);
        assert_eq!(map["A"], "1");
        assert_eq!(map["C"], "3");
    }

    #[test]
    fn parse_drops_empty_values_when_asked() {
        let payload = "G\tA\t\nG\tB\tx";
        assert_eq!(parse_metadata(payload, None, true).len(), 2);
        let map = parse_metadata(payload, None, false);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("B"));
    }

    #[test]
    fn via_file_retry_is_triggered_by_error_text() {
        assert!(CommandResponse::failure("Error: File not found - é.jpg").suggests_via_file());
        assert!(CommandResponse::failure("Invalid filename encoding").suggests_via_file());
        assert!(!CommandResponse::failure("Error: Unknown file type").suggests_via_file());
        assert!(!CommandResponse::success("file not found").suggests_via_file());
    }
}
