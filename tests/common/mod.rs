//! A small POSIX sh stand-in for the metadata tool, speaking the same stay-open protocol:
//! `-ver`, file arguments, `-TAG` options, `-@ <argfile>`, `-execute<N>` → `{ready<N>}`,
//! `-stay_open False`.
//!
//! Files are "described" by their own content (a tab-separated listing). Marker files next
//! to the script switch behaviours: `direct-fails` makes every direct command report
//! "File not found", and a file named `*no-reply*` or `*half-reply*` is answered without
//! its sentinel the first time (nothing, or the listing only). Every command naming files
//! appends `direct` or `via-file` to `exchanges.log`.
#![allow(dead_code)]

use imgload::tool::ToolConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const FAKE_TOOL: &str = r#"
dir=$(dirname "$0")
tab=$(printf '\t')
files=""
opts=""
ver=""
via=""
add() {
  files="$files
$1"
}
emit() {
  printf '%s\n' "$files" | while IFS= read -r f; do
    [ -z "$f" ] && continue
    if [ -s "$f" ]; then
      if [ -z "$opts" ]; then
        cat "$f"
      else
        while IFS= read -r l; do
          for t in $opts; do
            case "$l" in *"$tab$t$tab"*) printf '%s\n' "$l" ;; esac
          done
        done < "$f"
      fi
    elif [ -f "$f" ]; then
      echo "Error: Unknown file type - $f" >&2
    else
      echo "Error: File not found - $f" >&2
    fi
  done
}
reset() {
  files=""
  opts=""
  via=""
}
run() {
  if [ -n "$ver" ]; then echo "12.40"; ver=""; fi
  if [ -n "$files" ]; then
    if [ -n "$via" ]; then echo via-file >> "$dir/exchanges.log"; else echo direct >> "$dir/exchanges.log"; fi
  fi
  case "$files" in
    *no-reply*|*half-reply*)
      if [ ! -f "$dir/replied-once" ]; then
        : > "$dir/replied-once"
        case "$files" in *half-reply*) emit ;; esac
        reset
        return
      fi ;;
  esac
  if [ -z "$via" ] && [ -f "$dir/direct-fails" ]; then
    printf '%s\n' "$files" | while IFS= read -r f; do
      [ -n "$f" ] && echo "Error: File not found - $f" >&2
    done
  else
    emit
  fi
  reset
  echo "{ready$1}"
}
while IFS= read -r line; do
  case "$line" in
    -stay_open) IFS= read -r v; [ "$v" = "False" ] && exit 0 ;;
    -ver) ver=1 ;;
    -execute*) run "${line#-execute}" ;;
    -charset) IFS= read -r skip ;;
    -@)
      via=1
      IFS= read -r argfile
      while IFS= read -r a; do
        case "$a" in -*) opts="$opts ${a#-}" ;; *) add "$a" ;; esac
      done < "$argfile" ;;
    -*) opts="$opts ${line#-}" ;;
    *) add "$line" ;;
  esac
done
"#;

/// Runs the script through `/bin/sh`. Never sweeps: that would kill every `sh`.
pub fn fake_config(dir: &Path) -> ToolConfig {
    let script = dir.join("fake_tool.sh");
    std::fs::write(&script, FAKE_TOOL).unwrap();
    let mut args = vec![script.to_string_lossy().into_owned()];
    args.extend(ToolConfig::default().args);
    ToolConfig {
        exe_path: Some(PathBuf::from("/bin/sh")),
        args,
        error_grace: Duration::from_millis(300),
        stop_timeout: Duration::from_secs(2),
        response_timeout: Duration::from_secs(5),
        startup_timeout: Duration::from_secs(5),
        sweep_on_stop: false,
        ..ToolConfig::default()
    }
}

/// A file whose content is the tool's tab-separated listing for it.
pub fn media(dir: &Path, name: &str, listing: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("{listing}\n")).unwrap();
    path
}

/// Lines of `exchanges.log`, oldest first.
pub fn exchanges(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("exchanges.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn kill_9(pid: u32) {
    let status = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}
