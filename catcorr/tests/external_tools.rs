//! End-to-end runs through real child processes, with small shell scripts
//! standing in for the matching programs.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use catcorr::{
    Catalogue, Correlator, CorrelatorConfig, Entry, Error, ErrorKind, Position, ToolFailure,
};
use common::file_utils::list_files;

// Writing an executable while another test forks can leave the file busy at
// exec time, so script-driven tests run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

/// Copies the first min(len A, len B) rows of each input to `<outfile>.mtA/B`.
const ECHO_MATCH: &str = r#"
a="$1"
b="$5"
for arg in "$@"; do
    case "$arg" in
        outfile=*) out="${arg#outfile=}" ;;
    esac
done
n=$(grep -vc '^#' "$a")
m=$(grep -vc '^#' "$b")
[ "$m" -lt "$n" ] && n=$m
grep -v '^#' "$a" | head -n "$n" > "$out.mtA"
grep -v '^#' "$b" | head -n "$n" > "$out.mtB"
echo "echo-match paired $n rows"
"#;

/// Same pairing as `ECHO_MATCH`, but renumbers the id column like offsetgrid.
const ECHO_OFFSETGRID: &str = r#"
for arg in "$@"; do
    case "$arg" in
        ref=*) ref="${arg#ref=}" ;;
        in=*) inp="${arg#in=}" ;;
        out=*) out="${arg#out=}" ;;
    esac
done
n=$(grep -vc '^#' "$ref")
m=$(grep -vc '^#' "$inp")
[ "$m" -lt "$n" ] && n=$m
grep -v '^#' "$ref" | head -n "$n" | awk '{ $1 = NR + 100; print }' > "$out.ref.match"
grep -v '^#' "$inp" | head -n "$n" | awk '{ $1 = NR + 100; print }' > "$out.in.match"
"#;

struct Fixture {
    tools: tempfile::TempDir,
    work: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Result<Self> {
        Ok(Self {
            tools: tempfile::tempdir()?,
            work: tempfile::tempdir()?,
        })
    }

    fn install(&self, name: &str, body: &str) -> Result<PathBuf> {
        let path = self.tools.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    fn config(&self, method: &str) -> CorrelatorConfig {
        CorrelatorConfig {
            method: Some(method.to_string()),
            tool_dir: Some(self.tools.path().to_path_buf()),
            work_dir: Some(self.work.path().to_path_buf()),
            timeout_secs: Some(20.0),
            ..Default::default()
        }
    }

    fn work_files(&self) -> Result<Vec<PathBuf>> {
        Ok(list_files(self.work.path())?)
    }
}

fn catalogues() -> (Catalogue, Catalogue) {
    let a = Catalogue::from_entries(
        "left",
        vec![
            Entry::pixel(11, 100.0, 200.0).with_mag(12.5).with_annotation("first"),
            Entry::pixel(11, 300.0, 50.0).with_mag(13.0),
            Entry::pixel(12, 7.5, 8.25),
        ],
    );
    let b = Catalogue::from_entries(
        "right",
        vec![
            Entry::pixel(3, 101.0, 199.0).with_mag(12.4),
            Entry::pixel(4, 301.0, 49.0).with_mag(13.1),
        ],
    );
    (a, b)
}

fn correlate(config: &CorrelatorConfig) -> catcorr::Result<(Catalogue, Catalogue)> {
    let (a, b) = catalogues();
    Correlator::from_config(config, a, b)?.correlate()
}

fn assert_tool_failure(result: catcorr::Result<(Catalogue, Catalogue)>, check: fn(&ToolFailure) -> bool) {
    match result {
        Err(Error::ExternalTool { failure, .. }) => assert!(check(&failure), "unexpected {failure:?}"),
        other => panic!("expected an external tool error, got {other:?}"),
    }
}

#[test]
fn echo_match_reconciles_originals() -> Result<()> {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let fx = Fixture::new()?;
    fx.install("match", ECHO_MATCH)?;

    let (matched_a, matched_b) = correlate(&fx.config("pattern"))?;

    assert_eq!(matched_a.name(), "left-matched");
    assert_eq!(matched_a.identifiers(), vec![1, 2]);
    assert_eq!(matched_b.identifiers(), vec![1, 2]);
    assert_eq!(matched_a.entries()[0].annotation, "first");
    assert_eq!(matched_a.entries()[1].position, Position::Pixel { x: 300.0, y: 50.0 });
    assert_eq!(matched_b.entries()[1].magnitude("mag"), Some(13.1));
    assert!(fx.work_files()?.is_empty());
    Ok(())
}

#[test]
fn echo_offsetgrid_recovers_origins_from_tags() -> Result<()> {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let fx = Fixture::new()?;
    fx.install("offsetgrid", ECHO_OFFSETGRID)?;

    let (matched_a, matched_b) = correlate(&fx.config("offset"))?;

    assert_eq!(matched_a.len(), 2);
    assert_eq!(matched_a.entries()[1], Entry::pixel(2, 300.0, 50.0).with_mag(13.0));
    assert_eq!(matched_b.entries()[0], Entry::pixel(1, 101.0, 199.0).with_mag(12.4));
    Ok(())
}

#[test]
fn retained_artifacts_include_tool_output() -> Result<()> {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let fx = Fixture::new()?;
    fx.install("match", ECHO_MATCH)?;
    let config = CorrelatorConfig {
        keep_artifacts: true,
        ..fx.config("pattern")
    };

    correlate(&config)?;

    let files = fx.work_files()?;
    let stdout = files
        .iter()
        .find(|p| p.extension().is_some_and(|e| e == "stdout"))
        .ok_or_else(|| anyhow::anyhow!("no stdout capture in {files:?}"))?;
    assert_eq!(std::fs::read_to_string(stdout)?.trim(), "echo-match paired 2 rows");
    assert!(files.iter().any(|p| p.extension().is_some_and(|e| e == "mtA")));
    Ok(())
}

#[test]
fn nonzero_exit_surfaces_stderr() -> Result<()> {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let fx = Fixture::new()?;
    fx.install("match", "echo 'not enough stars for triangles' >&2\nexit 2\n")?;

    let err = correlate(&fx.config("pattern"))
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected a failure"))?;
    assert_eq!(err.kind(), ErrorKind::ExternalTool);
    assert_eq!(err.diagnostics(), "not enough stars for triangles");
    assert!(fx.work_files()?.is_empty());
    Ok(())
}

#[test]
fn hung_tool_is_killed_after_timeout() -> Result<()> {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let fx = Fixture::new()?;
    fx.install("offsetgrid", "exec sleep 30\n")?;
    let config = CorrelatorConfig {
        timeout_secs: Some(0.3),
        ..fx.config("offset")
    };

    let start = std::time::Instant::now();
    assert_tool_failure(correlate(&config), |f| matches!(f, ToolFailure::TimedOut(_)));
    assert!(start.elapsed().as_secs() < 15);
    assert!(fx.work_files()?.is_empty());
    Ok(())
}

#[test]
fn missing_result_tables_fail_the_call() -> Result<()> {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let fx = Fixture::new()?;
    fx.install("match", "exit 0\n")?;

    assert_tool_failure(correlate(&fx.config("pattern")), |f| {
        matches!(f, ToolFailure::MissingOutput(_))
    });
    assert!(fx.work_files()?.is_empty());
    Ok(())
}

#[test]
fn garbage_result_tables_are_malformed() -> Result<()> {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let fx = Fixture::new()?;
    fx.install(
        "match",
        "for arg in \"$@\"; do case \"$arg\" in outfile=*) out=\"${arg#outfile=}\" ;; esac; done\n\
         echo 'no stars here' > \"$out.mtA\"\n\
         echo 'no stars here' > \"$out.mtB\"\n",
    )?;

    assert_tool_failure(correlate(&fx.config("pattern")), |f| {
        matches!(f, ToolFailure::MalformedOutput { line: 1, .. })
    });
    Ok(())
}

#[test]
fn absent_tool_is_method_not_found() -> Result<()> {
    let fx = Fixture::new()?;
    let config = fx.config("pattern");
    if catcorr::tool::locate_executable("match", Some(fx.tools.path())).is_ok() {
        // A real `match` is installed on this machine.
        return Ok(());
    }

    let err = correlate(&config).err();
    assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::MethodNotFound));
    assert!(fx.work_files()?.is_empty());
    Ok(())
}

#[test]
fn binary_config_round_trips_through_yaml_file() -> Result<()> {
    let fx = Fixture::new()?;
    let path: PathBuf = fx.work.path().join("catcorr.yml");
    std::fs::write(&path, fx.config("triangle").to_yaml())?;

    let loaded = CorrelatorConfig::from_yaml_file(Path::new(&path))?;
    assert_eq!(loaded.method.as_deref(), Some("triangle"));
    assert_eq!(loaded.tool_dir.as_deref(), Some(fx.tools.path()));
    Ok(())
}
