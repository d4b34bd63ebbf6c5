//! Unit tests for the archive strategy chain.

use super::*;
use crate::toolchain::{ToolCommand, ToolLimits};
use async_trait::async_trait;
use rstest::{fixture, rstest};
use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

#[fixture]
fn scratch() -> TempDir {
    tempfile::tempdir().expect("create scratch dir")
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .expect("add directory");
        } else {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(contents).expect("write entry");
        }
    }
    writer.finish().expect("finish zip");
}

fn push_vint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let low = u8::try_from(value & 0x7f).expect("seven bits fit in a byte");
        value >>= 7;
        if value == 0 {
            out.push(low);
            return;
        }
        out.push(low | 0x80);
    }
}

fn push_block(out: &mut Vec<u8>, header: &[u8], data: &[u8]) {
    out.extend_from_slice(&[0; 4]);
    push_vint(out, header.len() as u64);
    out.extend_from_slice(header);
    out.extend_from_slice(data);
}

/// Header of a stored file (type 2) or service (type 3) block.
fn entry_header(kind: u8, name: &str, contents: &[u8]) -> Vec<u8> {
    let mut header = vec![kind, 0x02];
    push_vint(&mut header, contents.len() as u64);
    header.push(0);
    push_vint(&mut header, contents.len() as u64);
    header.extend_from_slice(&[0, 0, 1]);
    push_vint(&mut header, name.len() as u64);
    header.extend_from_slice(name.as_bytes());
    header
}

/// Stored RAR5 archive with zeroed checksums, enough for header walks.
fn rar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut bytes = b"Rar!\x1a\x07\x01\x00".to_vec();
    push_block(&mut bytes, &[1, 0, 0], &[]);
    for (name, contents) in entries {
        push_block(&mut bytes, &entry_header(2, name, contents), contents);
    }
    push_block(&mut bytes, &[5, 0, 0], &[]);
    bytes
}

fn write_rar(path: &Path, entries: &[(&str, &[u8])]) {
    fs::write(path, rar_bytes(entries)).expect("write rar");
}

fn fake_tool(dir: &Path, name: &str, body: &str) -> ToolCommand {
    let script = dir.join(format!("{name}.sh"));
    fs::write(&script, body).expect("write fake tool");
    ToolCommand::new(name, "sh").with_prefix_arg(script)
}

fn library_only() -> ArchiveExtractor {
    ArchiveExtractor::new(Arc::new(ToolCapabilities::none()))
}

fn names(report: &ExtractionReport) -> Vec<&str> {
    report.extracted_files.iter().map(|path| path.as_str()).collect()
}

#[rstest]
#[tokio::test]
async fn library_extracts_nested_entries(scratch: TempDir) {
    let archive = scratch.path().join("parcels.zip");
    write_zip(
        &archive,
        &[
            ("parcel.shp", b"shp"),
            ("data/", b""),
            ("data/parcel.dbf", b"dbf"),
            ("parcel.shx", b"shx"),
        ],
    );
    let destination = scratch.path().join("out");
    let report = library_only()
        .extract(&archive, &destination)
        .await
        .expect("library extraction succeeds");

    assert_eq!(report.strategy_used, ExtractionStrategyKind::Library);
    assert_eq!(names(&report), ["data/parcel.dbf", "parcel.shp", "parcel.shx"]);
    assert_eq!(report.failed_attempts.len(), 1);
    assert_eq!(report.failed_attempts[0].strategy, ExtractionStrategyKind::NativeTool);
    assert_eq!(report.failed_attempts[0].detail, "unzip is not available");
    assert_eq!(
        fs::read(destination.join("data/parcel.dbf")).expect("read entry"),
        b"dbf"
    );
}

#[rstest]
#[tokio::test]
async fn extraction_is_idempotent(scratch: TempDir) {
    let archive = scratch.path().join("roads.zip");
    write_zip(&archive, &[("roads.geojson", b"{}"), ("meta/readme.txt", b"hi")]);
    let extractor = library_only();
    let first = extractor
        .extract(&archive, &scratch.path().join("first"))
        .await
        .expect("first extraction");
    let second = extractor
        .extract(&archive, &scratch.path().join("second"))
        .await
        .expect("second extraction");

    assert_eq!(first.extracted_files, second.extracted_files);
    for (left, right) in first.absolute_paths().zip(second.absolute_paths()) {
        assert_eq!(fs::read(left).expect("read"), fs::read(right).expect("read"));
    }
}

#[rstest]
#[case("../evil.shp")]
#[case("nested/../../evil.shp")]
#[tokio::test]
async fn rejects_traversal_without_fallback(scratch: TempDir, #[case] entry: &str) {
    let archive = scratch.path().join("hostile.zip");
    write_zip(&archive, &[("ok.shp", b"x"), (entry, b"boom")]);
    let calls = Arc::new(AtomicUsize::new(0));
    let extractor = ArchiveExtractor::with_strategies(vec![
        Box::new(CountingStrategy(Arc::clone(&calls))),
        Box::new(LibraryStrategy),
    ]);
    let destination = scratch.path().join("nested/out");
    let err = extractor
        .extract(&archive, &destination)
        .await
        .expect_err("hostile archive rejected");

    assert_eq!(err.kind(), "traversal_detected");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no strategy may run");
    assert!(!scratch.path().join("nested/evil.shp").exists());
    assert!(!scratch.path().join("evil.shp").exists());
}

#[rstest]
#[tokio::test]
async fn directories_only_is_a_failure(scratch: TempDir) {
    let archive = scratch.path().join("empty.zip");
    write_zip(&archive, &[("folder/", b""), ("folder/inner/", b"")]);
    let err = library_only()
        .extract(&archive, &scratch.path().join("out"))
        .await
        .expect_err("zero files is never success");

    assert_eq!(err.kind(), "extraction_failed");
    let attempts = err.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].detail, "extraction produced no files");
    assert!(err.to_string().contains("library: extraction produced no files"));
}

#[rstest]
#[tokio::test]
async fn corrupt_archive_reports_every_strategy(scratch: TempDir) {
    let archive = scratch.path().join("broken.zip");
    fs::write(&archive, b"definitely not a zip").expect("write archive");
    let err = library_only()
        .extract(&archive, &scratch.path().join("out"))
        .await
        .expect_err("corrupt archive fails");

    let strategies: Vec<_> = err.attempts().iter().map(|attempt| attempt.strategy).collect();
    assert_eq!(
        strategies,
        [ExtractionStrategyKind::NativeTool, ExtractionStrategyKind::Library]
    );
    assert!(err.attempts()[1].detail.starts_with("failed to read archive"));
}

#[rstest]
#[tokio::test]
async fn native_tool_wins_when_it_produces_files(scratch: TempDir) {
    let archive = scratch.path().join("parcels.zip");
    write_zip(&archive, &[("from-library.shp", b"x")]);
    let unzip = fake_tool(scratch.path(), "unzip", "echo native > \"$5/from-native.shp\"\n");
    let extractor =
        ArchiveExtractor::new(Arc::new(ToolCapabilities::none().with_unzip(unzip)));
    let report = extractor
        .extract(&archive, &scratch.path().join("out"))
        .await
        .expect("native extraction succeeds");

    assert_eq!(report.strategy_used, ExtractionStrategyKind::NativeTool);
    assert_eq!(names(&report), ["from-native.shp"]);
    assert!(report.failed_attempts.is_empty());
}

#[rstest]
#[tokio::test]
async fn partial_native_output_is_discarded_before_fallback(scratch: TempDir) {
    let archive = scratch.path().join("parcels.zip");
    write_zip(&archive, &[("parcel.shp", b"x")]);
    let unzip = fake_tool(
        scratch.path(),
        "unzip",
        "echo partial > \"$5/partial.dbf\"\necho 'crc error' >&2\nexit 2\n",
    );
    let extractor =
        ArchiveExtractor::new(Arc::new(ToolCapabilities::none().with_unzip(unzip)));
    let report = extractor
        .extract(&archive, &scratch.path().join("out"))
        .await
        .expect("library fallback succeeds");

    assert_eq!(report.strategy_used, ExtractionStrategyKind::Library);
    assert_eq!(names(&report), ["parcel.shp"]);
    assert!(report.failed_attempts[0].detail.contains("crc error"));
}

#[rstest]
#[tokio::test]
async fn native_timeout_falls_back_to_library(scratch: TempDir) {
    let archive = scratch.path().join("parcels.zip");
    write_zip(&archive, &[("parcel.shp", b"x")]);
    let unzip = fake_tool(scratch.path(), "unzip", "exec sleep 10\n");
    let capabilities = ToolCapabilities::none()
        .with_unzip(unzip)
        .with_limits(ToolLimits {
            timeout: Duration::from_millis(200),
            ..ToolLimits::default()
        });
    let report = ArchiveExtractor::new(Arc::new(capabilities))
        .extract(&archive, &scratch.path().join("out"))
        .await
        .expect("library fallback succeeds");

    assert_eq!(report.strategy_used, ExtractionStrategyKind::Library);
    assert!(report.failed_attempts[0].detail.contains("timed out"));
}

#[cfg(unix)]
#[rstest]
#[tokio::test]
async fn escaping_symlink_from_native_tool_is_fatal(scratch: TempDir) {
    let archive = scratch.path().join("parcels.zip");
    write_zip(&archive, &[("parcel.shp", b"x")]);
    let outside = scratch.path().join("outside.txt");
    fs::write(&outside, b"secret").expect("write outside file");
    let unzip = fake_tool(
        scratch.path(),
        "unzip",
        &format!("ln -s '{}' \"$5/link.shp\"\n", outside.display()),
    );
    let destination = scratch.path().join("out");
    let err = ArchiveExtractor::new(Arc::new(ToolCapabilities::none().with_unzip(unzip)))
        .extract(&archive, &destination)
        .await
        .expect_err("escaping symlink rejected");

    assert_eq!(err.kind(), "traversal_detected");
    assert_eq!(fs::read_dir(&destination).expect("read out").count(), 0);
}

#[rstest]
#[tokio::test]
async fn non_archive_paths_are_rejected(scratch: TempDir) {
    let err = library_only()
        .extract(Path::new("parcels.geojson"), scratch.path())
        .await
        .expect_err("not an archive");
    assert_eq!(err.kind(), "not_an_archive");
}

#[rstest]
#[tokio::test]
async fn existing_destination_contents_are_kept(scratch: TempDir) {
    let archive = scratch.path().join("parcels.zip");
    write_zip(&archive, &[("parcel.shp", b"x")]);
    let destination = scratch.path().join("out");
    fs::create_dir_all(&destination).expect("create destination");
    fs::write(destination.join("keep.txt"), b"mine").expect("write existing file");

    let err = library_only()
        .extract(&archive, &destination)
        .await
        .expect_err("occupied destination refused");

    assert_eq!(err.kind(), "destination_not_empty");
    assert_eq!(fs::read(destination.join("keep.txt")).expect("read"), b"mine");
}

#[rstest]
#[tokio::test]
async fn existing_empty_destination_is_reused(scratch: TempDir) {
    let archive = scratch.path().join("parcels.zip");
    write_zip(&archive, &[("parcel.shp", b"x")]);
    let destination = scratch.path().join("out");
    fs::create_dir_all(&destination).expect("create destination");

    let report = library_only()
        .extract(&archive, &destination)
        .await
        .expect("empty destination accepted");
    assert_eq!(names(&report), ["parcel.shp"]);
}

#[rstest]
fn lists_rar_entries_without_service_blocks() {
    let mut bytes = b"Rar!\x1a\x07\x01\x00".to_vec();
    push_block(&mut bytes, &[1, 0, 0], &[]);
    push_block(&mut bytes, &entry_header(2, "parcel/parcel.shp", b"shp"), b"shp");
    push_block(&mut bytes, &entry_header(3, "CMT", b"note"), b"note");
    push_block(&mut bytes, &entry_header(2, "parcel/parcel.dbf", b""), b"");
    push_block(&mut bytes, &[5, 0, 0], &[]);

    let names = rar_listing::read_entry_names(std::io::Cursor::new(bytes)).expect("walk headers");
    assert_eq!(names, ["parcel/parcel.shp", "parcel/parcel.dbf"]);
}

#[rstest]
#[case::rar4(b"Rar!\x1a\x07\x00\x00\x00\x00".to_vec())]
#[case::not_rar(b"PK\x03\x04 not a rar".to_vec())]
#[case::truncated(rar_bytes(&[("parcel.shp", b"shp")])[..20].to_vec())]
fn unlistable_rar_archives_are_errors(#[case] bytes: Vec<u8>) {
    let err = rar_listing::read_entry_names(std::io::Cursor::new(bytes))
        .expect_err("cannot list");
    assert!(
        matches!(
            err.kind(),
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
        ),
        "unexpected error: {err}"
    );
}

#[rstest]
#[tokio::test]
async fn rejects_rar_traversal_before_any_strategy(scratch: TempDir) {
    let archive = scratch.path().join("hostile.rar");
    write_rar(&archive, &[("ok.shp", b"x"), ("../evil.shp", b"boom")]);
    let calls = Arc::new(AtomicUsize::new(0));
    let extractor = ArchiveExtractor::with_strategies(vec![
        Box::new(CountingStrategy(Arc::clone(&calls))),
        Box::new(LibraryStrategy),
    ]);
    let destination = scratch.path().join("nested/out");
    let err = extractor
        .extract(&archive, &destination)
        .await
        .expect_err("hostile archive rejected");

    assert_eq!(err.kind(), "traversal_detected");
    assert!(err.to_string().contains("../evil.shp"));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no strategy may run");
    assert!(!scratch.path().join("nested/evil.shp").exists());
}

#[rstest]
#[tokio::test]
async fn library_strategy_refuses_escaping_rar_entries(scratch: TempDir) {
    let archive = scratch.path().join("hostile.rar");
    write_rar(&archive, &[("../evil.shp", b"boom")]);
    let destination = scratch.path().join("nested/out");
    fs::create_dir_all(&destination).expect("create destination");

    let err = LibraryStrategy
        .extract(&archive, ArchiveKind::Rar, &destination)
        .await
        .expect_err("escaping entry refused");

    assert!(
        matches!(&err, StrategyError::TraversalDetected { entry } if entry == "../evil.shp"),
        "unexpected error: {err}"
    );
    assert!(!scratch.path().join("nested/evil.shp").exists());
}

#[rstest]
#[tokio::test]
async fn library_strategy_needs_a_rar_listing(scratch: TempDir) {
    let archive = scratch.path().join("legacy.rar");
    fs::write(&archive, b"Rar!\x1a\x07\x00 legacy").expect("write archive");
    let destination = scratch.path().join("out");
    fs::create_dir_all(&destination).expect("create destination");

    let err = LibraryStrategy
        .extract(&archive, ArchiveKind::Rar, &destination)
        .await
        .expect_err("unlistable archive refused");

    assert!(err.to_string().contains("cannot list entries"), "unexpected error: {err}");
    assert_eq!(fs::read_dir(&destination).expect("read out").count(), 0);
}

#[rstest]
#[tokio::test]
async fn native_unrar_gets_destination_with_trailing_separator(scratch: TempDir) {
    let archive = scratch.path().join("parcels.rar");
    write_rar(&archive, &[("parcel.shp", b"shp")]);
    let recorded = scratch.path().join("args.txt");
    let unrar = fake_tool(
        scratch.path(),
        "unrar",
        &format!(
            "case \"$1\" in\n\
             lb) printf 'parcel.shp\\n' ;;\n\
             x) printf '%s\\n' \"$@\" > '{}'; echo native > \"${{5}}parcel.shp\" ;;\n\
             esac\n",
            recorded.display()
        ),
    );
    let destination = scratch.path().join("out");
    let report = ArchiveExtractor::new(Arc::new(ToolCapabilities::none().with_unrar(unrar)))
        .extract(&archive, &destination)
        .await
        .expect("native extraction succeeds");

    assert_eq!(report.strategy_used, ExtractionStrategyKind::NativeTool);
    assert_eq!(names(&report), ["parcel.shp"]);
    let args = fs::read_to_string(&recorded).expect("read recorded args");
    let expected_target = format!("{}{}", destination.display(), std::path::MAIN_SEPARATOR);
    let expected_archive = archive.display().to_string();
    assert_eq!(
        args.lines().collect::<Vec<_>>(),
        ["x", "-o+", "-idq", expected_archive.as_str(), expected_target.as_str()]
    );
}

#[rstest]
#[tokio::test]
async fn native_unrar_listing_blocks_traversal(scratch: TempDir) {
    // Unreadable by the header walk, so only the tool listing can see names.
    let archive = scratch.path().join("opaque.rar");
    fs::write(&archive, b"Rar!\x1a\x07\x00 legacy").expect("write archive");
    let extracted = scratch.path().join("extracted.txt");
    let unrar = fake_tool(
        scratch.path(),
        "unrar",
        &format!(
            "case \"$1\" in\n\
             lb) printf 'ok.shp\\n../evil.shp\\n' ;;\n\
             x) touch '{}' ;;\n\
             esac\n",
            extracted.display()
        ),
    );
    let err = ArchiveExtractor::new(Arc::new(ToolCapabilities::none().with_unrar(unrar)))
        .extract(&archive, &scratch.path().join("out"))
        .await
        .expect_err("hostile listing rejected");

    assert_eq!(err.kind(), "traversal_detected");
    assert!(!extracted.exists(), "extraction must not run");
}

#[rstest]
fn default_chain_tries_native_tool_first() {
    let kinds: Vec<_> = library_only().strategy_kinds().collect();
    assert_eq!(
        kinds,
        [ExtractionStrategyKind::NativeTool, ExtractionStrategyKind::Library]
    );
}

struct CountingStrategy(Arc<AtomicUsize>);

#[async_trait]
impl ExtractionStrategy for CountingStrategy {
    fn kind(&self) -> ExtractionStrategyKind {
        ExtractionStrategyKind::NativeTool
    }

    async fn extract(
        &self,
        _archive: &Path,
        _kind: ArchiveKind,
        _destination: &Path,
    ) -> Result<(), StrategyError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(StrategyError::ToolUnavailable {
            tool: "counting".to_owned(),
        })
    }
}
