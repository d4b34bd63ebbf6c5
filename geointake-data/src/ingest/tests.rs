//! Unit tests for request-level ingestion.

use super::*;
use rstest::{fixture, rstest};
use std::fs;
use std::io::Write;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const JAKARTA: &str = r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Point","coordinates":[106.8,-6.2]},"properties":{"name":"Jakarta"}}]}"#;

struct Request {
    uploads: TempDir,
    scratch: TempDir,
}

impl Request {
    fn upload(&self, name: &str, contents: &[u8]) -> UploadedFile {
        // Stored names are opaque, as they would be behind an upload layer.
        let index = fs::read_dir(self.uploads.path())
            .expect("list uploads")
            .count();
        let stored = self.uploads.path().join(format!("blob-{index}"));
        fs::write(&stored, contents).expect("write upload");
        UploadedFile::new(name, stored, contents.len() as u64)
    }

    fn zip_upload(&self, name: &str, entries: &[(&str, &[u8])]) -> UploadedFile {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            for (entry, contents) in entries {
                writer
                    .start_file(*entry, SimpleFileOptions::default())
                    .expect("start entry");
                writer.write_all(contents).expect("write entry");
            }
            writer.finish().expect("finish zip");
        }
        self.upload(name, buffer.get_ref())
    }

    fn orchestrator(&self) -> IngestionOrchestrator {
        IngestionOrchestrator::new(
            IngestSettings::default().with_scratch_root(self.scratch.path()),
            Arc::new(ToolCapabilities::none()),
        )
    }

    fn leftover_workspaces(&self) -> usize {
        fs::read_dir(self.scratch.path())
            .expect("list scratch root")
            .count()
    }
}

#[fixture]
fn request() -> Request {
    Request {
        uploads: tempfile::tempdir().expect("create uploads dir"),
        scratch: tempfile::tempdir().expect("create scratch root"),
    }
}

#[rstest]
#[tokio::test]
async fn standalone_geojson_completes(request: Request) {
    let upload = request.upload("jakarta.geojson", JAKARTA.as_bytes());
    let outcome = request
        .orchestrator()
        .ingest(&[upload])
        .await
        .expect("ingestion runs");

    let info = outcome.geospatial_info().expect("metadata derived");
    assert_eq!(info.feature_count, 1);
    assert_eq!(info.layer_name, "jakarta");
    assert_eq!(outcome.primary_file.as_deref(), Some("jakarta.geojson"));
    assert!(outcome.errors.is_empty());
    assert_eq!(request.leftover_workspaces(), 0);
}

#[rstest]
#[tokio::test]
async fn zipped_shapefile_without_gdal_is_metadata_incomplete(request: Request) {
    let upload = request.zip_upload(
        "parcels.zip",
        &[
            ("parcel/parcel.shp", b"shp"),
            ("parcel/parcel.shx", b"shx"),
            ("parcel/parcel.dbf", b"dbf"),
            ("parcel/parcel.prj", b"prj"),
        ],
    );
    let outcome = request
        .orchestrator()
        .ingest(&[upload])
        .await
        .expect("ingestion runs");

    assert!(outcome.is_metadata_incomplete());
    assert_eq!(outcome.primary_file.as_deref(), Some("parcels.zip/parcel/parcel.shp"));
    let summary = &outcome.archives[0];
    assert!(summary.shapefile.accepted);
    assert_eq!(summary.extraction.extracted_files.len(), 4);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].category, IssueCategory::GeospatialExtraction);
    assert_eq!(outcome.errors[0].error_kind, "tool_unavailable");
    assert_eq!(request.leftover_workspaces(), 0);
}

#[rstest]
#[tokio::test]
async fn zipped_auxiliary_files_are_rejected(request: Request) {
    let upload = request.zip_upload("aux.zip", &[("parcel.prj", b"prj"), ("parcel.cpg", b"cpg")]);
    let outcome = request
        .orchestrator()
        .ingest(&[upload])
        .await
        .expect("ingestion runs");

    let rejection = outcome.rejection().expect("rejected");
    assert_eq!(rejection.category, IssueCategory::ShapefileIncomplete);
    assert_eq!(rejection.error_kind, "aux_without_core");
    assert_eq!(rejection.missing_files, [".shp", ".shx", ".dbf"]);
    assert_eq!(rejection.file.as_deref(), Some("aux.zip"));
    assert!(outcome.primary_file.is_none());
}

#[rstest]
#[tokio::test]
async fn standalone_shapefile_members_are_validated_together(request: Request) {
    let uploads = [
        request.upload("roads.shp", b"shp"),
        request.upload("roads.dbf", b"dbf"),
    ];
    let outcome = request
        .orchestrator()
        .ingest(&uploads)
        .await
        .expect("ingestion runs");

    let rejection = outcome.rejection().expect("rejected");
    assert_eq!(rejection.error_kind, "missing_shx");
    assert_eq!(rejection.missing_files, [".shx"]);
    assert!(rejection.file.is_none());
}

#[rstest]
#[tokio::test]
async fn traversal_rejects_the_request(request: Request) {
    let upload = request.zip_upload("evil.zip", &[("../evil.shp", b"x")]);
    let outcome = request
        .orchestrator()
        .ingest(&[upload])
        .await
        .expect("ingestion runs");

    let rejection = outcome.rejection().expect("rejected");
    assert_eq!(rejection.category, IssueCategory::Extraction);
    assert_eq!(rejection.error_kind, "traversal_detected");
    assert_eq!(request.leftover_workspaces(), 0);
}

#[rstest]
#[tokio::test]
async fn unsupported_uploads_are_reported_but_not_fatal(request: Request) {
    let uploads = [
        request.upload("readme.txt", b"notes"),
        request.upload("jakarta.geojson", JAKARTA.as_bytes()),
    ];
    let outcome = request
        .orchestrator()
        .ingest(&uploads)
        .await
        .expect("ingestion runs");

    assert!(outcome.geospatial_info().is_some());
    assert_eq!(outcome.files.len(), 2);
    assert_eq!(outcome.files[0].format, FileFormat::Unknown);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].error_kind, "unsupported_format");
    assert_eq!(outcome.errors[0].file.as_deref(), Some("readme.txt"));
}

#[rstest]
#[tokio::test]
async fn nothing_supported_is_rejected(request: Request) {
    let outcome = request
        .orchestrator()
        .ingest(&[request.upload("map.kml", b"<kml/>")])
        .await
        .expect("ingestion runs");

    let rejection = outcome.rejection().expect("rejected");
    assert_eq!(rejection.error_kind, "no_supported_files");
    let kinds: Vec<_> = outcome.errors.iter().map(|issue| issue.error_kind).collect();
    assert_eq!(kinds, ["unsupported_format", "no_supported_files"]);
}

#[rstest]
#[tokio::test]
async fn empty_request_is_rejected(request: Request) {
    let outcome = request
        .orchestrator()
        .ingest(&[])
        .await
        .expect("ingestion runs");
    assert_eq!(
        outcome.rejection().map(|issue| issue.error_kind),
        Some("no_supported_files")
    );
}

#[rstest]
#[tokio::test]
async fn shapefile_is_preferred_over_geojson(request: Request) {
    let uploads = [
        request.upload("jakarta.geojson", JAKARTA.as_bytes()),
        request.zip_upload(
            "roads.zip",
            &[("roads.shp", b"shp"), ("roads.shx", b"shx"), ("roads.dbf", b"dbf")],
        ),
    ];
    let outcome = request
        .orchestrator()
        .ingest(&uploads)
        .await
        .expect("ingestion runs");
    assert_eq!(outcome.primary_file.as_deref(), Some("roads.zip/roads.shp"));
}

#[rstest]
#[tokio::test]
async fn outcome_serialises_with_status_tag(request: Request) {
    let upload = request.upload("jakarta.geojson", JAKARTA.as_bytes());
    let outcome = request
        .orchestrator()
        .ingest(&[upload])
        .await
        .expect("ingestion runs");

    let json = serde_json::to_value(&outcome).expect("serialise outcome");
    assert_eq!(json["status"], "complete");
    assert_eq!(json["geospatialInfo"]["layerName"], "jakarta");
    assert_eq!(json["primaryFile"], "jakarta.geojson");
    assert_eq!(json["files"][0]["format"], "geojson");
    assert_eq!(json["files"][0]["label"], "GeoJSON");
}

#[rstest]
#[tokio::test]
async fn geojson_document_wins_over_json_sidecar(request: Request) {
    let upload = request.zip_upload(
        "survey.zip",
        &[("a_meta.json", b"{\"source\": \"drone\"}"), ("b.geojson", JAKARTA.as_bytes())],
    );
    let outcome = request
        .orchestrator()
        .ingest(&[upload])
        .await
        .expect("ingestion runs");

    assert_eq!(outcome.primary_file.as_deref(), Some("survey.zip/b.geojson"));
    assert_eq!(outcome.geospatial_info().map(|info| info.feature_count), Some(1));
}

#[rstest]
#[tokio::test]
async fn later_bad_archive_rejects_the_request(request: Request) {
    let uploads = [
        request.zip_upload("good.zip", &[("jakarta.geojson", JAKARTA.as_bytes())]),
        request.zip_upload("bad.zip", &[("../evil.shp", b"x")]),
    ];
    let outcome = request
        .orchestrator()
        .ingest(&uploads)
        .await
        .expect("ingestion runs");

    let rejection = outcome.rejection().expect("rejected");
    assert_eq!(rejection.error_kind, "traversal_detected");
    assert_eq!(rejection.file.as_deref(), Some("bad.zip"));
    assert_eq!(outcome.archives.len(), 1);
    assert_eq!(outcome.archives[0].name, "good.zip");
    assert_eq!(request.leftover_workspaces(), 0);
}

#[rstest]
#[tokio::test]
async fn first_failing_archive_in_input_order_is_reported(request: Request) {
    let uploads = [
        request.upload("broken.zip", b"definitely not a zip"),
        request.zip_upload("evil.zip", &[("../evil.shp", b"x")]),
    ];
    let outcome = request
        .orchestrator()
        .ingest(&uploads)
        .await
        .expect("ingestion runs");

    let rejection = outcome.rejection().expect("rejected");
    assert_eq!(rejection.error_kind, "extraction_failed");
    assert_eq!(rejection.file.as_deref(), Some("broken.zip"));
    let kinds: Vec<_> = outcome.errors.iter().map(|issue| issue.error_kind).collect();
    assert_eq!(kinds, ["extraction_failed"]);
}

#[rstest]
#[tokio::test]
async fn every_archive_is_summarised(request: Request) {
    let uploads = [
        request.zip_upload(
            "roads.zip",
            &[("roads.shp", b"shp"), ("roads.shx", b"shx"), ("roads.dbf", b"dbf")],
        ),
        request.zip_upload("city.zip", &[("jakarta.geojson", JAKARTA.as_bytes())]),
    ];
    let outcome = request
        .orchestrator()
        .ingest(&uploads)
        .await
        .expect("ingestion runs");

    let names: Vec<_> = outcome.archives.iter().map(|summary| summary.name.as_str()).collect();
    assert_eq!(names, ["roads.zip", "city.zip"]);
    assert_eq!(outcome.primary_file.as_deref(), Some("roads.zip/roads.shp"));
}

#[rstest]
#[case(&["data.geojson", "notes.dbf", "roads.shp"], "roads.shp")]
#[case(&["notes.dbf", "b.json", "a.geojson"], "a.geojson")]
#[case(&["notes.dbf", "meta.JSON"], "meta.JSON")]
#[case(&["notes.dbf", "notes.prj"], "notes.dbf")]
#[case(&["pack.zip/A.SHP", "pack.zip/a.shx"], "pack.zip/A.SHP")]
fn primary_selection_prefers_shp_then_geojson(#[case] names: &[&str], #[case] expected: &str) {
    let candidates: Vec<Candidate> = names
        .iter()
        .map(|name| Candidate {
            display_name: (*name).to_owned(),
            path: PathBuf::from(name),
        })
        .collect();
    let primary = select_primary(&candidates).expect("non-empty");
    assert_eq!(primary.display_name, expected);
}
