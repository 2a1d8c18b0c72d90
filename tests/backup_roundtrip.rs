mod test_support;

use serde_json::json;
use std::fs::File;
use std::io::Read;
use test_support::{create_student, request_err, request_ok, spawn_sidecar, str_at, temp_dir};

#[test]
fn export_then_import_restores_workspace_state() {
    let workspace = temp_dir("schoold-backup-src");
    let out_dir = temp_dir("schoold-backup-out");
    let bundle = out_dir.join("workspace.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "0",
            "backup.export",
            json!({ "outPath": bundle.to_string_lossy() }),
        ),
        "no_workspace"
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let kept = create_student(&mut stdin, &mut reader, "2", "Kept Student", "JSS1");

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export["bundleFormat"], json!("schoold-workspace-v1"));
    assert_eq!(export["entryCount"], json!(2));
    let sha = str_at(&export, "/dbSha256").to_string();

    let f = File::open(&bundle).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(&sha));
    archive
        .by_name("db/schoold.sqlite3")
        .expect("database entry in bundle");

    // Changes after the export are rolled back by the import.
    let _ = create_student(&mut stdin, &mut reader, "4", "Later Student", "JSS1");
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.import",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(imported["dbSha256"], json!(sha));

    let students = request_ok(&mut stdin, &mut reader, "6", "students.list", json!({}));
    let ids: Vec<&str> = students["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["id"].as_str())
        .collect();
    assert_eq!(ids, vec![kept.as_str()]);

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "7",
            "backup.import",
            json!({ "inPath": out_dir.join("missing.zip").to_string_lossy() }),
        ),
        "not_found"
    );

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn import_rejects_bundle_with_wrong_format() {
    let workspace = temp_dir("schoold-backup-bad");
    let bundle = workspace.join("foreign.zip");
    {
        use std::io::Write;
        let file = File::create(&bundle).expect("create bundle");
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("manifest.json", zip::write::FileOptions::default())
            .expect("start manifest");
        zip.write_all(br#"{"format":"someone-else-v9","dbSha256":"00"}"#)
            .expect("write manifest");
        zip.finish().expect("finish zip");
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student = create_student(&mut stdin, &mut reader, "2", "Still Here", "JSS1");
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "backup.import",
            json!({ "inPath": bundle.to_string_lossy() }),
        ),
        "io_failed"
    );
    // The failed import leaves the workspace usable.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.get",
        json!({ "studentId": student }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}
