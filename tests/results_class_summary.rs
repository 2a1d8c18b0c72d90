mod test_support;

use serde_json::json;
use test_support::{create_student, create_subject, request_err, request_ok, spawn_sidecar, temp_dir};

fn summary_for<'a>(summary: &'a serde_json::Value, student_id: &str) -> &'a serde_json::Value {
    summary
        .get("students")
        .and_then(|v| v.as_array())
        .and_then(|rows| {
            rows.iter()
                .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(student_id))
        })
        .unwrap_or_else(|| panic!("no summary for {}", student_id))
}

#[test]
fn class_summary_ranks_shares_ties_and_grades() {
    let workspace = temp_dir("schoold-results-summary");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let s1 = create_student(&mut stdin, &mut reader, "2", "Chidi Okafor", "JSS1");
    let s2 = create_student(&mut stdin, &mut reader, "3", "Bola Adeyemi", "JSS1");
    let s3 = create_student(&mut stdin, &mut reader, "4", "Emeka Nwosu", "JSS1");
    let math = create_subject(&mut stdin, &mut reader, "5", "Mathematics");
    let english = create_subject(&mut stdin, &mut reader, "6", "English");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "results.upsert",
        json!({
            "className": "JSS1",
            "subjectId": math,
            "rows": [
                { "studentId": s1, "firstCA": 15, "secondCA": 12, "exam": 50 },
                { "studentId": s2, "firstCA": 18, "secondCA": 17, "exam": 55 },
                { "studentId": s3, "firstCA": 10, "secondCA": 10, "exam": 30 }
            ]
        }),
    );
    let totals: Vec<f64> = saved["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|r| r["total"].as_f64().expect("total"))
        .collect();
    assert_eq!(totals, vec![77.0, 90.0, 50.0]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "results.upsert",
        json!({
            "className": "JSS1",
            "subjectId": english,
            "rows": [
                { "studentId": s1, "firstCA": 14, "secondCA": 14, "exam": 45 },
                { "studentId": s2, "firstCA": 10, "secondCA": 10, "exam": 40 },
                { "studentId": s3, "firstCA": 15, "secondCA": 15, "exam": 50 }
            ]
        }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "results.classSummary",
        json!({ "className": "JSS1" }),
    );
    assert_eq!(summary["classSize"], json!(3));
    assert_eq!(summary["classAverage"].as_f64(), Some(71.67));

    let first = summary_for(&summary, &s1);
    let second = summary_for(&summary, &s2);
    let third = summary_for(&summary, &s3);
    assert_eq!(first["overallTotal"].as_f64(), Some(150.0));
    assert_eq!(first["percentage"].as_f64(), Some(75.0));
    assert_eq!(first["position"], json!(1));
    assert_eq!(second["position"], json!(1));
    assert_eq!(third["position"], json!(3));
    assert_eq!(first["grade"], json!("A"));
    assert_eq!(third["percentage"].as_f64(), Some(65.0));
    assert_eq!(third["grade"], json!("B"));
    assert_eq!(third["studentName"], json!("Emeka Nwosu"));

    let math_stats = summary["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .find(|s| s["subjectId"] == json!(math))
        .expect("math stats");
    assert_eq!(math_stats["highest"].as_f64(), Some(90.0));
    assert_eq!(math_stats["lowest"].as_f64(), Some(50.0));
    assert_eq!(math_stats["subjectName"], json!("Mathematics"));

    // Re-saving a row replaces it rather than adding a second one.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "results.upsert",
        json!({
            "className": "JSS1",
            "subjectId": math,
            "rows": [{ "studentId": s3, "firstCA": 20, "secondCA": 20, "exam": 60 }]
        }),
    );
    let rows = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "results.get",
        json!({ "className": "JSS1", "subjectId": math }),
    );
    let rows = rows["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    let s3_row = rows
        .iter()
        .find(|r| r["studentId"] == json!(s3))
        .expect("s3 row");
    assert_eq!(s3_row["total"].as_f64(), Some(100.0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn upsert_rejects_scores_beyond_component_limits() {
    let workspace = temp_dir("schoold-results-limits");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let s1 = create_student(&mut stdin, &mut reader, "2", "Ngozi Eze", "JSS2");
    let other = create_student(&mut stdin, &mut reader, "3", "Tunde Bello", "JSS3");
    let math = create_subject(&mut stdin, &mut reader, "4", "Mathematics");

    let over = test_support::request(
        &mut stdin,
        &mut reader,
        "5",
        "results.upsert",
        json!({
            "className": "JSS2",
            "subjectId": math,
            "rows": [{ "studentId": s1, "firstCA": 21, "secondCA": 10, "exam": 40 }]
        }),
    );
    assert_eq!(over.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_params"));
    assert_eq!(over.pointer("/error/details/field").and_then(|v| v.as_str()), Some("firstCA"));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "6",
            "results.upsert",
            json!({
                "className": "JSS2",
                "subjectId": math,
                "rows": [{ "studentId": s1, "firstCA": -1, "secondCA": 10, "exam": 40 }]
            }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "7",
            "results.upsert",
            json!({
                "className": "JSS2",
                "subjectId": math,
                "rows": [{ "studentId": other, "firstCA": 10, "secondCA": 10, "exam": 40 }]
            }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "results.upsert",
            json!({
                "className": "JSS2",
                "subjectId": "sub-missing",
                "rows": []
            }),
        ),
        "not_found"
    );

    // Nothing from the rejected batches was written.
    let rows = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "results.get",
        json!({ "className": "JSS2", "subjectId": math }),
    );
    assert_eq!(rows["rows"], json!([]));

    // Raising the exam maximum admits a score the default limit refused.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "setup.update",
        json!({ "section": "assessment", "patch": { "examMax": 70 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "results.upsert",
        json!({
            "className": "JSS2",
            "subjectId": math,
            "rows": [{ "studentId": s1, "firstCA": 10, "secondCA": 10, "exam": 65 }]
        }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}
