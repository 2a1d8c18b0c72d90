mod test_support;

use serde_json::json;
use test_support::{create_student, create_subject, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn report_card_combines_results_ratings_attendance_and_branding() {
    let workspace = temp_dir("schoold-report-card");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({
            "section": "school",
            "patch": {
                "schoolName": "Greenfield Academy",
                "motto": "Knowledge and Service",
                "termLabel": "First Term",
                "sessionLabel": "2026/2027"
            }
        }),
    );

    let amaka = create_student(&mut stdin, &mut reader, "3", "Amaka Obi", "JSS3");
    let femi = create_student(&mut stdin, &mut reader, "4", "Femi Ola", "JSS3");
    let science = create_subject(&mut stdin, &mut reader, "5", "Basic Science");
    let agric = create_subject(&mut stdin, &mut reader, "6", "Agriculture");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "results.upsert",
        json!({
            "className": "JSS3",
            "subjectId": science,
            "rows": [
                { "studentId": amaka, "firstCA": 16, "secondCA": 18, "exam": 50 },
                { "studentId": femi, "firstCA": 12, "secondCA": 10, "exam": 40 }
            ]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "results.upsert",
        json!({
            "className": "JSS3",
            "subjectId": agric,
            "rows": [
                { "studentId": amaka, "firstCA": 10, "secondCA": 10, "exam": 35 },
                { "studentId": femi, "firstCA": 15, "secondCA": 15, "exam": 45 }
            ]
        }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "ratings.set",
        json!({
            "studentId": amaka,
            "affective": [{ "trait": "Punctuality", "value": 5 }, { "trait": "Neatness", "value": 4 }],
            "psychomotor": [{ "trait": "Handwriting", "value": 3 }]
        }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "10",
            "ratings.set",
            json!({ "studentId": amaka, "affective": [{ "trait": "Honesty", "value": 6 }] }),
        ),
        "bad_params"
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "reports.meta.update",
        json!({
            "studentId": amaka,
            "daysOpened": 120,
            "daysPresent": 114,
            "teacherComment": "A diligent student."
        }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "12",
            "reports.meta.update",
            json!({ "studentId": amaka, "daysPresent": 130 }),
        ),
        "bad_params"
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "reports.reportCard",
        json!({ "studentId": amaka }),
    );
    let card = &result["reportCard"];
    assert_eq!(card["school"]["schoolName"], json!("Greenfield Academy"));
    assert_eq!(card["student"]["className"], json!("JSS3"));

    let cognitive = card["cognitive"].as_array().expect("cognitive");
    let names: Vec<&str> = cognitive
        .iter()
        .filter_map(|r| r["subjectName"].as_str())
        .collect();
    assert_eq!(names, vec!["Agriculture", "Basic Science"]);
    assert_eq!(cognitive[0]["total"].as_f64(), Some(55.0));
    assert_eq!(cognitive[0]["grade"], json!("C"));
    assert_eq!(cognitive[0]["subjectPosition"], json!(2));
    assert_eq!(cognitive[1]["total"].as_f64(), Some(84.0));
    assert_eq!(cognitive[1]["subjectPosition"], json!(1));
    assert_eq!(cognitive[1]["highest"].as_f64(), Some(84.0));
    assert_eq!(cognitive[1]["lowest"].as_f64(), Some(62.0));

    // 139 of 200 for Amaka, 137 of 200 for Femi.
    assert_eq!(card["performance"]["percentage"].as_f64(), Some(69.5));
    assert_eq!(card["performance"]["grade"], json!("B"));
    assert_eq!(card["performance"]["position"], json!(1));
    assert_eq!(card["performance"]["classSize"], json!(2));

    assert_eq!(card["affective"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(card["psychomotor"][0]["trait"], json!("Handwriting"));
    assert_eq!(card["attendance"]["daysAbsent"], json!(6));
    assert_eq!(card["comments"]["teacher"], json!("A diligent student."));
    assert!(card["comments"]["principal"].is_null());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn report_card_without_results_has_no_performance() {
    let workspace = temp_dir("schoold-report-card-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let lone = create_student(&mut stdin, &mut reader, "2", "New Entrant", "JSS1");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.reportCard",
        json!({ "studentId": lone }),
    );
    assert_eq!(result["reportCard"]["cognitive"], json!([]));
    assert!(result["reportCard"]["performance"].is_null());
    assert!(result["reportCard"]["attendance"]["daysAbsent"].is_null());

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "reports.reportCard",
            json!({ "studentId": "stu-missing" }),
        ),
        "not_found"
    );

    let _ = std::fs::remove_dir_all(workspace);
}
