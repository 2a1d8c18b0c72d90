use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{db_conn, opt_i64, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, Rating, Ratings, ReportInputs, ReportMeta, StudentIdentity};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;

use super::grading::load_scale;
use super::results::{load_class_rows, subject_names};
use super::setup::{load_branding, load_component_max};
use super::students::load_student;

const DOMAIN_AFFECTIVE: &str = "affective";
const DOMAIN_PSYCHOMOTOR: &str = "psychomotor";
const RATING_MIN: i64 = 1;
const RATING_MAX: i64 = 5;

fn load_ratings(conn: &Connection, student_id: &str) -> Result<Ratings, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT domain, trait, value
         FROM student_ratings
         WHERE student_id = ?
         ORDER BY domain, trait",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                Rating {
                    trait_name: r.get(1)?,
                    value: r.get(2)?,
                },
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut out = Ratings::default();
    for (domain, rating) in rows {
        match domain.as_str() {
            DOMAIN_AFFECTIVE => out.affective.push(rating),
            DOMAIN_PSYCHOMOTOR => out.psychomotor.push(rating),
            _ => {}
        }
    }
    Ok(out)
}

fn load_meta(conn: &Connection, student_id: &str) -> Result<ReportMeta, HandlerErr> {
    let meta = conn
        .query_row(
            "SELECT days_opened, days_present, teacher_comment, principal_comment
             FROM report_meta
             WHERE student_id = ?",
            [student_id],
            |r| {
                Ok(ReportMeta {
                    days_opened: r.get(0)?,
                    days_present: r.get(1)?,
                    teacher_comment: r.get(2)?,
                    principal_comment: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(meta.unwrap_or_default())
}

/// `None` when the domain key is absent, so the stored domain is left alone.
fn parse_domain(params: &serde_json::Value, key: &str) -> Result<Option<Vec<Rating>>, HandlerErr> {
    let Some(raw) = params.get(key) else {
        return Ok(None);
    };
    let arr = raw
        .as_array()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array", key)))?;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        let trait_name = required_str(item, "trait")
            .map_err(|e| HandlerErr::bad_params(format!("{}[{}]: {}", key, i, e)))?;
        let value = item
            .get("value")
            .and_then(|v| v.as_i64())
            .filter(|v| (RATING_MIN..=RATING_MAX).contains(v))
            .ok_or_else(|| {
                HandlerErr::bad_params(format!(
                    "{}[{}].value must be an integer in {}..={}",
                    key, i, RATING_MIN, RATING_MAX
                ))
            })?;
        if !seen.insert(trait_name.to_ascii_lowercase()) {
            return Err(HandlerErr::bad_params(format!(
                "{}[{}]: trait {} appears more than once",
                key, i, trait_name
            )));
        }
        out.push(Rating { trait_name, value });
    }
    Ok(Some(out))
}

fn handle_ratings_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    load_student(conn, &student_id)?;
    let ratings = load_ratings(conn, &student_id)?;
    Ok(json!(ratings))
}

fn handle_ratings_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    load_student(conn, &student_id)?;
    let affective = parse_domain(&req.params, DOMAIN_AFFECTIVE)?;
    let psychomotor = parse_domain(&req.params, DOMAIN_PSYCHOMOTOR)?;
    if affective.is_none() && psychomotor.is_none() {
        return Err(HandlerErr::bad_params(
            "provide affective and/or psychomotor ratings",
        ));
    }

    let tx = conn.unchecked_transaction()?;
    for (domain, ratings) in [(DOMAIN_AFFECTIVE, affective), (DOMAIN_PSYCHOMOTOR, psychomotor)] {
        let Some(ratings) = ratings else {
            continue;
        };
        tx.execute(
            "DELETE FROM student_ratings WHERE student_id = ? AND domain = ?",
            (&student_id, domain),
        )?;
        for r in &ratings {
            tx.execute(
                "INSERT INTO student_ratings(student_id, domain, trait, value) VALUES(?, ?, ?, ?)",
                (&student_id, domain, &r.trait_name, r.value),
            )?;
        }
    }
    tx.commit()?;
    Ok(json!(load_ratings(conn, &student_id)?))
}

fn handle_meta_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    load_student(conn, &student_id)?;
    let mut meta = load_meta(conn, &student_id)?;

    let p = &req.params;
    if p.get("daysOpened").is_some() {
        meta.days_opened = opt_i64(p, "daysOpened")?;
    }
    if p.get("daysPresent").is_some() {
        meta.days_present = opt_i64(p, "daysPresent")?;
    }
    if p.get("teacherComment").is_some() {
        meta.teacher_comment = opt_str(p, "teacherComment")?;
    }
    if p.get("principalComment").is_some() {
        meta.principal_comment = opt_str(p, "principalComment")?;
    }

    if meta.days_opened.is_some_and(|d| d < 0) || meta.days_present.is_some_and(|d| d < 0) {
        return Err(HandlerErr::bad_params("attendance days must not be negative"));
    }
    if let (Some(opened), Some(present)) = (meta.days_opened, meta.days_present) {
        if present > opened {
            return Err(HandlerErr::bad_params(
                "daysPresent must not exceed daysOpened",
            ));
        }
    }

    conn.execute(
        "INSERT INTO report_meta(student_id, days_opened, days_present, teacher_comment, principal_comment)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           days_opened = excluded.days_opened,
           days_present = excluded.days_present,
           teacher_comment = excluded.teacher_comment,
           principal_comment = excluded.principal_comment",
        (
            &student_id,
            meta.days_opened,
            meta.days_present,
            &meta.teacher_comment,
            &meta.principal_comment,
        ),
    )?;
    Ok(json!(meta))
}

fn handle_report_card(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let student = load_student(conn, &student_id)?;
    // Past classes can be requested explicitly, e.g. after promotion.
    let class_name = opt_str(&req.params, "className")?.unwrap_or_else(|| student.class_name.clone());

    let rows = load_class_rows(conn, &class_name)?;
    let names = subject_names(conn)?;
    let scale = load_scale(conn)?;
    let card = report::assemble_report_card(ReportInputs {
        student: StudentIdentity {
            id: student.id.clone(),
            name: student.name.clone(),
            class_name,
            status: student.status.as_str().to_string(),
        },
        branding: load_branding(conn)?,
        subject_names: &names,
        class_rows: &rows,
        max: load_component_max(conn)?,
        scale: &scale,
        ratings: load_ratings(conn, &student_id)?,
        meta: load_meta(conn, &student_id)?,
    });
    Ok(json!({ "reportCard": card }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "ratings.get" => handle_ratings_get(state, req),
        "ratings.set" => handle_ratings_set(state, req),
        "reports.meta.update" => handle_meta_update(state, req),
        "reports.reportCard" => handle_report_card(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
