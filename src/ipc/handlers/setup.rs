use crate::calc::ComponentMax;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{db_conn, patch_obj, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::SchoolBranding;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    School,
    Assessment,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "assessment" => Some(Self::Assessment),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::School => "setup.school",
            Self::Assessment => "setup.assessment",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::School => json!({
            "schoolName": "",
            "address": "",
            "motto": "",
            "logoUrl": null,
            "principalName": "",
            "termLabel": "First Term",
            "sessionLabel": "",
            "nextTermBegins": null
        }),
        SetupSection::Assessment => {
            let d = ComponentMax::default();
            json!({
                "firstCaMax": d.first_ca_max,
                "secondCaMax": d.second_ca_max,
                "examMax": d.exam_max
            })
        }
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_nullable_string_max(v: &Value, key: &str, max_len: usize) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = parse_string_max(v, key, max_len)?;
    if s.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(s))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::School => match k.as_str() {
                "schoolName" | "principalName" | "termLabel" | "sessionLabel" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "address" | "motto" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 240)?));
                }
                "logoUrl" => {
                    obj.insert(k.clone(), parse_nullable_string_max(v, k, 500)?);
                }
                "nextTermBegins" => {
                    let parsed = parse_nullable_string_max(v, k, 10)?;
                    if let Some(s) = parsed.as_str() {
                        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .map_err(|_| format!("{} must be YYYY-MM-DD", k))?;
                    }
                    obj.insert(k.clone(), parsed);
                }
                _ => return Err(format!("unknown school field: {}", k)),
            },
            SetupSection::Assessment => match k.as_str() {
                "firstCaMax" | "secondCaMax" | "examMax" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                _ => return Err(format!("unknown assessment field: {}", k)),
            },
        }
    }
    if let SetupSection::Assessment = section {
        let sum: f64 = ["firstCaMax", "secondCaMax", "examMax"]
            .iter()
            .filter_map(|k| obj.get(*k).and_then(|v| v.as_f64()))
            .sum();
        if sum <= 0.0 {
            return Err("assessment maxima must not all be zero".into());
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to the defaults.
            let mut candidate = current.clone();
            if merge_section_patch(section, &mut candidate, saved_obj).is_ok() {
                current = candidate;
            } else {
                tracing::warn!(key = section.key(), "ignoring malformed saved settings");
            }
        }
    }
    Ok(current)
}

pub fn load_component_max(conn: &Connection) -> Result<ComponentMax, HandlerErr> {
    let v = load_section(conn, SetupSection::Assessment)
        .map_err(|e| HandlerErr::failed("db_query_failed", e))?;
    serde_json::from_value(v).map_err(|e| HandlerErr::failed("db_query_failed", e.into()))
}

pub fn load_branding(conn: &Connection) -> Result<SchoolBranding, HandlerErr> {
    let v = load_section(conn, SetupSection::School)
        .map_err(|e| HandlerErr::failed("db_query_failed", e))?;
    serde_json::from_value(v).map_err(|e| HandlerErr::failed("db_query_failed", e.into()))
}

/// Refuses maxima that would leave already stored scores above their limit.
fn check_maxima_cover_stored_scores(conn: &Connection, assessment: &Value) -> Result<(), HandlerErr> {
    let stored: (Option<f64>, Option<f64>, Option<f64>) = conn.query_row(
        "SELECT MAX(first_ca), MAX(second_ca), MAX(exam) FROM subject_results",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    for (key, highest) in [
        ("firstCaMax", stored.0),
        ("secondCaMax", stored.1),
        ("examMax", stored.2),
    ] {
        let (Some(highest), Some(max)) = (highest, assessment.get(key).and_then(|v| v.as_f64()))
        else {
            continue;
        };
        if max < highest {
            return Err(HandlerErr::conflict(format!(
                "{} {} is below the highest stored score {}",
                key, max, highest
            )));
        }
    }
    Ok(())
}

fn handle_setup_get(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let school = load_section(conn, SetupSection::School)
        .map_err(|e| HandlerErr::failed("db_query_failed", e))?;
    let assessment = load_section(conn, SetupSection::Assessment)
        .map_err(|e| HandlerErr::failed("db_query_failed", e))?;
    Ok(json!({
        "school": school,
        "assessment": assessment
    }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let section_raw = required_str(&req.params, "section")?;
    let section = SetupSection::parse(&section_raw)
        .ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch = patch_obj(&req.params)?;

    let mut current = load_section(conn, section)
        .map_err(|e| HandlerErr::failed("db_query_failed", e))?;
    merge_section_patch(section, &mut current, patch).map_err(HandlerErr::BadParams)?;
    if let SetupSection::Assessment = section {
        check_maxima_cover_stored_scores(conn, &current)?;
    }
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::failed("db_update_failed", e))?;
    Ok(json!({ "section": section_raw, "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
