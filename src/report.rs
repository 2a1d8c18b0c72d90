//! Report-card assembly: a pure merge of class results, ratings, attendance
//! and branding into one document. Rendering happens elsewhere.

use crate::calc::{self, ClassAggregate, ComponentMax, GradeScaleItem, PerformanceSummary, SubjectResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolBranding {
    pub school_name: String,
    pub address: String,
    pub motto: String,
    pub logo_url: Option<String>,
    pub principal_name: String,
    pub term_label: String,
    pub session_label: String,
    pub next_term_begins: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentIdentity {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ratings {
    pub affective: Vec<Rating>,
    pub psychomotor: Vec<Rating>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub days_opened: Option<i64>,
    pub days_present: Option<i64>,
    pub teacher_comment: Option<String>,
    pub principal_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveRow {
    pub subject_id: String,
    pub subject_name: String,
    #[serde(rename = "firstCA")]
    pub first_ca: f64,
    #[serde(rename = "secondCA")]
    pub second_ca: f64,
    pub exam: f64,
    pub total: f64,
    pub grade: Option<String>,
    pub remark: Option<String>,
    pub subject_position: Option<usize>,
    pub class_average: Option<f64>,
    pub highest: Option<f64>,
    pub lowest: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub days_opened: Option<i64>,
    pub days_present: Option<i64>,
    pub days_absent: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comments {
    pub teacher: Option<String>,
    pub principal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardData {
    pub school: SchoolBranding,
    pub student: StudentIdentity,
    pub cognitive: Vec<CognitiveRow>,
    pub affective: Vec<Rating>,
    pub psychomotor: Vec<Rating>,
    pub attendance: Attendance,
    pub comments: Comments,
    /// `None` when the student has no results in their class.
    pub performance: Option<PerformanceSummary>,
}

pub struct ReportInputs<'a> {
    pub student: StudentIdentity,
    pub branding: SchoolBranding,
    pub subject_names: &'a HashMap<String, String>,
    /// Every result row for the student's class, not only the student's.
    pub class_rows: &'a [SubjectResult],
    pub max: ComponentMax,
    pub scale: &'a [GradeScaleItem],
    pub ratings: Ratings,
    pub meta: ReportMeta,
}

pub fn assemble_report_card(inputs: ReportInputs<'_>) -> ReportCardData {
    let aggregate = calc::aggregate_class(inputs.class_rows, &inputs.max, inputs.scale);
    let cognitive = cognitive_rows(&inputs, &aggregate);
    let performance = aggregate.summary_for(&inputs.student.id).cloned();

    let days_absent = match (inputs.meta.days_opened, inputs.meta.days_present) {
        (Some(opened), Some(present)) => Some((opened - present).max(0)),
        _ => None,
    };

    ReportCardData {
        school: inputs.branding,
        student: inputs.student,
        cognitive,
        affective: inputs.ratings.affective,
        psychomotor: inputs.ratings.psychomotor,
        attendance: Attendance {
            days_opened: inputs.meta.days_opened,
            days_present: inputs.meta.days_present,
            days_absent,
        },
        comments: Comments {
            teacher: inputs.meta.teacher_comment,
            principal: inputs.meta.principal_comment,
        },
        performance,
    }
}

fn cognitive_rows(inputs: &ReportInputs<'_>, aggregate: &ClassAggregate) -> Vec<CognitiveRow> {
    let subject_max = inputs.max.subject_max();
    let mut rows: Vec<CognitiveRow> = inputs
        .class_rows
        .iter()
        .filter(|r| r.student_id == inputs.student.id)
        .map(|r| {
            let total = r.component_total();
            let pct = if subject_max > 0.0 {
                calc::round_2dp(100.0 * total / subject_max)
            } else {
                0.0
            };
            let grade = calc::lookup_grade(pct, inputs.scale);
            let stats = aggregate.subject_stats(&r.subject_id);
            CognitiveRow {
                subject_id: r.subject_id.clone(),
                subject_name: inputs
                    .subject_names
                    .get(&r.subject_id)
                    .cloned()
                    .unwrap_or_else(|| r.subject_id.clone()),
                first_ca: r.first_ca,
                second_ca: r.second_ca,
                exam: r.exam,
                total,
                grade: grade.map(|g| g.grade.clone()),
                remark: grade.map(|g| g.remark.clone()),
                subject_position: aggregate.subject_position(&r.subject_id, &r.student_id),
                class_average: stats.map(|s| s.class_average),
                highest: stats.map(|s| s.highest),
                lowest: stats.map(|s| s.lowest),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.subject_name
            .to_ascii_lowercase()
            .cmp(&b.subject_name.to_ascii_lowercase())
            .then_with(|| a.subject_id.cmp(&b.subject_id))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::ScoreEntry;

    fn scale() -> Vec<GradeScaleItem> {
        vec![
            GradeScaleItem {
                grade: "A".into(),
                range_start: 70.0,
                range_end: 100.0,
                remark: "Excellent".into(),
            },
            GradeScaleItem {
                grade: "F".into(),
                range_start: 0.0,
                range_end: 69.99,
                remark: "Below".into(),
            },
        ]
    }

    fn result(subject: &str, student: &str, exam: f64) -> SubjectResult {
        SubjectResult::new(
            "JSS2",
            subject,
            student,
            ScoreEntry {
                first_ca: 15.0,
                second_ca: 15.0,
                exam,
            },
        )
    }

    fn identity(id: &str) -> StudentIdentity {
        StudentIdentity {
            id: id.into(),
            name: "Ada Obi".into(),
            class_name: "JSS2".into(),
            status: "Active".into(),
        }
    }

    #[test]
    fn assembles_rows_for_one_student_with_class_context() {
        let rows = vec![
            result("sub-math", "s1", 50.0),
            result("sub-eng", "s1", 20.0),
            result("sub-math", "s2", 30.0),
        ];
        let names = HashMap::from([
            ("sub-math".to_string(), "Mathematics".to_string()),
            ("sub-eng".to_string(), "English".to_string()),
        ]);
        let card = assemble_report_card(ReportInputs {
            student: identity("s1"),
            branding: SchoolBranding {
                school_name: "Hillside College".into(),
                ..Default::default()
            },
            subject_names: &names,
            class_rows: &rows,
            max: ComponentMax::default(),
            scale: &scale(),
            ratings: Ratings {
                affective: vec![Rating {
                    trait_name: "Punctuality".into(),
                    value: 4,
                }],
                psychomotor: Vec::new(),
            },
            meta: ReportMeta {
                days_opened: Some(60),
                days_present: Some(57),
                teacher_comment: Some("Steady progress".into()),
                principal_comment: None,
            },
        });

        assert_eq!(card.school.school_name, "Hillside College");
        let subjects: Vec<&str> = card.cognitive.iter().map(|r| r.subject_name.as_str()).collect();
        assert_eq!(subjects, vec!["English", "Mathematics"]);

        let math = &card.cognitive[1];
        assert_eq!(math.total, 80.0);
        assert_eq!(math.grade.as_deref(), Some("A"));
        assert_eq!(math.subject_position, Some(1));
        assert_eq!(math.highest, Some(80.0));
        assert_eq!(math.lowest, Some(60.0));
        assert_eq!(math.class_average, Some(70.0));

        let perf = card.performance.expect("performance");
        assert_eq!(perf.percentage, 65.0);
        assert_eq!(perf.position, 1);
        assert_eq!(perf.class_size, 2);
        assert_eq!(card.attendance.days_absent, Some(3));
        assert_eq!(card.affective.len(), 1);
        assert_eq!(card.comments.teacher.as_deref(), Some("Steady progress"));
    }

    #[test]
    fn student_without_results_gets_empty_card() {
        let names = HashMap::new();
        let card = assemble_report_card(ReportInputs {
            student: identity("s9"),
            branding: SchoolBranding::default(),
            subject_names: &names,
            class_rows: &[],
            max: ComponentMax::default(),
            scale: &scale(),
            ratings: Ratings::default(),
            meta: ReportMeta::default(),
        });
        assert!(card.cognitive.is_empty());
        assert!(card.performance.is_none());
        assert_eq!(card.attendance.days_absent, None);
    }
}
