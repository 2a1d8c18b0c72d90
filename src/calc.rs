use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Two-decimal rounding applied to every percentage before grading and ranking,
/// so equal scores always compare equal.
pub fn round_2dp(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("{field} must be between 0 and {max}, got {value}")]
    ScoreOutOfRange {
        field: &'static str,
        value: f64,
        max: f64,
    },
    #[error("{0}")]
    InvalidScaleItem(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMax {
    pub first_ca_max: f64,
    pub second_ca_max: f64,
    pub exam_max: f64,
}

impl Default for ComponentMax {
    fn default() -> Self {
        Self {
            first_ca_max: 20.0,
            second_ca_max: 20.0,
            exam_max: 60.0,
        }
    }
}

impl ComponentMax {
    pub fn subject_max(&self) -> f64 {
        self.first_ca_max + self.second_ca_max + self.exam_max
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    pub first_ca: f64,
    pub second_ca: f64,
    pub exam: f64,
}

impl ScoreEntry {
    /// Rounded to 2 dp.
    pub fn total(&self) -> f64 {
        round_2dp(self.first_ca + self.second_ca + self.exam)
    }

    pub fn validate(&self, max: &ComponentMax) -> Result<(), CalcError> {
        check_component("firstCA", self.first_ca, max.first_ca_max)?;
        check_component("secondCA", self.second_ca, max.second_ca_max)?;
        check_component("exam", self.exam, max.exam_max)
    }
}

fn check_component(field: &'static str, value: f64, max: f64) -> Result<(), CalcError> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(CalcError::ScoreOutOfRange { field, value, max });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScaleItem {
    pub grade: String,
    pub range_start: f64,
    pub range_end: f64,
    #[serde(default)]
    pub remark: String,
}

impl GradeScaleItem {
    pub fn contains(&self, percentage: f64) -> bool {
        self.range_start <= percentage && percentage <= self.range_end
    }

    pub fn validate(&self) -> Result<(), CalcError> {
        if self.grade.trim().is_empty() {
            return Err(CalcError::InvalidScaleItem("grade must not be empty".into()));
        }
        if !self.range_start.is_finite() || !self.range_end.is_finite() {
            return Err(CalcError::InvalidScaleItem(format!(
                "grade {}: range bounds must be numbers",
                self.grade
            )));
        }
        if self.range_start < 0.0 || self.range_end > 100.0 {
            return Err(CalcError::InvalidScaleItem(format!(
                "grade {}: range must lie within 0..=100",
                self.grade
            )));
        }
        if self.range_start > self.range_end {
            return Err(CalcError::InvalidScaleItem(format!(
                "grade {}: rangeStart must not exceed rangeEnd",
                self.grade
            )));
        }
        Ok(())
    }
}

/// First item containing `percentage`, checking the highest `range_start` first.
/// Items with equal starts keep their stored order.
pub fn lookup_grade(percentage: f64, scale: &[GradeScaleItem]) -> Option<&GradeScaleItem> {
    let mut ordered: Vec<&GradeScaleItem> = scale.iter().collect();
    ordered.sort_by(|a, b| {
        b.range_start
            .partial_cmp(&a.range_start)
            .unwrap_or(Ordering::Equal)
    });
    ordered.into_iter().find(|item| item.contains(percentage))
}

/// Overlaps and gaps between consecutive ranges (sorted ascending). Gaps are
/// measured at 0.01 resolution to match percentage rounding.
pub fn scale_warnings(scale: &[GradeScaleItem]) -> Vec<String> {
    let mut ordered: Vec<&GradeScaleItem> = scale.iter().collect();
    ordered.sort_by(|a, b| {
        a.range_start
            .partial_cmp(&b.range_start)
            .unwrap_or(Ordering::Equal)
    });

    let mut out = Vec::new();
    if let Some(first) = ordered.first() {
        if first.range_start > 0.0 {
            out.push(format!(
                "no grade covers 0 to {} (below {})",
                first.range_start, first.grade
            ));
        }
    }
    for pair in ordered.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if hi.range_start <= lo.range_end {
            out.push(format!(
                "grades {} and {} overlap between {} and {}",
                lo.grade,
                hi.grade,
                hi.range_start,
                lo.range_end.min(hi.range_end)
            ));
        } else if round_2dp(hi.range_start - lo.range_end) > 0.01 {
            out.push(format!(
                "no grade covers {} to {} (between {} and {})",
                lo.range_end, hi.range_start, lo.grade, hi.grade
            ));
        }
    }
    if let Some(last) = ordered.iter().max_by(|a, b| {
        a.range_end
            .partial_cmp(&b.range_end)
            .unwrap_or(Ordering::Equal)
    }) {
        if last.range_end < 100.0 {
            out.push(format!(
                "no grade covers {} to 100 (above {})",
                last.range_end, last.grade
            ));
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub class_name: String,
    pub subject_id: String,
    pub student_id: String,
    #[serde(rename = "firstCA")]
    pub first_ca: f64,
    #[serde(rename = "secondCA")]
    pub second_ca: f64,
    pub exam: f64,
    pub total: f64,
}

impl SubjectResult {
    pub fn new(class_name: &str, subject_id: &str, student_id: &str, entry: ScoreEntry) -> Self {
        Self {
            class_name: class_name.to_string(),
            subject_id: subject_id.to_string(),
            student_id: student_id.to_string(),
            first_ca: entry.first_ca,
            second_ca: entry.second_ca,
            exam: entry.exam,
            total: entry.total(),
        }
    }

    /// Sum of the stored components, rounded to 2 dp.
    pub fn component_total(&self) -> f64 {
        round_2dp(self.first_ca + self.second_ca + self.exam)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub student_id: String,
    pub subject_count: usize,
    pub overall_total: f64,
    pub max_obtainable: f64,
    pub average: f64,
    pub percentage: f64,
    pub grade: Option<String>,
    pub remark: Option<String>,
    pub position: usize,
    pub class_size: usize,
    pub class_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub subject_id: String,
    pub entry_count: usize,
    pub class_average: f64,
    pub highest: f64,
    pub lowest: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ClassAggregate {
    /// Ordered by position, ties by student id.
    pub summaries: Vec<PerformanceSummary>,
    /// Ordered by subject id.
    pub subjects: Vec<SubjectStats>,
    subject_positions: HashMap<(String, String), usize>,
    pub class_size: usize,
    pub class_average: f64,
}

impl ClassAggregate {
    pub fn summary_for(&self, student_id: &str) -> Option<&PerformanceSummary> {
        self.summaries.iter().find(|s| s.student_id == student_id)
    }

    pub fn subject_stats(&self, subject_id: &str) -> Option<&SubjectStats> {
        self.subjects.iter().find(|s| s.subject_id == subject_id)
    }

    pub fn subject_position(&self, subject_id: &str, student_id: &str) -> Option<usize> {
        self.subject_positions
            .get(&(subject_id.to_string(), student_id.to_string()))
            .copied()
    }
}

/// Competition ranking ("1224"): position is one plus the number of strictly
/// higher values. Input must already be sorted descending.
fn competition_positions(sorted_desc: &[f64]) -> Vec<usize> {
    let mut out = Vec::with_capacity(sorted_desc.len());
    for (i, v) in sorted_desc.iter().enumerate() {
        let pos = match (i, out.last()) {
            (0, _) | (_, None) => 1,
            (_, Some(&prev)) if *v == sorted_desc[i - 1] => prev,
            _ => i + 1,
        };
        out.push(pos);
    }
    out
}

fn desc_then_id(a: &(String, f64), b: &(String, f64)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

pub fn aggregate_class(
    rows: &[SubjectResult],
    max: &ComponentMax,
    scale: &[GradeScaleItem],
) -> ClassAggregate {
    if rows.is_empty() {
        return ClassAggregate::default();
    }

    let mut per_student: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    let mut per_subject: BTreeMap<&str, Vec<(String, f64)>> = BTreeMap::new();
    for row in rows {
        let total = row.component_total();
        let e = per_student.entry(row.student_id.as_str()).or_insert((0, 0.0));
        e.0 += 1;
        e.1 += total;
        per_subject
            .entry(row.subject_id.as_str())
            .or_default()
            .push((row.student_id.clone(), total));
    }

    let subject_max = max.subject_max();
    let mut ranked: Vec<(String, f64)> = per_student
        .iter()
        .map(|(id, (count, total))| {
            let max_obtainable = *count as f64 * subject_max;
            let pct = if max_obtainable > 0.0 {
                round_2dp(100.0 * total / max_obtainable)
            } else {
                0.0
            };
            (id.to_string(), pct)
        })
        .collect();
    ranked.sort_by(desc_then_id);

    let class_size = ranked.len();
    let class_average = round_2dp(ranked.iter().map(|(_, p)| p).sum::<f64>() / class_size as f64);
    let pcts: Vec<f64> = ranked.iter().map(|(_, p)| *p).collect();
    let positions = competition_positions(&pcts);

    let summaries = ranked
        .iter()
        .zip(positions)
        .map(|((student_id, percentage), position)| {
            let (count, total) = per_student[student_id.as_str()];
            let grade = lookup_grade(*percentage, scale);
            PerformanceSummary {
                student_id: student_id.clone(),
                subject_count: count,
                overall_total: round_2dp(total),
                max_obtainable: count as f64 * subject_max,
                average: round_2dp(total / count as f64),
                percentage: *percentage,
                grade: grade.map(|g| g.grade.clone()),
                remark: grade.map(|g| g.remark.clone()),
                position,
                class_size,
                class_average,
            }
        })
        .collect();

    let mut subjects = Vec::with_capacity(per_subject.len());
    let mut subject_positions = HashMap::new();
    for (subject_id, mut entries) in per_subject {
        entries.sort_by(desc_then_id);
        let totals: Vec<f64> = entries.iter().map(|(_, t)| *t).collect();
        for ((student_id, _), pos) in entries.iter().zip(competition_positions(&totals)) {
            subject_positions.insert((subject_id.to_string(), student_id.clone()), pos);
        }
        subjects.push(SubjectStats {
            subject_id: subject_id.to_string(),
            entry_count: totals.len(),
            class_average: round_2dp(totals.iter().sum::<f64>() / totals.len() as f64),
            highest: totals.first().copied().unwrap_or(0.0),
            lowest: totals.last().copied().unwrap_or(0.0),
        });
    }

    ClassAggregate {
        summaries,
        subjects,
        subject_positions,
        class_size,
        class_average,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale() -> Vec<GradeScaleItem> {
        [
            ("F", 0.0, 39.99, "Fail"),
            ("C", 50.0, 59.99, "Good"),
            ("A", 70.0, 100.0, "Excellent"),
            ("B", 60.0, 69.99, "Very Good"),
        ]
        .iter()
        .map(|(g, s, e, r)| GradeScaleItem {
            grade: g.to_string(),
            range_start: *s,
            range_end: *e,
            remark: r.to_string(),
        })
        .collect()
    }

    fn row(subject: &str, student: &str, a: f64, b: f64, exam: f64) -> SubjectResult {
        SubjectResult::new(
            "JSS1",
            subject,
            student,
            ScoreEntry {
                first_ca: a,
                second_ca: b,
                exam,
            },
        )
    }

    #[test]
    fn total_is_sum_of_components() {
        let r = row("math", "s1", 12.5, 18.0, 44.0);
        assert_eq!(r.total, 74.5);
    }

    #[test]
    fn fractional_totals_tie_regardless_of_component_order() {
        let rows = vec![
            row("math", "s1", 0.1, 0.2, 0.3),
            row("math", "s2", 0.3, 0.2, 0.1),
        ];
        assert_eq!(rows[0].total, 0.6);
        assert_eq!(rows[0].total, rows[1].total);

        let agg = aggregate_class(&rows, &ComponentMax::default(), &scale());
        assert_eq!(agg.subject_position("math", "s1"), Some(1));
        assert_eq!(agg.subject_position("math", "s2"), Some(1));
        let math = agg.subject_stats("math").expect("math");
        assert_eq!(math.highest, 0.6);
        assert_eq!(math.lowest, 0.6);
        assert_eq!(agg.summary_for("s1").expect("s1").overall_total, 0.6);
    }

    #[test]
    fn component_limits_are_enforced() {
        let max = ComponentMax::default();
        let ok = ScoreEntry {
            first_ca: 20.0,
            second_ca: 0.0,
            exam: 60.0,
        };
        assert!(ok.validate(&max).is_ok());
        let over = ScoreEntry {
            first_ca: 21.0,
            second_ca: 0.0,
            exam: 0.0,
        };
        assert!(matches!(
            over.validate(&max),
            Err(CalcError::ScoreOutOfRange { field: "firstCA", .. })
        ));
        let negative = ScoreEntry {
            first_ca: 0.0,
            second_ca: 0.0,
            exam: -1.0,
        };
        assert!(negative.validate(&max).is_err());
    }

    #[test]
    fn lookup_checks_highest_range_first_regardless_of_stored_order() {
        let s = scale();
        assert_eq!(lookup_grade(100.0, &s).map(|g| g.grade.as_str()), Some("A"));
        assert_eq!(lookup_grade(65.0, &s).map(|g| g.grade.as_str()), Some("B"));
        assert_eq!(lookup_grade(0.0, &s).map(|g| g.grade.as_str()), Some("F"));
    }

    #[test]
    fn lookup_in_a_gap_is_none() {
        assert!(lookup_grade(45.0, &scale()).is_none());
    }

    #[test]
    fn overlapping_ranges_prefer_higher_start() {
        let mut s = scale();
        s.push(GradeScaleItem {
            grade: "B+".into(),
            range_start: 65.0,
            range_end: 75.0,
            remark: "Upper".into(),
        });
        assert_eq!(lookup_grade(72.0, &s).map(|g| g.grade.as_str()), Some("A"));
        assert_eq!(lookup_grade(67.0, &s).map(|g| g.grade.as_str()), Some("B+"));
    }

    #[test]
    fn lookup_is_deterministic() {
        let s = scale();
        for p in [0.0, 12.34, 39.99, 55.0, 69.99, 70.0, 99.5] {
            assert_eq!(lookup_grade(p, &s), lookup_grade(p, &s));
        }
    }

    #[test]
    fn warnings_report_gaps_and_overlaps() {
        let mut s = scale();
        s.push(GradeScaleItem {
            grade: "X".into(),
            range_start: 55.0,
            range_end: 62.0,
            remark: String::new(),
        });
        let w = scale_warnings(&s);
        assert!(w.iter().any(|m| m.contains("between F and C")), "{w:?}");
        assert!(w.iter().any(|m| m.contains("overlap")), "{w:?}");
    }

    #[test]
    fn contiguous_scale_has_no_warnings() {
        let s: Vec<GradeScaleItem> = [("F", 0.0, 49.99), ("P", 50.0, 100.0)]
            .iter()
            .map(|(g, a, b)| GradeScaleItem {
                grade: g.to_string(),
                range_start: *a,
                range_end: *b,
                remark: String::new(),
            })
            .collect();
        assert!(scale_warnings(&s).is_empty());
    }

    #[test]
    fn scale_item_validation_rejects_inverted_range() {
        let item = GradeScaleItem {
            grade: "A".into(),
            range_start: 80.0,
            range_end: 70.0,
            remark: String::new(),
        };
        assert!(item.validate().is_err());
    }

    #[test]
    fn ties_share_position_and_next_rank_skips() {
        let rows = vec![
            row("math", "s3", 20.0, 20.0, 40.0),
            row("math", "s1", 20.0, 20.0, 40.0),
            row("math", "s2", 20.0, 20.0, 50.0),
            row("math", "s4", 10.0, 10.0, 10.0),
        ];
        let agg = aggregate_class(&rows, &ComponentMax::default(), &scale());
        let order: Vec<(&str, usize)> = agg
            .summaries
            .iter()
            .map(|s| (s.student_id.as_str(), s.position))
            .collect();
        assert_eq!(order, vec![("s2", 1), ("s1", 2), ("s3", 2), ("s4", 4)]);
        assert_eq!(agg.class_size, 4);
    }

    #[test]
    fn summary_uses_all_subjects_for_percentage() {
        let rows = vec![
            row("math", "s1", 20.0, 20.0, 60.0),
            row("eng", "s1", 10.0, 10.0, 30.0),
            row("math", "s2", 10.0, 10.0, 20.0),
        ];
        let agg = aggregate_class(&rows, &ComponentMax::default(), &scale());
        let s1 = agg.summary_for("s1").expect("s1");
        assert_eq!(s1.overall_total, 150.0);
        assert_eq!(s1.max_obtainable, 200.0);
        assert_eq!(s1.percentage, 75.0);
        assert_eq!(s1.average, 75.0);
        assert_eq!(s1.grade.as_deref(), Some("A"));
        assert_eq!(s1.position, 1);

        let s2 = agg.summary_for("s2").expect("s2");
        assert_eq!(s2.percentage, 40.0);
        assert_eq!(s2.grade, None);
        assert_eq!(s2.remark, None);
        assert_eq!(agg.class_average, 57.5);
    }

    #[test]
    fn subject_stats_and_positions() {
        let rows = vec![
            row("math", "s1", 20.0, 20.0, 60.0),
            row("math", "s2", 10.0, 10.0, 20.0),
            row("eng", "s2", 15.0, 15.0, 50.0),
        ];
        let agg = aggregate_class(&rows, &ComponentMax::default(), &scale());
        let math = agg.subject_stats("math").expect("math");
        assert_eq!(math.entry_count, 2);
        assert_eq!(math.highest, 100.0);
        assert_eq!(math.lowest, 40.0);
        assert_eq!(math.class_average, 70.0);
        assert_eq!(agg.subject_position("math", "s2"), Some(2));
        assert_eq!(agg.subject_position("eng", "s2"), Some(1));
        assert_eq!(agg.subject_position("eng", "s1"), None);
    }

    #[test]
    fn empty_class_aggregates_to_nothing() {
        let agg = aggregate_class(&[], &ComponentMax::default(), &scale());
        assert!(agg.summaries.is_empty());
        assert_eq!(agg.class_size, 0);
    }
}
