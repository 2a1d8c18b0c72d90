use crate::records::{Student, StudentStatus};
use std::collections::BTreeMap;

pub const GRADUATED_CLASS: &str = "Graduated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionTarget {
    Stay,
    Graduate,
    Class(String),
}

impl PromotionTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.is_empty() {
            return None;
        }
        if t.eq_ignore_ascii_case("none") {
            Some(Self::Stay)
        } else if t.eq_ignore_ascii_case("graduate") {
            Some(Self::Graduate)
        } else {
            Some(Self::Class(t.to_string()))
        }
    }
}

pub type PromotionMap = BTreeMap<String, PromotionTarget>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionOutcome {
    /// Indices into the input slice of students whose record changed, ascending.
    pub changed: Vec<usize>,
    pub promoted_count: usize,
    pub graduated_count: usize,
    pub unchanged_count: usize,
}

/// Rewrites class (and status for graduates) in place. Alumni are skipped.
pub fn apply_promotions(students: &mut [Student], map: &PromotionMap) -> PromotionOutcome {
    let mut out = PromotionOutcome::default();
    for (i, student) in students.iter_mut().enumerate() {
        if student.status != StudentStatus::Active {
            continue;
        }
        match map.get(&student.class_name) {
            None | Some(PromotionTarget::Stay) => out.unchanged_count += 1,
            Some(PromotionTarget::Graduate) => {
                student.class_name = GRADUATED_CLASS.to_string();
                student.status = StudentStatus::Alumni;
                out.graduated_count += 1;
                out.changed.push(i);
            }
            Some(PromotionTarget::Class(target)) if *target == student.class_name => {
                out.unchanged_count += 1;
            }
            Some(PromotionTarget::Class(target)) => {
                student.class_name = target.clone();
                out.promoted_count += 1;
                out.changed.push(i);
            }
        }
    }
    out
}
