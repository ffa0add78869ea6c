use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::EssayRecord;

pub const CRITERIA: [&str; 5] = [
    "Grammar (C1)",
    "Repertoire (C2)",
    "Argumentation (C3)",
    "Cohesion (C4)",
    "Proposal (C5)",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EssaySummary {
    pub latest: f64,
    pub best: f64,
    pub mean: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionComparison {
    pub criteria: Vec<String>,
    pub baseline: [f64; 5],
    pub focus: [f64; 5],
    pub focus_students: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EssayHistoryRow {
    pub date: NaiveDate,
    pub topic: String,
    pub scores: [f64; 5],
    pub total: f64,
}

pub fn chronological(essays: &[EssayRecord]) -> Vec<EssayRecord> {
    let mut sorted = essays.to_vec();
    sorted.sort_by_key(|essay| essay.date);
    sorted
}

pub fn criterion_means(essays: &[EssayRecord]) -> [f64; 5] {
    let mut means = [0.0; 5];
    if essays.is_empty() {
        return means;
    }
    for essay in essays {
        for (mean, score) in means.iter_mut().zip(essay.scores) {
            *mean += score;
        }
    }
    for mean in &mut means {
        *mean /= essays.len() as f64;
    }
    means
}

pub fn summary(essays: &[EssayRecord]) -> Option<EssaySummary> {
    let sorted = chronological(essays);
    let latest = sorted.last()?.total_score;
    let best = sorted
        .iter()
        .map(|essay| essay.total_score)
        .fold(f64::MIN, f64::max);
    let mean = sorted.iter().map(|essay| essay.total_score).sum::<f64>() / sorted.len() as f64;

    Some(EssaySummary {
        latest,
        best,
        mean,
        count: sorted.len(),
    })
}

/// The `n` students with the highest mean total; ties go to the lower id.
pub fn top_students(essays: &[EssayRecord], n: usize) -> Vec<(i64, f64)> {
    let mut totals: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for essay in essays {
        let entry = totals.entry(essay.student_id).or_insert((0.0, 0));
        entry.0 += essay.total_score;
        entry.1 += 1;
    }

    let mut means: Vec<(i64, f64)> = totals
        .into_iter()
        .map(|(id, (sum, count))| (id, sum / count as f64))
        .collect();
    means.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    means.truncate(n);
    means
}

pub fn cohort_vs_top(essays: &[EssayRecord], n: usize) -> CriterionComparison {
    let top = top_students(essays, n);
    let top_ids: Vec<i64> = top.iter().map(|(id, _)| *id).collect();
    let top_essays: Vec<EssayRecord> = essays
        .iter()
        .filter(|essay| top_ids.contains(&essay.student_id))
        .cloned()
        .collect();

    CriterionComparison {
        criteria: CRITERIA.iter().map(|c| c.to_string()).collect(),
        baseline: criterion_means(essays),
        focus: criterion_means(&top_essays),
        focus_students: top_ids,
    }
}

pub fn student_vs_population(
    student_id: i64,
    population: &[EssayRecord],
) -> CriterionComparison {
    let own: Vec<EssayRecord> = population
        .iter()
        .filter(|essay| essay.student_id == student_id)
        .cloned()
        .collect();

    CriterionComparison {
        criteria: CRITERIA.iter().map(|c| c.to_string()).collect(),
        baseline: criterion_means(population),
        focus: criterion_means(&own),
        focus_students: vec![student_id],
    }
}

pub fn history(essays: &[EssayRecord]) -> Vec<EssayHistoryRow> {
    chronological(essays)
        .into_iter()
        .map(|essay| EssayHistoryRow {
            date: essay.date,
            topic: EssayRecord::normalize_topic(Some(essay.topic.as_str())),
            scores: essay.scores,
            total: essay.total_score,
        })
        .collect()
}

pub fn evolution(essays: &[EssayRecord]) -> Vec<(NaiveDate, f64, String)> {
    history(essays)
        .into_iter()
        .map(|row| (row.date, row.total, row.topic))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TOPIC_NOT_INFORMED;

    fn essay(student_id: i64, day: u32, scores: [f64; 5], topic: &str) -> EssayRecord {
        EssayRecord {
            student_id,
            date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
            topic: topic.to_string(),
            scores,
            total_score: scores.iter().sum(),
        }
    }

    #[test]
    fn criterion_means_are_zero_without_essays() {
        assert_eq!(criterion_means(&[]), [0.0; 5]);
        assert!(summary(&[]).is_none());
    }

    #[test]
    fn summary_uses_latest_by_date() {
        let essays = vec![
            essay(1, 20, [120.0; 5], "A"),
            essay(1, 5, [160.0; 5], "B"),
            essay(1, 10, [140.0; 5], "C"),
        ];
        let summary = summary(&essays).unwrap();
        assert_eq!(summary.latest, 600.0);
        assert_eq!(summary.best, 800.0);
        assert_eq!(summary.mean, 700.0);
        assert_eq!(summary.count, 3);
    }

    #[test]
    fn top_students_compare_against_cohort() {
        let essays = vec![
            essay(1, 1, [200.0; 5], "A"),
            essay(2, 1, [100.0; 5], "A"),
            essay(3, 1, [160.0; 5], "A"),
            essay(3, 2, [120.0; 5], "B"),
        ];
        let comparison = cohort_vs_top(&essays, 2);
        assert_eq!(comparison.focus_students, vec![1, 3]);
        assert_eq!(comparison.focus[0], 160.0);
        assert_eq!(comparison.baseline[0], 145.0);
        assert_eq!(comparison.criteria.len(), 5);
    }

    #[test]
    fn top_student_ties_prefer_lower_id() {
        let essays = vec![essay(9, 1, [100.0; 5], "A"), essay(4, 1, [100.0; 5], "A")];
        assert_eq!(top_students(&essays, 1), vec![(4, 500.0)]);
    }

    #[test]
    fn student_against_population() {
        let essays = vec![essay(1, 1, [180.0; 5], "A"), essay(2, 1, [120.0; 5], "A")];
        let comparison = student_vs_population(2, &essays);
        assert_eq!(comparison.focus, [120.0; 5]);
        assert_eq!(comparison.baseline, [150.0; 5]);
    }

    #[test]
    fn history_is_chronological_with_topic_sentinel() {
        let essays = vec![essay(1, 9, [100.0; 5], ""), essay(1, 2, [120.0; 5], "Mobilidade urbana")];
        let rows = history(&essays);
        assert_eq!(rows[0].topic, "Mobilidade urbana");
        assert_eq!(rows[1].topic, TOPIC_NOT_INFORMED);
        assert_eq!(rows[1].total, 500.0);
        assert_eq!(evolution(&essays).len(), 2);
    }
}
