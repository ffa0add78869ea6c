use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::metrics::{fit_trend, TrendFit};
use crate::models::{percent, ExamAttempt, SittingKey, Snapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SittingSummary {
    pub key: SittingKey,
    pub areas: usize,
    pub total_questions: u32,
    pub correct: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Completeness {
    pub valid_sittings: Vec<SittingSummary>,
    pub complete_rows: Vec<ExamAttempt>,
}

/// Keeps sittings that cover exactly the configured areas and sum to the
/// full question count.
pub fn validate_sittings(rows: &[ExamAttempt], config: &AnalyticsConfig) -> Completeness {
    let expected: BTreeSet<&str> = config.areas.iter().map(String::as_str).collect();
    let mut groups: BTreeMap<SittingKey, (BTreeSet<&str>, u32, u32)> = BTreeMap::new();

    for row in rows {
        let entry = groups
            .entry(row.key())
            .or_insert_with(|| (BTreeSet::new(), 0, 0));
        entry.0.insert(row.area.as_str());
        entry.1 += row.total_count;
        entry.2 += row.correct_count;
    }

    let valid_sittings: Vec<SittingSummary> = groups
        .into_iter()
        .filter(|(_, (areas, total, _))| *areas == expected && *total == config.full_exam_questions)
        .map(|(key, (areas, total_questions, correct))| SittingSummary {
            key,
            areas: areas.len(),
            total_questions,
            correct,
        })
        .collect();

    let valid_keys: BTreeSet<&SittingKey> = valid_sittings.iter().map(|s| &s.key).collect();
    let complete_rows = rows
        .iter()
        .filter(|row| valid_keys.contains(&row.key()))
        .cloned()
        .collect();

    tracing::debug!(
        rows = rows.len(),
        valid = valid_sittings.len(),
        "validated exam sittings"
    );

    Completeness {
        valid_sittings,
        complete_rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordCards {
    pub best_area: String,
    pub best_area_mean: u32,
    pub worst_area: String,
    pub worst_area_mean: u32,
    pub best_total: u32,
    pub completed: usize,
}

pub fn record_cards(completeness: &Completeness, config: &AnalyticsConfig) -> Option<RecordCards> {
    if completeness.complete_rows.is_empty() {
        return None;
    }

    let mut by_area: BTreeMap<&str, (u64, usize)> = BTreeMap::new();
    for row in &completeness.complete_rows {
        let entry = by_area.entry(row.area.as_str()).or_insert((0, 0));
        entry.0 += row.correct_count as u64;
        entry.1 += 1;
    }

    let means: Vec<(&String, f64)> = config
        .areas
        .iter()
        .filter_map(|area| {
            by_area
                .get(area.as_str())
                .map(|(sum, count)| (area, *sum as f64 / *count as f64))
        })
        .collect();

    let mut best = means.first()?;
    let mut worst = means.first()?;
    for candidate in &means {
        if candidate.1 > best.1 {
            best = candidate;
        }
        if candidate.1 < worst.1 {
            worst = candidate;
        }
    }

    Some(RecordCards {
        best_area: best.0.clone(),
        best_area_mean: best.1.ceil() as u32,
        worst_area: worst.0.clone(),
        worst_area_mean: worst.1.ceil() as u32,
        best_total: completeness
            .valid_sittings
            .iter()
            .map(|s| s.correct)
            .max()
            .unwrap_or(0),
        completed: completeness.valid_sittings.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaOverview {
    pub area: String,
    pub mean_percent: f64,
    pub questions: u64,
    pub rows: usize,
}

pub fn area_overview(rows: &[ExamAttempt], config: &AnalyticsConfig) -> Vec<AreaOverview> {
    config
        .areas
        .iter()
        .map(|area| {
            let matching: Vec<&ExamAttempt> = rows.iter().filter(|row| &row.area == area).collect();
            let mean_percent = if matching.is_empty() {
                0.0
            } else {
                matching.iter().map(|row| row.percent()).sum::<f64>() / matching.len() as f64
            };
            AreaOverview {
                area: area.clone(),
                mean_percent,
                questions: matching.iter().map(|row| row.total_count as u64).sum(),
                rows: matching.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaDay {
    pub date: NaiveDate,
    pub mean_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AreaProgress {
    pub area: String,
    pub daily: Vec<AreaDay>,
    pub mean_percent: f64,
    pub trend: TrendFit,
}

pub fn area_progress(rows: &[ExamAttempt], area: &str, config: &AnalyticsConfig) -> Option<AreaProgress> {
    let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for row in rows.iter().filter(|row| row.area == area) {
        let entry = days.entry(row.date).or_insert((0.0, 0));
        entry.0 += row.percent();
        entry.1 += 1;
    }
    if days.is_empty() {
        return None;
    }

    let daily: Vec<AreaDay> = days
        .into_iter()
        .map(|(date, (sum, count))| AreaDay {
            date,
            mean_percent: sum / count as f64,
        })
        .collect();
    let mean_percent = daily.iter().map(|d| d.mean_percent).sum::<f64>() / daily.len() as f64;
    let points: Vec<(NaiveDate, f64)> = daily.iter().map(|d| (d.date, d.mean_percent)).collect();

    Some(AreaProgress {
        area: area.to_string(),
        trend: fit_trend(&points, config.trend_threshold),
        daily,
        mean_percent,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamHistoryRow {
    pub student: Option<String>,
    pub date: NaiveDate,
    pub exam_type: String,
    pub exam_number: u32,
    pub exam_year: i32,
    pub area: String,
    pub correct: u32,
    pub total: u32,
    pub percent: f64,
}

pub fn exam_history(rows: &[ExamAttempt], snapshot: &Snapshot) -> Vec<ExamHistoryRow> {
    let mut history: Vec<ExamHistoryRow> = rows
        .iter()
        .map(|row| ExamHistoryRow {
            student: snapshot.student_name(row.student_id).map(str::to_string),
            date: row.date,
            exam_type: row.exam_type.clone(),
            exam_number: row.exam_number,
            exam_year: row.exam_year,
            area: row.area.clone(),
            correct: row.correct_count,
            total: row.total_count,
            percent: percent(row.correct_count as u64, row.total_count as u64),
        })
        .collect();
    history.sort_by(|a, b| b.date.cmp(&a.date));
    history
}
