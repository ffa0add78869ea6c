use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::models::{percent, ActivityRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    NoData,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Rising => "Rising",
            Trend::Falling => "Falling",
            Trend::Stable => "Stable",
            Trend::NoData => "No Data",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendFit {
    pub trend: Trend,
    pub slope: Option<f64>,
    pub line: Vec<f64>,
}

impl TrendFit {
    fn no_data() -> Self {
        Self {
            trend: Trend::NoData,
            slope: None,
            line: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub correct: u64,
    pub total: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub questions: u64,
    pub correct: u64,
    pub accuracy: f64,
    pub volatility: f64,
    pub records: usize,
    pub daily: Vec<DailyPoint>,
    pub trend: TrendFit,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectComparison {
    pub subjects: Vec<String>,
    pub student: Vec<f64>,
    pub cohort: Vec<f64>,
}

pub fn aggregate_accuracy(records: &[ActivityRecord]) -> f64 {
    let (correct, total) = totals(records);
    percent(correct, total)
}

fn totals(records: &[ActivityRecord]) -> (u64, u64) {
    records.iter().fold((0u64, 0u64), |(correct, total), record| {
        (
            correct + record.correct_count as u64,
            total + record.total_count as u64,
        )
    })
}

pub fn daily_series(records: &[ActivityRecord]) -> Vec<DailyPoint> {
    let mut days: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
    for record in records {
        let entry = days.entry(record.date).or_insert((0, 0));
        entry.0 += record.correct_count as u64;
        entry.1 += record.total_count as u64;
    }

    days.into_iter()
        .map(|(date, (correct, total))| DailyPoint {
            date,
            correct,
            total,
            percent: percent(correct, total),
        })
        .collect()
}

/// Sample standard deviation, 0 for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

pub fn volatility(daily: &[DailyPoint]) -> f64 {
    let values: Vec<f64> = daily.iter().map(|point| point.percent).collect();
    sample_std_dev(&values)
}

pub fn fit_trend(points: &[(NaiveDate, f64)], threshold: f64) -> TrendFit {
    if points.len() < 2 {
        return TrendFit::no_data();
    }

    let xs: Vec<f64> = points
        .iter()
        .map(|(date, _)| date.num_days_from_ce() as f64)
        .collect();
    let n = points.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let numerator = xs
        .iter()
        .zip(points.iter())
        .map(|(x, (_, y))| (x - mean_x) * (y - mean_y))
        .sum::<f64>();
    let denominator = xs.iter().map(|x| (x - mean_x).powi(2)).sum::<f64>();
    if denominator == 0.0 {
        // every point on the same day
        return TrendFit::no_data();
    }

    let slope = numerator / denominator;
    let intercept = mean_y - slope * mean_x;
    let line = xs.iter().map(|x| slope * x + intercept).collect();

    let trend = if slope > threshold {
        Trend::Rising
    } else if slope < -threshold {
        Trend::Falling
    } else {
        Trend::Stable
    };

    TrendFit {
        trend,
        slope: Some(slope),
        line,
    }
}

pub fn summarize(records: &[ActivityRecord], config: &AnalyticsConfig) -> PerformanceSummary {
    let (correct, questions) = totals(records);
    let daily = daily_series(records);
    let points: Vec<(NaiveDate, f64)> = daily.iter().map(|p| (p.date, p.percent)).collect();
    let trend = fit_trend(&points, config.trend_threshold);

    tracing::debug!(
        records = records.len(),
        days = daily.len(),
        trend = %trend.trend,
        "summarized activity"
    );

    PerformanceSummary {
        questions,
        correct,
        accuracy: aggregate_accuracy(records),
        volatility: volatility(&daily),
        records: records.len(),
        daily,
        trend,
    }
}

pub fn accuracy_by_subject(records: &[ActivityRecord], config: &AnalyticsConfig) -> Vec<f64> {
    let mut sums: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for record in records {
        let entry = sums.entry(record.subject.as_str()).or_insert((0, 0));
        entry.0 += record.correct_count as u64;
        entry.1 += record.total_count as u64;
    }

    config
        .subjects
        .iter()
        .map(|subject| {
            sums.get(subject.as_str())
                .map(|(correct, total)| percent(*correct, *total))
                .unwrap_or(0.0)
        })
        .collect()
}

pub fn subject_comparison(
    student: &[ActivityRecord],
    cohort: &[ActivityRecord],
    config: &AnalyticsConfig,
) -> SubjectComparison {
    SubjectComparison {
        subjects: config.subjects.clone(),
        student: accuracy_by_subject(student, config),
        cohort: accuracy_by_subject(cohort, config),
    }
}
