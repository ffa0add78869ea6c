use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::models::{percent, ActivityRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HiatusStatus {
    Critical,
    Healthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hiatus {
    pub subject: String,
    pub days: i64,
    pub status: HiatusStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicStat {
    pub subject: String,
    pub topic: String,
    pub correct: u64,
    pub total: u64,
    pub percent: f64,
    pub last_seen: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Attention,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeakTopic {
    pub subject: String,
    pub topic: String,
    pub percent: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionEstimate {
    pub subject: String,
    pub topic: String,
    pub percent: f64,
    pub days: i64,
    pub retention: f64,
}

pub fn streak<I>(dates: I, today: NaiveDate) -> u32
where
    I: IntoIterator<Item = NaiveDate>,
{
    let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
    let mut streak = 0;
    let mut reference = today;

    for date in unique.into_iter().rev() {
        if date == reference || date == reference - Duration::days(1) {
            streak += 1;
            reference = date;
        } else {
            break;
        }
    }

    streak
}

/// Subject with the longest gap since it was last studied.
///
/// Only subjects the records mention are considered; ties go to the
/// subject listed first in the configuration.
pub fn hiatus(records: &[ActivityRecord], today: NaiveDate, config: &AnalyticsConfig) -> Option<Hiatus> {
    let mut last_seen: BTreeMap<&str, NaiveDate> = BTreeMap::new();
    for record in records {
        let entry = last_seen.entry(record.subject.as_str()).or_insert(record.date);
        if record.date > *entry {
            *entry = record.date;
        }
    }

    let mut worst: Option<(&String, i64)> = None;
    for subject in &config.subjects {
        let Some(date) = last_seen.get(subject.as_str()) else {
            continue;
        };
        let days = (today - *date).num_days();
        if worst.map_or(true, |(_, current)| days > current) {
            worst = Some((subject, days));
        }
    }

    worst.map(|(subject, days)| Hiatus {
        subject: subject.clone(),
        days,
        status: if days > config.hiatus_critical_days {
            HiatusStatus::Critical
        } else {
            HiatusStatus::Healthy
        },
    })
}

pub fn topic_stats(records: &[ActivityRecord]) -> Vec<TopicStat> {
    let mut groups: BTreeMap<(&str, &str), (u64, u64, NaiveDate)> = BTreeMap::new();
    for record in records {
        let entry = groups
            .entry((record.subject.as_str(), record.content_topic.as_str()))
            .or_insert((0, 0, record.date));
        entry.0 += record.correct_count as u64;
        entry.1 += record.total_count as u64;
        if record.date > entry.2 {
            entry.2 = record.date;
        }
    }

    groups
        .into_iter()
        .map(|((subject, topic), (correct, total, last_seen))| TopicStat {
            subject: subject.to_string(),
            topic: topic.to_string(),
            correct,
            total,
            percent: percent(correct, total),
            last_seen,
        })
        .collect()
}

pub fn weak_topics(stats: &[TopicStat], config: &AnalyticsConfig) -> Vec<WeakTopic> {
    let mut weak: Vec<&TopicStat> = stats
        .iter()
        .filter(|stat| stat.percent < config.weak_attention_below)
        .collect();
    weak.sort_by(|a, b| a.percent.total_cmp(&b.percent));

    weak.into_iter()
        .take(config.weak_report_limit)
        .map(|stat| WeakTopic {
            subject: stat.subject.clone(),
            topic: stat.topic.clone(),
            percent: stat.percent,
            severity: if stat.percent < config.weak_critical_below {
                Severity::Critical
            } else {
                Severity::Attention
            },
        })
        .collect()
}

pub fn retention_score(percent: f64, days: i64, decay: f64) -> f64 {
    percent * (-decay * days as f64).exp()
}

pub fn retention(stats: &[TopicStat], today: NaiveDate, config: &AnalyticsConfig) -> Vec<RetentionEstimate> {
    let mut estimates: Vec<RetentionEstimate> = stats
        .iter()
        .map(|stat| {
            let days = (today - stat.last_seen).num_days().max(0);
            RetentionEstimate {
                subject: stat.subject.clone(),
                topic: stat.topic.clone(),
                percent: stat.percent,
                days,
                retention: retention_score(stat.percent, days, config.retention_decay),
            }
        })
        .collect();

    estimates.sort_by(|a, b| a.retention.total_cmp(&b.retention));
    estimates
}
