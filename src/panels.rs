use chrono::NaiveDate;
use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::diagnostics::{self, Hiatus, RetentionEstimate, WeakTopic};
use crate::essays::{self, CriterionComparison, EssayHistoryRow, EssaySummary};
use crate::exams::{self, AreaOverview, AreaProgress, ExamHistoryRow, RecordCards};
use crate::filter::{self, ActivityFilter};
use crate::metrics::{self, PerformanceSummary, SubjectComparison};
use crate::models::{ActivityRecord, Snapshot, Student};

#[derive(Debug, Clone, Serialize)]
pub struct PerformancePanel {
    pub student: Student,
    pub summary: PerformanceSummary,
    pub subjects: SubjectComparison,
    pub history: Vec<ActivityRecord>,
}

pub fn performance(
    snapshot: &Snapshot,
    student: &Student,
    filter: &ActivityFilter,
    config: &AnalyticsConfig,
) -> PerformancePanel {
    let scoped = ActivityFilter {
        student_id: Some(student.student_id),
        ..filter.clone()
    };
    let rows = scoped.apply(&snapshot.activities, config);
    let all_subjects = ActivityFilter {
        subject: None,
        ..scoped.clone()
    }
    .apply(&snapshot.activities, config);
    let cohort = ActivityFilter::default().apply(&snapshot.activities, config);

    PerformancePanel {
        student: student.clone(),
        summary: metrics::summarize(&rows, config),
        subjects: metrics::subject_comparison(&all_subjects, &cohort, config),
        history: filter::activity_history(&rows),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisPanel {
    pub student: Student,
    pub today: NaiveDate,
    pub streak: u32,
    pub hiatus: Option<Hiatus>,
    pub weak_topics: Vec<WeakTopic>,
    pub retention: Vec<RetentionEstimate>,
}

/// Streak counts every logged day, whatever the subject. Hiatus looks at the
/// configured subjects over the whole history; topic diagnostics use the
/// filtered window.
pub fn diagnosis(
    snapshot: &Snapshot,
    student: &Student,
    filter: &ActivityFilter,
    today: NaiveDate,
    config: &AnalyticsConfig,
) -> DiagnosisPanel {
    let study_days = snapshot
        .activities
        .iter()
        .filter(|record| record.student_id == student.student_id)
        .map(|record| record.date);
    let history = ActivityFilter::for_student(student.student_id).apply(&snapshot.activities, config);
    let scoped = ActivityFilter {
        student_id: Some(student.student_id),
        ..filter.clone()
    };
    let stats = diagnostics::topic_stats(&scoped.apply(&snapshot.activities, config));

    DiagnosisPanel {
        student: student.clone(),
        today,
        streak: diagnostics::streak(study_days, today),
        hiatus: diagnostics::hiatus(&history, today, config),
        weak_topics: diagnostics::weak_topics(&stats, config),
        retention: diagnostics::retention(&stats, today, config),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamPanel {
    pub scope: String,
    pub cards: Option<RecordCards>,
    pub overview: Vec<AreaOverview>,
    pub progress: Option<AreaProgress>,
    pub history: Vec<ExamHistoryRow>,
}

pub fn exams(
    snapshot: &Snapshot,
    student: Option<&Student>,
    group: Option<u32>,
    area: Option<&str>,
    config: &AnalyticsConfig,
) -> ExamPanel {
    let (scope, ids) = match student {
        Some(student) => (
            student.name.clone(),
            std::iter::once(student.student_id).collect(),
        ),
        None => {
            let roster = filter::roster(&snapshot.students, group);
            let label = group
                .map(|id| config.group_label(id))
                .unwrap_or_else(|| "All groups".to_string());
            (label, filter::roster_ids(&roster))
        }
    };
    let rows = filter::exams_for(&snapshot.exams, &ids);
    let completeness = exams::validate_sittings(&rows, config);

    ExamPanel {
        scope,
        cards: exams::record_cards(&completeness, config),
        overview: exams::area_overview(&rows, config),
        progress: area.and_then(|area| exams::area_progress(&rows, area, config)),
        history: exams::exam_history(&rows, snapshot),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EssayPanel {
    pub scope: String,
    pub summary: EssaySummary,
    pub comparison: CriterionComparison,
    pub history: Vec<EssayHistoryRow>,
    pub evolution: Vec<(NaiveDate, f64, String)>,
}

pub fn essays(
    snapshot: &Snapshot,
    student: Option<&Student>,
    group: Option<u32>,
    top_n: usize,
    config: &AnalyticsConfig,
) -> Option<EssayPanel> {
    let (scope, selected, comparison) = match student {
        Some(student) => {
            let ids = std::iter::once(student.student_id).collect();
            let selected = filter::essays_for(&snapshot.essays, &ids);
            let comparison = essays::student_vs_population(student.student_id, &snapshot.essays);
            (student.name.clone(), selected, comparison)
        }
        None => {
            let roster = filter::roster(&snapshot.students, group);
            let selected = filter::essays_for(&snapshot.essays, &filter::roster_ids(&roster));
            let comparison = essays::cohort_vs_top(&selected, top_n);
            let label = group
                .map(|id| config.group_label(id))
                .unwrap_or_else(|| "All groups".to_string());
            (label, selected, comparison)
        }
    };

    let evolution = if student.is_some() {
        essays::evolution(&selected)
    } else {
        Vec::new()
    };

    Some(EssayPanel {
        scope,
        summary: essays::summary(&selected)?,
        comparison,
        history: essays::history(&selected),
        evolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EssayRecord, ExamAttempt};
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, 1).unwrap()
    }

    fn snapshot() -> Snapshot {
        let students = vec![
            Student {
                student_id: 1,
                name: "Ana".to_string(),
                mentoring_group_id: 1,
            },
            Student {
                student_id: 2,
                name: "Bia".to_string(),
                mentoring_group_id: 2,
            },
        ];
        let activity = |student_id, subject: &str, days_ago, correct| ActivityRecord {
            student_id,
            subject: subject.to_string(),
            content_topic: "Geral".to_string(),
            date: today() - Duration::days(days_ago),
            correct_count: correct,
            total_count: 10,
        };
        let activities = vec![
            activity(1, "Matemática", 1, 7),
            activity(1, "Matemática", 0, 9),
            activity(1, "Física", 40, 2),
            activity(2, "Física", 0, 6),
            activity(99, "Física", 0, 10),
        ];
        let exams = ["Linguagens", "Humanas", "Natureza", "Matemática"]
            .into_iter()
            .map(|area| ExamAttempt {
                student_id: 1,
                exam_type: "Simulado".to_string(),
                exam_number: 1,
                exam_year: 2024,
                area: area.to_string(),
                correct_count: 40,
                total_count: 45,
                date: today(),
            })
            .collect();
        let essays = vec![EssayRecord {
            student_id: 2,
            date: today(),
            topic: "Tema".to_string(),
            scores: [120.0; 5],
            total_score: 600.0,
        }];
        Snapshot {
            students,
            activities,
            exams,
            essays,
        }
    }

    #[test]
    fn performance_uses_window_and_full_cohort() {
        let snapshot = snapshot();
        let config = AnalyticsConfig::default();
        let filter = ActivityFilter::default().with_window(today(), 30);
        let panel = performance(&snapshot, &snapshot.students[0], &filter, &config);
        assert_eq!(panel.summary.records, 2);
        assert!((panel.summary.accuracy - 80.0).abs() < 1e-9);
        assert_eq!(panel.summary.trend.trend, metrics::Trend::Rising);
        let fisica = config.subjects.iter().position(|s| s == "Física").unwrap();
        assert_eq!(panel.subjects.student[fisica], 0.0);
        // cohort includes the old row and rows of every student
        assert!((panel.subjects.cohort[fisica] - 60.0).abs() < 1e-9);
        assert_eq!(panel.history[0].date, today());
    }

    #[test]
    fn diagnosis_sees_full_history() {
        let snapshot = snapshot();
        let config = AnalyticsConfig::default();
        let filter = ActivityFilter::default().with_window(today(), 30);
        let panel = diagnosis(&snapshot, &snapshot.students[0], &filter, today(), &config);
        assert_eq!(panel.streak, 2);
        let hiatus = panel.hiatus.unwrap();
        assert_eq!(hiatus.subject, "Física");
        assert_eq!(hiatus.days, 40);
        assert_eq!(panel.retention.len(), 1);
    }

    #[test]
    fn streak_counts_days_outside_configured_subjects() {
        let mut snapshot = snapshot();
        snapshot.activities = ["Matemática", "Redação", "Matemática"]
            .into_iter()
            .zip(0..)
            .map(|(subject, days_ago)| ActivityRecord {
                student_id: 1,
                subject: subject.to_string(),
                content_topic: "Geral".to_string(),
                date: today() - Duration::days(days_ago),
                correct_count: 5,
                total_count: 10,
            })
            .collect();
        let config = AnalyticsConfig::default();
        let filter = ActivityFilter::default().with_window(today(), 30);
        let panel = diagnosis(&snapshot, &snapshot.students[0], &filter, today(), &config);
        assert_eq!(panel.streak, 3);
        assert_eq!(panel.hiatus.unwrap().subject, "Matemática");
    }

    #[test]
    fn exam_and_essay_panels_follow_scope() {
        let snapshot = snapshot();
        let config = AnalyticsConfig::default();
        let student_panel = exams(&snapshot, Some(&snapshot.students[0]), None, None, &config);
        assert_eq!(student_panel.cards.unwrap().best_total, 160);

        let group_panel = exams(&snapshot, None, Some(2), Some("Natureza"), &config);
        assert!(group_panel.cards.is_none());
        assert!(group_panel.progress.is_none());
        assert_eq!(group_panel.scope, "Projeto Medicina");

        assert!(essays(&snapshot, Some(&snapshot.students[0]), None, 5, &config).is_none());
        let panel = essays(&snapshot, None, None, 5, &config).unwrap();
        assert_eq!(panel.summary.count, 1);
        assert_eq!(panel.comparison.focus_students, vec![2]);
        assert!(panel.evolution.is_empty());
    }
}
