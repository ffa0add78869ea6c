use std::fmt::Write;

use chrono::NaiveDate;

use crate::config::AnalyticsConfig;
use crate::diagnostics::{HiatusStatus, Severity};
use crate::essays::CRITERIA;
use crate::filter::ActivityFilter;
use crate::models::{Snapshot, Student};
use crate::panels::{self, DiagnosisPanel, EssayPanel, ExamPanel, PerformancePanel};
use crate::ranking::{self, NoDataReason, RankingOutcome, RankingView, RowKind, StandingHistory};

pub fn render_performance(panel: &PerformancePanel) -> String {
    let mut output = String::new();
    let summary = &panel.summary;

    let _ = writeln!(output, "## Performance");
    if summary.records == 0 {
        let _ = writeln!(output, "No study activity in this window.");
        return output;
    }
    let _ = writeln!(
        output,
        "- {} questions, {} correct ({:.1}%)",
        summary.questions, summary.correct, summary.accuracy
    );
    let _ = writeln!(output, "- Volatility: {:.1} points", summary.volatility);
    match summary.trend.slope {
        Some(slope) => {
            let _ = writeln!(output, "- Trend: {} ({:+.2} points/day)", summary.trend.trend, slope);
        }
        None => {
            let _ = writeln!(output, "- Trend: {}", summary.trend.trend);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Subjects");
    let _ = writeln!(output, "| Subject | Student | Cohort |");
    let _ = writeln!(output, "|---|---|---|");
    for ((subject, student), cohort) in panel
        .subjects
        .subjects
        .iter()
        .zip(&panel.subjects.student)
        .zip(&panel.subjects.cohort)
    {
        let _ = writeln!(output, "| {} | {:.1}% | {:.1}% |", subject, student, cohort);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Activity History");
    let _ = writeln!(output, "| Date | Subject | Topic | Correct | Total | % |");
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for record in &panel.history {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {:.1}% |",
            record.date,
            record.subject,
            record.content_topic,
            record.correct_count,
            record.total_count,
            record.percent()
        );
    }

    output
}

pub fn render_diagnosis(panel: &DiagnosisPanel, config: &AnalyticsConfig) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "## Diagnostics");
    let _ = writeln!(output, "- Study streak: {} day(s)", panel.streak);
    match &panel.hiatus {
        Some(hiatus) => {
            let status = match hiatus.status {
                HiatusStatus::Critical => "critical",
                HiatusStatus::Healthy => "healthy",
            };
            let _ = writeln!(
                output,
                "- Longest hiatus: {} ({} days, {})",
                hiatus.subject, hiatus.days, status
            );
        }
        None => {
            let _ = writeln!(output, "- Longest hiatus: no activity recorded");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Weak Topics");
    if panel.weak_topics.is_empty() {
        let _ = writeln!(output, "No topic below {:.0}%.", config.weak_attention_below);
    } else {
        for topic in &panel.weak_topics {
            let severity = match topic.severity {
                Severity::Critical => "critical",
                Severity::Attention => "attention",
            };
            let _ = writeln!(
                output,
                "- {} / {}: {:.1}% ({})",
                topic.subject, topic.topic, topic.percent, severity
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Retention");
    if panel.retention.is_empty() {
        let _ = writeln!(output, "No topics studied in this window.");
    } else {
        let _ = writeln!(output, "| Subject | Topic | Accuracy | Days | Retention |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for estimate in panel.retention.iter().take(config.retention_report_limit) {
            let _ = writeln!(
                output,
                "| {} | {} | {:.1}% | {} | {:.1}% |",
                estimate.subject, estimate.topic, estimate.percent, estimate.days, estimate.retention
            );
        }
    }

    output
}

pub fn render_exams(panel: &ExamPanel) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "## Mock Exams ({})", panel.scope);
    match &panel.cards {
        Some(cards) => {
            let _ = writeln!(output, "- Complete sittings: {}", cards.completed);
            let _ = writeln!(output, "- Best area: {} ({} correct on average)", cards.best_area, cards.best_area_mean);
            let _ = writeln!(output, "- Worst area: {} ({} correct on average)", cards.worst_area, cards.worst_area_mean);
            let _ = writeln!(output, "- Best total: {} correct", cards.best_total);
        }
        None => {
            let _ = writeln!(output, "No complete sittings yet.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "| Area | Mean | Questions |");
    let _ = writeln!(output, "|---|---|---|");
    for area in &panel.overview {
        let _ = writeln!(output, "| {} | {:.1}% | {} |", area.area, area.mean_percent, area.questions);
    }

    if let Some(progress) = &panel.progress {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "### {} progress: mean {:.1}%, trend {}",
            progress.area, progress.mean_percent, progress.trend.trend
        );
        for day in &progress.daily {
            let _ = writeln!(output, "- {}: {:.1}%", day.date, day.mean_percent);
        }
    }

    output
}

pub fn render_ranking(outcome: &RankingOutcome) -> String {
    let mut output = String::new();

    let table = match outcome {
        RankingOutcome::Ranked(table) => table,
        RankingOutcome::NoData { sitting, view, reason } => {
            let message = match reason {
                NoDataReason::NoRecords => "no rows recorded",
                NoDataReason::NoQualifyingRows => "no student qualifies for this view",
            };
            let _ = writeln!(output, "## Ranking: {sitting} ({view})");
            let _ = writeln!(output, "No data: {message}.");
            return output;
        }
    };

    let _ = writeln!(output, "## Ranking: {} ({})", table.sitting, table.view);
    let _ = writeln!(
        output,
        "{} participant(s), sorted by {}",
        table.participants, table.sort_by
    );
    let _ = writeln!(output);

    let headers: Vec<String> = table.columns.iter().map(|column| column.to_string()).collect();
    let _ = writeln!(output, "| Position | Student | {} |", headers.join(" | "));
    let _ = writeln!(output, "|---|---|{}", "---|".repeat(headers.len()));
    for row in &table.rows {
        let scores: Vec<String> = row.scores.iter().map(|score| score.to_string()).collect();
        let (position, name) = match &row.kind {
            RowKind::Student { name, .. } => (row.position.clone().unwrap_or_default(), name.clone()),
            RowKind::Aggregate { label } => (String::new(), format!("**{label}**")),
        };
        let _ = writeln!(output, "| {} | {} | {} |", position, name, scores.join(" | "));
    }

    output
}

pub fn render_standing(history: &StandingHistory, name: &str) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "## Standing: {} ({})", name, history.view);
    if history.entries.is_empty() {
        let _ = writeln!(output, "No qualifying sittings.");
    } else {
        for entry in &history.entries {
            let total = entry.scores.last().copied().unwrap_or(0);
            let _ = writeln!(
                output,
                "- {}: {} with {} correct",
                entry.sitting,
                entry.standing(),
                total
            );
        }
    }
    if history.skipped > 0 {
        let _ = writeln!(output, "{} sitting(s) did not qualify for this view.", history.skipped);
    }

    output
}

pub fn render_essays(panel: &EssayPanel) -> String {
    let mut output = String::new();
    let summary = &panel.summary;

    let _ = writeln!(output, "## Essays ({})", panel.scope);
    let _ = writeln!(
        output,
        "- {} essay(s): latest {:.0}, best {:.0}, mean {:.1}",
        summary.count, summary.latest, summary.best, summary.mean
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "| Criterion | Focus | Baseline |");
    let _ = writeln!(output, "|---|---|---|");
    for (index, criterion) in CRITERIA.iter().enumerate() {
        let _ = writeln!(
            output,
            "| {} | {:.1} | {:.1} |",
            criterion, panel.comparison.focus[index], panel.comparison.baseline[index]
        );
    }

    if !panel.evolution.is_empty() {
        let totals: Vec<String> = panel
            .evolution
            .iter()
            .map(|(_, total, _)| format!("{total:.0}"))
            .collect();
        let _ = writeln!(output);
        let _ = writeln!(output, "Evolution: {}", totals.join(" -> "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### History");
    for row in &panel.history {
        let _ = writeln!(output, "- {}: {:.0} ({})", row.date, row.total, row.topic);
    }

    output
}

pub fn build_student_report(
    snapshot: &Snapshot,
    student: &Student,
    since_days: i64,
    today: NaiveDate,
    config: &AnalyticsConfig,
) -> String {
    let filter = ActivityFilter::for_student(student.student_id).with_window(today, since_days);
    let performance = panels::performance(snapshot, student, &filter, config);
    let diagnosis = panels::diagnosis(snapshot, student, &filter, today, config);
    let exams = panels::exams(snapshot, Some(student), None, None, config);
    let standing = ranking::standing_history(
        &snapshot.exams,
        &snapshot.students,
        student.student_id,
        RankingView::Full,
        config,
    );
    let essays = panels::essays(snapshot, Some(student), None, config.essay_top_n, config);

    let mut output = String::new();
    let _ = writeln!(output, "# Student Report: {}", student.name);
    let _ = writeln!(
        output,
        "{} (activity since {})",
        config.group_label(student.mentoring_group_id),
        filter.from.unwrap_or(today)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", render_performance(&performance));
    let _ = writeln!(output, "{}", render_diagnosis(&diagnosis, config));
    let _ = writeln!(output, "{}", render_exams(&exams));
    let _ = writeln!(output, "{}", render_standing(&standing, &student.name));
    match essays {
        Some(panel) => {
            let _ = write!(output, "{}", render_essays(&panel));
        }
        None => {
            let _ = writeln!(output, "## Essays");
            let _ = writeln!(output, "No essays submitted.");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityRecord, EssayRecord, ExamAttempt, SittingId};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
    }

    fn snapshot() -> Snapshot {
        let students = vec![
            Student {
                student_id: 1,
                name: "Ana Souza".to_string(),
                mentoring_group_id: 1,
            },
            Student {
                student_id: 2,
                name: "Bruno Lima".to_string(),
                mentoring_group_id: 1,
            },
        ];
        let activities = vec![
            ActivityRecord {
                student_id: 1,
                subject: "Matemática".to_string(),
                content_topic: "Funções".to_string(),
                date: today(),
                correct_count: 3,
                total_count: 10,
            },
            ActivityRecord {
                student_id: 1,
                subject: "Matemática".to_string(),
                content_topic: "Geometria".to_string(),
                date: today(),
                correct_count: 9,
                total_count: 10,
            },
        ];
        let mut exams = Vec::new();
        for (student_id, correct) in [(1, 40), (2, 35)] {
            for area in ["Linguagens", "Humanas", "Natureza", "Matemática"] {
                exams.push(ExamAttempt {
                    student_id,
                    exam_type: "Simulado".to_string(),
                    exam_number: 1,
                    exam_year: 2024,
                    area: area.to_string(),
                    correct_count: correct,
                    total_count: 45,
                    date: today(),
                });
            }
        }
        let essays = vec![EssayRecord {
            student_id: 1,
            date: today(),
            topic: "Mobilidade urbana".to_string(),
            scores: [160.0; 5],
            total_score: 800.0,
        }];
        Snapshot {
            students,
            activities,
            exams,
            essays,
        }
    }

    #[test]
    fn student_report_has_every_section() {
        let snapshot = snapshot();
        let config = AnalyticsConfig::default();
        let report = build_student_report(&snapshot, &snapshot.students[0], 30, today(), &config);

        assert!(report.starts_with("# Student Report: Ana Souza"));
        assert!(report.contains("Estude com Danilo"));
        assert!(report.contains("- 20 questions, 12 correct (60.0%)"));
        assert!(report.contains("- Study streak: 1 day(s)"));
        assert!(report.contains("- Matemática / Funções: 30.0% (critical)"));
        assert!(report.contains("| 2024-05-20 | Matemática | Geometria | 9 | 10 | 90.0% |"));
        assert!(report.contains("- Best total: 160 correct"));
        assert!(report.contains("- Simulado 1 (2024): 🥇 de 2 with 160 correct"));
        assert!(report.contains("- 1 essay(s): latest 800, best 800, mean 800.0"));
        assert!(report.contains("Evolution: 800"));
    }

    #[test]
    fn ranking_marks_aggregate_row() {
        let snapshot = snapshot();
        let config = AnalyticsConfig::default();
        let sitting = SittingId {
            exam_type: "Simulado".to_string(),
            exam_number: 1,
            exam_year: 2024,
        };
        let outcome = ranking::rank_sitting(
            &snapshot.exams,
            &snapshot.students,
            &sitting,
            RankingView::Full,
            None,
            &config,
        )
        .unwrap();
        let rendered = render_ranking(&outcome);

        assert!(rendered.contains("## Ranking: Simulado 1 (2024) (Full)"));
        assert!(rendered.contains("| 🥇 | Ana Souza |"));
        assert!(rendered.contains("| 🥈 | Bruno Lima |"));
        assert!(rendered.contains("**Top 10 average**"));
    }

    #[test]
    fn ranking_without_rows_says_so() {
        let config = AnalyticsConfig::default();
        let sitting = SittingId {
            exam_type: "Simulado".to_string(),
            exam_number: 9,
            exam_year: 2024,
        };
        let outcome =
            ranking::rank_sitting(&[], &[], &sitting, RankingView::DayOne, None, &config).unwrap();
        assert!(render_ranking(&outcome).contains("No data: no rows recorded."));
    }

    #[test]
    fn report_without_essays_notes_absence() {
        let mut snapshot = snapshot();
        snapshot.essays.clear();
        let config = AnalyticsConfig::default();
        let report = build_student_report(&snapshot, &snapshot.students[1], 30, today(), &config);
        assert!(report.contains("No essays submitted."));
        assert!(report.contains("No study activity in this window."));
    }
}
