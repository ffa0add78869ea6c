use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::error::{Error, Result};
use crate::models::{ExamAttempt, SittingId, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum RankingView {
    Full,
    DayOne,
    DayTwo,
}

impl fmt::Display for RankingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RankingView::Full => "Full",
            RankingView::DayOne => "Day 1",
            RankingView::DayTwo => "Day 2",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScoreColumn {
    Area(String),
    DayOne,
    DayTwo,
    Overall,
}

impl ScoreColumn {
    pub fn parse(key: &str, config: &AnalyticsConfig) -> Result<Self> {
        let normalized = key.trim().to_lowercase();
        match normalized.as_str() {
            "day1" | "day-one" | "dia1" | "dia 1" | "total dia 1" => return Ok(ScoreColumn::DayOne),
            "day2" | "day-two" | "dia2" | "dia 2" | "total dia 2" => return Ok(ScoreColumn::DayTwo),
            "total" | "overall" | "geral" | "total geral" => return Ok(ScoreColumn::Overall),
            _ => {}
        }
        config
            .areas
            .iter()
            .find(|area| area.to_lowercase() == normalized)
            .map(|area| ScoreColumn::Area(area.clone()))
            .ok_or_else(|| Error::InvalidColumn(key.to_string()))
    }
}

impl fmt::Display for ScoreColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreColumn::Area(area) => f.write_str(area),
            ScoreColumn::DayOne => f.write_str("Day 1 total"),
            ScoreColumn::DayTwo => f.write_str("Day 2 total"),
            ScoreColumn::Overall => f.write_str("Overall total"),
        }
    }
}

impl RankingView {
    pub fn columns(&self, config: &AnalyticsConfig) -> Vec<ScoreColumn> {
        let areas = |list: &[String]| -> Vec<ScoreColumn> {
            list.iter().cloned().map(ScoreColumn::Area).collect()
        };
        match self {
            RankingView::Full => {
                let mut columns = areas(&config.areas);
                columns.extend([ScoreColumn::DayOne, ScoreColumn::DayTwo, ScoreColumn::Overall]);
                columns
            }
            RankingView::DayOne => {
                let mut columns = areas(&config.day_one);
                columns.push(ScoreColumn::DayOne);
                columns
            }
            RankingView::DayTwo => {
                let mut columns = areas(&config.day_two);
                columns.push(ScoreColumn::DayTwo);
                columns
            }
        }
    }

    pub fn total_column(&self) -> ScoreColumn {
        match self {
            RankingView::Full => ScoreColumn::Overall,
            RankingView::DayOne => ScoreColumn::DayOne,
            RankingView::DayTwo => ScoreColumn::DayTwo,
        }
    }

    fn qualifies(&self, participant: &Participant, config: &AnalyticsConfig) -> bool {
        let has_all = |list: &[String]| list.iter().all(|area| participant.correct.contains_key(area));
        match self {
            RankingView::Full => {
                has_all(&config.areas) && participant.total_questions == config.full_exam_questions
            }
            RankingView::DayOne => has_all(&config.day_one),
            RankingView::DayTwo => has_all(&config.day_two),
        }
    }
}

pub fn position_label(rank: usize) -> String {
    match rank {
        0 => "🥇".to_string(),
        1 => "🥈".to_string(),
        2 => "🥉".to_string(),
        _ => format!("{}º", rank + 1),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowKind {
    Student { student_id: i64, name: String },
    Aggregate { label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub kind: RowKind,
    pub position: Option<String>,
    pub scores: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingTable {
    pub sitting: SittingId,
    pub view: RankingView,
    pub columns: Vec<ScoreColumn>,
    pub sort_by: ScoreColumn,
    pub participants: usize,
    pub rows: Vec<RankingRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoDataReason {
    NoRecords,
    NoQualifyingRows,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RankingOutcome {
    Ranked(RankingTable),
    NoData {
        sitting: SittingId,
        view: RankingView,
        reason: NoDataReason,
    },
}

#[derive(Debug, Clone)]
struct Participant {
    student_id: i64,
    correct: BTreeMap<String, u32>,
    total_questions: u32,
}

impl Participant {
    fn score(&self, column: &ScoreColumn, config: &AnalyticsConfig) -> u32 {
        let sum = |list: &[String]| list.iter().filter_map(|a| self.correct.get(a)).sum::<u32>();
        match column {
            ScoreColumn::Area(area) => self.correct.get(area).copied().unwrap_or(0),
            ScoreColumn::DayOne => sum(&config.day_one),
            ScoreColumn::DayTwo => sum(&config.day_two),
            ScoreColumn::Overall => sum(&config.day_one) + sum(&config.day_two),
        }
    }
}

fn pivot<'a, I>(rows: I) -> Vec<Participant>
where
    I: IntoIterator<Item = &'a ExamAttempt>,
{
    let mut by_student: BTreeMap<i64, Participant> = BTreeMap::new();
    for row in rows {
        let participant = by_student.entry(row.student_id).or_insert_with(|| Participant {
            student_id: row.student_id,
            correct: BTreeMap::new(),
            total_questions: 0,
        });
        *participant.correct.entry(row.area.clone()).or_insert(0) += row.correct_count;
        participant.total_questions += row.total_count;
    }
    by_student.into_values().collect()
}

#[derive(Debug, Clone)]
struct Entry {
    student_id: i64,
    name: String,
    scores: Vec<u32>,
}

/// Sort column descending, then view total descending, then name, then id.
fn compare_entries(a: &Entry, b: &Entry, sort_idx: usize, total_idx: usize) -> Ordering {
    b.scores[sort_idx]
        .cmp(&a.scores[sort_idx])
        .then_with(|| b.scores[total_idx].cmp(&a.scores[total_idx]))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

fn column_index(columns: &[ScoreColumn], column: &ScoreColumn) -> Result<usize> {
    columns
        .iter()
        .position(|candidate| candidate == column)
        .ok_or_else(|| Error::InvalidColumn(column.to_string()))
}

fn qualified_entries(
    participants: Vec<Participant>,
    view: RankingView,
    columns: &[ScoreColumn],
    names: &HashMap<i64, &str>,
    config: &AnalyticsConfig,
) -> Vec<Entry> {
    participants
        .into_iter()
        .filter(|participant| view.qualifies(participant, config))
        .map(|participant| Entry {
            student_id: participant.student_id,
            name: names
                .get(&participant.student_id)
                .map(|name| name.to_string())
                .unwrap_or_default(),
            scores: columns.iter().map(|c| participant.score(c, config)).collect(),
        })
        .collect()
}

fn summary_row(entries: &[Entry], columns: usize, size: usize) -> RankingRow {
    let top = &entries[..entries.len().min(size)];
    let scores = (0..columns)
        .map(|idx| {
            if top.is_empty() {
                return 0;
            }
            let mean = top.iter().map(|e| e.scores[idx] as f64).sum::<f64>() / top.len() as f64;
            mean.round_ties_even() as u32
        })
        .collect();

    RankingRow {
        kind: RowKind::Aggregate {
            label: format!("Top {size} average"),
        },
        position: None,
        scores,
    }
}

/// Ranks the roster on one sitting.
///
/// `sort_by` defaults to the view's total column and must be one of the
/// view's columns.
pub fn rank_sitting(
    exams: &[ExamAttempt],
    roster: &[Student],
    sitting: &SittingId,
    view: RankingView,
    sort_by: Option<ScoreColumn>,
    config: &AnalyticsConfig,
) -> Result<RankingOutcome> {
    let columns = view.columns(config);
    let sort_by = sort_by.unwrap_or_else(|| view.total_column());
    let sort_idx = column_index(&columns, &sort_by)?;
    let total_idx = column_index(&columns, &view.total_column())?;

    let names: HashMap<i64, &str> = roster
        .iter()
        .map(|student| (student.student_id, student.name.as_str()))
        .collect();
    let rows: Vec<&ExamAttempt> = exams
        .iter()
        .filter(|row| &row.sitting() == sitting && names.contains_key(&row.student_id))
        .collect();

    if rows.is_empty() {
        return Ok(RankingOutcome::NoData {
            sitting: sitting.clone(),
            view,
            reason: NoDataReason::NoRecords,
        });
    }

    let mut entries = qualified_entries(pivot(rows), view, &columns, &names, config);
    if entries.is_empty() {
        tracing::debug!(%sitting, %view, "no qualifying participants");
        return Ok(RankingOutcome::NoData {
            sitting: sitting.clone(),
            view,
            reason: NoDataReason::NoQualifyingRows,
        });
    }
    entries.sort_by(|a, b| compare_entries(a, b, sort_idx, total_idx));

    let summary = summary_row(&entries, columns.len(), config.ranking_summary_size);
    let summary_value = summary.scores[sort_idx];
    // ties on the sort column keep students ahead of the summary row
    let summary_at = entries.partition_point(|e| e.scores[sort_idx] >= summary_value);

    let participants = entries.len();
    let mut rows: Vec<RankingRow> = entries
        .into_iter()
        .enumerate()
        .map(|(rank, entry)| RankingRow {
            kind: RowKind::Student {
                student_id: entry.student_id,
                name: entry.name,
            },
            position: Some(position_label(rank)),
            scores: entry.scores,
        })
        .collect();
    rows.insert(summary_at, summary);

    Ok(RankingOutcome::Ranked(RankingTable {
        sitting: sitting.clone(),
        view,
        columns,
        sort_by,
        participants,
        rows,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandingEntry {
    pub sitting: SittingId,
    pub rank: usize,
    pub position: String,
    pub participants: usize,
    pub scores: Vec<u32>,
}

impl StandingEntry {
    pub fn standing(&self) -> String {
        format!("{} de {}", self.position, self.participants)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StandingHistory {
    pub student_id: i64,
    pub view: RankingView,
    pub columns: Vec<ScoreColumn>,
    pub entries: Vec<StandingEntry>,
    pub skipped: usize,
}

/// Position of one student in every sitting they took.
///
/// Each sitting is ranked against the roster students who sat it, by the
/// view's total column.
pub fn standing_history(
    exams: &[ExamAttempt],
    students: &[Student],
    student_id: i64,
    view: RankingView,
    config: &AnalyticsConfig,
) -> StandingHistory {
    let columns = view.columns(config);
    let total_idx = columns.len() - 1;
    let names: HashMap<i64, &str> = students
        .iter()
        .map(|student| (student.student_id, student.name.as_str()))
        .collect();

    let mut sittings: Vec<SittingId> = Vec::new();
    for row in exams.iter().filter(|row| row.student_id == student_id) {
        let sitting = row.sitting();
        if !sittings.contains(&sitting) {
            sittings.push(sitting);
        }
    }

    let mut entries = Vec::new();
    let mut skipped = 0;
    for sitting in sittings {
        let participants = pivot(
            exams
                .iter()
                .filter(|row| row.sitting() == sitting && names.contains_key(&row.student_id)),
        );
        let mut ranked = qualified_entries(participants, view, &columns, &names, config);
        ranked.sort_by(|a, b| compare_entries(a, b, total_idx, total_idx));

        let Some(rank) = ranked.iter().position(|e| e.student_id == student_id) else {
            skipped += 1;
            continue;
        };
        entries.push(StandingEntry {
            position: position_label(rank),
            participants: ranked.len(),
            scores: ranked[rank].scores.clone(),
            rank,
            sitting,
        });
    }

    tracing::debug!(student_id, %view, shown = entries.len(), skipped, "standing history");

    StandingHistory {
        student_id,
        view,
        columns,
        entries,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sitting() -> SittingId {
        SittingId {
            exam_type: "Simulado".to_string(),
            exam_number: 1,
            exam_year: 2024,
        }
    }

    fn student(id: i64, name: &str) -> Student {
        Student {
            student_id: id,
            name: name.to_string(),
            mentoring_group_id: 1,
        }
    }

    fn rows(student_id: i64, areas: &[(&str, u32, u32)]) -> Vec<ExamAttempt> {
        areas
            .iter()
            .map(|(area, correct, total)| ExamAttempt {
                student_id,
                exam_type: "Simulado".to_string(),
                exam_number: 1,
                exam_year: 2024,
                area: area.to_string(),
                correct_count: *correct,
                total_count: *total,
                date: NaiveDate::from_ymd_opt(2024, 8, 4).unwrap(),
            })
            .collect()
    }

    fn full(student_id: i64, scores: [u32; 4]) -> Vec<ExamAttempt> {
        rows(
            student_id,
            &[
                ("Linguagens", scores[0], 45),
                ("Humanas", scores[1], 45),
                ("Natureza", scores[2], 45),
                ("Matemática", scores[3], 45),
            ],
        )
    }

    fn ranked(outcome: RankingOutcome) -> RankingTable {
        match outcome {
            RankingOutcome::Ranked(table) => table,
            RankingOutcome::NoData { reason, .. } => panic!("expected ranking, got {reason:?}"),
        }
    }

    fn student_ids(table: &RankingTable) -> Vec<i64> {
        table
            .rows
            .iter()
            .filter_map(|row| match &row.kind {
                RowKind::Student { student_id, .. } => Some(*student_id),
                RowKind::Aggregate { .. } => None,
            })
            .collect()
    }

    #[test]
    fn position_labels() {
        assert_eq!(position_label(0), "🥇");
        assert_eq!(position_label(1), "🥈");
        assert_eq!(position_label(2), "🥉");
        assert_eq!(position_label(3), "4º");
        assert_eq!(position_label(11), "12º");
    }

    #[test]
    fn full_view_totals_blocks() {
        let config = AnalyticsConfig::default();
        let exams = full(1, [40, 40, 40, 40]);
        let roster = vec![student(1, "Ana")];
        let table = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::Full, None, &config).unwrap(),
        );
        assert_eq!(table.columns.len(), 7);
        assert_eq!(table.participants, 1);
        let first = &table.rows[0];
        assert_eq!(first.position.as_deref(), Some("🥇"));
        assert_eq!(first.scores, vec![40, 40, 40, 40, 80, 80, 160]);
        assert!(matches!(table.rows[1].kind, RowKind::Aggregate { .. }));
        assert_eq!(table.rows[1].position, None);
    }

    #[test]
    fn full_view_requires_complete_sitting() {
        let config = AnalyticsConfig::default();
        let mut exams = full(1, [40, 40, 40, 40]);
        exams.extend(rows(2, &[("Linguagens", 44, 45), ("Humanas", 44, 45)]));
        let roster = vec![student(1, "Ana"), student(2, "Bia")];

        let full_table = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::Full, None, &config).unwrap(),
        );
        assert_eq!(student_ids(&full_table), vec![1]);

        let day_one = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::DayOne, None, &config).unwrap(),
        );
        assert_eq!(student_ids(&day_one), vec![2, 1]);
        assert_eq!(day_one.rows[0].scores, vec![44, 44, 88]);

        let day_two = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::DayTwo, None, &config).unwrap(),
        );
        assert_eq!(student_ids(&day_two), vec![1]);
    }

    #[test]
    fn empty_sitting_reports_no_data() {
        let config = AnalyticsConfig::default();
        let roster = vec![student(1, "Ana")];
        let outcome =
            rank_sitting(&[], &roster, &sitting(), RankingView::Full, None, &config).unwrap();
        assert!(matches!(
            outcome,
            RankingOutcome::NoData {
                reason: NoDataReason::NoRecords,
                ..
            }
        ));

        let partial = rows(1, &[("Linguagens", 30, 45)]);
        let outcome =
            rank_sitting(&partial, &roster, &sitting(), RankingView::Full, None, &config).unwrap();
        assert!(matches!(
            outcome,
            RankingOutcome::NoData {
                reason: NoDataReason::NoQualifyingRows,
                ..
            }
        ));
    }

    #[test]
    fn students_outside_roster_are_ignored() {
        let config = AnalyticsConfig::default();
        let mut exams = full(1, [30, 30, 30, 30]);
        exams.extend(full(99, [45, 45, 45, 45]));
        let roster = vec![student(1, "Ana")];
        let table = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::Full, None, &config).unwrap(),
        );
        assert_eq!(student_ids(&table), vec![1]);
    }

    #[test]
    fn ties_are_deterministic() {
        let config = AnalyticsConfig::default();
        let mut exams = full(3, [30, 30, 30, 30]);
        exams.extend(full(1, [30, 30, 30, 30]));
        exams.extend(full(2, [35, 25, 30, 30]));
        let roster = vec![student(1, "Carla"), student(2, "Bruno"), student(3, "Ana")];

        let first = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::Full, None, &config).unwrap(),
        );
        let second = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::Full, None, &config).unwrap(),
        );
        assert_eq!(student_ids(&first), vec![3, 2, 1]);
        assert_eq!(first.rows, second.rows);
    }

    #[test]
    fn sorting_by_area_column() {
        let config = AnalyticsConfig::default();
        let mut exams = full(1, [40, 10, 10, 10]);
        exams.extend(full(2, [20, 40, 40, 40]));
        let roster = vec![student(1, "Ana"), student(2, "Bia")];

        let by_area = ScoreColumn::parse("linguagens", &config).unwrap();
        let table = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::Full, Some(by_area), &config)
                .unwrap(),
        );
        assert_eq!(student_ids(&table), vec![1, 2]);

        let not_in_view = Some(ScoreColumn::Area("Natureza".to_string()));
        assert!(matches!(
            rank_sitting(&exams, &roster, &sitting(), RankingView::DayOne, not_in_view, &config),
            Err(Error::InvalidColumn(_))
        ));
    }

    #[test]
    fn summary_row_averages_top_entries() {
        let config = AnalyticsConfig {
            ranking_summary_size: 2,
            ..AnalyticsConfig::default()
        };
        let mut exams = full(1, [40, 40, 40, 40]);
        exams.extend(full(2, [30, 30, 30, 31]));
        exams.extend(full(3, [10, 10, 10, 10]));
        let roster = vec![student(1, "Ana"), student(2, "Bia"), student(3, "Caio")];

        let table = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::Full, None, &config).unwrap(),
        );
        assert_eq!(table.rows.len(), 4);
        let summary = &table.rows[1];
        assert!(matches!(summary.kind, RowKind::Aggregate { .. }));
        // top two totals 160 and 121 average to 140.5, rounded half to even
        assert_eq!(summary.scores[6], 140);
        assert_eq!(table.rows[2].position.as_deref(), Some("🥈"));
        assert_eq!(table.rows[3].position.as_deref(), Some("🥉"));
    }

    #[test]
    fn summary_row_follows_tied_students() {
        let config = AnalyticsConfig::default();
        let mut exams = full(1, [30, 30, 30, 30]);
        exams.extend(full(2, [30, 30, 30, 30]));
        let roster = vec![student(1, "Ana"), student(2, "Bia")];
        let table = ranked(
            rank_sitting(&exams, &roster, &sitting(), RankingView::Full, None, &config).unwrap(),
        );
        assert!(matches!(table.rows[2].kind, RowKind::Aggregate { .. }));
    }

    #[test]
    fn standing_history_skips_unqualified_sittings() {
        let config = AnalyticsConfig::default();
        let mut exams = full(1, [30, 30, 30, 30]);
        exams.extend(full(2, [40, 40, 40, 40]));
        exams.extend(full(3, [20, 20, 20, 20]));
        let mut second = rows(1, &[("Linguagens", 40, 45), ("Humanas", 40, 45)]);
        for row in &mut second {
            row.exam_number = 2;
        }
        exams.extend(second);
        let students = vec![student(1, "Ana"), student(2, "Bia"), student(3, "Caio")];

        let history = standing_history(&exams, &students, 1, RankingView::Full, &config);
        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.skipped, 1);
        let entry = &history.entries[0];
        assert_eq!(entry.rank, 1);
        assert_eq!(entry.standing(), "🥈 de 3");
        assert_eq!(entry.scores[6], 120);

        let day_one = standing_history(&exams, &students, 1, RankingView::DayOne, &config);
        assert_eq!(day_one.entries.len(), 2);
        assert_eq!(day_one.skipped, 0);
        assert_eq!(day_one.entries[1].position, "🥇");
    }

    #[test]
    fn standing_history_ignores_students_outside_roster() {
        let config = AnalyticsConfig::default();
        let mut exams = full(1, [30, 30, 30, 30]);
        exams.extend(full(99, [44, 44, 44, 44]));
        let students = vec![student(1, "Ana")];

        let history = standing_history(&exams, &students, 1, RankingView::Full, &config);
        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.entries[0].standing(), "🥇 de 1");

        let table = ranked(
            rank_sitting(&exams, &students, &sitting(), RankingView::Full, None, &config).unwrap(),
        );
        assert_eq!(table.participants, history.entries[0].participants);
    }
}
