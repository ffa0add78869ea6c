use std::collections::HashSet;

use chrono::{Duration, NaiveDate};

use crate::config::AnalyticsConfig;
use crate::models::{ActivityRecord, EssayRecord, ExamAttempt, Student};

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub student_id: Option<i64>,
    pub subject: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ActivityFilter {
    pub fn for_student(student_id: i64) -> Self {
        Self {
            student_id: Some(student_id),
            ..Self::default()
        }
    }

    pub fn with_window(mut self, today: NaiveDate, days: i64) -> Self {
        self.from = Some(today - Duration::days(days.max(0)));
        self.to = Some(today);
        self
    }

    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn matches(&self, record: &ActivityRecord, config: &AnalyticsConfig) -> bool {
        if !config.subjects.contains(&record.subject) {
            return false;
        }
        if let Some(student_id) = self.student_id {
            if record.student_id != student_id {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if &record.subject != subject {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.date > to {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, records: &[ActivityRecord], config: &AnalyticsConfig) -> Vec<ActivityRecord> {
        records
            .iter()
            .filter(|record| self.matches(record, config))
            .cloned()
            .collect()
    }
}

pub fn roster(students: &[Student], group: Option<u32>) -> Vec<Student> {
    students
        .iter()
        .filter(|student| group.map_or(true, |id| student.mentoring_group_id == id))
        .cloned()
        .collect()
}

pub fn roster_ids(students: &[Student]) -> HashSet<i64> {
    students.iter().map(|student| student.student_id).collect()
}

pub fn exams_for(exams: &[ExamAttempt], ids: &HashSet<i64>) -> Vec<ExamAttempt> {
    exams
        .iter()
        .filter(|row| ids.contains(&row.student_id))
        .cloned()
        .collect()
}

pub fn essays_for(essays: &[EssayRecord], ids: &HashSet<i64>) -> Vec<EssayRecord> {
    essays
        .iter()
        .filter(|row| ids.contains(&row.student_id))
        .cloned()
        .collect()
}

pub fn activity_history(records: &[ActivityRecord]) -> Vec<ActivityRecord> {
    let mut history = records.to_vec();
    history.sort_by(|a, b| b.date.cmp(&a.date));
    history
}
