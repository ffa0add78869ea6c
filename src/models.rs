use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub student_id: i64,
    pub name: String,
    pub mentoring_group_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub student_id: i64,
    pub subject: String,
    pub content_topic: String,
    pub date: NaiveDate,
    pub correct_count: u32,
    pub total_count: u32,
}

impl ActivityRecord {
    pub fn percent(&self) -> f64 {
        percent(self.correct_count as u64, self.total_count as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamAttempt {
    pub student_id: i64,
    pub exam_type: String,
    pub exam_number: u32,
    pub exam_year: i32,
    pub area: String,
    pub correct_count: u32,
    pub total_count: u32,
    pub date: NaiveDate,
}

impl ExamAttempt {
    pub fn sitting(&self) -> SittingId {
        SittingId {
            exam_type: self.exam_type.clone(),
            exam_number: self.exam_number,
            exam_year: self.exam_year,
        }
    }

    pub fn key(&self) -> SittingKey {
        SittingKey {
            student_id: self.student_id,
            sitting: self.sitting(),
        }
    }

    pub fn percent(&self) -> f64 {
        percent(self.correct_count as u64, self.total_count as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SittingId {
    pub exam_type: String,
    pub exam_number: u32,
    pub exam_year: i32,
}

impl fmt::Display for SittingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.exam_type, self.exam_number, self.exam_year)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SittingKey {
    pub student_id: i64,
    pub sitting: SittingId,
}

pub const TOPIC_NOT_INFORMED: &str = "Não informado";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EssayRecord {
    pub student_id: i64,
    pub date: NaiveDate,
    pub topic: String,
    pub scores: [f64; 5],
    pub total_score: f64,
}

impl EssayRecord {
    pub fn normalize_topic(topic: Option<&str>) -> String {
        match topic.map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => TOPIC_NOT_INFORMED.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub students: Vec<Student>,
    pub activities: Vec<ActivityRecord>,
    pub exams: Vec<ExamAttempt>,
    pub essays: Vec<EssayRecord>,
}

impl Snapshot {
    pub fn find_student(&self, key: &str) -> Option<&Student> {
        let key = key.trim();
        if let Ok(id) = key.parse::<i64>() {
            if let Some(student) = self.students.iter().find(|s| s.student_id == id) {
                return Some(student);
            }
        }
        self.students
            .iter()
            .find(|s| s.name == key)
            .or_else(|| self.students.iter().find(|s| s.name.eq_ignore_ascii_case(key)))
    }

    pub fn student_name(&self, student_id: i64) -> Option<&str> {
        self.students
            .iter()
            .find(|s| s.student_id == student_id)
            .map(|s| s.name.as_str())
    }
}

pub fn percent(correct: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_zero_total_is_zero() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(7, 10), 70.0);
    }

    #[test]
    fn blank_topics_become_sentinel() {
        assert_eq!(EssayRecord::normalize_topic(None), TOPIC_NOT_INFORMED);
        assert_eq!(EssayRecord::normalize_topic(Some("  ")), TOPIC_NOT_INFORMED);
        assert_eq!(EssayRecord::normalize_topic(Some("Fake news")), "Fake news");
    }

    #[test]
    fn find_student_by_id_or_name() {
        let snapshot = Snapshot {
            students: vec![
                Student {
                    student_id: 7,
                    name: "Ana Souza".to_string(),
                    mentoring_group_id: 1,
                },
                Student {
                    student_id: 8,
                    name: "Bruno Lima".to_string(),
                    mentoring_group_id: 2,
                },
            ],
            ..Snapshot::default()
        };
        assert_eq!(snapshot.find_student("8").map(|s| s.student_id), Some(8));
        assert_eq!(snapshot.find_student("ana souza").map(|s| s.student_id), Some(7));
        assert!(snapshot.find_student("Carla").is_none());
    }
}
