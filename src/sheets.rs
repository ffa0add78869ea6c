use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{ActivityRecord, EssayRecord, ExamAttempt, Snapshot, Student};

pub const STUDENTS_TAB: &str = "alunos.csv";
pub const ACTIVITIES_TAB: &str = "atividades.csv";
pub const EXAMS_TAB: &str = "simulados.csv";
pub const ESSAYS_TAB: &str = "redacoes.csv";

#[derive(Debug, Deserialize)]
struct StudentRow {
    #[serde(default)]
    id_aluno: String,
    #[serde(default)]
    nome: String,
    #[serde(default)]
    id_mentoria: String,
}

#[derive(Debug, Deserialize)]
struct ActivityRow {
    #[serde(default)]
    id_aluno: String,
    #[serde(default)]
    materia: String,
    #[serde(default)]
    conteudo: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    acertos: String,
    #[serde(default)]
    total: String,
}

#[derive(Debug, Deserialize)]
struct ExamRow {
    #[serde(default)]
    id_aluno: String,
    #[serde(default)]
    tipo: String,
    #[serde(default)]
    numero: String,
    #[serde(default)]
    ano: String,
    #[serde(default)]
    area: String,
    #[serde(default)]
    acertos: String,
    #[serde(default)]
    total: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct EssayRow {
    #[serde(default)]
    id_aluno: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    tema: Option<String>,
    #[serde(default)]
    c1: String,
    #[serde(default)]
    c2: String,
    #[serde(default)]
    c3: String,
    #[serde(default)]
    c4: String,
    #[serde(default)]
    c5: String,
    #[serde(default)]
    total: String,
}

fn read_tab<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let csv_error = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        rows.push(result.map_err(csv_error)?);
    }
    Ok(rows)
}

/// Numeric cell as a float; blanks and text become 0.
pub fn coerce_number(cell: &str) -> f64 {
    let cleaned = cell.trim().replace(',', ".");
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

pub fn coerce_count(cell: &str) -> u32 {
    let value = coerce_number(cell);
    if value <= 0.0 {
        0
    } else {
        value.round() as u32
    }
}

fn parse_id(cell: &str) -> Option<i64> {
    let cleaned = cell.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().filter(|v| v.fract() == 0.0).map(|v| v as i64))
}

/// Day-first dates, ISO dates, and timestamps reduced to their calendar date.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    for format in ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(cell, format) {
            return Some(date);
        }
    }
    for format in ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(cell, format) {
            return Some(timestamp.date());
        }
    }
    DateTime::parse_from_rfc3339(cell)
        .ok()
        .map(|timestamp| timestamp.naive_local().date())
}

fn load_students(dir: &Path) -> Result<Vec<Student>> {
    let rows: Vec<StudentRow> = read_tab(&dir.join(STUDENTS_TAB))?;
    let mut students = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(student_id) = parse_id(&row.id_aluno) else {
            tracing::warn!(name = %row.nome, "skipping student without id");
            continue;
        };
        students.push(Student {
            student_id,
            name: row.nome.trim().to_string(),
            mentoring_group_id: coerce_count(&row.id_mentoria),
        });
    }
    Ok(students)
}

fn load_activities(dir: &Path) -> Result<Vec<ActivityRecord>> {
    let rows: Vec<ActivityRow> = read_tab(&dir.join(ACTIVITIES_TAB))?;
    let mut dropped = 0usize;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(student_id), Some(date)) = (parse_id(&row.id_aluno), parse_date(&row.data)) else {
            dropped += 1;
            continue;
        };
        let total_count = coerce_count(&row.total);
        records.push(ActivityRecord {
            student_id,
            subject: row.materia.trim().to_string(),
            content_topic: row.conteudo.trim().to_string(),
            date,
            correct_count: coerce_count(&row.acertos).min(total_count),
            total_count,
        });
    }
    if dropped > 0 {
        tracing::warn!(dropped, tab = ACTIVITIES_TAB, "rows without student id or date");
    }
    Ok(records)
}

fn load_exams(dir: &Path) -> Result<Vec<ExamAttempt>> {
    let rows: Vec<ExamRow> = read_tab(&dir.join(EXAMS_TAB))?;
    let mut dropped = 0usize;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(student_id), Some(date)) = (parse_id(&row.id_aluno), parse_date(&row.data)) else {
            dropped += 1;
            continue;
        };
        let total_count = coerce_count(&row.total);
        records.push(ExamAttempt {
            student_id,
            exam_type: row.tipo.trim().to_string(),
            exam_number: coerce_count(&row.numero),
            exam_year: coerce_count(&row.ano) as i32,
            area: row.area.trim().to_string(),
            correct_count: coerce_count(&row.acertos).min(total_count),
            total_count,
            date,
        });
    }
    if dropped > 0 {
        tracing::warn!(dropped, tab = EXAMS_TAB, "rows without student id or date");
    }
    Ok(records)
}

fn load_essays(dir: &Path) -> Result<Vec<EssayRecord>> {
    let path = dir.join(ESSAYS_TAB);
    if !path.exists() {
        tracing::warn!(path = %path.display(), "essay tab missing, continuing without essays");
        return Ok(Vec::new());
    }

    let rows: Vec<EssayRow> = read_tab(&path)?;
    let mut dropped = 0usize;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(student_id), Some(date)) = (parse_id(&row.id_aluno), parse_date(&row.data)) else {
            dropped += 1;
            continue;
        };
        let scores = [&row.c1, &row.c2, &row.c3, &row.c4, &row.c5].map(|cell| coerce_number(cell));
        let total_score = if row.total.trim().is_empty() {
            scores.iter().sum()
        } else {
            coerce_number(&row.total)
        };
        records.push(EssayRecord {
            student_id,
            date,
            topic: EssayRecord::normalize_topic(row.tema.as_deref()),
            scores,
            total_score,
        });
    }
    if dropped > 0 {
        tracing::warn!(dropped, tab = ESSAYS_TAB, "rows without student id or date");
    }
    Ok(records)
}

pub fn load_snapshot(dir: &Path) -> Result<Snapshot> {
    if !dir.is_dir() {
        return Err(Error::Source(format!("{} is not a directory", dir.display())));
    }

    Ok(Snapshot {
        students: load_students(dir)?,
        activities: load_activities(dir)?,
        exams: load_exams(dir)?,
        essays: load_essays(dir)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn coercion_turns_garbage_into_zero() {
        assert_eq!(coerce_count("12"), 12);
        assert_eq!(coerce_count(" 7.0 "), 7);
        assert_eq!(coerce_count("abc"), 0);
        assert_eq!(coerce_count(""), 0);
        assert_eq!(coerce_count("-3"), 0);
        assert_eq!(coerce_number("8,5"), 8.5);
    }

    #[test]
    fn dates_are_day_first() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date("05/03/2024"), Some(expected));
        assert_eq!(parse_date("2024-03-05"), Some(expected));
        assert_eq!(parse_date("05/03/2024 14:30:00"), Some(expected));
        assert_eq!(parse_date("2024-03-05T23:10:00-03:00"), Some(expected));
        assert_eq!(parse_date("ontem"), None);
    }

    #[test]
    fn loads_all_tabs_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            STUDENTS_TAB,
            "id_aluno,nome,id_mentoria\n1,Ana Souza,1\n2,Bruno Lima,2\n",
        );
        write(
            dir.path(),
            ACTIVITIES_TAB,
            "id_aluno,materia,conteudo,data,acertos,total\n\
             1,Matemática,Funções,01/04/2024,7,10\n\
             1,Física,Óptica,02/04/2024,x,10\n\
             1,Física,Óptica,,5,10\n",
        );
        write(
            dir.path(),
            EXAMS_TAB,
            "id_aluno,tipo,numero,ano,area,acertos,total,data\n\
             1,Simulado,1,2024,Linguagens,40,45,07/04/2024\n",
        );
        write(
            dir.path(),
            ESSAYS_TAB,
            "id_aluno,data,tema,c1,c2,c3,c4,c5,total\n\
             2,10/04/2024,,160,160,140,160,120,\n",
        );

        let snapshot = load_snapshot(dir.path()).unwrap();
        assert_eq!(snapshot.students.len(), 2);
        assert_eq!(snapshot.students[1].mentoring_group_id, 2);
        assert_eq!(snapshot.activities.len(), 2);
        assert_eq!(snapshot.activities[1].correct_count, 0);
        assert_eq!(snapshot.exams[0].exam_year, 2024);
        assert_eq!(snapshot.essays[0].total_score, 740.0);
        assert_eq!(snapshot.essays[0].topic, crate::models::TOPIC_NOT_INFORMED);
    }

    #[test]
    fn missing_required_tab_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), STUDENTS_TAB, "id_aluno,nome,id_mentoria\n1,Ana,1\n");
        assert!(matches!(load_snapshot(dir.path()), Err(Error::Csv { .. })));
    }
}
