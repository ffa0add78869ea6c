use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ActivityRecord, EssayRecord, ExamAttempt, Snapshot, Student};

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportCounts {
    pub students: usize,
    pub activities: usize,
    pub exams: usize,
    pub essays: usize,
}

/// Stable keys so re-importing the same export inserts nothing twice.
/// Identical rows get an occurrence suffix.
fn source_keys<T>(rows: &[T], natural_key: impl Fn(&T) -> String) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    rows.iter()
        .map(|row| {
            let key = natural_key(row);
            let count = seen.entry(key.clone()).or_insert(0);
            *count += 1;
            format!("{key}#{count}")
        })
        .collect()
}

fn activity_key(row: &ActivityRecord) -> String {
    format!(
        "activity:{}:{}:{}:{}:{}:{}",
        row.student_id, row.subject, row.content_topic, row.date, row.correct_count, row.total_count
    )
}

fn exam_key(row: &ExamAttempt) -> String {
    format!(
        "exam:{}:{}:{}:{}:{}:{}",
        row.student_id, row.exam_type, row.exam_number, row.exam_year, row.area, row.date
    )
}

fn essay_key(row: &EssayRecord) -> String {
    format!("essay:{}:{}:{}:{}", row.student_id, row.date, row.topic, row.total_score)
}

async fn upsert_student(pool: &PgPool, student: &Student) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO mentoring.students (id, full_name, mentoring_group)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE
        SET full_name = EXCLUDED.full_name, mentoring_group = EXCLUDED.mentoring_group
        "#,
    )
    .bind(student.student_id)
    .bind(&student.name)
    .bind(student.mentoring_group_id as i32)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_activity(pool: &PgPool, row: &ActivityRecord, source_key: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO mentoring.activities
        (id, student_id, subject, content_topic, studied_on, correct_count, total_count, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(row.student_id)
    .bind(&row.subject)
    .bind(&row.content_topic)
    .bind(row.date)
    .bind(row.correct_count as i32)
    .bind(row.total_count as i32)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_exam(pool: &PgPool, row: &ExamAttempt, source_key: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO mentoring.exams
        (id, student_id, exam_type, exam_number, exam_year, area,
         correct_count, total_count, taken_on, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(row.student_id)
    .bind(&row.exam_type)
    .bind(row.exam_number as i32)
    .bind(row.exam_year)
    .bind(&row.area)
    .bind(row.correct_count as i32)
    .bind(row.total_count as i32)
    .bind(row.date)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_essay(pool: &PgPool, row: &EssayRecord, source_key: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO mentoring.essays
        (id, student_id, written_on, topic, c1, c2, c3, c4, c5, total_score, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(row.student_id)
    .bind(row.date)
    .bind(&row.topic)
    .bind(row.scores[0])
    .bind(row.scores[1])
    .bind(row.scores[2])
    .bind(row.scores[3])
    .bind(row.scores[4])
    .bind(row.total_score)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn import_snapshot(pool: &PgPool, snapshot: &Snapshot) -> Result<ImportCounts> {
    let mut counts = ImportCounts::default();

    for student in &snapshot.students {
        upsert_student(pool, student).await?;
        counts.students += 1;
    }

    let keys = source_keys(&snapshot.activities, activity_key);
    for (row, key) in snapshot.activities.iter().zip(&keys) {
        if insert_activity(pool, row, key).await? {
            counts.activities += 1;
        }
    }

    let keys = source_keys(&snapshot.exams, exam_key);
    for (row, key) in snapshot.exams.iter().zip(&keys) {
        if insert_exam(pool, row, key).await? {
            counts.exams += 1;
        }
    }

    let keys = source_keys(&snapshot.essays, essay_key);
    for (row, key) in snapshot.essays.iter().zip(&keys) {
        if insert_essay(pool, row, key).await? {
            counts.essays += 1;
        }
    }

    tracing::info!(
        students = counts.students,
        activities = counts.activities,
        exams = counts.exams,
        essays = counts.essays,
        "import finished"
    );
    Ok(counts)
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> Result<ImportCounts> {
    let students = vec![
        (1, "Ana Souza", 1),
        (2, "Bruno Lima", 1),
        (3, "Carla Mendes", 2),
    ];
    let students: Vec<Student> = students
        .into_iter()
        .map(|(student_id, name, mentoring_group_id)| Student {
            student_id,
            name: name.to_string(),
            mentoring_group_id,
        })
        .collect();

    let logs = [
        (1, "Matemática", "Funções", 1, 7, 10),
        (1, "Matemática", "Funções", 2, 9, 10),
        (1, "Física", "Cinemática", 3, 12, 20),
        (1, "Química", "Estequiometria", 12, 4, 10),
        (1, "Biologia", "Citologia", 20, 17, 20),
        (2, "Linguagens", "Interpretação", 0, 8, 10),
        (2, "História", "Brasil Colônia", 1, 5, 10),
        (2, "Geografia", "Climatologia", 9, 14, 20),
        (3, "Filo / Socio", "Contratualistas", 0, 9, 10),
        (3, "Matemática", "Geometria", 4, 11, 25),
    ];
    let activities: Vec<ActivityRecord> = logs
        .into_iter()
        .map(|(student_id, subject, topic, days_ago, correct, total)| ActivityRecord {
            student_id,
            subject: subject.to_string(),
            content_topic: topic.to_string(),
            date: today - Duration::days(days_ago),
            correct_count: correct,
            total_count: total,
        })
        .collect();

    let sitting_day = today - Duration::days(14);
    let mut exams = Vec::new();
    let scores: [(i64, [u32; 4]); 3] = [
        (1, [38, 32, 27, 30]),
        (2, [41, 36, 22, 19]),
        (3, [35, 39, 30, 33]),
    ];
    for (student_id, correct) in scores {
        for (area, correct_count) in ["Linguagens", "Humanas", "Natureza", "Matemática"]
            .into_iter()
            .zip(correct)
        {
            exams.push(ExamAttempt {
                student_id,
                exam_type: "Simulado".to_string(),
                exam_number: 1,
                exam_year: 2024,
                area: area.to_string(),
                correct_count,
                total_count: 45,
                date: sitting_day,
            });
        }
    }
    // second sitting, first day only
    for (area, correct_count) in [("Linguagens", 40), ("Humanas", 35)] {
        exams.push(ExamAttempt {
            student_id: 1,
            exam_type: "Simulado".to_string(),
            exam_number: 2,
            exam_year: 2024,
            area: area.to_string(),
            correct_count,
            total_count: 45,
            date: today - Duration::days(3),
        });
    }

    let essays = vec![
        (1, 21, "Desafios da mobilidade urbana", [160.0, 120.0, 140.0, 160.0, 120.0]),
        (1, 7, "", [180.0, 160.0, 160.0, 160.0, 140.0]),
        (2, 10, "Democratização do acesso ao cinema", [120.0, 120.0, 100.0, 140.0, 80.0]),
        (3, 5, "Desafios da mobilidade urbana", [200.0, 180.0, 180.0, 200.0, 160.0]),
    ]
    .into_iter()
    .map(|(student_id, days_ago, topic, scores): (i64, i64, &str, [f64; 5])| EssayRecord {
        student_id,
        date: today - Duration::days(days_ago),
        topic: EssayRecord::normalize_topic(Some(topic)),
        scores,
        total_score: scores.iter().sum(),
    })
    .collect();

    let snapshot = Snapshot {
        students,
        activities,
        exams,
        essays,
    };
    import_snapshot(pool, &snapshot).await
}

pub async fn fetch_snapshot(pool: &PgPool) -> Result<Snapshot> {
    let students = sqlx::query(
        "SELECT id, full_name, mentoring_group FROM mentoring.students ORDER BY id",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| Student {
        student_id: row.get("id"),
        name: row.get("full_name"),
        mentoring_group_id: row.get::<i32, _>("mentoring_group").max(0) as u32,
    })
    .collect();

    let activities = sqlx::query(
        "SELECT student_id, subject, content_topic, studied_on, correct_count, total_count \
         FROM mentoring.activities ORDER BY studied_on, source_key",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| ActivityRecord {
        student_id: row.get("student_id"),
        subject: row.get("subject"),
        content_topic: row.get("content_topic"),
        date: row.get("studied_on"),
        correct_count: row.get::<i32, _>("correct_count").max(0) as u32,
        total_count: row.get::<i32, _>("total_count").max(0) as u32,
    })
    .collect();

    let exams = sqlx::query(
        "SELECT student_id, exam_type, exam_number, exam_year, area, \
         correct_count, total_count, taken_on \
         FROM mentoring.exams ORDER BY taken_on, source_key",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| ExamAttempt {
        student_id: row.get("student_id"),
        exam_type: row.get("exam_type"),
        exam_number: row.get::<i32, _>("exam_number").max(0) as u32,
        exam_year: row.get("exam_year"),
        area: row.get("area"),
        correct_count: row.get::<i32, _>("correct_count").max(0) as u32,
        total_count: row.get::<i32, _>("total_count").max(0) as u32,
        date: row.get("taken_on"),
    })
    .collect();

    let essays = sqlx::query(
        "SELECT student_id, written_on, topic, c1, c2, c3, c4, c5, total_score \
         FROM mentoring.essays ORDER BY written_on, source_key",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| {
        let topic: Option<String> = row.get("topic");
        EssayRecord {
            student_id: row.get("student_id"),
            date: row.get("written_on"),
            topic: EssayRecord::normalize_topic(topic.as_deref()),
            scores: [
                row.get("c1"),
                row.get("c2"),
                row.get("c3"),
                row.get("c4"),
                row.get("c5"),
            ],
            total_score: row.get("total_score"),
        }
    })
    .collect();

    Ok(Snapshot {
        students,
        activities,
        exams,
        essays,
    })
}
