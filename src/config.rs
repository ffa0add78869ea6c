use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub subjects: Vec<String>,
    pub areas: Vec<String>,
    pub day_one: Vec<String>,
    pub day_two: Vec<String>,
    pub full_exam_questions: u32,
    pub retention_decay: f64,
    /// Minimum absolute slope (points per day) to call a trend
    pub trend_threshold: f64,
    pub hiatus_critical_days: i64,
    pub weak_attention_below: f64,
    pub weak_critical_below: f64,
    pub weak_report_limit: usize,
    pub retention_report_limit: usize,
    pub ranking_summary_size: usize,
    pub essay_top_n: usize,
    pub default_window_days: i64,
    pub mentoring_groups: BTreeMap<String, String>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        let mut mentoring_groups = BTreeMap::new();
        mentoring_groups.insert("1".to_string(), "Estude com Danilo".to_string());
        mentoring_groups.insert("2".to_string(), "Projeto Medicina".to_string());

        Self {
            subjects: strings(&[
                "Linguagens",
                "História",
                "Geografia",
                "Filo / Socio",
                "Biologia",
                "Física",
                "Química",
                "Matemática",
            ]),
            areas: strings(&["Linguagens", "Humanas", "Natureza", "Matemática"]),
            day_one: strings(&["Linguagens", "Humanas"]),
            day_two: strings(&["Natureza", "Matemática"]),
            full_exam_questions: 180,
            retention_decay: 0.03,
            trend_threshold: 0.05,
            hiatus_critical_days: 7,
            weak_attention_below: 70.0,
            weak_critical_below: 50.0,
            weak_report_limit: 5,
            retention_report_limit: 15,
            ranking_summary_size: 10,
            essay_top_n: 5,
            default_window_days: 30,
            mentoring_groups,
            logging: LoggingConfig::default(),
        }
    }
}

impl AnalyticsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: AnalyticsConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subjects.is_empty() {
            return Err(Error::Config("subjects must not be empty".to_string()));
        }
        if self.areas.is_empty() {
            return Err(Error::Config("areas must not be empty".to_string()));
        }
        for area in self.day_one.iter().chain(self.day_two.iter()) {
            if !self.areas.contains(area) {
                return Err(Error::Config(format!(
                    "day block area {area} is not a configured area"
                )));
            }
        }
        if self.day_one.is_empty() || self.day_two.is_empty() {
            return Err(Error::Config(
                "day_one and day_two must each list at least one area".to_string(),
            ));
        }
        if let Some(area) = self
            .areas
            .iter()
            .find(|area| !self.day_one.contains(area) && !self.day_two.contains(area))
        {
            return Err(Error::Config(format!(
                "area {area} belongs to neither day_one nor day_two"
            )));
        }
        if self.day_one.iter().any(|area| self.day_two.contains(area)) {
            return Err(Error::Config(
                "day_one and day_two must not share areas".to_string(),
            ));
        }
        if self.retention_decay < 0.0 {
            return Err(Error::Config("retention_decay must be >= 0".to_string()));
        }
        Ok(())
    }

    pub fn group_label(&self, group_id: u32) -> String {
        self.mentoring_groups
            .get(&group_id.to_string())
            .cloned()
            .unwrap_or_else(|| format!("Mentoria {group_id}"))
    }

    pub fn group_id(&self, key: &str) -> Option<u32> {
        if let Ok(id) = key.trim().parse::<u32>() {
            return Some(id);
        }
        self.mentoring_groups
            .iter()
            .find(|(_, label)| label.eq_ignore_ascii_case(key.trim()))
            .and_then(|(id, _)| id.parse().ok())
    }

    pub fn area_index(&self, area: &str) -> Option<usize> {
        self.areas.iter().position(|candidate| candidate == area)
    }
}
