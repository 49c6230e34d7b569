use crate::causes::Category;
use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_MOVEMENT_DEDUP_SECS: u64 = 5;

/// Annual ceilings per quota-bearing category, plus the monthly cap on
/// personal-matters absences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub pre_exam: u32,
    pub personal_illness: u32,
    pub family_illness: u32,
    pub personal_matters: u32,
    pub personal_matters_per_month: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            pre_exam: 12,
            personal_illness: 25,
            family_illness: 20,
            personal_matters: 6,
            personal_matters_per_month: 1,
        }
    }
}

impl QuotaLimits {
    /// Categories that carry an annual ceiling, in display order.
    pub const LIMITED: [Category; 4] = [
        Category::PreExam,
        Category::PersonalIllness,
        Category::FamilyIllness,
        Category::PersonalMatters,
    ];

    pub fn annual(&self, category: Category) -> Option<u32> {
        match category {
            Category::PreExam => Some(self.pre_exam),
            Category::PersonalIllness => Some(self.personal_illness),
            Category::FamilyIllness => Some(self.family_illness),
            Category::PersonalMatters => Some(self.personal_matters),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for category in Self::LIMITED {
            if let Some(limit) = self.annual(category) {
                map.insert(category.as_str().to_string(), limit.into());
            }
        }
        serde_json::Value::Object(map)
    }
}

/// Raw `SCHOOLBOOK_*` environment variables.
#[derive(Debug, Default, Deserialize)]
struct Settings {
    quota_pre_exam: Option<u32>,
    quota_personal_illness: Option<u32>,
    quota_family_illness: Option<u32>,
    quota_personal_matters: Option<u32>,
    quota_personal_matters_per_month: Option<u32>,
    movement_dedup_secs: Option<u64>,
    log: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub limits: QuotaLimits,
    pub movement_dedup_window: Duration,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Settings::default().into()
    }
}

impl From<Settings> for Config {
    fn from(s: Settings) -> Self {
        let d = QuotaLimits::default();
        Self {
            limits: QuotaLimits {
                pre_exam: s.quota_pre_exam.unwrap_or(d.pre_exam),
                personal_illness: s.quota_personal_illness.unwrap_or(d.personal_illness),
                family_illness: s.quota_family_illness.unwrap_or(d.family_illness),
                personal_matters: s.quota_personal_matters.unwrap_or(d.personal_matters),
                personal_matters_per_month: s
                    .quota_personal_matters_per_month
                    .unwrap_or(d.personal_matters_per_month)
                    .max(1),
            },
            movement_dedup_window: Duration::from_secs(
                s.movement_dedup_secs.unwrap_or(DEFAULT_MOVEMENT_DEDUP_SECS),
            ),
            log_filter: s
                .log
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}

impl Config {
    /// Reads `.env` (if any) and the `SCHOOLBOOK_*` variables once at start-up.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let settings = envy::prefixed("SCHOOLBOOK_")
            .from_env::<Settings>()
            .context("reading SCHOOLBOOK_* environment")?;
        Ok(settings.into())
    }
}
