use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use crate::analysis::{Confidence, NutritionEstimate};
use crate::profile::model::UserProfile;

/// A confirmed meal. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: Uuid,
    #[serde(skip_serializing, default)]
    pub user_id: Uuid,
    pub name: String,
    pub calories: u32,
    /// Local time of day, `HH:MM`.
    pub time: String,
    pub meal_type: String,
    pub foods: Vec<String>,
    pub portions: String,
    pub confidence: Confidence,
    pub sources: String,
    pub eaten_on: Date,
    #[serde(skip_serializing, default)]
    pub photo_key: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Meal {
    pub fn from_estimate(
        id: Uuid,
        user_id: Uuid,
        estimate: NutritionEstimate,
        meal_type: String,
        at: OffsetDateTime,
        photo_key: Option<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            name: estimate.description,
            calories: estimate.calories,
            time: time_of_day(at),
            meal_type,
            foods: estimate.foods,
            portions: estimate.portions,
            confidence: estimate.confidence,
            sources: estimate.sources,
            eaten_on: at.date(),
            photo_key,
            created_at: at,
        }
    }

    pub fn has_photo(&self) -> bool {
        self.photo_key.is_some()
    }
}

pub fn time_of_day(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]"))
        .unwrap_or_else(|_| format!("{:02}:{:02}", at.hour(), at.minute()))
}

/// New water total after drinking `amount_ml`: capped at the goal, never
/// lower than what was already recorded.
pub fn capped_water(current_ml: u32, amount_ml: u32, goal_ml: u32) -> u32 {
    current_ml.max(current_ml.saturating_add(amount_ml).min(goal_ml))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Run,
    Walk,
    Gym,
    Other,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Walk => "walk",
            Self::Gym => "gym",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "run" => Ok(Self::Run),
            "walk" => Ok(Self::Walk),
            "gym" => Ok(Self::Gym),
            "other" => Ok(Self::Other),
            other => anyhow::bail!("unknown activity kind: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    #[serde(skip_serializing, default)]
    pub user_id: Uuid,
    pub kind: ActivityKind,
    pub duration_minutes: u32,
    pub distance_km: Option<f64>,
    pub calories_burned: u32,
    pub day: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: Date,
    pub calories_consumed: u64,
    pub calorie_goal: u32,
    /// Always zero: logged activities are not counted against the goal.
    pub calories_burned: u32,
    pub calories_remaining: i64,
    pub water_consumed_ml: u32,
    pub water_goal_ml: u32,
    pub meals: Vec<Meal>,
}

impl DailySummary {
    pub fn compute(date: Date, profile: &UserProfile, meals: Vec<Meal>, water_ml: u32) -> Self {
        let calories_consumed: u64 = meals.iter().map(|m| u64::from(m.calories)).sum();
        let calories_burned = 0;
        let calories_remaining = i64::from(profile.calorie_goal_kcal) - calories_consumed as i64
            + i64::from(calories_burned);
        Self {
            date,
            calories_consumed,
            calorie_goal: profile.calorie_goal_kcal,
            calories_burned,
            calories_remaining,
            water_consumed_ml: water_ml,
            water_goal_ml: profile.water_goal_ml,
            meals,
        }
    }
}
