use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub const DEFAULT_WATER_GOAL_ML: u32 = 2500;
pub const DEFAULT_CALORIE_GOAL_KCAL: u32 = 2000;
pub const WATER_ML_PER_KG: f64 = 35.0;
const MAX_WEIGHT_KG: f64 = 500.0;

pub const OBSTACLES: &[&str] = &[
    "Falta de consistência",
    "Hábitos alimentares ruins",
    "Falta de apoio",
    "Agenda lotada",
    "Falta de inspiração para refeições",
];

pub const ACHIEVEMENTS: &[&str] = &[
    "Comer e viver de forma mais saudável",
    "Aumentar energia e melhorar humor",
    "Manter-se motivado e consistente",
    "Sentir-se melhor com o corpo",
];

pub const LANGUAGES: &[&str] = &["pt", "en", "es", "fr", "de", "it", "ja", "zh"];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ProfileError {
    pub field: &'static str,
    pub reason: String,
}

impl ProfileError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Weekly workout bucket picked during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkoutFrequency {
    #[serde(rename = "2")]
    UpToTwo,
    #[serde(rename = "3-5")]
    ThreeToFive,
    #[serde(rename = "6+")]
    SixOrMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Lose,
    Gain,
    Maintain,
}

macro_rules! text_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => anyhow::bail!("unknown {} value: {}", stringify!($ty), other),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Gender { Male => "male", Female => "female", Other => "other" });
text_enum!(WorkoutFrequency { UpToTwo => "2", ThreeToFive => "3-5", SixOrMore => "6+" });
text_enum!(Goal { Lose => "lose", Gain => "gain", Maintain => "maintain" });

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub birth_date: Date,
    pub gender: Option<Gender>,
    pub weekly_workouts: WorkoutFrequency,
    pub goal: Goal,
    pub current_weight_kg: f64,
    pub target_weight_kg: f64,
    pub obstacles: Vec<String>,
    pub achievements: Vec<String>,
    pub language: String,
    pub is_premium: bool,
    pub water_goal_ml: u32,
    pub calorie_goal_kcal: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Daily water goal: 35 ml per kg of body mass.
pub fn water_goal_ml(weight_kg: f64) -> u32 {
    if weight_kg.is_finite() && weight_kg > 0.0 {
        (weight_kg * WATER_ML_PER_KG).round() as u32
    } else {
        DEFAULT_WATER_GOAL_ML
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_weight(field: &'static str, kg: f64) -> Result<(), ProfileError> {
    if kg.is_finite() && kg > 0.0 && kg <= MAX_WEIGHT_KG {
        Ok(())
    } else {
        Err(ProfileError::new(field, "deve estar entre 0 e 500 kg"))
    }
}

fn check_birth_date(birth_date: Date, today: Date) -> Result<(), ProfileError> {
    if birth_date >= today {
        return Err(ProfileError::new("birthDate", "deve estar no passado"));
    }
    Ok(())
}

fn check_catalog(field: &'static str, picks: &[String], catalog: &[&str]) -> Result<(), ProfileError> {
    match picks.iter().find(|p| !catalog.contains(&p.as_str())) {
        Some(unknown) => Err(ProfileError::new(field, format!("opção desconhecida '{}'", unknown))),
        None => Ok(()),
    }
}

fn check_language(language: &str) -> Result<(), ProfileError> {
    if LANGUAGES.contains(&language) {
        Ok(())
    } else {
        Err(ProfileError::new("language", format!("idioma não suportado '{}'", language)))
    }
}

/// Everything collected by the onboarding steps, minus the password.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub name: String,
    pub email: String,
    pub birth_date: Date,
    #[serde(default)]
    pub gender: Option<Gender>,
    pub weekly_workouts: WorkoutFrequency,
    pub goal: Goal,
    pub current_weight: f64,
    pub target_weight: f64,
    #[serde(default)]
    pub obstacles: Vec<String>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl NewProfile {
    /// Normalize and validate in place.
    pub fn validate(&mut self, today: Date) -> Result<(), ProfileError> {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_lowercase();

        if self.name.is_empty() {
            return Err(ProfileError::new("name", "é obrigatório"));
        }
        if !is_valid_email(&self.email) {
            return Err(ProfileError::new("email", "não é um endereço válido"));
        }
        check_birth_date(self.birth_date, today)?;
        check_weight("currentWeight", self.current_weight)?;
        check_weight("targetWeight", self.target_weight)?;
        check_catalog("obstacles", &self.obstacles, OBSTACLES)?;
        check_catalog("achievements", &self.achievements, ACHIEVEMENTS)?;
        if let Some(lang) = &self.language {
            check_language(lang)?;
        }
        Ok(())
    }

    pub fn into_profile(self, password_hash: String, now: OffsetDateTime) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            name: self.name,
            email: self.email,
            password_hash,
            birth_date: self.birth_date,
            gender: self.gender,
            weekly_workouts: self.weekly_workouts,
            goal: self.goal,
            current_weight_kg: self.current_weight,
            target_weight_kg: self.target_weight,
            obstacles: self.obstacles,
            achievements: self.achievements,
            language: self.language.unwrap_or_else(|| "pt".into()),
            is_premium: false,
            water_goal_ml: water_goal_ml(self.current_weight),
            calorie_goal_kcal: DEFAULT_CALORIE_GOAL_KCAL,
            created_at: now,
        }
    }
}

/// Tells an explicit `null` (`Some(None)`) apart from an absent field (`None`).
fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Partial edit from the profile screen. `gender: null` clears the field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<Date>,
    #[serde(default, deserialize_with = "nullable")]
    pub gender: Option<Option<Gender>>,
    pub weekly_workouts: Option<WorkoutFrequency>,
    pub goal: Option<Goal>,
    pub current_weight: Option<f64>,
    pub target_weight: Option<f64>,
    pub calorie_goal: Option<u32>,
    pub language: Option<String>,
}

impl ProfileUpdate {
    /// Apply onto `profile`, all or nothing. The water goal follows the
    /// current weight.
    pub fn apply(self, profile: &mut UserProfile, today: Date) -> Result<(), ProfileError> {
        let name = self.name.map(|n| n.trim().to_string());
        if matches!(&name, Some(n) if n.is_empty()) {
            return Err(ProfileError::new("name", "é obrigatório"));
        }
        let email = self.email.map(|e| e.trim().to_lowercase());
        if matches!(&email, Some(e) if !is_valid_email(e)) {
            return Err(ProfileError::new("email", "não é um endereço válido"));
        }
        if let Some(d) = self.birth_date {
            check_birth_date(d, today)?;
        }
        if let Some(w) = self.current_weight {
            check_weight("currentWeight", w)?;
        }
        if let Some(w) = self.target_weight {
            check_weight("targetWeight", w)?;
        }
        if let Some(kcal) = self.calorie_goal {
            if !(500..=10_000).contains(&kcal) {
                return Err(ProfileError::new("calorieGoal", "deve estar entre 500 e 10000"));
            }
        }
        if let Some(lang) = &self.language {
            check_language(lang)?;
        }

        if let Some(n) = name {
            profile.name = n;
        }
        if let Some(e) = email {
            profile.email = e;
        }
        if let Some(d) = self.birth_date {
            profile.birth_date = d;
        }
        if let Some(g) = self.gender {
            profile.gender = g;
        }
        if let Some(w) = self.weekly_workouts {
            profile.weekly_workouts = w;
        }
        if let Some(g) = self.goal {
            profile.goal = g;
        }
        if let Some(w) = self.current_weight {
            profile.current_weight_kg = w;
            profile.water_goal_ml = water_goal_ml(w);
        }
        if let Some(w) = self.target_weight {
            profile.target_weight_kg = w;
        }
        if let Some(kcal) = self.calorie_goal {
            profile.calorie_goal_kcal = kcal;
        }
        if let Some(lang) = self.language {
            profile.language = lang;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_profile() -> UserProfile {
    NewProfile {
        name: "Ana".into(),
        email: "ana@example.com".into(),
        birth_date: time::macros::date!(1990 - 05 - 01),
        gender: Some(Gender::Female),
        weekly_workouts: WorkoutFrequency::ThreeToFive,
        goal: Goal::Lose,
        current_weight: 70.0,
        target_weight: 64.0,
        obstacles: vec!["Agenda lotada".into()],
        achievements: vec![],
        language: None,
    }
    .into_profile("hash".into(), OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const TODAY: Date = date!(2025 - 06 - 15);

    fn onboarding() -> NewProfile {
        serde_json::from_value(serde_json::json!({
            "name": "  Ana ",
            "email": " Ana@Example.COM ",
            "birthDate": "1990-05-01",
            "weeklyWorkouts": "3-5",
            "goal": "lose",
            "currentWeight": 70.0,
            "targetWeight": 64.0,
            "obstacles": ["Agenda lotada"],
            "achievements": ["Sentir-se melhor com o corpo"]
        }))
        .unwrap()
    }

    #[test]
    fn water_goal_is_35ml_per_kg() {
        assert_eq!(water_goal_ml(70.0), 2450);
        assert_eq!(water_goal_ml(62.5), 2188);
        assert_eq!(water_goal_ml(0.0), DEFAULT_WATER_GOAL_ML);
        assert_eq!(water_goal_ml(f64::NAN), DEFAULT_WATER_GOAL_ML);
    }

    #[test]
    fn onboarding_derives_goals_and_normalizes() {
        let mut p = onboarding();
        p.validate(TODAY).unwrap();
        let profile = p.into_profile("hash".into(), OffsetDateTime::now_utc());
        assert_eq!(profile.name, "Ana");
        assert_eq!(profile.email, "ana@example.com");
        assert_eq!(profile.water_goal_ml, 2450);
        assert_eq!(profile.calorie_goal_kcal, DEFAULT_CALORIE_GOAL_KCAL);
        assert_eq!(profile.language, "pt");
        assert!(!profile.is_premium);
    }

    #[test]
    fn onboarding_rejects_bad_fields() {
        let mut p = onboarding();
        p.email = "not-an-email".into();
        assert_eq!(p.validate(TODAY).unwrap_err().field, "email");

        let mut p = onboarding();
        p.current_weight = -3.0;
        assert_eq!(p.validate(TODAY).unwrap_err().field, "currentWeight");

        let mut p = onboarding();
        p.obstacles.push("Preguiça".into());
        assert_eq!(p.validate(TODAY).unwrap_err().field, "obstacles");

        let mut p = onboarding();
        p.birth_date = TODAY;
        assert_eq!(p.validate(TODAY).unwrap_err().field, "birthDate");
    }

    #[test]
    fn serialized_profile_hides_password_hash() {
        let json = serde_json::to_value(sample_profile()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["weeklyWorkouts"], "3-5");
        assert_eq!(json["birthDate"], "1990-05-01");
    }

    #[test]
    fn weight_edit_rederives_water_goal() {
        let mut profile = sample_profile();
        ProfileUpdate {
            current_weight: Some(80.0),
            ..Default::default()
        }
        .apply(&mut profile, TODAY)
        .unwrap();
        assert_eq!(profile.water_goal_ml, 2800);
    }

    #[test]
    fn invalid_edit_changes_nothing() {
        let mut profile = sample_profile();
        let err = ProfileUpdate {
            name: Some("Bia".into()),
            calorie_goal: Some(12),
            ..Default::default()
        }
        .apply(&mut profile, TODAY)
        .unwrap_err();
        assert_eq!(err.field, "calorieGoal");
        assert_eq!(profile.name, "Ana");
    }

    #[test]
    fn email_edit_is_normalized_and_checked() {
        let mut profile = sample_profile();
        let edit: ProfileUpdate =
            serde_json::from_value(serde_json::json!({ "email": " Ana.Nova@Example.com " })).unwrap();
        edit.apply(&mut profile, TODAY).unwrap();
        assert_eq!(profile.email, "ana.nova@example.com");

        let edit: ProfileUpdate =
            serde_json::from_value(serde_json::json!({ "email": "sem-arroba" })).unwrap();
        assert_eq!(edit.apply(&mut profile, TODAY).unwrap_err().field, "email");
        assert_eq!(profile.email, "ana.nova@example.com");
    }

    #[test]
    fn gender_is_kept_unless_explicitly_cleared() {
        let mut profile = sample_profile();
        let absent: ProfileUpdate = serde_json::from_value(serde_json::json!({ "name": "Ana" })).unwrap();
        absent.apply(&mut profile, TODAY).unwrap();
        assert_eq!(profile.gender, Some(Gender::Female));

        let set: ProfileUpdate = serde_json::from_value(serde_json::json!({ "gender": "other" })).unwrap();
        set.apply(&mut profile, TODAY).unwrap();
        assert_eq!(profile.gender, Some(Gender::Other));

        let cleared: ProfileUpdate = serde_json::from_value(serde_json::json!({ "gender": null })).unwrap();
        cleared.apply(&mut profile, TODAY).unwrap();
        assert_eq!(profile.gender, None);
    }

    #[test]
    fn text_enums_round_trip_through_storage_form() {
        assert_eq!("6+".parse::<WorkoutFrequency>().unwrap(), WorkoutFrequency::SixOrMore);
        assert_eq!(Goal::Maintain.as_str(), "maintain");
        assert!("sometimes".parse::<WorkoutFrequency>().is_err());
    }
}
