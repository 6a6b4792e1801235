use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::TrackerStore;
use crate::analysis::Confidence;
use crate::profile::model::{Gender, UserProfile};
use crate::tracker::model::{Activity, ActivityKind, Meal};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }
        Ok(Self { db })
    }
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    birth_date: Date,
    gender: Option<String>,
    weekly_workouts: String,
    goal: String,
    current_weight_kg: f64,
    target_weight_kg: f64,
    obstacles: Vec<String>,
    achievements: Vec<String>,
    language: String,
    is_premium: bool,
    water_goal_ml: i64,
    calorie_goal_kcal: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = anyhow::Error;

    fn try_from(r: ProfileRow) -> anyhow::Result<Self> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            birth_date: r.birth_date,
            gender: r.gender.as_deref().map(str::parse::<Gender>).transpose()?,
            weekly_workouts: r.weekly_workouts.parse()?,
            goal: r.goal.parse()?,
            current_weight_kg: r.current_weight_kg,
            target_weight_kg: r.target_weight_kg,
            obstacles: r.obstacles,
            achievements: r.achievements,
            language: r.language,
            is_premium: r.is_premium,
            water_goal_ml: u32::try_from(r.water_goal_ml).context("water_goal_ml")?,
            calorie_goal_kcal: u32::try_from(r.calorie_goal_kcal).context("calorie_goal_kcal")?,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MealRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    calories: i64,
    time_of_day: String,
    meal_type: String,
    foods: Vec<String>,
    portions: String,
    confidence: String,
    sources: String,
    eaten_on: Date,
    photo_key: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<MealRow> for Meal {
    type Error = anyhow::Error;

    fn try_from(r: MealRow) -> anyhow::Result<Self> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            calories: u32::try_from(r.calories).context("meal calories")?,
            time: r.time_of_day,
            meal_type: r.meal_type,
            foods: r.foods,
            portions: r.portions,
            confidence: Confidence::from_label(&r.confidence),
            sources: r.sources,
            eaten_on: r.eaten_on,
            photo_key: r.photo_key,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    duration_minutes: i64,
    distance_km: Option<f64>,
    calories_burned: i64,
    day: Date,
    created_at: OffsetDateTime,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = anyhow::Error;

    fn try_from(r: ActivityRow) -> anyhow::Result<Self> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            kind: ActivityKind::parse(&r.kind)?,
            duration_minutes: u32::try_from(r.duration_minutes).context("duration_minutes")?,
            distance_km: r.distance_km,
            calories_burned: u32::try_from(r.calories_burned).context("calories_burned")?,
            day: r.day,
            created_at: r.created_at,
        })
    }
}

const PROFILE_COLUMNS: &str = "id, name, email, password_hash, birth_date, gender, weekly_workouts, goal, \
     current_weight_kg, target_weight_kg, obstacles, achievements, language, is_premium, \
     water_goal_ml, calorie_goal_kcal, created_at";

const MEAL_COLUMNS: &str = "id, user_id, name, calories, time_of_day, meal_type, foods, portions, \
     confidence, sources, eaten_on, photo_key, created_at";

#[async_trait]
impl TrackerStore for PgStore {
    async fn insert_profile(&self, p: &UserProfile) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, name, email, password_hash, birth_date, gender, weekly_workouts,
                                  goal, current_weight_kg, target_weight_kg, obstacles, achievements,
                                  language, is_premium, water_goal_ml, calorie_goal_kcal, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.email)
        .bind(&p.password_hash)
        .bind(p.birth_date)
        .bind(p.gender.map(|g| g.as_str()))
        .bind(p.weekly_workouts.as_str())
        .bind(p.goal.as_str())
        .bind(p.current_weight_kg)
        .bind(p.target_weight_kg)
        .bind(&p.obstacles)
        .bind(&p.achievements)
        .bind(&p.language)
        .bind(p.is_premium)
        .bind(i64::from(p.water_goal_ml))
        .bind(i64::from(p.calorie_goal_kcal))
        .bind(p.created_at)
        .execute(&self.db)
        .await
        .context("insert profile")?;
        Ok(())
    }

    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("select profile")?;
        row.map(UserProfile::try_from).transpose()
    }

    async fn profile_by_email(&self, email: &str) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {} FROM profiles WHERE email = $1",
            PROFILE_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("select profile by email")?;
        row.map(UserProfile::try_from).transpose()
    }

    async fn update_profile(&self, p: &UserProfile) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE profiles
               SET name = $2, birth_date = $3, gender = $4, weekly_workouts = $5, goal = $6,
                   current_weight_kg = $7, target_weight_kg = $8, language = $9,
                   water_goal_ml = $10, calorie_goal_kcal = $11, email = $12
             WHERE id = $1
            "#,
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(p.birth_date)
        .bind(p.gender.map(|g| g.as_str()))
        .bind(p.weekly_workouts.as_str())
        .bind(p.goal.as_str())
        .bind(p.current_weight_kg)
        .bind(p.target_weight_kg)
        .bind(&p.language)
        .bind(i64::from(p.water_goal_ml))
        .bind(i64::from(p.calorie_goal_kcal))
        .bind(&p.email)
        .execute(&self.db)
        .await
        .context("update profile")?;
        anyhow::ensure!(res.rows_affected() == 1, "profile {} not found", p.id);
        Ok(())
    }

    async fn delete_profile(&self, user_id: Uuid) -> anyhow::Result<Vec<String>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT photo_key FROM meals WHERE user_id = $1 AND photo_key IS NOT NULL",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await
        .context("select photo keys")?;
        // meals, water_intake and activities cascade
        sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("delete profile")?;
        tx.commit().await.context("commit tx")?;
        Ok(keys)
    }

    async fn meals_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Meal>> {
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {} FROM meals WHERE user_id = $1 AND eaten_on = $2 ORDER BY created_at ASC",
            MEAL_COLUMNS
        ))
        .bind(user_id)
        .bind(day)
        .fetch_all(&self.db)
        .await
        .context("list meals by day")?;
        rows.into_iter().map(Meal::try_from).collect()
    }

    async fn meal(&self, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<Option<Meal>> {
        let row = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {} FROM meals WHERE id = $1 AND user_id = $2",
            MEAL_COLUMNS
        ))
        .bind(meal_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("select meal")?;
        row.map(Meal::try_from).transpose()
    }

    async fn insert_meal(&self, m: &Meal) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meals (id, user_id, name, calories, time_of_day, meal_type, foods, portions,
                               confidence, sources, eaten_on, photo_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(m.id)
        .bind(m.user_id)
        .bind(&m.name)
        .bind(i64::from(m.calories))
        .bind(&m.time)
        .bind(&m.meal_type)
        .bind(&m.foods)
        .bind(&m.portions)
        .bind(m.confidence.as_str())
        .bind(&m.sources)
        .bind(m.eaten_on)
        .bind(&m.photo_key)
        .bind(m.created_at)
        .execute(&self.db)
        .await
        .context("insert meal")?;
        Ok(())
    }

    async fn water_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<u32> {
        let amount: Option<i64> = sqlx::query_scalar(
            "SELECT amount_ml FROM water_intake WHERE user_id = $1 AND day = $2",
        )
        .bind(user_id)
        .bind(day)
        .fetch_optional(&self.db)
        .await
        .context("select water")?;
        Ok(u32::try_from(amount.unwrap_or(0)).context("water amount")?)
    }

    async fn add_water(
        &self,
        user_id: Uuid,
        day: Date,
        amount_ml: u32,
        goal_ml: u32,
    ) -> anyhow::Result<u32> {
        let total: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO water_intake (user_id, day, amount_ml)
            VALUES ($1, $2, LEAST($3, $4))
            ON CONFLICT (user_id, day) DO UPDATE
               SET amount_ml = GREATEST(water_intake.amount_ml,
                                        LEAST(water_intake.amount_ml + $3, $4)),
                   updated_at = now()
            RETURNING amount_ml
            "#,
        )
        .bind(user_id)
        .bind(day)
        .bind(i64::from(amount_ml))
        .bind(i64::from(goal_ml))
        .fetch_one(&self.db)
        .await
        .context("upsert water")?;
        Ok(u32::try_from(total).context("water amount")?)
    }

    async fn clear_day(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Meal>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            "DELETE FROM meals WHERE user_id = $1 AND eaten_on = $2 RETURNING {}",
            MEAL_COLUMNS
        ))
        .bind(user_id)
        .bind(day)
        .fetch_all(&mut *tx)
        .await
        .context("delete meals of day")?;
        sqlx::query("DELETE FROM water_intake WHERE user_id = $1 AND day = $2")
            .bind(user_id)
            .bind(day)
            .execute(&mut *tx)
            .await
            .context("delete water of day")?;
        tx.commit().await.context("commit tx")?;
        rows.into_iter().map(Meal::try_from).collect()
    }

    async fn insert_activity(&self, a: &Activity) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, user_id, kind, duration_minutes, distance_km,
                                    calories_burned, day, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(a.id)
        .bind(a.user_id)
        .bind(a.kind.as_str())
        .bind(i64::from(a.duration_minutes))
        .bind(a.distance_km)
        .bind(i64::from(a.calories_burned))
        .bind(a.day)
        .bind(a.created_at)
        .execute(&self.db)
        .await
        .context("insert activity")?;
        Ok(())
    }

    async fn activities_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Activity>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, user_id, kind, duration_minutes, distance_km, calories_burned, day, created_at
              FROM activities
             WHERE user_id = $1 AND day = $2
             ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(day)
        .fetch_all(&self.db)
        .await
        .context("list activities by day")?;
        rows.into_iter().map(Activity::try_from).collect()
    }
}

/// These run only when `TEST_DATABASE_URL` points at a disposable database.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::model::sample_profile;
    use time::macros::{date, datetime};

    async fn live_store() -> Option<PgStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(PgStore::connect(&url).await.expect("connect to TEST_DATABASE_URL"))
    }

    async fn fresh_profile(store: &PgStore) -> UserProfile {
        let mut profile = sample_profile();
        profile.email = format!("{}@example.com", profile.id);
        store.insert_profile(&profile).await.unwrap();
        profile
    }

    #[tokio::test]
    async fn water_upsert_is_capped_and_never_shrinks() {
        let Some(store) = live_store().await else {
            eprintln!("TEST_DATABASE_URL not set; skipping");
            return;
        };
        let profile = fresh_profile(&store).await;
        let day = date!(2025 - 03 - 01);

        // first row of the day is capped as well
        assert_eq!(store.add_water(profile.id, day, 3000, 2450).await.unwrap(), 2450);
        assert_eq!(store.water_on(profile.id, day).await.unwrap(), 2450);

        let next = date!(2025 - 03 - 02);
        assert_eq!(store.add_water(profile.id, next, 1000, 2450).await.unwrap(), 1000);
        assert_eq!(store.add_water(profile.id, next, 1000, 2450).await.unwrap(), 2000);
        assert_eq!(store.add_water(profile.id, next, 1000, 2450).await.unwrap(), 2450);
        // a lowered goal does not take water away
        assert_eq!(store.add_water(profile.id, next, 250, 1500).await.unwrap(), 2450);

        store.delete_profile(profile.id).await.unwrap();
        assert_eq!(store.water_on(profile.id, next).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn activities_come_back_newest_first() {
        let Some(store) = live_store().await else {
            eprintln!("TEST_DATABASE_URL not set; skipping");
            return;
        };
        let profile = fresh_profile(&store).await;
        let day = date!(2025 - 03 - 01);
        for (kind, at) in [
            (ActivityKind::Walk, datetime!(2025-03-01 07:00 UTC)),
            (ActivityKind::Run, datetime!(2025-03-01 18:30 UTC)),
        ] {
            store
                .insert_activity(&Activity {
                    id: Uuid::new_v4(),
                    user_id: profile.id,
                    kind,
                    duration_minutes: 30,
                    distance_km: None,
                    calories_burned: 0,
                    day,
                    created_at: at,
                })
                .await
                .unwrap();
        }

        let listed = store.activities_on(profile.id, day).await.unwrap();
        assert_eq!(listed[0].kind, ActivityKind::Run);
        assert_eq!(listed[1].kind, ActivityKind::Walk);
        store.delete_profile(profile.id).await.unwrap();
    }
}
