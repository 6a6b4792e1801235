use std::collections::HashMap;

use async_trait::async_trait;
use time::Date;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::TrackerStore;
use crate::profile::model::UserProfile;
use crate::tracker::model::{capped_water, Activity, Meal};

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, UserProfile>,
    meals: Vec<Meal>,
    water: HashMap<(Uuid, Date), u32>,
    activities: Vec<Activity>,
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackerStore for MemoryStore {
    async fn insert_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        if inner.profiles.values().any(|p| p.email == profile.email) {
            anyhow::bail!("email already registered: {}", profile.email);
        }
        inner.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    async fn profile_by_email(&self, email: &str) -> anyhow::Result<Option<UserProfile>> {
        let inner = self.inner.read().await;
        Ok(inner.profiles.values().find(|p| p.email == email).cloned())
    }

    async fn update_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        if inner
            .profiles
            .values()
            .any(|p| p.id != profile.id && p.email == profile.email)
        {
            anyhow::bail!("email already registered: {}", profile.email);
        }
        match inner.profiles.get_mut(&profile.id) {
            Some(existing) => {
                *existing = profile.clone();
                Ok(())
            }
            None => anyhow::bail!("profile {} not found", profile.id),
        }
    }

    async fn delete_profile(&self, user_id: Uuid) -> anyhow::Result<Vec<String>> {
        let mut inner = self.inner.write().await;
        let keys = inner
            .meals
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| m.photo_key.clone())
            .collect();
        inner.profiles.remove(&user_id);
        inner.meals.retain(|m| m.user_id != user_id);
        inner.water.retain(|(u, _), _| *u != user_id);
        inner.activities.retain(|a| a.user_id != user_id);
        Ok(keys)
    }

    async fn meals_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Meal>> {
        let inner = self.inner.read().await;
        let mut meals: Vec<Meal> = inner
            .meals
            .iter()
            .filter(|m| m.user_id == user_id && m.eaten_on == day)
            .cloned()
            .collect();
        meals.sort_by_key(|m| m.created_at);
        Ok(meals)
    }

    async fn meal(&self, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<Option<Meal>> {
        let inner = self.inner.read().await;
        Ok(inner
            .meals
            .iter()
            .find(|m| m.user_id == user_id && m.id == meal_id)
            .cloned())
    }

    async fn insert_meal(&self, meal: &Meal) -> anyhow::Result<()> {
        self.inner.write().await.meals.push(meal.clone());
        Ok(())
    }

    async fn water_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<u32> {
        let inner = self.inner.read().await;
        Ok(inner.water.get(&(user_id, day)).copied().unwrap_or(0))
    }

    async fn add_water(
        &self,
        user_id: Uuid,
        day: Date,
        amount_ml: u32,
        goal_ml: u32,
    ) -> anyhow::Result<u32> {
        let mut inner = self.inner.write().await;
        let total = inner.water.entry((user_id, day)).or_insert(0);
        *total = capped_water(*total, amount_ml, goal_ml);
        Ok(*total)
    }

    async fn clear_day(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Meal>> {
        let mut inner = self.inner.write().await;
        let (removed, kept): (Vec<Meal>, Vec<Meal>) = std::mem::take(&mut inner.meals)
            .into_iter()
            .partition(|m| m.user_id == user_id && m.eaten_on == day);
        inner.meals = kept;
        inner.water.remove(&(user_id, day));
        Ok(removed)
    }

    async fn insert_activity(&self, activity: &Activity) -> anyhow::Result<()> {
        self.inner.write().await.activities.push(activity.clone());
        Ok(())
    }

    async fn activities_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Activity>> {
        let inner = self.inner.read().await;
        let mut activities: Vec<Activity> = inner
            .activities
            .iter()
            .filter(|a| a.user_id == user_id && a.day == day)
            .cloned()
            .collect();
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(activities)
    }
}
