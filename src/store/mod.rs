//! Persistence port for profiles and daily tracking data.

mod memory;
mod postgres;

use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use crate::profile::model::UserProfile;
use crate::tracker::model::{Activity, Meal};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait TrackerStore: Send + Sync {
    async fn insert_profile(&self, profile: &UserProfile) -> anyhow::Result<()>;
    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>>;
    async fn profile_by_email(&self, email: &str) -> anyhow::Result<Option<UserProfile>>;
    async fn update_profile(&self, profile: &UserProfile) -> anyhow::Result<()>;
    /// Removes the profile together with every meal, water and activity row.
    /// Returns the photo keys of the removed meals.
    async fn delete_profile(&self, user_id: Uuid) -> anyhow::Result<Vec<String>>;

    /// Meals of one day, oldest first.
    async fn meals_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Meal>>;
    async fn meal(&self, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<Option<Meal>>;
    async fn insert_meal(&self, meal: &Meal) -> anyhow::Result<()>;

    async fn water_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<u32>;
    /// Atomically add to the day's water total, capped at `goal_ml`. Returns
    /// the new total.
    async fn add_water(
        &self,
        user_id: Uuid,
        day: Date,
        amount_ml: u32,
        goal_ml: u32,
    ) -> anyhow::Result<u32>;

    /// Drop the day's meals and water. Returns the removed meals.
    async fn clear_day(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Meal>>;

    async fn insert_activity(&self, activity: &Activity) -> anyhow::Result<()>;
    /// Activities of one day, newest first.
    async fn activities_on(&self, user_id: Uuid, day: Date) -> anyhow::Result<Vec<Activity>>;
}
