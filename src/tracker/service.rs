use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dto::NewActivity;
use super::model::{Activity, DailySummary, Meal};
use super::slot::{AnalysisSlots, PendingAnalysis, SlotError};
use crate::analysis::{AnalysisError, AnalysisRequest, FoodAnalyzer};
use crate::capture::CapturedImage;
use crate::profile::model::UserProfile;
use crate::storage::{meal_photo_key, PhotoArchive, PHOTO_URL_TTL_SECS};
use crate::store::TrackerStore;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error("perfil não encontrado")]
    ProfileMissing,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Photo archived for a meal that is not recorded yet. Dropped without
/// [`PhotoUpload::keep`] it is deleted in the background.
struct PhotoUpload {
    photos: Arc<dyn PhotoArchive>,
    key: String,
    kept: bool,
}

impl PhotoUpload {
    fn keep(mut self) {
        self.kept = true;
    }

    async fn discard(mut self) {
        self.kept = true;
        if let Err(e) = self.photos.delete_photo(&self.key).await {
            warn!(error = ?e, key = %self.key, "photo delete failed");
        }
    }
}

impl Drop for PhotoUpload {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "no runtime to delete orphaned photo");
            return;
        };
        let photos = Arc::clone(&self.photos);
        let key = std::mem::take(&mut self.key);
        runtime.spawn(async move {
            if let Err(e) = photos.delete_photo(&key).await {
                warn!(error = ?e, %key, "orphaned photo delete failed");
            }
        });
    }
}

/// Owns each user's day: meals, water, the analysis slot and activities.
pub struct Tracker {
    store: Arc<dyn TrackerStore>,
    analyzer: Arc<dyn FoodAnalyzer>,
    photos: Option<Arc<dyn PhotoArchive>>,
    slots: Arc<AnalysisSlots>,
}

impl Tracker {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        analyzer: Arc<dyn FoodAnalyzer>,
        photos: Option<Arc<dyn PhotoArchive>>,
    ) -> Self {
        Self {
            store,
            analyzer,
            photos,
            slots: Arc::new(AnalysisSlots::default()),
        }
    }

    async fn profile(&self, user_id: Uuid) -> Result<UserProfile, TrackerError> {
        self.store
            .profile(user_id)
            .await?
            .ok_or(TrackerError::ProfileMissing)
    }

    pub async fn summary(&self, user_id: Uuid, day: Date) -> Result<DailySummary, TrackerError> {
        let profile = self.profile(user_id).await?;
        let meals = self.store.meals_on(user_id, day).await?;
        let water = self.store.water_on(user_id, day).await?;
        Ok(DailySummary::compute(day, &profile, meals, water))
    }

    pub async fn meals(&self, user_id: Uuid, day: Date) -> Result<Vec<Meal>, TrackerError> {
        Ok(self.store.meals_on(user_id, day).await?)
    }

    pub async fn meal(&self, user_id: Uuid, meal_id: Uuid) -> Result<Option<Meal>, TrackerError> {
        Ok(self.store.meal(user_id, meal_id).await?)
    }

    /// Run one analysis in the user's slot. The estimate is parked as
    /// pending until [`Tracker::confirm`] or [`Tracker::cancel`].
    pub async fn analyze(
        &self,
        user_id: Uuid,
        image: CapturedImage,
        meal_type: Option<String>,
    ) -> Result<PendingAnalysis, TrackerError> {
        self.profile(user_id).await?;
        let inflight = self.slots.begin(user_id)?;
        let ticket = inflight.ticket();

        let req = AnalysisRequest {
            image_url: image.url.clone(),
            meal_type,
        };
        let meal_type = req.meal_type_label().to_string();
        debug!(%user_id, %ticket, %meal_type, bytes = ?image.size(), "analysis started");

        // on error the guard drops and frees the slot
        let estimate = self.analyzer.analyze(req).await?;

        match inflight.fulfil(estimate, meal_type, image) {
            Ok(pending) => {
                info!(%user_id, %ticket, calories = pending.estimate.calories, "analysis pending confirmation");
                Ok(pending)
            }
            Err(e) => {
                warn!(%user_id, %ticket, "analysis result arrived after cancel; dropped");
                Err(e.into())
            }
        }
    }

    pub fn cancel(&self, user_id: Uuid) -> bool {
        let cancelled = self.slots.cancel(user_id);
        debug!(%user_id, cancelled, "analysis cancelled");
        cancelled
    }

    /// Turn the pending estimate for `ticket` into a meal. Exactly one meal
    /// is recorded per ticket. If the meal is not recorded, because the
    /// insert failed or the caller went away, the estimate stays pending and
    /// its archived photo is removed.
    pub async fn confirm(
        &self,
        user_id: Uuid,
        ticket: Uuid,
        at: OffsetDateTime,
    ) -> Result<(Meal, DailySummary), TrackerError> {
        let claimed = self.slots.claim(user_id, ticket)?;
        let pending = claimed.pending();
        let meal_id = Uuid::new_v4();
        let photo = self.archive_photo(user_id, meal_id, &pending.image).await;

        let meal = Meal::from_estimate(
            meal_id,
            user_id,
            pending.estimate.clone(),
            pending.meal_type.clone(),
            at,
            photo.as_ref().map(|p| p.key.clone()),
        );

        if let Err(e) = self.store.insert_meal(&meal).await {
            if let Some(photo) = photo {
                photo.discard().await;
            }
            return Err(TrackerError::Store(e.context("insert meal")));
        }
        claimed.consume();
        if let Some(photo) = photo {
            photo.keep();
        }
        info!(%user_id, meal_id = %meal.id, calories = meal.calories, "meal confirmed");

        let summary = self.summary(user_id, meal.eaten_on).await?;
        Ok((meal, summary))
    }

    /// Archive failures never block the meal; it is kept without a photo.
    async fn archive_photo(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        image: &CapturedImage,
    ) -> Option<PhotoUpload> {
        let photos = self.photos.as_ref()?;
        let inline = image.inline.as_ref()?;
        let key = meal_photo_key(user_id, meal_id, &inline.content_type);
        match photos
            .put_photo(&key, inline.body.clone(), &inline.content_type)
            .await
        {
            Ok(()) => Some(PhotoUpload {
                photos: Arc::clone(photos),
                key,
                kept: false,
            }),
            Err(e) => {
                warn!(error = ?e, %meal_id, "photo archive failed; keeping meal without photo");
                None
            }
        }
    }

    async fn discard_photo(&self, key: &str) {
        if let Some(photos) = &self.photos {
            if let Err(e) = photos.delete_photo(key).await {
                warn!(error = ?e, key, "photo delete failed");
            }
        }
    }

    pub async fn add_water(
        &self,
        user_id: Uuid,
        day: Date,
        amount_ml: i64,
    ) -> Result<DailySummary, TrackerError> {
        let amount = u32::try_from(amount_ml)
            .ok()
            .filter(|a| *a > 0)
            .ok_or_else(|| TrackerError::Invalid("amountMl: deve ser um número positivo de ml".into()))?;
        let profile = self.profile(user_id).await?;
        let total = self
            .store
            .add_water(user_id, day, amount, profile.water_goal_ml)
            .await?;
        debug!(%user_id, amount, total, "water added");
        self.summary(user_id, day).await
    }

    pub async fn reset_day(&self, user_id: Uuid, day: Date) -> Result<DailySummary, TrackerError> {
        self.profile(user_id).await?;
        let removed = self.store.clear_day(user_id, day).await?;
        for key in removed.iter().filter_map(|m| m.photo_key.as_deref()) {
            self.discard_photo(key).await;
        }
        info!(%user_id, %day, meals = removed.len(), "day reset");
        self.summary(user_id, day).await
    }

    pub async fn log_activity(
        &self,
        user_id: Uuid,
        input: NewActivity,
        at: OffsetDateTime,
    ) -> Result<Activity, TrackerError> {
        if input.duration_minutes == 0 {
            return Err(TrackerError::Invalid("durationMinutes: deve ser positivo".into()));
        }
        if let Some(km) = input.distance_km {
            if !km.is_finite() || km < 0.0 {
                return Err(TrackerError::Invalid("distanceKm: não pode ser negativo".into()));
            }
        }
        self.profile(user_id).await?;
        let activity = Activity {
            id: Uuid::new_v4(),
            user_id,
            kind: input.kind,
            duration_minutes: input.duration_minutes,
            distance_km: input.distance_km,
            calories_burned: input.calories_burned,
            day: at.date(),
            created_at: at,
        };
        self.store.insert_activity(&activity).await?;
        info!(%user_id, activity_id = %activity.id, kind = activity.kind.as_str(), "activity logged");
        Ok(activity)
    }

    pub async fn activities(&self, user_id: Uuid, day: Date) -> Result<Vec<Activity>, TrackerError> {
        Ok(self.store.activities_on(user_id, day).await?)
    }

    /// Presigned link to the meal's photo, `None` when there is none.
    pub async fn photo_url(&self, user_id: Uuid, meal_id: Uuid) -> Result<Option<String>, TrackerError> {
        let Some(photos) = &self.photos else {
            return Ok(None);
        };
        let meal = match self.store.meal(user_id, meal_id).await? {
            Some(m) if m.has_photo() => m,
            _ => return Ok(None),
        };
        let key = meal.photo_key.unwrap_or_default();
        let url = photos
            .photo_url(&key, PHOTO_URL_TTL_SECS)
            .await
            .context("presign photo")?;
        Ok(Some(url))
    }

    /// Delete the profile and everything recorded for it.
    pub async fn clear_all(&self, user_id: Uuid) -> Result<(), TrackerError> {
        self.slots.cancel(user_id);
        let keys = self.store.delete_profile(user_id).await?;
        for key in &keys {
            self.discard_photo(key).await;
        }
        info!(%user_id, photos = keys.len(), "profile cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stub::{sample_estimate, StubAnalyzer};
    use crate::profile::model::sample_profile;
    use crate::store::MemoryStore;
    use axum::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use time::macros::datetime;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingArchive {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PhotoArchive for RecordingArchive {
        async fn put_photo(&self, key: &str, _body: Bytes, _ct: &str) -> anyhow::Result<()> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }
        async fn delete_photo(&self, key: &str) -> anyhow::Result<()> {
            self.keys.lock().unwrap().retain(|k| k != key);
            Ok(())
        }
        async fn photo_url(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
            Ok(format!("https://photos.test/{}", key))
        }
    }

    /// Accepts the upload call and never finishes it.
    struct StallingArchive;

    #[async_trait]
    impl PhotoArchive for StallingArchive {
        async fn put_photo(&self, _key: &str, _body: Bytes, _ct: &str) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
        async fn delete_photo(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn photo_url(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
            Ok(key.to_string())
        }
    }

    const AT: OffsetDateTime = datetime!(2025-04-02 12:30 UTC);

    async fn setup(analyzer: Arc<dyn FoodAnalyzer>) -> (Tracker, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let profile = sample_profile();
        store.insert_profile(&profile).await.unwrap();
        (Tracker::new(store, analyzer, None), profile.id)
    }

    fn image() -> CapturedImage {
        crate::capture::from_bytes(Bytes::from_static(b"\x89PNG\r\n\x1a\n0000"), None).unwrap()
    }

    #[tokio::test]
    async fn confirm_records_exactly_one_meal() {
        let (tracker, user) = setup(Arc::new(StubAnalyzer::returning(sample_estimate()))).await;
        let pending = tracker.analyze(user, image(), Some("almoço".into())).await.unwrap();

        let (meal, summary) = tracker.confirm(user, pending.ticket, AT).await.unwrap();
        assert_eq!(meal.calories, 650);
        assert_eq!(meal.meal_type, "almoço");
        assert_eq!(meal.time, "12:30");
        assert_eq!(summary.calories_consumed, 650);
        assert_eq!(summary.calories_remaining, 2000 - 650);

        let again = tracker.confirm(user, pending.ticket, AT).await;
        assert!(matches!(again, Err(TrackerError::Slot(SlotError::NoPending))));
        assert_eq!(tracker.meals(user, AT.date()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn abandoned_confirm_keeps_the_estimate_pending() {
        let store = Arc::new(MemoryStore::new());
        let profile = sample_profile();
        store.insert_profile(&profile).await.unwrap();
        let tracker = Tracker::new(
            store,
            Arc::new(StubAnalyzer::returning(sample_estimate())),
            Some(Arc::new(StallingArchive) as Arc<dyn PhotoArchive>),
        );
        let user = profile.id;
        let pending = tracker.analyze(user, image(), None).await.unwrap();

        // the caller gives up while the photo is still uploading
        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            tracker.confirm(user, pending.ticket, AT),
        )
        .await;
        assert!(abandoned.is_err());

        assert!(tracker.meals(user, AT.date()).await.unwrap().is_empty());
        let claimed = tracker.slots.claim(user, pending.ticket).unwrap();
        assert_eq!(claimed.pending().estimate.calories, 650);
    }

    #[tokio::test]
    async fn unkept_photo_upload_is_deleted() {
        let archive = Arc::new(RecordingArchive::default());
        archive
            .put_photo("meals/u/m.png", Bytes::new(), "image/png")
            .await
            .unwrap();
        drop(PhotoUpload {
            photos: archive.clone(),
            key: "meals/u/m.png".into(),
            kept: false,
        });

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !archive.keys.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("orphaned photo removed");

        archive
            .put_photo("meals/u/n.png", Bytes::new(), "image/png")
            .await
            .unwrap();
        PhotoUpload {
            photos: archive.clone(),
            key: "meals/u/n.png".into(),
            kept: false,
        }
        .keep();
        tokio::task::yield_now().await;
        assert_eq!(archive.keys.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_analysis_frees_the_slot_and_records_nothing() {
        let (tracker, user) = setup(Arc::new(StubAnalyzer::failing())).await;
        let err = tracker.analyze(user, image(), None).await.unwrap_err();
        assert!(matches!(err, TrackerError::Analysis(AnalysisError::IncompleteResult { .. })));

        // slot is free again
        let err = tracker.analyze(user, image(), None).await.unwrap_err();
        assert!(matches!(err, TrackerError::Analysis(_)));
        assert_eq!(tracker.summary(user, AT.date()).await.unwrap().calories_consumed, 0);
    }

    #[tokio::test]
    async fn concurrent_analysis_is_busy_and_cancel_makes_result_stale() {
        let gate = Arc::new(Notify::new());
        let stub = Arc::new(StubAnalyzer::gated(sample_estimate(), gate.clone()));
        let (tracker, user) = setup(stub.clone()).await;
        let tracker = Arc::new(tracker);

        let first = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.analyze(user, image(), None).await })
        };
        while stub.calls() == 0 {
            tokio::task::yield_now().await;
        }

        let second = tracker.analyze(user, image(), None).await;
        assert!(matches!(second, Err(TrackerError::Slot(SlotError::Busy))));

        assert!(tracker.cancel(user));
        gate.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, Err(TrackerError::Slot(SlotError::Stale))));
        assert!(tracker.meals(user, AT.date()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn water_is_capped_at_goal_and_validated() {
        let (tracker, user) = setup(Arc::new(StubAnalyzer::failing())).await;
        let day = AT.date();

        let s = tracker.add_water(user, day, 2000).await.unwrap();
        assert_eq!(s.water_consumed_ml, 2000);
        let s = tracker.add_water(user, day, 1000).await.unwrap();
        assert_eq!(s.water_consumed_ml, 2450);

        assert!(matches!(tracker.add_water(user, day, 0).await, Err(TrackerError::Invalid(_))));
        assert!(matches!(tracker.add_water(user, day, -250).await, Err(TrackerError::Invalid(_))));
    }

    #[tokio::test]
    async fn reset_day_clears_meals_water_and_photos() {
        let store = Arc::new(MemoryStore::new());
        let profile = sample_profile();
        store.insert_profile(&profile).await.unwrap();
        let archive = Arc::new(RecordingArchive::default());
        let tracker = Tracker::new(
            store,
            Arc::new(StubAnalyzer::returning(sample_estimate())),
            Some(archive.clone() as Arc<dyn PhotoArchive>),
        );
        let user = profile.id;

        let pending = tracker.analyze(user, image(), None).await.unwrap();
        let (meal, _) = tracker.confirm(user, pending.ticket, AT).await.unwrap();
        assert_eq!(archive.keys.lock().unwrap().len(), 1);
        assert_eq!(
            tracker.photo_url(user, meal.id).await.unwrap().unwrap(),
            format!("https://photos.test/meals/{}/{}.png", user, meal.id)
        );
        tracker.add_water(user, AT.date(), 500).await.unwrap();

        let s = tracker.reset_day(user, AT.date()).await.unwrap();
        assert_eq!(s.calories_consumed, 0);
        assert_eq!(s.water_consumed_ml, 0);
        assert!(s.meals.is_empty());
        assert!(archive.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn activities_are_listed_but_not_counted() {
        let (tracker, user) = setup(Arc::new(StubAnalyzer::failing())).await;
        let input = NewActivity {
            kind: crate::tracker::model::ActivityKind::Run,
            duration_minutes: 30,
            distance_km: Some(5.0),
            calories_burned: 320,
        };
        tracker.log_activity(user, input.clone(), AT).await.unwrap();
        assert_eq!(tracker.activities(user, AT.date()).await.unwrap().len(), 1);
        assert_eq!(tracker.summary(user, AT.date()).await.unwrap().calories_burned, 0);

        let zero = NewActivity {
            duration_minutes: 0,
            ..input
        };
        assert!(matches!(
            tracker.log_activity(user, zero, AT).await,
            Err(TrackerError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn unknown_user_has_no_profile() {
        let (tracker, _) = setup(Arc::new(StubAnalyzer::failing())).await;
        let err = tracker.summary(Uuid::new_v4(), AT.date()).await.unwrap_err();
        assert!(matches!(err, TrackerError::ProfileMissing));
    }
}
