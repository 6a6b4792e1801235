//! One analysis at a time per user.
//!
//! Each analysis attempt gets a ticket. The slot moves
//! `empty -> requesting(ticket) -> pending(ticket) -> empty` and any result
//! that comes back for a ticket that is no longer current is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use uuid::Uuid;

use crate::analysis::NutritionEstimate;
use crate::capture::CapturedImage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("já existe uma análise em andamento")]
    Busy,
    #[error("a análise foi cancelada antes de terminar")]
    Stale,
    #[error("nenhuma análise pendente para este ticket")]
    NoPending,
}

/// Estimate waiting for the user to confirm or cancel.
#[derive(Debug, Clone)]
pub struct PendingAnalysis {
    pub ticket: Uuid,
    pub estimate: NutritionEstimate,
    pub meal_type: String,
    pub image: CapturedImage,
}

#[derive(Debug)]
enum Slot {
    Requesting(Uuid),
    Pending(PendingAnalysis),
}

#[derive(Default)]
pub struct AnalysisSlots {
    slots: Mutex<HashMap<Uuid, Slot>>,
}

impl AnalysisSlots {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        // No code path panics while holding the lock; recover anyway.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the user's slot. A pending, unconfirmed result is replaced.
    pub fn begin(self: &Arc<Self>, user_id: Uuid) -> Result<InFlight, SlotError> {
        let mut slots = self.lock();
        if let Some(Slot::Requesting(_)) = slots.get(&user_id) {
            return Err(SlotError::Busy);
        }
        let ticket = Uuid::new_v4();
        slots.insert(user_id, Slot::Requesting(ticket));
        Ok(InFlight {
            slots: Arc::clone(self),
            user_id,
            ticket,
            settled: false,
        })
    }

    /// Clear whatever the user has in flight or pending.
    pub fn cancel(&self, user_id: Uuid) -> bool {
        self.lock().remove(&user_id).is_some()
    }

    /// Claim the pending result for `ticket`. The slot stays empty while the
    /// claim is held, so a ticket is confirmed at most once.
    pub fn claim(self: &Arc<Self>, user_id: Uuid, ticket: Uuid) -> Result<Claimed, SlotError> {
        let mut slots = self.lock();
        match slots.remove(&user_id) {
            Some(Slot::Pending(pending)) if pending.ticket == ticket => Ok(Claimed {
                slots: Arc::clone(self),
                user_id,
                pending,
                consumed: false,
            }),
            Some(other) => {
                slots.insert(user_id, other);
                Err(SlotError::NoPending)
            }
            None => Err(SlotError::NoPending),
        }
    }

    /// Put back an unconfirmed result, unless the user has started something
    /// else meanwhile.
    fn restore(&self, user_id: Uuid, pending: PendingAnalysis) {
        self.lock().entry(user_id).or_insert(Slot::Pending(pending));
    }

    fn settle(&self, user_id: Uuid, ticket: Uuid, outcome: Option<PendingAnalysis>) -> bool {
        let mut slots = self.lock();
        match slots.get(&user_id) {
            Some(Slot::Requesting(current)) if *current == ticket => {
                match outcome {
                    Some(p) => slots.insert(user_id, Slot::Pending(p)),
                    None => slots.remove(&user_id),
                };
                true
            }
            _ => false,
        }
    }
}

/// Claim on a user's slot for the duration of one upstream call. Dropping it
/// without [`InFlight::fulfil`] releases the slot.
pub struct InFlight {
    slots: Arc<AnalysisSlots>,
    user_id: Uuid,
    ticket: Uuid,
    settled: bool,
}

impl InFlight {
    pub fn ticket(&self) -> Uuid {
        self.ticket
    }

    /// Park the result as pending. Fails with [`SlotError::Stale`] when the
    /// user cancelled while the request was outstanding.
    pub fn fulfil(
        mut self,
        estimate: NutritionEstimate,
        meal_type: String,
        image: CapturedImage,
    ) -> Result<PendingAnalysis, SlotError> {
        self.settled = true;
        let pending = PendingAnalysis {
            ticket: self.ticket,
            estimate,
            meal_type,
            image,
        };
        if self.slots.settle(self.user_id, self.ticket, Some(pending.clone())) {
            Ok(pending)
        } else {
            Err(SlotError::Stale)
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            self.slots.settle(self.user_id, self.ticket, None);
        }
    }
}

/// A pending result taken out for confirmation. Dropping it without
/// [`Claimed::consume`] puts it back, so a failed or abandoned confirmation
/// can be retried.
pub struct Claimed {
    slots: Arc<AnalysisSlots>,
    user_id: Uuid,
    pending: PendingAnalysis,
    consumed: bool,
}

impl Claimed {
    pub fn pending(&self) -> &PendingAnalysis {
        &self.pending
    }

    /// The meal was recorded; the result is gone for good.
    pub fn consume(mut self) {
        self.consumed = true;
    }
}

impl Drop for Claimed {
    fn drop(&mut self) {
        if !self.consumed {
            self.slots.restore(self.user_id, self.pending.clone());
        }
    }
}
