mod dto;
pub mod handlers;
pub mod model;
mod service;
mod slot;

use crate::state::AppState;
use axum::Router;

pub use service::{Tracker, TrackerError};
pub use slot::SlotError;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::meal_routes())
        .merge(handlers::day_routes())
}
