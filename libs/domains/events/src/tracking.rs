//! Typed helpers for the well-known event domains.
//!
//! Each helper turns a domain payload into the open metadata map and routes
//! it through [`IngestionService::track`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{EventError, EventResult};
use crate::ingestion::IngestionService;
use crate::models::{Event, EventCategory, EventDraft};
use crate::repository::{EventRepository, SessionRepository};

/// Subscription funnel steps, used as the `action` of subscription events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionAction {
    PaywallViewed,
    TrialStarted,
    Subscribed,
    Renewed,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkoutDetails {
    pub workout_id: Option<Uuid>,
    pub workout_type: String,
    pub duration_secs: Option<u32>,
    pub calories: Option<f64>,
    pub exercises: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NutritionDetails {
    pub meal_type: String,
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionDetails {
    pub plan: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub trial_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    pub code: Option<String>,
    pub screen: Option<String>,
    pub fatal: bool,
}

fn metadata_of<T: Serialize>(details: &T) -> EventResult<Map<String, Value>> {
    match serde_json::to_value(details) {
        Ok(Value::Object(map)) => Ok(map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect()),
        Ok(_) => Ok(Map::new()),
        Err(e) => Err(EventError::Validation(e.to_string())),
    }
}

impl<E, S> IngestionService<E, S>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    /// `workout/{action}` labelled with the workout type; value is the duration
    pub fn track_workout(
        &self,
        ctx: &RequestContext,
        action: &str,
        details: &WorkoutDetails,
    ) -> EventResult<Event> {
        let mut draft = EventDraft::new(EventCategory::Workout, action)
            .with_label(details.workout_type.clone())
            .with_metadata(metadata_of(details)?);
        if let Some(secs) = details.duration_secs {
            draft = draft.with_value(f64::from(secs));
        }
        self.track(draft, ctx)
    }

    /// `nutrition/{action}` labelled with the meal type; value is the calories
    pub fn track_nutrition(
        &self,
        ctx: &RequestContext,
        action: &str,
        details: &NutritionDetails,
    ) -> EventResult<Event> {
        let mut draft = EventDraft::new(EventCategory::Nutrition, action)
            .with_label(details.meal_type.clone())
            .with_metadata(metadata_of(details)?);
        if let Some(calories) = details.calories {
            draft = draft.with_value(calories);
        }
        self.track(draft, ctx)
    }

    /// `subscription/{action}` labelled with the plan; value is the price
    pub fn track_subscription(
        &self,
        ctx: &RequestContext,
        action: SubscriptionAction,
        details: &SubscriptionDetails,
    ) -> EventResult<Event> {
        let mut draft = EventDraft::new(EventCategory::Subscription, action.to_string())
            .with_label(details.plan.clone())
            .with_metadata(metadata_of(details)?);
        if let Some(price) = details.price {
            draft = draft.with_value(price);
        }
        self.track(draft, ctx)
    }

    /// `feature_usage/used` labelled with the feature; value is seconds spent
    pub fn track_feature_usage(
        &self,
        ctx: &RequestContext,
        feature: &str,
        time_spent_secs: Option<f64>,
        metadata: Map<String, Value>,
    ) -> EventResult<Event> {
        let mut draft = EventDraft::new(EventCategory::FeatureUsage, "used")
            .with_label(feature)
            .with_metadata(metadata);
        if let Some(secs) = time_spent_secs {
            draft = draft.with_value(secs);
        }
        self.track(draft, ctx)
    }

    /// `error/fatal` or `error/handled`, labelled with the error code
    pub fn track_error(&self, ctx: &RequestContext, details: &ErrorDetails) -> EventResult<Event> {
        let action = if details.fatal { "fatal" } else { "handled" };
        let mut draft =
            EventDraft::new(EventCategory::Error, action).with_metadata(metadata_of(details)?);
        if let Some(code) = &details.code {
            draft = draft.with_label(code.clone());
        }
        self.track(draft, ctx)
    }

    /// `navigation/screen_view` labelled with the destination screen
    pub fn track_navigation(
        &self,
        ctx: &RequestContext,
        from: Option<&str>,
        to: &str,
    ) -> EventResult<Event> {
        let mut metadata = Map::new();
        if let Some(from) = from {
            metadata.insert("from".into(), Value::String(from.to_string()));
        }
        let draft = EventDraft::new(EventCategory::Navigation, "screen_view")
            .with_label(to)
            .with_metadata(metadata);
        self.track(draft, ctx)
    }
}
