//! Backend API models for meals, meal plans, and ratings.
//!
//! Meals and ratings travel in camelCase; meal plan entries use the backend's
//! snake_case field names.

use crate::identifier::{lenient_timestamp, AccountId, MealId, MealPlanId, MealRatingId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// When in the day a meal is eaten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    /// Breakfast.
    Breakfast,
    /// Lunch.
    Lunch,
    /// Dinner.
    Dinner,
    /// Snack.
    Snack,
    /// Anything else.
    Other,
}

impl MealType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in meal categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum MealCategory {
    Italian,
    American,
    Asian,
    Mexican,
    Mediterranean,
    Vegetarian,
    Vegan,
    GlutenFree,
    DairyFree,
    Quick,
    MealPrep,
    ComfortFood,
    Healthy,
    Dessert,
    Custom,
}

/// A 1–5 star rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RatingValue(u8);

impl RatingValue {
    /// Lowest rating.
    pub const TERRIBLE: Self = Self(1);
    /// Highest rating.
    pub const EXCELLENT: Self = Self(5);

    /// Create a rating, rejecting values outside 1–5.
    pub fn new(stars: u8) -> Option<Self> {
        (1..=5).contains(&stars).then_some(Self(stars))
    }

    /// Number of stars.
    pub fn stars(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RatingValue {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("rating must be between 1 and 5, got {value}"))
    }
}

impl From<RatingValue> for u8 {
    fn from(value: RatingValue) -> Self {
        value.0
    }
}

/// A meal in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: MealId,
    pub name: String,
    pub meal_type: MealType,
    #[serde(default)]
    pub categories: Vec<MealCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default = "default_servings")]
    pub serving_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories_per_serving: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparation_time_minutes: Option<u32>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub custom_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<RatingValue>,
    #[serde(with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "lenient_timestamp")]
    pub updated_at: DateTime<Utc>,
    pub created_by: AccountId,
    pub household_id: AccountId,
}

/// Body of `POST /meals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealCreate {
    pub name: String,
    pub meal_type: MealType,
    #[serde(default)]
    pub categories: Vec<MealCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub serving_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories_per_serving: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparation_time_minutes: Option<u32>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub custom_categories: Vec<String>,
}

impl MealCreate {
    /// A single-serving meal with no extras.
    pub fn new(name: impl Into<String>, meal_type: MealType) -> Self {
        Self {
            name: name.into(),
            meal_type,
            categories: Vec::new(),
            recipe_id: None,
            notes: None,
            serving_count: default_servings(),
            calories_per_serving: None,
            preparation_time_minutes: None,
            is_favorite: false,
            custom_categories: Vec::new(),
        }
    }

    /// Add a category.
    #[must_use]
    pub fn with_category(mut self, category: MealCategory) -> Self {
        self.categories.push(category);
        self
    }

    /// Set notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Body of `PATCH /meals/{id}`; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<MealType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<MealCategory>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories_per_serving: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation_time_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<RatingValue>,
}

/// Lifecycle of a planned slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealPlanStatus {
    /// Scheduled, not yet cooked.
    #[default]
    Planned,
    /// Cooked.
    Prepared,
    /// Not eaten.
    Skipped,
    /// Swapped for something else.
    Replaced,
}

/// A meal assigned to a calendar slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanEntry {
    pub id: MealPlanId,
    pub meal_id: MealId,
    pub planned_date: NaiveDate,
    pub meal_type: MealType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: MealPlanStatus,
    #[serde(default = "default_servings")]
    pub serving_count: u32,
    #[serde(with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "lenient_timestamp")]
    pub updated_at: DateTime<Utc>,
    pub created_by: AccountId,
    pub household_id: AccountId,
}

/// A plan entry with its meal inlined, as returned by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanEntryWithMeal {
    #[serde(flatten)]
    pub entry: MealPlanEntry,
    pub meal: Meal,
}

/// Body of `POST /meal-plans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanEntryCreate {
    pub meal_id: MealId,
    pub planned_date: NaiveDate,
    pub meal_type: MealType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: MealPlanStatus,
    pub serving_count: u32,
}

impl MealPlanEntryCreate {
    /// Plan `meal_id` for the given day and slot.
    pub fn new(meal_id: MealId, planned_date: NaiveDate, meal_type: MealType) -> Self {
        Self {
            meal_id,
            planned_date,
            meal_type,
            notes: None,
            status: MealPlanStatus::Planned,
            serving_count: default_servings(),
        }
    }
}

/// Body of `PATCH /meal-plans/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealPlanEntryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_id: Option<MealId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<MealType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MealPlanStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_count: Option<u32>,
}

/// Filter for `GET /meal-plans`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MealPlanQuery {
    /// First day (inclusive). The backend defaults to today.
    pub start_date: Option<NaiveDate>,
    /// Last day (inclusive). The backend defaults to a week after the start.
    pub end_date: Option<NaiveDate>,
    /// Only this slot.
    pub meal_type: Option<MealType>,
}

impl MealPlanQuery {
    /// Entries between two dates, inclusive.
    pub fn between(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            meal_type: None,
        }
    }

    /// Query string pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start_date {
            pairs.push(("start_date".into(), start.to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("end_date".into(), end.to_string()));
        }
        if let Some(meal_type) = self.meal_type {
            pairs.push(("meal_type".into(), meal_type.as_str().into()));
        }
        pairs
    }
}

/// A user's rating of a consumed meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRating {
    pub id: MealRatingId,
    pub meal_id: MealId,
    pub rating: RatingValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(with = "lenient_timestamp")]
    pub date_consumed: DateTime<Utc>,
    #[serde(with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "lenient_timestamp")]
    pub updated_at: DateTime<Utc>,
    pub user_id: AccountId,
    pub household_id: AccountId,
}

/// Body of `POST /meal-ratings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRatingCreate {
    pub meal_id: MealId,
    pub rating: RatingValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(with = "lenient_timestamp")]
    pub date_consumed: DateTime<Utc>,
}

impl MealRatingCreate {
    /// Rate a meal eaten now.
    pub fn new(meal_id: MealId, rating: RatingValue) -> Self {
        Self {
            meal_id,
            rating,
            comments: None,
            date_consumed: crate::identifier::now_utc(),
        }
    }

    /// Attach a comment.
    #[must_use]
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

fn default_servings() -> u32 {
    1
}
