//! Typed access to the meal-planning backend.

use crate::error::GatewayResult;
use crate::request::ApiRequest;
use crate::transport::AuthenticatedClient;
use mealplan_core::meals::{
    Meal, MealCreate, MealPlanEntry, MealPlanEntryCreate, MealPlanEntryUpdate, MealPlanEntryWithMeal,
    MealPlanQuery, MealRating, MealRatingCreate, MealUpdate,
};
use mealplan_core::{MealId, MealPlanId, MealRatingId};
use serde::Deserialize;
use std::sync::Arc;

/// The meal list comes back either bare or wrapped in `{"meals": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum MealListing {
    Bare(Vec<Meal>),
    Wrapped { meals: Vec<Meal> },
}

impl From<MealListing> for Vec<Meal> {
    fn from(listing: MealListing) -> Self {
        match listing {
            MealListing::Bare(meals) | MealListing::Wrapped { meals } => meals,
        }
    }
}

/// Backend endpoints for meals, meal plans, and ratings.
#[derive(Debug, Clone)]
pub struct MealApi {
    client: Arc<AuthenticatedClient>,
}

impl MealApi {
    /// Wrap an authenticated client.
    pub fn new(client: Arc<AuthenticatedClient>) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<AuthenticatedClient> {
        &self.client
    }

    // Meals

    /// `GET /meals`.
    pub async fn list_meals(&self) -> GatewayResult<Vec<Meal>> {
        let listing: MealListing = self.client.send_json(ApiRequest::get("/meals")).await?;
        Ok(listing.into())
    }

    /// `GET /meals/{id}`.
    pub async fn get_meal(&self, id: MealId) -> GatewayResult<Meal> {
        self.client
            .send_json(ApiRequest::get(format!("/meals/{id}")))
            .await
    }

    /// `POST /meals`.
    pub async fn create_meal(&self, meal: &MealCreate) -> GatewayResult<Meal> {
        self.client
            .send_json(ApiRequest::post("/meals").json(meal)?)
            .await
    }

    /// `PATCH /meals/{id}`.
    pub async fn update_meal(&self, id: MealId, update: &MealUpdate) -> GatewayResult<Meal> {
        self.client
            .send_json(ApiRequest::patch(format!("/meals/{id}")).json(update)?)
            .await
    }

    /// `DELETE /meals/{id}`.
    pub async fn delete_meal(&self, id: MealId) -> GatewayResult<()> {
        self.client
            .send_empty(ApiRequest::delete(format!("/meals/{id}")))
            .await
    }

    // Meal plans

    /// `GET /meal-plans`, with the meal inlined in each entry.
    pub async fn list_meal_plans(&self, query: &MealPlanQuery) -> GatewayResult<Vec<MealPlanEntryWithMeal>> {
        self.client
            .send_json(ApiRequest::get("/meal-plans").query(query.to_pairs()))
            .await
    }

    /// `GET /meal-plans/{id}`.
    pub async fn get_meal_plan(&self, id: MealPlanId) -> GatewayResult<MealPlanEntryWithMeal> {
        self.client
            .send_json(ApiRequest::get(format!("/meal-plans/{id}")))
            .await
    }

    /// `POST /meal-plans`.
    pub async fn create_meal_plan(&self, entry: &MealPlanEntryCreate) -> GatewayResult<MealPlanEntry> {
        self.client
            .send_json(ApiRequest::post("/meal-plans").json(entry)?)
            .await
    }

    /// `PATCH /meal-plans/{id}`.
    pub async fn update_meal_plan(
        &self,
        id: MealPlanId,
        update: &MealPlanEntryUpdate,
    ) -> GatewayResult<MealPlanEntry> {
        self.client
            .send_json(ApiRequest::patch(format!("/meal-plans/{id}")).json(update)?)
            .await
    }

    /// `DELETE /meal-plans/{id}`.
    pub async fn delete_meal_plan(&self, id: MealPlanId) -> GatewayResult<()> {
        self.client
            .send_empty(ApiRequest::delete(format!("/meal-plans/{id}")))
            .await
    }

    // Ratings

    /// `POST /meal-ratings`.
    pub async fn rate_meal(&self, rating: &MealRatingCreate) -> GatewayResult<MealRating> {
        self.client
            .send_json(ApiRequest::post("/meal-ratings").json(rating)?)
            .await
    }

    /// `GET /meal-ratings/meal/{meal_id}`.
    pub async fn list_ratings(&self, meal_id: MealId) -> GatewayResult<Vec<MealRating>> {
        self.client
            .send_json(ApiRequest::get(format!("/meal-ratings/meal/{meal_id}")))
            .await
    }

    /// `DELETE /meal-ratings/{id}`.
    pub async fn delete_rating(&self, id: MealRatingId) -> GatewayResult<()> {
        self.client
            .send_empty(ApiRequest::delete(format!("/meal-ratings/{id}")))
            .await
    }
}
