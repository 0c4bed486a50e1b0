use super::AppState;
use crate::types::{FeaturesQuery, FeaturesResponse};
use crate::{Error, Result};
use axum::{
    Json,
    extract::{Query, State},
};

/// Look up a feature name in the loaded dictionary.
pub async fn get_features(
    State(state): State<AppState>,
    Query(params): Query<FeaturesQuery>,
) -> Result<Json<FeaturesResponse>> {
    let dictionary = state
        .dictionary
        .as_ref()
        .ok_or_else(|| Error::NotFound("no feature dictionary loaded".to_string()))?;

    let locations = dictionary.lookup(&params.name).to_vec();
    if locations.is_empty() {
        return Err(Error::NotFound(format!("feature not found: {}", params.name)));
    }

    Ok(Json(FeaturesResponse {
        name: params.name,
        locations,
    }))
}
