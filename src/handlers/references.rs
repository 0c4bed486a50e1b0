use super::{AppState, blocking};
use crate::types::ReferencesResponse;
use crate::Result;
use axum::{
    Json,
    extract::{Path, State},
};

pub async fn get_references(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReferencesResponse>> {
    let (location, format) = state.root.locate(&id)?;

    let opener = state.opener.clone();
    let response = blocking(move || {
        let mut source = opener.open_as(location, format)?;
        let references = source.references()?.to_vec();
        source.close();
        Ok(ReferencesResponse { format, references })
    })
    .await?;

    Ok(Json(response))
}
