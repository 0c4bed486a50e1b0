use super::{AppState, blocking};
use crate::types::{GenomicRange, Query as RangeQuery, RecordsQuery, RecordsResponse, Resolution};
use crate::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
};

/// Largest position addressable by a default-depth binning index.
const MAX_POSITION: u64 = (1 << 29) - 1;

/// Records overlapping `referenceName:start-end` in the file named by `id`.
///
/// `start` defaults to 1 and `end` to the largest indexable position.
pub async fn get_records(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<RecordsQuery>,
) -> Result<Json<RecordsResponse>> {
    let (location, format) = state.root.locate(&id)?;

    let range = GenomicRange::new(
        params.reference_name,
        params.start.unwrap_or(1),
        params.end.unwrap_or(MAX_POSITION),
    )?;
    let mut query =
        RangeQuery::new(range).with_resolution(params.resolution.unwrap_or(Resolution::High));
    if let Some(length) = params.reference_length {
        query = query.with_reference_length(length);
    }

    let opener = state.opener.clone();
    let response = blocking(move || {
        let mut source = opener.open_as(location, format)?;
        let records = source.records(&query)?;
        source.close();
        Ok(RecordsResponse {
            format,
            reference: query.range.reference,
            records,
        })
    })
    .await?;

    Ok(Json(response))
}
