//! Search proxy endpoint.

use axum::extract::{Query, State};
use axum::response::Json;
use magstream_search::{PageRequest, SearchPage};
use serde::Deserialize;

use crate::errors::ApiError;
use crate::server::AppState;

/// Query string of `GET /search`.
///
/// `page` and `limit` are taken leniently: values that do not parse fall
/// back to the defaults.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Free-text search terms
    pub query: Option<String>,
    /// 1-based page number
    pub page: Option<String>,
    /// Results per page
    pub limit: Option<String>,
}

/// Forwards the query to the search provider and returns one page.
///
/// # Errors
/// - `ApiError::MissingParameter` - `query` absent or blank
/// - `ApiError::Search` - Provider failure
pub async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchPage>, ApiError> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .ok_or(ApiError::MissingParameter { name: "query" })?;

    let request = PageRequest::new(parse_number(&params.page), parse_number(&params.limit));
    let page = state.search.search(query, request).await?;
    Ok(Json(page))
}

fn parse_number(value: &Option<String>) -> Option<u32> {
    value.as_deref().and_then(|value| value.trim().parse().ok())
}
