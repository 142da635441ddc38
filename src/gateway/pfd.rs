//! PFD management handlers
//!
//! Transactions and their applications are relayed to the NEF; the only
//! gateway logic is re-rooting self-links, nested ones included.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use super::links::SelfLinked;
use super::response::{ApiError, json_response, parse_body};
use super::router::AppState;
use crate::Error;
use crate::downstream::{CallOptions, DownstreamResponse};
use crate::model::{PfdData, PfdManagement};

fn present<T: SelfLinked>(
    state: &AppState,
    response: DownstreamResponse<T>,
    what: &'static str,
) -> crate::Result<T> {
    let mut body = response.body.ok_or(Error::MissingLink(what))?;
    body.rewrite_links(&state.links)?;
    Ok(body)
}

async fn relay<T>(
    state: &AppState,
    method: Method,
    path: &str,
    body: &Bytes,
    options: CallOptions,
    what: &'static str,
) -> Result<Response, ApiError>
where
    T: SelfLinked + Serialize + DeserializeOwned,
{
    let payload: T = parse_body(body)?;
    let response = state.nef.send::<T, T>(method, path, Some(&payload), options).await?;
    let updated = present(state, response, what)?;
    Ok(json_response(StatusCode::OK, &updated, None))
}

/// GET /pfd/transactions
pub async fn list_transactions(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let response = state
        .nef
        .get::<Vec<PfdManagement>>(&state.pfd_path(None, None), CallOptions::default())
        .await?;

    let mut transactions = response.body.unwrap_or_default();
    transactions.rewrite_links(&state.links)?;
    Ok(json_response(StatusCode::OK, &transactions, None))
}

/// POST /pfd/transactions
///
/// The `Location` of the answer is the rewritten self-link of the created
/// transaction; without a downstream self-link the request fails.
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let transaction: PfdManagement = parse_body(&body)?;
    let response = state
        .nef
        .send::<_, PfdManagement>(
            Method::POST,
            &state.pfd_path(None, None),
            Some(&transaction),
            CallOptions::default(),
        )
        .await?;

    let created = present(&state, response, "PFD transaction")?;
    let location = created
        .self_link
        .clone()
        .ok_or(Error::MissingLink("PFD transaction"))?;

    info!(location = %location, applications = created.pfd_datas.len(), "PFD transaction created");
    Ok(json_response(StatusCode::CREATED, &created, Some(&location)))
}

/// GET /pfd/transactions/{id}
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
) -> Result<Response, ApiError> {
    let response = state
        .nef
        .get::<PfdManagement>(&state.pfd_path(Some(&transaction_id), None), CallOptions::default())
        .await?;
    let transaction = present(&state, response, "PFD transaction")?;
    Ok(json_response(StatusCode::OK, &transaction, None))
}

/// PUT /pfd/transactions/{id}
pub async fn put_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    relay::<PfdManagement>(
        &state,
        Method::PUT,
        &state.pfd_path(Some(&transaction_id), None),
        &body,
        CallOptions::default(),
        "PFD transaction",
    )
    .await
}

/// DELETE /pfd/transactions/{id}
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
) -> Result<Response, ApiError> {
    state
        .nef
        .delete(&state.pfd_path(Some(&transaction_id), None), CallOptions::default())
        .await?;
    info!(transaction_id = %transaction_id, "PFD transaction deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /pfd/transactions/{id}/applications/{appId}
pub async fn get_application(
    State(state): State<Arc<AppState>>,
    Path((transaction_id, application_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let response = state
        .nef
        .get::<PfdData>(
            &state.pfd_path(Some(&transaction_id), Some(&application_id)),
            CallOptions::default(),
        )
        .await?;
    let application = present(&state, response, "PFD application")?;
    Ok(json_response(StatusCode::OK, &application, None))
}

/// PUT /pfd/transactions/{id}/applications/{appId}
pub async fn put_application(
    State(state): State<Arc<AppState>>,
    Path((transaction_id, application_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    relay::<PfdData>(
        &state,
        Method::PUT,
        &state.pfd_path(Some(&transaction_id), Some(&application_id)),
        &body,
        CallOptions::default(),
        "PFD application",
    )
    .await
}

/// PATCH /pfd/transactions/{id}/applications/{appId}
pub async fn patch_application(
    State(state): State<Arc<AppState>>,
    Path((transaction_id, application_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    relay::<PfdData>(
        &state,
        Method::PATCH,
        &state.pfd_path(Some(&transaction_id), Some(&application_id)),
        &body,
        CallOptions::default().merge_patch(),
        "PFD application",
    )
    .await
}

/// DELETE /pfd/transactions/{id}/applications/{appId}
pub async fn delete_application(
    State(state): State<Arc<AppState>>,
    Path((transaction_id, application_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state
        .nef
        .delete(
            &state.pfd_path(Some(&transaction_id), Some(&application_id)),
            CallOptions::default(),
        )
        .await?;
    info!(
        transaction_id = %transaction_id,
        application_id = %application_id,
        "PFD application deleted"
    );
    Ok(StatusCode::NO_CONTENT.into_response())
}
