use axum::Json;
use axum::body::Body;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::{ADMIN_PATH, AppState, render};
use crate::error::{ConsoleError, Result};
use crate::request::{NewGrantRequest, RequestId};

#[derive(Debug, Default, Deserialize)]
pub struct DeliverForm {
    /// Overrides the address captured when the request was created
    #[serde(default)]
    pub recipient: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn list_requests(State(state): State<AppState>) -> Result<Html<String>> {
    let requests = state.console.list().await?;
    Ok(Html(render::admin_page(&requests)))
}

pub async fn create_request(
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Redirect> {
    let input = NewGrantRequest::from_form(pairs)?;
    state.console.create(input).await?;
    Ok(Redirect::to(ADMIN_PATH))
}

pub async fn run_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Redirect> {
    state.console.run(RequestId(id)).await?;
    Ok(Redirect::to(ADMIN_PATH))
}

pub async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let (request, file) = state.console.open_report(RequestId(id)).await?;
    let disposition = format!("attachment; filename=\"grant-{}.pdf\"", request.id.0);

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

pub async fn deliver_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    form: std::result::Result<Form<DeliverForm>, FormRejection>,
) -> Result<Redirect> {
    let recipient = match form {
        Ok(Form(form)) => form.recipient,
        // A bare POST carries no override
        Err(FormRejection::InvalidFormContentType(_)) => None,
        Err(e) => return Err(ConsoleError::Validation(e.body_text())),
    };
    state.console.deliver(RequestId(id), recipient).await?;
    Ok(Redirect::to(ADMIN_PATH))
}

pub async fn archive_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Redirect> {
    state.console.archive(RequestId(id)).await?;
    Ok(Redirect::to(ADMIN_PATH))
}

pub async fn delete_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Redirect> {
    state.console.delete(RequestId(id)).await?;
    Ok(Redirect::to(ADMIN_PATH))
}
