use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use form_schema::messages::SIGN_IN_REQUIRED;
use form_schema::{
    ActionState, AddCommentForm, EmailSignUpForm, PhoneSignUpForm, ReportIncidentForm,
    RequestReviewForm, SignIn,
};
use serde::Deserialize;
use valueguard_core::actions::{self, ResolvedEmail, SignedIn};
use valueguard_core::categorize::{categorize, Categories};
use valueguard_core::error::StoreError;
use valueguard_core::feed::Page;
use valueguard_core::identity::TokenClaims;
use valueguard_core::models::{Comment, Incident, UserProfile, USERS};
use valueguard_core::queries::{self, CompanyProfile, FeedQuery};
use valueguard_core::state::AppState;
use valueguard_core::store::get_as;

type ApiError = (StatusCode, Json<serde_json::Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/actions/report-incident", post(report_incident))
        .route("/actions/request-review", post(request_review))
        .route("/actions/sign-up/email", post(sign_up_with_email))
        .route("/actions/sign-up/phone", post(sign_up_with_phone))
        .route("/actions/add-comment", post(add_comment))
        .route("/actions/resolve-login-email", post(resolve_login_email))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/me", get(current_user))
        .route("/categorize", post(categorize_report))
        .route("/incidents", get(list_incidents))
        .route("/incidents/:id", get(get_incident))
        .route("/incidents/:id/comments", get(list_comments))
        .route("/companies/:name", get(company_profile))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Runs SQLite and password work off the async workers.
async fn blocking<T, F>(state: AppState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|err| {
            tracing::error!(%err, "blocking task failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<TokenClaims, ApiError> {
    let token =
        bearer(headers).ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, SIGN_IN_REQUIRED))?;
    state.identity.verify_id_token(token).map_err(|err| {
        tracing::warn!(%err, "rejected id token");
        error_body(StatusCode::UNAUTHORIZED, err.to_string())
    })
}

/// The author is always the token holder; a `userId` in the body is ignored.
async fn report_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<ReportIncidentForm>,
) -> ApiResult<ActionState> {
    let claims = authenticate(&state, &headers)?;
    let form = ReportIncidentForm {
        user_id: Some(claims.uid),
        ..form
    };
    blocking(state, move |state| actions::report_incident(state, &form))
        .await
        .map(Json)
}

async fn request_review(
    State(state): State<AppState>,
    Json(form): Json<RequestReviewForm>,
) -> ApiResult<ActionState> {
    blocking(state, move |state| actions::request_review(state, &form))
        .await
        .map(Json)
}

async fn sign_up_with_email(
    State(state): State<AppState>,
    Json(form): Json<EmailSignUpForm>,
) -> ApiResult<ActionState> {
    blocking(state, move |state| actions::sign_up_with_email(state, &form))
        .await
        .map(Json)
}

async fn sign_up_with_phone(
    State(state): State<AppState>,
    Json(form): Json<PhoneSignUpForm>,
) -> ApiResult<ActionState> {
    blocking(state, move |state| actions::sign_up_with_phone(state, &form))
        .await
        .map(Json)
}

async fn add_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<AddCommentForm>,
) -> ApiResult<ActionState> {
    let claims = authenticate(&state, &headers)?;
    let form = AddCommentForm {
        user_id: Some(claims.uid),
        ..form
    };
    blocking(state, move |state| actions::add_comment(state, &form))
        .await
        .map(Json)
}

#[derive(Deserialize)]
struct AccountRequest {
    #[serde(default)]
    account: String,
}

async fn resolve_login_email(
    State(state): State<AppState>,
    Json(req): Json<AccountRequest>,
) -> ApiResult<ResolvedEmail> {
    blocking(state, move |state| {
        actions::resolve_login_email(state, &req.account)
    })
    .await
    .map(Json)
}

async fn sign_in(State(state): State<AppState>, Json(req): Json<SignIn>) -> ApiResult<SignedIn> {
    blocking(state, move |state| {
        actions::sign_in(state, &req.account, &req.password)
    })
    .await?
    .map(Json)
    .map_err(|message| error_body(StatusCode::UNAUTHORIZED, message))
}

async fn current_user(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<UserProfile> {
    let claims = authenticate(&state, &headers)?;
    let uid = claims.uid.clone();
    blocking(state, move |state| {
        get_as::<UserProfile>(state.store.as_ref(), USERS, &claims.uid)
    })
    .await?
    .map_err(internal)?
    .map(Json)
    .ok_or_else(|| error_body(StatusCode::NOT_FOUND, format!("user {uid} not found")))
}

#[derive(Deserialize)]
struct CategorizeRequest {
    report: String,
}

async fn categorize_report(
    State(state): State<AppState>,
    Json(req): Json<CategorizeRequest>,
) -> ApiResult<Categories> {
    let Some(config) = state.llm.as_ref() else {
        return Err(error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "categorization is not configured",
        ));
    };
    categorize(config, &req.report).await.map(Json).map_err(|err| {
        tracing::warn!(%err, "categorization failed");
        error_body(StatusCode::BAD_GATEWAY, err.to_string())
    })
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Page<Incident>> {
    blocking(state, move |state| queries::list_incidents(state, &query))
        .await?
        .map(Json)
        .map_err(internal)
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Incident> {
    let lookup = id.clone();
    blocking(state, move |state| queries::get_incident(state, &lookup))
        .await?
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, format!("incident {id} not found")))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Comment>> {
    blocking(state, move |state| queries::list_comments(state, &id))
        .await?
        .map(Json)
        .map_err(internal)
}

async fn company_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CompanyProfile> {
    let lookup = name.clone();
    blocking(state, move |state| queries::company_profile(state, &lookup))
        .await?
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, format!("company {name} not found")))
}

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

fn internal(err: StoreError) -> ApiError {
    tracing::error!(%err, "store read failed");
    error_body(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
