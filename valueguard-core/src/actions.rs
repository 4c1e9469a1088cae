//! Server actions. Each one re-validates its form, performs one side effect and
//! answers with an `ActionState`. Nothing here panics or propagates: every
//! failure becomes a message.

use crate::error::ActionError;
use crate::identity::{NewUser, UserUpdate};
use crate::models::{comments_collection, Comment, Incident, UserProfile, INCIDENTS, USERS};
use crate::phone::{avatar_url, default_display_name, login_email_for, normalize_phone};
use crate::queries::get_incident;
use crate::state::AppState;
use crate::store::{get_as, put};
use form_schema::messages::*;
use form_schema::{
    validate_comment, validate_email_sign_up, validate_phone_sign_up, validate_report,
    validate_review, ActionState, AddCommentForm, CommentSubmission, EmailSignUp,
    EmailSignUpForm, PhoneSignUp, PhoneSignUpForm, ReportIncidentForm, ReportSubmission,
    RequestReviewForm,
};
use serde::{Deserialize, Serialize};

pub fn report_incident(state: &AppState, form: &ReportIncidentForm) -> ActionState {
    let submission = match validate_report(form) {
        Ok(submission) => submission,
        Err(errors) => return ActionState::with_errors(REPORT_INVALID, errors),
    };

    match write_incident(state, &submission) {
        Ok(incident) => {
            tracing::info!(
                incident_id = %incident.id,
                user_id = %submission.user_id,
                company = %incident.company_name,
                "incident reported"
            );
            ActionState::new(REPORT_SUBMITTED)
        }
        Err(err) => {
            tracing::error!(user_id = %submission.user_id, %err, "reporting incident failed");
            ActionState::new(REPORT_FAILED)
        }
    }
}

fn write_incident(state: &AppState, submission: &ReportSubmission) -> Result<Incident, ActionError> {
    let author = load_profile(state, &submission.user_id)?;
    let store = state.store.as_ref();

    let incident = Incident {
        id: store.new_id(),
        company_id: state
            .catalog
            .company_named(&submission.company_name)
            .map(|c| c.id.clone()),
        company_name: submission.company_name.clone(),
        title: submission.title.clone(),
        description: submission.description.clone(),
        date: store.server_time(),
        categories: submission.categories.clone(),
        user_id: Some(submission.user_id.clone()),
        author: Some(author.snapshot()),
    };
    put(store, INCIDENTS, &incident.id, &incident)?;
    Ok(incident)
}

/// Validated and logged; review requests are not stored.
pub fn request_review(state: &AppState, form: &RequestReviewForm) -> ActionState {
    let review = match validate_review(form) {
        Ok(review) => review,
        Err(errors) => return ActionState::with_errors(REPORT_INVALID, errors),
    };

    match get_incident(state, &review.incident_id) {
        Ok(Some(_)) => {
            tracing::info!(incident_id = %review.incident_id, review = %review.review, "review requested");
            ActionState::new(REVIEW_SUBMITTED)
        }
        Ok(None) => {
            let errors = [("incidentId".to_string(), vec![INCIDENT_NOT_FOUND.to_string()])];
            ActionState::with_errors(REPORT_INVALID, errors.into_iter().collect())
        }
        Err(err) => {
            tracing::error!(incident_id = %review.incident_id, %err, "review lookup failed");
            ActionState::new(REPORT_FAILED)
        }
    }
}

pub fn sign_up_with_email(state: &AppState, form: &EmailSignUpForm) -> ActionState {
    let sign_up = match validate_email_sign_up(form) {
        Ok(sign_up) => sign_up,
        Err(errors) => return ActionState::with_errors(SIGN_UP_INVALID, errors),
    };

    match register_email_account(state, sign_up) {
        Ok(uid) => {
            tracing::info!(%uid, "email sign-up");
            ActionState::new(SIGN_UP_SUCCEEDED)
        }
        Err(err) => {
            tracing::warn!(%err, "email sign-up failed");
            ActionState::new(sign_up_failed(&err.to_string()))
        }
    }
}

fn register_email_account(state: &AppState, sign_up: EmailSignUp) -> Result<String, ActionError> {
    let record = state.identity.create_user(NewUser {
        email: sign_up.email,
        password: sign_up.password,
        display_name: sign_up.display_name,
    })?;

    let profile = UserProfile {
        uid: record.uid.clone(),
        email: record.email,
        display_name: Some(record.display_name.unwrap_or_default()),
        photo_url: Some(record.photo_url.unwrap_or_else(|| avatar_url(&record.uid))),
        phone_number: None,
    };
    put(state.store.as_ref(), USERS, &profile.uid, &profile)?;
    Ok(record.uid)
}

pub fn sign_up_with_phone(state: &AppState, form: &PhoneSignUpForm) -> ActionState {
    let sign_up = match validate_phone_sign_up(form) {
        Ok(sign_up) => sign_up,
        Err(errors) => return ActionState::with_errors(SIGN_UP_INVALID, errors),
    };

    match register_phone_account(state, &sign_up) {
        Ok(uid) => {
            tracing::info!(%uid, "phone sign-up");
            ActionState::new(SIGN_UP_SUCCEEDED)
        }
        Err(ActionError::PhoneNotVerified) => {
            tracing::warn!("phone sign-up token does not match the submitted number");
            ActionState::new(PHONE_VERIFICATION_FAILED)
        }
        Err(err) => {
            tracing::warn!(%err, "phone sign-up failed");
            ActionState::new(sign_up_failed(&err.to_string()))
        }
    }
}

fn register_phone_account(state: &AppState, sign_up: &PhoneSignUp) -> Result<String, ActionError> {
    let claims = state.identity.verify_id_token(&sign_up.id_token)?;
    let token_phone = claims
        .phone_number
        .as_deref()
        .map(normalize_phone)
        .ok_or(ActionError::PhoneNotVerified)?;
    let phone = normalize_phone(&sign_up.phone_number);
    if token_phone != phone {
        return Err(ActionError::PhoneNotVerified);
    }

    let record = state.identity.update_user(
        &claims.uid,
        UserUpdate {
            phone_number: Some(phone.clone()),
            email: Some(
                sign_up
                    .email
                    .clone()
                    .unwrap_or_else(|| login_email_for(&phone)),
            ),
            password: Some(sign_up.password.clone()),
            display_name: Some(
                sign_up
                    .display_name
                    .clone()
                    .unwrap_or_else(|| default_display_name(&phone)),
            ),
        },
    )?;

    let profile = UserProfile {
        uid: record.uid.clone(),
        email: record.email,
        display_name: Some(record.display_name.unwrap_or_default()),
        photo_url: Some(record.photo_url.unwrap_or_else(|| avatar_url(&record.uid))),
        phone_number: Some(phone),
    };
    put(state.store.as_ref(), USERS, &profile.uid, &profile)?;
    Ok(record.uid)
}

pub fn add_comment(state: &AppState, form: &AddCommentForm) -> ActionState {
    let submission = match validate_comment(form) {
        Ok(submission) => submission,
        Err(errors) => return ActionState::with_errors(COMMENT_INVALID, errors),
    };

    match write_comment(state, &submission) {
        Ok(comment) => {
            tracing::info!(
                comment_id = %comment.id,
                incident_id = %comment.incident_id,
                user_id = %comment.user_id,
                "comment posted"
            );
            ActionState::new(COMMENT_POSTED)
        }
        Err(err) => {
            tracing::warn!(incident_id = %submission.incident_id, %err, "comment failed");
            ActionState::new(comment_failed(&err.to_string()))
        }
    }
}

fn write_comment(state: &AppState, submission: &CommentSubmission) -> Result<Comment, ActionError> {
    if get_incident(state, &submission.incident_id)?.is_none() {
        return Err(ActionError::IncidentNotFound);
    }
    let author = load_profile(state, &submission.user_id)?;
    let store = state.store.as_ref();

    let comment = Comment {
        id: store.new_id(),
        text: submission.text.clone(),
        user_id: submission.user_id.clone(),
        incident_id: submission.incident_id.clone(),
        created_at: store.server_time(),
        author: author.snapshot(),
    };
    put(
        store,
        &comments_collection(&submission.incident_id),
        &comment.id,
        &comment,
    )?;
    Ok(comment)
}

fn load_profile(state: &AppState, uid: &str) -> Result<UserProfile, ActionError> {
    get_as::<UserProfile>(state.store.as_ref(), USERS, uid)?.ok_or(ActionError::UserNotFound)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEmail {
    pub email: Option<String>,
    pub error: Option<String>,
}

impl ResolvedEmail {
    fn found(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            error: None,
        }
    }

    fn failed(message: &str) -> Self {
        Self {
            email: None,
            error: Some(message.to_string()),
        }
    }
}

/// Maps a free-text account (email or phone) to the email used for sign-in.
pub fn resolve_login_email(state: &AppState, account: &str) -> ResolvedEmail {
    let input = account.trim();
    if input.is_empty() {
        return ResolvedEmail::failed(ACCOUNT_REQUIRED);
    }
    if input.contains('@') {
        return ResolvedEmail::found(input);
    }

    let phone = normalize_phone(input);
    let hits = match state.store.find_eq(USERS, "phoneNumber", &phone, 1) {
        Ok(hits) => hits,
        Err(err) => {
            tracing::error!(%err, "phone lookup failed");
            return ResolvedEmail::failed(&account_lookup_failed(&err.to_string()));
        }
    };
    let Some(doc) = hits.into_iter().next() else {
        return ResolvedEmail::failed(PHONE_ACCOUNT_NOT_FOUND);
    };

    match doc
        .data
        .get("email")
        .and_then(serde_json::Value::as_str)
        .filter(|e| !e.is_empty())
    {
        Some(email) => ResolvedEmail::found(email),
        None => ResolvedEmail::failed(ACCOUNT_MISSING_EMAIL),
    }
}

/// A signed-in user: profile plus the ID token later calls present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub profile: UserProfile,
    pub id_token: String,
}

pub fn sign_in(state: &AppState, account: &str, password: &str) -> Result<SignedIn, String> {
    let resolved = resolve_login_email(state, account);
    let email = match (resolved.email, resolved.error) {
        (Some(email), _) => email,
        (None, error) => return Err(error.unwrap_or_else(|| ACCOUNT_REQUIRED.to_string())),
    };

    let session = state
        .identity
        .sign_in_with_email_password(&email, password)
        .map_err(|e| e.to_string())?;

    let profile = get_as::<UserProfile>(state.store.as_ref(), USERS, &session.user.uid)
        .map_err(|e| e.to_string())?
        .unwrap_or_else(|| UserProfile {
            uid: session.user.uid.clone(),
            email: session.user.email.clone(),
            display_name: session.user.display_name.clone(),
            photo_url: session.user.photo_url.clone(),
            phone_number: session.user.phone_number.clone(),
        });

    tracing::info!(uid = %profile.uid, "signed in");
    Ok(SignedIn {
        profile,
        id_token: session.id_token,
    })
}
