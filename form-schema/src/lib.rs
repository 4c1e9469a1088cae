//! Form schemas shared by the client-side flows and the server actions.
//!
//! Every user-submitted form has a candidate type (everything optional, as it
//! arrives off the wire) and a validated type produced by its `validate_*`
//! function. The server re-runs the same function the client ran, so the two
//! sides can never disagree about a constraint.

pub mod messages;

use messages::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Field name to the messages raised against it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// The `{message, errors}` reply every server action returns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    pub message: String,
    pub errors: Option<FieldErrors>,
}

impl ActionState {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: None,
        }
    }

    pub fn with_errors(message: impl Into<String>, errors: FieldErrors) -> Self {
        Self {
            message: message.into(),
            errors: Some(errors),
        }
    }

    pub fn has_field_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}

static PHONE_PATTERN: OnceLock<Regex> = OnceLock::new();
static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("built-in pattern is valid"))
}

/// `+` optional, then 6 to 15 ASCII digits.
pub fn is_phone_number(value: &str) -> bool {
    pattern(&PHONE_PATTERN, r"^\+?[0-9]{6,15}$").is_match(value)
}

pub fn is_email(value: &str) -> bool {
    pattern(&EMAIL_PATTERN, r"^[^\s@]+@[^\s@]+\.[^\s@]+$").is_match(value)
}

#[derive(Default)]
struct Checks {
    errors: FieldErrors,
}

impl Checks {
    fn push(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> &'a str {
        match value {
            Some(v) if !v.is_empty() => v,
            _ => {
                self.push(field, FIELD_REQUIRED);
                ""
            }
        }
    }

    fn min_chars<'a>(
        &mut self,
        field: &str,
        value: Option<&'a str>,
        min: usize,
        message: &str,
    ) -> &'a str {
        let value = value.unwrap_or_default();
        if value.chars().count() < min {
            self.push(field, message);
        }
        value
    }

    fn email<'a>(&mut self, field: &str, value: Option<&'a str>) -> &'a str {
        let value = value.unwrap_or_default();
        if !is_email(value) {
            self.push(field, EMAIL_INVALID);
        }
        value
    }

    fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Blank strings count as absent for optional fields.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// ── report incident ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportIncidentForm {
    pub company_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportSubmission {
    pub company_name: String,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub user_id: String,
}

pub fn validate_report(form: &ReportIncidentForm) -> Result<ReportSubmission, FieldErrors> {
    let mut checks = Checks::default();
    let company_name = checks.min_chars(
        "companyName",
        form.company_name.as_deref(),
        2,
        COMPANY_NAME_TOO_SHORT,
    );
    let title = checks.min_chars("title", form.title.as_deref(), 10, TITLE_TOO_SHORT);
    let description = checks.min_chars(
        "description",
        form.description.as_deref(),
        50,
        DESCRIPTION_TOO_SHORT,
    );
    if form.categories.is_empty() {
        checks.push("categories", CATEGORIES_REQUIRED);
    }
    let user_id = checks.required("userId", form.user_id.as_deref());
    checks.finish()?;

    Ok(ReportSubmission {
        company_name: company_name.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        categories: form.categories.clone(),
        user_id: user_id.to_string(),
    })
}

// ── request review ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestReviewForm {
    pub incident_id: Option<String>,
    pub review: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    pub incident_id: String,
    pub review: String,
}

pub fn validate_review(form: &RequestReviewForm) -> Result<ReviewSubmission, FieldErrors> {
    let mut checks = Checks::default();
    let incident_id = checks.required("incidentId", form.incident_id.as_deref());
    let review = checks.min_chars("review", form.review.as_deref(), 20, REVIEW_TOO_SHORT);
    checks.finish()?;

    Ok(ReviewSubmission {
        incident_id: incident_id.to_string(),
        review: review.to_string(),
    })
}

// ── sign up ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailSignUpForm {
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailSignUp {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

pub fn validate_email_sign_up(form: &EmailSignUpForm) -> Result<EmailSignUp, FieldErrors> {
    let mut checks = Checks::default();
    let email = checks.email("email", form.email.as_deref());
    let password = checks.min_chars("password", form.password.as_deref(), 6, PASSWORD_TOO_SHORT);
    let display_name = present(form.display_name.as_deref())
        .map(|name| checks.min_chars("displayName", Some(name), 2, DISPLAY_NAME_TOO_SHORT));
    checks.finish()?;

    Ok(EmailSignUp {
        email: email.to_string(),
        password: password.to_string(),
        display_name: display_name.map(ToString::to_string),
    })
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneSignUpForm {
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub id_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhoneSignUp {
    pub phone_number: String,
    pub password: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub id_token: String,
}

pub fn validate_phone_sign_up(form: &PhoneSignUpForm) -> Result<PhoneSignUp, FieldErrors> {
    let mut checks = Checks::default();
    let phone_number =
        checks.min_chars("phoneNumber", form.phone_number.as_deref(), 6, PHONE_INVALID);
    let password = checks.min_chars("password", form.password.as_deref(), 6, PASSWORD_TOO_SHORT);
    let email = present(form.email.as_deref()).map(|email| checks.email("email", Some(email)));
    let display_name = present(form.display_name.as_deref())
        .map(|name| checks.min_chars("displayName", Some(name), 2, DISPLAY_NAME_TOO_SHORT));
    let id_token = match form.id_token.as_deref() {
        Some(token) if !token.is_empty() => token,
        _ => {
            checks.push("idToken", SMS_NOT_VERIFIED);
            ""
        }
    };
    checks.finish()?;

    Ok(PhoneSignUp {
        phone_number: phone_number.to_string(),
        password: password.to_string(),
        email: email.map(ToString::to_string),
        display_name: display_name.map(ToString::to_string),
        id_token: id_token.to_string(),
    })
}

/// What the sign-up screen holds before the SMS code is verified.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneSignUpDraft {
    pub phone_number: String,
    pub sms_code: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
}

pub fn validate_phone_sign_up_draft(draft: &PhoneSignUpDraft) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    let phone = draft.phone_number.trim();
    if phone.is_empty() {
        checks.push("phoneNumber", PHONE_REQUIRED);
    } else if !is_phone_number(phone) {
        checks.push("phoneNumber", PHONE_INVALID);
    }
    if let Some(email) = present(Some(draft.email.as_str())) {
        checks.email("email", Some(email));
    }
    if draft.sms_code.trim().is_empty() {
        checks.push("smsCode", SMS_CODE_REQUIRED);
    }
    checks.min_chars("password", Some(draft.password.as_str()), 6, PASSWORD_TOO_SHORT);
    checks.finish()
}

// ── sign in ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignInForm {
    pub account: Option<String>,
    pub password: Option<String>,
    pub agree: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignIn {
    pub account: String,
    pub password: String,
}

pub fn validate_sign_in(form: &SignInForm) -> Result<SignIn, FieldErrors> {
    let mut checks = Checks::default();
    let account = form.account.as_deref().unwrap_or_default().trim();
    if account.is_empty() {
        checks.push("account", ACCOUNT_REQUIRED);
    } else if !is_phone_number(account) && !is_email(account) {
        checks.push("account", ACCOUNT_INVALID);
    }
    if !form.agree {
        checks.push("agree", AGREE_REQUIRED);
    }
    let password = checks.min_chars("password", form.password.as_deref(), 6, PASSWORD_TOO_SHORT);
    checks.finish()?;

    Ok(SignIn {
        account: account.to_string(),
        password: password.to_string(),
    })
}

// ── comment ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddCommentForm {
    pub incident_id: Option<String>,
    pub comment: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentSubmission {
    pub incident_id: String,
    pub text: String,
    pub user_id: String,
}

pub fn validate_comment(form: &AddCommentForm) -> Result<CommentSubmission, FieldErrors> {
    let mut checks = Checks::default();
    let incident_id = checks.required("incidentId", form.incident_id.as_deref());
    let text = checks.min_chars("comment", form.comment.as_deref(), 1, COMMENT_REQUIRED);
    let user_id = checks.required("userId", form.user_id.as_deref());
    checks.finish()?;

    Ok(CommentSubmission {
        incident_id: incident_id.to_string(),
        text: text.to_string(),
        user_id: user_id.to_string(),
    })
}
