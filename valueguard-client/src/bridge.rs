use form_schema::messages::SIGN_IN_REQUIRED;
use form_schema::{
    ActionState, AddCommentForm, EmailSignUpForm, PhoneSignUpForm, ReportIncidentForm,
    RequestReviewForm,
};
use valueguard_core::actions::{self, ResolvedEmail, SignedIn};
use valueguard_core::state::AppState;

/// The client's view of the server actions. Writes on behalf of a user carry
/// that user's ID token; the author is taken from the token, not the form.
pub trait ActionBridge: Send + Sync {
    fn report_incident(&self, id_token: &str, form: &ReportIncidentForm) -> ActionState;
    fn request_review(&self, form: &RequestReviewForm) -> ActionState;
    fn sign_up_with_email(&self, form: &EmailSignUpForm) -> ActionState;
    fn sign_up_with_phone(&self, form: &PhoneSignUpForm) -> ActionState;
    fn add_comment(&self, id_token: &str, form: &AddCommentForm) -> ActionState;
    fn resolve_login_email(&self, account: &str) -> ResolvedEmail;
    fn sign_in(&self, account: &str, password: &str) -> Result<SignedIn, String>;
    fn sign_out(&self, id_token: &str) -> Result<(), String>;
}

/// Runs the actions in-process against a local `AppState`.
#[derive(Clone)]
pub struct LocalBridge {
    state: AppState,
}

impl LocalBridge {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn token_uid(&self, id_token: &str) -> Option<String> {
        match self.state.identity.verify_id_token(id_token) {
            Ok(claims) => Some(claims.uid),
            Err(err) => {
                tracing::warn!(%err, "rejected id token");
                None
            }
        }
    }
}

impl ActionBridge for LocalBridge {
    fn report_incident(&self, id_token: &str, form: &ReportIncidentForm) -> ActionState {
        let Some(uid) = self.token_uid(id_token) else {
            return ActionState::new(SIGN_IN_REQUIRED);
        };
        let form = ReportIncidentForm {
            user_id: Some(uid),
            ..form.clone()
        };
        actions::report_incident(&self.state, &form)
    }

    fn request_review(&self, form: &RequestReviewForm) -> ActionState {
        actions::request_review(&self.state, form)
    }

    fn sign_up_with_email(&self, form: &EmailSignUpForm) -> ActionState {
        actions::sign_up_with_email(&self.state, form)
    }

    fn sign_up_with_phone(&self, form: &PhoneSignUpForm) -> ActionState {
        actions::sign_up_with_phone(&self.state, form)
    }

    fn add_comment(&self, id_token: &str, form: &AddCommentForm) -> ActionState {
        let Some(uid) = self.token_uid(id_token) else {
            return ActionState::new(SIGN_IN_REQUIRED);
        };
        let form = AddCommentForm {
            user_id: Some(uid),
            ..form.clone()
        };
        actions::add_comment(&self.state, &form)
    }

    fn resolve_login_email(&self, account: &str) -> ResolvedEmail {
        actions::resolve_login_email(&self.state, account)
    }

    fn sign_in(&self, account: &str, password: &str) -> Result<SignedIn, String> {
        actions::sign_in(&self.state, account, password)
    }

    fn sign_out(&self, id_token: &str) -> Result<(), String> {
        self.state
            .identity
            .sign_out(id_token)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::local_app;
    use valueguard_core::models::INCIDENTS;

    fn report(user_id: &str) -> ReportIncidentForm {
        ReportIncidentForm {
            company_name: Some("环球集团".into()),
            title: Some("夜间偷排工业废水十余次".into()),
            description: Some("工".repeat(50)),
            categories: vec!["Environmental".into()],
            user_id: Some(user_id.into()),
        }
    }

    #[test]
    fn writes_need_a_token_the_identity_service_issued() {
        let bridge = LocalBridge::new(local_app("bridge-token"));
        let state = bridge.report_incident("not-a-token", &report("u1"));
        assert_eq!(state.message, SIGN_IN_REQUIRED);

        let state = bridge.add_comment(
            "not-a-token",
            &AddCommentForm {
                incident_id: Some("1".into()),
                comment: Some("同意".into()),
                user_id: Some("u1".into()),
            },
        );
        assert_eq!(state.message, SIGN_IN_REQUIRED);
        assert!(bridge
            .state()
            .store
            .list(INCIDENTS)
            .expect("list")
            .is_empty());
    }
}
