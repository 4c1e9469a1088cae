//! Form submission from the pages. Sign-in gating and client-side validation
//! happen here before anything reaches the bridge.

use crate::bridge::ActionBridge;
use crate::error::ClientError;
use crate::session::{Session, SessionContext};
use form_schema::messages::{SIGN_IN_REQUIRED_FOR_COMMENT, SIGN_IN_REQUIRED_FOR_REPORT};
use form_schema::{
    validate_comment, validate_report, validate_review, validate_sign_in, ActionState,
    AddCommentForm, ReportIncidentForm, RequestReviewForm, SignInForm,
};

pub fn submit_report(
    session: Option<&Session>,
    bridge: &dyn ActionBridge,
    form: &ReportIncidentForm,
) -> Result<ActionState, ClientError> {
    let session = session.ok_or(ClientError::SignInRequired(SIGN_IN_REQUIRED_FOR_REPORT))?;
    let form = ReportIncidentForm {
        user_id: Some(session.uid().to_string()),
        ..form.clone()
    };
    validate_report(&form).map_err(ClientError::Validation)?;
    Ok(bridge.report_incident(&session.id_token, &form))
}

pub fn submit_comment(
    session: Option<&Session>,
    bridge: &dyn ActionBridge,
    incident_id: &str,
    text: &str,
) -> Result<ActionState, ClientError> {
    let session = session.ok_or(ClientError::SignInRequired(SIGN_IN_REQUIRED_FOR_COMMENT))?;
    let form = AddCommentForm {
        incident_id: Some(incident_id.to_string()),
        comment: Some(text.to_string()),
        user_id: Some(session.uid().to_string()),
    };
    validate_comment(&form).map_err(ClientError::Validation)?;
    Ok(bridge.add_comment(&session.id_token, &form))
}

/// Review requests need no account.
pub fn submit_review(
    bridge: &dyn ActionBridge,
    form: &RequestReviewForm,
) -> Result<ActionState, ClientError> {
    validate_review(form).map_err(ClientError::Validation)?;
    Ok(bridge.request_review(form))
}

pub fn sign_in<'a>(
    ctx: &'a mut SessionContext,
    bridge: &dyn ActionBridge,
    form: &SignInForm,
) -> Result<&'a Session, ClientError> {
    let credentials = validate_sign_in(form).map_err(ClientError::Validation)?;
    ctx.sign_in(bridge, &credentials.account, &credentials.password)
}

/// Display label for a stored category value.
pub fn category_label(category: &str) -> &str {
    match category {
        "Environmental" => "环境",
        "Social" => "社会",
        "Governance" => "治理",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LocalBridge;
    use crate::tests::local_app;
    use form_schema::messages::{COMMENT_POSTED, REPORT_SUBMITTED, REVIEW_SUBMITTED};
    use form_schema::{EmailSignUpForm, PhoneSignUpForm};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use valueguard_core::actions::{ResolvedEmail, SignedIn};
    use valueguard_core::models::{comments_collection, Comment, UserProfile, INCIDENTS};
    use valueguard_core::store::list_as;

    #[derive(Default)]
    struct CountingBridge {
        calls: AtomicUsize,
    }

    impl CountingBridge {
        fn hit(&self) -> ActionState {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ActionState::new("ok")
        }
    }

    impl ActionBridge for CountingBridge {
        fn report_incident(&self, _: &str, _: &ReportIncidentForm) -> ActionState {
            self.hit()
        }
        fn request_review(&self, _: &RequestReviewForm) -> ActionState {
            self.hit()
        }
        fn sign_up_with_email(&self, _: &EmailSignUpForm) -> ActionState {
            self.hit()
        }
        fn sign_up_with_phone(&self, _: &PhoneSignUpForm) -> ActionState {
            self.hit()
        }
        fn add_comment(&self, _: &str, _: &AddCommentForm) -> ActionState {
            self.hit()
        }
        fn resolve_login_email(&self, _: &str) -> ResolvedEmail {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ResolvedEmail {
                email: None,
                error: None,
            }
        }
        fn sign_in(&self, _: &str, _: &str) -> Result<SignedIn, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("no".into())
        }
        fn sign_out(&self, _: &str) -> Result<(), String> {
            Ok(())
        }
    }

    fn session(uid: &str) -> Session {
        Session {
            profile: UserProfile {
                uid: uid.into(),
                email: None,
                display_name: Some("阿明".into()),
                photo_url: None,
                phone_number: None,
            },
            id_token: "token".into(),
        }
    }

    fn report() -> ReportIncidentForm {
        ReportIncidentForm {
            company_name: Some("环球集团".into()),
            title: Some("夜间偷排工业废水十余次".into()),
            description: Some("工".repeat(50)),
            categories: vec!["Environmental".into()],
            user_id: None,
        }
    }

    #[test]
    fn anonymous_submissions_never_reach_the_bridge() {
        let bridge = CountingBridge::default();
        let err = submit_report(None, &bridge, &report()).expect_err("gated");
        assert!(matches!(err, ClientError::SignInRequired(m) if m == SIGN_IN_REQUIRED_FOR_REPORT));
        let err = submit_comment(None, &bridge, "1", "同意").expect_err("gated");
        assert!(matches!(err, ClientError::SignInRequired(m) if m == SIGN_IN_REQUIRED_FOR_COMMENT));
        assert_eq!(bridge.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_forms_stop_client_side() {
        let bridge = CountingBridge::default();
        let me = session("u1");
        let short = ReportIncidentForm {
            title: Some("太短".into()),
            ..report()
        };
        match submit_report(Some(&me), &bridge, &short) {
            Err(ClientError::Validation(errors)) => assert!(errors.contains_key("title")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(matches!(
            submit_comment(Some(&me), &bridge, "1", ""),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            submit_review(&bridge, &RequestReviewForm::default()),
            Err(ClientError::Validation(_))
        ));
        assert_eq!(bridge.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn signed_in_submissions_carry_the_session_uid() {
        let bridge = LocalBridge::new(local_app("forms-submit"));
        bridge.sign_up_with_email(&EmailSignUpForm {
            email: Some("someone@example.com".into()),
            password: Some("secret1".into()),
            display_name: Some("阿明".into()),
        });
        let mut ctx = SessionContext::new(bridge.state().store.clone());
        let uid = sign_in(
            &mut ctx,
            &bridge,
            &SignInForm {
                account: Some("someone@example.com".into()),
                password: Some("secret1".into()),
                agree: true,
            },
        )
        .expect("sign in")
        .uid()
        .to_string();

        let forged = ReportIncidentForm {
            user_id: Some("someone-else".into()),
            ..report()
        };
        let state = submit_report(ctx.current(), &bridge, &forged).expect("report");
        assert_eq!(state.message, REPORT_SUBMITTED);

        let store = bridge.state().store.as_ref();
        let live: Vec<valueguard_core::models::Incident> =
            list_as(store, INCIDENTS).expect("incidents");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].user_id.as_deref(), Some(uid.as_str()));

        let state = submit_comment(ctx.current(), &bridge, &live[0].id, "支持曝光").expect("comment");
        assert_eq!(state.message, COMMENT_POSTED);
        let comments: Vec<Comment> =
            list_as(store, &comments_collection(&live[0].id)).expect("comments");
        assert_eq!(comments[0].user_id, uid);

        let review = RequestReviewForm {
            incident_id: Some(live[0].id.clone()),
            review: Some("请复核这家公司近三年的环保整改情况说明材料".into()),
        };
        assert_eq!(
            submit_review(&bridge, &review).expect("review").message,
            REVIEW_SUBMITTED
        );
    }

    #[test]
    fn sign_in_form_is_validated_first() {
        let bridge = CountingBridge::default();
        let mut ctx = SessionContext::new(local_app("forms-sign-in").store.clone());
        let form = SignInForm {
            account: Some("someone@example.com".into()),
            password: Some("secret1".into()),
            agree: false,
        };
        match sign_in(&mut ctx, &bridge, &form) {
            Err(ClientError::Validation(errors)) => assert!(errors.contains_key("agree")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(bridge.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn labels_known_categories() {
        assert_eq!(category_label("Environmental"), "环境");
        assert_eq!(category_label("Governance"), "治理");
        assert_eq!(category_label("Labour"), "Labour");
    }
}
