//! Two-step phone sign-up: SMS verification first, account creation second.
//!
//! ```text
//! idle -> captcha_ready -> code_sent -> code_verifying -> verified
//!      -> submitting -> done | failed
//! ```
//!
//! A successful verification yields a [`VerifiedPhone`]. Nothing else can
//! build one, so `submit` cannot run on an unverified number.

use crate::bridge::ActionBridge;
use crate::error::ClientError;
use form_schema::messages::*;
use form_schema::{
    is_phone_number, validate_phone_sign_up_draft, ActionState, FieldErrors, PhoneSignUpDraft,
    PhoneSignUpForm,
};
use std::sync::Arc;
use valueguard_core::identity::{CaptchaToken, ConfirmationHandle, IdentityService};
use valueguard_core::phone::normalize_phone;

/// Sends and confirms SMS codes. Confirming yields an ID token.
pub trait PhoneAuthClient: Send + Sync {
    fn send_code(
        &self,
        phone_number: &str,
        captcha: &CaptchaToken,
    ) -> Result<ConfirmationHandle, ClientError>;
    fn confirm(&self, handle: &ConfirmationHandle, code: &str) -> Result<String, ClientError>;
}

pub struct IdentityPhoneAuth {
    identity: Arc<dyn IdentityService>,
}

impl IdentityPhoneAuth {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self { identity }
    }
}

impl PhoneAuthClient for IdentityPhoneAuth {
    fn send_code(
        &self,
        phone_number: &str,
        captcha: &CaptchaToken,
    ) -> Result<ConfirmationHandle, ClientError> {
        Ok(self.identity.sign_in_with_phone(phone_number, captcha)?)
    }

    fn confirm(&self, handle: &ConfirmationHandle, code: &str) -> Result<String, ClientError> {
        Ok(self.identity.confirm(handle, code)?.id_token)
    }
}

/// A rendered visual challenge.
pub trait Captcha: Send {
    fn solve(&mut self) -> Result<CaptchaToken, ClientError>;
}

pub trait CaptchaProvider: Send + Sync {
    fn render(&self) -> Result<Box<dyn Captcha>, ClientError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    SignIn,
    SignUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignUpPhase {
    Idle,
    CaptchaReady,
    CodeSent,
    CodeVerifying,
    Verified,
    Submitting,
    Done,
    Failed,
}

impl SignUpPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CaptchaReady => "captcha_ready",
            Self::CodeSent => "code_sent",
            Self::CodeVerifying => "code_verifying",
            Self::Verified => "verified",
            Self::Submitting => "submitting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Proof that `phone_number` completed SMS verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedPhone {
    phone_number: String,
    id_token: String,
}

impl VerifiedPhone {
    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn id_token(&self) -> &str {
        &self.id_token
    }
}

pub struct PhoneSignUpFlow {
    auth: Arc<dyn PhoneAuthClient>,
    captchas: Arc<dyn CaptchaProvider>,
    captcha: Option<Box<dyn Captcha>>,
    mode: AuthMode,
    phase: SignUpPhase,
    pending: Option<(String, ConfirmationHandle)>,
    verified: Option<VerifiedPhone>,
    errors: FieldErrors,
    message: Option<String>,
}

impl PhoneSignUpFlow {
    pub fn new(auth: Arc<dyn PhoneAuthClient>, captchas: Arc<dyn CaptchaProvider>) -> Self {
        Self {
            auth,
            captchas,
            captcha: None,
            mode: AuthMode::SignIn,
            phase: SignUpPhase::Idle,
            pending: None,
            verified: None,
            errors: FieldErrors::new(),
            message: None,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn phase(&self) -> SignUpPhase {
        self.phase
    }

    pub fn verified(&self) -> Option<&VerifiedPhone> {
        self.verified.as_ref()
    }

    pub fn has_pending_code(&self) -> bool {
        self.pending.is_some()
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Switches to sign-up and renders the challenge unless one already exists.
    pub fn enter_sign_up(&mut self) -> Result<(), ClientError> {
        self.mode = AuthMode::SignUp;
        if self.captcha.is_none() {
            match self.captchas.render() {
                Ok(captcha) => self.captcha = Some(captcha),
                Err(err) => {
                    tracing::warn!(%err, "captcha render failed");
                    self.message = Some(CAPTCHA_UNAVAILABLE.to_string());
                    self.phase = SignUpPhase::Idle;
                    return Err(err);
                }
            }
        }
        if self.phase == SignUpPhase::Idle {
            self.phase = SignUpPhase::CaptchaReady;
        }
        Ok(())
    }

    pub fn leave_sign_up(&mut self) {
        self.reset();
        self.mode = AuthMode::SignIn;
        self.phase = SignUpPhase::Idle;
    }

    /// A malformed number leaves any code already sent usable.
    pub fn send_code(&mut self, phone_number: &str) -> Result<(), ClientError> {
        if !matches!(self.phase, SignUpPhase::CaptchaReady | SignUpPhase::CodeSent) {
            return Err(self.invalid_phase());
        }
        self.errors.clear();
        self.message = None;

        let phone = phone_number.trim();
        let problem = if phone.is_empty() {
            Some(PHONE_REQUIRED)
        } else if !is_phone_number(phone) {
            Some(PHONE_INVALID)
        } else {
            None
        };
        if let Some(problem) = problem {
            return Err(self.field_error("phoneNumber", problem));
        }

        let sent = self
            .captcha
            .as_mut()
            .ok_or_else(|| ClientError::Rejected(CAPTCHA_UNAVAILABLE.to_string()))
            .and_then(|captcha| captcha.solve())
            .and_then(|token| self.auth.send_code(phone, &token));

        match sent {
            Ok(handle) => {
                self.pending = Some((normalize_phone(phone), handle));
                self.verified = None;
                self.phase = SignUpPhase::CodeSent;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "sending sms code failed");
                self.pending = None;
                self.phase = SignUpPhase::CaptchaReady;
                self.message = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn verify_code(&mut self, code: &str) -> Result<&VerifiedPhone, ClientError> {
        match self.phase {
            SignUpPhase::CodeSent | SignUpPhase::Idle | SignUpPhase::CaptchaReady => {}
            _ => return Err(self.invalid_phase()),
        }
        self.errors.clear();
        self.message = None;

        let Some((phone, handle)) = self.pending.clone() else {
            self.message = Some(CODE_NOT_REQUESTED.to_string());
            return Err(ClientError::Rejected(CODE_NOT_REQUESTED.to_string()));
        };
        let code = code.trim();
        if code.is_empty() {
            return Err(self.field_error("smsCode", SMS_CODE_REQUIRED));
        }

        self.phase = SignUpPhase::CodeVerifying;
        match self.auth.confirm(&handle, code) {
            Ok(id_token) => {
                self.phase = SignUpPhase::Verified;
                self.pending = None;
                let verified = self.verified.insert(VerifiedPhone {
                    phone_number: phone,
                    id_token,
                });
                Ok(&*verified)
            }
            Err(err) => {
                tracing::debug!(%err, "sms code rejected");
                self.phase = SignUpPhase::CodeSent;
                self.message = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Hands the verified number and the form to the sign-up action.
    pub fn submit(
        &mut self,
        bridge: &dyn ActionBridge,
        draft: &PhoneSignUpDraft,
    ) -> Result<ActionState, ClientError> {
        let verified = match (self.phase, self.verified.as_ref()) {
            (SignUpPhase::Verified | SignUpPhase::Failed, Some(verified)) => verified.clone(),
            _ => return Err(self.invalid_phase()),
        };
        if let Err(errors) = validate_phone_sign_up_draft(draft) {
            self.errors = errors.clone();
            return Err(ClientError::Validation(errors));
        }
        self.errors.clear();

        self.phase = SignUpPhase::Submitting;
        let result = bridge.sign_up_with_phone(&PhoneSignUpForm {
            phone_number: Some(verified.phone_number.clone()),
            password: Some(draft.password.clone()),
            email: Some(draft.email.clone()),
            display_name: Some(draft.display_name.clone()),
            id_token: Some(verified.id_token),
        });

        if result.message == SIGN_UP_SUCCEEDED && !result.has_field_errors() {
            self.reset();
            self.phase = SignUpPhase::Done;
            self.mode = AuthMode::SignIn;
        } else {
            self.phase = SignUpPhase::Failed;
            self.errors = result.errors.clone().unwrap_or_default();
            self.message = Some(result.message.clone());
        }
        Ok(result)
    }

    fn reset(&mut self) {
        self.pending = None;
        self.verified = None;
        self.errors.clear();
        self.message = None;
    }

    fn field_error(&mut self, field: &str, message: &str) -> ClientError {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
        ClientError::Validation(self.errors.clone())
    }

    fn invalid_phase(&self) -> ClientError {
        ClientError::InvalidPhase {
            phase: self.phase.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LocalBridge;
    use crate::tests::{local_app_with_sms, CaptureSms};
    use form_schema::{AddCommentForm, EmailSignUpForm, ReportIncidentForm, RequestReviewForm};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use valueguard_core::actions::{ResolvedEmail, SignedIn};
    use valueguard_core::models::{UserProfile, USERS};
    use valueguard_core::store::get_as;

    struct FixedCaptcha;

    impl Captcha for FixedCaptcha {
        fn solve(&mut self) -> Result<CaptchaToken, ClientError> {
            Ok(CaptchaToken::new("solved"))
        }
    }

    #[derive(Default)]
    struct CountingCaptchas {
        rendered: AtomicUsize,
    }

    impl CaptchaProvider for CountingCaptchas {
        fn render(&self) -> Result<Box<dyn Captcha>, ClientError> {
            self.rendered.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedCaptcha))
        }
    }

    /// Accepts code "123456" and answers with a token naming the phone.
    #[derive(Default)]
    struct FakeAuth {
        sent: Mutex<Vec<String>>,
    }

    impl PhoneAuthClient for FakeAuth {
        fn send_code(
            &self,
            phone_number: &str,
            _captcha: &CaptchaToken,
        ) -> Result<ConfirmationHandle, ClientError> {
            if let Ok(mut guard) = self.sent.lock() {
                guard.push(phone_number.to_string());
            }
            Ok(ConfirmationHandle::new(format!("v-{phone_number}")))
        }

        fn confirm(&self, handle: &ConfirmationHandle, code: &str) -> Result<String, ClientError> {
            if code == "123456" {
                Ok(format!("token-for-{}", handle.verification_id()))
            } else {
                Err(ClientError::Rejected("验证码错误".into()))
            }
        }
    }

    /// Records sign-up calls and answers with a fixed reply.
    struct RecordingBridge {
        reply: ActionState,
        calls: Mutex<Vec<PhoneSignUpForm>>,
    }

    impl RecordingBridge {
        fn answering(message: &str) -> Self {
            Self {
                reply: ActionState::new(message),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().map(|c| c.len()).unwrap_or(0)
        }
    }

    impl ActionBridge for RecordingBridge {
        fn report_incident(&self, _id_token: &str, _form: &ReportIncidentForm) -> ActionState {
            unreachable!("not used by the sign-up flow")
        }
        fn request_review(&self, _form: &RequestReviewForm) -> ActionState {
            unreachable!("not used by the sign-up flow")
        }
        fn sign_up_with_email(&self, _form: &EmailSignUpForm) -> ActionState {
            unreachable!("not used by the sign-up flow")
        }
        fn sign_up_with_phone(&self, form: &PhoneSignUpForm) -> ActionState {
            if let Ok(mut guard) = self.calls.lock() {
                guard.push(form.clone());
            }
            self.reply.clone()
        }
        fn add_comment(&self, _id_token: &str, _form: &AddCommentForm) -> ActionState {
            unreachable!("not used by the sign-up flow")
        }
        fn resolve_login_email(&self, _account: &str) -> ResolvedEmail {
            ResolvedEmail::default()
        }
        fn sign_in(&self, _account: &str, _password: &str) -> Result<SignedIn, String> {
            Err("not used".into())
        }
        fn sign_out(&self, _id_token: &str) -> Result<(), String> {
            Ok(())
        }
    }

    fn flow() -> (PhoneSignUpFlow, Arc<CountingCaptchas>) {
        let captchas = Arc::new(CountingCaptchas::default());
        (
            PhoneSignUpFlow::new(Arc::new(FakeAuth::default()), captchas.clone()),
            captchas,
        )
    }

    fn draft(phone: &str) -> PhoneSignUpDraft {
        PhoneSignUpDraft {
            phone_number: phone.into(),
            sms_code: "123456".into(),
            password: "secret1".into(),
            ..PhoneSignUpDraft::default()
        }
    }

    #[test]
    fn captcha_is_rendered_once() {
        let (mut flow, captchas) = flow();
        flow.enter_sign_up().expect("enter");
        flow.enter_sign_up().expect("enter again");
        flow.leave_sign_up();
        flow.enter_sign_up().expect("re-enter");
        assert_eq!(captchas.rendered.load(Ordering::SeqCst), 1);
        assert_eq!(flow.phase(), SignUpPhase::CaptchaReady);
        assert_eq!(flow.mode(), AuthMode::SignUp);
    }

    #[test]
    fn bad_phone_stays_captcha_ready() {
        let (mut flow, _) = flow();
        flow.enter_sign_up().expect("enter");
        assert!(matches!(
            flow.send_code("138-1234"),
            Err(ClientError::Validation(_))
        ));
        assert_eq!(flow.phase(), SignUpPhase::CaptchaReady);
        assert_eq!(flow.field_errors()["phoneNumber"], vec![PHONE_INVALID.to_string()]);
        assert!(!flow.has_pending_code());
    }

    #[test]
    fn wrong_code_stays_code_sent() {
        let (mut flow, _) = flow();
        flow.enter_sign_up().expect("enter");
        flow.send_code(" +8613812345678 ").expect("send");
        assert_eq!(flow.phase(), SignUpPhase::CodeSent);

        assert!(flow.verify_code("000000").is_err());
        assert_eq!(flow.phase(), SignUpPhase::CodeSent);
        assert!(flow.verified().is_none());

        assert!(matches!(flow.verify_code(" "), Err(ClientError::Validation(_))));

        let verified = flow.verify_code("123456").expect("verify");
        assert_eq!(verified.phone_number(), "+8613812345678");
        assert_eq!(flow.phase(), SignUpPhase::Verified);
    }

    #[test]
    fn verified_code_cannot_be_confirmed_twice() {
        let (mut flow, _) = flow();
        flow.enter_sign_up().expect("enter");
        flow.send_code("+8613812345678").expect("send");
        flow.verify_code("123456").expect("verify");
        assert!(!flow.has_pending_code());

        assert!(matches!(
            flow.verify_code("123456"),
            Err(ClientError::InvalidPhase { phase: "verified" })
        ));
        assert_eq!(flow.phase(), SignUpPhase::Verified);
        assert!(flow.verified().is_some());
    }

    #[test]
    fn retyped_bad_phone_keeps_the_sent_code() {
        let (mut flow, _) = flow();
        flow.enter_sign_up().expect("enter");
        flow.send_code("+8613812345678").expect("send");

        assert!(matches!(
            flow.send_code("138-1234"),
            Err(ClientError::Validation(_))
        ));
        assert_eq!(flow.phase(), SignUpPhase::CodeSent);
        assert!(flow.has_pending_code());

        let verified = flow.verify_code("123456").expect("verify");
        assert_eq!(verified.phone_number(), "+8613812345678");
    }

    #[test]
    fn submit_sends_the_verified_number_not_the_draft() {
        let (mut flow, _) = flow();
        let bridge = RecordingBridge::answering(SIGN_UP_SUCCEEDED);
        flow.enter_sign_up().expect("enter");
        flow.send_code("+8613812345678").expect("send");
        flow.verify_code("123456").expect("verify");

        flow.submit(&bridge, &draft("+8613900000000"))
            .expect("submit");
        let calls = bridge.calls.lock().expect("lock");
        assert_eq!(calls[0].phone_number.as_deref(), Some("+8613812345678"));
    }

    #[test]
    fn verify_without_code_request_fails() {
        let (mut flow, _) = flow();
        flow.enter_sign_up().expect("enter");
        assert!(flow.verify_code("123456").is_err());
        assert_eq!(flow.message(), Some(CODE_NOT_REQUESTED));
    }

    #[test]
    fn submit_refused_until_verified() {
        let (mut flow, _) = flow();
        let bridge = RecordingBridge::answering(SIGN_UP_SUCCEEDED);

        assert!(matches!(
            flow.submit(&bridge, &draft("+8613812345678")),
            Err(ClientError::InvalidPhase { phase: "idle" })
        ));
        flow.enter_sign_up().expect("enter");
        flow.send_code("+8613812345678").expect("send");
        assert!(matches!(
            flow.submit(&bridge, &draft("+8613812345678")),
            Err(ClientError::InvalidPhase { phase: "code_sent" })
        ));
        assert_eq!(bridge.calls(), 0);
    }

    #[test]
    fn done_clears_transient_state_and_returns_to_sign_in() {
        let (mut flow, _) = flow();
        let bridge = RecordingBridge::answering(SIGN_UP_SUCCEEDED);
        flow.enter_sign_up().expect("enter");
        flow.send_code("+8613812345678").expect("send");
        flow.verify_code("123456").expect("verify");

        let result = flow
            .submit(&bridge, &draft("+8613812345678"))
            .expect("submit");
        assert_eq!(result.message, SIGN_UP_SUCCEEDED);
        assert_eq!(flow.phase(), SignUpPhase::Done);
        assert_eq!(flow.mode(), AuthMode::SignIn);
        assert!(!flow.has_pending_code());
        assert!(flow.verified().is_none());

        let calls = bridge.calls.lock().expect("lock");
        assert_eq!(
            calls[0].id_token.as_deref(),
            Some("token-for-v-+8613812345678")
        );
    }

    #[test]
    fn failed_keeps_token_for_resubmit() {
        let (mut flow, _) = flow();
        let failing = RecordingBridge::answering(PHONE_VERIFICATION_FAILED);
        flow.enter_sign_up().expect("enter");
        flow.send_code("+8613812345678").expect("send");
        flow.verify_code("123456").expect("verify");

        flow.submit(&failing, &draft("+8613812345678"))
            .expect("submit");
        assert_eq!(flow.phase(), SignUpPhase::Failed);
        assert!(flow.verified().is_some());
        assert_eq!(flow.message(), Some(PHONE_VERIFICATION_FAILED));

        let ok = RecordingBridge::answering(SIGN_UP_SUCCEEDED);
        flow.submit(&ok, &draft("+8613812345678")).expect("resubmit");
        assert_eq!(flow.phase(), SignUpPhase::Done);
    }

    #[test]
    fn invalid_draft_is_not_sent() {
        let (mut flow, _) = flow();
        let bridge = RecordingBridge::answering(SIGN_UP_SUCCEEDED);
        flow.enter_sign_up().expect("enter");
        flow.send_code("+8613812345678").expect("send");
        flow.verify_code("123456").expect("verify");

        let mut bad = draft("+8613812345678");
        bad.password = "123".into();
        assert!(matches!(
            flow.submit(&bridge, &bad),
            Err(ClientError::Validation(_))
        ));
        assert_eq!(flow.phase(), SignUpPhase::Verified);
        assert_eq!(bridge.calls(), 0);
    }

    #[test]
    fn end_to_end_against_local_identity() {
        let sms = CaptureSms::default();
        let state = local_app_with_sms("signup-e2e", sms.clone());
        let bridge = LocalBridge::new(state.clone());
        let mut flow = PhoneSignUpFlow::new(
            Arc::new(IdentityPhoneAuth::new(state.identity.clone())),
            Arc::new(CountingCaptchas::default()),
        );

        flow.enter_sign_up().expect("enter");
        flow.send_code("+8613812345678").expect("send");
        let code = sms.last_code().expect("code");
        let uid = {
            let verified = flow.verify_code(&code).expect("verify");
            state
                .identity
                .verify_id_token(verified.id_token())
                .expect("claims")
                .uid
        };

        let mut form = draft("+8613812345678");
        form.sms_code = code;
        form.display_name = "小王".into();
        let result = flow.submit(&bridge, &form).expect("submit");
        assert_eq!(result.message, SIGN_UP_SUCCEEDED);

        let profile: UserProfile = get_as(state.store.as_ref(), USERS, &uid)
            .expect("get")
            .expect("profile");
        assert_eq!(profile.display_name.as_deref(), Some("小王"));
        assert_eq!(profile.phone_number.as_deref(), Some("+8613812345678"));
    }
}
