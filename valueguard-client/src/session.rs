//! Who is signed in, and who wants to hear about it.

use crate::bridge::ActionBridge;
use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use valueguard_core::actions::SignedIn;
use valueguard_core::models::{UserProfile, USERS};
use valueguard_core::store::{get_as, DocumentStore, Subscription};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub profile: UserProfile,
    pub id_token: String,
}

impl Session {
    pub fn uid(&self) -> &str {
        &self.profile.uid
    }
}

impl From<SignedIn> for Session {
    fn from(signed_in: SignedIn) -> Self {
        Self {
            profile: signed_in.profile,
            id_token: signed_in.id_token,
        }
    }
}

pub trait SessionSink: Send + Sync {
    fn session_changed(&self, session: Option<&Session>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Current session plus a live watch on the signed-in user's profile.
pub struct SessionContext {
    store: Arc<dyn DocumentStore>,
    session: Option<Session>,
    profile_watch: Option<Subscription>,
    listeners: BTreeMap<ListenerId, Box<dyn SessionSink>>,
    next_listener: u64,
}

impl SessionContext {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            session: None,
            profile_watch: None,
            listeners: BTreeMap::new(),
            next_listener: 0,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn subscribe(&mut self, sink: impl SessionSink + 'static) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        sink.session_changed(self.session.as_ref());
        self.listeners.insert(id, Box::new(sink));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn sign_in(
        &mut self,
        bridge: &dyn ActionBridge,
        account: &str,
        password: &str,
    ) -> Result<&Session, ClientError> {
        let signed_in = bridge
            .sign_in(account, password)
            .map_err(ClientError::Rejected)?;
        self.set_session(Some(signed_in.into()));
        self.session
            .as_ref()
            .ok_or(ClientError::InvalidPhase { phase: "signed out" })
    }

    pub fn sign_out(&mut self, bridge: &dyn ActionBridge) -> Result<(), ClientError> {
        if let Some(session) = self.session.as_ref() {
            bridge
                .sign_out(&session.id_token)
                .map_err(ClientError::Rejected)?;
        }
        self.set_session(None);
        Ok(())
    }

    /// Applies pending profile writes. Returns whether anything changed.
    pub fn poll(&mut self) -> Result<bool, ClientError> {
        let (Some(watch), Some(session)) = (self.profile_watch.as_ref(), self.session.as_mut())
        else {
            return Ok(false);
        };
        let touched = watch.drain().iter().any(|c| c.id == session.profile.uid);
        if !touched {
            return Ok(false);
        }

        match get_as::<UserProfile>(self.store.as_ref(), USERS, &session.profile.uid)? {
            Some(profile) if profile != session.profile => {
                session.profile = profile;
                self.notify();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set_session(&mut self, session: Option<Session>) {
        self.profile_watch = session.as_ref().map(|_| self.store.subscribe(USERS));
        if let Some(session) = session.as_ref() {
            tracing::debug!(uid = %session.uid(), "session started");
        }
        self.session = session;
        self.notify();
    }

    fn notify(&self) {
        for sink in self.listeners.values() {
            sink.session_changed(self.session.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LocalBridge;
    use crate::tests::local_app;
    use form_schema::EmailSignUpForm;
    use std::sync::Mutex;
    use valueguard_core::store::put;

    #[derive(Clone, Default)]
    struct CaptureSink {
        seen: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl SessionSink for CaptureSink {
        fn session_changed(&self, session: Option<&Session>) {
            if let Ok(mut guard) = self.seen.lock() {
                guard.push(session.and_then(|s| s.profile.display_name.clone()));
            }
        }
    }

    fn signed_up(bridge: &LocalBridge) {
        bridge.sign_up_with_email(&EmailSignUpForm {
            email: Some("someone@example.com".into()),
            password: Some("secret1".into()),
            display_name: Some("阿明".into()),
        });
    }

    #[test]
    fn sign_in_notifies_and_tracks_profile() {
        let bridge = LocalBridge::new(local_app("session-sign-in"));
        signed_up(&bridge);
        let store = bridge.state().store.clone();
        let mut ctx = SessionContext::new(store.clone());

        let sink = CaptureSink::default();
        let id = ctx.subscribe(sink.clone());

        let uid = ctx
            .sign_in(&bridge, "someone@example.com", "secret1")
            .expect("sign in")
            .uid()
            .to_string();

        let mut profile = ctx.current().expect("session").profile.clone();
        profile.display_name = Some("阿明二号".into());
        put(store.as_ref(), USERS, &uid, &profile).expect("edit profile");
        assert!(ctx.poll().expect("poll"));
        assert_eq!(
            ctx.current().and_then(|s| s.profile.display_name.as_deref()),
            Some("阿明二号")
        );

        assert!(ctx.unsubscribe(id));
        ctx.sign_out(&bridge).expect("sign out");
        assert!(ctx.current().is_none());

        let seen = sink.seen.lock().expect("lock").clone();
        assert_eq!(
            seen,
            vec![None, Some("阿明".into()), Some("阿明二号".into())]
        );
    }

    #[test]
    fn sign_out_releases_profile_watch() {
        let bridge = LocalBridge::new(local_app("session-release"));
        signed_up(&bridge);
        let mut ctx = SessionContext::new(bridge.state().store.clone());

        ctx.sign_in(&bridge, "someone@example.com", "secret1")
            .expect("sign in");
        assert!(ctx.profile_watch.is_some());
        ctx.sign_out(&bridge).expect("sign out");
        assert!(ctx.profile_watch.is_none());
        assert!(!ctx.poll().expect("poll"));
    }

    #[test]
    fn rejected_sign_in_leaves_no_session() {
        let bridge = LocalBridge::new(local_app("session-rejected"));
        let mut ctx = SessionContext::new(bridge.state().store.clone());
        assert!(matches!(
            ctx.sign_in(&bridge, "nobody@example.com", "secret1"),
            Err(ClientError::Rejected(_))
        ));
        assert!(ctx.current().is_none());
    }
}
