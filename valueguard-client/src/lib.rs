//! Page-side logic: session tracking, live views, form gating and the phone
//! sign-up flow. Pages talk to the actions through an [`bridge::ActionBridge`].

pub mod bridge;
pub mod error;
pub mod forms;
pub mod session;
pub mod signup;
pub mod views;
