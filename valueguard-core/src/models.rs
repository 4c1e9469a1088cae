use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const USERS: &str = "users";
pub const INCIDENTS: &str = "incidents";

/// Path of the comment subcollection under one incident.
pub fn comments_collection(incident_id: &str) -> String {
    format!("{INCIDENTS}/{incident_id}/comments")
}

/// Copy of the author's public fields, taken when a document is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSnapshot {
    pub uid: String,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    pub company_name: String,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    pub logo_url: String,
    pub incident_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub incident_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "user")]
    pub author: AuthorSnapshot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl UserProfile {
    pub fn snapshot(&self) -> AuthorSnapshot {
        AuthorSnapshot {
            uid: self.uid.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}
