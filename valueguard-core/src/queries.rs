//! Read side: the merged feed, single incidents, comments, company pages.

use crate::error::StoreError;
use crate::feed::{merge, newest_comments_first, paginate, search, Page};
use crate::models::{comments_collection, Comment, Company, Incident, INCIDENTS};
use crate::state::AppState;
use crate::store::{get_as, list_as};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedQuery {
    pub search: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

pub fn live_incidents(state: &AppState) -> Result<Vec<Incident>, StoreError> {
    list_as(state.store.as_ref(), INCIDENTS)
}

/// Seed and live incidents merged, newest first.
pub fn merged_feed(state: &AppState) -> Result<Vec<Incident>, StoreError> {
    Ok(merge(&state.catalog.incidents, &live_incidents(state)?))
}

pub fn list_incidents(state: &AppState, query: &FeedQuery) -> Result<Page<Incident>, StoreError> {
    let matched = search(merged_feed(state)?, query.search.as_deref());
    Ok(paginate(&matched, query.page, query.size))
}

pub fn get_incident(state: &AppState, id: &str) -> Result<Option<Incident>, StoreError> {
    if let Some(live) = get_as::<Incident>(state.store.as_ref(), INCIDENTS, id)? {
        return Ok(Some(live));
    }
    Ok(state.catalog.incident(id).cloned())
}

pub fn list_comments(state: &AppState, incident_id: &str) -> Result<Vec<Comment>, StoreError> {
    let mut comments: Vec<Comment> =
        list_as(state.store.as_ref(), &comments_collection(incident_id))?;
    newest_comments_first(&mut comments);
    Ok(comments)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub company: Company,
    pub incidents: Vec<Incident>,
}

pub fn company_profile(state: &AppState, name: &str) -> Result<Option<CompanyProfile>, StoreError> {
    let Some(company) = state.catalog.company_named(name).cloned() else {
        return Ok(None);
    };

    let wanted = company.name.to_lowercase();
    let incidents = merged_feed(state)?
        .into_iter()
        .filter(|incident| match incident.company_id.as_deref() {
            Some(id) => id == company.id,
            None => incident.company_name.trim().to_lowercase() == wanted,
        })
        .collect();

    Ok(Some(CompanyProfile { company, incidents }))
}
