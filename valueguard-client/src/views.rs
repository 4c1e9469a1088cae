//! Live list/detail/comment views. Each holds a store subscription for as long
//! as it exists and reloads on `poll` when its collection changed.

use crate::error::ClientError;
use std::sync::Arc;
use valueguard_core::feed::{merge, newest_comments_first, search};
use valueguard_core::models::{comments_collection, Comment, Incident, INCIDENTS};
use valueguard_core::seed::Catalog;
use valueguard_core::store::{get_as, list_as, DocumentStore, Subscription};

pub struct IncidentFeedView {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<Catalog>,
    watch: Subscription,
    incidents: Vec<Incident>,
}

impl IncidentFeedView {
    pub fn open(store: Arc<dyn DocumentStore>, catalog: Arc<Catalog>) -> Result<Self, ClientError> {
        let watch = store.subscribe(INCIDENTS);
        let mut view = Self {
            store,
            catalog,
            watch,
            incidents: Vec::new(),
        };
        view.reload()?;
        Ok(view)
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// The search box filter over the current snapshot.
    pub fn filtered(&self, term: &str) -> Vec<Incident> {
        search(self.incidents.clone(), Some(term))
    }

    pub fn poll(&mut self) -> Result<bool, ClientError> {
        if self.watch.drain().is_empty() {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }

    fn reload(&mut self) -> Result<(), ClientError> {
        let live: Vec<Incident> = list_as(self.store.as_ref(), INCIDENTS)?;
        self.incidents = merge(&self.catalog.incidents, &live);
        Ok(())
    }
}

pub struct IncidentDetailView {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<Catalog>,
    incident_id: String,
    watch: Subscription,
    incident: Option<Incident>,
}

impl IncidentDetailView {
    pub fn open(
        store: Arc<dyn DocumentStore>,
        catalog: Arc<Catalog>,
        incident_id: &str,
    ) -> Result<Self, ClientError> {
        let watch = store.subscribe(INCIDENTS);
        let mut view = Self {
            store,
            catalog,
            incident_id: incident_id.to_string(),
            watch,
            incident: None,
        };
        view.reload()?;
        Ok(view)
    }

    /// `None` once loaded means the incident does not exist.
    pub fn incident(&self) -> Option<&Incident> {
        self.incident.as_ref()
    }

    pub fn poll(&mut self) -> Result<bool, ClientError> {
        let relevant = self
            .watch
            .drain()
            .iter()
            .any(|change| change.id == self.incident_id);
        if !relevant {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }

    fn reload(&mut self) -> Result<(), ClientError> {
        let live: Option<Incident> = get_as(self.store.as_ref(), INCIDENTS, &self.incident_id)?;
        let seed: Vec<Incident> = self.catalog.incident(&self.incident_id).cloned().into_iter().collect();
        self.incident = merge(&seed, &live.into_iter().collect::<Vec<_>>())
            .into_iter()
            .next();
        Ok(())
    }
}

pub struct CommentsView {
    store: Arc<dyn DocumentStore>,
    collection: String,
    watch: Subscription,
    comments: Vec<Comment>,
}

impl CommentsView {
    pub fn open(store: Arc<dyn DocumentStore>, incident_id: &str) -> Result<Self, ClientError> {
        let collection = comments_collection(incident_id);
        let watch = store.subscribe(&collection);
        let mut view = Self {
            store,
            collection,
            watch,
            comments: Vec::new(),
        };
        view.reload()?;
        Ok(view)
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn poll(&mut self) -> Result<bool, ClientError> {
        if self.watch.drain().is_empty() {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }

    fn reload(&mut self) -> Result<(), ClientError> {
        self.comments = list_as(self.store.as_ref(), &self.collection)?;
        newest_comments_first(&mut self.comments);
        Ok(())
    }
}
