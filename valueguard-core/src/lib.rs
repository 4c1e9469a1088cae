//! Core of the incident-reporting service: documents, identity, server
//! actions and the read-side queries over them.

pub mod actions;
pub mod categorize;
pub mod config;
pub mod error;
pub mod feed;
pub mod identity;
pub mod models;
pub mod phone;
pub mod queries;
pub mod seed;
pub mod state;
pub mod store;
