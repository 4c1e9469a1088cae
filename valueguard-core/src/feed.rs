//! Pure list shaping for the incident feed: merge, search, paging.

use crate::models::{Comment, Incident};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Union of seed and live incidents, one entry per id, newest first.
/// On an id collision the live document is kept.
pub fn merge(seed: &[Incident], live: &[Incident]) -> Vec<Incident> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Incident> = live
        .iter()
        .chain(seed.iter())
        .filter(|incident| seen.insert(incident.id.clone()))
        .cloned()
        .collect();
    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged
}

/// Case-insensitive substring match over title, company name and categories.
pub fn search(incidents: Vec<Incident>, term: Option<&str>) -> Vec<Incident> {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return incidents;
    };
    let needle = term.to_lowercase();
    incidents
        .into_iter()
        .filter(|incident| {
            incident.title.to_lowercase().contains(&needle)
                || incident.company_name.to_lowercase().contains(&needle)
                || incident
                    .categories
                    .iter()
                    .any(|c| c.to_lowercase().contains(&needle))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub total_pages: usize,
    pub page: usize,
    pub size: usize,
}

/// 1-based `page`; `size` is clamped to `1..=MAX_PAGE_SIZE`.
pub fn paginate<T: Clone>(items: &[T], page: Option<usize>, size: Option<usize>) -> Page<T> {
    let page = page.unwrap_or(1).max(1);
    let size = size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let total = items.len();
    let start = (page - 1).saturating_mul(size).min(total);
    let end = start.saturating_add(size).min(total);

    Page {
        items: items[start..end].to_vec(),
        total,
        total_pages: total.div_ceil(size),
        page,
        size,
    }
}

pub fn newest_comments_first(comments: &mut [Comment]) {
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn incident(id: &str, title: &str, day: u32) -> Incident {
        Incident {
            id: id.into(),
            company_id: None,
            company_name: "环球集团".into(),
            title: title.into(),
            description: String::new(),
            date: Utc
                .with_ymd_and_hms(2024, 1, day, 0, 0, 0)
                .single()
                .expect("date"),
            categories: vec!["Social".into()],
            user_id: None,
            author: None,
        }
    }

    #[test]
    fn live_wins_on_collision() {
        let seed = vec![incident("1", "seed", 1), incident("2", "seed two", 2)];
        let live = vec![incident("1", "live", 3)];
        let merged = merge(&seed, &live);

        assert_eq!(merged.len(), 2);
        let one: Vec<_> = merged.iter().filter(|i| i.id == "1").collect();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].title, "live");
    }

    #[test]
    fn merge_sorts_newest_first_and_is_stable() {
        let seed = vec![incident("a", "a", 5), incident("b", "b", 5)];
        let live = vec![incident("c", "c", 9)];
        let ids: Vec<_> = merge(&seed, &live).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn search_is_case_insensitive_over_categories_too() {
        let items = vec![incident("1", "Carbon report", 1), incident("2", "Labor", 2)];
        assert_eq!(search(items.clone(), Some("CARBON")).len(), 1);
        assert_eq!(search(items.clone(), Some("social")).len(), 2);
        assert_eq!(search(items.clone(), Some("环球")).len(), 2);
        assert_eq!(search(items, Some("  ")).len(), 2);
    }

    #[test]
    fn paginate_clamps() {
        let items: Vec<u32> = (0..45).collect();
        let first = paginate(&items, None, None);
        assert_eq!(first.items.len(), 20);
        assert_eq!(first.total_pages, 3);

        let last = paginate(&items, Some(3), Some(20));
        assert_eq!(last.items, (40..45).collect::<Vec<_>>());

        let clamped = paginate(&items, Some(0), Some(1000));
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.size, MAX_PAGE_SIZE);
        assert_eq!(clamped.items.len(), 45);

        assert!(paginate(&items, Some(9), Some(20)).items.is_empty());
    }
}
