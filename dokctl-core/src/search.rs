use crate::model::{ Project, Resource };

pub const SCORE_EXACT: u32 = 100;
pub const SCORE_PREFIX: u32 = 80;
pub const SCORE_SUBSTRING: u32 = 60;
pub const SCORE_SUBSEQUENCE: u32 = 40;

/// Every query character appears in `text`, in order, ignoring case.
pub fn fuzzy_match(text: &str, query: &str) -> bool {
    let text = text.to_lowercase();
    let mut rest = text.chars();
    query
        .to_lowercase()
        .chars()
        .all(|q| rest.by_ref().any(|c| c == q))
}

/// 100 exact, 80 prefix, 60 substring, 40 subsequence, else 0.
pub fn match_score(text: &str, query: &str) -> u32 {
    let t = text.to_lowercase();
    let q = query.to_lowercase();
    if t == q {
        SCORE_EXACT
    } else if t.starts_with(&q) {
        SCORE_PREFIX
    } else if t.contains(&q) {
        SCORE_SUBSTRING
    } else if fuzzy_match(&t, &q) {
        SCORE_SUBSEQUENCE
    } else {
        0
    }
}

/// Best score of `query` against the resource's name, status, and kind tag.
pub fn resource_score(resource: &Resource, query: &str) -> u32 {
    [resource.name(), resource.status(), resource.kind_tag()]
        .into_iter()
        .map(|field| match_score(field, query))
        .max()
        .unwrap_or(0)
}

fn rank<T: Clone>(items: &[T], score: impl Fn(&T) -> u32) -> Vec<T> {
    let mut scored: Vec<(u32, &T)> = items
        .iter()
        .map(|item| (score(item), item))
        .filter(|(s, _)| *s > 0)
        .collect();
    // stable: equal scores keep list order
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .map(|(_, item)| item.clone())
        .collect()
}

/// Matching resources, best first. An empty query returns the list as is.
pub fn filter_resources(resources: &[Resource], query: &str) -> Vec<Resource> {
    if query.is_empty() {
        return resources.to_vec();
    }
    rank(resources, |r| resource_score(r, query))
}

/// Projects are matched on name only.
pub fn filter_projects(projects: &[Project], query: &str) -> Vec<Project> {
    if query.is_empty() {
        return projects.to_vec();
    }
    rank(projects, |p| match_score(&p.name, query))
}
