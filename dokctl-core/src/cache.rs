use std::collections::BTreeMap;
use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use parking_lot::Mutex;
use serde::{ Deserialize, Serialize };
use tracing::{ debug, warn };

use crate::clock::SharedClock;
use crate::model::{ EnvironmentId, Project, Resource };

/// How long a snapshot may be shown without refetching.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Fetch time, epoch milliseconds
    pub timestamp: i64,
}

impl<T> CacheEntry<T> {
    /// Valid for reads strictly before `timestamp + TTL`.
    pub fn is_valid(&self, now_millis: i64) -> bool {
        now_millis - self.timestamp < (CACHE_TTL.as_millis() as i64)
    }
}

/// Resource list last extracted for a project, with the environment it
/// was extracted from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub environment_id: EnvironmentId,
    pub resources: Vec<Resource>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    /// keyed by server alias
    #[serde(default)]
    projects: BTreeMap<String, CacheEntry<Vec<Project>>>,
    /// keyed by `alias:projectId`
    #[serde(default)]
    resources: BTreeMap<String, CacheEntry<ResourceSnapshot>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub project_entries: usize,
    pub resource_entries: usize,
    pub valid_entries: usize,
    pub oldest_timestamp: Option<i64>,
}

fn resource_key(alias: &str, project_id: &str) -> String {
    format!("{}:{}", alias, project_id)
}

/// Time-bounded snapshot store partitioned by server alias, optionally
/// persisted to a JSON file so a fresh start can paint immediately.
pub struct LocalCache {
    path: Option<PathBuf>,
    clock: SharedClock,
    data: Mutex<CacheFile>,
}

impl LocalCache {
    pub fn in_memory(clock: SharedClock) -> Self {
        Self { path: None, clock, data: Mutex::new(CacheFile::default()) }
    }

    /// Opens the cache file at `path`. A missing or unreadable file starts
    /// an empty cache; the file is rewritten on the next store.
    pub fn open(path: impl Into<PathBuf>, clock: SharedClock) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(text) =>
                serde_json::from_str(&text).unwrap_or_else(|err| {
                    warn!(path = %path.display(), error = %err, "discarding unreadable cache file");
                    CacheFile::default()
                }),
            Err(_) => CacheFile::default(),
        };
        Self { path: Some(path), clock, data: Mutex::new(data) }
    }

    /// `<cache dir>/dokctl/tui-cache.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("dokctl").join("tui-cache.json"))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn projects(&self, alias: &str) -> Option<Vec<Project>> {
        let now = self.clock.now_millis();
        let data = self.data.lock();
        let hit = data.projects
            .get(alias)
            .filter(|e| e.is_valid(now))
            .map(|e| e.data.clone());
        debug!(alias, hit = hit.is_some(), "project cache lookup");
        hit
    }

    pub fn store_projects(&self, alias: &str, projects: Vec<Project>) {
        let timestamp = self.clock.now_millis();
        let mut data = self.data.lock();
        data.projects.insert(alias.to_string(), CacheEntry { data: projects, timestamp });
        self.persist(&data);
    }

    pub fn resources(&self, alias: &str, project_id: &str) -> Option<ResourceSnapshot> {
        let now = self.clock.now_millis();
        let data = self.data.lock();
        data.resources
            .get(&resource_key(alias, project_id))
            .filter(|e| e.is_valid(now))
            .map(|e| e.data.clone())
    }

    pub fn store_resources(&self, alias: &str, project_id: &str, snapshot: ResourceSnapshot) {
        let timestamp = self.clock.now_millis();
        let mut data = self.data.lock();
        data.resources.insert(resource_key(alias, project_id), CacheEntry {
            data: snapshot,
            timestamp,
        });
        self.persist(&data);
    }

    /// Drops every entry belonging to `alias`.
    pub fn invalidate_server(&self, alias: &str) {
        let prefix = format!("{}:", alias);
        let mut data = self.data.lock();
        data.projects.remove(alias);
        data.resources.retain(|key, _| !key.starts_with(&prefix));
        self.persist(&data);
    }

    pub fn invalidate_project(&self, alias: &str, project_id: &str) {
        let mut data = self.data.lock();
        data.resources.remove(&resource_key(alias, project_id));
        self.persist(&data);
    }

    pub fn clear(&self) {
        let mut data = self.data.lock();
        *data = CacheFile::default();
        self.persist(&data);
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_millis();
        let data = self.data.lock();
        let timestamps = data.projects
            .values()
            .map(|e| (e.timestamp, e.is_valid(now)))
            .chain(data.resources.values().map(|e| (e.timestamp, e.is_valid(now))));

        let mut stats = CacheStats {
            project_entries: data.projects.len(),
            resource_entries: data.resources.len(),
            ..Default::default()
        };
        for (timestamp, valid) in timestamps {
            if valid {
                stats.valid_entries += 1;
            }
            stats.oldest_timestamp = Some(
                stats.oldest_timestamp.map_or(timestamp, |t| t.min(timestamp))
            );
        }
        stats
    }

    fn persist(&self, data: &CacheFile) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string(data)
            .map_err(std::io::Error::other)
            .and_then(|text| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, text)
            });
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "failed to write cache file");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    fn project(id: &str) -> Project {
        Project {
            project_id: id.into(),
            name: id.into(),
            description: None,
            created_at: None,
            environments: vec![],
        }
    }

    #[test]
    fn test_ttl_boundary() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = LocalCache::in_memory(clock.clone());
        cache.store_projects("prod", vec![project("a")]);

        clock.advance(CACHE_TTL - Duration::from_millis(1));
        assert!(cache.projects("prod").is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.projects("prod").is_none());
    }

    #[test]
    fn test_partitioned_by_alias() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LocalCache::in_memory(clock);
        cache.store_projects("prod", vec![project("a")]);

        assert!(cache.projects("staging").is_none());
        assert_eq!(cache.projects("prod").unwrap()[0].project_id, "a");
    }

    #[test]
    fn test_invalidate_server_keeps_other_aliases() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LocalCache::in_memory(clock);
        let snapshot = ResourceSnapshot { environment_id: "e".into(), resources: vec![] };
        cache.store_projects("prod", vec![project("a")]);
        cache.store_resources("prod", "a", snapshot.clone());
        cache.store_resources("prod-eu", "a", snapshot.clone());

        cache.invalidate_server("prod");

        assert!(cache.projects("prod").is_none());
        assert!(cache.resources("prod", "a").is_none());
        assert_eq!(cache.resources("prod-eu", "a"), Some(snapshot));
    }

    #[test]
    fn test_invalidate_project_keeps_siblings() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LocalCache::in_memory(clock);
        let snapshot = ResourceSnapshot { environment_id: "e".into(), resources: vec![] };
        cache.store_projects("prod", vec![project("a"), project("b")]);
        cache.store_resources("prod", "a", snapshot.clone());
        cache.store_resources("prod", "b", snapshot.clone());

        cache.invalidate_project("prod", "a");

        assert!(cache.resources("prod", "a").is_none());
        assert_eq!(cache.resources("prod", "b"), Some(snapshot));
        assert_eq!(cache.projects("prod").map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_persisted_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tui-cache.json");
        let clock = Arc::new(ManualClock::new(42));

        LocalCache::open(&path, clock.clone()).store_projects("prod", vec![project("a")]);
        let reopened = LocalCache::open(&path, clock);

        assert_eq!(reopened.projects("prod").map(|p| p.len()), Some(1));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tui-cache.json");
        fs::write(&path, "{ not json").unwrap();

        let cache = LocalCache::open(&path, Arc::new(ManualClock::new(0)));
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_stats_counts_valid_and_oldest() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LocalCache::in_memory(clock.clone());
        cache.store_projects("old", vec![]);
        clock.advance(Duration::from_secs(400));
        cache.store_projects("new", vec![]);

        let stats = cache.stats();
        assert_eq!(stats.project_entries, 2);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.oldest_timestamp, Some(0));

        cache.clear();
        assert_eq!(cache.stats().project_entries, 0);
    }
}
