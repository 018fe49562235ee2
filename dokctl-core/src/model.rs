use std::fmt;
use std::str::FromStr;

use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::{ Map, Value };

pub type ProjectId = String;
pub type EnvironmentId = String;

/// Remote collections are sometimes sent as `null` instead of `[]`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where D: Deserializer<'de>, T: Deserialize<'de> + Default
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub environments: Vec<Environment>,
}

impl Project {
    /// The flagged default environment, or the first one when none is flagged.
    pub fn default_environment(&self) -> Option<&Environment> {
        self.environments
            .iter()
            .find(|e| e.is_default)
            .or_else(|| self.environments.first())
    }

    pub fn environment(&self, id: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.environment_id == id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub environment_id: EnvironmentId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_id: ProjectId,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub applications: Vec<Application>,
    #[serde(default, deserialize_with = "nullable")]
    pub compose: Vec<Compose>,
    #[serde(default, deserialize_with = "nullable")]
    pub postgres: Vec<DatabaseRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub mysql: Vec<DatabaseRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub mongo: Vec<DatabaseRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub redis: Vec<DatabaseRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub mariadb: Vec<DatabaseRecord>,
}

impl Environment {
    pub fn databases(&self, engine: DatabaseEngine) -> &[DatabaseRecord] {
        match engine {
            DatabaseEngine::Postgres => &self.postgres,
            DatabaseEngine::Mysql => &self.mysql,
            DatabaseEngine::Mongo => &self.mongo,
            DatabaseEngine::Redis => &self.redis,
            DatabaseEngine::Mariadb => &self.mariadb,
        }
    }

    pub fn databases_mut(&mut self, engine: DatabaseEngine) -> &mut Vec<DatabaseRecord> {
        match engine {
            DatabaseEngine::Postgres => &mut self.postgres,
            DatabaseEngine::Mysql => &mut self.mysql,
            DatabaseEngine::Mongo => &mut self.mongo,
            DatabaseEngine::Redis => &mut self.redis,
            DatabaseEngine::Mariadb => &mut self.mariadb,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub application_id: String,
    pub name: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub application_status: String,
    #[serde(default)]
    pub build_type: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compose {
    pub compose_id: String,
    pub name: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub compose_status: String,
    #[serde(default)]
    pub compose_type: Option<String>,
}

/// A database as the remote tree sends it. The identifier lives under an
/// engine-specific key (`postgresId`, `redisId`, ...) so it stays in `fields`
/// until the extractor resolves it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRecord {
    pub name: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub application_status: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Postgres,
    Mysql,
    Mongo,
    Redis,
    Mariadb,
}

impl DatabaseEngine {
    pub const ALL: [DatabaseEngine; 5] = [
        DatabaseEngine::Postgres,
        DatabaseEngine::Mysql,
        DatabaseEngine::Mongo,
        DatabaseEngine::Redis,
        DatabaseEngine::Mariadb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::Postgres => "postgres",
            DatabaseEngine::Mysql => "mysql",
            DatabaseEngine::Mongo => "mongo",
            DatabaseEngine::Redis => "redis",
            DatabaseEngine::Mariadb => "mariadb",
        }
    }

    /// Name of the field carrying this engine's identifier, both in the
    /// project tree and in request payloads.
    pub fn id_field(&self) -> &'static str {
        match self {
            DatabaseEngine::Postgres => "postgresId",
            DatabaseEngine::Mysql => "mysqlId",
            DatabaseEngine::Mongo => "mongoId",
            DatabaseEngine::Redis => "redisId",
            DatabaseEngine::Mariadb => "mariadbId",
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatabaseEngine::ALL.into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown database engine: {}", s))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Application,
    Database,
    Compose,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Application => "application",
            ResourceKind::Database => "database",
            ResourceKind::Compose => "compose",
        }
    }
}

/// Database with its identifier normalized out of the engine-specific field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: String,
    pub engine: DatabaseEngine,
    pub record: DatabaseRecord,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ResourcePayload {
    Application(Application),
    Database(Database),
    Compose(Compose),
}

/// One entry of the flattened per-environment resource list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub project_id: ProjectId,
    pub environment_id: EnvironmentId,
    pub payload: ResourcePayload,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match &self.payload {
            ResourcePayload::Application(_) => ResourceKind::Application,
            ResourcePayload::Database(_) => ResourceKind::Database,
            ResourcePayload::Compose(_) => ResourceKind::Compose,
        }
    }

    pub fn native_id(&self) -> &str {
        match &self.payload {
            ResourcePayload::Application(a) => &a.application_id,
            ResourcePayload::Database(d) => &d.id,
            ResourcePayload::Compose(c) => &c.compose_id,
        }
    }

    pub fn name(&self) -> &str {
        match &self.payload {
            ResourcePayload::Application(a) => &a.name,
            ResourcePayload::Database(d) => &d.record.name,
            ResourcePayload::Compose(c) => &c.name,
        }
    }

    pub fn status(&self) -> &str {
        match &self.payload {
            ResourcePayload::Application(a) => &a.application_status,
            ResourcePayload::Database(d) => &d.record.application_status,
            ResourcePayload::Compose(c) => &c.compose_status,
        }
    }

    /// Short label shown next to the name; databases show their engine.
    pub fn kind_tag(&self) -> &'static str {
        match &self.payload {
            ResourcePayload::Database(d) => d.engine.as_str(),
            _ => self.kind().as_str(),
        }
    }

    pub fn engine(&self) -> Option<DatabaseEngine> {
        match &self.payload {
            ResourcePayload::Database(d) => Some(d.engine),
            _ => None,
        }
    }

    /// `"<kind>:<native-id>"`, only ever compared, never stored.
    ///
    /// A database whose engine id is missing falls back to
    /// `"database:~<engine>:<app-name or name>"` so two of them in one
    /// environment stay apart.
    pub fn identity(&self) -> String {
        match &self.payload {
            ResourcePayload::Database(d) if d.id.is_empty() => {
                let label = if d.record.app_name.is_empty() { &d.record.name } else { &d.record.app_name };
                format!("{}:~{}:{}", self.kind().as_str(), d.engine.as_str(), label)
            }
            _ => format!("{}:{}", self.kind().as_str(), self.native_id()),
        }
    }

    /// Resources without a resolved identifier cannot be targeted by actions.
    pub fn is_actionable(&self) -> bool {
        !self.native_id().is_empty()
    }

    pub fn as_application(&self) -> Option<&Application> {
        match &self.payload {
            ResourcePayload::Application(a) => Some(a),
            _ => None,
        }
    }

    /// API router prefix (`application`, `compose`, or the engine name).
    pub fn router(&self) -> &'static str {
        match &self.payload {
            ResourcePayload::Application(_) => "application",
            ResourcePayload::Compose(_) => "compose",
            ResourcePayload::Database(d) => d.engine.as_str(),
        }
    }

    pub fn id_field(&self) -> &'static str {
        match &self.payload {
            ResourcePayload::Application(_) => "applicationId",
            ResourcePayload::Compose(_) => "composeId",
            ResourcePayload::Database(d) => d.engine.id_field(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionVerb {
    Deploy,
    Start,
    Stop,
    Restart,
    Delete,
}

impl ActionVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionVerb::Deploy => "deploy",
            ActionVerb::Start => "start",
            ActionVerb::Stop => "stop",
            ActionVerb::Restart => "restart",
            ActionVerb::Delete => "delete",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionVerb::Deploy => "Deploying",
            ActionVerb::Start => "Starting",
            ActionVerb::Stop => "Stopping",
            ActionVerb::Restart => "Restarting",
            ActionVerb::Delete => "Deleting",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, ActionVerb::Delete)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub deployment_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub log_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_environment_tolerates_null_collections() {
        let env: Environment = serde_json::from_value(
            json!({
            "environmentId": "e1",
            "name": "production",
            "isDefault": true,
            "applications": null,
            "postgres": [{ "name": "pg", "postgresId": "p1", "applicationStatus": "done" }]
        })
        ).unwrap();

        assert!(env.applications.is_empty());
        assert_eq!(env.postgres.len(), 1);
        assert_eq!(env.postgres[0].fields.get("postgresId"), Some(&json!("p1")));
    }

    #[test]
    fn test_default_environment_falls_back_to_first() {
        let project = Project {
            project_id: "p".into(),
            name: "shop".into(),
            description: None,
            created_at: None,
            environments: vec![
                Environment {
                    environment_id: "a".into(),
                    name: "staging".into(),
                    ..Default::default()
                },
                Environment {
                    environment_id: "b".into(),
                    name: "production".into(),
                    ..Default::default()
                }
            ],
        };
        assert_eq!(project.default_environment().unwrap().environment_id, "a");
    }

    #[test]
    fn test_identity_and_kind_tag() {
        let db = Resource {
            project_id: "p".into(),
            environment_id: "e".into(),
            payload: ResourcePayload::Database(Database {
                id: "r1".into(),
                engine: DatabaseEngine::Redis,
                record: DatabaseRecord {
                    name: "cache".into(),
                    ..Default::default()
                },
            }),
        };
        assert_eq!(db.identity(), "database:r1");
        assert_eq!(db.kind_tag(), "redis");
        assert_eq!(db.router(), "redis");
        assert_eq!(db.id_field(), "redisId");
    }

    #[test]
    fn test_unidentified_databases_stay_distinct() {
        let db = |engine: DatabaseEngine, name: &str| Resource {
            project_id: "p".into(),
            environment_id: "e".into(),
            payload: ResourcePayload::Database(Database {
                id: String::new(),
                engine,
                record: DatabaseRecord {
                    name: name.into(),
                    ..Default::default()
                },
            }),
        };
        let cache = db(DatabaseEngine::Redis, "cache");
        let queue = db(DatabaseEngine::Redis, "queue");
        let legacy = db(DatabaseEngine::Mysql, "cache");

        assert_eq!(cache.identity(), "database:~redis:cache");
        assert_ne!(cache.identity(), queue.identity());
        assert_ne!(cache.identity(), legacy.identity());
        assert!(!cache.is_actionable());
    }

    #[test]
    fn test_engine_from_str() {
        assert_eq!("mariadb".parse::<DatabaseEngine>(), Ok(DatabaseEngine::Mariadb));
        assert!("sqlite".parse::<DatabaseEngine>().is_err());
    }
}
