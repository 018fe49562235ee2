use serde_json::Value;

use crate::model::{
    Database,
    DatabaseEngine,
    DatabaseRecord,
    Environment,
    Project,
    Resource,
    ResourcePayload,
};

/// Copies the engine-specific identifier (`postgresId`, `mysqlId`, ...)
/// out of a database record. Empty when the field is missing.
pub fn resolve_database_id(engine: DatabaseEngine, record: &DatabaseRecord) -> String {
    record.fields
        .get(engine.id_field())
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// The environment with `environment_id`, or the project's default when
/// the id is absent or no longer exists.
pub fn select_environment<'a>(
    project: &'a Project,
    environment_id: Option<&str>
) -> Option<&'a Environment> {
    environment_id
        .and_then(|id| project.environment(id))
        .or_else(|| project.default_environment())
}

/// Flattens one environment into an ordered resource list: applications,
/// then compose stacks, then databases in engine order.
pub fn extract_environment(project_id: &str, environment: &Environment) -> Vec<Resource> {
    let wrap = |payload: ResourcePayload| Resource {
        project_id: project_id.to_string(),
        environment_id: environment.environment_id.clone(),
        payload,
    };

    let applications = environment.applications
        .iter()
        .cloned()
        .map(ResourcePayload::Application);
    let compose = environment.compose.iter().cloned().map(ResourcePayload::Compose);
    let databases = DatabaseEngine::ALL.into_iter().flat_map(|engine| {
        environment
            .databases(engine)
            .iter()
            .map(move |record| {
                ResourcePayload::Database(Database {
                    id: resolve_database_id(engine, record),
                    engine,
                    record: record.clone(),
                })
            })
    });

    applications.chain(compose).chain(databases).map(wrap).collect()
}

/// Resources of a single environment of `project`; never the whole project.
pub fn extract_resources(project: &Project, environment_id: Option<&str>) -> Vec<Resource> {
    select_environment(project, environment_id)
        .map(|env| extract_environment(&project.project_id, env))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use serde_json::json;

    fn project() -> Project {
        serde_json::from_value(
                json!({
            "projectId": "p1",
            "name": "shop",
            "environments": [
                {
                    "environmentId": "staging",
                    "name": "staging",
                    "isDefault": false,
                    "applications": [{ "applicationId": "s-web", "name": "web", "applicationStatus": "idle" }]
                },
                {
                    "environmentId": "prod",
                    "name": "production",
                    "isDefault": true,
                    "applications": [{ "applicationId": "a1", "name": "web", "applicationStatus": "running" }],
                    "compose": [{ "composeId": "c1", "name": "stack", "composeStatus": "done" }],
                    "mysql": [{ "name": "legacy", "mysqlId": "my1", "applicationStatus": "idle" }],
                    "postgres": [{ "name": "orders", "postgresId": "pg1", "applicationStatus": "done" }],
                    "redis": [{ "name": "broken", "applicationStatus": "error" }]
                }
            ]
        })
            )
            .unwrap()
    }

    #[test]
    fn test_resolves_engine_specific_ids() {
        let resources = extract_resources(&project(), Some("prod"));
        let ids: Vec<_> = resources
            .iter()
            .map(|r| r.identity())
            .collect();
        assert_eq!(ids, vec![
            "application:a1",
            "compose:c1",
            "database:pg1",
            "database:my1",
            "database:~redis:broken"
        ]);
    }

    #[test]
    fn test_missing_database_id_is_not_actionable() {
        let resources = extract_resources(&project(), Some("prod"));
        let redis = resources.last().unwrap();
        assert_eq!(redis.kind(), ResourceKind::Database);
        assert_eq!(redis.native_id(), "");
        assert!(!redis.is_actionable());
    }

    #[test]
    fn test_limited_to_one_environment() {
        let resources = extract_resources(&project(), Some("staging"));
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].environment_id, "staging");
        assert_eq!(resources[0].project_id, "p1");
    }

    #[test]
    fn test_unknown_environment_uses_default() {
        let resources = extract_resources(&project(), Some("deleted"));
        assert_eq!(resources[0].environment_id, "prod");
        assert_eq!(extract_resources(&project(), None)[0].environment_id, "prod");
    }

    #[test]
    fn test_project_without_environments_is_empty() {
        let mut p = project();
        p.environments.clear();
        assert!(extract_resources(&p, None).is_empty());
    }
}
