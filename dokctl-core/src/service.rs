use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{ Map, Value, json };

use crate::error::ServiceError;
use crate::model::{
    Application,
    Compose,
    DatabaseEngine,
    DatabaseRecord,
    Deployment,
    Environment,
    Project,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// One request against the remote service. `payload` is sent as query
/// parameters for `Get` and as the JSON body otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub payload: Value,
}

impl ApiRequest {
    pub fn get(endpoint: impl Into<String>, payload: Value) -> Self {
        Self { method: Method::Get, endpoint: endpoint.into(), payload }
    }

    pub fn post(endpoint: impl Into<String>, payload: Value) -> Self {
        Self { method: Method::Post, endpoint: endpoint.into(), payload }
    }

    pub fn delete(endpoint: impl Into<String>, payload: Value) -> Self {
        Self { method: Method::Delete, endpoint: endpoint.into(), payload }
    }
}

/// The remote deployment platform, reduced to authenticated
/// request/response calls.
///
/// Implementations:
/// - `MemoryService`: in-process tree used for demo mode and tests
/// - `HttpResourceService` (cli crate): the real HTTP API
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// Short name shown in the header and logs
    fn name(&self) -> &str;

    async fn call(&self, request: ApiRequest) -> Result<Value, ServiceError>;
}

#[derive(Default)]
struct MemoryInner {
    projects: Vec<Project>,
    details: HashMap<String, Value>,
    deployments: HashMap<String, Vec<Deployment>>,
    failures: HashMap<String, ServiceError>,
    calls: Vec<ApiRequest>,
    latency: Duration,
    next_id: u64,
}

/// In-memory remote service. Actions mutate the stored tree so a later
/// `project.all` reflects them, the same way the real server does.
#[derive(Default)]
pub struct MemoryService {
    inner: Mutex<MemoryInner>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(projects: Vec<Project>) -> Self {
        let service = Self::new();
        service.set_projects(projects);
        service
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.inner.lock().latency = latency;
        self
    }

    pub fn set_projects(&self, projects: Vec<Project>) {
        self.inner.lock().projects = projects;
    }

    pub fn projects(&self) -> Vec<Project> {
        self.inner.lock().projects.clone()
    }

    /// Make every call to `endpoint` fail with `error` until `recover`.
    pub fn fail(&self, endpoint: &str, error: ServiceError) {
        self.inner.lock().failures.insert(endpoint.to_string(), error);
    }

    pub fn recover(&self, endpoint: &str) {
        self.inner.lock().failures.remove(endpoint);
    }

    /// Full detail returned by `{router}.one` for `id`.
    pub fn set_detail(&self, router: &str, id: &str, detail: Value) {
        self.inner.lock().details.insert(format!("{}:{}", router, id), detail);
    }

    pub fn set_deployments(&self, id: &str, deployments: Vec<Deployment>) {
        self.inner.lock().deployments.insert(id.to_string(), deployments);
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.inner.lock().calls.clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.inner
            .lock()
            .calls.iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    /// Seeded tree for `--demo`.
    pub fn demo() -> Self {
        let production = Environment {
            environment_id: "env-storefront-prod".into(),
            name: "production".into(),
            project_id: "prj-storefront".into(),
            is_default: true,
            applications: vec![
                demo_app("app-web", "web", "running"),
                demo_app("app-worker", "worker", "idle"),
                demo_app("app-checkout", "checkout-api", "error")
            ],
            compose: vec![Compose {
                compose_id: "cmp-monitoring".into(),
                name: "monitoring".into(),
                app_name: "monitoring-x81k".into(),
                compose_status: "done".into(),
                compose_type: Some("docker-compose".into()),
            }],
            postgres: vec![demo_db(DatabaseEngine::Postgres, "pg-orders", "orders-db", "done")],
            redis: vec![demo_db(DatabaseEngine::Redis, "rd-sessions", "sessions", "running")],
            ..Default::default()
        };
        let staging = Environment {
            environment_id: "env-storefront-staging".into(),
            name: "staging".into(),
            project_id: "prj-storefront".into(),
            applications: vec![demo_app("app-web-staging", "web", "idle")],
            mysql: vec![demo_db(DatabaseEngine::Mysql, "my-legacy", "legacy-catalog", "idle")],
            ..Default::default()
        };
        let tools = Environment {
            environment_id: "env-tools-prod".into(),
            name: "production".into(),
            project_id: "prj-tools".into(),
            is_default: true,
            applications: vec![demo_app("app-wiki", "wiki", "running")],
            mongo: vec![demo_db(DatabaseEngine::Mongo, "mg-wiki", "wiki-store", "running")],
            mariadb: vec![demo_db(DatabaseEngine::Mariadb, "ma-metrics", "metrics", "done")],
            ..Default::default()
        };

        let service = Self::with_projects(
            vec![
                Project {
                    project_id: "prj-storefront".into(),
                    name: "storefront".into(),
                    description: Some("Customer facing shop".into()),
                    created_at: Some("2026-03-02T09:14:00.000Z".into()),
                    environments: vec![production, staging],
                },
                Project {
                    project_id: "prj-tools".into(),
                    name: "internal-tools".into(),
                    description: None,
                    created_at: Some("2026-05-19T16:40:00.000Z".into()),
                    environments: vec![tools],
                }
            ]
        );
        service.set_detail(
            "application",
            "app-web",
            json!({
                "applicationId": "app-web",
                "name": "web",
                "appName": "web-3fa1",
                "description": "Storefront frontend",
                "applicationStatus": "running",
                "buildType": "nixpacks",
                "sourceType": "github",
                "env": "NODE_ENV=production\nPORT=3000",
                "replicas": 2,
                "domains": [
                    { "host": "shop.example.com", "path": "/", "port": 3000, "https": true, "certificateType": "letsencrypt" }
                ],
                "mounts": [],
                "ports": []
            })
        );
        service.set_deployments(
            "app-web",
            vec![
                demo_deployment("dep-2", "Deploy from main", "done", "2026-10-15T11:02:00.000Z"),
                demo_deployment("dep-1", "Initial deploy", "error", "2026-10-14T08:45:00.000Z")
            ]
        );
        service
    }
}

fn demo_app(id: &str, name: &str, status: &str) -> Application {
    Application {
        application_id: id.into(),
        name: name.into(),
        app_name: format!("{}-{}", name, &id[id.len().saturating_sub(4)..]),
        application_status: status.into(),
        build_type: Some("nixpacks".into()),
        source_type: Some("github".into()),
    }
}

fn demo_db(engine: DatabaseEngine, id: &str, name: &str, status: &str) -> DatabaseRecord {
    let mut fields = Map::new();
    fields.insert(engine.id_field().into(), Value::String(id.into()));
    DatabaseRecord {
        name: name.into(),
        app_name: format!("{}-{}", engine, name),
        application_status: status.into(),
        fields,
    }
}

fn demo_deployment(id: &str, title: &str, status: &str, at: &str) -> Deployment {
    Deployment {
        deployment_id: id.into(),
        title: Some(title.into()),
        status: status.into(),
        log_path: Some(format!("/etc/dokploy/logs/{}.log", id)),
        created_at: Some(at.into()),
    }
}

fn not_found(what: impl std::fmt::Display) -> ServiceError {
    ServiceError::status(404, format!("{} not found", what))
}

fn id_field_for(router: &str) -> Result<&'static str, ServiceError> {
    match router {
        "application" => Ok("applicationId"),
        "compose" => Ok("composeId"),
        other =>
            other
                .parse::<DatabaseEngine>()
                .map(|e| e.id_field())
                .map_err(|_| not_found(format!("router {}", other))),
    }
}

fn str_field<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ServiceError> {
    Ok(serde_json::to_value(value)?)
}

impl MemoryInner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn environments_mut(&mut self) -> impl Iterator<Item = &mut Environment> {
        self.projects.iter_mut().flat_map(|p| p.environments.iter_mut())
    }

    fn apply(&mut self, request: &ApiRequest) -> Result<Value, ServiceError> {
        let payload = &request.payload;
        let (router, op) = request.endpoint
            .split_once('.')
            .ok_or_else(|| not_found(format!("endpoint {}", request.endpoint)))?;

        match (router, op) {
            ("project", "all") => to_value(&self.projects),
            ("deployment", "all") => {
                let id = str_field(payload, "applicationId").unwrap_or_default();
                to_value(&self.deployments.get(id).cloned().unwrap_or_default())
            }
            ("deployment", "allByCompose") => {
                let id = str_field(payload, "composeId").unwrap_or_default();
                to_value(&self.deployments.get(id).cloned().unwrap_or_default())
            }
            ("domain", "create") => {
                let id = self.next_id("dom");
                Ok(json!({ "domainId": id, "host": payload.get("host") }))
            }
            (_, "create") => self.create(router, payload),
            (_, "one") => self.detail(router, payload),
            (_, "update" | "saveEnvironment") => {
                let id = str_field(payload, id_field_for(router)?).unwrap_or_default();
                let key = format!("{}:{}", router, id);
                let detail = self.details.entry(key).or_insert_with(|| json!({}));
                if let (Some(target), Some(source)) = (detail.as_object_mut(), payload.as_object()) {
                    for (k, v) in source {
                        target.insert(k.clone(), v.clone());
                    }
                }
                Ok(json!(true))
            }
            _ => self.mutate(router, op, payload),
        }
    }

    fn detail(&self, router: &str, payload: &Value) -> Result<Value, ServiceError> {
        let field = id_field_for(router)?;
        let id = str_field(payload, field).unwrap_or_default();
        if let Some(detail) = self.details.get(&format!("{}:{}", router, id)) {
            return Ok(detail.clone());
        }
        for env in self.projects.iter().flat_map(|p| p.environments.iter()) {
            let found = match router {
                "application" =>
                    env.applications
                        .iter()
                        .find(|a| a.application_id == id)
                        .map(to_value),
                "compose" =>
                    env.compose
                        .iter()
                        .find(|c| c.compose_id == id)
                        .map(to_value),
                other => {
                    let engine = other.parse::<DatabaseEngine>().map_err(not_found)?;
                    env.databases(engine)
                        .iter()
                        .find(|d| d.fields.get(field).and_then(Value::as_str) == Some(id))
                        .map(to_value)
                }
            };
            if let Some(value) = found {
                return value;
            }
        }
        Err(not_found(id))
    }

    fn create(&mut self, router: &str, payload: &Value) -> Result<Value, ServiceError> {
        let field = id_field_for(router)?;
        let name = str_field(payload, "name").unwrap_or_default().to_string();
        let env_id = str_field(payload, "environmentId").unwrap_or_default().to_string();
        let id = self.next_id(router);
        let env = self
            .environments_mut()
            .find(|e| e.environment_id == env_id)
            .ok_or_else(|| not_found(format!("environment {}", env_id)))?;

        match router {
            "application" => {
                let app = Application {
                    application_id: id,
                    app_name: name.clone(),
                    name,
                    application_status: "idle".into(),
                    ..Default::default()
                };
                env.applications.push(app.clone());
                to_value(&app)
            }
            "compose" => {
                let compose = Compose {
                    compose_id: id,
                    app_name: name.clone(),
                    name,
                    compose_status: "idle".into(),
                    compose_type: str_field(payload, "composeType").map(String::from),
                };
                env.compose.push(compose.clone());
                to_value(&compose)
            }
            other => {
                let engine = other.parse::<DatabaseEngine>().map_err(not_found)?;
                let mut fields = Map::new();
                fields.insert(field.into(), Value::String(id));
                let record = DatabaseRecord {
                    app_name: name.clone(),
                    name,
                    application_status: "idle".into(),
                    fields,
                };
                env.databases_mut(engine).push(record.clone());
                to_value(&record)
            }
        }
    }

    fn mutate(&mut self, router: &str, op: &str, payload: &Value) -> Result<Value, ServiceError> {
        let field = id_field_for(router)?;
        let id = str_field(payload, field).unwrap_or_default().to_string();
        let status = match op {
            "deploy" | "redeploy" | "reload" | "restart" | "start" => Some("running"),
            "stop" => Some("idle"),
            "delete" | "remove" => None,
            _ => {
                return Err(not_found(format!("endpoint {}.{}", router, op)));
            }
        };

        for env in self.environments_mut() {
            if mutate_in(env, router, field, &id, status) {
                return Ok(json!(true));
            }
        }
        Err(not_found(id))
    }
}

/// Sets the status of (or removes, when `status` is `None`) the matching
/// resource. Returns whether it was found.
fn mutate_in(
    env: &mut Environment,
    router: &str,
    field: &str,
    id: &str,
    status: Option<&str>
) -> bool {
    match router {
        "application" => {
            let Some(pos) = env.applications.iter().position(|a| a.application_id == id) else {
                return false;
            };
            match status {
                Some(s) => {
                    env.applications[pos].application_status = s.into();
                }
                None => {
                    env.applications.remove(pos);
                }
            }
            true
        }
        "compose" => {
            let Some(pos) = env.compose.iter().position(|c| c.compose_id == id) else {
                return false;
            };
            match status {
                Some(s) => {
                    env.compose[pos].compose_status = s.into();
                }
                None => {
                    env.compose.remove(pos);
                }
            }
            true
        }
        other => {
            let Ok(engine) = other.parse::<DatabaseEngine>() else {
                return false;
            };
            let list = env.databases_mut(engine);
            let Some(pos) = list
                .iter()
                .position(|d| d.fields.get(field).and_then(Value::as_str) == Some(id)) else {
                return false;
            };
            match status {
                Some(s) => {
                    list[pos].application_status = s.into();
                }
                None => {
                    list.remove(pos);
                }
            }
            true
        }
    }
}

#[async_trait]
impl ResourceService for MemoryService {
    fn name(&self) -> &str {
        "memory"
    }

    async fn call(&self, request: ApiRequest) -> Result<Value, ServiceError> {
        let latency = {
            let mut inner = self.inner.lock();
            inner.calls.push(request.clone());
            inner.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock();
        if let Some(err) = inner.failures.get(&request.endpoint) {
            return Err(err.clone());
        }
        inner.apply(&request)
    }
}
