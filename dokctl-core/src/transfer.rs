//! Export and import files.
//!
//! A file is a JSON document `{ version, type, schemaVersion, exportedAt, data }`
//! where `type` is `"application"` (data is one application definition) or
//! `"project"` (data holds parallel arrays of applications, compose stacks,
//! and databases).

use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };
use serde_json::{ Value, json };
use tracing::{ debug, info, warn };

use crate::api;
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::model::{ DatabaseEngine, Project, Resource, ResourceKind, nullable };
use crate::service::ResourceService;

pub const EXPORT_VERSION: &str = "1.0";
pub const SCHEMA_VERSION: &str = "2.0";

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid export file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid export file: {0}")]
    Invalid(String),
    #[error("Export failed: none of the {0} selected service(s) could be read")]
    NothingExported(usize),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Application,
    Project,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub version: String,
    #[serde(rename = "type")]
    pub kind: ExportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    pub exported_at: String,
    pub data: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DomainExport {
    pub host: String,
    pub path: Option<String>,
    pub port: Option<u32>,
    #[serde(deserialize_with = "nullable")]
    pub https: bool,
    pub certificate_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MountExport {
    #[serde(rename = "type")]
    pub kind: String,
    pub host_path: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub mount_path: String,
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortExport {
    pub published_port: u32,
    pub target_port: u32,
    pub protocol: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationExport {
    pub name: String,
    pub description: Option<String>,
    pub build_type: Option<String>,
    pub source_type: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub env: String,
    pub dockerfile: Option<String>,
    pub docker_image: Option<String>,
    pub replicas: Option<u32>,
    #[serde(deserialize_with = "nullable")]
    pub domains: Vec<DomainExport>,
    #[serde(deserialize_with = "nullable")]
    pub mounts: Vec<MountExport>,
    #[serde(deserialize_with = "nullable")]
    pub ports: Vec<PortExport>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComposeExport {
    pub name: String,
    pub description: Option<String>,
    pub compose_type: Option<String>,
    pub source_type: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub env: String,
    pub compose_file: Option<String>,
    pub compose_path: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub domains: Vec<DomainExport>,
    #[serde(deserialize_with = "nullable")]
    pub mounts: Vec<MountExport>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseExport {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub db_type: DatabaseEngine,
    #[serde(default, deserialize_with = "nullable")]
    pub env: String,
    #[serde(default)]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub database_user: Option<String>,
    #[serde(default)]
    pub external_port: Option<u32>,
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub memory_reservation: Option<Value>,
    #[serde(default)]
    pub memory_limit: Option<Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub mounts: Vec<MountExport>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectExport {
    pub name: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub applications: Vec<ApplicationExport>,
    #[serde(deserialize_with = "nullable")]
    pub compose: Vec<ComposeExport>,
    #[serde(deserialize_with = "nullable")]
    pub databases: Vec<DatabaseExport>,
}

/// One creatable entry read from an import file.
#[derive(Clone, Debug, PartialEq)]
pub enum ImportItem {
    Application(ApplicationExport),
    Compose(ComposeExport),
    Database(DatabaseExport),
}

impl ImportItem {
    pub fn name(&self) -> &str {
        match self {
            ImportItem::Application(a) => &a.name,
            ImportItem::Compose(c) => &c.name,
            ImportItem::Database(d) => &d.name,
        }
    }

    pub fn kind_tag(&self) -> &'static str {
        match self {
            ImportItem::Application(_) => ResourceKind::Application.as_str(),
            ImportItem::Compose(_) => ResourceKind::Compose.as_str(),
            ImportItem::Database(d) => d.db_type.as_str(),
        }
    }
}

/// Parsed import file.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportPlan {
    pub kind: ExportKind,
    pub source_name: String,
    pub items: Vec<ImportItem>,
}

/// Where imported resources are created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportTarget {
    pub project_id: String,
    pub environment_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Created and every follow-up setting applied
    Configured,
    /// Created, but a later configuration call failed; the resource is left in place
    Partial(String),
    Failed(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub outcomes: Vec<(String, ItemOutcome)>,
}

impl ImportReport {
    /// Items that exist remotely afterwards, fully configured or not.
    pub fn imported(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, ItemOutcome::Failed(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.imported()
    }

    pub fn partial(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Partial(_)))
            .count()
    }

    /// `Imported 2 service(s), 1 failed (1 partially configured)`
    pub fn message(&self) -> String {
        let mut text = format!("Imported {} service(s)", self.imported());
        if self.failed() > 0 {
            text.push_str(&format!(", {} failed", self.failed()));
        }
        if self.partial() > 0 {
            text.push_str(&format!(" ({} partially configured)", self.partial()));
        }
        text
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportReport {
    pub file: ExportFile,
    pub exported: usize,
    pub failed: usize,
}

impl ExportReport {
    pub fn message(&self, path: &Path) -> String {
        let mut text = format!("Exported {} service(s) to {}", self.exported, path.display());
        if self.failed > 0 {
            text.push_str(&format!(", {} failed", self.failed));
        }
        text
    }
}

/// Drops `null` members so optional settings are omitted from requests.
fn compact(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.retain(|_, v| !v.is_null());
    }
    value
}

fn database_export(engine: DatabaseEngine, mut detail: Value) -> Result<DatabaseExport, ServiceError> {
    if let Value::Object(map) = &mut detail {
        map.insert("dbType".into(), json!(engine));
    }
    Ok(serde_json::from_value(detail)?)
}

/// Fetches full detail for each resource and assembles a project export.
/// A resource whose detail cannot be read is counted as failed and skipped.
pub async fn build_export(
    service: &dyn ResourceService,
    clock: &dyn Clock,
    project: &Project,
    resources: &[Resource]
) -> Result<ExportReport, TransferError> {
    let mut data = ProjectExport {
        name: project.name.clone(),
        description: project.description.clone(),
        ..Default::default()
    };
    let mut failed = 0;

    for resource in resources {
        let detail = match api::fetch_detail(service, resource).await {
            Ok(detail) => detail,
            Err(err) => {
                warn!(resource = %resource.identity(), error = %err, "export: detail fetch failed");
                failed += 1;
                continue;
            }
        };
        let converted = match resource.engine() {
            Some(engine) => database_export(engine, detail).map(|d| data.databases.push(d)),
            None if resource.kind() == ResourceKind::Compose =>
                serde_json::from_value(detail)
                    .map(|c| data.compose.push(c))
                    .map_err(ServiceError::from),
            None =>
                serde_json::from_value(detail)
                    .map(|a| data.applications.push(a))
                    .map_err(ServiceError::from),
        };
        if let Err(err) = converted {
            warn!(resource = %resource.identity(), error = %err, "export: unreadable detail");
            failed += 1;
        }
    }

    let exported = resources.len() - failed;
    if exported == 0 {
        return Err(TransferError::NothingExported(resources.len()));
    }
    debug!(exported, failed, "export assembled");

    Ok(ExportReport {
        file: ExportFile {
            version: EXPORT_VERSION.into(),
            kind: ExportKind::Project,
            schema_version: Some(SCHEMA_VERSION.into()),
            exported_at: clock.now_rfc3339(),
            data: serde_json::to_value(&data).map_err(ServiceError::from)?,
        },
        exported,
        failed,
    })
}

pub async fn write_export(path: &Path, file: &ExportFile) -> Result<(), TransferError> {
    let text = serde_json::to_string_pretty(file)?;
    tokio::fs::write(path, text).await.map_err(|source| TransferError::Io {
        action: "write",
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_import(text: &str) -> Result<ImportPlan, TransferError> {
    let file: ExportFile = serde_json::from_str(text)?;
    if file.version.trim().is_empty() {
        return Err(TransferError::Invalid("missing version".into()));
    }

    match file.kind {
        ExportKind::Application => {
            let app: ApplicationExport = serde_json::from_value(file.data)?;
            if app.name.is_empty() {
                return Err(TransferError::Invalid("application has no name".into()));
            }
            Ok(ImportPlan {
                kind: ExportKind::Application,
                source_name: app.name.clone(),
                items: vec![ImportItem::Application(app)],
            })
        }
        ExportKind::Project => {
            let project: ProjectExport = serde_json::from_value(file.data)?;
            let items = project.applications
                .into_iter()
                .map(ImportItem::Application)
                .chain(project.compose.into_iter().map(ImportItem::Compose))
                .chain(project.databases.into_iter().map(ImportItem::Database))
                .collect();
            Ok(ImportPlan { kind: ExportKind::Project, source_name: project.name, items })
        }
    }
}

pub async fn read_import(path: &Path) -> Result<ImportPlan, TransferError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|source| TransferError::Io {
        action: "read",
        path: path.to_path_buf(),
        source,
    })?;
    parse_import(&text)
}

async fn configure_domains(
    service: &dyn ResourceService,
    owner_field: &str,
    owner_id: &str,
    domains: &[DomainExport]
) -> Result<(), ServiceError> {
    for domain in domains {
        let mut payload = compact(serde_json::to_value(domain)?);
        if let Value::Object(map) = &mut payload {
            map.insert(owner_field.into(), json!(owner_id));
        }
        api::post(service, "domain.create", payload).await?;
    }
    Ok(())
}

async fn import_application(
    service: &dyn ResourceService,
    target: &ImportTarget,
    app: &ApplicationExport
) -> ItemOutcome {
    let create = compact(
        json!({
        "projectId": target.project_id,
        "environmentId": target.environment_id,
        "name": app.name,
        "description": app.description,
    })
    );
    let id = match api::create(service, "application", "applicationId", create).await {
        Ok(id) => id,
        Err(err) => {
            return ItemOutcome::Failed(err.to_string());
        }
    };

    let configure = async {
        let update = compact(
            json!({
            "applicationId": id,
            "buildType": app.build_type,
            "sourceType": app.source_type,
            "replicas": app.replicas,
            "dockerImage": app.docker_image,
            "dockerfile": app.dockerfile,
        })
        );
        api::post(service, "application.update", update).await?;
        if !app.env.is_empty() {
            api::post(
                service,
                "application.saveEnvironment",
                json!({ "applicationId": id, "env": app.env })
            ).await?;
        }
        configure_domains(service, "applicationId", &id, &app.domains).await
    };
    match configure.await {
        Ok(()) => ItemOutcome::Configured,
        Err(err) => ItemOutcome::Partial(err.to_string()),
    }
}

async fn import_compose(
    service: &dyn ResourceService,
    target: &ImportTarget,
    compose: &ComposeExport
) -> ItemOutcome {
    let create = compact(
        json!({
        "projectId": target.project_id,
        "environmentId": target.environment_id,
        "name": compose.name,
        "description": compose.description,
        "composeType": compose.compose_type,
    })
    );
    let id = match api::create(service, "compose", "composeId", create).await {
        Ok(id) => id,
        Err(err) => {
            return ItemOutcome::Failed(err.to_string());
        }
    };

    let env = (!compose.env.is_empty()).then(|| compose.env.clone());
    let configure = async {
        let update = compact(
            json!({
            "composeId": id,
            "sourceType": compose.source_type,
            "composeFile": compose.compose_file,
            "composePath": compose.compose_path,
            "env": env,
        })
        );
        api::post(service, "compose.update", update).await?;
        configure_domains(service, "composeId", &id, &compose.domains).await
    };
    match configure.await {
        Ok(()) => ItemOutcome::Configured,
        Err(err) => ItemOutcome::Partial(err.to_string()),
    }
}

async fn import_database(
    service: &dyn ResourceService,
    target: &ImportTarget,
    db: &DatabaseExport
) -> ItemOutcome {
    let engine = db.db_type;
    let create = compact(
        json!({
        "projectId": target.project_id,
        "environmentId": target.environment_id,
        "name": db.name,
        "description": db.description,
        "dockerImage": db.docker_image,
        "databaseName": db.database_name,
        "databaseUser": db.database_user,
    })
    );
    let id = match api::create(service, engine.as_str(), engine.id_field(), create).await {
        Ok(id) => id,
        Err(err) => {
            return ItemOutcome::Failed(err.to_string());
        }
    };

    let configure = async {
        let update = compact(
            json!({
            (engine.id_field()): id,
            "externalPort": db.external_port,
            "replicas": db.replicas,
            "memoryReservation": db.memory_reservation,
            "memoryLimit": db.memory_limit,
        })
        );
        if update.as_object().is_some_and(|m| m.len() > 1) {
            api::post(service, &format!("{}.update", engine), update).await?;
        }
        if !db.env.is_empty() {
            api::post(
                service,
                &format!("{}.saveEnvironment", engine),
                json!({ (engine.id_field()): id, "env": db.env })
            ).await?;
        }
        Ok::<(), ServiceError>(())
    };
    match configure.await {
        Ok(()) => ItemOutcome::Configured,
        Err(err) => ItemOutcome::Partial(err.to_string()),
    }
}

/// Creates each item in order. Failures are counted per item and never
/// undo earlier successes.
pub async fn import_items(
    service: &dyn ResourceService,
    target: &ImportTarget,
    items: &[ImportItem]
) -> ImportReport {
    let mut report = ImportReport::default();
    for item in items {
        let outcome = match item {
            ImportItem::Application(app) => import_application(service, target, app).await,
            ImportItem::Compose(compose) => import_compose(service, target, compose).await,
            ImportItem::Database(db) => import_database(service, target, db).await,
        };
        match &outcome {
            ItemOutcome::Configured => info!(name = item.name(), kind = item.kind_tag(), "imported"),
            ItemOutcome::Partial(reason) =>
                warn!(name = item.name(), %reason, "imported but not fully configured"),
            ItemOutcome::Failed(reason) => warn!(name = item.name(), %reason, "import failed"),
        }
        report.outcomes.push((item.name().to_string(), outcome));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::extract::extract_resources;
    use crate::service::MemoryService;

    fn target() -> ImportTarget {
        ImportTarget {
            project_id: "prj-tools".into(),
            environment_id: "env-tools-prod".into(),
        }
    }

    fn project_file() -> String {
        json!({
            "version": "1.0",
            "type": "project",
            "schemaVersion": "2.0",
            "exportedAt": "2026-10-16T08:00:00.000Z",
            "data": {
                "name": "storefront",
                "applications": [
                    { "name": "web", "env": "A=1", "domains": [{ "host": "a.example.com", "https": true }] },
                    { "name": "worker", "env": null },
                    { "name": "cron" }
                ],
                "databases": [{ "name": "orders-db", "dbType": "postgres", "databaseName": "orders" }]
            }
        }).to_string()
    }

    #[test]
    fn test_parse_project_file_lists_all_items() {
        let plan = parse_import(&project_file()).unwrap();
        assert_eq!(plan.kind, ExportKind::Project);
        assert_eq!(plan.source_name, "storefront");
        let tags: Vec<_> = plan.items
            .iter()
            .map(|i| (i.name(), i.kind_tag()))
            .collect();
        assert_eq!(tags, vec![
            ("web", "application"),
            ("worker", "application"),
            ("cron", "application"),
            ("orders-db", "postgres")
        ]);
    }

    #[test]
    fn test_parse_rejects_malformed_files() {
        assert!(matches!(parse_import("{ nope"), Err(TransferError::Parse(_))));
        let no_version = json!({ "version": "", "type": "application", "exportedAt": "", "data": { "name": "x" } });
        assert!(matches!(parse_import(&no_version.to_string()), Err(TransferError::Invalid(_))));
        let bad_type = json!({ "version": "1.0", "type": "cluster", "exportedAt": "", "data": {} });
        assert!(parse_import(&bad_type.to_string()).is_err());
    }

    #[tokio::test]
    async fn test_partial_batch_failure_is_counted_not_rolled_back() {
        let service = MemoryService::demo();
        service.fail("postgres.create", ServiceError::status(500, "database quota reached"));
        let plan = parse_import(&project_file()).unwrap();
        let selected = vec![plan.items[0].clone(), plan.items[3].clone()];

        let report = import_items(&service, &target(), &selected).await;

        assert_eq!(report.message(), "Imported 1 service(s), 1 failed");
        let env = &service.projects()[1].environments[0];
        assert!(env.applications.iter().any(|a| a.name == "web"));
        assert_eq!(service.calls_to("domain.create"), 1);
    }

    #[tokio::test]
    async fn test_configure_failure_reports_partial() {
        let service = MemoryService::demo();
        service.fail("application.saveEnvironment", ServiceError::status(400, "bad env"));
        let plan = parse_import(&project_file()).unwrap();

        let report = import_items(&service, &target(), &plan.items[..1]).await;

        assert_eq!(report.outcomes[0].1, ItemOutcome::Partial("bad env".into()));
        assert_eq!(report.message(), "Imported 1 service(s) (1 partially configured)");
        assert_eq!(service.calls_to("domain.create"), 0);
    }

    #[tokio::test]
    async fn test_export_counts_failures_and_writes_file() {
        let service = MemoryService::demo();
        let project = service.projects()[0].clone();
        let resources = extract_resources(&project, None);
        service.fail("compose.one", ServiceError::Transport("timeout".into()));
        let clock = ManualClock::new(0);

        let report = build_export(&service, &clock, &project, &resources).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.exported, resources.len() - 1);
        assert_eq!(report.file.kind, ExportKind::Project);
        assert_eq!(report.file.data["applications"][0]["env"], "NODE_ENV=production\nPORT=3000");
        assert_eq!(report.file.data["databases"][0]["dbType"], "postgres");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storefront-export.json");
        write_export(&path, &report.file).await.unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["version"], "1.0");
        assert_eq!(written["type"], "project");
        assert_eq!(written["exportedAt"], "1970-01-01T00:00:00.000Z");
        assert_eq!(read_import(&path).await.unwrap().items.len(), report.exported);
    }

    #[tokio::test]
    async fn test_export_with_every_item_failing_writes_nothing() {
        let service = MemoryService::demo();
        let project = service.projects()[1].clone();
        let resources = extract_resources(&project, None);
        for endpoint in ["application.one", "mongo.one", "mariadb.one"] {
            service.fail(endpoint, ServiceError::Transport("down".into()));
        }

        let err = build_export(&service, &ManualClock::new(0), &project, &resources).await.unwrap_err();
        assert!(matches!(err, TransferError::NothingExported(3)));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let err = read_import(Path::new("/nonexistent/dokctl-export.json")).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to read /nonexistent/dokctl-export.json"));
    }
}
