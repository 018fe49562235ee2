//! Typed operations over a [`ResourceService`].
//!
//! Endpoint names and identifier fields are chosen here and nowhere else.

use serde::de::DeserializeOwned;
use serde_json::{ Map, Value, json };
use tracing::debug;

use crate::error::ServiceError;
use crate::model::{ ActionVerb, Deployment, Project, Resource, ResourceKind };
use crate::service::{ ApiRequest, ResourceService };

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ServiceError> {
    Ok(serde_json::from_value(value)?)
}

fn id_payload(resource: &Resource) -> Value {
    let mut map = Map::new();
    map.insert(resource.id_field().into(), Value::String(resource.native_id().to_string()));
    Value::Object(map)
}

pub async fn fetch_projects(service: &dyn ResourceService) -> Result<Vec<Project>, ServiceError> {
    let value = service.call(ApiRequest::get("project.all", json!({}))).await?;
    decode(value)
}

pub fn detail_request(resource: &Resource) -> ApiRequest {
    ApiRequest::get(format!("{}.one", resource.router()), id_payload(resource))
}

pub async fn fetch_detail(
    service: &dyn ResourceService,
    resource: &Resource
) -> Result<Value, ServiceError> {
    if !resource.is_actionable() {
        return Err(ServiceError::MissingId(resource.name().to_string()));
    }
    service.call(detail_request(resource)).await
}

/// The remote operation name for `verb` on this kind of resource.
fn operation(kind: ResourceKind, verb: ActionVerb) -> &'static str {
    match (kind, verb) {
        (_, ActionVerb::Deploy) => "deploy",
        (_, ActionVerb::Start) => "start",
        (_, ActionVerb::Stop) => "stop",
        (ResourceKind::Application, ActionVerb::Restart) => "restart",
        (ResourceKind::Compose, ActionVerb::Restart) => "redeploy",
        (ResourceKind::Database, ActionVerb::Restart) => "reload",
        (ResourceKind::Application, ActionVerb::Delete) => "delete",
        (ResourceKind::Compose | ResourceKind::Database, ActionVerb::Delete) => "remove",
    }
}

pub fn action_request(resource: &Resource, verb: ActionVerb) -> ApiRequest {
    let endpoint = format!("{}.{}", resource.router(), operation(resource.kind(), verb));
    let payload = id_payload(resource);
    match (resource.kind(), verb) {
        (ResourceKind::Application, ActionVerb::Delete) => ApiRequest::delete(endpoint, payload),
        _ => ApiRequest::post(endpoint, payload),
    }
}

pub async fn dispatch_action(
    service: &dyn ResourceService,
    resource: &Resource,
    verb: ActionVerb
) -> Result<(), ServiceError> {
    if !resource.is_actionable() {
        return Err(ServiceError::MissingId(resource.name().to_string()));
    }
    let request = action_request(resource, verb);
    debug!(endpoint = %request.endpoint, id = resource.native_id(), "dispatching action");
    service.call(request).await?;
    Ok(())
}

/// Deployment history only exists for applications and compose stacks.
pub fn deployments_request(resource: &Resource) -> Option<ApiRequest> {
    match resource.kind() {
        ResourceKind::Application =>
            Some(ApiRequest::post("deployment.all", id_payload(resource))),
        ResourceKind::Compose =>
            Some(ApiRequest::get("deployment.allByCompose", id_payload(resource))),
        ResourceKind::Database => None,
    }
}

pub async fn fetch_deployments(
    service: &dyn ResourceService,
    resource: &Resource
) -> Result<Vec<Deployment>, ServiceError> {
    match deployments_request(resource) {
        Some(request) => decode(service.call(request).await?),
        None => Ok(Vec::new()),
    }
}

/// Creates a resource under `router` and returns the new identifier, read
/// from `id_field` of the response.
pub async fn create(
    service: &dyn ResourceService,
    router: &str,
    id_field: &str,
    payload: Value
) -> Result<String, ServiceError> {
    let created = service.call(ApiRequest::post(format!("{}.create", router), payload)).await?;
    created
        .get(id_field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ServiceError::Decode(format!("{}.create returned no {}", router, id_field)))
}

pub async fn post(
    service: &dyn ResourceService,
    endpoint: &str,
    payload: Value
) -> Result<Value, ServiceError> {
    service.call(ApiRequest::post(endpoint, payload)).await
}
