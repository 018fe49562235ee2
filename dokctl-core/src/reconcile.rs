//! Re-binding the operator's selection to freshly fetched data.
//!
//! After every refresh the active project, environment, and resource are
//! looked up again by identifier in the new tree. A hit replaces the stale
//! object with the fresh one; a miss falls back to a fixed default (first
//! project, default environment, first resource) or to nothing. Selection
//! therefore either points at live data or is empty.

use crate::extract::{ extract_environment, select_environment };
use crate::model::{ Application, Environment, Project, Resource };

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    pub project: Option<Project>,
    pub environment: Option<Environment>,
    pub resource: Option<Resource>,
    /// Mirrors `resource` when it is an application, otherwise empty.
    pub application: Option<Application>,
}

/// Previous project by id, else `preferred` (only when nothing was
/// selected before), else the first project.
pub fn reconcile_project(
    previous: Option<&Project>,
    projects: &[Project],
    preferred: Option<&str>
) -> Option<Project> {
    let by_id = |id: &str| projects.iter().find(|p| p.project_id == id);
    let found = match previous {
        Some(prev) => by_id(&prev.project_id),
        None => preferred.and_then(by_id),
    };
    found.or_else(|| projects.first()).cloned()
}

/// Previous environment by id, else the project's default.
pub fn reconcile_environment(
    previous: Option<&Environment>,
    project: &Project
) -> Option<Environment> {
    select_environment(
        project,
        previous.map(|e| e.environment_id.as_str())
    ).cloned()
}

/// Previous resource by derived identity, else the first, else none.
pub fn reconcile_resource(previous: Option<&Resource>, resources: &[Resource]) -> Option<Resource> {
    let identity = previous.map(Resource::identity);
    identity
        .and_then(|id| resources.iter().find(|r| r.identity() == id))
        .or_else(|| resources.first())
        .cloned()
}

impl Selection {
    /// Runs project, then environment, then resource reconciliation
    /// against `projects`. Returns the new selection and the resource list
    /// of the selected environment.
    pub fn reconcile(
        &self,
        projects: &[Project],
        preferred_project: Option<&str>
    ) -> (Selection, Vec<Resource>) {
        let Some(project) = reconcile_project(self.project.as_ref(), projects, preferred_project) else {
            return (Selection::default(), Vec::new());
        };
        self.rebind(project)
    }

    /// Reconciles environment and resource within an already chosen project.
    pub fn rebind(&self, project: Project) -> (Selection, Vec<Resource>) {
        let same_project = self.project
            .as_ref()
            .is_some_and(|p| p.project_id == project.project_id);
        let previous_env = self.environment.as_ref().filter(|_| same_project);
        let environment = reconcile_environment(previous_env, &project);

        let resources = environment
            .as_ref()
            .map(|env| extract_environment(&project.project_id, env))
            .unwrap_or_default();
        let resource = reconcile_resource(self.resource.as_ref(), &resources);

        let selection = Selection {
            project: Some(project),
            environment,
            resource: None,
            application: None,
        }.with_resource(resource);
        (selection, resources)
    }

    /// Same project, explicit environment. The resource falls back to the
    /// first of the new environment unless it also lives there.
    pub fn with_environment(&self, environment_id: &str) -> (Selection, Vec<Resource>) {
        let Some(project) = &self.project else {
            return (self.clone(), Vec::new());
        };
        let environment = select_environment(project, Some(environment_id)).cloned();
        let resources = environment
            .as_ref()
            .map(|env| extract_environment(&project.project_id, env))
            .unwrap_or_default();
        let resource = reconcile_resource(self.resource.as_ref(), &resources);

        let selection = Selection {
            project: self.project.clone(),
            environment,
            resource: None,
            application: None,
        }.with_resource(resource);
        (selection, resources)
    }

    pub fn with_resource(mut self, resource: Option<Resource>) -> Selection {
        self.application = resource
            .as_ref()
            .and_then(Resource::as_application)
            .cloned();
        self.resource = resource;
        self
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.project_id.as_str())
    }

    pub fn environment_id(&self) -> Option<&str> {
        self.environment.as_ref().map(|e| e.environment_id.as_str())
    }

    pub fn resource_identity(&self) -> Option<String> {
        self.resource.as_ref().map(Resource::identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ Compose, ResourcePayload };

    fn app(id: &str, status: &str) -> Application {
        Application {
            application_id: id.into(),
            name: format!("app-{}", id),
            application_status: status.into(),
            ..Default::default()
        }
    }

    fn env(id: &str, default: bool, apps: Vec<Application>) -> Environment {
        Environment {
            environment_id: id.into(),
            name: id.into(),
            is_default: default,
            applications: apps,
            ..Default::default()
        }
    }

    fn project(id: &str, envs: Vec<Environment>) -> Project {
        Project {
            project_id: id.into(),
            name: id.into(),
            description: None,
            created_at: None,
            environments: envs,
        }
    }

    #[test]
    fn test_identity_stability_picks_fresh_object() {
        let before = vec![project("p", vec![env("e", true, vec![app("a", "idle"), app("b", "idle")])])];
        let (selection, _) = Selection::default().reconcile(&before, None);
        let (selection, resources) = selection.with_environment("e");
        let selection = selection.with_resource(resources.get(1).cloned());

        let after = vec![project("p", vec![env("e", true, vec![app("a", "idle"), app("b", "running")])])];
        let (next, _) = selection.reconcile(&after, None);

        assert_eq!(next.resource.as_ref().unwrap().identity(), "application:b");
        assert_eq!(next.resource.as_ref().unwrap().status(), "running");
        assert_eq!(next.application.unwrap().application_status, "running");
    }

    #[test]
    fn test_deleted_resource_falls_back_to_first() {
        let before = vec![
            project("p", vec![env("e", true, vec![app("x", "idle"), app("y", "idle"), app("z", "idle")])])
        ];
        let (selection, _) = Selection::default().reconcile(&before, None);
        assert_eq!(selection.resource_identity().as_deref(), Some("application:x"));

        let after = vec![project("p", vec![env("e", true, vec![app("y", "idle"), app("z", "idle")])])];
        let (next, resources) = selection.reconcile(&after, None);

        assert_eq!(resources.len(), 2);
        assert_eq!(next.resource_identity().as_deref(), Some("application:y"));
    }

    #[test]
    fn test_empty_list_clears_resource_and_application() {
        let before = vec![project("p", vec![env("e", true, vec![app("x", "idle")])])];
        let (selection, _) = Selection::default().reconcile(&before, None);

        let after = vec![project("p", vec![env("e", true, vec![])])];
        let (next, _) = selection.reconcile(&after, None);

        assert!(next.resource.is_none());
        assert!(next.application.is_none());
        assert_eq!(next.environment_id(), Some("e"));
    }

    #[test]
    fn test_environment_kept_by_id_else_default() {
        let projects = vec![
            project("p", vec![env("prod", true, vec![app("a", "idle")]), env("dev", false, vec![app("d", "idle")])])
        ];
        let (selection, _) = Selection::default().reconcile(&projects, None);
        let (selection, _) = selection.with_environment("dev");

        let (kept, _) = selection.reconcile(&projects, None);
        assert_eq!(kept.environment_id(), Some("dev"));

        let without_dev = vec![project("p", vec![env("prod", true, vec![app("a", "idle")])])];
        let (fallback, _) = selection.reconcile(&without_dev, None);
        assert_eq!(fallback.environment_id(), Some("prod"));
        assert_eq!(fallback.resource_identity().as_deref(), Some("application:a"));
    }

    #[test]
    fn test_removed_project_falls_back_to_first() {
        let projects = vec![project("a", vec![]), project("b", vec![])];
        let (selection, _) = Selection::default().reconcile(&projects, Some("b"));
        assert_eq!(selection.project_id(), Some("b"));

        let (next, _) = selection.reconcile(&projects[..1], Some("b"));
        assert_eq!(next.project_id(), Some("a"));
        assert!(next.environment.is_none());

        let (empty, resources) = next.reconcile(&[], None);
        assert_eq!(empty, Selection::default());
        assert!(resources.is_empty());
    }

    #[test]
    fn test_identity_distinguishes_kinds() {
        let resources = vec![
            Resource {
                project_id: "p".into(),
                environment_id: "e".into(),
                payload: ResourcePayload::Compose(Compose {
                    compose_id: "same".into(),
                    name: "stack".into(),
                    ..Default::default()
                }),
            },
            Resource {
                project_id: "p".into(),
                environment_id: "e".into(),
                payload: ResourcePayload::Application(app("same", "idle")),
            }
        ];
        let picked = reconcile_resource(Some(&resources[1]), &resources).unwrap();
        assert_eq!(picked.identity(), "application:same");
    }
}
