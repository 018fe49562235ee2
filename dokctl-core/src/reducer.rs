use std::sync::Arc;
use std::sync::atomic::{ AtomicU64, Ordering };
use std::time::SystemTime;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::cache::ResourceSnapshot;
use crate::model::{ Deployment, Project };
use crate::reconcile::{ Selection, reconcile_resource };
use crate::state::{
    Activity,
    AppState,
    DetailState,
    Outcome,
    Panel,
    PendingConfirm,
    ServerSelector,
};
use crate::wizard::{ ExportWizard, ImportWizard };

#[derive(Clone, Debug)]
pub enum StateEvent {
    /// Active server replaced; everything fetched from the old one is dropped
    ServerChanged {
        alias: String,
        service_name: String,
    },
    FetchStarted,
    /// Project tree for `alias`; ignored if the active server changed since
    ProjectsLoaded {
        alias: String,
        projects: Vec<Project>,
        preferred_project: Option<String>,
        synced_at: Option<i64>,
    },
    /// Cached resource list, applied only while its project is selected
    ResourcesRestored {
        alias: String,
        project_id: String,
        snapshot: ResourceSnapshot,
    },
    FetchFailed {
        alias: String,
        message: String,
    },

    SelectProject {
        project_id: String,
    },
    SelectEnvironment {
        environment_id: String,
    },
    SelectResource {
        identity: String,
    },
    SetPanel(Panel),

    /// Ignored while another action is running
    ActionStarted {
        label: String,
    },
    ActionSettled {
        text: String,
        outcome: Outcome,
    },
    /// Ends a running activity without leaving a message
    ActionFinished,
    /// Clears the settled message only if it is still the one from `seq`
    MessageExpired {
        seq: u64,
    },
    /// Transient message outside of an action; dropped while one is running
    Notify {
        text: String,
        outcome: Outcome,
    },

    ConfirmRequested(PendingConfirm),
    ConfirmResolved,

    SearchStarted,
    SearchUpdated {
        query: String,
    },
    SearchCommitted,
    SearchStopped,

    ExportChanged(Option<ExportWizard>),
    ImportChanged(Option<ImportWizard>),
    DetailChanged(Option<DetailState>),
    ServerSelectorChanged(Option<ServerSelector>),

    LogsToggled,
    DeploymentsLoaded {
        identity: String,
        deployments: Vec<Deployment>,
    },
    AutoRefreshChanged {
        enabled: bool,
        interval_ms: u64,
    },
}

#[derive(Clone, Debug)]
pub struct EventEnvelope {
    pub id: u64,
    pub at: SystemTime,
    pub event: StateEvent,
}

/// Keeps the selected resource visible after the filter changes.
fn reselect_visible(next: &mut AppState) {
    let visible = next.visible_resources();
    if visible.is_empty() {
        return;
    }
    let resource = reconcile_resource(next.selection.resource.as_ref(), &visible);
    next.selection = next.selection.clone().with_resource(resource);
}

/// Returns the state after applying `env`. `state` is never modified.
pub fn reduce(state: &AppState, env: &EventEnvelope) -> AppState {
    let mut next = state.clone();

    match &env.event {
        StateEvent::ServerChanged { alias, service_name } => {
            next = AppState {
                server_alias: alias.clone(),
                service_name: service_name.clone(),
                panel: state.panel,
                auto_refresh: state.auto_refresh,
                refresh_interval_ms: state.refresh_interval_ms,
                show_logs: state.show_logs,
                activity: state.activity.clone(),
                ..Default::default()
            };
        }
        StateEvent::FetchStarted => {
            next.loading = true;
        }
        StateEvent::ProjectsLoaded { alias, projects, preferred_project, synced_at } => {
            if *alias != state.server_alias {
                return next;
            }
            let (selection, resources) = state.selection.reconcile(
                projects,
                preferred_project.as_deref()
            );
            next.projects = projects.clone();
            next.selection = selection;
            next.resources = resources;
            next.loading = false;
            next.error = None;
            if synced_at.is_some() {
                next.last_synced = *synced_at;
            }
            if next.detail.as_ref().is_some_and(|d| Some(d.resource.identity()) != next.selection.resource_identity()) {
                next.detail = None;
            }
        }
        StateEvent::ResourcesRestored { alias, project_id, snapshot } => {
            if *alias != state.server_alias || state.selection.project_id() != Some(project_id.as_str()) {
                return next;
            }
            let Some(project) = state.selection.project.clone() else {
                return next;
            };
            let env_id = snapshot.environment_id.as_str();
            let environment = project.environment(env_id).cloned();
            if environment.is_none() {
                return next;
            }
            let resource = reconcile_resource(state.selection.resource.as_ref(), &snapshot.resources);
            next.selection = Selection {
                project: Some(project),
                environment,
                resource: None,
                application: None,
            }.with_resource(resource);
            next.resources = snapshot.resources.clone();
        }
        StateEvent::FetchFailed { alias, message } => {
            if *alias == state.server_alias {
                next.loading = false;
                next.error = Some(message.clone());
            }
        }

        StateEvent::SelectProject { project_id } => {
            if let Some(project) = state.projects.iter().find(|p| &p.project_id == project_id) {
                let (selection, resources) = state.selection.rebind(project.clone());
                next.selection = selection;
                next.resources = resources;
                next.detail = None;
                next.deployments.clear();
            }
        }
        StateEvent::SelectEnvironment { environment_id } => {
            let (selection, resources) = state.selection.with_environment(environment_id);
            next.selection = selection;
            next.resources = resources;
            next.deployments.clear();
        }
        StateEvent::SelectResource { identity } => {
            if let Some(resource) = state.resources.iter().find(|r| &r.identity() == identity) {
                next.selection = state.selection.clone().with_resource(Some(resource.clone()));
                if state.selection.resource_identity().as_ref() != Some(identity) {
                    next.deployments.clear();
                }
            }
        }
        StateEvent::SetPanel(panel) => {
            next.panel = *panel;
        }

        StateEvent::ActionStarted { label } => {
            if !state.is_running() {
                next.activity = Activity::Running { label: label.clone() };
            }
        }
        StateEvent::ActionSettled { text, outcome } => {
            next.activity = Activity::Settled {
                text: text.clone(),
                outcome: *outcome,
                seq: env.id,
            };
        }
        StateEvent::ActionFinished => {
            if state.is_running() {
                next.activity = Activity::Idle;
            }
        }
        StateEvent::MessageExpired { seq } => {
            if matches!(&state.activity, Activity::Settled { seq: current, .. } if current == seq) {
                next.activity = Activity::Idle;
            }
        }
        StateEvent::Notify { text, outcome } => {
            if !state.is_running() {
                next.activity = Activity::Settled {
                    text: text.clone(),
                    outcome: *outcome,
                    seq: env.id,
                };
            }
        }

        StateEvent::ConfirmRequested(confirm) => {
            next.pending_confirm = Some(confirm.clone());
        }
        StateEvent::ConfirmResolved => {
            next.pending_confirm = None;
        }

        StateEvent::SearchStarted => {
            next.search.active = true;
            next.search.query.clear();
        }
        StateEvent::SearchUpdated { query } => {
            next.search.query = query.clone();
            reselect_visible(&mut next);
        }
        StateEvent::SearchCommitted => {
            next.search.active = false;
        }
        StateEvent::SearchStopped => {
            next.search.active = false;
            next.search.query.clear();
        }

        StateEvent::ExportChanged(wizard) => {
            next.export = wizard.clone();
        }
        StateEvent::ImportChanged(wizard) => {
            next.import = wizard.clone();
        }
        StateEvent::DetailChanged(detail) => {
            next.detail = detail.clone();
        }
        StateEvent::ServerSelectorChanged(selector) => {
            next.server_selector = selector.clone();
        }

        StateEvent::LogsToggled => {
            next.show_logs = !state.show_logs;
            if !next.show_logs {
                next.deployments.clear();
                if next.panel == Panel::Logs {
                    next.panel = Panel::Main;
                }
            }
        }
        StateEvent::DeploymentsLoaded { identity, deployments } => {
            if state.selection.resource_identity().as_ref() == Some(identity) {
                next.deployments = deployments.clone();
            }
        }
        StateEvent::AutoRefreshChanged { enabled, interval_ms } => {
            next.auto_refresh = *enabled;
            next.refresh_interval_ms = *interval_ms;
        }
    }

    next
}

/// Result of one dispatch.
#[derive(Clone, Debug)]
pub struct Dispatch {
    pub id: u64,
    /// False when the reducer produced an equal state (nothing published)
    pub changed: bool,
    pub previous: Arc<AppState>,
    pub current: Arc<AppState>,
}

/// Single owner of the application state. Every mutation goes through
/// [`Store::dispatch`], which swaps in a new immutable snapshot.
pub struct Store {
    state: RwLock<Arc<AppState>>,
    next_id: AtomicU64,
    version: watch::Sender<u64>,
}

impl Store {
    pub fn new(initial: AppState) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: RwLock::new(Arc::new(initial)),
            next_id: AtomicU64::new(0),
            version,
        }
    }

    pub fn snapshot(&self) -> Arc<AppState> {
        self.state.read().clone()
    }

    /// Bumped after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn dispatch(&self, event: StateEvent) -> Dispatch {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = EventEnvelope { id, at: SystemTime::now(), event };

        let mut guard = self.state.write();
        let previous = guard.clone();
        let next = reduce(&previous, &envelope);
        let changed = next != *previous;
        if changed {
            *guard = Arc::new(next);
            self.version.send_replace(id);
        }
        Dispatch { id, changed, previous, current: guard.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ ActionVerb, Application, Environment, Resource, ResourcePayload };
    use crate::state::PendingAction;

    fn project(id: &str, apps: &[&str]) -> Project {
        Project {
            project_id: id.into(),
            name: id.into(),
            description: None,
            created_at: None,
            environments: vec![Environment {
                environment_id: format!("{}-env", id),
                name: "production".into(),
                is_default: true,
                applications: apps
                    .iter()
                    .map(|a| Application {
                        application_id: a.to_string(),
                        name: a.to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }],
        }
    }

    fn loaded(alias: &str, projects: Vec<Project>) -> StateEvent {
        StateEvent::ProjectsLoaded {
            alias: alias.into(),
            projects,
            preferred_project: None,
            synced_at: Some(1),
        }
    }

    #[test]
    fn test_equal_state_is_a_noop() {
        let store = Store::new(AppState::new("prod", "memory"));
        let rx = store.subscribe();

        let first = store.dispatch(StateEvent::SetPanel(Panel::Main));
        let second = store.dispatch(StateEvent::SetPanel(Panel::Main));

        assert!(first.changed);
        assert!(!second.changed);
        assert!(Arc::ptr_eq(&second.previous, &second.current));
        assert_eq!(*rx.borrow(), first.id);
    }

    #[test]
    fn test_second_action_start_is_rejected() {
        let store = Store::new(AppState::default());
        assert!(store.dispatch(StateEvent::ActionStarted { label: "Deploying...".into() }).changed);

        let again = store.dispatch(StateEvent::ActionStarted { label: "Stopping...".into() });
        assert!(!again.changed);
        assert_eq!(store.snapshot().running_label(), Some("Deploying..."));
    }

    #[test]
    fn test_settle_replaces_running_and_expiry_matches_seq() {
        let store = Store::new(AppState::default());
        store.dispatch(StateEvent::ActionStarted { label: "Deploying...".into() });
        let settled = store.dispatch(StateEvent::ActionSettled {
            text: "Deploying successful for web".into(),
            outcome: Outcome::Success,
        });
        let state = store.snapshot();
        assert!(state.running_label().is_none());
        assert_eq!(state.message(), Some(("Deploying successful for web", Outcome::Success)));

        let newer = store.dispatch(StateEvent::Notify { text: "newer".into(), outcome: Outcome::Info });
        assert!(!store.dispatch(StateEvent::MessageExpired { seq: settled.id }).changed);
        assert!(store.dispatch(StateEvent::MessageExpired { seq: newer.id }).changed);
        assert_eq!(store.snapshot().activity, Activity::Idle);
    }

    #[test]
    fn test_notify_dropped_while_running() {
        let store = Store::new(AppState::default());
        store.dispatch(StateEvent::ActionStarted { label: "Exporting...".into() });
        let notify = store.dispatch(StateEvent::Notify { text: "x".into(), outcome: Outcome::Failure });
        assert!(!notify.changed);
    }

    #[test]
    fn test_projects_for_stale_alias_are_ignored() {
        let store = Store::new(AppState::new("prod", "memory"));
        store.dispatch(StateEvent::ServerChanged { alias: "staging".into(), service_name: "memory".into() });

        let stale = store.dispatch(loaded("prod", vec![project("p", &["web"])]));
        assert!(!stale.changed);
        assert!(store.snapshot().projects.is_empty());
    }

    #[test]
    fn test_fetch_failure_keeps_lists() {
        let store = Store::new(AppState::new("prod", "memory"));
        store.dispatch(loaded("prod", vec![project("p", &["web", "api"])]));
        store.dispatch(StateEvent::FetchStarted);
        store.dispatch(StateEvent::FetchFailed { alias: "prod".into(), message: "connection refused".into() });

        let state = store.snapshot();
        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.error.as_deref(), Some("connection refused"));
        assert!(!state.loading);
    }

    #[test]
    fn test_new_confirm_replaces_pending() {
        let store = Store::new(AppState::default());
        let resource = Resource {
            project_id: "p".into(),
            environment_id: "e".into(),
            payload: ResourcePayload::Application(Application::default()),
        };
        for message in ["first", "second"] {
            store.dispatch(
                StateEvent::ConfirmRequested(PendingConfirm {
                    message: message.into(),
                    action: PendingAction::Action { verb: ActionVerb::Delete, resource: resource.clone() },
                })
            );
        }
        let resolved = store.dispatch(StateEvent::ConfirmResolved);
        assert_eq!(resolved.previous.pending_confirm.as_ref().unwrap().message, "second");
        assert!(resolved.current.pending_confirm.is_none());
    }

    #[test]
    fn test_search_reselects_visible_without_touching_list() {
        let store = Store::new(AppState::new("prod", "memory"));
        store.dispatch(loaded("prod", vec![project("p", &["web", "api", "worker"])]));
        store.dispatch(StateEvent::SetPanel(Panel::Main));
        store.dispatch(StateEvent::SearchStarted);
        store.dispatch(StateEvent::SearchUpdated { query: "api".into() });

        let state = store.snapshot();
        assert_eq!(state.visible_resources().len(), 1);
        assert_eq!(state.resources.len(), 3);
        assert_eq!(state.selection.resource_identity().as_deref(), Some("application:api"));

        store.dispatch(StateEvent::SearchStopped);
        assert_eq!(store.snapshot().visible_resources().len(), 3);
    }

    #[test]
    fn test_select_project_rebinds_environment() {
        let store = Store::new(AppState::new("prod", "memory"));
        store.dispatch(loaded("prod", vec![project("a", &["web"]), project("b", &["wiki"])]));
        store.dispatch(StateEvent::SelectProject { project_id: "b".into() });

        let state = store.snapshot();
        assert_eq!(state.selection.environment_id(), Some("b-env"));
        assert_eq!(state.selection.application.as_ref().unwrap().name, "wiki");
    }
}
