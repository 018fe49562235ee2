//! The interactive engine: owns the state store, the service client, the
//! cache, and the refresh timer, and exposes one entry point per operator
//! intent. The rendering layer only reads snapshots and calls these.

use std::sync::{ Arc, Weak };
use std::time::Duration;

use parking_lot::{ Mutex, RwLock };
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{ debug, info, warn };

use crate::api;
use crate::cache::{ LocalCache, ResourceSnapshot };
use crate::clock::SharedClock;
use crate::config::ConfigError;
use crate::error::ServiceError;
use crate::model::{ ActionVerb, Resource };
use crate::reducer::{ Dispatch, StateEvent, Store };
use crate::scheduler::{ RefreshCallback, RefreshScheduler };
use crate::service::ResourceService;
use crate::state::{
    AppState,
    DetailState,
    Outcome,
    Panel,
    PendingAction,
    PendingConfirm,
    ServerSelector,
};
use crate::transfer::{
    ExportKind,
    ImportItem,
    ImportTarget,
    ItemOutcome,
    TransferError,
    build_export,
    import_items,
    read_import,
    write_export,
};
use crate::wizard::{ ExportStep, ExportWizard, ImportStep, ImportWizard };

/// How long a settled message stays up.
pub const MESSAGE_TTL: Duration = Duration::from_millis(3000);

/// A live client for one configured server.
#[derive(Clone)]
pub struct Connection {
    pub alias: String,
    pub service: Arc<dyn ResourceService>,
    pub default_project_id: Option<String>,
}

/// Resolves server aliases into connections. Implemented by the front end
/// on top of the servers file.
pub trait Connector: Send + Sync {
    fn aliases(&self) -> Vec<String>;

    /// Builds a client for `alias` and records it as the current server.
    fn connect(&self, alias: &str) -> Result<Connection, ConfigError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionRejection {
    NoSelection,
    NotActionable,
    /// Another action is still running
    Busy,
}

#[derive(Debug)]
pub enum ActionRequest {
    Started(JoinHandle<()>),
    /// Parked in the confirmation slot
    AwaitingConfirm,
    Rejected(ActionRejection),
}

struct SessionInner {
    store: Store,
    /// Alias and client are swapped together so a refresh never pairs one
    /// server's data with another server's cache partition.
    connection: RwLock<Connection>,
    cache: Arc<LocalCache>,
    clock: SharedClock,
    connector: RwLock<Option<Arc<dyn Connector>>>,
    scheduler: Mutex<Option<RefreshScheduler>>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

fn clamp_step(current: usize, delta: isize, len: usize) -> usize {
    current.saturating_add_signed(delta).min(len.saturating_sub(1))
}

impl Session {
    pub fn new(connection: Connection, cache: Arc<LocalCache>, clock: SharedClock) -> Self {
        let state = AppState::new(connection.alias.as_str(), connection.service.name());
        Self {
            inner: Arc::new(SessionInner {
                store: Store::new(state),
                connection: RwLock::new(connection),
                cache,
                clock,
                connector: RwLock::new(None),
                scheduler: Mutex::new(None),
            }),
        }
    }

    pub fn set_connector(&self, connector: Arc<dyn Connector>) {
        *self.inner.connector.write() = Some(connector);
    }

    pub fn snapshot(&self) -> Arc<AppState> {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.store.subscribe()
    }

    pub fn cache(&self) -> &LocalCache {
        &self.inner.cache
    }

    fn service(&self) -> Arc<dyn ResourceService> {
        self.inner.connection.read().service.clone()
    }

    fn dispatch(&self, event: StateEvent) -> Dispatch {
        self.inner.store.dispatch(event)
    }

    fn expire_later(&self, seq: u64) {
        let session = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(MESSAGE_TTL).await;
            session.dispatch(StateEvent::MessageExpired { seq });
        });
    }

    /// Ends the running activity with a message that expires on its own.
    fn settle(&self, text: String, outcome: Outcome) {
        let settled = self.dispatch(StateEvent::ActionSettled { text, outcome });
        self.expire_later(settled.id);
    }

    /// Shows a message unless an action is running.
    pub fn notify(&self, text: impl Into<String>, outcome: Outcome) {
        let shown = self.dispatch(StateEvent::Notify { text: text.into(), outcome });
        if shown.changed {
            self.expire_later(shown.id);
        }
    }

    // ---- refresh ----

    /// Re-fetches the project tree and reconciles the selection against it.
    ///
    /// With `use_cache`, a valid cached tree is painted first; the live fetch
    /// always follows. Failures keep whatever is on screen and only record
    /// the error.
    pub async fn refresh(&self, use_cache: bool) {
        let Connection { alias, service, default_project_id: preferred } = self.inner.connection
            .read()
            .clone();

        if use_cache {
            if let Some(projects) = self.inner.cache.projects(&alias) {
                self.dispatch(StateEvent::ProjectsLoaded {
                    alias: alias.clone(),
                    projects,
                    preferred_project: preferred.clone(),
                    synced_at: None,
                });
            }
            let painted = self.snapshot();
            if let Some(project_id) = painted.selection.project_id() {
                if let Some(snapshot) = self.inner.cache.resources(&alias, project_id) {
                    self.dispatch(StateEvent::ResourcesRestored {
                        alias: alias.clone(),
                        project_id: project_id.to_string(),
                        snapshot,
                    });
                }
            }
        }

        self.dispatch(StateEvent::FetchStarted);
        match api::fetch_projects(&*service).await {
            Ok(projects) => {
                debug!(alias = %alias, count = projects.len(), "projects fetched");
                self.inner.cache.store_projects(&alias, projects.clone());
                let loaded = self.dispatch(StateEvent::ProjectsLoaded {
                    alias: alias.clone(),
                    projects,
                    preferred_project: preferred,
                    synced_at: Some(self.inner.clock.now_millis()),
                });
                let current = &loaded.current;
                if current.server_alias != alias {
                    return;
                }
                let selection = &current.selection;
                if let (Some(project_id), Some(environment_id)) = (selection.project_id(), selection.environment_id()) {
                    self.inner.cache.store_resources(&alias, project_id, ResourceSnapshot {
                        environment_id: environment_id.to_string(),
                        resources: current.resources.clone(),
                    });
                }
            }
            Err(err) => {
                warn!(alias = %alias, error = %err, "refresh failed");
                self.dispatch(StateEvent::FetchFailed { alias, message: err.to_string() });
            }
        }
    }

    /// One scheduler tick.
    pub async fn tick(&self) {
        self.refresh(false).await;
        if self.snapshot().show_logs {
            self.load_deployments().await;
        }
    }

    // ---- actions ----

    /// Starts `verb` against the selected resource. Destructive verbs park
    /// in the confirmation slot instead.
    pub fn request_action(&self, verb: ActionVerb) -> ActionRequest {
        let state = self.snapshot();
        let Some(resource) = state.selection.resource.clone() else {
            return ActionRequest::Rejected(ActionRejection::NoSelection);
        };
        if state.is_running() {
            return ActionRequest::Rejected(ActionRejection::Busy);
        }
        if !resource.is_actionable() {
            self.notify(ServiceError::MissingId(resource.name().to_string()).to_string(), Outcome::Failure);
            return ActionRequest::Rejected(ActionRejection::NotActionable);
        }
        if verb.is_destructive() {
            let message = format!("Delete {} \"{}\"? (y/n)", resource.kind_tag(), resource.name());
            self.dispatch(
                StateEvent::ConfirmRequested(PendingConfirm {
                    message,
                    action: PendingAction::Action { verb, resource },
                })
            );
            return ActionRequest::AwaitingConfirm;
        }
        self.run_action(verb, resource)
    }

    fn run_action(&self, verb: ActionVerb, resource: Resource) -> ActionRequest {
        let started = self.dispatch(StateEvent::ActionStarted {
            label: format!("{}...", verb.label()),
        });
        if !started.changed {
            return ActionRequest::Rejected(ActionRejection::Busy);
        }
        let session = self.clone();
        ActionRequest::Started(
            tokio::spawn(async move {
                session.execute(verb, resource).await;
            })
        )
    }

    async fn execute(&self, verb: ActionVerb, resource: Resource) {
        let service = self.service();
        match api::dispatch_action(&*service, &resource, verb).await {
            Ok(()) => {
                info!(action = verb.as_str(), resource = %resource.identity(), "action succeeded");
                self.settle(
                    format!("{} successful for {}", verb.label(), resource.name()),
                    Outcome::Success
                );
                let alias = self.inner.connection.read().alias.clone();
                self.inner.cache.invalidate_project(&alias, &resource.project_id);
                self.refresh(false).await;
            }
            Err(err) => {
                warn!(action = verb.as_str(), resource = %resource.identity(), error = %err, "action failed");
                self.settle(err.to_string(), Outcome::Failure);
            }
        }
    }

    /// Resolves the pending confirmation by running its action.
    pub fn confirm(&self) -> Option<ActionRequest> {
        let resolved = self.dispatch(StateEvent::ConfirmResolved);
        let pending = resolved.previous.pending_confirm.clone()?;
        match pending.action {
            PendingAction::Action { verb, resource } => Some(self.run_action(verb, resource)),
        }
    }

    pub fn cancel(&self) {
        self.dispatch(StateEvent::ConfirmResolved);
    }

    // ---- search ----

    pub fn start_search(&self) {
        self.dispatch(StateEvent::SearchStarted);
    }

    pub fn update_search(&self, query: impl Into<String>) {
        self.dispatch(StateEvent::SearchUpdated { query: query.into() });
    }

    /// Leaves typing mode; the filter stays applied.
    pub fn commit_search(&self) {
        self.dispatch(StateEvent::SearchCommitted);
    }

    pub fn stop_search(&self) {
        self.dispatch(StateEvent::SearchStopped);
    }

    // ---- selection ----

    pub fn move_resource(&self, delta: isize) {
        let state = self.snapshot();
        let visible = state.visible_resources();
        if visible.is_empty() {
            return;
        }
        let index = state
            .resource_cursor()
            .map_or(0, |cursor| clamp_step(cursor, delta, visible.len()));
        self.dispatch(StateEvent::SelectResource { identity: visible[index].identity() });
    }

    pub fn move_project(&self, delta: isize) {
        let state = self.snapshot();
        let visible = state.visible_projects();
        if visible.is_empty() {
            return;
        }
        let index = state
            .project_cursor()
            .map_or(0, |cursor| clamp_step(cursor, delta, visible.len()));
        self.dispatch(StateEvent::SelectProject { project_id: visible[index].project_id.clone() });
    }

    /// Next environment of the selected project, wrapping around.
    pub fn cycle_environment(&self) {
        let state = self.snapshot();
        let Some(project) = &state.selection.project else {
            return;
        };
        let environments = &project.environments;
        if environments.len() < 2 {
            return;
        }
        let current = state.selection
            .environment_id()
            .and_then(|id| environments.iter().position(|e| e.environment_id == id))
            .unwrap_or(0);
        let next = &environments[(current + 1) % environments.len()];
        self.dispatch(StateEvent::SelectEnvironment { environment_id: next.environment_id.clone() });
    }

    pub fn set_panel(&self, panel: Panel) {
        self.dispatch(StateEvent::SetPanel(panel));
    }

    pub fn next_panel(&self) {
        let state = self.snapshot();
        let next = match state.panel {
            Panel::Sidebar => Panel::Main,
            Panel::Main if state.show_logs => Panel::Logs,
            Panel::Main | Panel::Logs => Panel::Sidebar,
        };
        self.set_panel(next);
    }

    // ---- detail and deployments ----

    pub async fn open_detail(&self) {
        let state = self.snapshot();
        if state.detail.is_some() {
            return;
        }
        let Some(resource) = state.selection.resource.clone() else {
            return;
        };
        let started = self.dispatch(StateEvent::ActionStarted { label: "Loading details...".into() });
        if !started.changed {
            return;
        }
        let service = self.service();
        match api::fetch_detail(&*service, &resource).await {
            Ok(data) => {
                self.dispatch(StateEvent::DetailChanged(Some(DetailState { resource, data })));
                self.dispatch(StateEvent::ActionFinished);
            }
            Err(err) => {
                warn!(resource = %resource.identity(), error = %err, "detail fetch failed");
                self.settle("Failed to load details".into(), Outcome::Failure);
            }
        }
    }

    pub fn close_detail(&self) {
        self.dispatch(StateEvent::DetailChanged(None));
    }

    pub async fn toggle_logs(&self) {
        let toggled = self.dispatch(StateEvent::LogsToggled);
        if toggled.current.show_logs {
            self.load_deployments().await;
        }
    }

    /// Deployment history of the selected resource. Failures show as empty.
    pub async fn load_deployments(&self) {
        let Some(resource) = self.snapshot().selection.resource.clone() else {
            return;
        };
        let service = self.service();
        let deployments = api::fetch_deployments(&*service, &resource).await.unwrap_or_else(|err| {
            debug!(resource = %resource.identity(), error = %err, "deployments fetch failed");
            Vec::new()
        });
        self.dispatch(StateEvent::DeploymentsLoaded { identity: resource.identity(), deployments });
    }

    // ---- export ----

    pub fn open_export(&self) {
        let state = self.snapshot();
        if state.has_modal() {
            return;
        }
        let Some(project) = &state.selection.project else {
            self.notify("Select a project first", Outcome::Failure);
            return;
        };
        if state.resources.is_empty() {
            self.notify("No services to export", Outcome::Failure);
            return;
        }
        let wizard = ExportWizard::new(
            state.resources.clone(),
            format!("./{}-export.json", project.name)
        );
        self.dispatch(StateEvent::ExportChanged(Some(wizard)));
    }

    pub fn edit_export(&self, edit: impl FnOnce(&mut ExportWizard)) {
        if let Some(mut wizard) = self.snapshot().export.clone() {
            edit(&mut wizard);
            self.dispatch(StateEvent::ExportChanged(Some(wizard)));
        }
    }

    /// Select step: moves on if anything is checked. Path step: fetches
    /// detail for the checked resources and writes the file.
    pub async fn advance_export(&self) {
        let state = self.snapshot();
        let Some(mut wizard) = state.export.clone() else {
            return;
        };
        match wizard.step {
            ExportStep::Select => {
                if wizard.advance().is_ok() {
                    self.dispatch(StateEvent::ExportChanged(Some(wizard)));
                }
            }
            ExportStep::Path => {
                let path = match wizard.path.resolve() {
                    Ok(path) => path,
                    Err(err) => {
                        self.notify(err.to_string(), Outcome::Failure);
                        return;
                    }
                };
                let Some(project) = state.selection.project.clone() else {
                    return;
                };
                let started = self.dispatch(StateEvent::ActionStarted { label: "Exporting...".into() });
                if !started.changed {
                    return;
                }

                let service = self.service();
                let selected = wizard.selected_resources();
                let result = async {
                    let report = build_export(&*service, &*self.inner.clock, &project, &selected).await?;
                    write_export(&path, &report.file).await?;
                    Ok::<_, TransferError>(report)
                }.await;

                match result {
                    Ok(report) => {
                        info!(path = %path.display(), exported = report.exported, failed = report.failed, "export written");
                        self.dispatch(StateEvent::ExportChanged(None));
                        self.settle(report.message(&path), Outcome::Success);
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "export failed");
                        self.settle(err.to_string(), Outcome::Failure);
                    }
                }
            }
        }
    }

    pub fn close_export(&self) {
        self.dispatch(StateEvent::ExportChanged(None));
    }

    // ---- import ----

    fn import_target(state: &AppState) -> Option<ImportTarget> {
        Some(ImportTarget {
            project_id: state.selection.project_id()?.to_string(),
            environment_id: state.selection.environment_id()?.to_string(),
        })
    }

    pub fn open_import(&self) {
        let state = self.snapshot();
        if state.has_modal() {
            return;
        }
        let (Some(project), Some(_)) = (&state.selection.project, Self::import_target(&state)) else {
            self.notify("Select a project first", Outcome::Failure);
            return;
        };
        let wizard = ImportWizard::new(format!("./{}-export.json", project.name));
        self.dispatch(StateEvent::ImportChanged(Some(wizard)));
    }

    pub fn edit_import(&self, edit: impl FnOnce(&mut ImportWizard)) {
        if let Some(mut wizard) = self.snapshot().import.clone() {
            edit(&mut wizard);
            self.dispatch(StateEvent::ImportChanged(Some(wizard)));
        }
    }

    /// Path step: reads the file. An application file is imported right
    /// away; a project file moves to the select step. Select step: imports
    /// the checked entries.
    pub async fn advance_import(&self) {
        let state = self.snapshot();
        let Some(mut wizard) = state.import.clone() else {
            return;
        };
        let Some(target) = Self::import_target(&state) else {
            self.notify("Select a project first", Outcome::Failure);
            return;
        };

        match wizard.step {
            ImportStep::Path => {
                let plan = match wizard.path.resolve() {
                    Ok(path) => read_import(&path).await,
                    Err(err) => {
                        self.notify(err.to_string(), Outcome::Failure);
                        return;
                    }
                };
                let plan = match plan {
                    Ok(plan) => plan,
                    Err(err) => {
                        warn!(error = %err, "import file rejected");
                        self.notify(err.to_string(), Outcome::Failure);
                        return;
                    }
                };
                match plan.kind {
                    ExportKind::Application => {
                        self.run_import(&target, plan.items, true).await;
                    }
                    ExportKind::Project => {
                        wizard.enter_select(plan);
                        self.dispatch(StateEvent::ImportChanged(Some(wizard)));
                    }
                }
            }
            ImportStep::Select => {
                if let Ok(items) = wizard.selected_items() {
                    self.run_import(&target, items, false).await;
                }
            }
        }
    }

    async fn run_import(
        &self,
        target: &ImportTarget,
        items: Vec<ImportItem>,
        single: bool
    ) {
        let started = self.dispatch(StateEvent::ActionStarted { label: "Importing...".into() });
        if !started.changed {
            return;
        }
        self.dispatch(StateEvent::ImportChanged(None));

        let service = self.service();
        let report = import_items(&*service, target, &items).await;
        let text = match (single, report.outcomes.first()) {
            (true, Some((name, ItemOutcome::Configured))) => format!("Imported \"{}\"", name),
            (true, Some((name, ItemOutcome::Partial(reason)))) => {
                format!("Imported \"{}\" (partially configured: {})", name, reason)
            }
            (true, Some((_, ItemOutcome::Failed(reason)))) => reason.clone(),
            _ => report.message(),
        };
        let outcome = if report.imported() > 0 { Outcome::Success } else { Outcome::Failure };
        self.settle(text, outcome);

        if report.imported() > 0 {
            self.refresh(false).await;
        }
    }

    pub fn close_import(&self) {
        self.dispatch(StateEvent::ImportChanged(None));
    }

    // ---- servers ----

    fn connector(&self) -> Option<Arc<dyn Connector>> {
        self.inner.connector.read().clone()
    }

    /// Replaces the active server. Cached data of the previous server is
    /// dropped and everything on screen is refetched.
    pub async fn switch_server(&self, alias: &str) -> Result<(), ConfigError> {
        let Some(connector) = self.connector() else {
            return Err(ConfigError::UnknownAlias(alias.to_string()));
        };
        if self.inner.connection.read().alias == alias {
            return Ok(());
        }
        let connection = connector.connect(alias)?;
        let service_name = connection.service.name().to_string();

        let previous = std::mem::replace(&mut *self.inner.connection.write(), connection).alias;
        self.inner.cache.invalidate_server(&previous);
        info!(from = %previous, to = %alias, "switched server");

        self.dispatch(StateEvent::ServerChanged { alias: alias.to_string(), service_name });
        self.notify(format!("Switched to {}", alias), Outcome::Info);
        self.refresh(true).await;
        Ok(())
    }

    pub fn open_server_selector(&self) {
        let state = self.snapshot();
        if state.has_modal() {
            return;
        }
        let aliases = self
            .connector()
            .map(|c| c.aliases())
            .unwrap_or_default();
        if aliases.is_empty() {
            self.notify("No servers configured", Outcome::Info);
            return;
        }
        let cursor = aliases
            .iter()
            .position(|a| *a == state.server_alias)
            .unwrap_or(0);
        self.dispatch(StateEvent::ServerSelectorChanged(Some(ServerSelector { aliases, cursor })));
    }

    pub fn move_server_selector(&self, delta: isize) {
        if let Some(mut selector) = self.snapshot().server_selector.clone() {
            selector.cursor = clamp_step(selector.cursor, delta, selector.aliases.len());
            self.dispatch(StateEvent::ServerSelectorChanged(Some(selector)));
        }
    }

    pub async fn confirm_server_selector(&self) {
        let Some(selector) = self.snapshot().server_selector.clone() else {
            return;
        };
        self.close_server_selector();
        let Some(alias) = selector.aliases.get(selector.cursor) else {
            return;
        };
        if let Err(err) = self.switch_server(alias).await {
            warn!(alias = %alias, error = %err, "server switch failed");
            self.notify(err.to_string(), Outcome::Failure);
        }
    }

    pub fn close_server_selector(&self) {
        self.dispatch(StateEvent::ServerSelectorChanged(None));
    }

    // ---- auto refresh ----

    fn tick_callback(&self) -> RefreshCallback {
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        RefreshCallback::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    Session { inner }.tick().await;
                }
            }
        })
    }

    fn with_scheduler<R>(&self, f: impl FnOnce(&mut RefreshScheduler) -> R) -> R {
        let mut slot = self.inner.scheduler.lock();
        let scheduler = slot.get_or_insert_with(|| RefreshScheduler::new(self.tick_callback()));
        let result = f(scheduler);
        let (enabled, interval) = (scheduler.is_enabled(), scheduler.interval());
        drop(slot);

        self.dispatch(StateEvent::AutoRefreshChanged {
            enabled,
            interval_ms: interval.as_millis() as u64,
        });
        result
    }

    /// Arms the timer. Must be called from within a tokio runtime.
    pub fn start_auto_refresh(&self, enabled: bool, interval: Duration) {
        self.with_scheduler(|scheduler| {
            scheduler.set_interval(interval);
            scheduler.set_enabled(enabled);
        });
    }

    pub fn toggle_auto_refresh(&self) -> bool {
        let enabled = self.with_scheduler(RefreshScheduler::toggle);
        self.notify(
            if enabled { "Auto refresh on" } else { "Auto refresh off" },
            Outcome::Info
        );
        enabled
    }
}
