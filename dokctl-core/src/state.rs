use serde_json::Value;

use crate::model::{ ActionVerb, Deployment, Project, Resource };
use crate::reconcile::Selection;
use crate::search::{ filter_projects, filter_resources };
use crate::wizard::{ ExportWizard, ImportWizard };

pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Panel {
    #[default]
    Sidebar,
    Main,
    Logs,
}

impl Panel {
    pub fn label(&self) -> &'static str {
        match self {
            Panel::Sidebar => "Projects",
            Panel::Main => "Services",
            Panel::Logs => "Deployments",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Info,
}

/// Either an action is in flight, or a settled message is showing, or
/// neither. The enum makes "both" unrepresentable.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Activity {
    #[default]
    Idle,
    Running {
        label: String,
    },
    Settled {
        text: String,
        outcome: Outcome,
        /// id of the event that settled it; expiry only clears a matching seq
        seq: u64,
    },
}

/// What confirming a pending prompt will run.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingAction {
    Action {
        verb: ActionVerb,
        resource: Resource,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingConfirm {
    pub message: String,
    pub action: PendingAction,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchState {
    /// Typing into the search box
    pub active: bool,
    pub query: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetailState {
    pub resource: Resource,
    pub data: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerSelector {
    pub aliases: Vec<String>,
    pub cursor: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub server_alias: String,
    pub service_name: String,

    pub projects: Vec<Project>,
    /// Resources of the selected environment, unfiltered
    pub resources: Vec<Resource>,
    pub selection: Selection,
    pub panel: Panel,

    pub loading: bool,
    /// Last refresh failure; the previous lists stay visible
    pub error: Option<String>,
    /// Epoch millis of the last successful live fetch
    pub last_synced: Option<i64>,

    pub activity: Activity,
    pub pending_confirm: Option<PendingConfirm>,
    pub search: SearchState,
    pub export: Option<ExportWizard>,
    pub import: Option<ImportWizard>,
    pub detail: Option<DetailState>,
    pub server_selector: Option<ServerSelector>,

    pub show_logs: bool,
    pub deployments: Vec<Deployment>,

    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            server_alias: String::new(),
            service_name: String::new(),
            projects: Vec::new(),
            resources: Vec::new(),
            selection: Selection::default(),
            panel: Panel::default(),
            loading: false,
            error: None,
            last_synced: None,
            activity: Activity::Idle,
            pending_confirm: None,
            search: SearchState::default(),
            export: None,
            import: None,
            detail: None,
            server_selector: None,
            show_logs: false,
            deployments: Vec::new(),
            auto_refresh: true,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

impl AppState {
    pub fn new(server_alias: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            server_alias: server_alias.into(),
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Filtered resources while a query is set, the raw list otherwise.
    pub fn visible_resources(&self) -> Vec<Resource> {
        if self.search.query.is_empty() || self.panel == Panel::Sidebar {
            self.resources.clone()
        } else {
            filter_resources(&self.resources, &self.search.query)
        }
    }

    pub fn visible_projects(&self) -> Vec<Project> {
        if self.search.query.is_empty() || self.panel != Panel::Sidebar {
            self.projects.clone()
        } else {
            filter_projects(&self.projects, &self.search.query)
        }
    }

    pub fn running_label(&self) -> Option<&str> {
        match &self.activity {
            Activity::Running { label } => Some(label),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<(&str, Outcome)> {
        match &self.activity {
            Activity::Settled { text, outcome, .. } => Some((text, *outcome)),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.activity, Activity::Running { .. })
    }

    /// Cursor row of the selected resource in the visible list.
    pub fn resource_cursor(&self) -> Option<usize> {
        let identity = self.selection.resource_identity()?;
        self.visible_resources()
            .iter()
            .position(|r| r.identity() == identity)
    }

    pub fn project_cursor(&self) -> Option<usize> {
        let id = self.selection.project_id()?;
        self.visible_projects()
            .iter()
            .position(|p| p.project_id == id)
    }

    /// True while any modal (confirm, wizard, selector, detail) has focus.
    pub fn has_modal(&self) -> bool {
        self.pending_confirm.is_some() ||
            self.export.is_some() ||
            self.import.is_some() ||
            self.server_selector.is_some() ||
            self.detail.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ Application, ResourcePayload };

    fn app(name: &str) -> Resource {
        Resource {
            project_id: "p".into(),
            environment_id: "e".into(),
            payload: ResourcePayload::Application(Application {
                application_id: name.into(),
                name: name.into(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_visible_resources_swaps_on_query() {
        let mut state = AppState::new("prod", "memory");
        state.panel = Panel::Main;
        state.resources = vec![app("web"), app("worker"), app("api")];

        assert_eq!(state.visible_resources().len(), 3);

        state.search.query = "w".into();
        let visible = state.visible_resources();
        assert_eq!(visible.len(), 2);
        assert_eq!(state.resources.len(), 3);
    }

    #[test]
    fn test_activity_accessors_are_exclusive() {
        let mut state = AppState::default();
        state.activity = Activity::Running { label: "Deploying...".into() };
        assert!(state.running_label().is_some() && state.message().is_none());

        state.activity = Activity::Settled { text: "ok".into(), outcome: Outcome::Success, seq: 1 };
        assert!(state.running_label().is_none() && state.message().is_some());
    }
}
