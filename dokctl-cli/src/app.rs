//! Terminal front end: the servers-file connector and the TUI loop.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{ self, Event as CEvent, KeyEventKind },
    execute,
    terminal::{ EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode },
};
use parking_lot::Mutex;
use ratatui::{ Terminal, backend::CrosstermBackend };
use tracing::{ debug, info };

use dokctl_core::config::{ ConfigError, ServerConfig, ServersConfig };
use dokctl_core::session::{ ActionRejection, ActionRequest, Connection, Connector, Session };
use dokctl_core::state::{ Outcome, Panel };

use crate::http::HttpResourceService;
use crate::ui::keys::{ Intent, WizardKey, map_key };
use crate::ui::render::{ UiState, draw };

/// Builds HTTP clients from the servers file and persists the chosen alias.
pub struct ConfigConnector {
    path: PathBuf,
    config: Mutex<ServersConfig>,
}

fn build_connection(alias: &str, server: &ServerConfig) -> Result<Connection, ConfigError> {
    let service = HttpResourceService::new(alias, &server.server_url, &server.api_token).map_err(
        |err| ConfigError::Client { alias: alias.to_string(), reason: err.to_string() }
    )?;
    Ok(Connection {
        alias: alias.to_string(),
        service: Arc::new(service),
        default_project_id: server.default_project_id.clone(),
    })
}

impl ConfigConnector {
    pub fn new(path: PathBuf, config: ServersConfig) -> Self {
        Self { path, config: Mutex::new(config) }
    }

    /// Client for `alias` without touching the file.
    pub fn open(&self, alias: &str) -> Result<Connection, ConfigError> {
        let config = self.config.lock();
        build_connection(alias, config.server(alias)?)
    }
}

impl Connector for ConfigConnector {
    fn aliases(&self) -> Vec<String> {
        self.config.lock().aliases()
    }

    fn connect(&self, alias: &str) -> Result<Connection, ConfigError> {
        let mut config = self.config.lock();
        let connection = build_connection(alias, config.server(alias)?)?;
        config.use_alias(alias)?;
        config.save(&self.path)?;
        debug!(alias = %alias, path = %self.path.display(), "saved current server");
        Ok(connection)
    }
}

// --- Terminal setup/teardown ---
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

pub async fn run(session: Session, auto_refresh: bool, interval: Duration) -> anyhow::Result<()> {
    session.start_auto_refresh(auto_refresh, interval);
    let initial = session.clone();
    tokio::spawn(async move {
        initial.refresh(true).await;
    });

    let mut terminal = setup_terminal()?;
    let result = tui_loop(&mut terminal, &session).await;
    restore_terminal(terminal)?;
    info!("exiting");
    Ok(result?)
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &Session
) -> io::Result<()> {
    let mut ui = UiState::default();

    loop {
        let snapshot = session.snapshot();
        terminal.draw(|f| draw(f, &snapshot, &mut ui))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let CEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let Some(intent) = map_key(&snapshot, ui.help_open, key) else {
            continue;
        };
        if intent == Intent::Quit {
            return Ok(());
        }
        apply(session, &mut ui, intent);
    }
}

/// Carries out one intent. Anything that talks to the server runs as its
/// own task so the loop keeps drawing.
fn apply(session: &Session, ui: &mut UiState, intent: Intent) {
    let state = session.snapshot();
    match intent {
        Intent::Quit => {}
        Intent::ToggleHelp => {
            ui.help_open = !ui.help_open;
        }

        Intent::StartSearch => session.start_search(),
        Intent::SearchInput(c) => {
            let mut query = state.search.query.clone();
            query.push(c);
            session.update_search(query);
        }
        Intent::SearchBackspace => {
            let mut query = state.search.query.clone();
            query.pop();
            session.update_search(query);
        }
        Intent::SearchCommit => session.commit_search(),
        Intent::SearchCancel => session.stop_search(),

        Intent::NextPanel => session.next_panel(),
        Intent::FocusMain => session.set_panel(Panel::Main),
        Intent::Move(delta) =>
            match state.panel {
                Panel::Sidebar => session.move_project(delta),
                Panel::Main => session.move_resource(delta),
                Panel::Logs => {
                    let len = state.deployments.len();
                    if len > 0 {
                        let current = ui.deployments.selected().unwrap_or(0);
                        let next = current.saturating_add_signed(delta).min(len - 1);
                        ui.deployments.select(Some(next));
                    }
                }
            }
        Intent::CycleEnvironment => session.cycle_environment(),
        Intent::Refresh => spawn(session, |s| async move { s.refresh(false).await }),
        Intent::ToggleAutoRefresh => {
            session.toggle_auto_refresh();
        }

        Intent::Action(verb) => {
            if let ActionRequest::Rejected(ActionRejection::NoSelection) = session.request_action(verb) {
                session.notify("Select a service first", Outcome::Info);
            }
        }
        Intent::Confirm => {
            session.confirm();
        }
        Intent::Cancel => session.cancel(),

        Intent::OpenDetail => spawn(session, |s| async move { s.open_detail().await }),
        Intent::CloseDetail => session.close_detail(),
        Intent::ToggleLogs => {
            ui.deployments.select(None);
            spawn(session, |s| async move { s.toggle_logs().await });
        }

        Intent::OpenExport => session.open_export(),
        Intent::Export(key) =>
            match key {
                WizardKey::Move(delta) => session.edit_export(|w| w.select.move_by(delta)),
                WizardKey::Toggle => session.edit_export(|w| w.select.toggle()),
                WizardKey::SelectAll => session.edit_export(|w| w.select.select_all()),
                WizardKey::SelectNone => session.edit_export(|w| w.select.select_none()),
                WizardKey::Input(c) => session.edit_export(|w| w.path.push(c)),
                WizardKey::Backspace => session.edit_export(|w| w.path.backspace()),
                WizardKey::Advance => spawn(session, |s| async move { s.advance_export().await }),
                WizardKey::Back => session.edit_export(|w| w.back()),
                WizardKey::Close => session.close_export(),
            }
        Intent::OpenImport => session.open_import(),
        Intent::Import(key) =>
            match key {
                WizardKey::Move(delta) => session.edit_import(|w| w.select.move_by(delta)),
                WizardKey::Toggle => session.edit_import(|w| w.select.toggle()),
                WizardKey::SelectAll => session.edit_import(|w| w.select.select_all()),
                WizardKey::SelectNone => session.edit_import(|w| w.select.select_none()),
                WizardKey::Input(c) => session.edit_import(|w| w.path.push(c)),
                WizardKey::Backspace => session.edit_import(|w| w.path.backspace()),
                WizardKey::Advance => spawn(session, |s| async move { s.advance_import().await }),
                WizardKey::Back => session.edit_import(|w| w.back()),
                WizardKey::Close => session.close_import(),
            }

        Intent::OpenServers => session.open_server_selector(),
        Intent::ServerMove(delta) => session.move_server_selector(delta),
        Intent::ServerConfirm => spawn(session, |s| async move { s.confirm_server_selector().await }),
        Intent::ServerClose => session.close_server_selector(),
    }
}

fn spawn<F, Fut>(session: &Session, f: F)
    where F: FnOnce(Session) -> Fut, Fut: std::future::Future<Output = ()> + Send + 'static
{
    tokio::spawn(f(session.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dokctl_core::cache::LocalCache;
    use dokctl_core::clock::ManualClock;
    use dokctl_core::service::MemoryService;

    const SERVERS: &str =
        r#"
current_alias: prod
servers:
  prod:
    server_url: https://deploy.example.com
    api_token: tok-prod
  staging:
    server_url: https://staging.example.com
    api_token: tok-staging
    default_project_id: prj-1
  broken:
    server_url: https://broken.example.com
    api_token: ""
"#;

    fn connector(dir: &tempfile::TempDir) -> ConfigConnector {
        let path = dir.path().join("servers.yaml");
        ConfigConnector::new(path, ServersConfig::from_str(SERVERS).unwrap())
    }

    #[test]
    fn test_connect_persists_alias() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(&dir);

        let connection = connector.connect("staging").unwrap();
        assert_eq!(connection.alias, "staging");
        assert_eq!(connection.default_project_id.as_deref(), Some("prj-1"));
        assert_eq!(connection.service.name(), "staging");

        let saved = ServersConfig::load(&dir.path().join("servers.yaml")).unwrap();
        assert_eq!(saved.current_alias.as_deref(), Some("staging"));
    }

    #[test]
    fn test_open_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(&dir);
        connector.open("prod").unwrap();
        assert!(!dir.path().join("servers.yaml").exists());
    }

    #[test]
    fn test_connect_errors() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(&dir);
        assert!(matches!(connector.connect("dev"), Err(ConfigError::UnknownAlias(_))));
        assert!(
            matches!(connector.connect("broken"), Err(ConfigError::Client { alias, .. }) if alias == "broken")
        );
        assert_eq!(connector.aliases(), vec!["broken", "prod", "staging"]);
    }

    fn demo_session() -> Session {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let connection = Connection {
            alias: "demo".into(),
            service: Arc::new(MemoryService::demo()),
            default_project_id: None,
        };
        Session::new(connection, Arc::new(LocalCache::in_memory(clock.clone())), clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_search_typing() {
        let session = demo_session();
        session.refresh(false).await;
        let mut ui = UiState::default();

        apply(&session, &mut ui, Intent::FocusMain);
        apply(&session, &mut ui, Intent::StartSearch);
        apply(&session, &mut ui, Intent::SearchInput('a'));
        apply(&session, &mut ui, Intent::SearchInput('p'));
        assert_eq!(session.snapshot().search.query, "ap");

        apply(&session, &mut ui, Intent::SearchBackspace);
        assert_eq!(session.snapshot().search.query, "a");

        apply(&session, &mut ui, Intent::SearchCancel);
        let state = session.snapshot();
        assert!(!state.search.active);
        assert!(state.search.query.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_help_and_panels() {
        let session = demo_session();
        session.refresh(false).await;
        let mut ui = UiState::default();

        apply(&session, &mut ui, Intent::ToggleHelp);
        assert!(ui.help_open);
        apply(&session, &mut ui, Intent::ToggleHelp);
        assert!(!ui.help_open);

        assert_eq!(session.snapshot().panel, Panel::Sidebar);
        apply(&session, &mut ui, Intent::NextPanel);
        assert_eq!(session.snapshot().panel, Panel::Main);
    }
}
