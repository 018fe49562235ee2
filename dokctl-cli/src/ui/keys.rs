//! Key bindings. Maps a key press to an [`Intent`] given the current state;
//! the loop in `app` carries intents out against the session.

use crossterm::event::{ KeyCode, KeyEvent, KeyModifiers };

use dokctl_core::model::ActionVerb;
use dokctl_core::state::{ AppState, Panel };
use dokctl_core::wizard::{ ExportStep, ImportStep };

/// Keys shared by both wizards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardKey {
    Move(isize),
    Toggle,
    SelectAll,
    SelectNone,
    Input(char),
    Backspace,
    Advance,
    Back,
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Quit,
    ToggleHelp,

    StartSearch,
    SearchInput(char),
    SearchBackspace,
    SearchCommit,
    SearchCancel,

    NextPanel,
    FocusMain,
    Move(isize),
    CycleEnvironment,
    Refresh,
    ToggleAutoRefresh,

    Action(ActionVerb),
    Confirm,
    Cancel,

    OpenDetail,
    CloseDetail,
    ToggleLogs,

    OpenExport,
    Export(WizardKey),
    OpenImport,
    Import(WizardKey),

    OpenServers,
    ServerMove(isize),
    ServerConfirm,
    ServerClose,
}

fn is_quit(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

fn movement(code: KeyCode) -> Option<isize> {
    match code {
        KeyCode::Char('j') | KeyCode::Down => Some(1),
        KeyCode::Char('k') | KeyCode::Up => Some(-1),
        _ => None,
    }
}

fn select_key(code: KeyCode) -> Option<WizardKey> {
    if let Some(delta) = movement(code) {
        return Some(WizardKey::Move(delta));
    }
    match code {
        KeyCode::Char(' ') => Some(WizardKey::Toggle),
        KeyCode::Char('a') => Some(WizardKey::SelectAll),
        KeyCode::Char('n') => Some(WizardKey::SelectNone),
        KeyCode::Enter => Some(WizardKey::Advance),
        _ => None,
    }
}

fn path_key(code: KeyCode) -> Option<WizardKey> {
    match code {
        KeyCode::Char(c) => Some(WizardKey::Input(c)),
        KeyCode::Backspace => Some(WizardKey::Backspace),
        KeyCode::Enter => Some(WizardKey::Advance),
        _ => None,
    }
}

pub fn map_key(state: &AppState, help_open: bool, key: KeyEvent) -> Option<Intent> {
    if is_quit(&key) {
        return Some(Intent::Quit);
    }
    let code = key.code;

    // ---------- HELP ----------
    if help_open {
        return match code {
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') => Some(Intent::ToggleHelp),
            _ => None,
        };
    }

    // ---------- CONFIRM ----------
    if state.pending_confirm.is_some() {
        return match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(Intent::Confirm),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(Intent::Cancel),
            _ => None,
        };
    }

    // ---------- SERVER SELECTOR ----------
    if state.server_selector.is_some() {
        if let Some(delta) = movement(code) {
            return Some(Intent::ServerMove(delta));
        }
        return match code {
            KeyCode::Enter => Some(Intent::ServerConfirm),
            KeyCode::Esc | KeyCode::Char('q') => Some(Intent::ServerClose),
            _ => None,
        };
    }

    // ---------- EXPORT ----------
    if let Some(wizard) = &state.export {
        let key = match (wizard.step, code) {
            (ExportStep::Select, KeyCode::Esc) => Some(WizardKey::Close),
            (ExportStep::Path, KeyCode::Esc) => Some(WizardKey::Back),
            (ExportStep::Select, code) => select_key(code),
            (ExportStep::Path, code) => path_key(code),
        };
        return key.map(Intent::Export);
    }

    // ---------- IMPORT ----------
    if let Some(wizard) = &state.import {
        let key = match (wizard.step, code) {
            (ImportStep::Path, KeyCode::Esc) => Some(WizardKey::Close),
            (ImportStep::Select, KeyCode::Esc) => Some(WizardKey::Back),
            (ImportStep::Path, code) => path_key(code),
            (ImportStep::Select, code) => select_key(code),
        };
        return key.map(Intent::Import);
    }

    // ---------- DETAIL ----------
    if state.detail.is_some() {
        return match code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => Some(Intent::CloseDetail),
            _ => None,
        };
    }

    // ---------- SEARCH INPUT ----------
    if state.search.active {
        return match code {
            KeyCode::Esc => Some(Intent::SearchCancel),
            KeyCode::Enter => Some(Intent::SearchCommit),
            KeyCode::Backspace => Some(Intent::SearchBackspace),
            KeyCode::Char(c) => Some(Intent::SearchInput(c)),
            KeyCode::Down => Some(Intent::Move(1)),
            KeyCode::Up => Some(Intent::Move(-1)),
            _ => None,
        };
    }

    // ---------- NORMAL ----------
    if let Some(delta) = movement(code) {
        return Some(Intent::Move(delta));
    }
    match code {
        KeyCode::Char('q') => Some(Intent::Quit),
        KeyCode::Char('?') => Some(Intent::ToggleHelp),
        KeyCode::Char('/') => Some(Intent::StartSearch),
        KeyCode::Esc if !state.search.query.is_empty() => Some(Intent::SearchCancel),
        KeyCode::Tab => Some(Intent::NextPanel),
        KeyCode::Char('e') => Some(Intent::CycleEnvironment),
        KeyCode::Char('R') => Some(Intent::Refresh),
        KeyCode::Char('a') => Some(Intent::ToggleAutoRefresh),
        KeyCode::Char('d') => Some(Intent::Action(ActionVerb::Deploy)),
        KeyCode::Char('s') => Some(Intent::Action(ActionVerb::Stop)),
        KeyCode::Char('S') => Some(Intent::Action(ActionVerb::Start)),
        KeyCode::Char('r') => Some(Intent::Action(ActionVerb::Restart)),
        KeyCode::Char('X') => Some(Intent::Action(ActionVerb::Delete)),
        KeyCode::Enter if state.panel == Panel::Sidebar => Some(Intent::FocusMain),
        KeyCode::Enter => Some(Intent::OpenDetail),
        KeyCode::Char('l') => Some(Intent::ToggleLogs),
        KeyCode::Char('E') => Some(Intent::OpenExport),
        KeyCode::Char('I') => Some(Intent::OpenImport),
        KeyCode::Char('M') => Some(Intent::OpenServers),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dokctl_core::model::{ Application, Resource, ResourcePayload };
    use dokctl_core::state::{ PendingAction, PendingConfirm, ServerSelector };
    use dokctl_core::wizard::{ ExportWizard, ImportWizard };

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn main_panel() -> AppState {
        let mut state = AppState::new("prod", "memory");
        state.panel = Panel::Main;
        state
    }

    #[test]
    fn test_action_keys() {
        let state = main_panel();
        let cases = [
            ('d', ActionVerb::Deploy),
            ('s', ActionVerb::Stop),
            ('S', ActionVerb::Start),
            ('r', ActionVerb::Restart),
            ('X', ActionVerb::Delete),
        ];
        for (c, verb) in cases {
            assert_eq!(map_key(&state, false, press(KeyCode::Char(c))), Some(Intent::Action(verb)));
        }
        assert_eq!(map_key(&state, false, press(KeyCode::Char('R'))), Some(Intent::Refresh));
    }

    #[test]
    fn test_ctrl_c_always_quits() {
        let mut state = main_panel();
        state.search.active = true;
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(&state, true, key), Some(Intent::Quit));
    }

    #[test]
    fn test_search_mode_captures_letters() {
        let mut state = main_panel();
        state.search.active = true;
        assert_eq!(map_key(&state, false, press(KeyCode::Char('q'))), Some(Intent::SearchInput('q')));
        assert_eq!(map_key(&state, false, press(KeyCode::Enter)), Some(Intent::SearchCommit));
        assert_eq!(map_key(&state, false, press(KeyCode::Esc)), Some(Intent::SearchCancel));
    }

    #[test]
    fn test_enter_depends_on_panel() {
        let mut state = main_panel();
        assert_eq!(map_key(&state, false, press(KeyCode::Enter)), Some(Intent::OpenDetail));
        state.panel = Panel::Sidebar;
        assert_eq!(map_key(&state, false, press(KeyCode::Enter)), Some(Intent::FocusMain));
    }

    #[test]
    fn test_confirm_has_priority() {
        let mut state = main_panel();
        state.server_selector = Some(ServerSelector { aliases: vec!["prod".into()], cursor: 0 });
        state.pending_confirm = Some(PendingConfirm {
            message: "Delete?".into(),
            action: PendingAction::Action {
                verb: ActionVerb::Delete,
                resource: Resource {
                    project_id: "p".into(),
                    environment_id: "e".into(),
                    payload: ResourcePayload::Application(Application::default()),
                },
            },
        });
        assert_eq!(map_key(&state, false, press(KeyCode::Char('y'))), Some(Intent::Confirm));
        assert_eq!(map_key(&state, false, press(KeyCode::Esc)), Some(Intent::Cancel));
        assert_eq!(map_key(&state, false, press(KeyCode::Char('d'))), None);
    }

    #[test]
    fn test_export_escape_goes_back_then_closes() {
        let mut state = main_panel();
        let mut wizard = ExportWizard::new(Vec::new(), "./x.json");
        state.export = Some(wizard.clone());
        assert_eq!(map_key(&state, false, press(KeyCode::Esc)), Some(Intent::Export(WizardKey::Close)));

        wizard.step = ExportStep::Path;
        state.export = Some(wizard);
        assert_eq!(map_key(&state, false, press(KeyCode::Esc)), Some(Intent::Export(WizardKey::Back)));
        assert_eq!(map_key(&state, false, press(KeyCode::Char('a'))), Some(Intent::Export(WizardKey::Input('a'))));
    }

    #[test]
    fn test_import_select_keys() {
        let mut state = main_panel();
        let mut wizard = ImportWizard::new("./x.json");
        wizard.step = ImportStep::Select;
        state.import = Some(wizard);

        assert_eq!(map_key(&state, false, press(KeyCode::Char(' '))), Some(Intent::Import(WizardKey::Toggle)));
        assert_eq!(map_key(&state, false, press(KeyCode::Char('a'))), Some(Intent::Import(WizardKey::SelectAll)));
        assert_eq!(map_key(&state, false, press(KeyCode::Char('n'))), Some(Intent::Import(WizardKey::SelectNone)));
        assert_eq!(map_key(&state, false, press(KeyCode::Esc)), Some(Intent::Import(WizardKey::Back)));
    }
}
