use ratatui::{
    Frame,
    layout::{ Constraint, Direction, Layout, Rect },
    text::{ Line, Span },
    widgets::{ Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap },
};
use serde_json::Value;

use dokctl_core::state::{ AppState, DetailState, Panel, ServerSelector };
use dokctl_core::wizard::{ ExportStep, ExportWizard, ImportStep, ImportWizard, MultiSelect };

use super::styles;

/// Front-end only state that never reaches the store.
#[derive(Default)]
pub struct UiState {
    pub help_open: bool,
    pub projects: ListState,
    pub resources: ListState,
    pub deployments: ListState,
}

pub fn fit_title(s: &str, width: u16) -> String {
    // width includes borders; keep safe margin
    let max = width.saturating_sub(4) as usize;
    if max == 0 {
        return "".into();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max {
        return s.to_string();
    }
    if max <= 1 {
        return "…".into();
    }
    let mut out: String = chars.into_iter().take(max - 1).collect();
    out.push('…');
    out
}

/// Epoch millis as `HH:MM:SS` (UTC).
pub fn format_clock(millis: i64) -> String {
    let secs = millis.div_euclid(1000);
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Centered rect `width` x `height`, shrunk to fit `area`.
pub fn modal_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4)).max(10.min(area.width));
    let height = height.min(area.height.saturating_sub(2)).max(3.min(area.height));
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

fn panel_block(title: &str, focused: bool, width: u16) -> Block<'static> {
    let title = if focused { format!("▸ {}", title) } else { title.to_string() };
    let border = if focused { styles::border_focused() } else { styles::border_subtle() };
    Block::default()
        .title(fit_title(&title, width))
        .borders(Borders::ALL)
        .border_style(border)
}

fn modal_block(title: String) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_focused())
        .title(title)
}

fn hint(key: &str, label: &str) -> Vec<Span<'static>> {
    vec![
        Span::styled(format!(" {} ", key), styles::key_hint()),
        Span::styled(label.to_string(), styles::text_muted())
    ]
}

pub fn draw(f: &mut Frame, state: &AppState, ui: &mut UiState) {
    let area = f.area();

    // Layout:
    // [ top bar ]
    // [ projects | resources (+ deployments) ]
    // [ footer ]
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Top bar
            Constraint::Min(1), // Main area
            Constraint::Length(1), // Footer
        ])
        .split(area);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
        .split(outer[1]);

    draw_top_bar(f, state, outer[0]);
    draw_projects(f, state, ui, main[0]);

    if state.show_logs {
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(main[1]);
        draw_resources(f, state, ui, right[0]);
        draw_deployments(f, state, ui, right[1]);
    } else {
        draw_resources(f, state, ui, main[1]);
    }

    draw_footer(f, state, outer[2]);

    if let Some(detail) = &state.detail {
        draw_detail(f, detail, area);
    }
    if let Some(wizard) = &state.export {
        draw_export(f, wizard, area);
    }
    if let Some(wizard) = &state.import {
        draw_import(f, wizard, area);
    }
    if let Some(selector) = &state.server_selector {
        draw_server_selector(f, selector, &state.server_alias, area);
    }
    if let Some(confirm) = &state.pending_confirm {
        let rect = modal_rect(area, (confirm.message.chars().count() as u16) + 6, 5);
        f.render_widget(Clear, rect);
        let text = vec![
            Line::from(Span::styled(confirm.message.clone(), styles::warn())),
            Line::from(""),
            Line::from([hint("y", "confirm"), hint("n", "cancel")].concat())
        ];
        f.render_widget(Paragraph::new(text).block(modal_block(" Confirm ".into())), rect);
    }
    if ui.help_open {
        draw_help(f, area);
    }
}

// ---------------- Top Status Bar ----------------
fn draw_top_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let mut spans = vec![
        Span::styled(" dokctl ", styles::accent_bold()),
        Span::styled(state.server_alias.clone(), styles::text()),
        Span::styled(format!(" ({})", state.service_name), styles::text_muted())
    ];

    if let Some(project) = &state.selection.project {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(project.name.clone(), styles::text()));
        if let Some(env) = &state.selection.environment {
            spans.push(Span::styled(format!(" / {}", env.name), styles::text_dim()));
        }
    }

    spans.push(Span::raw("    "));
    if state.auto_refresh {
        spans.push(
            Span::styled(format!("⟳ {}s", state.refresh_interval_ms / 1000), styles::accent())
        );
    } else {
        spans.push(Span::styled("⟳ off", styles::text_muted()));
    }

    if let Some(synced) = state.last_synced {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(format!("synced {}", format_clock(synced)), styles::text_muted()));
    }
    if state.loading {
        spans.push(Span::raw("  "));
        spans.push(Span::styled("syncing…", styles::warn()));
    }
    if let Some(error) = &state.error {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(format!("✗ {}", error), styles::error()));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ---------------- Left: Projects ----------------
fn draw_projects(f: &mut Frame, state: &AppState, ui: &mut UiState, area: Rect) {
    let projects = state.visible_projects();
    let items: Vec<ListItem> = projects
        .iter()
        .map(|p| {
            let envs = p.environments.len();
            ListItem::new(
                Line::from(
                    vec![
                        Span::styled(p.name.clone(), styles::text()),
                        Span::styled(format!(" ({})", envs), styles::text_muted())
                    ]
                )
            )
        })
        .collect();

    ui.projects.select(state.project_cursor());

    let focused = state.panel == Panel::Sidebar;
    let title = format!("Projects {}", projects.len());
    let list = List::new(items)
        .block(panel_block(&title, focused, area.width))
        .highlight_style(styles::selection())
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, area, &mut ui.projects);
}

// ---------------- Right: Resources ----------------
fn draw_resources(f: &mut Frame, state: &AppState, ui: &mut UiState, area: Rect) {
    let resources = state.visible_resources();
    let items: Vec<ListItem> = resources
        .iter()
        .map(|r| {
            let status = r.status();
            ListItem::new(
                Line::from(
                    vec![
                        Span::styled(
                            format!("{} ", styles::status_icon(status)),
                            styles::status(status)
                        ),
                        Span::styled(format!("{} ", styles::kind_icon(r.kind())), styles::accent()),
                        Span::styled(r.name().to_string(), styles::text()),
                        Span::styled(format!("  {}", r.kind_tag()), styles::text_dim()),
                        Span::styled(
                            format!("  {}", if status.is_empty() { "idle" } else { status }),
                            styles::status(status)
                        )
                    ]
                )
            )
        })
        .collect();

    ui.resources.select(state.resource_cursor());

    let env = state.selection.environment
        .as_ref()
        .map(|e| e.name.as_str())
        .unwrap_or("-");
    let title = if !state.search.query.is_empty() && state.panel != Panel::Sidebar {
        format!("Services [{}] {}/{} /{}", env, resources.len(), state.resources.len(), state.search.query)
    } else {
        format!("Services [{}] {}", env, resources.len())
    };

    let focused = state.panel == Panel::Main;
    if items.is_empty() {
        let text = if state.loading { "Loading…" } else { "No services in this environment" };
        let empty = Paragraph::new(Span::styled(text, styles::text_muted())).block(
            panel_block(&title, focused, area.width)
        );
        f.render_widget(empty, area);
        return;
    }

    let list = List::new(items)
        .block(panel_block(&title, focused, area.width))
        .highlight_style(styles::selection())
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, area, &mut ui.resources);
}

// ---------------- Right: Deployments ----------------
fn draw_deployments(f: &mut Frame, state: &AppState, ui: &mut UiState, area: Rect) {
    let items: Vec<ListItem> = state.deployments
        .iter()
        .map(|d| {
            let title = d.title.as_deref().unwrap_or(&d.deployment_id);
            let mut spans = vec![
                Span::styled(format!("{} ", styles::status_icon(&d.status)), styles::status(&d.status)),
                Span::styled(title.to_string(), styles::text())
            ];
            if let Some(created) = &d.created_at {
                spans.push(Span::styled(format!("  {}", created), styles::text_muted()));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    if ui.deployments.selected().is_none() && !items.is_empty() {
        ui.deployments.select(Some(0));
    }

    let focused = state.panel == Panel::Logs;
    let title = format!("Deployments {}", state.deployments.len());
    let list = List::new(items)
        .block(panel_block(&title, focused, area.width))
        .highlight_style(styles::selection());
    f.render_stateful_widget(list, area, &mut ui.deployments);
}

// ---------------- Footer ----------------
fn draw_footer(f: &mut Frame, state: &AppState, area: Rect) {
    let line = if state.search.active {
        Line::from(
            vec![
                Span::styled(" / ", styles::accent_bold()),
                Span::styled(state.search.query.clone(), styles::text()),
                Span::styled("▏", styles::accent()),
                Span::raw("   "),
                Span::styled("Enter keep  Esc clear", styles::text_muted())
            ]
        )
    } else if let Some(label) = state.running_label() {
        Line::from(Span::styled(format!(" {}", label), styles::warn()))
    } else if let Some((text, outcome)) = state.message() {
        Line::from(Span::styled(format!(" {}", text), styles::outcome(outcome)))
    } else {
        Line::from(
            [
                hint("?", "help"),
                hint("/", "search"),
                hint("d", "deploy"),
                hint("r", "restart"),
                hint("Enter", "detail"),
                hint("q", "quit"),
            ].concat()
        )
    };
    f.render_widget(Paragraph::new(line), area);
}

// ---------------- Detail Modal ----------------
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn detail_lines(detail: &DetailState) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(
            vec![
                Span::styled(
                    format!("{} ", styles::kind_icon(detail.resource.kind())),
                    styles::accent()
                ),
                Span::styled(detail.resource.name().to_string(), styles::accent_bold()),
                Span::styled(format!("  {}", detail.resource.kind_tag()), styles::text_dim())
            ]
        ),
        Line::from("")
    ];

    if let Value::Object(map) = &detail.data {
        for (key, value) in map {
            if key == "env" {
                continue;
            }
            if let Some(text) = scalar_text(value) {
                lines.push(
                    Line::from(
                        vec![
                            Span::styled(format!("  {:<22}", key), styles::text_dim()),
                            Span::styled(text, styles::text())
                        ]
                    )
                );
            }
        }

        if let Some(env) = map.get("env").and_then(Value::as_str) {
            if !env.trim().is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled("ENVIRONMENT", styles::section_header())));
                for entry in env.lines().filter(|l| !l.trim().is_empty()) {
                    lines.push(Line::from(Span::styled(format!("  {}", entry), styles::text())));
                }
            }
        }

        if let Some(domains) = map.get("domains").and_then(Value::as_array) {
            if !domains.is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled("DOMAINS", styles::section_header())));
                for domain in domains {
                    let host = domain.get("host").and_then(Value::as_str).unwrap_or("?");
                    let path = domain.get("path").and_then(Value::as_str).unwrap_or("");
                    let https = domain.get("https").and_then(Value::as_bool).unwrap_or(false);
                    let scheme = if https { "https" } else { "http" };
                    lines.push(
                        Line::from(Span::styled(format!("  {}://{}{}", scheme, host, path), styles::text()))
                    );
                }
            }
        }
    }
    lines
}

fn draw_detail(f: &mut Frame, detail: &DetailState, area: Rect) {
    let rect = modal_rect(area, area.width / 10 * 7, area.height / 10 * 8);
    f.render_widget(Clear, rect);
    let title = fit_title(&format!(" {} - Esc to close ", detail.resource.name()), rect.width);
    let body = Paragraph::new(detail_lines(detail))
        .block(modal_block(title))
        .wrap(Wrap { trim: false });
    f.render_widget(body, rect);
}

// ---------------- Wizards ----------------
fn select_lines(select: &MultiSelect) -> Vec<ListItem<'static>> {
    select
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let mark = if select.is_checked(i) { "[x] " } else { "[ ] " };
            ListItem::new(
                Line::from(
                    vec![
                        Span::styled(mark, styles::accent()),
                        Span::styled(item.label.clone(), styles::text()),
                        Span::styled(format!("  {}", item.tag), styles::text_dim())
                    ]
                )
            )
        })
        .collect()
}

fn draw_select(f: &mut Frame, title: String, select: &MultiSelect, area: Rect) {
    let height = (select.items().len() as u16) + 4;
    let rect = modal_rect(area, 60, height);
    f.render_widget(Clear, rect);

    let block = modal_block(title);
    let inner = block.inner(rect);
    f.render_widget(block, rect);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    let mut list_state = ListState::default();
    list_state.select(Some(select.cursor()));
    let list = List::new(select_lines(select))
        .highlight_style(styles::selection())
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, parts[0], &mut list_state);

    let footer = Line::from(
        [
            hint("Space", "toggle"),
            hint("a", "all"),
            hint("n", "none"),
            hint("Enter", &format!("continue ({})", select.selected_count())),
        ].concat()
    );
    f.render_widget(Paragraph::new(footer), parts[1]);
}

fn draw_path(f: &mut Frame, title: String, prompt: &str, value: &str, area: Rect) {
    let rect = modal_rect(area, 70, 6);
    f.render_widget(Clear, rect);
    let text = vec![
        Line::from(Span::styled(prompt.to_string(), styles::text_dim())),
        Line::from(
            vec![
                Span::styled("> ", styles::accent()),
                Span::styled(value.to_string(), styles::text()),
                Span::styled("▏", styles::accent())
            ]
        ),
        Line::from([hint("Enter", "confirm"), hint("Esc", "back")].concat())
    ];
    f.render_widget(Paragraph::new(text).block(modal_block(title)), rect);
}

fn draw_export(f: &mut Frame, wizard: &ExportWizard, area: Rect) {
    match wizard.step {
        ExportStep::Select => {
            draw_select(f, " Export - select services ".into(), &wizard.select, area);
        }
        ExportStep::Path => {
            let prompt = format!("Write {} service(s) to:", wizard.select.selected_count());
            draw_path(f, " Export - destination ".into(), &prompt, wizard.path.value(), area);
        }
    }
}

fn draw_import(f: &mut Frame, wizard: &ImportWizard, area: Rect) {
    match wizard.step {
        ImportStep::Path => {
            draw_path(f, " Import - source ".into(), "Read export file from:", wizard.path.value(), area);
        }
        ImportStep::Select => {
            let source = wizard
                .plan()
                .map(|p| p.source_name.clone())
                .unwrap_or_default();
            draw_select(f, fit_title(&format!(" Import from {} ", source), 60), &wizard.select, area);
        }
    }
}

// ---------------- Server Selector ----------------
fn draw_server_selector(f: &mut Frame, selector: &ServerSelector, current: &str, area: Rect) {
    let rect = modal_rect(area, 40, (selector.aliases.len() as u16) + 2);
    f.render_widget(Clear, rect);
    let items: Vec<ListItem> = selector.aliases
        .iter()
        .map(|alias| {
            let style = if alias == current { styles::accent() } else { styles::text() };
            let mark = if alias == current { "* " } else { "  " };
            ListItem::new(Line::from(Span::styled(format!("{}{}", mark, alias), style)))
        })
        .collect();
    let mut list_state = ListState::default();
    list_state.select(Some(selector.cursor));
    let list = List::new(items)
        .block(modal_block(" Servers ".into()))
        .highlight_style(styles::selection())
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, rect, &mut list_state);
}

// ---------------- Help Overlay ----------------
fn help_section(title: &str, keys: &[(&str, &str)]) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(title.to_string(), styles::section_header()))];
    for (key, label) in keys {
        lines.push(
            Line::from(
                vec![
                    Span::styled(format!("  {:<8}", key), styles::key_hint()),
                    Span::styled(label.to_string(), styles::text())
                ]
            )
        );
    }
    lines.push(Line::from(""));
    lines
}

fn draw_help(f: &mut Frame, area: Rect) {
    let lines = [
        help_section(
            "NAVIGATION",
            &[
                ("Tab", "Switch panel"),
                ("j/k ↑↓", "Move selection"),
                ("e", "Next environment"),
                ("/", "Search (Esc clears)"),
                ("Enter", "Open details"),
            ]
        ),
        help_section(
            "ACTIONS",
            &[
                ("d", "Deploy"),
                ("S", "Start"),
                ("s", "Stop"),
                ("r", "Restart"),
                ("X", "Delete"),
            ]
        ),
        help_section(
            "DATA",
            &[
                ("R", "Refresh now"),
                ("a", "Toggle auto refresh"),
                ("l", "Deployments panel"),
                ("E", "Export"),
                ("I", "Import"),
                ("M", "Switch server"),
            ]
        ),
        vec![
            Line::from(
                vec![
                    Span::styled("  q       ", styles::key_hint()),
                    Span::styled("Quit", styles::text())
                ]
            )
        ],
    ].concat();

    let rect = modal_rect(area, 48, (lines.len() as u16) + 2);
    f.render_widget(Clear, rect);
    let help = Paragraph::new(lines).block(modal_block(" Help - Press ? or Esc to close ".into()));
    f.render_widget(help, rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dokctl_core::model::{ Application, Resource, ResourcePayload };
    use ratatui::{ Terminal, backend::TestBackend };
    use serde_json::json;

    #[test]
    fn test_fit_title() {
        assert_eq!(fit_title("short", 20), "short");
        assert_eq!(fit_title("a much longer title", 10), "a muc…");
        assert_eq!(fit_title("abc", 4), "");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(((13 * 3600 + 5 * 60 + 9) * 1000) as i64), "13:05:09");
    }

    #[test]
    fn test_modal_rect_fits_area() {
        let area = Rect::new(0, 0, 30, 10);
        let rect = modal_rect(area, 80, 40);
        assert!(rect.width <= area.width && rect.height <= area.height);
        assert_eq!(rect.x, (area.width - rect.width) / 2);
    }

    #[test]
    fn test_detail_sections() {
        let detail = DetailState {
            resource: Resource {
                project_id: "p".into(),
                environment_id: "e".into(),
                payload: ResourcePayload::Application(Application {
                    application_id: "app-1".into(),
                    name: "web".into(),
                    ..Default::default()
                }),
            },
            data: json!({
                "name": "web",
                "replicas": 2,
                "env": "PORT=3000\n\nNODE_ENV=production",
                "domains": [{ "host": "web.example.com", "path": "/", "https": true }],
            }),
        };
        let text: Vec<String> = detail_lines(&detail)
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();

        assert!(text.iter().any(|l| l.contains("replicas") && l.ends_with('2')));
        assert!(text.iter().any(|l| l == "ENVIRONMENT"));
        assert!(text.iter().any(|l| l.trim() == "NODE_ENV=production"));
        assert!(text.iter().any(|l| l.trim() == "https://web.example.com/"));
        assert!(!text.iter().any(|l| l.trim().starts_with("env ")));
    }

    #[test]
    fn test_draw_empty_state() {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        let state = AppState::new("prod", "memory");
        let mut ui = UiState { help_open: true, ..Default::default() };
        terminal.draw(|f| draw(f, &state, &mut ui)).unwrap();

        let buffer = terminal.backend().buffer();
        let content: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(content.contains("dokctl"));
        assert!(content.contains("NAVIGATION"));
    }
}
