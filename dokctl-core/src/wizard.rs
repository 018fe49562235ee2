use std::path::{ Path, PathBuf };

use crate::model::Resource;
use crate::transfer::{ ImportItem, ImportPlan };

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("Select at least one service")]
    EmptySelection,
    #[error("Enter a file path")]
    EmptyPath,
    #[error("Cannot resolve home directory")]
    NoHomeDir,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectItem {
    pub label: String,
    pub tag: String,
}

/// Checkbox list with a cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultiSelect {
    items: Vec<SelectItem>,
    checked: Vec<bool>,
    cursor: usize,
}

impl MultiSelect {
    pub fn new(items: Vec<SelectItem>, checked: bool) -> Self {
        let checked = vec![checked; items.len()];
        Self { items, checked, cursor: 0 }
    }

    pub fn items(&self) -> &[SelectItem] {
        &self.items
    }

    pub fn is_checked(&self, index: usize) -> bool {
        self.checked.get(index).copied().unwrap_or(false)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_by(&mut self, delta: isize) {
        if self.items.is_empty() {
            return;
        }
        let last = self.items.len() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    pub fn toggle(&mut self) {
        if let Some(c) = self.checked.get_mut(self.cursor) {
            *c = !*c;
        }
    }

    pub fn select_all(&mut self) {
        self.checked.iter_mut().for_each(|c| {
            *c = true;
        });
    }

    pub fn select_none(&mut self) {
        self.checked.iter_mut().for_each(|c| {
            *c = false;
        });
    }

    pub fn selected_count(&self) -> usize {
        self.checked
            .iter()
            .filter(|c| **c)
            .count()
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.checked
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.then_some(i))
            .collect()
    }
}

/// Single-line path editor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathInput {
    value: String,
}

impl PathInput {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn push(&mut self, c: char) {
        self.value.push(c);
    }

    pub fn backspace(&mut self) {
        self.value.pop();
    }

    pub fn clear(&mut self) {
        self.value.clear();
    }

    /// Expands `~` and resolves relative paths against `cwd`.
    pub fn resolve_in(&self, cwd: &Path, home: Option<&Path>) -> Result<PathBuf, WizardError> {
        let raw = self.value.trim();
        if raw.is_empty() {
            return Err(WizardError::EmptyPath);
        }
        let expanded = if raw == "~" {
            home.ok_or(WizardError::NoHomeDir)?.to_path_buf()
        } else if let Some(rest) = raw.strip_prefix("~/") {
            home.ok_or(WizardError::NoHomeDir)?.join(rest)
        } else {
            PathBuf::from(raw)
        };
        Ok(if expanded.is_absolute() { expanded } else { cwd.join(expanded) })
    }

    pub fn resolve(&self) -> Result<PathBuf, WizardError> {
        let cwd = std::env::current_dir().unwrap_or_default();
        self.resolve_in(&cwd, dirs::home_dir().as_deref())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportStep {
    #[default]
    Select,
    Path,
}

/// `select -> path`. Every resource starts checked.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportWizard {
    pub step: ExportStep,
    pub select: MultiSelect,
    pub path: PathInput,
    resources: Vec<Resource>,
}

impl ExportWizard {
    pub fn new(resources: Vec<Resource>, default_path: impl Into<String>) -> Self {
        let items = resources
            .iter()
            .map(|r| SelectItem { label: r.name().to_string(), tag: r.kind_tag().to_string() })
            .collect();
        Self {
            step: ExportStep::Select,
            select: MultiSelect::new(items, true),
            path: PathInput::new(default_path),
            resources,
        }
    }

    /// Select to Path. Refused while nothing is checked.
    pub fn advance(&mut self) -> Result<ExportStep, WizardError> {
        if self.step == ExportStep::Select {
            if self.select.selected_count() == 0 {
                return Err(WizardError::EmptySelection);
            }
            self.step = ExportStep::Path;
        }
        Ok(self.step)
    }

    pub fn back(&mut self) {
        self.step = ExportStep::Select;
    }

    pub fn selected_resources(&self) -> Vec<Resource> {
        self.select
            .selected_indices()
            .into_iter()
            .filter_map(|i| self.resources.get(i).cloned())
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImportStep {
    #[default]
    Path,
    Select,
}

/// `path -> select`. The select step exists only for project files, and
/// starts with nothing checked.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportWizard {
    pub step: ImportStep,
    pub path: PathInput,
    pub select: MultiSelect,
    plan: Option<ImportPlan>,
}

impl ImportWizard {
    pub fn new(default_path: impl Into<String>) -> Self {
        Self {
            step: ImportStep::Path,
            path: PathInput::new(default_path),
            select: MultiSelect::default(),
            plan: None,
        }
    }

    pub fn enter_select(&mut self, plan: ImportPlan) {
        let items = plan.items
            .iter()
            .map(|i| SelectItem { label: i.name().to_string(), tag: i.kind_tag().to_string() })
            .collect();
        self.select = MultiSelect::new(items, false);
        self.plan = Some(plan);
        self.step = ImportStep::Select;
    }

    pub fn plan(&self) -> Option<&ImportPlan> {
        self.plan.as_ref()
    }

    pub fn back(&mut self) {
        self.step = ImportStep::Path;
        self.plan = None;
        self.select = MultiSelect::default();
    }

    pub fn selected_items(&self) -> Result<Vec<ImportItem>, WizardError> {
        let Some(plan) = &self.plan else {
            return Err(WizardError::EmptySelection);
        };
        let items: Vec<_> = self.select
            .selected_indices()
            .into_iter()
            .filter_map(|i| plan.items.get(i).cloned())
            .collect();
        if items.is_empty() {
            return Err(WizardError::EmptySelection);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ Application, ResourcePayload };
    use crate::transfer::{ ApplicationExport, ExportKind };

    fn resources(n: usize) -> Vec<Resource> {
        (0..n)
            .map(|i| Resource {
                project_id: "p".into(),
                environment_id: "e".into(),
                payload: ResourcePayload::Application(Application {
                    application_id: format!("a{}", i),
                    name: format!("app{}", i),
                    ..Default::default()
                }),
            })
            .collect()
    }

    #[test]
    fn test_export_defaults_to_all_selected() {
        let wizard = ExportWizard::new(resources(3), "./shop-export.json");
        assert_eq!(wizard.select.selected_count(), 3);
        assert_eq!(wizard.selected_resources().len(), 3);
    }

    #[test]
    fn test_export_with_nothing_selected_stays_on_select() {
        let mut wizard = ExportWizard::new(resources(2), "./shop-export.json");
        wizard.select.select_none();

        assert_eq!(wizard.advance(), Err(WizardError::EmptySelection));
        assert_eq!(wizard.step, ExportStep::Select);

        wizard.select.toggle();
        assert_eq!(wizard.advance(), Ok(ExportStep::Path));
        assert_eq!(wizard.selected_resources()[0].name(), "app0");
    }

    #[test]
    fn test_cursor_clamps() {
        let mut select = MultiSelect::new(
            vec![
                SelectItem { label: "a".into(), tag: "x".into() },
                SelectItem { label: "b".into(), tag: "x".into() }
            ],
            false
        );
        select.move_by(-1);
        assert_eq!(select.cursor(), 0);
        select.move_by(5);
        assert_eq!(select.cursor(), 1);
        select.toggle();
        assert_eq!(select.selected_indices(), vec![1]);
        select.select_all();
        assert_eq!(select.selected_count(), 2);
    }

    #[test]
    fn test_path_resolution() {
        let cwd = Path::new("/work");
        let home = Some(Path::new("/home/ops"));

        assert_eq!(PathInput::new("~/x.json").resolve_in(cwd, home), Ok(PathBuf::from("/home/ops/x.json")));
        assert_eq!(PathInput::new("out/x.json").resolve_in(cwd, home), Ok(PathBuf::from("/work/out/x.json")));
        assert_eq!(PathInput::new("/tmp/x.json").resolve_in(cwd, home), Ok(PathBuf::from("/tmp/x.json")));
        assert_eq!(PathInput::new("   ").resolve_in(cwd, home), Err(WizardError::EmptyPath));
        assert_eq!(PathInput::new("~").resolve_in(cwd, None), Err(WizardError::NoHomeDir));
    }

    #[test]
    fn test_import_select_starts_empty() {
        let mut wizard = ImportWizard::new("./shop-export.json");
        wizard.enter_select(ImportPlan {
            kind: ExportKind::Project,
            source_name: "shop".into(),
            items: vec![
                ImportItem::Application(ApplicationExport { name: "web".into(), ..Default::default() }),
                ImportItem::Application(ApplicationExport { name: "api".into(), ..Default::default() })
            ],
        });

        assert_eq!(wizard.step, ImportStep::Select);
        assert_eq!(wizard.selected_items(), Err(WizardError::EmptySelection));

        wizard.select.move_by(1);
        wizard.select.toggle();
        let picked = wizard.selected_items().unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "api");

        wizard.back();
        assert_eq!(wizard.step, ImportStep::Path);
        assert!(wizard.plan().is_none());
    }
}
