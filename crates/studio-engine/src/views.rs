use serde_json::json;
use studio_contracts::events::{EventKind, EventWriter};
use studio_contracts::{
    EnhancementOptions, HistoryItem, HistoryStore, Language, OperationType, StudioError,
    StudioResult, UpscaleFactor,
};

use crate::assets::{GeneratedImage, ImageAsset};
use crate::orchestrator::{map_object, Orchestrator};
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppView {
    #[default]
    Home,
    Compose,
    Restore,
    Archive,
}

impl AppView {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Compose => "compose",
            Self::Restore => "restore",
            Self::Archive => "archive",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposeDraft {
    pub base: Option<ImageAsset>,
    pub objects: Vec<ImageAsset>,
    pub instruction: String,
    pub result: Option<GeneratedImage>,
    pub error: Option<String>,
    pub busy: bool,
}

impl ComposeDraft {
    pub fn new(language: Language) -> Self {
        Self {
            base: None,
            objects: Vec::new(),
            instruction: prompts::default_compose_instruction(language).to_string(),
            result: None,
            error: None,
            busy: false,
        }
    }

    /// Removes the object at a 1-based position.
    pub fn remove_object(&mut self, position: usize) -> Option<ImageAsset> {
        if position == 0 || position > self.objects.len() {
            return None;
        }
        Some(self.objects.remove(position - 1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreDraft {
    pub target: Option<ImageAsset>,
    pub options: EnhancementOptions,
    pub instruction: String,
    pub result: Option<GeneratedImage>,
    pub error: Option<String>,
    pub busy: bool,
}

impl RestoreDraft {
    pub fn new(language: Language) -> Self {
        let options = EnhancementOptions::default();
        Self {
            target: None,
            options,
            instruction: prompts::build_restore_instruction(&options, language),
            result: None,
            error: None,
            busy: false,
        }
    }
}

/// Session state for the interactive studio.
///
/// Drafts survive view switches. The archive list mirrors the history store
/// and only changes after the store accepted the write.
pub struct AppState {
    view: AppView,
    language: Language,
    compose: ComposeDraft,
    restore: RestoreDraft,
    history: Vec<HistoryItem>,
    store: HistoryStore,
    events: Option<EventWriter>,
}

impl AppState {
    pub fn load(store: HistoryStore, language: Language) -> Self {
        let history = store.list_all();
        tracing::debug!(items = history.len(), "history loaded");
        Self {
            view: AppView::default(),
            language,
            compose: ComposeDraft::new(language),
            restore: RestoreDraft::new(language),
            history,
            store,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn view(&self) -> AppView {
        self.view
    }

    pub fn set_view(&mut self, view: AppView) {
        self.view = view;
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Switches language. Instructions still at their generated default
    /// follow the new language; edited ones are kept.
    pub fn set_language(&mut self, language: Language) {
        if language == self.language {
            return;
        }
        if self.compose.instruction == prompts::default_compose_instruction(self.language) {
            self.compose.instruction = prompts::default_compose_instruction(language).to_string();
        }
        if self.restore.instruction
            == prompts::build_restore_instruction(&self.restore.options, self.language)
        {
            self.restore.instruction =
                prompts::build_restore_instruction(&self.restore.options, language);
        }
        self.language = language;
    }

    pub fn compose(&self) -> &ComposeDraft {
        &self.compose
    }

    pub fn compose_mut(&mut self) -> &mut ComposeDraft {
        &mut self.compose
    }

    pub fn restore(&self) -> &RestoreDraft {
        &self.restore
    }

    pub fn restore_mut(&mut self) -> &mut RestoreDraft {
        &mut self.restore
    }

    /// Replaces the restore options and regenerates the instruction.
    pub fn set_restore_options(&mut self, options: EnhancementOptions) {
        self.restore.options = options;
        self.restore.instruction = prompts::build_restore_instruction(&options, self.language);
    }

    pub fn set_repair(&mut self, enabled: bool) {
        let mut options = self.restore.options;
        options.repair_damage = enabled;
        self.set_restore_options(options);
    }

    pub fn set_colorize(&mut self, enabled: bool) {
        let mut options = self.restore.options;
        options.colorize = enabled;
        self.set_restore_options(options);
    }

    pub fn set_upscale(&mut self, upscale: UpscaleFactor) {
        let mut options = self.restore.options;
        options.upscale = upscale;
        self.set_restore_options(options);
    }

    /// Resets the draft of the active screen. Home and Archive reset nothing.
    pub fn reset_current(&mut self) -> bool {
        match self.view {
            AppView::Compose => {
                self.compose = ComposeDraft::new(self.language);
                true
            }
            AppView::Restore => {
                self.restore = RestoreDraft::new(self.language);
                true
            }
            AppView::Home | AppView::Archive => false,
        }
    }

    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    /// Re-reads the archive from the store.
    pub fn reload_history(&mut self) {
        self.history = self.store.list_all();
    }

    /// Finds an archive entry by full id or unique id prefix.
    ///
    /// Full ids are looked up in the store, so entries archived by another
    /// session since the last reload are found too.
    pub fn find_history(&self, id_or_prefix: &str) -> StudioResult<HistoryItem> {
        let needle = id_or_prefix.trim();
        if needle.is_empty() {
            return Err(StudioError::validation("Give a history id."));
        }
        if let Some(item) = self.store.get(needle) {
            return Ok(item);
        }
        let matches: Vec<&HistoryItem> = self
            .history
            .iter()
            .filter(|item| item.id.starts_with(needle))
            .collect();
        match matches.as_slice() {
            [item] => Ok((*item).clone()),
            [] => Err(StudioError::validation(format!("No history item '{needle}'."))),
            _ => Err(StudioError::validation(format!(
                "History id '{needle}' is ambiguous ({} matches).",
                matches.len()
            ))),
        }
    }

    /// Fills the compose instruction with a model suggestion.
    pub fn suggest_compose_instruction(&mut self, orchestrator: &Orchestrator) -> StudioResult<String> {
        if self.compose.busy {
            return Err(StudioError::validation("A composition request is already running."));
        }
        self.compose.busy = true;
        let outcome =
            orchestrator.suggest_composition_prompt(self.compose.base.as_ref(), &self.compose.objects);
        self.compose.busy = false;
        match outcome {
            Ok(text) => {
                self.compose.instruction = text.clone();
                self.compose.error = None;
                Ok(text)
            }
            Err(err) => {
                self.compose.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn submit_compose(&mut self, orchestrator: &Orchestrator) -> StudioResult<HistoryItem> {
        if self.compose.busy {
            return Err(StudioError::validation("A composition request is already running."));
        }
        self.compose.busy = true;
        self.compose.error = None;
        let instruction =
            prompts::compose_instruction_or_default(&self.compose.instruction, self.language);
        let outcome = orchestrator
            .compose_images(self.compose.base.as_ref(), &self.compose.objects, &instruction)
            .and_then(|image| {
                let label = orchestrator.caption_or(&image, &instruction);
                self.compose.result = Some(image.clone());
                self.archive(HistoryItem::new(image.data_url(), label, OperationType::Compose))
            });
        self.compose.busy = false;
        if let Err(err) = &outcome {
            self.compose.error = Some(err.to_string());
        }
        outcome
    }

    pub fn submit_restore(&mut self, orchestrator: &Orchestrator) -> StudioResult<HistoryItem> {
        if self.restore.busy {
            return Err(StudioError::validation("A restoration request is already running."));
        }
        self.restore.busy = true;
        self.restore.error = None;
        let instruction =
            prompts::restore_instruction_or_default(&self.restore.instruction, self.language);
        let outcome = orchestrator
            .restore_image(self.restore.target.as_ref(), &instruction)
            .and_then(|image| {
                self.restore.result = Some(image.clone());
                self.archive(HistoryItem::new(image.data_url(), instruction.clone(), OperationType::Restore))
            });
        self.restore.busy = false;
        if let Err(err) = &outcome {
            self.restore.error = Some(err.to_string());
        }
        outcome
    }

    /// Deletes from the store, then from the in-memory list.
    pub fn delete_history(&mut self, id: &str) -> StudioResult<()> {
        self.store.remove(id)?;
        self.history.retain(|item| item.id != id);
        self.record(EventKind::HistoryRemoved, json!({"id": id}));
        Ok(())
    }

    fn archive(&mut self, item: HistoryItem) -> StudioResult<HistoryItem> {
        self.store.add(item.clone())?;
        self.history.insert(0, item.clone());
        self.record(
            EventKind::HistoryAdded,
            json!({"id": item.id, "type": item.operation.as_str()}),
        );
        Ok(item)
    }

    fn record(&self, kind: EventKind, payload: serde_json::Value) {
        if let Some(events) = &self.events {
            events.record(kind, map_object(payload));
        }
    }
}
