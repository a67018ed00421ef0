use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use studio_contracts::history::{export_image, export_item_image};
use studio_contracts::session::{help_commands, parse_intent, Intent};
use studio_contracts::settings::{SettingsStore, StudioConfig, KEY_LANGUAGE};
use studio_contracts::{DataUrl, HistoryItem, Language, OperationType, StudioError, UpscaleFactor};
use studio_engine::prompts;
use studio_engine::{AppState, AppView, ImageAsset, Orchestrator};

const PROMPT_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

/// Line-driven front end over [`AppState`].
pub(crate) struct StudioSession {
    state: AppState,
    orchestrator: Orchestrator,
    settings: SettingsStore,
}

pub(crate) fn run_studio(config: &StudioConfig) -> Result<()> {
    let (orchestrator, state) = crate::open_studio(config)?;
    let mut session = StudioSession::new(state, orchestrator, config.settings());
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    writeln!(stdout, "Sentient Studio started. Type /help for commands.")?;
    session.show(&mut stdout)?;
    loop {
        write!(stdout, "{}> ", session.state.view().as_str())?;
        stdout.flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }
        let input = line.trim_end_matches(['\n', '\r']);
        if session.handle_line(input, &mut stdout)? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

impl StudioSession {
    pub(crate) fn new(state: AppState, orchestrator: Orchestrator, settings: SettingsStore) -> Self {
        Self {
            state,
            orchestrator,
            settings,
        }
    }

    /// Runs one input line. Command failures are printed; only output errors
    /// end the session.
    pub(crate) fn handle_line(&mut self, input: &str, out: &mut dyn Write) -> Result<Flow> {
        let intent = parse_intent(input);
        match self.handle(&intent, out) {
            Ok(flow) => Ok(flow),
            Err(err) => {
                writeln!(out, "Error: {err:#}")?;
                Ok(Flow::Continue)
            }
        }
    }

    fn handle(&mut self, intent: &Intent, out: &mut dyn Write) -> Result<Flow> {
        match intent.action.as_str() {
            "noop" => {}
            "help" => {
                writeln!(out, "Commands: {}", help_commands().join("  "))?;
                writeln!(out, "Plain text edits the instruction of the current screen.")?;
            }
            "quit" => return Ok(Flow::Quit),
            "view_home" => self.switch(AppView::Home, out)?,
            "view_compose" => self.switch(AppView::Compose, out)?,
            "view_restore" => self.switch(AppView::Restore, out)?,
            "view_archive" => {
                self.state.reload_history();
                self.switch(AppView::Archive, out)?;
            }
            "show" => self.show(out)?,
            "set_base_image" => {
                let asset = load_asset(intent.arg_str("path"), "/base")?;
                writeln!(out, "Base image: {}", asset.summary())?;
                self.state.compose_mut().base = Some(asset);
                self.state.set_view(AppView::Compose);
            }
            "add_objects" => {
                let paths = intent.arg_list("paths");
                if paths.is_empty() {
                    return Err(StudioError::validation("/object requires at least one path").into());
                }
                for path in paths {
                    let asset = ImageAsset::from_path(Path::new(&path))?;
                    writeln!(out, "Object {}: {}", self.state.compose().objects.len() + 1, asset.summary())?;
                    self.state.compose_mut().objects.push(asset);
                }
                self.state.set_view(AppView::Compose);
            }
            "remove_object" => {
                let position = intent
                    .arg_str("arg")
                    .and_then(|raw| raw.parse::<usize>().ok())
                    .ok_or_else(|| StudioError::validation("/unobject requires an object number"))?;
                match self.state.compose_mut().remove_object(position) {
                    Some(asset) => writeln!(out, "Removed object {position} ({})", asset.name)?,
                    None => writeln!(out, "No object {position}.")?,
                }
            }
            "set_restore_image" => {
                let asset = load_asset(intent.arg_str("path"), "/image")?;
                writeln!(out, "Photo: {}", asset.summary())?;
                self.state.restore_mut().target = Some(asset);
                self.state.set_view(AppView::Restore);
            }
            "set_prompt" => {
                let text = intent.prompt.clone().unwrap_or_default();
                match self.state.view() {
                    AppView::Compose => self.state.compose_mut().instruction = text,
                    AppView::Restore => self.state.restore_mut().instruction = text,
                    AppView::Home | AppView::Archive => {
                        writeln!(out, "Open /compose or /restore to edit an instruction.")?;
                        return Ok(Flow::Continue);
                    }
                }
                writeln!(out, "Instruction updated.")?;
            }
            "default_prompt" => {
                let language = self.state.language();
                match self.state.view() {
                    AppView::Compose => {
                        self.state.compose_mut().instruction =
                            prompts::default_compose_instruction(language).to_string();
                    }
                    AppView::Restore => {
                        let options = self.state.restore().options;
                        self.state.set_restore_options(options);
                    }
                    AppView::Home | AppView::Archive => {
                        writeln!(out, "Open /compose or /restore first.")?;
                        return Ok(Flow::Continue);
                    }
                }
                writeln!(out, "Instruction: {}", self.current_instruction())?;
            }
            "set_repair" => {
                let enabled = intent
                    .arg_flag("enabled")
                    .unwrap_or(!self.state.restore().options.repair_damage);
                self.state.set_repair(enabled);
                self.print_restore_options(out)?;
            }
            "set_colorize" => {
                let enabled = intent
                    .arg_flag("enabled")
                    .unwrap_or(!self.state.restore().options.colorize);
                self.state.set_colorize(enabled);
                self.print_restore_options(out)?;
            }
            "set_upscale" => {
                let factor: UpscaleFactor = intent.arg_str("arg").unwrap_or("").parse()?;
                self.state.set_upscale(factor);
                self.print_restore_options(out)?;
            }
            "suggest" => {
                writeln!(out, "Asking for an instruction...")?;
                let text = self.state.suggest_compose_instruction(&self.orchestrator)?;
                writeln!(out, "Instruction: {text}")?;
            }
            "submit" => self.submit(out)?,
            "save_result" => {
                let dir = intent
                    .arg_list("paths")
                    .into_iter()
                    .next()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                let (operation, result) = match self.state.view() {
                    AppView::Compose => (OperationType::Compose, self.state.compose().result.clone()),
                    AppView::Restore => (OperationType::Restore, self.state.restore().result.clone()),
                    AppView::Home | AppView::Archive => {
                        writeln!(out, "Open /compose or /restore to save its result.")?;
                        return Ok(Flow::Continue);
                    }
                };
                let Some(result) = result else {
                    writeln!(out, "Nothing to save yet. Use /run first.")?;
                    return Ok(Flow::Continue);
                };
                let path = export_image(
                    operation,
                    &DataUrl::new(result.mime_type.clone(), result.bytes.clone()),
                    &dir,
                )?;
                writeln!(out, "Saved {}", path.display())?;
            }
            "export" => {
                let args = intent.arg_list("paths");
                let Some(id) = args.first() else {
                    return Err(StudioError::validation("/export requires a history id").into());
                };
                let dir = args.get(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
                let path = export_item_image(&self.state.find_history(id)?, &dir)?;
                writeln!(out, "Saved {}", path.display())?;
            }
            "copy_prompt" => {
                let item = self.state.find_history(intent.arg_str("arg").unwrap_or(""))?;
                writeln!(out, "{}", item.prompt)?;
            }
            "delete" => {
                let id = self
                    .state
                    .find_history(intent.arg_str("arg").unwrap_or(""))?
                    .id;
                self.state.delete_history(&id)?;
                writeln!(out, "Deleted {}", short_id(&id))?;
            }
            "set_language" => {
                let language: Language = intent.arg_str("arg").unwrap_or("").parse()?;
                self.state.set_language(language);
                self.orchestrator.set_language(language);
                if let Err(err) = self
                    .settings
                    .set(KEY_LANGUAGE, serde_json::Value::String(language.as_str().to_string()))
                {
                    tracing::warn!(error = %err, "language not persisted");
                }
                writeln!(out, "Language: {}", language.display_name())?;
            }
            "reset" => {
                if self.state.reset_current() {
                    writeln!(out, "Screen reset.")?;
                    self.show(out)?;
                } else {
                    writeln!(out, "Nothing to reset here.")?;
                }
            }
            _ => {
                let command = intent
                    .command_args
                    .get("command")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("");
                writeln!(out, "Unknown command /{command}. Type /help.")?;
            }
        }
        Ok(Flow::Continue)
    }

    fn switch(&mut self, view: AppView, out: &mut dyn Write) -> Result<()> {
        self.state.set_view(view);
        self.show(out)
    }

    fn submit(&mut self, out: &mut dyn Write) -> Result<()> {
        let item = match self.state.view() {
            AppView::Compose => {
                writeln!(out, "Composing...")?;
                self.state.submit_compose(&self.orchestrator)?
            }
            AppView::Restore => {
                writeln!(out, "Restoring...")?;
                self.state.submit_restore(&self.orchestrator)?
            }
            AppView::Home | AppView::Archive => {
                writeln!(out, "Open /compose or /restore to run an edit.")?;
                return Ok(());
            }
        };
        writeln!(out, "Done. Archived as {}: {}", short_id(&item.id), item.prompt)?;
        writeln!(out, "Use /save [dir] to write the image.")?;
        Ok(())
    }

    fn current_instruction(&self) -> &str {
        match self.state.view() {
            AppView::Restore => &self.state.restore().instruction,
            _ => &self.state.compose().instruction,
        }
    }

    fn print_restore_options(&self, out: &mut dyn Write) -> Result<()> {
        let options = self.state.restore().options;
        writeln!(
            out,
            "repair: {}  colorize: {}  upscale: {}",
            on_off(options.repair_damage),
            on_off(options.colorize),
            options.upscale.display()
        )?;
        writeln!(out, "Instruction: {}", self.state.restore().instruction)?;
        Ok(())
    }

    pub(crate) fn show(&self, out: &mut dyn Write) -> Result<()> {
        let language = self.state.language();
        match self.state.view() {
            AppView::Home => {
                writeln!(out, "[Home]")?;
                writeln!(
                    out,
                    "  /compose  {}: put objects into a photo",
                    OperationType::Compose.label(language)
                )?;
                writeln!(
                    out,
                    "  /restore  {}: repair, colorize and upscale",
                    OperationType::Restore.label(language)
                )?;
                writeln!(out, "  /archive  {} saved results", self.state.history().len())?;
            }
            AppView::Compose => {
                let draft = self.state.compose();
                writeln!(out, "[{}]", OperationType::Compose.label(language))?;
                writeln!(
                    out,
                    "  base: {}",
                    draft.base.as_ref().map(ImageAsset::summary).unwrap_or_else(|| "(none)".to_string())
                )?;
                if draft.objects.is_empty() {
                    writeln!(out, "  objects: (none)")?;
                }
                for (idx, object) in draft.objects.iter().enumerate() {
                    writeln!(out, "  object {}: {}", idx + 1, object.summary())?;
                }
                writeln!(out, "  instruction: {}", draft.instruction)?;
                write_outcome(out, draft.result.is_some(), draft.error.as_deref())?;
            }
            AppView::Restore => {
                let draft = self.state.restore();
                writeln!(out, "[{}]", OperationType::Restore.label(language))?;
                writeln!(
                    out,
                    "  photo: {}",
                    draft.target.as_ref().map(ImageAsset::summary).unwrap_or_else(|| "(none)".to_string())
                )?;
                writeln!(
                    out,
                    "  repair: {}  colorize: {}  upscale: {}",
                    on_off(draft.options.repair_damage),
                    on_off(draft.options.colorize),
                    draft.options.upscale.display()
                )?;
                writeln!(out, "  instruction: {}", draft.instruction)?;
                write_outcome(out, draft.result.is_some(), draft.error.as_deref())?;
            }
            AppView::Archive => {
                writeln!(out, "[Archive]")?;
                if self.state.history().is_empty() {
                    writeln!(out, "  No archived results.")?;
                }
                for item in self.state.history() {
                    writeln!(out, "  {}", archive_line(item, language))?;
                }
            }
        }
        Ok(())
    }
}

/// `abcd1234  2024-05-01T10:00:00.000Z  Photo restoration  <prompt>`
pub(crate) fn archive_line(item: &HistoryItem, language: Language) -> String {
    let prompt: String = if item.prompt.chars().count() > PROMPT_PREVIEW_CHARS {
        item.prompt.chars().take(PROMPT_PREVIEW_CHARS).collect::<String>() + "…"
    } else {
        item.prompt.clone()
    };
    format!(
        "{}  {}  {}  {}",
        short_id(&item.id),
        item.timestamp,
        item.operation.label(language),
        prompt.replace('\n', " ")
    )
}

fn write_outcome(out: &mut dyn Write, has_result: bool, error: Option<&str>) -> Result<()> {
    if let Some(error) = error {
        writeln!(out, "  error: {error}")?;
    } else if has_result {
        writeln!(out, "  result: ready (/save [dir])")?;
    }
    Ok(())
}

fn load_asset(path: Option<&str>, command: &str) -> Result<ImageAsset> {
    let Some(path) = path else {
        return Err(StudioError::validation(format!("{command} requires a path")).into());
    };
    ImageAsset::from_path(Path::new(path))
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use studio_contracts::settings::ConfigOverrides;
    use studio_contracts::HistoryStore;

    use super::*;

    fn dryrun_session(home: &Path) -> Result<StudioSession> {
        let config = StudioConfig::resolve_in(
            home.to_path_buf(),
            ConfigOverrides {
                dryrun: true,
                language: Some(Language::English),
                ..ConfigOverrides::default()
            },
        )?;
        let (orchestrator, state) = crate::open_studio(&config)?;
        Ok(StudioSession::new(state, orchestrator, config.settings()))
    }

    fn feed(session: &mut StudioSession, lines: &[&str]) -> Result<String> {
        let mut out = Vec::new();
        for line in lines {
            session.handle_line(line, &mut out)?;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    #[test]
    fn compose_flow_archives_and_saves_result() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let base = temp.path().join("person.png");
        let object = temp.path().join("glasses.png");
        fs::write(&base, b"person")?;
        fs::write(&object, b"glasses")?;
        let saved = temp.path().join("saved");

        let mut session = dryrun_session(&temp.path().join("home"))?;
        let output = feed(
            &mut session,
            &[
                &format!("/base {}", base.display()),
                &format!("/object {}", object.display()),
                "place glasses on the face",
                "/run",
                &format!("/save {}", saved.display()),
            ],
        )?;

        assert!(output.contains("Instruction updated."), "{output}");
        assert!(output.contains("Done. Archived as"), "{output}");
        assert_eq!(fs::read_dir(&saved)?.count(), 1);
        let items = HistoryStore::in_dir(&temp.path().join("home")).list_all();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].prompt, "place glasses on the face");
        Ok(())
    }

    #[test]
    fn validation_errors_are_printed_and_session_continues() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = dryrun_session(temp.path())?;
        let mut out = Vec::new();
        let flow = session.handle_line("/restore", &mut out)?;
        assert_eq!(flow, Flow::Continue);
        session.handle_line("/run", &mut out)?;
        let output = String::from_utf8_lossy(&out).into_owned();
        assert!(output.contains("Error: Upload a photo to restore."), "{output}");
        Ok(())
    }

    #[test]
    fn restore_toggles_rewrite_instruction() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = dryrun_session(temp.path())?;
        let output = feed(
            &mut session,
            &["/restore", "/repair off", "/colorize off", "/upscale none"],
        )?;
        assert!(output.contains("repair: off  colorize: off  upscale: 1x"), "{output}");
        assert!(output.contains("Instruction: Please improve this photo."), "{output}");
        Ok(())
    }

    #[test]
    fn archive_commands_copy_and_delete() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = HistoryStore::in_dir(temp.path());
        let item = HistoryItem::new("data:image/png;base64,AQID", "old label", OperationType::Restore);
        store.add(item.clone())?;

        let mut session = dryrun_session(temp.path())?;
        let short = short_id(&item.id).to_string();
        let output = feed(
            &mut session,
            &["/archive", &format!("/copy {short}"), &format!("/delete {short}"), "/archive"],
        )?;
        assert!(output.contains("old label"), "{output}");
        assert!(output.contains(&format!("Deleted {short}")), "{output}");
        assert!(output.ends_with("[Archive]\n  No archived results.\n"), "{output}");
        Ok(())
    }

    #[test]
    fn language_switch_is_persisted() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = dryrun_session(temp.path())?;
        let output = feed(&mut session, &["/language ko", "/restore"])?;
        assert!(output.contains("Language: Korean"), "{output}");
        assert!(output.contains("[사진 복원]"), "{output}");
        assert_eq!(
            SettingsStore::in_dir(temp.path()).get(KEY_LANGUAGE).as_deref(),
            Some("korean")
        );
        Ok(())
    }

    #[test]
    fn quit_and_unknown_commands() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = dryrun_session(temp.path())?;
        let mut out = Vec::new();
        assert_eq!(session.handle_line("/frobnicate", &mut out)?, Flow::Continue);
        assert_eq!(session.handle_line("/exit", &mut out)?, Flow::Quit);
        assert!(String::from_utf8_lossy(&out).contains("Unknown command /frobnicate."));
        Ok(())
    }
}
