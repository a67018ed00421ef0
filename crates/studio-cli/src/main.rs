mod studio;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use studio_contracts::events::{EventKind, EventWriter};
use studio_contracts::history::export_item_image;
use studio_contracts::settings::{mask_secret, ConfigOverrides, StudioConfig};
use studio_contracts::{EnhancementOptions, HistoryStore, Language, UpscaleFactor};
use studio_engine::{AppState, ImageAsset, Orchestrator};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sentient-studio",
    version,
    about = "Compose and restore photos with Gemini image models"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
struct GlobalArgs {
    /// Data directory holding history.json, settings.json and events.jsonl.
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    /// Use the offline transport instead of the Gemini API.
    #[arg(long, global = true)]
    dryrun: bool,
    #[arg(long, global = true)]
    text_model: Option<String>,
    #[arg(long, global = true)]
    image_model: Option<String>,
    /// Language instructions are written in (ko or en).
    #[arg(long, global = true)]
    language: Option<Language>,
    /// Send instructions to the image model without translating them.
    #[arg(long, global = true)]
    no_translate: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the text model for a compose instruction.
    Suggest(SuggestArgs),
    /// Composite object images into a base image.
    Compose(ComposeArgs),
    /// Repair, colorize and upscale a photo.
    Restore(RestoreArgs),
    #[command(subcommand)]
    History(HistoryCommand),
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Interactive session (the default).
    Studio,
}

#[derive(Debug, Args)]
struct SuggestArgs {
    #[arg(long)]
    base: PathBuf,
    #[arg(long = "object", required = true)]
    objects: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ComposeArgs {
    #[arg(long)]
    base: PathBuf,
    #[arg(long = "object", required = true)]
    objects: Vec<PathBuf>,
    /// Instruction text; defaults to the built-in compose instruction.
    #[arg(long)]
    prompt: Option<String>,
    /// Replace the instruction with a model suggestion first.
    #[arg(long, conflicts_with = "prompt")]
    suggest: bool,
    /// Directory the result image is written to.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct RestoreArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    no_repair: bool,
    #[arg(long)]
    no_colorize: bool,
    #[arg(long, default_value = "2x")]
    upscale: UpscaleFactor,
    /// Instruction text; defaults to one built from the options.
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    /// List archived results, newest first.
    List {
        #[arg(long)]
        json: bool,
    },
    Remove {
        id: String,
    },
    Export {
        id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print the stored instruction of an item.
    Prompt {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Save an API key; reads it from stdin when omitted.
    SetKey {
        key: Option<String>,
    },
    ClearKey,
    Show,
    /// Send a tiny request to check the key and endpoint.
    Test,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("sentient-studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    let config = resolve_config(&cli.global)?;
    tracing::debug!(home = %config.home.display(), dryrun = config.dryrun, "configuration resolved");

    match cli.command.unwrap_or(Command::Studio) {
        Command::Suggest(args) => run_suggest(&config, args),
        Command::Compose(args) => run_compose(&config, args),
        Command::Restore(args) => run_restore(&config, args),
        Command::History(command) => run_history(&config, command),
        Command::Settings(command) => run_settings(&config, command),
        Command::Studio => studio::run_studio(&config).map(|_| 0),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn resolve_config(global: &GlobalArgs) -> Result<StudioConfig> {
    let overrides = ConfigOverrides {
        home: global.home.clone(),
        text_model: global.text_model.clone(),
        image_model: global.image_model.clone(),
        language: global.language,
        translate: global.no_translate.then_some(false),
        dryrun: global.dryrun,
        ..ConfigOverrides::default()
    };
    Ok(StudioConfig::resolve(overrides)?)
}

/// Orchestrator, archive state and journal for one invocation.
pub(crate) fn open_studio(config: &StudioConfig) -> Result<(Orchestrator, AppState)> {
    if !config.dryrun {
        config.require_api_key()?;
    }
    std::fs::create_dir_all(&config.home)
        .with_context(|| format!("failed to create {}", config.home.display()))?;
    let events = EventWriter::for_new_session(config.events_path());
    events.record(
        EventKind::SessionStarted,
        json_object(json!({
            "home": config.home.to_string_lossy(),
            "dryrun": config.dryrun,
            "text_model": config.text_model,
            "image_model": config.image_model,
            "language": config.language.as_str(),
        })),
    );
    let orchestrator = Orchestrator::from_config(config).with_events(events.clone());
    let state = AppState::load(HistoryStore::new(config.history_path()), config.language)
        .with_events(events);
    Ok((orchestrator, state))
}

fn load_assets(paths: &[PathBuf]) -> Result<Vec<ImageAsset>> {
    paths
        .iter()
        .map(|path| ImageAsset::from_path(path))
        .collect()
}

fn run_suggest(config: &StudioConfig, args: SuggestArgs) -> Result<i32> {
    let (orchestrator, _) = open_studio(config)?;
    let base = ImageAsset::from_path(&args.base)?;
    let objects = load_assets(&args.objects)?;
    let text = orchestrator.suggest_composition_prompt(Some(&base), &objects)?;
    println!("{text}");
    Ok(0)
}

fn run_compose(config: &StudioConfig, args: ComposeArgs) -> Result<i32> {
    let (orchestrator, mut state) = open_studio(config)?;
    {
        let draft = state.compose_mut();
        draft.base = Some(ImageAsset::from_path(&args.base)?);
        draft.objects = load_assets(&args.objects)?;
        if let Some(prompt) = args.prompt {
            draft.instruction = prompt;
        }
    }
    if args.suggest {
        let text = state.suggest_compose_instruction(&orchestrator)?;
        println!("Instruction: {text}");
    }
    let item = state.submit_compose(&orchestrator)?;
    print_saved(&item, &args.out)
}

fn run_restore(config: &StudioConfig, args: RestoreArgs) -> Result<i32> {
    let (orchestrator, mut state) = open_studio(config)?;
    state.set_restore_options(EnhancementOptions {
        repair_damage: !args.no_repair,
        colorize: !args.no_colorize,
        upscale: args.upscale,
    });
    state.restore_mut().target = Some(ImageAsset::from_path(&args.image)?);
    if let Some(prompt) = args.prompt {
        state.restore_mut().instruction = prompt;
    }
    let item = state.submit_restore(&orchestrator)?;
    print_saved(&item, &args.out)
}

fn print_saved(item: &studio_contracts::HistoryItem, out: &Path) -> Result<i32> {
    let path = export_item_image(item, out)?;
    println!("Saved {}", path.display());
    println!("History id: {}", item.id);
    println!("Label: {}", item.prompt);
    Ok(0)
}

fn run_history(config: &StudioConfig, command: HistoryCommand) -> Result<i32> {
    let mut state = AppState::load(HistoryStore::new(config.history_path()), config.language)
        .with_events(EventWriter::for_new_session(config.events_path()));
    match command {
        HistoryCommand::List { json } => {
            if json {
                let rows: Vec<serde_json::Value> = state
                    .history()
                    .iter()
                    .map(|item| {
                        json!({
                            "id": item.id,
                            "type": item.operation.as_str(),
                            "prompt": item.prompt,
                            "timestamp": item.timestamp,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if state.history().is_empty() {
                println!("No archived results.");
            } else {
                for item in state.history() {
                    println!("{}", studio::archive_line(item, config.language));
                }
            }
        }
        HistoryCommand::Remove { id } => {
            let id = state.find_history(&id)?.id;
            state.delete_history(&id)?;
            println!("Removed {id}");
        }
        HistoryCommand::Export { id, out } => {
            let item = state.find_history(&id)?;
            let path = export_item_image(&item, &out)?;
            println!("Saved {}", path.display());
        }
        HistoryCommand::Prompt { id } => {
            println!("{}", state.find_history(&id)?.prompt);
        }
    }
    Ok(0)
}

fn run_settings(config: &StudioConfig, command: SettingsCommand) -> Result<i32> {
    let settings = config.settings();
    match command {
        SettingsCommand::SetKey { key } => {
            let key = match key {
                Some(key) => key,
                None => read_secret_line()?,
            };
            settings.save_api_key(&key)?;
            println!("API key saved to {}", settings.path().display());
            if std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("GOOGLE_API_KEY").is_ok() {
                println!("Note: an API key in the environment takes precedence over the saved key.");
            }
        }
        SettingsCommand::ClearKey => {
            settings.clear_api_key()?;
            println!("Saved API key removed.");
        }
        SettingsCommand::Show => {
            let key = config
                .api_key
                .as_deref()
                .map(mask_secret)
                .unwrap_or_else(|| "(not set)".to_string());
            println!("home:        {}", config.home.display());
            println!("api key:     {key}");
            println!("api base:    {}", config.api_base);
            println!("text model:  {}", config.text_model);
            println!("image model: {}", config.image_model);
            println!("language:    {}", config.language.display_name());
            println!("translate:   {}", if config.translate { "on" } else { "off" });
            println!("timeout:     {}s", config.request_timeout_s);
            if config.dryrun {
                println!("mode:        dryrun");
            }
        }
        SettingsCommand::Test => {
            let (orchestrator, _) = match open_studio(config) {
                Ok(opened) => opened,
                Err(err) => {
                    println!("Connection test failed: {err:#}");
                    return Ok(0);
                }
            };
            match orchestrator.test_connection() {
                Ok(reply) => println!("Connection OK ({}): {reply}", orchestrator.text_model()),
                Err(err) => println!("Connection test failed: {err}"),
            }
        }
    }
    Ok(0)
}

fn read_secret_line() -> Result<String> {
    print!("API key: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let key = line.trim().to_string();
    if key.is_empty() {
        bail!("no API key entered");
    }
    Ok(key)
}

pub(crate) fn json_object(value: serde_json::Value) -> studio_contracts::events::EventPayload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => studio_contracts::events::EventPayload::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn studio_is_the_default_command() {
        let cli = Cli::try_parse_from(["sentient-studio", "--dryrun"]).map_err(|err| err.to_string());
        let cli = match cli {
            Ok(cli) => cli,
            Err(err) => panic!("{err}"),
        };
        assert!(cli.command.is_none());
        assert!(cli.global.dryrun);
    }

    #[test]
    fn compose_requires_an_object() {
        let parsed = Cli::try_parse_from(["sentient-studio", "compose", "--base", "a.png"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn restore_parses_options_and_global_flags() {
        let parsed = Cli::try_parse_from([
            "sentient-studio",
            "restore",
            "--image",
            "old.jpg",
            "--no-repair",
            "--upscale",
            "4x",
            "--language",
            "en",
        ]);
        let Ok(Cli {
            global,
            command: Some(Command::Restore(args)),
        }) = parsed
        else {
            panic!("expected restore command");
        };
        assert!(args.no_repair);
        assert!(!args.no_colorize);
        assert_eq!(args.upscale, UpscaleFactor::X4);
        assert_eq!(global.language, Some(Language::English));
    }

    #[test]
    fn dryrun_compose_writes_result_and_archives_it() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let home = temp.path().join("home");
        let out = temp.path().join("out");
        let base = temp.path().join("base.png");
        let object = temp.path().join("object.png");
        std::fs::write(&base, b"base")?;
        std::fs::write(&object, b"object")?;

        let global = GlobalArgs {
            home: Some(home.clone()),
            dryrun: true,
            text_model: None,
            image_model: None,
            language: Some(Language::English),
            no_translate: false,
            verbose: false,
        };
        let config = resolve_config(&global)?;
        let code = run_compose(
            &config,
            ComposeArgs {
                base,
                objects: vec![object],
                prompt: Some("place glasses on the face".to_string()),
                suggest: false,
                out: out.clone(),
            },
        )?;
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_dir(&out)?.count(), 1);

        let items = HistoryStore::new(config.history_path()).list_all();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].prompt, "place glasses on the face");
        let journal = std::fs::read_to_string(config.events_path())?;
        assert!(journal.contains("\"session_started\""));
        assert!(journal.contains("\"history_added\""));
        Ok(())
    }
}
