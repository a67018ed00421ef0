use serde_json::Value;

/// How the text after a slash command becomes `command_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgShape {
    None,
    /// Kept verbatim under `arg`.
    Raw,
    /// `on`/`off` under `enabled`; anything else is `null` (flip).
    Toggle,
    /// One shell-quoted path under `path`.
    Path,
    /// Shell-quoted words under `paths`.
    Paths,
}

impl ArgShape {
    pub(crate) fn arguments(self, arg: &str) -> Option<(&'static str, Value)> {
        match self {
            Self::None => None,
            Self::Raw => Some(("arg", Value::String(arg.to_string()))),
            Self::Toggle => Some(("enabled", parse_flag(arg))),
            Self::Path => Some(("path", Value::String(split_words(arg).join(" ")))),
            Self::Paths => Some((
                "paths",
                split_words(arg).into_iter().map(Value::String).collect(),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Command {
    pub name: &'static str,
    pub action: &'static str,
    pub shape: ArgShape,
    /// `None` hides aliases from `/help`.
    pub usage: Option<&'static str>,
}

const fn command(
    name: &'static str,
    action: &'static str,
    shape: ArgShape,
    usage: Option<&'static str>,
) -> Command {
    Command {
        name,
        action,
        shape,
        usage,
    }
}

const COMMANDS: &[Command] = &[
    command("home", "view_home", ArgShape::None, Some("/home")),
    command("compose", "view_compose", ArgShape::None, Some("/compose")),
    command("restore", "view_restore", ArgShape::None, Some("/restore")),
    command("archive", "view_archive", ArgShape::None, Some("/archive")),
    command("base", "set_base_image", ArgShape::Path, Some("/base <path>")),
    command("object", "add_objects", ArgShape::Paths, Some("/object <path>...")),
    command("unobject", "remove_object", ArgShape::Raw, Some("/unobject <n>")),
    command("image", "set_restore_image", ArgShape::Path, Some("/image <path>")),
    command("prompt", "set_prompt", ArgShape::Raw, Some("/prompt <text>")),
    command("default_prompt", "default_prompt", ArgShape::None, Some("/default_prompt")),
    command("repair", "set_repair", ArgShape::Toggle, Some("/repair on|off")),
    command("colorize", "set_colorize", ArgShape::Toggle, Some("/colorize on|off")),
    command("upscale", "set_upscale", ArgShape::Raw, Some("/upscale none|2x|4x")),
    command("suggest", "suggest", ArgShape::None, Some("/suggest")),
    command("run", "submit", ArgShape::None, Some("/run")),
    command("save", "save_result", ArgShape::Paths, Some("/save [dir]")),
    command("reset", "reset", ArgShape::None, Some("/reset")),
    command("show", "show", ArgShape::None, Some("/show")),
    command("export", "export", ArgShape::Paths, Some("/export <id> [dir]")),
    command("copy", "copy_prompt", ArgShape::Raw, Some("/copy <id>")),
    command("delete", "delete", ArgShape::Raw, Some("/delete <id>")),
    command("language", "set_language", ArgShape::Raw, Some("/language ko|en")),
    command("help", "help", ArgShape::None, Some("/help")),
    command("quit", "quit", ArgShape::None, Some("/quit")),
    command("exit", "quit", ArgShape::None, None),
];

pub(crate) fn lookup(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|command| command.name == name)
}

/// Usage strings for `/help`, in table order.
pub fn help_commands() -> Vec<&'static str> {
    COMMANDS.iter().filter_map(|command| command.usage).collect()
}

fn parse_flag(arg: &str) -> Value {
    match arg.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Value::Bool(true),
        "off" | "false" | "no" | "0" => Value::Bool(false),
        _ => Value::Null,
    }
}

/// Shell-style split; unbalanced quotes degrade to whitespace splitting.
fn split_words(arg: &str) -> Vec<String> {
    let words = shell_words::split(arg)
        .unwrap_or_else(|_| arg.split_whitespace().map(str::to_string).collect());
    words.into_iter().filter(|word| !word.is_empty()).collect()
}
