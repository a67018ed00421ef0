use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::lookup;

/// One parsed line of the interactive studio.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn arg_list(&self, key: &str) -> Vec<String> {
        self.command_args
            .get(key)
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `Some(flag)` for an explicit on/off, `None` for a bare toggle.
    pub fn arg_flag(&self, key: &str) -> Option<bool> {
        self.command_args.get(key).and_then(Value::as_bool)
    }
}

/// Splits `/name rest` into a lowercase command name and its argument text.
fn split_command(line: &str) -> Option<(String, &str)> {
    let tail = line.strip_prefix('/')?;
    let end = tail
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .unwrap_or(tail.len());
    if end == 0 {
        return None;
    }
    Some((tail[..end].to_ascii_lowercase(), tail[end..].trim()))
}

pub fn parse_intent(text: &str) -> Intent {
    let line = text.trim();
    if line.is_empty() {
        return Intent::new("noop", text);
    }

    let Some((name, arg)) = split_command(line) else {
        // Bare text edits the instruction of the active screen.
        let mut intent = Intent::new("set_prompt", text);
        intent.prompt = Some(line.to_string());
        return intent;
    };

    match lookup(&name) {
        Some(command) => {
            let mut intent = Intent::new(command.action, text);
            if command.action == "set_prompt" {
                intent.prompt = Some(arg.to_string());
            }
            if let Some((key, value)) = command.shape.arguments(arg) {
                intent.command_args.insert(key.to_string(), value);
            }
            intent
        }
        None => {
            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(name));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            intent
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn parse_view_switches() {
        assert_eq!(parse_intent("/home").action, "view_home");
        assert_eq!(parse_intent("/compose").action, "view_compose");
        assert_eq!(parse_intent("/RESTORE").action, "view_restore");
        assert_eq!(parse_intent("  /archive ").action, "view_archive");
        assert_eq!(parse_intent("/exit").action, "quit");
    }

    #[test]
    fn parse_object_quoted_paths() {
        let intent = parse_intent("/object \"/tmp/a b.png\" c.png");
        assert_eq!(intent.action, "add_objects");
        assert_eq!(
            intent.command_args["paths"],
            json!(["/tmp/a b.png", "c.png"])
        );
        assert_eq!(intent.arg_list("paths"), vec!["/tmp/a b.png", "c.png"]);
    }

    #[test]
    fn parse_single_path_commands() {
        let base = parse_intent("/base \"/tmp/my photo.jpg\"");
        assert_eq!(base.action, "set_base_image");
        assert_eq!(base.arg_str("path"), Some("/tmp/my photo.jpg"));

        let target = parse_intent("/image old.png");
        assert_eq!(target.action, "set_restore_image");
        assert_eq!(target.arg_str("path"), Some("old.png"));
    }

    #[test]
    fn parse_toggles() {
        assert_eq!(parse_intent("/repair off").arg_flag("enabled"), Some(false));
        assert_eq!(parse_intent("/colorize ON").arg_flag("enabled"), Some(true));
        let bare = parse_intent("/colorize");
        assert_eq!(bare.action, "set_colorize");
        assert_eq!(bare.arg_flag("enabled"), None);
    }

    #[test]
    fn parse_prompt_keeps_text_verbatim() {
        let intent = parse_intent("/prompt 선글라스를 얼굴에 씌워 주세요, \"꼭\"");
        assert_eq!(intent.action, "set_prompt");
        assert_eq!(
            intent.prompt.as_deref(),
            Some("선글라스를 얼굴에 씌워 주세요, \"꼭\"")
        );
    }

    #[test]
    fn bare_text_sets_the_instruction() {
        let intent = parse_intent("  place glasses on the face  ");
        assert_eq!(intent.action, "set_prompt");
        assert_eq!(intent.prompt.as_deref(), Some("place glasses on the face"));
    }

    #[test]
    fn parse_archive_actions() {
        let export = parse_intent("/export abc-123 \"/tmp/out dir\"");
        assert_eq!(export.action, "export");
        assert_eq!(export.arg_list("paths"), vec!["abc-123", "/tmp/out dir"]);

        assert_eq!(parse_intent("/delete abc-123").arg_str("arg"), Some("abc-123"));
        assert_eq!(parse_intent("/copy abc-123").action, "copy_prompt");
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }

    #[test]
    fn empty_line_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }
}
