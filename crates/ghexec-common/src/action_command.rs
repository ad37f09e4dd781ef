// Workflow command parsing: `::name key=value,key2=value2::data` lines
// written to stdout by a step.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// A parsed workflow command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCommand {
    /// The command name (e.g. "error", "set-output", "add-mask").
    #[serde(rename = "name")]
    pub command: String,
    #[serde(rename = "parameters")]
    pub properties: BTreeMap<String, String>,
    #[serde(rename = "value")]
    pub data: String,
}

/// Prefix and separator of a workflow command.
pub const COMMAND_KEY: &str = "::";

struct EscapeMapping {
    token: &'static str,
    replacement: &'static str,
}

const ESCAPE_DATA_MAPPINGS: &[EscapeMapping] = &[
    EscapeMapping { token: "\r", replacement: "%0D" },
    EscapeMapping { token: "\n", replacement: "%0A" },
    EscapeMapping { token: "%",  replacement: "%25" },
];

const ESCAPE_PROPERTY_MAPPINGS: &[EscapeMapping] = &[
    EscapeMapping { token: "\r", replacement: "%0D" },
    EscapeMapping { token: "\n", replacement: "%0A" },
    EscapeMapping { token: ":",  replacement: "%3A" },
    EscapeMapping { token: ",",  replacement: "%2C" },
    EscapeMapping { token: "%",  replacement: "%25" },
];

impl ActionCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            properties: BTreeMap::new(),
            data: String::new(),
        }
    }

    /// Parse a stdout line as a workflow command.
    ///
    /// Returns `None` for ordinary output, including lines whose command name
    /// is not in `registered_commands`.
    pub fn try_parse(message: &str, registered_commands: &HashSet<String>) -> Option<ActionCommand> {
        let message = message.trim_start();
        let after_prefix = message.strip_prefix(COMMAND_KEY)?;
        let end_index = after_prefix.find(COMMAND_KEY)?;
        let cmd_info = &after_prefix[..end_index];

        let (command_name, properties_str) = match cmd_info.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (cmd_info, ""),
        };

        if !registered_commands.contains(command_name) {
            return None;
        }

        let mut command = ActionCommand::new(command_name);

        for entry in properties_str.split(',') {
            let entry = entry.trim();
            if let Some((key, value)) = entry.split_once('=') {
                if !key.is_empty() && !value.is_empty() {
                    command
                        .properties
                        .insert(key.to_string(), unescape(value, ESCAPE_PROPERTY_MAPPINGS));
                }
            }
        }

        command.data = unescape(&after_prefix[end_index + COMMAND_KEY.len()..], ESCAPE_DATA_MAPPINGS);
        Some(command)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

fn unescape(escaped: &str, mappings: &[EscapeMapping]) -> String {
    let mut result = escaped.to_string();
    for mapping in mappings {
        result = result.replace(mapping.replacement, mapping.token);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_commands(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_simple() {
        let cmds = make_commands(&["error"]);
        let cmd = ActionCommand::try_parse("::error::something went wrong", &cmds).unwrap();
        assert_eq!(cmd.command, "error");
        assert_eq!(cmd.data, "something went wrong");
        assert!(cmd.properties.is_empty());
    }

    #[test]
    fn parse_with_properties() {
        let cmds = make_commands(&["warning"]);
        let cmd = ActionCommand::try_parse(
            "::warning file=app.js,line=10,title=Bad%2C really::look here",
            &cmds,
        )
        .unwrap();
        assert_eq!(cmd.property("file"), Some("app.js"));
        assert_eq!(cmd.property("line"), Some("10"));
        assert_eq!(cmd.property("title"), Some("Bad, really"));
        assert_eq!(cmd.data, "look here");
    }

    #[test]
    fn parse_set_output_with_colons_in_value() {
        let cmds = make_commands(&["set-output"]);
        let cmd = ActionCommand::try_parse("::set-output name=url::http://example.com", &cmds).unwrap();
        assert_eq!(cmd.property("name"), Some("url"));
        assert_eq!(cmd.data, "http://example.com");
    }

    #[test]
    fn leading_whitespace_is_allowed() {
        let cmds = make_commands(&["group"]);
        let cmd = ActionCommand::try_parse("   ::group::Build", &cmds).unwrap();
        assert_eq!(cmd.data, "Build");
    }

    #[test]
    fn unregistered_command_is_plain_output() {
        let cmds = make_commands(&["warning"]);
        assert!(ActionCommand::try_parse("::error::data", &cmds).is_none());
    }

    #[test]
    fn incomplete_command_is_plain_output() {
        let cmds = make_commands(&["error"]);
        assert!(ActionCommand::try_parse("::error data", &cmds).is_none());
        assert!(ActionCommand::try_parse("error::data", &cmds).is_none());
        assert!(ActionCommand::try_parse("", &cmds).is_none());
    }

    #[test]
    fn unescape_data() {
        let cmds = make_commands(&["error"]);
        let cmd = ActionCommand::try_parse("::error::line1%0Aline2%0D%25done", &cmds).unwrap();
        assert_eq!(cmd.data, "line1\nline2\r%done");
    }

    #[test]
    fn empty_property_values_are_dropped() {
        let cmds = make_commands(&["notice"]);
        let cmd = ActionCommand::try_parse("::notice file=,line=3::hi", &cmds).unwrap();
        assert_eq!(cmd.properties.len(), 1);
        assert_eq!(cmd.property("line"), Some("3"));
    }

    #[test]
    fn serializes_as_name_parameters_value() {
        let cmds = make_commands(&["save-state"]);
        let cmd = ActionCommand::try_parse("::save-state name=pid::42", &cmds).unwrap();
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "save-state", "parameters": {"name": "pid"}, "value": "42"})
        );
    }
}
