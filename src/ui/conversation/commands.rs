use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new chat, forgetting the current one
    New,
    /// Copy a code block from the latest reply
    Copy,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// 1-based code block number given to `/copy`
    pub fn copy_target(&self) -> Option<usize> {
        if self.command != SlashCommand::Copy {
            return None;
        }
        self.argument()?.trim().parse().ok().filter(|n| *n > 0)
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new chat (clears the history)",
            SlashCommand::Copy => "copy code block N of the latest reply (default: last)",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?.to_lowercase();
    let tail: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head).ok().or_else(|| match head.as_str() {
        "q" | "quit" | "exit" | "salir" => Some(SlashCommand::Bye),
        "clear" | "reset" | "nuevo" => Some(SlashCommand::New),
        "c" | "y" | "yank" | "copiar" => Some(SlashCommand::Copy),
        "h" | "?" => Some(SlashCommand::Help),
        _ => None,
    })?;

    let argument = if tail.is_empty() {
        None
    } else {
        Some(tail.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n");
    for entry in command_entries() {
        help.push_str(&format!("/{} - {}\n", entry.keyword, entry.description));
    }

    help.push_str("\nAliases: /q for /bye, /clear for /new, /c for /copy.");
    help.push_str("\nKeys: Enter send, Ctrl+N new chat, Ctrl+Y copy last code block, PgUp/PgDn scroll, Ctrl+C quit.");

    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(parse_slash_command("/new").unwrap().command, SlashCommand::New);
        assert_eq!(parse_slash_command("  /Salir ").unwrap().command, SlashCommand::Bye);
        assert_eq!(parse_slash_command("/clear").unwrap().command, SlashCommand::New);
        assert!(parse_slash_command("/unknown").is_none());
        assert!(parse_slash_command("not a command").is_none());
        assert!(parse_slash_command("/").is_none());
    }

    #[test]
    fn copy_target_is_one_based() {
        let parsed = parse_slash_command("/copy 2").unwrap();
        assert_eq!(parsed.copy_target(), Some(2));
        assert_eq!(parse_slash_command("/copy").unwrap().copy_target(), None);
        assert_eq!(parse_slash_command("/copy 0").unwrap().copy_target(), None);
        assert_eq!(parse_slash_command("/help 2").unwrap().copy_target(), None);
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for command in SlashCommand::iter() {
            assert!(help.contains(&format!("/{}", command.command())));
        }
    }
}
