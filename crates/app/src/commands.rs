//! Console command parsing

use lobby_core::{MessageId, PlayerId};

/// A command typed at the console prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Exit,
    State,
    List,
    Offer(PlayerId),
    Message(String),
    Messages,
    RemoveMessage(MessageId),
    EndGame,
    Offers,
}

pub const PROMPT: &str = "Enter command (-1 - exit, 1 - state, 2 - list, 3 <id> - offer, \
4 <text> - message, 5 - messages, 6 <id> - remove message, 7 - end game, 8 - offers): ";

/// Parse one input line: a command number optionally followed by its argument
pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (code, arg) = match line.split_once(char::is_whitespace) {
        Some((code, arg)) => (code, arg.trim()),
        None => (line, ""),
    };

    let code: i32 = code
        .parse()
        .map_err(|_| "Command must be an integer".to_string())?;

    let command = match code {
        -1 => ConsoleCommand::Exit,
        1 => ConsoleCommand::State,
        2 => ConsoleCommand::List,
        3 => ConsoleCommand::Offer(PlayerId::new(required(arg, "player id")?)),
        4 => ConsoleCommand::Message(required(arg, "message text")?.to_string()),
        5 => ConsoleCommand::Messages,
        6 => ConsoleCommand::RemoveMessage(
            required(arg, "message id")?
                .parse()
                .map_err(|_| "Message id must be a non-negative integer".to_string())?,
        ),
        7 => ConsoleCommand::EndGame,
        8 => ConsoleCommand::Offers,
        other => return Err(format!("Unknown command: {}", other)),
    };
    Ok(command)
}

fn required<'a>(arg: &'a str, what: &str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("Missing {}", what))
    } else {
        Ok(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("-1"), Ok(ConsoleCommand::Exit));
        assert_eq!(parse_command(" 2 "), Ok(ConsoleCommand::List));
        assert_eq!(parse_command("7"), Ok(ConsoleCommand::EndGame));
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(
            parse_command("3 42"),
            Ok(ConsoleCommand::Offer(PlayerId::new("42")))
        );
        assert_eq!(
            parse_command("4 good game"),
            Ok(ConsoleCommand::Message("good game".into()))
        );
        assert_eq!(parse_command("6 5"), Ok(ConsoleCommand::RemoveMessage(5)));
    }

    #[test]
    fn test_bad_input() {
        assert!(parse_command("list").is_err());
        assert!(parse_command("3").is_err());
        assert!(parse_command("6 x").is_err());
        assert!(parse_command("9").is_err());
    }
}
