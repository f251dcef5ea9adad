//! Operator console: line parsing and the stdin reader feeding the controller.

use std::io::{BufRead, Write};

use tokio::sync::mpsc;
use tracing::debug;

pub const HELP: &str = "\
Commands:
  register <content> <filename>   publish a local file under a content name
  download <content>              fetch content from the least-used source
  list                            show everything registered at the index
  deregister <content>            withdraw one of this peer's publications
  help                            show this message
  quit                            deregister everything and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { content: String, filename: String },
    Download { content: String },
    List,
    Deregister { content: String },
    Help,
    Quit,
}

/// Parse one console line. `None` for a blank line; `Err` carries the line to print.
pub fn parse(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };
    if cmd.is_empty() {
        return None;
    }
    let parsed = match cmd {
        "register" => match rest.split_once(char::is_whitespace) {
            Some((content, filename)) if !filename.trim().is_empty() => Ok(Command::Register {
                content: content.to_string(),
                filename: filename.trim().to_string(),
            }),
            _ => Err("Usage: register <content> <filename>".to_string()),
        },
        "download" => single_arg(rest, "Usage: download <content>")
            .map(|content| Command::Download { content }),
        "deregister" => single_arg(rest, "Usage: deregister <content>")
            .map(|content| Command::Deregister { content }),
        "list" => Ok(Command::List),
        "help" => Ok(Command::Help),
        "quit" => Ok(Command::Quit),
        other => Err(format!("Unknown command: {}", other)),
    };
    Some(parsed)
}

fn single_arg(rest: &str, usage: &str) -> Result<String, String> {
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [arg] => Ok(arg.to_string()),
        _ => Err(usage.to_string()),
    }
}

pub fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Read stdin lines on a dedicated thread. The channel closes on EOF or read error.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse("register doc /tmp/my file.txt"),
            Some(Ok(Command::Register {
                content: "doc".into(),
                filename: "/tmp/my file.txt".into()
            }))
        );
        assert_eq!(
            parse("  download doc  "),
            Some(Ok(Command::Download {
                content: "doc".into()
            }))
        );
        assert_eq!(parse("list"), Some(Ok(Command::List)));
        assert_eq!(
            parse("deregister doc"),
            Some(Ok(Command::Deregister {
                content: "doc".into()
            }))
        );
        assert_eq!(parse("quit"), Some(Ok(Command::Quit)));
        assert_eq!(parse("help"), Some(Ok(Command::Help)));
    }

    #[test]
    fn blank_lines_ignored() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   \t"), None);
    }

    #[test]
    fn usage_and_unknown() {
        assert_eq!(
            parse("register doc"),
            Some(Err("Usage: register <content> <filename>".into()))
        );
        assert_eq!(
            parse("download"),
            Some(Err("Usage: download <content>".into()))
        );
        assert_eq!(
            parse("deregister a b"),
            Some(Err("Usage: deregister <content>".into()))
        );
        assert_eq!(parse("fetch doc"), Some(Err("Unknown command: fetch".into())));
    }
}
