//! Parsing of lines typed at the prompt.

use cloudchat_shared::{FileDescriptor, RoomId};

use crate::error::CommandError;

pub const HELP: &str = "\
/rooms                      list known rooms
/create <name>              create a room and switch to it
/join <id>                  join a room by id
/switch <id>                switch to a known room
/rename <id> <name>         rename a room
/leave <id>                 forget a room
/recall <time>              recall one of your messages
/quote <time> <text>        reply to a message
/share <name> <link> <size> share a file link
/refresh                    reload messages now
/quit                       exit
anything else               send as a message";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Rooms,
    Create(String),
    Join(String),
    Switch(RoomId),
    Rename(RoomId, String),
    Leave(RoomId),
    Recall(f64),
    Quote(f64, String),
    Share(FileDescriptor),
    Refresh,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line.  Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Say(line.to_string())));
        };

        let (name, args) = split_word(rest);
        let command = match name {
            "rooms" => Command::Rooms,
            "create" => Command::Create(required(args, "room name", "/create <name>")?.to_string()),
            "join" => Command::Join(required(args, "room id", "/join <id>")?.to_string()),
            "switch" => Command::Switch(room_id(required(args, "room id", "/switch <id>")?)?),
            "rename" => {
                let (id, title) = split_word(args);
                let id = room_id(required(id, "room id", "/rename <id> <name>")?)?;
                let title = required(title, "room name", "/rename <id> <name>")?;
                Command::Rename(id, title.to_string())
            }
            "leave" => Command::Leave(room_id(required(args, "room id", "/leave <id>")?)?),
            "recall" => Command::Recall(time(required(args, "message time", "/recall <time>")?)?),
            "quote" => {
                let (stamp, text) = split_word(args);
                let stamp = time(required(stamp, "message time", "/quote <time> <text>")?)?;
                let text = required(text, "text", "/quote <time> <text>")?;
                Command::Quote(stamp, text.to_string())
            }
            "share" => {
                let usage = "/share <name> <link> <size>";
                let (name, rest) = split_word(args);
                let (link, size) = split_word(rest);
                Command::Share(FileDescriptor {
                    name: required(name, "file name", usage)?.to_string(),
                    link: required(link, "link", usage)?.to_string(),
                    size: required(size, "size", usage)?.to_string(),
                    time: cloudchat_shared::format_stamp(cloudchat_shared::now_secs()),
                })
            }
            "refresh" => Command::Refresh,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn required<'a>(
    arg: &'a str,
    what: &'static str,
    usage: &'static str,
) -> Result<&'a str, CommandError> {
    let arg = arg.trim();
    if arg.is_empty() {
        Err(CommandError::MissingArgument { what, usage })
    } else {
        Ok(arg)
    }
}

fn room_id(arg: &str) -> Result<RoomId, CommandError> {
    arg.parse()
        .map_err(|_| CommandError::InvalidRoomId(arg.to_string()))
}

fn time(arg: &str) -> Result<f64, CommandError> {
    arg.trim_start_matches('#')
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| CommandError::InvalidNumber(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(
            Command::parse("  hello there ").unwrap(),
            Some(Command::Say("hello there".into()))
        );
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_room_commands() {
        assert_eq!(Command::parse("/rooms").unwrap(), Some(Command::Rooms));
        assert_eq!(
            Command::parse("/create study group").unwrap(),
            Some(Command::Create("study group".into()))
        );
        assert_eq!(
            Command::parse("/join 185655560").unwrap(),
            Some(Command::Join("185655560".into()))
        );
        assert_eq!(
            Command::parse("/rename 5   new  name").unwrap(),
            Some(Command::Rename(RoomId(5), "new  name".into()))
        );
        assert_eq!(
            Command::parse("/leave 5").unwrap(),
            Some(Command::Leave(RoomId(5)))
        );
        assert_eq!(
            Command::parse("/switch x"),
            Err(CommandError::InvalidRoomId("x".into()))
        );
    }

    #[test]
    fn test_message_commands() {
        assert_eq!(
            Command::parse("/recall #1700000000.123").unwrap(),
            Some(Command::Recall(1_700_000_000.123))
        );
        assert_eq!(
            Command::parse("/quote 100 me too").unwrap(),
            Some(Command::Quote(100.0, "me too".into()))
        );
        match Command::parse("/share notes.txt https://example.invalid/n 12KB").unwrap() {
            Some(Command::Share(file)) => {
                assert_eq!(file.name, "notes.txt");
                assert_eq!(file.link, "https://example.invalid/n");
                assert_eq!(file.size, "12KB");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Command::parse("/nope"),
            Err(CommandError::UnknownCommand("nope".into()))
        );
        assert!(matches!(
            Command::parse("/quote 100"),
            Err(CommandError::MissingArgument { what: "text", .. })
        ));
        assert_eq!(
            Command::parse("/recall soon"),
            Err(CommandError::InvalidNumber("soon".into()))
        );
        assert!(matches!(
            Command::parse("/create"),
            Err(CommandError::MissingArgument { .. })
        ));
    }
}
