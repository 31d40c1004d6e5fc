//! Line commands typed into the dashboard

use std::fmt;

use weathermap::{Coordinates, OverlayKind, UnknownOverlay};

/// One parsed input line
#[derive(Debug, Clone, PartialEq, weathermap::Action)]
pub enum Command {
    /// `search <city>`
    Search(String),
    /// `overlay <name>`
    Overlay(OverlayKind),
    /// `pan <lat> <lon> [zoom]`: drag the map like a user would
    Pan { center: Coordinates, zoom: Option<u8> },
    /// `go <query>`: back/forward to another URL
    Navigate(String),
    Retry,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    MissingArgument(&'static str),
    InvalidNumber(String),
    Overlay(UnknownOverlay),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "Empty command"),
            CommandError::Unknown(name) => write!(f, "Unknown command: {} (try `help`)", name),
            CommandError::MissingArgument(what) => write!(f, "Missing argument: {}", what),
            CommandError::InvalidNumber(raw) => write!(f, "Not a number: {}", raw),
            CommandError::Overlay(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<UnknownOverlay> for CommandError {
    fn from(e: UnknownOverlay) -> Self {
        CommandError::Overlay(e)
    }
}

pub const HELP: &str = "\
commands:
  search <city>          center the map on a city
  overlay <name>         wind | temperature | pressure | precipitation | clouds
  pan <lat> <lon> [zoom] drag the map
  go <query>             navigate to another URL, e.g. go ?zoom=4
  retry                  retry a failed widget load
  status                 show map status and view
  quit";

fn number<T: std::str::FromStr>(raw: Option<&str>, what: &'static str) -> Result<T, CommandError> {
    let raw = raw.ok_or(CommandError::MissingArgument(what))?;
    raw.parse()
        .map_err(|_| CommandError::InvalidNumber(raw.to_string()))
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (name, rest) = line
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((line, ""));

    match name.to_ascii_lowercase().as_str() {
        "" => Err(CommandError::Empty),
        "search" | "s" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("city"));
            }
            Ok(Command::Search(rest.to_string()))
        }
        "overlay" | "o" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("overlay"));
            }
            Ok(Command::Overlay(rest.parse()?))
        }
        "pan" | "p" => {
            let mut args = rest.split_whitespace();
            let lat = number(args.next(), "lat")?;
            let lon = number(args.next(), "lon")?;
            let zoom = args.next().map(|z| number(Some(z), "zoom")).transpose()?;
            Ok(Command::Pan {
                center: Coordinates::new(lat, lon),
                zoom,
            })
        }
        "go" | "back" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("query"));
            }
            Ok(Command::Navigate(rest.to_string()))
        }
        "retry" => Ok(Command::Retry),
        "status" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
