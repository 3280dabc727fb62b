//! Line commands understood by the interactive console.

use shared::{ObjectsContain, Rgb, SearchSettings};
use std::path::PathBuf;

use crate::query::{Modality, parse_rgb};
use crate::results::ResultView;

pub const HELP: &str = "\
text <query>              set the text query
color rgb(r, g, b)        set the color query (also: color r g b)
image <path> | clear      set or clear the query image
objects <a>, <b>, ...     set the object list
object <label>            add or remove one object
suggest <search>          list matching object labels
words <words>             set the word query
enable|disable <modality> toggle text, color, image, objects or words
search                    run the search
view videos|frames        choose how results are printed
explore <videoId>         list every frame of a video
submit <videoId> <secs>   submit an answer to DRES
settings [field value]    show or change search settings
reset                     clear the query and results
status                    show query and DRES state
quit                      leave";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Missing {0}")]
    MissingArgument(&'static str),
    #[error("Invalid {what}: {value}")]
    InvalidArgument { what: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingUpdate {
    MaxResults(u32),
    ColorRadius(u32),
    MaxTextSimilarity(f64),
    MaxImageSimilarity(f64),
    ObjectsContain(ObjectsContain),
}

impl SettingUpdate {
    pub fn apply(&self, current: &SearchSettings) -> SearchSettings {
        let mut next = current.clone();
        match self {
            SettingUpdate::MaxResults(v) => next.max_results = *v,
            SettingUpdate::ColorRadius(v) => next.color_radius = *v,
            SettingUpdate::MaxTextSimilarity(v) => next.max_text_similarity = *v,
            SettingUpdate::MaxImageSimilarity(v) => next.max_image_similarity = *v,
            SettingUpdate::ObjectsContain(v) => next.objects_contain = *v,
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Text(String),
    Color(Rgb),
    Image(Option<PathBuf>),
    Objects(Vec<String>),
    ToggleObject(String),
    Suggest(String),
    Words(String),
    SetEnabled(Modality, bool),
    Search,
    View(ResultView),
    Explore(String),
    Submit { video_id: String, timestamp: f64 },
    ShowSettings,
    UpdateSetting(SettingUpdate),
    Reset,
    Status,
    Help,
    Quit,
}

fn invalid(what: &'static str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        what,
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(what: &'static str, value: &str) -> Result<T, CommandError> {
    value.parse().map_err(|_| invalid(what, value))
}

fn parse_color(args: &str) -> Result<Rgb, CommandError> {
    if args.starts_with("rgb(") {
        return parse_rgb(args).map_err(|_| invalid("color", args));
    }
    let channels: Vec<&str> = args.split_whitespace().collect();
    match channels.as_slice() {
        [r, g, b] => Ok([
            parse_number("color", r)?,
            parse_number("color", g)?,
            parse_number("color", b)?,
        ]),
        _ => Err(invalid("color", args)),
    }
}

fn parse_setting(args: &str) -> Result<SettingUpdate, CommandError> {
    let (field, value) = args
        .split_once(char::is_whitespace)
        .map(|(f, v)| (f, v.trim()))
        .ok_or(CommandError::MissingArgument("setting value"))?;

    match field {
        "maxResults" | "max_results" => Ok(SettingUpdate::MaxResults(parse_number("max results", value)?)),
        "colorRadius" | "color_radius" => Ok(SettingUpdate::ColorRadius(parse_number("color radius", value)?)),
        "maxTextSimilarity" | "max_text_similarity" => Ok(SettingUpdate::MaxTextSimilarity(
            parse_number("text similarity", value)?,
        )),
        "maxImageSimilarity" | "max_image_similarity" => Ok(SettingUpdate::MaxImageSimilarity(
            parse_number("image similarity", value)?,
        )),
        "objectsContain" | "objects_contain" => Ok(SettingUpdate::ObjectsContain(
            value.parse().map_err(|_| invalid("objects mode", value))?,
        )),
        other => Err(invalid("setting", other)),
    }
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (name, args) = match line.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (line, ""),
        };
        let require = |what: &'static str| {
            if args.is_empty() {
                Err(CommandError::MissingArgument(what))
            } else {
                Ok(args)
            }
        };

        let command = match name {
            "text" => Command::Text(args.to_string()),
            "color" => Command::Color(parse_color(require("color")?)?),
            "image" => match require("image path")? {
                "clear" => Command::Image(None),
                path => Command::Image(Some(PathBuf::from(path))),
            },
            "objects" => Command::Objects(
                args.split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            "object" => Command::ToggleObject(require("object label")?.to_string()),
            "suggest" => Command::Suggest(args.to_string()),
            "words" => Command::Words(args.to_string()),
            "enable" | "disable" => {
                let target = require("modality")?;
                let modality = target.parse().map_err(|_| invalid("modality", target))?;
                Command::SetEnabled(modality, name == "enable")
            }
            "search" => Command::Search,
            "view" => {
                let target = require("view")?;
                Command::View(target.parse().map_err(|_| invalid("view", target))?)
            }
            "explore" => Command::Explore(require("video id")?.to_string()),
            "submit" => {
                let parts: Vec<&str> = require("video id and timestamp")?
                    .split_whitespace()
                    .collect();
                match parts.as_slice() {
                    [video_id, timestamp] => Command::Submit {
                        video_id: video_id.to_string(),
                        timestamp: parse_number("timestamp", timestamp)?,
                    },
                    _ => return Err(CommandError::MissingArgument("video id and timestamp")),
                }
            }
            "settings" if args.is_empty() => Command::ShowSettings,
            "settings" => Command::UpdateSetting(parse_setting(args)?),
            "reset" => Command::Reset,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// `75.5` -> `1min 15.50sec`.
pub fn format_timestamp(seconds: f64) -> String {
    let hundredths = (seconds.max(0.0) * 100.0).round() as u64;
    let (minutes, rest) = (hundredths / 6000, hundredths % 6000);
    format!("{}min {}.{:02}sec", minutes, rest / 100, rest % 100)
}
