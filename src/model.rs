//! The story document handed to publish and produced by import

use crate::settings::SettingsDocument;
use crate::utils;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Story format recorded when a story names none
pub const DEFAULT_FORMAT: &str = "Storypress";

/// Story format version recorded when a story names none
pub const DEFAULT_FORMAT_VERSION: &str = "1.0.0";

/// A complete authored story
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub name: String,
    pub passages: Vec<Passage>,
    pub script: String,
    pub stylesheet: String,
    pub tag_colors: BTreeMap<String, String>,
    pub story_format: String,
    pub story_format_version: String,
    pub ifid: String,
    pub zoom: f64,

    /// Id of the passage the story starts at
    pub start_passage: Option<String>,

    /// Presentation settings. `None` until the settings load sequence has
    /// run for this story
    pub settings: Option<SettingsDocument>,
}

impl Default for Story {
    fn default() -> Self {
        Story {
            id: utils::new_id(),
            name: "Untitled Story".to_string(),
            passages: Vec::new(),
            script: String::new(),
            stylesheet: String::new(),
            tag_colors: BTreeMap::new(),
            story_format: DEFAULT_FORMAT.to_string(),
            story_format_version: DEFAULT_FORMAT_VERSION.to_string(),
            ifid: utils::new_ifid(),
            zoom: 1.,
            start_passage: None,
            settings: None,
        }
    }
}

impl Story {
    /// Creates an empty story with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Story {
            name: name.into(),
            ..Story::default()
        }
    }

    /// Finds a passage by id
    pub fn passage(&self, id: &str) -> Option<&Passage> {
        self.passages.iter().find(|p| p.id == id)
    }

    /// Finds a passage by name
    pub fn passage_named(&self, name: &str) -> Option<&Passage> {
        self.passages.iter().find(|p| p.name == name)
    }

    /// Position of the passage with the given id
    pub fn passage_index(&self, id: &str) -> Option<usize> {
        self.passages.iter().position(|p| p.id == id)
    }

    /// Recomputes the settings from the current defaults, keeping any
    /// persisted values
    pub fn refresh_settings(&mut self) {
        self.settings = Some(SettingsDocument::absorb(self.settings.as_ref()));
    }
}

/// One node of the story graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Passage {
    pub id: String,
    pub name: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub tags: Vec<String>,
    pub commands: Vec<Command>,
    pub color: Option<String>,
}

impl Default for Passage {
    fn default() -> Self {
        Passage {
            id: utils::new_id(),
            name: "Untitled Passage".to_string(),
            left: 0.,
            top: 0.,
            width: 100.,
            height: 100.,
            tags: Vec::new(),
            commands: Vec::new(),
            color: None,
        }
    }
}

impl Passage {
    /// Creates an empty passage with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Passage {
            name: name.into(),
            ..Passage::default()
        }
    }

    /// True if any command in this passage has the given kind
    pub fn has_kind(&self, kind: CommandKind) -> bool {
        self.commands.iter().any(|c| c.kind == kind)
    }
}

/// The type tag of a command
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandKind {
    CustomCommand,
    ChangeBackground,
    BackgroundEffect,
    Delay,
    ChoiceBranch,
    TagBranch,
    CharacterDialog,
    CharacterShowHide,
    ClearScreen,
    Script,
    Placeholder,
}

impl CommandKind {
    pub const ALL: [CommandKind; 11] = [
        CommandKind::CustomCommand,
        CommandKind::ChangeBackground,
        CommandKind::BackgroundEffect,
        CommandKind::Delay,
        CommandKind::ChoiceBranch,
        CommandKind::TagBranch,
        CommandKind::CharacterDialog,
        CommandKind::CharacterShowHide,
        CommandKind::ClearScreen,
        CommandKind::Script,
        CommandKind::Placeholder,
    ];

    /// Kind given to commands whose tag this build does not know
    pub const FALLBACK: CommandKind = CommandKind::CharacterDialog;

    /// The tag written into documents
    pub fn tag(self) -> &'static str {
        match self {
            CommandKind::CustomCommand => "customCommand",
            CommandKind::ChangeBackground => "changeBackground",
            CommandKind::BackgroundEffect => "backgroundEffect",
            CommandKind::Delay => "delay",
            CommandKind::ChoiceBranch => "choiceBranch",
            CommandKind::TagBranch => "tagBranch",
            CommandKind::CharacterDialog => "characterDialog",
            CommandKind::CharacterShowHide => "characterShowHide",
            CommandKind::ClearScreen => "clearScreen",
            CommandKind::Script => "script",
            CommandKind::Placeholder => "placeholder",
        }
    }

    /// Looks up a kind by its document tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        CommandKind::ALL.iter().copied().find(|k| k.tag() == tag)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Free text content shared by the simplest kinds
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackgroundContent {
    pub text: String,
    pub image_url: String,
    pub transition: String,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectContent {
    pub text: String,

    /// Effect name, e.g. `rain`, `snow` or `none`
    pub effect: String,
    pub intensity: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelayContent {
    pub text: String,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Choice {
    pub text: String,

    /// Name of the passage the choice leads to
    pub target: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChoiceContent {
    pub text: String,
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagBranch {
    pub tag: String,
    pub target: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagBranchContent {
    pub text: String,
    pub branches: Vec<TagBranch>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DialogContent {
    pub text: String,
    pub character: String,
    pub portrait: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CharacterContent {
    pub text: String,
    pub character: String,
    pub image_url: String,
    pub visible: bool,

    /// `left`, `center` or `right`
    pub position: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptContent {
    pub text: String,
    pub code: String,
}

/// The fields of a command, one variant per kind
#[derive(Clone, Debug, PartialEq)]
pub enum CommandContent {
    Custom(TextContent),
    ChangeBackground(BackgroundContent),
    BackgroundEffect(EffectContent),
    Delay(DelayContent),
    ChoiceBranch(ChoiceContent),
    TagBranch(TagBranchContent),
    CharacterDialog(DialogContent),
    CharacterShowHide(CharacterContent),
    ClearScreen(TextContent),
    Script(ScriptContent),
    Placeholder(TextContent),

    /// Content this build could not map onto a known shape, kept verbatim
    Unrecognized(Value),
}

impl CommandContent {
    /// Empty content for the given kind
    pub fn empty(kind: CommandKind) -> Self {
        match kind {
            CommandKind::CustomCommand => CommandContent::Custom(TextContent::default()),
            CommandKind::ChangeBackground => {
                CommandContent::ChangeBackground(BackgroundContent::default())
            }
            CommandKind::BackgroundEffect => {
                CommandContent::BackgroundEffect(EffectContent::default())
            }
            CommandKind::Delay => CommandContent::Delay(DelayContent::default()),
            CommandKind::ChoiceBranch => CommandContent::ChoiceBranch(ChoiceContent::default()),
            CommandKind::TagBranch => CommandContent::TagBranch(TagBranchContent::default()),
            CommandKind::CharacterDialog => {
                CommandContent::CharacterDialog(DialogContent::default())
            }
            CommandKind::CharacterShowHide => {
                CommandContent::CharacterShowHide(CharacterContent::default())
            }
            CommandKind::ClearScreen => CommandContent::ClearScreen(TextContent::default()),
            CommandKind::Script => CommandContent::Script(ScriptContent::default()),
            CommandKind::Placeholder => CommandContent::Placeholder(TextContent::default()),
        }
    }

    /// Maps a decoded field bag onto the shape of `kind`. A bag that does
    /// not fit is kept as [`CommandContent::Unrecognized`]
    ///
    /// [`CommandContent::Unrecognized`]: enum.CommandContent.html#variant.Unrecognized
    pub fn from_value(kind: CommandKind, value: Value) -> Self {
        fn shape<T: serde::de::DeserializeOwned>(
            value: Value,
            wrap: fn(T) -> CommandContent,
        ) -> CommandContent {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(content) => wrap(content),
                Err(e) => {
                    tracing::warn!(error = %e, "command content does not match its type");
                    CommandContent::Unrecognized(value)
                }
            }
        }

        match kind {
            CommandKind::CustomCommand => shape(value, CommandContent::Custom),
            CommandKind::ChangeBackground => shape(value, CommandContent::ChangeBackground),
            CommandKind::BackgroundEffect => shape(value, CommandContent::BackgroundEffect),
            CommandKind::Delay => shape(value, CommandContent::Delay),
            CommandKind::ChoiceBranch => shape(value, CommandContent::ChoiceBranch),
            CommandKind::TagBranch => shape(value, CommandContent::TagBranch),
            CommandKind::CharacterDialog => shape(value, CommandContent::CharacterDialog),
            CommandKind::CharacterShowHide => shape(value, CommandContent::CharacterShowHide),
            CommandKind::ClearScreen => shape(value, CommandContent::ClearScreen),
            CommandKind::Script => shape(value, CommandContent::Script),
            CommandKind::Placeholder => shape(value, CommandContent::Placeholder),
        }
    }

    /// The field bag written into documents
    pub fn to_value(&self) -> Value {
        let value = match self {
            CommandContent::Custom(c)
            | CommandContent::ClearScreen(c)
            | CommandContent::Placeholder(c) => serde_json::to_value(c),
            CommandContent::ChangeBackground(c) => serde_json::to_value(c),
            CommandContent::BackgroundEffect(c) => serde_json::to_value(c),
            CommandContent::Delay(c) => serde_json::to_value(c),
            CommandContent::ChoiceBranch(c) => serde_json::to_value(c),
            CommandContent::TagBranch(c) => serde_json::to_value(c),
            CommandContent::CharacterDialog(c) => serde_json::to_value(c),
            CommandContent::CharacterShowHide(c) => serde_json::to_value(c),
            CommandContent::Script(c) => serde_json::to_value(c),
            CommandContent::Unrecognized(v) => return v.clone(),
        };
        // Plain structs with string keys always serialize
        value.unwrap_or(Value::Null)
    }

    /// The free text every command carries
    pub fn text(&self) -> &str {
        match self {
            CommandContent::Custom(c)
            | CommandContent::ClearScreen(c)
            | CommandContent::Placeholder(c) => &c.text,
            CommandContent::ChangeBackground(c) => &c.text,
            CommandContent::BackgroundEffect(c) => &c.text,
            CommandContent::Delay(c) => &c.text,
            CommandContent::ChoiceBranch(c) => &c.text,
            CommandContent::TagBranch(c) => &c.text,
            CommandContent::CharacterDialog(c) => &c.text,
            CommandContent::CharacterShowHide(c) => &c.text,
            CommandContent::Script(c) => &c.text,
            CommandContent::Unrecognized(v) => v.get("text").and_then(Value::as_str).unwrap_or(""),
        }
    }
}

/// One authored instruction inside a passage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCommand", into = "RawCommand")]
pub struct Command {
    pub id: String,
    pub kind: CommandKind,
    pub content: CommandContent,
}

impl Command {
    /// Creates a command with a fresh id
    pub fn new(kind: CommandKind, content: CommandContent) -> Self {
        Command {
            id: utils::new_id(),
            kind,
            content,
        }
    }

    /// Creates a command of the given kind holding only `text`
    pub fn text<S: Into<String>>(kind: CommandKind, text: S) -> Self {
        let text: String = text.into();
        let content = CommandContent::from_value(kind, serde_json::json!({ "text": text }));
        Command::new(kind, content)
    }

    /// Builds a command from a document tag and decoded field bag, coercing
    /// unknown tags to [`CommandKind::FALLBACK`]. Callers report the coercion
    ///
    /// [`CommandKind::FALLBACK`]: enum.CommandKind.html#associatedconstant.FALLBACK
    pub fn from_parts(tag: &str, content: Value) -> Self {
        match CommandKind::from_tag(tag) {
            Some(kind) => Command::new(kind, CommandContent::from_value(kind, content)),
            None => Command::new(CommandKind::FALLBACK, CommandContent::Unrecognized(content)),
        }
    }
}

/// Serialized form of a [`Command`](struct.Command.html)
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawCommand {
    #[serde(default = "utils::new_id")]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Value,
}

impl From<RawCommand> for Command {
    fn from(raw: RawCommand) -> Self {
        if CommandKind::from_tag(&raw.kind).is_none() {
            tracing::warn!(
                tag = raw.kind.as_str(),
                fallback = CommandKind::FALLBACK.tag(),
                "unknown command type in saved story"
            );
        }
        let content = match raw.content {
            Value::Null => serde_json::json!({}),
            other => other,
        };
        Command {
            id: raw.id,
            ..Command::from_parts(&raw.kind, content)
        }
    }
}

impl From<Command> for RawCommand {
    fn from(command: Command) -> Self {
        RawCommand {
            id: command.id,
            kind: command.kind.tag().to_string(),
            content: command.content.to_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_round_trip() {
        for kind in CommandKind::ALL.iter() {
            assert_eq!(CommandKind::from_tag(kind.tag()), Some(*kind));
        }
        assert_eq!(CommandKind::from_tag("teleport"), None);
    }

    #[test]
    fn content_shapes() {
        let content = CommandContent::from_value(
            CommandKind::Delay,
            json!({ "text": "wait", "durationMs": 500 }),
        );
        assert_eq!(
            content,
            CommandContent::Delay(DelayContent {
                text: "wait".into(),
                duration_ms: 500
            })
        );
        assert_eq!(content.text(), "wait");
    }

    #[test]
    fn mismatched_content_is_kept() {
        let raw = json!({ "text": "x", "durationMs": "soon" });
        let content = CommandContent::from_value(CommandKind::Delay, raw.clone());
        assert_eq!(content, CommandContent::Unrecognized(raw.clone()));
        assert_eq!(content.to_value(), raw);
        assert_eq!(content.text(), "x");
    }

    #[test]
    fn unknown_tag_is_coerced() {
        let command = Command::from_parts("teleport", json!({ "text": "zap" }));
        assert_eq!(command.kind, CommandKind::FALLBACK);
        assert_eq!(command.content.text(), "zap");
    }

    #[test]
    fn serde_uses_type_tag() {
        let command = Command::text(CommandKind::CustomCommand, "Hello");
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["type"], "customCommand");
        assert_eq!(value["content"]["text"], "Hello");

        let back: Command = serde_json::from_value(value).unwrap();
        assert_eq!(back, command);
    }

    #[test]
    fn story_defaults_fill_missing_fields() {
        let story: Story = serde_json::from_str(r#"{ "name": "Tiny" }"#).unwrap();
        assert_eq!(story.name, "Tiny");
        assert_eq!(story.story_format, DEFAULT_FORMAT);
        assert_eq!(story.zoom, 1.);
        assert!(story.passages.is_empty());
        assert!(!story.ifid.is_empty());

        let passage: Passage = serde_json::from_str("{}").unwrap();
        assert_eq!(passage.name, "Untitled Passage");
        assert_eq!((passage.width, passage.height), (100., 100.));
    }

    #[test]
    fn refresh_settings_installs_defaults() {
        let mut story = Story::new("s");
        assert!(story.settings.is_none());
        story.refresh_settings();
        assert!(story.settings.unwrap().group("dialogBox").is_some());
    }
}
