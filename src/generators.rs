//! Per-command markup and stylesheet generation
//!
//! Each [`CommandKind`] has at most one [`CommandGenerator`] in a
//! [`GeneratorRegistry`]. Registering a second generator for a kind replaces
//! the first: the last registration wins.
//!
//! [`CommandKind`]: ../model/enum.CommandKind.html
//! [`CommandGenerator`]: trait.CommandGenerator.html
//! [`GeneratorRegistry`]: struct.GeneratorRegistry.html

use crate::model::{Choice, Command, CommandContent, CommandKind, Passage, Story, TagBranch};
use crate::settings::SettingsDocument;
use horrorshow::html;
use std::collections::{BTreeMap, BTreeSet};

/// Text rendered for a command with no generator and no text
pub const PLACEHOLDER_TEXT: &str = "[empty command]";

/// Renders commands of one kind
pub trait CommandGenerator: Send + Sync {
    /// Markup embedded in the command's container. `text` is the command's
    /// own text, or the caller's override of it
    fn html_content(&self, story: &Story, passage: &Passage, command: &Command, text: &str)
        -> String;

    /// Style rules this generator needs for `passage`, if any
    fn style_sheets(&self, _story: &Story, _passage: &Passage) -> String {
        String::new()
    }
}

/// Maps command kinds to their generators
pub struct GeneratorRegistry {
    generators: BTreeMap<CommandKind, Box<dyn CommandGenerator>>,
}

impl GeneratorRegistry {
    /// Creates a registry with no generators
    pub fn new() -> Self {
        GeneratorRegistry {
            generators: BTreeMap::new(),
        }
    }

    /// Creates a registry holding the built-in generator for every kind
    pub fn with_defaults() -> Self {
        let mut registry = GeneratorRegistry::new();
        registry.register(CommandKind::CustomCommand, TextGenerator);
        registry.register(CommandKind::ChangeBackground, BackgroundGenerator);
        registry.register(CommandKind::BackgroundEffect, EffectGenerator);
        registry.register(CommandKind::Delay, DelayGenerator);
        registry.register(CommandKind::ChoiceBranch, ChoiceGenerator);
        registry.register(CommandKind::TagBranch, TagBranchGenerator);
        registry.register(CommandKind::CharacterDialog, DialogGenerator);
        registry.register(CommandKind::CharacterShowHide, CharacterGenerator);
        registry.register(CommandKind::ClearScreen, ClearScreenGenerator);
        registry.register(CommandKind::Script, ScriptGenerator);
        registry.register(CommandKind::Placeholder, PassthroughGenerator);
        registry
    }

    /// Registers `generator` for `kind`, returning the generator it replaced
    pub fn register<G: CommandGenerator + 'static>(
        &mut self,
        kind: CommandKind,
        generator: G,
    ) -> Option<Box<dyn CommandGenerator>> {
        self.generators.insert(kind, Box::new(generator))
    }

    pub fn get(&self, kind: CommandKind) -> Option<&dyn CommandGenerator> {
        self.generators.get(&kind).map(|g| g.as_ref())
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Renders `command`. Never fails: a kind with no generator renders as
    /// its text, or [`PLACEHOLDER_TEXT`] if it has none. Unlike generator
    /// output, which is trusted markup, that fallback text is escaped so it
    /// cannot open elements in the passage
    ///
    /// [`PLACEHOLDER_TEXT`]: constant.PLACEHOLDER_TEXT.html
    pub fn html_content_for(
        &self,
        story: &Story,
        passage: &Passage,
        command: &Command,
        text_override: Option<&str>,
    ) -> String {
        let text = text_override.unwrap_or_else(|| command.content.text());
        match self.generators.get(&command.kind) {
            Some(generator) => generator.html_content(story, passage, command, text),
            None => {
                tracing::warn!(
                    kind = command.kind.tag(),
                    passage = passage.name.as_str(),
                    "no generator registered for command type"
                );
                if text.is_empty() {
                    PLACEHOLDER_TEXT.to_string()
                } else {
                    format!("{}", html! { : text })
                }
            }
        }
    }

    /// Concatenates the style output of every registered generator. Each
    /// generator decides whether `passage` needs anything from it
    pub fn style_sheets(&self, story: &Story, passage: &Passage) -> String {
        self.generators
            .values()
            .map(|g| g.style_sheets(story, passage))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        GeneratorRegistry::with_defaults()
    }
}

/// Runs `f` against the story's settings, or the defaults if it has none
fn with_settings<R, F: FnOnce(&SettingsDocument) -> R>(story: &Story, f: F) -> R {
    match &story.settings {
        Some(settings) => f(settings),
        None => f(&SettingsDocument::defaults()),
    }
}

fn css(settings: &SettingsDocument, group: &str, name: &str) -> String {
    settings
        .property(group, name)
        .map(|p| css_value(&p.css_value()))
        .unwrap_or_default()
}

/// Restricts a settings value to a single CSS declaration value. Settings
/// are author data and the result lands inside a `<style>` element
fn css_value(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\\' | '{' | '}' | ';'))
        .collect()
}

/// A settings value usable inside a double-quoted `url("...")`. Semicolons
/// stay for `data:` URLs
fn css_url(settings: &SettingsDocument, group: &str, name: &str) -> String {
    settings
        .property(group, name)
        .map(|p| {
            p.css_value()
                .chars()
                .filter(|c| !matches!(c, '<' | '>' | '"' | '\\' | '{' | '}'))
                .filter(|c| !c.is_control())
                .collect()
        })
        .unwrap_or_default()
}

/// Restricts a name to characters valid in a CSS identifier
fn css_ident(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Plain authored text
pub struct TextGenerator;

impl CommandGenerator for TextGenerator {
    fn html_content(&self, _: &Story, _: &Passage, _: &Command, text: &str) -> String {
        format!("{}", html! { span(class = "sp-text") { : text } })
    }
}

pub struct BackgroundGenerator;

impl CommandGenerator for BackgroundGenerator {
    fn html_content(&self, _: &Story, _: &Passage, command: &Command, text: &str) -> String {
        let (src, transition, duration) = match &command.content {
            CommandContent::ChangeBackground(c) => {
                (c.image_url.as_str(), c.transition.as_str(), c.duration_ms)
            }
            _ => ("", "", 0),
        };
        format!(
            "{}",
            html! {
                div(class = "sp-change-background",
                    data-src = src,
                    data-transition = transition,
                    data-duration = duration.to_string()) {
                    : text
                }
            }
        )
    }
}

pub struct EffectGenerator;

impl EffectGenerator {
    fn effect_name(command: &Command) -> Option<String> {
        match &command.content {
            CommandContent::BackgroundEffect(c) => {
                let name = css_ident(&c.effect);
                if name.is_empty() || name == "none" {
                    None
                } else {
                    Some(name)
                }
            }
            _ => None,
        }
    }
}

impl CommandGenerator for EffectGenerator {
    fn html_content(&self, _: &Story, _: &Passage, command: &Command, text: &str) -> String {
        let effect = EffectGenerator::effect_name(command).unwrap_or_else(|| "none".to_string());
        let intensity = match &command.content {
            CommandContent::BackgroundEffect(c) => c.intensity,
            _ => 0.,
        };
        let class = format!("sp-background-effect sp-effect-{}", effect);
        format!(
            "{}",
            html! {
                div(class = class.as_str(),
                    data-effect = effect.as_str(),
                    data-intensity = intensity.to_string()) {
                    : text
                }
            }
        )
    }

    fn style_sheets(&self, _: &Story, passage: &Passage) -> String {
        let effects: BTreeSet<String> = passage
            .commands
            .iter()
            .filter_map(EffectGenerator::effect_name)
            .collect();
        effects
            .iter()
            .map(|e| {
                format!(
                    "@keyframes sp-effect-{0} {{ from {{ background-position: 0 0; }} \
                     to {{ background-position: 0 100%; }} }}\n\
                     .sp-effect-{0} {{ animation: sp-effect-{0} 1s linear infinite; }}",
                    e
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct DelayGenerator;

impl CommandGenerator for DelayGenerator {
    fn html_content(&self, _: &Story, _: &Passage, command: &Command, text: &str) -> String {
        let duration = match &command.content {
            CommandContent::Delay(c) => c.duration_ms,
            _ => 0,
        };
        format!(
            "{}",
            html! {
                div(class = "sp-delay", data-duration = duration.to_string()) {
                    : text
                }
            }
        )
    }
}

pub struct ChoiceGenerator;

impl CommandGenerator for ChoiceGenerator {
    fn html_content(&self, _: &Story, _: &Passage, command: &Command, text: &str) -> String {
        let choices: &[Choice] = match &command.content {
            CommandContent::ChoiceBranch(c) => c.choices.as_slice(),
            _ => &[],
        };
        format!(
            "{}",
            html! {
                div(class = "sp-choice-menu") {
                    @ if !text.is_empty() {
                        p(class = "sp-choice-prompt") { : text }
                    }
                    ul(class = "sp-choices") {
                        @ for choice in choices.iter() {
                            li(class = "sp-choice", data-target = choice.target.as_str()) {
                                : choice.text.as_str()
                            }
                        }
                    }
                }
            }
        )
    }

    fn style_sheets(&self, story: &Story, passage: &Passage) -> String {
        if !passage.has_kind(CommandKind::ChoiceBranch) {
            return String::new();
        }
        with_settings(story, |s| {
            let group = "choiceMenu";
            format!(
                ".sp-choice {{ background-color: {}; color: {}; font-size: {}; margin-bottom: {}; }}\n\
                 .sp-choice:hover {{ background-color: {}; }}",
                css(s, group, "buttonColor"),
                css(s, group, "buttonTextColor"),
                css(s, group, "fontSize"),
                css(s, group, "gap"),
                css(s, group, "hoverColor"),
            )
        })
    }
}

pub struct TagBranchGenerator;

impl CommandGenerator for TagBranchGenerator {
    fn html_content(&self, _: &Story, _: &Passage, command: &Command, text: &str) -> String {
        let branches: &[TagBranch] = match &command.content {
            CommandContent::TagBranch(c) => c.branches.as_slice(),
            _ => &[],
        };
        format!(
            "{}",
            html! {
                div(class = "sp-tag-branch") {
                    @ if !text.is_empty() {
                        span(class = "sp-text") { : text }
                    }
                    @ for branch in branches.iter() {
                        div(class = "sp-tag-route",
                            data-tag = branch.tag.as_str(),
                            data-target = branch.target.as_str()) {}
                    }
                }
            }
        )
    }
}

/// A line spoken by a character
pub struct DialogGenerator;

impl CommandGenerator for DialogGenerator {
    fn html_content(&self, _: &Story, _: &Passage, command: &Command, text: &str) -> String {
        let (character, portrait) = match &command.content {
            CommandContent::CharacterDialog(c) => {
                (c.character.as_str(), c.portrait.as_deref().unwrap_or(""))
            }
            _ => ("", ""),
        };
        format!(
            "{}",
            html! {
                div(class = "sp-dialog") {
                    @ if !portrait.is_empty() {
                        img(class = "sp-portrait", src = portrait);
                    }
                    @ if !character.is_empty() {
                        span(class = "sp-speaker") { : character }
                    }
                    p(class = "sp-line") { : text }
                }
            }
        )
    }

    fn style_sheets(&self, story: &Story, passage: &Passage) -> String {
        if !passage.has_kind(CommandKind::CharacterDialog) {
            return String::new();
        }
        with_settings(story, |s| {
            let group = "dialogBox";
            let anchor = match css(s, group, "position").as_str() {
                "top" => "top: 0;",
                "center" => "top: 50%; transform: translateY(-50%);",
                _ => "bottom: 0;",
            };
            let image = css_url(s, group, "backgroundImage");
            let image = if image.is_empty() {
                String::new()
            } else {
                format!(" background-image: url(\"{}\");", image)
            };
            format!(
                ".sp-dialog {{ position: absolute; left: 0; right: 0; {} background-color: {}; \
                 color: {}; font-size: {}; padding: {}; opacity: {};{} }}",
                anchor,
                css(s, group, "backgroundColor"),
                css(s, group, "textColor"),
                css(s, group, "fontSize"),
                css(s, group, "padding"),
                css(s, group, "opacity"),
                image,
            )
        })
    }
}

pub struct CharacterGenerator;

impl CommandGenerator for CharacterGenerator {
    fn html_content(&self, _: &Story, _: &Passage, command: &Command, text: &str) -> String {
        let (character, src, action, position) = match &command.content {
            CommandContent::CharacterShowHide(c) => (
                c.character.as_str(),
                c.image_url.as_str(),
                if c.visible { "show" } else { "hide" },
                c.position.as_str(),
            ),
            _ => ("", "", "hide", ""),
        };
        format!(
            "{}",
            html! {
                div(class = "sp-character",
                    data-character = character,
                    data-action = action,
                    data-position = position,
                    data-src = src) {
                    : text
                }
            }
        )
    }
}

pub struct ClearScreenGenerator;

impl CommandGenerator for ClearScreenGenerator {
    fn html_content(&self, _: &Story, _: &Passage, _: &Command, text: &str) -> String {
        format!("{}", html! { div(class = "sp-clear-screen") { : text } })
    }
}

/// Inline script; the runtime runs it from the bootstrap data, so the markup
/// only keeps a hidden copy
pub struct ScriptGenerator;

impl CommandGenerator for ScriptGenerator {
    fn html_content(&self, _: &Story, _: &Passage, command: &Command, text: &str) -> String {
        let code = match &command.content {
            CommandContent::Script(c) if !c.code.is_empty() => c.code.as_str(),
            _ => text,
        };
        format!("{}", html! { tw-script(hidden = "") { : code } })
    }
}

/// Renders nothing but the command's text
pub struct PassthroughGenerator;

impl CommandGenerator for PassthroughGenerator {
    fn html_content(&self, _: &Story, _: &Passage, _: &Command, text: &str) -> String {
        let text = if text.is_empty() { PLACEHOLDER_TEXT } else { text };
        format!("{}", html! { span(class = "sp-placeholder") { : text } })
    }
}
