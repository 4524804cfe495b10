//! Rebuilds stories from published documents and hand-authored templates
//!
//! Import trusts only the declarative containers: `tw-storydata`,
//! `tw-passagedata`, `tw-command` and the settings carrier. Rendered markup
//! inside them is ignored. Every story, passage and command gets a fresh id.
//!
//! Nothing here fails. Malformed fragments are skipped or filled from the
//! default tables, and each such repair is logged and reported as an
//! [`ImportWarning`].
//!
//! [`ImportWarning`]: struct.ImportWarning.html

use crate::codec::ObjectCodec;
use crate::markup::{self, Element};
use crate::model::{Command, CommandKind, Passage, Story};
use crate::publish::{CODEC_MARKER_ATTR, SETTINGS_MARKER_ATTR};
use crate::settings::{SettingsDocument, SETTINGS_SCHEMA_VERSION};
use crate::utils;
use serde_json::json;
use std::fmt;
use std::ops::Range;

#[derive(Clone, Debug, PartialEq)]
pub enum ImportWarningKind {
    /// A command container without a usable step index
    MissingStep,

    /// A command type this build does not know
    UnknownCommandType(String),

    /// Command content that could not be decoded
    UndecodableContent(String),

    /// A story with no settings carrier
    MissingSettings,

    /// A start passage reference that matches no passage
    UnresolvedStart(String),

    /// An attribute whose value could not be parsed
    MalformedAttribute { name: String, value: String },
}

impl ImportWarningKind {
    /// Stable name used to allow or deny a warning
    pub fn get_name(&self) -> &'static str {
        match self {
            ImportWarningKind::MissingStep => "MissingStep",
            ImportWarningKind::UnknownCommandType(_) => "UnknownCommandType",
            ImportWarningKind::UndecodableContent(_) => "UndecodableContent",
            ImportWarningKind::MissingSettings => "MissingSettings",
            ImportWarningKind::UnresolvedStart(_) => "UnresolvedStart",
            ImportWarningKind::MalformedAttribute { .. } => "MalformedAttribute",
        }
    }
}

impl fmt::Display for ImportWarningKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImportWarningKind::MissingStep => {
                write!(f, "Command container has no valid step index and was skipped")
            }
            ImportWarningKind::UnknownCommandType(tag) => write!(
                f,
                "Unknown command type \"{}\" imported as {}",
                tag,
                CommandKind::FALLBACK
            ),
            ImportWarningKind::UndecodableContent(why) => {
                write!(f, "Command content could not be decoded: {}", why)
            }
            ImportWarningKind::MissingSettings => write!(
                f,
                "Story has no settings carrier; settings must be loaded from defaults"
            ),
            ImportWarningKind::UnresolvedStart(pid) => {
                write!(f, "Start passage {} matches no passage", pid)
            }
            ImportWarningKind::MalformedAttribute { name, value } => {
                write!(f, "Malformed {} attribute: \"{}\"", name, value)
            }
        }
    }
}

/// A repair made while importing, with the byte range of the start tag it
/// concerns
#[derive(Clone, Debug, PartialEq)]
pub struct ImportWarning {
    pub kind: ImportWarningKind,
    pub span: Range<usize>,
}

impl ImportWarning {
    pub fn get_name(&self) -> &'static str {
        self.kind.get_name()
    }
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (at byte {})", self.kind, self.span.start)
    }
}

/// Stories recovered from a document and the warnings raised on the way
#[derive(Clone, Debug, Default)]
pub struct ImportOutput {
    pub stories: Vec<Story>,
    pub warnings: Vec<ImportWarning>,
}

impl ImportOutput {
    pub fn take(self) -> (Vec<Story>, Vec<ImportWarning>) {
        (self.stories, self.warnings)
    }
}

/// Imports every story in `text`
pub fn import(text: &str) -> Vec<Story> {
    import_with_warnings(text).stories
}

/// Imports every story in `text`, keeping the warnings
pub fn import_with_warnings(text: &str) -> ImportOutput {
    let nodes = markup::parse(text);
    let carriers = markup::find_with_attr(&nodes, SETTINGS_MARKER_ATTR);

    let mut importer = Importer::default();
    let stories = markup::find_all(&nodes, "tw-storydata")
        .into_iter()
        .map(|el| importer.story(el, &carriers))
        .collect::<Vec<_>>();

    tracing::debug!(
        stories = stories.len(),
        warnings = importer.warnings.len(),
        "imported document"
    );

    ImportOutput {
        stories,
        warnings: importer.warnings,
    }
}

#[derive(Default)]
struct Importer {
    warnings: Vec<ImportWarning>,
}

fn non_empty(s: &&str) -> bool {
    !s.trim().is_empty()
}

impl Importer {
    fn warn(&mut self, kind: ImportWarningKind, span: Range<usize>) {
        tracing::warn!(at = span.start, "{}", kind);
        self.warnings.push(ImportWarning { kind, span });
    }

    fn story(&mut self, el: &Element, carriers: &[&Element]) -> Story {
        let codec = el
            .attr(CODEC_MARKER_ATTR)
            .map(ObjectCodec::with_marker)
            .unwrap_or_default();

        let mut story = Story::default();
        if let Some(name) = el.attr("name") {
            story.name = name.to_string();
        }
        if let Some(ifid) = el.attr("ifid").filter(non_empty) {
            story.ifid = ifid.trim().to_string();
        }
        if let Some(format) = el.attr("format").filter(non_empty) {
            story.story_format = format.to_string();
        }
        if let Some(version) = el.attr("format-version").filter(non_empty) {
            story.story_format_version = version.to_string();
        }
        if let Some(zoom) = el.attr("zoom").filter(non_empty) {
            match zoom.trim().parse::<f64>().ok().filter(|z| z.is_finite() && *z > 0.) {
                Some(zoom) => story.zoom = zoom,
                None => self.malformed("zoom", zoom, el),
            }
        }

        for child in el.child_elements() {
            match child.name.as_str() {
                "style"
                    if child.attr("role") == Some("stylesheet")
                        || child.attr("id") == Some("twine-user-stylesheet") =>
                {
                    story.stylesheet = child.text();
                }
                "script"
                    if child.attr("role") == Some("script")
                        || child.attr("id") == Some("twine-user-script") =>
                {
                    story.script = child.text();
                }
                "tw-tag" => {
                    if let (Some(tag), Some(color)) = (child.attr("name"), child.attr("color")) {
                        story.tag_colors.insert(tag.to_string(), color.to_string());
                    }
                }
                _ => {}
            }
        }

        let startnode = el.attr("startnode").map(str::trim).filter(non_empty);
        for (index, passage_el) in el.descendants("tw-passagedata").into_iter().enumerate() {
            let passage = self.passage(passage_el, &codec);
            let pid = match passage_el.attr("pid").map(str::trim).filter(non_empty) {
                Some(pid) => pid.to_string(),
                None => (index + 1).to_string(),
            };
            if story.start_passage.is_none() && startnode == Some(pid.as_str()) {
                story.start_passage = Some(passage.id.clone());
            }
            story.passages.push(passage);
        }
        if let (Some(startnode), None) = (startnode, &story.start_passage) {
            self.warn(
                ImportWarningKind::UnresolvedStart(startnode.to_string()),
                el.span.clone(),
            );
        }

        story.settings = self.settings(el, carriers, &codec);
        story
    }

    fn settings(
        &mut self,
        el: &Element,
        carriers: &[&Element],
        story_codec: &ObjectCodec,
    ) -> Option<SettingsDocument> {
        let ifid = el.attr("ifid").map(str::trim);
        let carrier = carriers
            .iter()
            .find(|c| ifid.is_some() && c.attr("data-for-story").map(str::trim) == ifid)
            .or_else(|| if carriers.len() == 1 { carriers.first() } else { None });

        let carrier = match carrier {
            Some(carrier) => carrier,
            None => {
                self.warn(ImportWarningKind::MissingSettings, el.span.clone());
                return None;
            }
        };

        if let Some(version) = carrier.attr("data-settings-version") {
            if version.trim() != SETTINGS_SCHEMA_VERSION.to_string() {
                tracing::debug!(
                    version,
                    current = SETTINGS_SCHEMA_VERSION,
                    "settings written by another schema version"
                );
            }
        }

        let codec = carrier
            .attr(CODEC_MARKER_ATTR)
            .map(ObjectCodec::with_marker)
            .unwrap_or_else(|| story_codec.clone());
        let raw = carrier.attr(SETTINGS_MARKER_ATTR).unwrap_or("");
        let decoded = codec
            .try_decode(raw)
            .map_err(|e| e.to_string())
            .and_then(|value| serde_json::from_value(value).map_err(|e| e.to_string()));
        match decoded {
            Ok(settings) => Some(settings),
            Err(why) => {
                self.warn(
                    ImportWarningKind::UndecodableContent(why),
                    carrier.span.clone(),
                );
                None
            }
        }
    }

    fn passage(&mut self, el: &Element, codec: &ObjectCodec) -> Passage {
        let mut passage = Passage::default();
        if let Some(name) = el.attr("name") {
            passage.name = name.to_string();
        }
        if let Some(tags) = el.attr("tags") {
            passage.tags = tags.split_whitespace().map(str::to_string).collect();
        }
        if let Some(position) = el.attr("position").filter(non_empty) {
            match utils::parse_pair(position) {
                Some((left, top)) => {
                    passage.left = left;
                    passage.top = top;
                }
                None => self.malformed("position", position, el),
            }
        }
        if let Some(size) = el.attr("size").filter(non_empty) {
            match utils::parse_pair(size) {
                Some((width, height)) => {
                    passage.width = width;
                    passage.height = height;
                }
                None => self.malformed("size", size, el),
            }
        }
        if let Some(color) = el.attr("color").filter(non_empty) {
            passage.color = Some(color.to_string());
        }

        let containers: Vec<&Element> = el
            .child_elements()
            .filter(|c| c.name == "tw-command")
            .collect();

        let mut steps = Vec::with_capacity(containers.len());
        for container in containers.iter() {
            match container
                .attr("step")
                .and_then(|s| s.trim().parse::<usize>().ok())
            {
                Some(step) => steps.push((step, *container)),
                None => self.warn(ImportWarningKind::MissingStep, container.span.clone()),
            }
        }
        steps.sort_by_key(|(step, _)| *step);

        for (_, container) in steps {
            let command = self.command(container, codec);
            passage.commands.push(command);
        }

        // A plain Twine passage: its text is the whole story beat
        if containers.is_empty() {
            let text = el.own_text();
            if !text.trim().is_empty() {
                passage
                    .commands
                    .push(Command::text(CommandKind::CustomCommand, text));
            }
        }

        passage
    }

    fn command(&mut self, el: &Element, codec: &ObjectCodec) -> Command {
        let tag = el.attr("type").unwrap_or("").trim();
        if CommandKind::from_tag(tag).is_none() {
            self.warn(
                ImportWarningKind::UnknownCommandType(tag.to_string()),
                el.span.clone(),
            );
        }

        let decoded = match el.attr("content") {
            Some(raw) => codec.try_decode(raw).map_err(|e| e.to_string()),
            None => Err("missing content attribute".to_string()),
        };
        let content = match decoded {
            Ok(content) => content,
            Err(why) => {
                self.warn(ImportWarningKind::UndecodableContent(why), el.span.clone());
                json!({ "text": el.text() })
            }
        };

        Command::from_parts(tag, content)
    }

    fn malformed(&mut self, name: &str, value: &str, el: &Element) {
        self.warn(
            ImportWarningKind::MalformedAttribute {
                name: name.to_string(),
                value: value.to_string(),
            },
            el.span.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommandContent;

    fn names(warnings: &[ImportWarning]) -> Vec<&'static str> {
        warnings.iter().map(|w| w.get_name()).collect()
    }

    #[test]
    fn no_containers_is_empty_not_an_error() {
        let output = import_with_warnings("<html><body><p>nothing here</p></body></html>");
        assert!(output.stories.is_empty());
        assert!(output.warnings.is_empty());
        assert!(import("").is_empty());
    }

    #[test]
    fn minimal_template_gets_defaults() {
        let doc = r#"<tw-storydata name="Tmpl" startnode="1">
            <tw-passagedata pid="1" name="Start">You wake up.</tw-passagedata>
        </tw-storydata>"#;
        let (stories, warnings) = import_with_warnings(doc).take();
        assert_eq!(names(&warnings), vec!["MissingSettings"]);

        let story = &stories[0];
        assert_eq!(story.name, "Tmpl");
        assert_eq!(story.zoom, 1.);
        assert!(story.settings.is_none());
        assert!(!story.ifid.is_empty());

        let start = &story.passages[0];
        assert_eq!(story.start_passage.as_deref(), Some(start.id.as_str()));
        assert_eq!((start.width, start.height), (100., 100.));
        assert_eq!(start.commands.len(), 1);
        assert_eq!(start.commands[0].kind, CommandKind::CustomCommand);
        assert_eq!(start.commands[0].content.text(), "You wake up.");
    }

    #[test]
    fn commands_follow_step_order_and_skip_bad_steps() {
        let codec = ObjectCodec::new();
        let first = codec.encode(&json!({ "text": "first" })).unwrap();
        let second = codec.encode(&json!({ "text": "second" })).unwrap();
        let doc = format!(
            r#"<tw-storydata name="S" data-codec-marker="{marker}">
                <tw-passagedata pid="1" name="P">
                    <tw-command step="1" type="customCommand" content="{second}">x</tw-command>
                    <tw-command type="customCommand" content="{first}">x</tw-command>
                    <tw-command step="0" type="customCommand" content="{first}">x</tw-command>
                </tw-passagedata>
            </tw-storydata>"#,
            marker = codec.marker(),
            first = first,
            second = second
        );
        let (stories, warnings) = import_with_warnings(&doc).take();
        assert_eq!(names(&warnings), vec!["MissingStep", "MissingSettings"]);

        let texts: Vec<&str> = stories[0].passages[0]
            .commands
            .iter()
            .map(|c| c.content.text())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn unknown_type_is_coerced() {
        let codec = ObjectCodec::new();
        let content = codec.encode(&json!({ "text": "zap", "power": 9 })).unwrap();
        let doc = format!(
            r#"<tw-storydata data-codec-marker="{}"><tw-passagedata name="P">
               <tw-command step="0" type="teleport" content="{}"></tw-command>
               </tw-passagedata></tw-storydata>"#,
            codec.marker(),
            content
        );
        let (stories, warnings) = import_with_warnings(&doc).take();
        assert!(warnings
            .iter()
            .any(|w| w.kind == ImportWarningKind::UnknownCommandType("teleport".into())));

        let command = &stories[0].passages[0].commands[0];
        assert_eq!(command.kind, CommandKind::FALLBACK);
        assert_eq!(
            command.content,
            CommandContent::Unrecognized(json!({ "text": "zap", "power": 9 }))
        );
    }

    #[test]
    fn undecodable_content_falls_back_to_rendered_text() {
        let doc = r#"<tw-storydata><tw-passagedata name="P">
            <tw-command step="0" type="customCommand" content="%7Bbroken"><span>shown</span></tw-command>
            </tw-passagedata></tw-storydata>"#;
        let (stories, warnings) = import_with_warnings(doc).take();
        assert!(names(&warnings).contains(&"UndecodableContent"));
        assert_eq!(stories[0].passages[0].commands[0].content.text(), "shown");
    }

    #[test]
    fn malformed_attributes_use_defaults() {
        let doc = r#"<tw-storydata zoom="big" startnode="7">
            <tw-passagedata name="P" position="nowhere" size="10,20"></tw-passagedata>
            </tw-storydata>"#;
        let (stories, warnings) = import_with_warnings(doc).take();
        assert_eq!(
            names(&warnings),
            vec![
                "MalformedAttribute",
                "MalformedAttribute",
                "UnresolvedStart",
                "MissingSettings"
            ]
        );
        let story = &stories[0];
        assert_eq!(story.zoom, 1.);
        assert!(story.start_passage.is_none());
        let passage = &story.passages[0];
        assert_eq!((passage.left, passage.top), (0., 0.));
        assert_eq!((passage.width, passage.height), (10., 20.));
    }

    #[test]
    fn non_finite_numbers_are_malformed() {
        let doc = r#"<tw-storydata zoom="NaN">
            <tw-passagedata name="P" position="inf,NaN" size="1e999,5"></tw-passagedata>
            </tw-storydata>"#;
        let (stories, warnings) = import_with_warnings(doc).take();
        assert_eq!(
            names(&warnings),
            vec![
                "MalformedAttribute",
                "MalformedAttribute",
                "MalformedAttribute",
                "MissingSettings"
            ]
        );
        let story = &stories[0];
        assert_eq!(story.zoom, 1.);
        let passage = &story.passages[0];
        assert_eq!((passage.left, passage.top), (0., 0.));
        assert_eq!((passage.width, passage.height), (100., 100.));

        let saved = serde_json::to_string(story).unwrap();
        let loaded: Story = serde_json::from_str(&saved).unwrap();
        assert_eq!(loaded.zoom, 1.);
        assert_eq!(loaded.passages[0].left, 0.);
    }

    #[test]
    fn deeply_nested_template_imports() {
        let doc = format!(
            r#"<tw-storydata name="Deep"><tw-passagedata pid="1" name="P">x</tw-passagedata>{}"#,
            "<div>".repeat(50_000)
        );
        let stories = import(&doc);
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].name, "Deep");
        assert_eq!(stories[0].passages.len(), 1);
    }

    #[test]
    fn story_level_attributes() {
        let doc = r##"<tw-storydata name="Attrs" ifid="ABC" format="Harlowe" format-version="3.3.8" zoom="0.6">
            <style role="stylesheet" id="twine-user-stylesheet" type="text/twine-css">body { color: red; }</style>
            <script role="script" id="twine-user-script" type="text/twine-javascript">if (a &lt; b) {}</script>
            <tw-tag name="scary" color="red"></tw-tag>
            <tw-passagedata pid="1" name="A" tags="one two" color="#ff0000"></tw-passagedata>
            </tw-storydata>"##;
        let story = import(doc).remove(0);
        assert_eq!(story.ifid, "ABC");
        assert_eq!(story.story_format, "Harlowe");
        assert_eq!(story.story_format_version, "3.3.8");
        assert_eq!(story.zoom, 0.6);
        assert_eq!(story.stylesheet, "body { color: red; }");
        assert_eq!(story.script, "if (a < b) {}");
        assert_eq!(story.tag_colors.get("scary").map(String::as_str), Some("red"));
        assert_eq!(story.passages[0].tags, vec!["one", "two"]);
        assert_eq!(story.passages[0].color.as_deref(), Some("#ff0000"));
        assert!(story.passages[0].commands.is_empty());
    }

    #[test]
    fn settings_carriers_match_by_ifid() {
        let codec = ObjectCodec::new();
        let mut a = SettingsDocument::defaults();
        a.set_property("endMenu", "message", json!("A ends"), None)
            .unwrap();
        let mut b = SettingsDocument::defaults();
        b.set_property("endMenu", "message", json!("B ends"), None)
            .unwrap();

        let doc = format!(
            r#"<div data-storypress-settings="{b}" data-codec-marker="{m}" data-for-story="B"></div>
               <tw-storydata name="a" ifid="A"></tw-storydata>
               <tw-storydata name="b" ifid="B"></tw-storydata>
               <div data-storypress-settings="{a}" data-codec-marker="{m}" data-for-story="A"></div>"#,
            a = codec.encode(&a).unwrap(),
            b = codec.encode(&b).unwrap(),
            m = codec.marker()
        );
        let stories = import(&doc);
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].settings.as_ref(), Some(&a));
        assert_eq!(stories[1].settings.as_ref(), Some(&b));
    }

    #[test]
    fn ids_are_always_fresh() {
        let doc = r#"<tw-storydata startnode="1"><tw-passagedata pid="1" name="P">x</tw-passagedata></tw-storydata>"#;
        let first = import(doc).remove(0);
        let second = import(doc).remove(0);
        assert_ne!(first.id, second.id);
        assert_ne!(first.passages[0].id, second.passages[0].id);
        assert_ne!(
            first.passages[0].commands[0].id,
            second.passages[0].commands[0].id
        );
    }
}
