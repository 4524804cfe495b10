//! Serializes a story into a single playable, re-importable document
//!
//! The output is a sequence of fragments, in order:
//!
//! 1. a bootstrap script holding the whole story, encoded, or an array of
//!    stories for an archive
//! 2. per story, the `tw-storydata` container with one `tw-passagedata` per
//!    passage and one `tw-command` per command, followed by a hidden settings
//!    carrier under [`SETTINGS_MARKER_ATTR`]
//! 3. the containers and styles the player runtime expects
//!
//! Every encoded value in one document goes through one [`ObjectCodec`], and
//! its marker is written next to the data as [`CODEC_MARKER_ATTR`].
//!
//! [`SETTINGS_MARKER_ATTR`]: constant.SETTINGS_MARKER_ATTR.html
//! [`CODEC_MARKER_ATTR`]: constant.CODEC_MARKER_ATTR.html
//! [`ObjectCodec`]: ../codec/struct.ObjectCodec.html

use crate::codec::ObjectCodec;
use crate::error::PublishError;
use crate::generators::GeneratorRegistry;
use crate::model::Story;
use crate::settings::{SettingsDocument, SETTINGS_SCHEMA_VERSION};
use crate::utils;

use clap::{crate_name, crate_version};
use horrorshow::{html, Raw};

/// Attribute that marks the settings carrier
pub const SETTINGS_MARKER_ATTR: &str = "data-storypress-settings";

/// Attribute recording the quote marker of the codec used for a document
pub const CODEC_MARKER_ATTR: &str = "data-codec-marker";

/// Id of the bootstrap script
pub const BOOTSTRAP_ID: &str = "storypress-bootstrap";

/// Caller choices for one publish
#[derive(Clone, Debug, Default)]
pub struct PublishOptions {
    /// Publish even if the story has no usable start passage
    pub allow_missing_start: bool,

    /// Id of a passage to start at instead of the story's own start passage
    pub start_override: Option<String>,

    /// Ask the runtime for its debug mode
    pub debug: bool,

    /// Extra options passed through to the story format
    pub format_options: String,
}

struct RenderedCommand {
    step: usize,
    tag: &'static str,
    content: String,
    markup: String,
}

/// Publishes `story`. Fails only if the story has no usable entry point and
/// `options` does not allow that
pub fn publish(
    story: &Story,
    registry: &GeneratorRegistry,
    options: &PublishOptions,
) -> Result<String, PublishError> {
    publish_all(std::slice::from_ref(story), registry, options)
}

/// Publishes `stories` into one archive document. Every entry point is
/// checked before anything is rendered. The stories share one codec, one
/// bootstrap script and one set of runtime containers, and the element ids
/// of the second and later stories are numbered so they stay unique
pub fn publish_all(
    stories: &[Story],
    registry: &GeneratorRegistry,
    options: &PublishOptions,
) -> Result<String, PublishError> {
    let starts = stories
        .iter()
        .map(|story| resolve_start(story, options))
        .collect::<Result<Vec<_>, _>>()?;
    let codec = ObjectCodec::new();

    let bootstrap_stories: Vec<Story> = stories
        .iter()
        .map(|story| {
            let mut story = story.clone();
            if story.settings.is_none() {
                story.settings = Some(SettingsDocument::defaults());
            }
            story
        })
        .collect();
    let encoded = match bootstrap_stories.as_slice() {
        [story] => codec.encode(story)?,
        all => codec.encode(all)?,
    };
    let bootstrap = format!(
        "{}",
        html! {
            script(id = BOOTSTRAP_ID,
                   type = "application/x-storypress",
                   data-codec-marker = codec.marker()) {
                : encoded.as_str()
            }
        }
    );

    let mut fragments = vec![bootstrap];
    for (position, (story, start)) in bootstrap_stories.iter().zip(starts).enumerate() {
        fragments.push(story_fragment(&codec, story, start, position, registry, options)?);
    }
    fragments.push(runtime_scaffolding());
    Ok(fragments.join("\n"))
}

/// `base` for the first story of a document, `base-N` for the N-th story
fn element_id(base: &str, position: usize) -> String {
    match position {
        0 => base.to_string(),
        n => format!("{}-{}", base, n + 1),
    }
}

/// The `tw-storydata` container and settings carrier of one story. `story`
/// already holds the settings to publish
fn story_fragment(
    codec: &ObjectCodec,
    story: &Story,
    start: Option<usize>,
    position: usize,
    registry: &GeneratorRegistry,
    options: &PublishOptions,
) -> Result<String, PublishError> {
    let encoded_settings = match &story.settings {
        Some(settings) => codec.encode(settings)?,
        None => codec.encode(&SettingsDocument::defaults())?,
    };

    let mut passages = Vec::with_capacity(story.passages.len());
    for (index, passage) in story.passages.iter().enumerate() {
        let mut commands = Vec::with_capacity(passage.commands.len());
        for (step, command) in passage.commands.iter().enumerate() {
            commands.push(RenderedCommand {
                step,
                tag: command.kind.tag(),
                content: codec.encode(&command.content.to_value())?,
                markup: registry.html_content_for(story, passage, command, None),
            });
        }
        // Generator output is trusted, but must not close the style element
        let styles = registry.style_sheets(story, passage).replace("</", "<\\/");
        let pid = index + 1;

        passages.push(format!(
            "{}",
            html! {
                tw-passagedata(pid = pid,
                               name = passage.name.as_str(),
                               tags = passage.tags.join(" "),
                               position = utils::format_pair(passage.left, passage.top),
                               size = utils::format_pair(passage.width, passage.height),
                               color = passage.color.as_deref().unwrap_or("")) {
                    @ for command in commands.iter() {
                        tw-command(step = command.step,
                                   type = command.tag,
                                   content = command.content.as_str()) {
                            : Raw(command.markup.as_str())
                        }
                    }
                    @ if !styles.is_empty() {
                        style(data-passage-styles = "") {
                            : Raw(styles.as_str())
                        }
                    }
                }
            }
        ));
    }

    let startnode = start.map(|i| (i + 1).to_string()).unwrap_or_default();
    let format_options = if options.debug {
        format!("debug {}", options.format_options).trim().to_string()
    } else {
        options.format_options.trim().to_string()
    };

    let story_data = format!(
        "{}",
        html! {
            tw-storydata(name = story.name.as_str(),
                         startnode = startnode.as_str(),
                         creator = crate_name!(),
                         creator-version = crate_version!(),
                         ifid = story.ifid.as_str(),
                         zoom = story.zoom.to_string(),
                         format = story.story_format.as_str(),
                         format-version = story.story_format_version.as_str(),
                         options = format_options.as_str(),
                         data-codec-marker = codec.marker(),
                         hidden = "") {
                style(id = element_id("twine-user-stylesheet", position),
                      type = "text/twine-css",
                      role = "stylesheet") {
                    : story.stylesheet.as_str()
                }

                script(id = element_id("twine-user-script", position),
                       type = "text/twine-javascript",
                       role = "script") {
                    : story.script.as_str()
                }

                @ for (tag, color) in story.tag_colors.iter() {
                    tw-tag(name = tag.as_str(), color = color.as_str()) {}
                }

                @ for passage in passages.iter() {
                    : Raw(passage.as_str())
                }
            }
        }
    );

    let settings_carrier = format!(
        "{}",
        html! {
            div(id = element_id("storypress-settings", position),
                data-storypress-settings = encoded_settings.as_str(),
                data-codec-marker = codec.marker(),
                data-for-story = story.ifid.as_str(),
                data-settings-version = SETTINGS_SCHEMA_VERSION.to_string(),
                hidden = "") {}
        }
    );

    tracing::debug!(
        story = story.name.as_str(),
        passages = story.passages.len(),
        position,
        "published story"
    );

    Ok(format!("{}\n{}", story_data, settings_carrier))
}

fn resolve_start(story: &Story, options: &PublishOptions) -> Result<Option<usize>, PublishError> {
    let requested = options
        .start_override
        .as_ref()
        .or_else(|| story.start_passage.as_ref());

    match requested {
        Some(id) => match story.passage_index(id) {
            Some(index) => Ok(Some(index)),
            None if options.allow_missing_start => {
                tracing::warn!(start = id.as_str(), "start passage not found, publishing without one");
                Ok(None)
            }
            None => Err(PublishError::UnknownEntryPoint(id.clone())),
        },
        None if options.allow_missing_start => Ok(None),
        None => Err(PublishError::MissingEntryPoint),
    }
}

/// Containers the player runtime draws into
fn runtime_scaffolding() -> String {
    format!(
        "{}",
        html! {
            div(id = "sp-background-container", class = "sp-background") {}
            div(id = "sp-character-container", class = "sp-characters") {}
            div(id = "sp-start-modal", class = "sp-modal", hidden = "") {}
            div(id = "sp-end-modal", class = "sp-modal", hidden = "") {}
            div(id = "sp-choice-modal", class = "sp-modal", hidden = "") {}
            style(id = "sp-runtime-styles") {
                : Raw(RUNTIME_STYLES)
            }
        }
    )
}

const RUNTIME_STYLES: &str = "\
.sp-background { position: fixed; inset: 0; background-size: cover; z-index: 0; }
.sp-characters { position: fixed; inset: 0; pointer-events: none; z-index: 1; }
.sp-modal { position: fixed; inset: 0; display: flex; align-items: center; justify-content: center; z-index: 10; }
.sp-modal[hidden] { display: none; }";
