//! Storypress publishes command-based interactive fiction stories as single
//! self-contained documents, and imports them back
//!
//! A published document is Twine-compatible on the outside (`tw-storydata`,
//! `tw-passagedata`) and carries everything needed to rebuild the story:
//! each command's type and encoded content, and the story's presentation
//! settings.
//!
//! ```no_run
//! use storypress::{import, publish, GeneratorRegistry, PublishOptions, Story};
//!
//! # fn story() -> Story { Story::new("Demo") }
//! let registry = GeneratorRegistry::with_defaults();
//! let document = publish(&story(), &registry, &PublishOptions::default())?;
//! let stories = import(&document);
//! # Ok::<(), storypress::PublishError>(())
//! ```
//!
//! Some nice-to-haves that I may eventually work on:
//! - [ ] Reading the bootstrap script when the declarative containers are gone
//! - [ ] Archive export of a whole library in one document

pub mod codec;
pub use codec::ObjectCodec;

mod config;
pub use config::CliConfig;
pub use config::Config;
pub use config::ConfigFile;
pub use config::Mode;

pub mod error;
pub use error::{CodecError, PublishError, SettingsError};

pub mod generators;
pub use generators::{CommandGenerator, GeneratorRegistry};

pub mod import;
pub use import::{import, import_with_warnings, ImportOutput, ImportWarning, ImportWarningKind};

pub mod issue;
pub use issue::Issue;

pub mod linter;

pub mod markup;

pub mod model;
pub use model::{Command, CommandContent, CommandKind, Passage, Story};

pub mod publish;
pub use publish::{publish, publish_all, PublishOptions};

pub mod settings;
pub use settings::{InputKind, PropertyDescriptor, SettingsDocument, SettingsFamily, SettingsGroup};

mod story_format;
pub use story_format::StoryFormat;

pub mod storypress;

pub mod utils;
