//! Presentation settings: a versioned schema of groups of typed properties
//!
//! A live [`SettingsDocument`] is always built the same way: install the
//! current defaults, then let them absorb whatever was persisted for the
//! story with [`SettingsDocument::be_overridden_by`]. Properties added to the
//! defaults since the story was saved therefore show up with their default
//! values, while everything the author already set keeps the author's value.
//!
//! [`SettingsDocument`]: struct.SettingsDocument.html
//! [`SettingsDocument::be_overridden_by`]: struct.SettingsDocument.html#method.be_overridden_by

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Version of the default schema built by [`SettingsDocument::defaults`]
///
/// [`SettingsDocument::defaults`]: struct.SettingsDocument.html#method.defaults
pub const SETTINGS_SCHEMA_VERSION: u32 = 3;

/// How a property is edited
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InputKind {
    Text,
    Number,
    Slider,
    Color,
    Link,
    Position,
}

impl Default for InputKind {
    fn default() -> Self {
        InputKind::Text
    }
}

impl From<String> for InputKind {
    // Editors newer than this build may know more kinds; edit those as text
    fn from(s: String) -> Self {
        match s.as_str() {
            "number" => InputKind::Number,
            "slider" => InputKind::Slider,
            "color" => InputKind::Color,
            "link" => InputKind::Link,
            "position" => InputKind::Position,
            _ => InputKind::Text,
        }
    }
}

impl From<InputKind> for String {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::Text => "text",
            InputKind::Number => "number",
            InputKind::Slider => "slider",
            InputKind::Color => "color",
            InputKind::Link => "link",
            InputKind::Position => "position",
        }
        .to_string()
    }
}

/// One user-editable property
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub input: InputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,

    /// Kind of asset a `link` property points at, e.g. `image` or `audio`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_kind: Option<String>,
}

impl PropertyDescriptor {
    pub fn new(input: InputKind, value: Value) -> Self {
        PropertyDescriptor {
            value,
            unit: None,
            input,
            min: None,
            max: None,
            step: None,
            asset_kind: None,
        }
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn range(mut self, min: f64, max: f64, step: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.step = Some(step);
        self
    }

    pub fn asset(mut self, kind: &str) -> Self {
        self.asset_kind = Some(kind.to_string());
        self
    }

    /// The value with its unit appended, ready for a stylesheet
    pub fn css_value(&self) -> String {
        let unit = self.unit.as_deref().unwrap_or("");
        match &self.value {
            Value::String(s) => format!("{}{}", s, unit),
            Value::Null => String::new(),
            other => format!("{}{}", other, unit),
        }
    }
}

/// A named group of properties
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsGroup {
    pub title: String,
    pub description: String,
    pub properties: BTreeMap<String, PropertyDescriptor>,
}

/// All presentation settings of a story, keyed by group name
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsDocument {
    groups: BTreeMap<String, SettingsGroup>,
}

impl SettingsDocument {
    /// Creates a document with no groups
    pub fn new() -> Self {
        SettingsDocument::default()
    }

    /// Creates a document holding the full current default schema
    pub fn defaults() -> Self {
        let mut doc = SettingsDocument::new();
        for family in SettingsFamily::ALL.iter() {
            family.install(&mut doc);
        }
        doc
    }

    /// Parses a persisted document, logging and returning `None` if it is
    /// not one
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable persisted settings");
                None
            }
        }
    }

    /// The standard load sequence: fresh defaults absorbing `persisted`
    pub fn absorb(persisted: Option<&SettingsDocument>) -> Self {
        let mut doc = SettingsDocument::defaults();
        if let Some(persisted) = persisted {
            doc.be_overridden_by(persisted);
        }
        doc
    }

    /// The standard load sequence from persisted text
    pub fn load(persisted_raw: Option<&str>) -> Self {
        let persisted = persisted_raw.and_then(SettingsDocument::parse);
        SettingsDocument::absorb(persisted.as_ref())
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &SettingsGroup)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn group(&self, name: &str) -> Option<&SettingsGroup> {
        self.groups.get(name)
    }

    pub fn property(&self, group: &str, name: &str) -> Option<&PropertyDescriptor> {
        self.groups.get(group)?.properties.get(name)
    }

    pub fn value(&self, group: &str, name: &str) -> Option<&Value> {
        self.property(group, name).map(|p| &p.value)
    }

    /// Creates an empty group unless one with this name already exists
    pub fn create_group(&mut self, name: &str) -> &mut SettingsGroup {
        self.groups.entry(name.to_string()).or_default()
    }

    /// Like [`create_group`], also setting the display text of a new group
    ///
    /// [`create_group`]: #method.create_group
    pub fn create_group_with(
        &mut self,
        name: &str,
        title: &str,
        description: &str,
    ) -> &mut SettingsGroup {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| SettingsGroup {
                title: title.to_string(),
                description: description.to_string(),
                properties: BTreeMap::new(),
            })
    }

    /// Registers a property. A property that is already registered is left
    /// untouched, so a changed default never clobbers a persisted value.
    /// Returns whether the property was added
    pub fn add_property(&mut self, group: &str, name: &str, descriptor: PropertyDescriptor) -> bool {
        let properties = &mut self.create_group(group).properties;
        if properties.contains_key(name) {
            return false;
        }
        properties.insert(name.to_string(), descriptor);
        true
    }

    /// Overwrites the value and unit of a registered property
    pub fn set_property(
        &mut self,
        group: &str,
        name: &str,
        value: Value,
        unit: Option<String>,
    ) -> Result<(), SettingsError> {
        let properties = &mut self
            .groups
            .get_mut(group)
            .ok_or_else(|| SettingsError::UnknownGroup(group.to_string()))?
            .properties;
        let property = properties
            .get_mut(name)
            .ok_or_else(|| SettingsError::UnknownProperty {
                group: group.to_string(),
                property: name.to_string(),
            })?;
        property.value = value;
        property.unit = unit;
        Ok(())
    }

    /// Absorbs `other`: its groups and properties are added where missing,
    /// and its values and units win wherever both documents have a property
    pub fn be_overridden_by(&mut self, other: &SettingsDocument) -> &mut Self {
        for (group_name, other_group) in &other.groups {
            let group = self.create_group_with(
                group_name,
                &other_group.title,
                &other_group.description,
            );
            for (name, other_property) in &other_group.properties {
                let property = group
                    .properties
                    .entry(name.clone())
                    .or_insert_with(|| other_property.clone());
                property.value = other_property.value.clone();
                property.unit = other_property.unit.clone();
            }
        }
        self
    }
}

/// The story-wide visual subsystems that carry settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsFamily {
    DialogBox,
    StartMenu,
    EndMenu,
    ChoiceMenu,
}

impl SettingsFamily {
    pub const ALL: [SettingsFamily; 4] = [
        SettingsFamily::DialogBox,
        SettingsFamily::StartMenu,
        SettingsFamily::EndMenu,
        SettingsFamily::ChoiceMenu,
    ];

    pub fn group_name(self) -> &'static str {
        match self {
            SettingsFamily::DialogBox => "dialogBox",
            SettingsFamily::StartMenu => "startMenu",
            SettingsFamily::EndMenu => "endMenu",
            SettingsFamily::ChoiceMenu => "choiceMenu",
        }
    }

    /// Adds this family's group and default properties to `doc`
    pub fn install(self, doc: &mut SettingsDocument) {
        use InputKind::*;

        let group = self.group_name();
        let (title, description) = match self {
            SettingsFamily::DialogBox => ("Dialog box", "Appearance of character dialog"),
            SettingsFamily::StartMenu => ("Start menu", "Title screen shown before the story"),
            SettingsFamily::EndMenu => ("End menu", "Screen shown when the story ends"),
            SettingsFamily::ChoiceMenu => ("Choice menu", "Buttons offered at a branch"),
        };
        doc.create_group_with(group, title, description);

        let properties = match self {
            SettingsFamily::DialogBox => vec![
                ("backgroundColor", PropertyDescriptor::new(Color, json!("#000000"))),
                ("textColor", PropertyDescriptor::new(Color, json!("#ffffff"))),
                (
                    "fontSize",
                    PropertyDescriptor::new(Number, json!(18)).unit("px").range(8., 72., 1.),
                ),
                (
                    "padding",
                    PropertyDescriptor::new(Slider, json!(12)).unit("px").range(0., 64., 1.),
                ),
                (
                    "opacity",
                    PropertyDescriptor::new(Slider, json!(0.8)).range(0., 1., 0.05),
                ),
                ("position", PropertyDescriptor::new(Position, json!("bottom"))),
                (
                    "backgroundImage",
                    PropertyDescriptor::new(Link, json!("")).asset("image"),
                ),
            ],
            SettingsFamily::StartMenu => vec![
                ("title", PropertyDescriptor::new(Text, json!(""))),
                ("startLabel", PropertyDescriptor::new(Text, json!("Start"))),
                ("buttonColor", PropertyDescriptor::new(Color, json!("#333333"))),
                (
                    "titleFontSize",
                    PropertyDescriptor::new(Number, json!(48)).unit("px").range(12., 128., 1.),
                ),
                (
                    "backgroundImage",
                    PropertyDescriptor::new(Link, json!("")).asset("image"),
                ),
                (
                    "music",
                    PropertyDescriptor::new(Link, json!("")).asset("audio"),
                ),
            ],
            SettingsFamily::EndMenu => vec![
                ("message", PropertyDescriptor::new(Text, json!("The End"))),
                ("restartLabel", PropertyDescriptor::new(Text, json!("Play again"))),
                ("textColor", PropertyDescriptor::new(Color, json!("#ffffff"))),
                (
                    "backgroundImage",
                    PropertyDescriptor::new(Link, json!("")).asset("image"),
                ),
            ],
            SettingsFamily::ChoiceMenu => vec![
                ("buttonColor", PropertyDescriptor::new(Color, json!("#222222"))),
                ("buttonTextColor", PropertyDescriptor::new(Color, json!("#ffffff"))),
                ("hoverColor", PropertyDescriptor::new(Color, json!("#555555"))),
                (
                    "fontSize",
                    PropertyDescriptor::new(Number, json!(16)).unit("px").range(8., 72., 1.),
                ),
                (
                    "gap",
                    PropertyDescriptor::new(Slider, json!(8)).unit("px").range(0., 48., 1.),
                ),
            ],
        };

        for (name, descriptor) in properties {
            doc.add_property(group, name, descriptor);
        }
    }

    /// This family's group with nothing but default values
    pub fn defaults(self) -> SettingsDocument {
        let mut doc = SettingsDocument::new();
        self.install(&mut doc);
        doc
    }

    /// The standard load sequence for a single family
    pub fn load(self, persisted_raw: Option<&str>) -> SettingsDocument {
        let mut doc = self.defaults();
        if let Some(persisted) = persisted_raw.and_then(SettingsDocument::parse) {
            doc.be_overridden_by(&persisted);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_group_is_idempotent() {
        let mut doc = SettingsDocument::new();
        doc.create_group_with("g", "Title", "Desc");
        doc.add_property("g", "p", PropertyDescriptor::new(InputKind::Text, json!("a")));
        doc.create_group("g");
        doc.create_group_with("g", "Other", "Other");

        let group = doc.group("g").unwrap();
        assert_eq!(group.title, "Title");
        assert_eq!(group.properties.len(), 1);
    }

    #[test]
    fn add_property_never_clobbers() {
        let mut doc = SettingsDocument::new();
        assert!(doc.add_property("g", "p", PropertyDescriptor::new(InputKind::Number, json!(1))));
        doc.set_property("g", "p", json!(5), None).unwrap();
        assert!(!doc.add_property("g", "p", PropertyDescriptor::new(InputKind::Number, json!(2))));
        assert_eq!(doc.value("g", "p"), Some(&json!(5)));
    }

    #[test]
    fn set_property_requires_registration() {
        let mut doc = SettingsDocument::defaults();
        assert_eq!(
            doc.set_property("nope", "p", json!(1), None),
            Err(SettingsError::UnknownGroup("nope".into()))
        );
        assert_eq!(
            doc.set_property("dialogBox", "blink", json!(true), None),
            Err(SettingsError::UnknownProperty {
                group: "dialogBox".into(),
                property: "blink".into()
            })
        );
        doc.set_property("dialogBox", "fontSize", json!(2), Some("em".into()))
            .unwrap();
        assert_eq!(
            doc.property("dialogBox", "fontSize").unwrap().css_value(),
            "2em"
        );
    }

    #[test]
    fn override_unions_shape_and_prefers_other_values() {
        let mut old = SettingsDocument::new();
        old.create_group_with("dialogBox", "Dialog box", "");
        old.add_property(
            "dialogBox",
            "textColor",
            PropertyDescriptor::new(InputKind::Color, json!("#ff0000")),
        );
        old.add_property(
            "legacy",
            "retired",
            PropertyDescriptor::new(InputKind::Text, json!("kept")),
        );

        let mut doc = SettingsDocument::defaults();
        doc.be_overridden_by(&old);

        assert_eq!(doc.value("dialogBox", "textColor"), Some(&json!("#ff0000")));
        assert_eq!(doc.value("dialogBox", "fontSize"), Some(&json!(18)));
        assert_eq!(doc.value("legacy", "retired"), Some(&json!("kept")));
        for family in SettingsFamily::ALL.iter() {
            assert!(doc.group(family.group_name()).is_some());
        }
    }

    #[test]
    fn override_twice_is_idempotent() {
        let mut persisted = SettingsDocument::defaults();
        persisted
            .set_property("choiceMenu", "gap", json!(20), Some("px".into()))
            .unwrap();

        let mut once = SettingsDocument::defaults();
        once.be_overridden_by(&persisted);
        let mut twice = once.clone();
        twice.be_overridden_by(&persisted);
        assert_eq!(once, twice);
    }

    #[test]
    fn load_sequence() {
        let raw = r#"{ "endMenu": { "properties": { "message": { "value": "Fin" } } } }"#;
        let doc = SettingsDocument::load(Some(raw));
        assert_eq!(doc.value("endMenu", "message"), Some(&json!("Fin")));
        assert_eq!(doc.value("endMenu", "restartLabel"), Some(&json!("Play again")));
        assert_eq!(doc, SettingsDocument::load(Some(raw)));

        assert_eq!(SettingsDocument::load(Some("not json")), SettingsDocument::defaults());
        assert_eq!(SettingsDocument::load(None), SettingsDocument::defaults());
    }

    #[test]
    fn family_load() {
        let doc = SettingsFamily::StartMenu.load(Some(
            r#"{ "startMenu": { "properties": { "title": { "value": "Night" } } } }"#,
        ));
        assert_eq!(doc.value("startMenu", "title"), Some(&json!("Night")));
        assert!(doc.group("dialogBox").is_none());
    }

    #[test]
    fn unknown_input_kind_reads_as_text() {
        let p: PropertyDescriptor =
            serde_json::from_str(r#"{ "value": 1, "input": "gradient" }"#).unwrap();
        assert_eq!(p.input, InputKind::Text);
        let back = serde_json::to_value(&PropertyDescriptor::new(InputKind::Slider, json!(1)))
            .unwrap();
        assert_eq!(back["input"], "slider");
    }
}
