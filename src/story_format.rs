use horrorshow::html;
use serde::{Deserialize, Serialize};

use color_eyre::Result;
use eyre::{eyre, WrapErr};

use std::fs::File;
use std::io::Read;

fn default_name() -> String {
    "Untitled Story Format".to_string()
}

/// Page used when no story format is available. The published fragments are
/// self-describing, so a bare page is enough to carry them
const BARE_SOURCE: &str = "<!DOCTYPE html>
<html>
<head>
<meta charset=\"utf-8\">
<title>{{STORY_NAME}}</title>
</head>
<body>
{{STORY_DATA}}
</body>
</html>";

/// A Twine 2 story format (`format.js`), used as the page a published story
/// is placed in
#[derive(Debug, Serialize, Deserialize)]
pub struct StoryFormat {
    // name: (string) Optional. The name of the story format. (Omitting the name
    // will lead to an Untitled Story Format.)
    #[serde(default = "default_name")]
    pub name: String,

    // version: (string) Required, and semantic version-style formatting
    // (x.y.z, e.g., 1.2.1) of the version is also required.
    pub version: String,

    pub author: Option<String>,

    pub description: Option<String>,

    pub license: Option<String>,

    // proofing: (boolean) Optional (defaults to false). True if the story
    // format is a "proofing" format. Proofing formats have no runtime to
    // bootstrap.
    #[serde(default)]
    pub proofing: bool,

    // source: (string) Required. The full HTML output of the story format,
    // including the two placeholders {{STORY_NAME}} and {{STORY_DATA}}.
    pub source: String,
}

impl StoryFormat {
    /// Loads the JSON blob wrapped in a `format.js` file
    pub fn parse(file_path: &std::path::Path) -> Result<StoryFormat> {
        let mut format_file = File::open(file_path)?;

        let mut contents = String::new();
        format_file.read_to_string(&mut contents)?;

        StoryFormat::from_source(&contents)
    }

    /// Extracts the format from the contents of a `format.js` file
    pub fn from_source(contents: &str) -> Result<StoryFormat> {
        let start = contents
            .find('{')
            .ok_or_else(|| eyre!("Could not find Twine2 JSON blob"))?;
        // Harlowe appends a setup function after its JSON properties
        let end = if contents.contains("harlowe") {
            contents.rfind(",\"setup\":")
        } else {
            contents.rfind('}')
        }
        .ok_or_else(|| eyre!("Could not find Twine2 JSON blob"))?;

        let mut json_blob_contents = contents[start..end].to_owned();
        json_blob_contents.push('}');

        let f = serde_json::from_str(&json_blob_contents)
            .wrap_err_with(|| "Failed to parse story format JSON")?;
        Ok(f)
    }

    /// The format used when none is configured
    pub fn bare() -> StoryFormat {
        StoryFormat {
            name: crate::model::DEFAULT_FORMAT.to_string(),
            version: crate::model::DEFAULT_FORMAT_VERSION.to_string(),
            author: None,
            description: Some("Bare page holding the published story".to_string()),
            license: None,
            proofing: false,
            source: BARE_SOURCE.to_string(),
        }
    }

    /// Places published story data into this format's page
    pub fn render(&self, story_name: &str, story_data: &str) -> String {
        let name = format!("{}", html! { : story_name });
        // Substitute the data last so placeholders inside it stay intact
        self.source
            .replace("{{STORY_NAME}}", &name)
            .replace("{{STORY_DATA}}", story_data)
    }
}
