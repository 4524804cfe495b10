use crate::publish::PublishOptions;
use clap::{crate_authors, crate_description, crate_name, crate_version};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use color_eyre::Result;
use eyre::eyre;
use eyre::WrapErr;
use json_comments::StripComments;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;

use termcolor::ColorChoice;

use std::path::{Path, PathBuf};

/// What a run of storypress does
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mode {
    /// Story JSON in, document out
    Publish,

    /// Document in, story JSON out
    Import,
}

/// Represents a unified configuration for a run of storypress.
///
/// Compiled from the configuration file and command-line arguments given
pub struct Config {
    pub mode: Mode,

    /// Input file: a story for publish, a document for import
    pub input: PathBuf,

    /// The story format to publish into, if any
    pub format_file: Option<PathBuf>,

    /// Output file, if given
    pub output_file: Option<String>,

    /// True if the output should be sent to `opener`
    pub should_open: bool,

    /// True if an import should only report warnings
    pub linting: bool,

    /// Options handed to the publish pipeline
    pub publish: PublishOptions,

    /// List of allowed (ignored) import warning names
    pub allowed: Vec<String>,

    /// List of denied (treated as errors) import warning names
    pub denied: Vec<String>,

    /// Whether or not to use color output
    pub use_color: ColorChoice,

    /// If true, use compact output format
    pub compact: bool,
}

impl Config {
    /// Loads the [`ConfigFile`], parses the [`CliConfig`], and produces a
    /// unified `Config`
    ///
    /// [`CliConfig`]: struct.CliConfig.html
    /// [`ConfigFile`]: struct.ConfigFile.html
    pub fn build() -> Result<Self> {
        let config_file = ConfigFile::load()?;
        let cli_config = CliConfig::from_args();
        Ok(Config::layer(config_file, cli_config))
    }

    /// Creates a unified `Config` from the given [`ConfigFile`] and
    /// [`CliConfig`]. Warning lists from the command line come first, then
    /// the `default` format config, then the chosen format's config
    ///
    /// [`CliConfig`]: struct.CliConfig.html
    /// [`ConfigFile`]: struct.ConfigFile.html
    pub fn layer(config_file: ConfigFile, cli_config: CliConfig) -> Self {
        let format_file = cli_config.format.as_ref().map(|f| {
            config_file
                .formats
                .get(f)
                .cloned()
                .unwrap_or_else(|| f.into())
        });

        let format = cli_config.format.as_deref();
        let mut allowed = cli_config.allowed;
        allowed.append(&mut config_file.warning_list(format, |f| &f.allow));
        let mut denied = cli_config.denied;
        denied.append(&mut config_file.warning_list(format, |f| &f.deny));

        Config {
            mode: cli_config.mode,
            input: cli_config.input.into(),
            format_file,
            output_file: cli_config.output_file,
            should_open: cli_config.should_open,
            linting: cli_config.linting,
            publish: PublishOptions {
                allow_missing_start: cli_config.allow_missing_start,
                start_override: cli_config.start,
                debug: cli_config.debug,
                format_options: cli_config.format_options,
            },
            allowed,
            denied,
            use_color: cli_config.use_color,
            compact: cli_config.compact,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigFileInternal {
    pub format_paths: Vec<String>,
    #[serde(default)]
    pub format_configs: HashMap<String, FormatConfig>,
}

const DEFAULT_CONFIG: &str = r#"// This file defines the configuration for storypress
// It is mostly standard JSON, but supports //, /**/, and # style comments.
//
// For path related configuration, storypress defines several special variables
// that can be used to specify locations:
// * $STORYPRESS_BIN_DIR: directory in which the storypress executable is located
// * $STORYPRESS_DATA_DIR: storypress's system data dir (OS-specific)
// * $PWD: directory from which storypress is being invoked
// * $HOME: user's home directory (~ is not currently supported)
//
// Arbitrary environment variables are not currently supported
{
  // Directories to search for story formats in. Each story format lives in
  // its own directory holding a format.js file
  "format_paths": [
    "$STORYPRESS_DATA_DIR/storyformats",
    "$STORYPRESS_BIN_DIR/storyformats",
    "$HOME/.storyformats",
    "$PWD/storyformats"
  ],
  "format_configs": {
    // This is the default configuration which other configurations will be
    // layered over. Lists given for a specific story format are appended to
    // the lists given in default.
    "default": {
      // Import warnings to ignore ("allow")
      "allow": [],
      // Import warnings to treat as errors ("deny")
      "deny": []
    }
  }
}"#;

/// Stores format paths and settings parsed from the storypress config file
#[derive(Debug)]
pub struct ConfigFile {
    /// Maps formats to paths based on the name of the containing directories
    pub formats: HashMap<String, PathBuf>,

    /// Maps a format (or default) to a config to use for that format
    pub format_configs: HashMap<String, FormatConfig>,
}

impl ConfigFile {
    /// Loads the config file
    ///
    /// If the config file does not exist, it will try to create a default one
    /// in the config directory
    pub fn load() -> Result<Self> {
        let config_path = dirs_next::config_dir()
            .ok_or_else(|| eyre!("Error getting config directory"))?
            .join("storypress/config.json");

        let config_contents = if !config_path.exists() {
            if let Some(prefix) = config_path.parent() {
                std::fs::create_dir_all(prefix)
                    .wrap_err_with(|| format!("Error creating config directory: {:?}", prefix))?;
            }
            let mut config_file = File::create(&config_path)?;
            config_file.write_all(DEFAULT_CONFIG.as_bytes())?;
            DEFAULT_CONFIG.to_string()
        } else {
            std::fs::read_to_string(&config_path)
                .wrap_err_with(|| format!("Error reading config file {:?}", config_path))?
        };

        ConfigFile::from_contents(&config_contents)
    }

    /// Parses config file contents and searches the format paths they name
    pub fn from_contents(contents: &str) -> Result<Self> {
        // Strip the comments from the input (use `as_bytes()` to get a `Read`).
        let stripped = StripComments::new(contents.as_bytes());
        let cf: ConfigFileInternal =
            serde_json::from_reader(stripped).wrap_err_with(|| "Error parsing config file")?;
        tracing::debug!(?cf, "loaded config file");

        let mut formats = HashMap::new();
        for p in &cf.format_paths {
            let path = expand_vars(p).wrap_err_with(|| format!("Error while parsing {}", p))?;
            if !path.is_dir() {
                tracing::debug!(path = %path.display(), "skipping missing format path");
                continue;
            }
            find_formats(&path, &mut formats)?;
        }

        Ok(ConfigFile {
            formats,
            format_configs: cf.format_configs,
        })
    }

    /// The `default` list followed by `format`'s list
    fn warning_list<F>(&self, format: Option<&str>, pick: F) -> Vec<String>
    where
        F: Fn(&FormatConfig) -> &Vec<String>,
    {
        let mut list = self
            .format_configs
            .get("default")
            .map(|f| pick(f).clone())
            .unwrap_or_default();
        if let Some(format) = format.and_then(|f| self.format_configs.get(f)) {
            list.extend(pick(format).iter().cloned());
        }
        list
    }
}

/// Replaces the special `$` variables in a configured path
fn expand_vars(p: &str) -> Result<PathBuf> {
    let mut path = p.to_string();

    while let Some(start) = path.find('$') {
        let end = path[start..]
            .find('/')
            .map(|pos| start + pos)
            .unwrap_or_else(|| path.len());

        // Including the $
        let var = path[start..end].to_string();

        let replace: Result<PathBuf> = match &var[1..] {
            "HOME" => dirs_next::home_dir().ok_or_else(|| eyre!("Failed to get HOME")),
            "PWD" => std::env::current_dir().wrap_err_with(|| "Failed to get PWD"),
            "STORYPRESS_BIN_DIR" => match std::env::current_exe() {
                Ok(ok) => ok
                    .parent()
                    .map(|p| p.to_path_buf())
                    .ok_or_else(|| eyre!("Failed to get storypress executable's parent")),
                Err(err) => Err(err).wrap_err_with(|| "Failed to get STORYPRESS_BIN_DIR"),
            },
            "STORYPRESS_DATA_DIR" => dirs_next::data_dir()
                .map(|p| p.join("storypress"))
                .ok_or_else(|| eyre!("Failed to get STORYPRESS_DATA_DIR")),
            _ => Err(eyre!(
                "Arbitrary environment variables are not currently supported"
            )),
        };
        let replace = replace?;
        path = path.replace(&var, &replace.to_string_lossy());
    }

    Ok(path.into())
}

/// Records every `<dir>/<format name>/format.js` under `dir`
fn find_formats(dir: &Path, formats: &mut HashMap<String, PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .wrap_err_with(|| format!("Error while reading directory {:?}", dir))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let format_path = entry.path();
        let format_js = format_path.join("format.js");
        if !format_js.is_file() {
            continue;
        }
        if let Some(dir_name) = format_path.file_name() {
            formats
                .entry(dir_name.to_string_lossy().into_owned())
                .or_insert(format_js);
        }
    }
    Ok(())
}

/// The command line options supplied by the user
pub struct CliConfig {
    pub mode: Mode,

    /// Input file to publish or import
    pub input: String,

    /// The story format name or path
    pub format: Option<String>,

    /// The file name to output
    pub output_file: Option<String>,

    /// If true, send the output file to `opener` for the user
    pub should_open: bool,

    /// If true, import only reports warnings
    pub linting: bool,

    /// If true, publish a story that has no start passage
    pub allow_missing_start: bool,

    /// Id of the passage to start at instead of the story's own
    pub start: Option<String>,

    /// If true, publish for the runtime's debug mode
    pub debug: bool,

    /// Extra story format options
    pub format_options: String,

    /// List of allowed (ignored) warnings, by name
    pub allowed: Vec<String>,

    /// List of denied (treated as errors) warnings, by name
    pub denied: Vec<String>,

    /// Controls color output
    pub use_color: ColorChoice,

    /// If true, use compact warning and error output
    pub compact: bool,
}

fn output_args() -> Vec<Arg<'static, 'static>> {
    vec![
        Arg::with_name("color")
            .help("Turns on colored output (always, ansi, auto, never)")
            .long("color")
            .takes_value(true),
        Arg::with_name("INPUT")
            .help("Sets the input file to use")
            .required(true)
            .index(1),
    ]
}

impl CliConfig {
    #[allow(unknown_lints, dangerous_implicit_autorefs)]
    fn app() -> App<'static, 'static> {
        App::new(crate_name!())
            .about(crate_description!())
            .author(crate_authors!("\n"))
            .version(crate_version!())
            .setting(AppSettings::SubcommandRequiredElseHelp)
            .subcommand(
                SubCommand::with_name("publish")
                    .about("Publishes a story JSON file as a playable document")
                    .args(&output_args())
                    .arg(
                        Arg::with_name("format")
                            .help("Sets the story format by name or file location")
                            .short("f")
                            .long("format")
                            .takes_value(true),
                    )
                    .arg(
                        Arg::with_name("output")
                            .help("Sets the output file (default: <Story Name>.html)")
                            .short("o")
                            .long("output")
                            .takes_value(true),
                    )
                    .arg(
                        Arg::with_name("open")
                            .help("Opens the output in a web browser")
                            .long("open"),
                    )
                    .arg(
                        Arg::with_name("allow-missing-start")
                            .help("Publishes even if the story has no start passage")
                            .long("allow-missing-start"),
                    )
                    .arg(
                        Arg::with_name("start")
                            .help("Starts at the passage with this id")
                            .short("s")
                            .long("start")
                            .takes_value(true),
                    )
                    .arg(
                        Arg::with_name("debug")
                            .help("Publishes for the runtime's debug mode")
                            .long("debug"),
                    )
                    .arg(
                        Arg::with_name("options")
                            .help("Extra options passed to the story format")
                            .long("options")
                            .takes_value(true),
                    ),
            )
            .subcommand(
                SubCommand::with_name("import")
                    .about("Recovers story JSON from a published document")
                    .args(&output_args())
                    .arg(
                        Arg::with_name("allow")
                            .help("Specifies warnings to ignore. Overrides deny.")
                            .short("a")
                            .long("allow")
                            .takes_value(true)
                            .multiple(true),
                    )
                    .arg(
                        Arg::with_name("compact")
                            .help("Turns on compact warning output")
                            .long("compact"),
                    )
                    .arg(
                        Arg::with_name("deny")
                            .help("Specifies warnings to treat as errors")
                            .short("D")
                            .long("deny")
                            .takes_value(true)
                            .multiple(true),
                    )
                    .arg(
                        Arg::with_name("lint")
                            .help("Reports import warnings without producing any output")
                            .short("L")
                            .long("lint"),
                    )
                    .arg(
                        Arg::with_name("output")
                            .help("Sets the output file (default: standard output)")
                            .short("o")
                            .long("output")
                            .takes_value(true)
                            .conflicts_with("lint"),
                    ),
            )
    }

    /// Parses the command line arguments
    pub fn from_args() -> Self {
        CliConfig::from_matches(&CliConfig::app().get_matches())
    }

    /// Parses the given arguments, the first being the program name
    pub fn from_iter<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        CliConfig::from_matches(&CliConfig::app().get_matches_from(args))
    }

    fn from_matches(m: &ArgMatches) -> Self {
        let (mode, m) = match m.subcommand() {
            ("import", Some(sub)) => (Mode::Import, sub),
            (_, Some(sub)) => (Mode::Publish, sub),
            (_, None) => (Mode::Publish, m),
        };

        let input = m.value_of("INPUT").unwrap_or_default().to_string();
        let format = m.value_of("format").map(|s| s.to_string());
        let output_file = m.value_of("output").map(|s| s.to_string());
        let should_open = m.is_present("open");
        let linting = m.is_present("lint");
        let allow_missing_start = m.is_present("allow-missing-start");
        let start = m.value_of("start").map(|s| s.to_string());
        let debug = m.is_present("debug");
        let format_options = m.value_of("options").unwrap_or_default().to_string();
        let allowed = m
            .values_of("allow")
            .map(|v| v.map(|s| s.to_string()).collect())
            .unwrap_or_default();
        let denied = m
            .values_of("deny")
            .map(|v| v.map(|s| s.to_string()).collect())
            .unwrap_or_default();
        let use_color = match m.value_of("color").unwrap_or("auto") {
            "always" => ColorChoice::Always,
            "ansi" => ColorChoice::AlwaysAnsi,
            "auto" => {
                if atty::is(atty::Stream::Stdout) {
                    ColorChoice::Auto
                } else {
                    ColorChoice::Never
                }
            }
            _ => ColorChoice::Never,
        };
        let compact = m.is_present("compact");

        CliConfig {
            mode,
            input,
            format,
            output_file,
            should_open,
            linting,
            allow_missing_start,
            start,
            debug,
            format_options,
            allowed,
            denied,
            use_color,
            compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_arguments() {
        let cli = CliConfig::from_iter(vec![
            "storypress",
            "publish",
            "story.json",
            "--debug",
            "--start",
            "p1",
            "--options",
            "fast",
            "-o",
            "out.html",
        ]);
        assert_eq!(cli.mode, Mode::Publish);
        assert_eq!(cli.input, "story.json");
        assert!(cli.debug);
        assert!(!cli.allow_missing_start);
        assert_eq!(cli.start.as_deref(), Some("p1"));
        assert_eq!(cli.format_options, "fast");
        assert_eq!(cli.output_file.as_deref(), Some("out.html"));
    }

    #[test]
    fn import_arguments() {
        let cli = CliConfig::from_iter(vec![
            "storypress",
            "import",
            "doc.html",
            "-L",
            "-a",
            "MissingSettings",
            "-D",
            "MissingStep",
            "--compact",
        ]);
        assert_eq!(cli.mode, Mode::Import);
        assert!(cli.linting);
        assert!(cli.compact);
        assert_eq!(cli.allowed, vec!["MissingSettings"]);
        assert_eq!(cli.denied, vec!["MissingStep"]);
    }

    #[test]
    fn config_file_parses_with_comments() {
        let cf = ConfigFile::from_contents(
            r#"// comment
            {
              "format_paths": [],
              "format_configs": {
                "default": { "deny": ["MissingStep"] }, # hash comment
                "paper": { "allow": ["MissingSettings"] }
              }
            }"#,
        )
        .unwrap();
        assert!(cf.formats.is_empty());
        assert_eq!(cf.format_configs["default"].deny, vec!["MissingStep"]);
    }

    #[test]
    fn layering_appends_lists() {
        let mut format_configs = HashMap::new();
        format_configs.insert(
            "default".to_string(),
            FormatConfig {
                allow: vec!["UnresolvedStart".into()],
                deny: vec!["MissingStep".into()],
            },
        );
        format_configs.insert(
            "paper".to_string(),
            FormatConfig {
                allow: vec!["MissingSettings".into()],
                deny: vec![],
            },
        );
        let mut formats = HashMap::new();
        formats.insert("paper".to_string(), PathBuf::from("/formats/paper/format.js"));
        let config_file = ConfigFile {
            formats,
            format_configs,
        };

        let cli = CliConfig::from_iter(vec![
            "storypress",
            "publish",
            "s.json",
            "-f",
            "paper",
            "--allow-missing-start",
        ]);
        let config = Config::layer(config_file, cli);
        assert_eq!(
            config.format_file,
            Some(PathBuf::from("/formats/paper/format.js"))
        );
        assert_eq!(config.allowed, vec!["UnresolvedStart", "MissingSettings"]);
        assert_eq!(config.denied, vec!["MissingStep"]);
        assert!(config.publish.allow_missing_start);
        assert_eq!(config.input, PathBuf::from("s.json"));
    }

    #[test]
    fn unknown_variables_are_rejected() {
        assert!(expand_vars("$NOPE/formats").is_err());
        assert_eq!(expand_vars("/plain/path").unwrap(), PathBuf::from("/plain/path"));
        let home = dirs_next::home_dir();
        if let Some(home) = home {
            assert_eq!(expand_vars("$HOME/x").unwrap(), home.join("x"));
        }
    }
}
