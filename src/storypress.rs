//! Handles the actual running of the command line tool

use crate::config::Mode;
use crate::import;
use crate::linter;
use crate::publish;
use crate::Config;
use crate::GeneratorRegistry;
use crate::Story;
use crate::StoryFormat;

use color_eyre::Result;
use eyre::{eyre, WrapErr};

use std::fs::File;
use std::io::Write;
use std::path::Path;

use termcolor::{Color, ColorSpec, StandardStream, WriteColor};
use tracing_subscriber::EnvFilter;

/// Runs the command line tool
pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::build()?;

    let mut stdout = StandardStream::stdout(config.use_color);
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;

    let result = match config.mode {
        Mode::Publish => run_publish(&config),
        Mode::Import => run_import(&config, &mut stdout),
    };
    stdout.reset()?;
    result
}

/// Reads a story file holding either one story or a list of them
pub fn read_stories(path: &Path) -> Result<Vec<Story>> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read story file {:?}", path))?;
    let stories = if contents.trim_start().starts_with('[') {
        serde_json::from_str(&contents)
    } else {
        serde_json::from_str(&contents).map(|story| vec![story])
    }
    .wrap_err_with(|| format!("Failed to parse story file {:?}", path))?;
    Ok(stories)
}

fn run_publish(config: &Config) -> Result<()> {
    let mut stories = read_stories(&config.input)?;
    if stories.is_empty() {
        return Err(eyre!("No stories found in {:?}", config.input));
    }

    let story_format = match &config.format_file {
        Some(format_file) => StoryFormat::parse(format_file).wrap_err_with(|| {
            format!("Failed to parse story format file: {:?}", format_file)
        })?,
        None => StoryFormat::bare(),
    };

    let registry = GeneratorRegistry::with_defaults();
    for story in &mut stories {
        story.refresh_settings();
        if config.format_file.is_some() {
            story.story_format = story_format.name.clone();
            story.story_format_version = story_format.version.clone();
        }
    }
    let story_data = publish::publish_all(&stories, &registry, &config.publish)
        .wrap_err_with(|| format!("Failed to publish {:?}", config.input))?;
    for story in &stories {
        tracing::info!(story = %story.name, passages = story.passages.len(), "published");
    }

    let story_title = stories[0].name.as_str();
    let output = story_format.render(story_title, &story_data);
    let file_name = config
        .output_file
        .clone()
        .unwrap_or_else(|| format!("{}.html", story_title));
    let mut file = File::create(&file_name)
        .wrap_err_with(|| format!("Failed to create output file {}", &file_name))?;
    writeln!(file, "{}", output)
        .wrap_err_with(|| format!("Failed to write output file {}", &file_name))?;

    if config.should_open {
        opener::open(&file_name)
            .wrap_err_with(|| format!("Failed to open output file {}", &file_name))?;
    }

    Ok(())
}

fn run_import(config: &Config, stdout: &mut StandardStream) -> Result<()> {
    let source = std::fs::read_to_string(&config.input)
        .wrap_err_with(|| format!("Failed to read document {:?}", config.input))?;
    let (mut stories, warnings) = import::import_with_warnings(&source).take();

    let name = config.input.to_string_lossy();
    linter::lint(warnings, &name, &source, config, stdout)?;

    if config.linting {
        return Ok(());
    }

    if stories.is_empty() {
        return Err(eyre!("No stories found in {:?}", config.input));
    }
    for story in &mut stories {
        story.refresh_settings();
    }

    let json = if stories.len() == 1 {
        serde_json::to_string_pretty(&stories[0])?
    } else {
        serde_json::to_string_pretty(&stories)?
    };

    match &config.output_file {
        Some(file_name) => {
            let mut file = File::create(file_name)
                .wrap_err_with(|| format!("Failed to create output file {}", file_name))?;
            writeln!(file, "{}", json)
                .wrap_err_with(|| format!("Failed to write output file {}", file_name))?;
        }
        None => {
            stdout.reset()?;
            writeln!(stdout, "{}", json)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_single_story_and_lists() {
        let dir = std::env::temp_dir().join(format!("storypress-{}", crate::utils::new_id()));
        std::fs::create_dir_all(&dir).unwrap();

        let single = dir.join("single.json");
        std::fs::write(&single, r#"{"name": "One"}"#).unwrap();
        let stories = read_stories(&single).unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].name, "One");

        let list = dir.join("list.json");
        std::fs::write(&list, r#"  [{"name": "A"}, {"name": "B"}]"#).unwrap();
        let stories = read_stories(&list).unwrap();
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[1].name, "B");

        let broken = dir.join("broken.json");
        std::fs::write(&broken, "{").unwrap();
        assert!(read_stories(&broken).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
