//! Handles reporting import warnings based on the given [`Config`]
//!
//! [`Config`]: struct.Config.html

use crate::import::ImportWarning;
use crate::issue;
use crate::Config;
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term;
use color_eyre::Result;
use eyre::eyre;
use std::io::Write;
use termcolor::StandardStream;

/// Reports the warnings raised while importing `source` (read from the file
/// `name`) to the given stream.
///
/// Warnings are ignored or promoted to errors as specified in the config. An
/// error is returned if any warning was promoted
pub fn lint(
    warnings: Vec<ImportWarning>,
    name: &str,
    source: &str,
    config: &Config,
    stdout: &mut StandardStream,
) -> Result<()> {
    let (issues, is_err) = issue::filter_and_sort_issues(warnings, config);

    if config.compact {
        for issue in &issues {
            issue::print_issue(issue, stdout)?;
        }
    } else {
        let file = SimpleFile::new(name, source);
        let term_config = term::Config::default();
        for issue in &issues {
            let diagnostic = issue.report();
            term::emit(&mut stdout.lock(), &term_config, &file, &diagnostic)?;
        }
    }

    // Force reset of color
    stdout.flush()?;

    if is_err {
        Err(eyre!("Failed due to previous errors"))
    } else {
        Ok(())
    }
}
