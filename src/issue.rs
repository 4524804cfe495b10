use crate::import::{ImportWarning, ImportWarningKind};
use crate::model::CommandKind;
use crate::Config;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use color_eyre::Result;
use std::cmp::Ordering;
use std::io::Write;
use termcolor::{Color, ColorSpec, StandardStream, WriteColor};

/// An import warning, possibly promoted to an error by the config
#[derive(Clone, Debug, PartialEq)]
pub struct Issue {
    pub warning: ImportWarning,
    pub denied: bool,
}

impl Issue {
    pub fn get_name(&self) -> &str {
        self.warning.get_name()
    }

    fn get_message(&self) -> String {
        format!("{}", self.warning.kind)
    }

    fn help_message(&self) -> Option<String> {
        match &self.warning.kind {
            ImportWarningKind::UnknownCommandType(tag) => {
                did_you_mean(tag, CommandKind::ALL.iter().map(|k| k.tag()))
                    .pop()
                    .map(|suggestion| format!("Found command type with similar name: \"{}\"", suggestion))
            }
            ImportWarningKind::MissingSettings => {
                Some("Publishing the imported story again will add a settings carrier".to_string())
            }
            _ => None,
        }
    }

    /// Builds a diagnostic labelled with the warning's place in the imported
    /// document
    pub fn report(&self) -> Diagnostic<()> {
        let diagnostic = if self.denied {
            Diagnostic::error()
        } else {
            Diagnostic::warning()
        }
        .with_message(self.get_message())
        .with_code(self.get_name())
        .with_labels(vec![Label::primary((), self.warning.span.clone())]);

        match self.help_message() {
            Some(msg) => diagnostic.with_notes(vec![msg]),
            None => diagnostic,
        }
    }
}

/// Drops allowed warnings, marks denied ones, and orders the rest by their
/// position in the document. The flag is true if any issue is an error
pub fn filter_and_sort_issues(warnings: Vec<ImportWarning>, config: &Config) -> (Vec<Issue>, bool) {
    let mut issues = Vec::new();
    let mut is_err = false;

    let all = "all".to_string();
    let allow_all = config.allowed.contains(&all);
    let deny_all = config.denied.contains(&all);
    for warning in warnings {
        let name = warning.get_name().to_string();
        if allow_all || config.allowed.contains(&name) {
            continue;
        }
        let denied = deny_all || config.denied.contains(&name);
        if denied {
            is_err = true;
        }
        issues.push(Issue { warning, denied });
    }

    issues.sort_by_key(|issue| issue.warning.span.start);

    (issues, is_err)
}

/// Prints a one-line form of the issue
pub fn print_issue(issue: &Issue, stdout: &mut StandardStream) -> Result<()> {
    let kind = if issue.denied {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        "Error"
    } else {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
        "Warning"
    };
    write!(stdout, "{}[{}]: ", kind, issue.get_name())?;
    stdout.reset()?;
    writeln!(stdout, "{}", issue.warning)?;
    Ok(())
}

fn did_you_mean<T, I>(v: &str, possible_values: I) -> Vec<String>
where
    T: AsRef<str>,
    I: IntoIterator<Item = T>,
{
    let mut candidates: Vec<(f64, String)> = possible_values
        .into_iter()
        .map(|pv| (strsim::jaro_winkler(v, pv.as_ref()), pv.as_ref().to_owned()))
        .filter(|(confidence, _)| *confidence > 0.8)
        .collect();
    candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    candidates.into_iter().map(|(_, pv)| pv).collect()
}
