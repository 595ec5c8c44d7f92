use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::completion::{CompletionInvoker, CompletionRequest};
use crate::settings::{FieldDescriptor, Settings, SettingsError};
use crate::ui::Ui;

const PROMPT: &str = "(vyx) ";
const GREETING: &str = r#"Entering interactive mode (type "help" for commands, "o" for options)"#;
/// Starts an inline comment on an assignment's right-hand side.
const COMMENT_MARKER: &str = "//";
const OPTION_COLUMN_WIDTH: usize = 40;

const HELP_SUMMARY: &str = "\
Commands:
  o, options         show current settings
  <name>=<value>     change a setting, e.g. temperature=0.7
  <choice>           select a value of a multi-choice setting, e.g. completions
  help <name>        describe a setting
  exit, quit, q      leave interactive mode
Any other input is sent as a prompt.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Left- and right-hand side of a possible `name=value` line. `value` is
/// `None` when the line has no `=`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Assignment<'l> {
    name: &'l str,
    value: Option<&'l str>,
}

fn parse_assignment(line: &str) -> Assignment<'_> {
    match line.split_once('=') {
        Some((name, value)) => {
            Assignment {
                name: name.trim(),
                value: Some(strip_comment(value).trim()),
            }
        }
        None => Assignment {
            name: line.trim(),
            value: None,
        },
    }
}

/// The marker only opens a comment at the start of the value or after
/// whitespace, so values such as `http://host/v1` survive intact.
fn strip_comment(value: &str) -> &str {
    let comment = value.match_indices(COMMENT_MARKER).find(|(at, _)| {
        value[..*at]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace)
    });
    match comment {
        Some((at, _)) => &value[..at],
        None => value,
    }
}

/// A single bare word before `=` is read as an attempted assignment even when
/// the name is unknown; anything else falls through to prompt handling.
fn looks_like_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn format_option_line(name: &str, value: &str, comment: &str) -> String {
    let assignment = format!("{name} = {value}");
    if comment.is_empty() {
        return format!("  {assignment}");
    }
    format!(
        "  {:<width$} {} {}",
        assignment,
        COMMENT_MARKER,
        comment,
        width = OPTION_COLUMN_WIDTH
    )
}

fn describe_field(field: &FieldDescriptor) -> String {
    let mut lines = vec![
        format!("{}: {}", field.name, field.kind.as_str()),
        format!("  default: {}", field.default_value),
    ];
    if field.is_multi_choice() {
        lines.push(format!("  choices: {}", field.choices.join(" | ")));
    }
    if let Some(param) = field.external_param {
        lines.push(format!("  parameter: {param}"));
    }
    if !field.persisted {
        lines.push("  not saved across sessions".to_string());
    }
    lines.join("\n")
}

/// Reads lines from the UI and applies them as assignments, built-in
/// commands, or prompts for the completion invoker.
pub struct Interpreter<'a, U, I> {
    ui: U,
    settings: &'a Settings,
    invoker: &'a I,
}

impl<'a, U, I> Interpreter<'a, U, I>
where
    U: Ui,
    I: CompletionInvoker,
{
    pub fn new(ui: U, settings: &'a Settings, invoker: &'a I) -> Self {
        Self {
            ui,
            settings,
            invoker,
        }
    }

    pub fn into_ui(self) -> U {
        self.ui
    }

    pub async fn run(&mut self) -> Result<()> {
        self.ui.print(GREETING);

        while let Some(line) = self
            .ui
            .read_line(PROMPT)
            .context("Failed to read input line")?
        {
            if self.dispatch(&line).await == Flow::Exit {
                break;
            }
        }

        Ok(())
    }

    async fn dispatch(&mut self, line: &str) -> Flow {
        if self.try_assignment(line) {
            return Flow::Continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = tokens.split_first() else {
            return Flow::Continue;
        };

        match *command {
            "o" | "options" => self.print_options(),
            "help" => self.print_help(&args.join(" ")),
            "exit" | "quit" | "q" => return Flow::Exit,
            _ => self.forward_prompt(&tokens).await,
        }
        Flow::Continue
    }

    /// Returns true when the line was consumed as an assignment, whether or
    /// not it succeeded.
    fn try_assignment(&mut self, line: &str) -> bool {
        let assignment = parse_assignment(line);
        let registry = self.settings.registry();

        let result = if registry.is_configurable(assignment.name) {
            match assignment.value {
                Some(value) => self.settings.configure(assignment.name, value),
                None if registry.is_boolean_field(assignment.name) => {
                    self.settings.configure(assignment.name, "true")
                }
                None => Err(SettingsError::MissingValue {
                    name: assignment.name.to_string(),
                }),
            }
        } else if assignment.value.is_some() && looks_like_field_name(assignment.name) {
            Err(SettingsError::UnknownField {
                name: assignment.name.to_string(),
            })
        } else {
            return false;
        };

        if let Err(err) = result {
            debug!(line, error = %err, "rejected assignment");
            self.ui.print_error(&err.to_string());
        }
        true
    }

    fn print_options(&mut self) {
        let mut lines: Vec<String> = self
            .settings
            .registry()
            .fields()
            .iter()
            .map(|field| {
                let value = self.settings.get(field);
                let comment = if field.is_multi_choice() {
                    let mut choices = field.choices.to_vec();
                    choices.sort_unstable();
                    format!("[{}]", choices.join(" | "))
                } else if value == field.default_value {
                    "default".to_string()
                } else {
                    String::new()
                };
                let shown = if value.is_empty() { r#""""# } else { value.as_str() };
                format_option_line(field.name, shown, &comment)
            })
            .collect();
        lines.sort();
        self.ui.print(&lines.join("\n"));
    }

    fn print_help(&mut self, topic: &str) {
        if topic.is_empty() {
            self.ui.print(HELP_SUMMARY);
            return;
        }

        match self.settings.registry().describe(topic) {
            Some(field) => {
                let text = describe_field(field);
                self.ui.print(&text);
            }
            None => self.ui.print(topic),
        }
    }

    async fn forward_prompt(&mut self, tokens: &[&str]) {
        let request = CompletionRequest {
            prompt_tokens: tokens.iter().map(|token| token.to_string()).collect(),
            settings: self.settings.completion_settings(),
        };

        match self.invoker.invoke(request).await {
            Ok(reply) => self.ui.print(&reply.join(" ")),
            Err(err) => {
                warn!(error = %err, "completion invocation failed");
                self.ui.print_error(&format!("{err:#}"));
            }
        }
    }
}
