use chrono::NaiveDate;
use serde::Deserialize;

use crate::form::{FormErrors, REQUIRED_MESSAGE};
use crate::task::{Task, TaskInput};

pub const TITLE_MAX_LENGTH: usize = 200;

/// Accepted input formats for the due date field, tried in order.
const DATE_INPUT_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];

/// Raw task form as submitted by the browser.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: String,
}

impl TaskForm {
    /// Pre-fills the form with the current values of `task`.
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title().to_string(),
            description: task.description().to_string(),
            due_date: task
                .due_date()
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        }
    }

    /// Cleans every field, collecting all errors rather than stopping at the first one.
    pub fn validate(&self) -> Result<TaskInput, FormErrors> {
        let mut errors = FormErrors::new();

        let title = self.title.trim();
        if title.is_empty() {
            errors.add("title", REQUIRED_MESSAGE);
        } else if title.chars().count() > TITLE_MAX_LENGTH {
            errors.add(
                "title",
                format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    TITLE_MAX_LENGTH,
                    title.chars().count()
                ),
            );
        }

        let due_date = match parse_date(&self.due_date) {
            Ok(date) => date,
            Err(message) => {
                errors.add("due_date", message);
                None
            }
        };

        errors.into_result(TaskInput {
            title: title.to_string(),
            description: self.description.clone(),
            due_date,
        })
    }
}

fn parse_date(raw: &str) -> Result<Option<NaiveDate>, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .map(Some)
        .ok_or("Enter a valid date.")
}
