//! Field-level validation errors shared by the HTML forms.
use std::collections::BTreeMap;

/// Key under which errors not tied to a single field are stored.
pub const NON_FIELD_ERRORS: &str = "__all__";

pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Validation errors collected while cleaning a submitted form, keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if the given field has at least one error.
    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Messages for a single field, empty if the field is valid.
    pub fn get(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn non_field(&self) -> &[String] {
        self.get(NON_FIELD_ERRORS)
    }

    /// Converts into `Err(self)` when any error was recorded, `Ok(value)` otherwise.
    pub fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_collect_errors_per_field() {
        let mut errors = FormErrors::new();
        errors.add("title", REQUIRED_MESSAGE);
        errors.add("title", "Too long.");
        errors.add_non_field("Something went wrong.");

        assert!(errors.has("title"));
        assert!(!errors.has("description"));
        assert_eq!(errors.get("title").len(), 2);
        assert!(errors.get("description").is_empty());
        assert_eq!(errors.non_field(), ["Something went wrong.".to_string()]);
    }

    #[test]
    fn can_convert_into_result() {
        assert_eq!(FormErrors::new().into_result(5), Ok(5));

        let mut errors = FormErrors::new();
        errors.add("title", REQUIRED_MESSAGE);
        assert!(errors.into_result(5).is_err());
    }
}
