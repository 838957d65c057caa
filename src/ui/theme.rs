//! Terminal palette, keyed to what is being shown: chrome (headers, labels,
//! confirmations) and stored values by kind.

use owo_colors::Style;
use std::sync::OnceLock;
use crate::value::Value;

static THEME: OnceLock<Theme> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub warn: Style,
    pub label: Style,
    pub null: Style,
    pub number: Style,
    pub text: Style,
    pub binary: Style,
}

impl Theme {
    /// Colors only on a terminal, and only if NO_COLOR / CLICOLOR allow it
    pub fn detect() -> Self {
        if !console::Term::stdout().is_term() || !console::colors_enabled() {
            return Self::plain();
        }
        Self::colored()
    }

    pub fn colored() -> Self {
        Self {
            header: Style::new().cyan().bold(),
            success: Style::new().green().bold(),
            warn: Style::new().yellow().bold(),
            label: Style::new().white().dimmed(),
            null: Style::new().bright_black().italic(),
            number: Style::new().magenta(),
            text: Style::new(),
            binary: Style::new().blue(),
        }
    }

    pub fn plain() -> Self {
        Self {
            header: Style::new(),
            success: Style::new(),
            warn: Style::new(),
            label: Style::new(),
            null: Style::new(),
            number: Style::new(),
            text: Style::new(),
            binary: Style::new(),
        }
    }

    /// Style for a stored value
    pub fn value(&self, value: &Value) -> Style {
        match value {
            Value::Null => self.null.clone(),
            Value::Bool(_) | Value::Integer(_) | Value::Real(_) => self.number.clone(),
            Value::Blob(_) => self.binary.clone(),
            Value::Text(_) | Value::Date(_) | Value::DateTime(_) => self.text.clone(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use owo_colors::OwoColorize;

    #[test]
    fn test_plain_theme_adds_no_escapes() {
        let plain = Theme::plain();
        let shown = "42".style(plain.value(&Value::Integer(42))).to_string();
        assert_eq!(shown, "42");
    }

    #[test]
    fn test_values_styled_by_kind() {
        let colored = Theme::colored();
        let null = "NULL".style(colored.value(&Value::Null)).to_string();
        let number = "NULL".style(colored.value(&Value::Real(1.5))).to_string();
        assert_ne!(null, number);
        assert_eq!(
            "x".style(colored.value(&Value::from("x"))).to_string(),
            "x".style(colored.text.clone()).to_string()
        );
    }
}
