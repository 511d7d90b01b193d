use crate::diagnostics::DiagnosticLevel;
use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for the human-readable report written to stderr.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Package and section titles
    pub title: Style,
    /// Available toolchains, completed runs
    pub ok: Style,
    /// Engine failures, missing toolchains, error diagnostics
    pub failure: Style,
    pub warning: Style,
    pub note: Style,
    /// Row labels, rule ids, timings
    pub label: Style,
    /// `[Type.member]` anchors and signatures
    pub anchor: Style,
}

impl Theme {
    /// Colors only when stderr is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Self::choose(no_color, console::Term::stderr().is_term())
    }

    fn choose(no_color: bool, stderr_is_term: bool) -> Self {
        if no_color || !stderr_is_term {
            return Self::plain();
        }
        Self::colored()
    }

    pub fn colored() -> Self {
        Self {
            title: Style::new().blue().bold(),
            ok: Style::new().green().bold(),
            failure: Style::new().red().bold(),
            warning: Style::new().yellow(),
            note: Style::new().cyan(),
            label: Style::new().dimmed(),
            anchor: Style::new().bright_black(),
        }
    }

    pub fn plain() -> Self {
        Self {
            title: Style::new(),
            ok: Style::new(),
            failure: Style::new(),
            warning: Style::new(),
            note: Style::new(),
            label: Style::new(),
            anchor: Style::new(),
        }
    }

    pub fn level(&self, level: DiagnosticLevel) -> Style {
        match level {
            DiagnosticLevel::Error => self.failure,
            DiagnosticLevel::Warning => self.warning,
            DiagnosticLevel::Info => self.note,
        }
    }

    pub fn availability(&self, available: bool) -> Style {
        if available { self.ok } else { self.failure }
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
    fn test_plain_unless_stderr_is_a_terminal() {
        let piped = Theme::choose(false, false);
        assert_eq!("x".style(piped.failure).to_string(), "x");

        let no_color = Theme::choose(true, true);
        assert_eq!("x".style(no_color.title).to_string(), "x");

        let colored = Theme::choose(false, true);
        assert_ne!("x".style(colored.failure).to_string(), "x");
    }

    #[test]
    fn test_level_styles() {
        let theme = Theme::colored();
        assert_eq!(theme.level(DiagnosticLevel::Error), theme.failure);
        assert_eq!(theme.level(DiagnosticLevel::Info), theme.note);
        assert_eq!(theme.availability(false), theme.failure);
        assert_eq!(theme.availability(true), theme.ok);
    }
}
