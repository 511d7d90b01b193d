use crate::diagnostics::Diagnostic;
use crate::toolchain::EngineAvailability;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

// Human output goes to stderr so stdout stays clean for JSON and stubs.

pub fn header(text: &str) {
    eprintln!("{} {}", Icons::PACKAGE, text.style(theme().title));
}

pub fn success(label: &str) {
    eprintln!("{} {}", Icons::CHECK, label.style(theme().ok));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().failure));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warning));
}

pub fn info(label: &str, value: &str) {
    eprintln!(
        "{} {}: {}",
        Icons::INFO.style(theme().note),
        label.style(theme().label),
        value
    );
}

pub fn section(title: &str) {
    eprintln!();
    eprintln!("━{}━", title.style(theme().title));
}

pub fn dim(text: &str) -> String {
    text.style(theme().label).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().anchor).to_string()
}

pub fn timing(elapsed: std::time::Duration) {
    eprintln!("{} {:.2?}", Icons::CLOCK.style(theme().label), elapsed);
}

pub fn summary_row(label: &str, value: &str) {
    eprintln!("  {} {}", label.style(theme().label), value);
}

/// One diagnostic line: level, id, then the anchor if any.
pub fn diagnostic(d: &Diagnostic) {
    let anchor = match (&d.target_type, &d.target_member) {
        (Some(ty), Some(member)) => format!(" {}", muted(&format!("[{}.{}]", ty, member))),
        (Some(ty), None) => format!(" {}", muted(&format!("[{}]", ty))),
        _ => String::new(),
    };
    eprintln!(
        "  {} {} {}{}",
        d.level.as_str().style(theme().level(d.level)),
        d.id.style(theme().label),
        d.text,
        anchor
    );
}

pub fn availability_row(language: &str, availability: &EngineAvailability) {
    let available = availability.is_available();
    let icon = if available { Icons::CHECK } else { Icons::CROSS };
    eprintln!(
        "  {} {:<8} {}",
        icon,
        language.style(theme().availability(available)),
        availability.to_string().style(theme().label)
    );
}
