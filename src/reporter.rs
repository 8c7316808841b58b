use console::{style, StyledObject};
use indicatif::ProgressBar;

/// Kind of a user-facing status line. Each kind has its own color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Info,
    Success,
    Warning,
    Error,
}

/// Console reporter for status lines.
///
/// Constructed once in `main` and handed to the components that talk to the
/// user. A quiet reporter drops every line; batch runs use one per image so the
/// progress bar stays readable.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    verbose: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Reporter {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub const fn with_verbose(self, verbose: bool) -> Self {
        Self { verbose }
    }

    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(Status::Info, message.as_ref());
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.emit(Status::Success, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.emit(Status::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(Status::Error, message.as_ref());
    }

    /// Prints above an active progress bar so the bar is redrawn below it.
    pub fn println_above(&self, progress_bar: &ProgressBar, status: Status, message: &str) {
        progress_bar.println(styled(status, message).to_string());
    }

    fn emit(&self, status: Status, message: &str) {
        if self.verbose {
            eprintln!("{}", styled(status, message));
        }
    }
}

pub fn styled(status: Status, message: &str) -> StyledObject<&str> {
    let text = style(message);
    match status {
        Status::Info => text.blue(),
        Status::Success => text.green(),
        Status::Warning => text.yellow(),
        Status::Error => text.red(),
    }
}
