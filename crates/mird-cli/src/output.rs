//! Output formatting for CLI.

use console::{style, Term};
use std::io::Write;

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Verbosity::Quiet;
        }
        match verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    }

    /// Default `env_logger` filter for this verbosity
    pub fn log_filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// Output handler for CLI
pub struct Output {
    term: Term,
    verbosity: Verbosity,
}

impl Output {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            term: Term::stderr(),
            verbosity,
        }
    }

    fn should_output(&self, min_verbosity: Verbosity) -> bool {
        self.verbosity >= min_verbosity
    }

    /// Write a line to stdout regardless of verbosity (command results)
    pub fn result(&self, message: &str) {
        println!("{}", message);
    }

    /// Write an info message
    pub fn info(&self, message: &str) {
        if self.should_output(Verbosity::Normal) {
            let _ = writeln!(&self.term, "{}", style(message).cyan());
        }
    }

    /// Write a success message
    pub fn success(&self, message: &str) {
        if self.should_output(Verbosity::Normal) {
            let _ = writeln!(&self.term, "{}", style(message).green());
        }
    }

    /// Write a warning message
    pub fn warning(&self, message: &str) {
        if self.should_output(Verbosity::Quiet) {
            let _ = writeln!(&self.term, "{} {}", style("Warning:").yellow().bold(), message);
        }
    }

    /// Write an error message
    pub fn error(&self, message: &str) {
        let _ = writeln!(&self.term, "{} {}", style("Error:").red().bold(), message);
    }

    /// Write a hint below an error
    pub fn hint(&self, message: &str) {
        let _ = writeln!(&self.term, "  {}", style(message).dim());
    }

    /// Write a list item
    pub fn list_item(&self, prefix: &str, message: &str) {
        if self.should_output(Verbosity::Normal) {
            let _ = writeln!(&self.term, "  {} {}", style(prefix).green(), message);
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }
}

/// Pad columns to the given widths
pub fn table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut line = String::new();
    for (i, col) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(20);
        line.push_str(&format!("{:<width$}", col, width = width));
    }
    line.trim_end().to_string()
}
