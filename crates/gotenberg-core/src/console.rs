//! Operator-facing output. `[SYSTEM]` and `[FATAL]` lines are a stable
//! prefix contract; everything else is free text.

use std::io::Write;

use parking_lot::Mutex;

pub trait Console: Send + Sync {
    fn print_line(&self, line: &str);

    /// `[SYSTEM] <id>: <message>`
    fn system(&self, id: &str, message: &str) {
        self.print_line(&format!("[SYSTEM] {id}: {message}"));
    }
}

/// Writes to the process standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn print_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        // Write errors (closed stdout) are ignored.
        let _ = writeln!(out, "{line}");
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<String>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }

    /// Index of the first line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines.lock().iter().position(|line| line.contains(needle))
    }
}

impl Console for MemoryConsole {
    fn print_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
