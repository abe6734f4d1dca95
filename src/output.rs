//! Operator-facing status lines
//!
//! The orchestrator reports progress through an injected [`StatusSink`] so it can
//! be driven in tests without capturing stdout. Diagnostics go through `tracing`.

use crossterm::style::Stylize;
use std::sync::Mutex;

use crate::orchestrator::ScanSettings;

pub trait StatusSink: Send + Sync {
    fn success(&self, message: &str, indent: usize);
    fn warning(&self, message: &str, indent: usize);
    fn error(&self, message: &str, indent: usize);
    fn info(&self, message: &str, indent: usize);
}

fn pad(indent: usize) -> String {
    "  ".repeat(indent)
}

/// Coloured symbols on stdout (errors on stderr)
#[derive(Debug, Default)]
pub struct ConsoleSink {
    // keeps multi-line writes from interleaving
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn startup_banner(&self, settings: &ScanSettings) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let rule = "=".repeat(60);

        println!("{}", rule.as_str().cyan());
        println!("{}", "Mailbox link watcher".bold());
        println!("{}", rule.as_str().cyan());
        println!(
            "Platform:       {}",
            settings.platform.as_ref().map_or("(none)", |p| p.name.as_str())
        );
        println!("Subject filter: {}", settings.subject);
        println!(
            "Click label:    {}",
            settings.click_label.as_deref().unwrap_or("(open only)")
        );
        println!("Poll interval:  {}s", settings.interval.as_secs());
        println!("{}", rule.as_str().cyan());
        println!("Press Ctrl+C to stop\n");
    }
}

impl StatusSink for ConsoleSink {
    fn success(&self, message: &str, indent: usize) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        println!("{}{} {}", pad(indent), "✓".green(), message);
    }

    fn warning(&self, message: &str, indent: usize) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        println!("{}{} {}", pad(indent), "⚠".yellow(), message);
    }

    fn error(&self, message: &str, indent: usize) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        eprintln!("{}{} {}", pad(indent), "✗".red(), message);
    }

    fn info(&self, message: &str, indent: usize) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        println!("{}{} {}", pad(indent), "ℹ".cyan(), message);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl StatusSink for SilentSink {
    fn success(&self, _message: &str, _indent: usize) {}
    fn warning(&self, _message: &str, _indent: usize) {}
    fn error(&self, _message: &str, _indent: usize) {}
    fn info(&self, _message: &str, _indent: usize) {}
}
