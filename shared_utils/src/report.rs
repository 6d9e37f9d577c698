//! Report Module
//!
//! Console summary boxes printed at the end of a command. The library core
//! emits events; only these helpers write formatted text to stdout.

use crate::batch::BatchResult;
use crate::progress::format_duration;
use chrono::{DateTime, Local};
use console::style;
use std::path::PathBuf;
use std::time::Duration;

const BOX_WIDTH: usize = 62;

#[derive(Debug, Clone)]
pub struct SummaryReport {
    title: String,
    rows: Vec<(String, String)>,
    errors: Vec<(PathBuf, String)>,
    started: DateTime<Local>,
}

impl SummaryReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: Vec::new(),
            errors: Vec::new(),
            started: Local::now(),
        }
    }

    pub fn row(mut self, label: impl Into<String>, value: impl ToString) -> Self {
        self.rows.push((label.into(), value.to_string()));
        self
    }

    pub fn errors(mut self, errors: &[(PathBuf, String)]) -> Self {
        self.errors.extend(errors.iter().cloned());
        self
    }

    pub fn render(&self) -> String {
        let rule = "═".repeat(BOX_WIDTH);
        let mut out = String::new();
        out.push_str(&format!("╔{}╗\n", rule));
        out.push_str(&format!(
            "║ {:<width$}║\n",
            format!("📊 {}", self.title),
            width = BOX_WIDTH - 2
        ));
        out.push_str(&format!(
            "║ {:<width$}║\n",
            format!("   {}", self.started.format("%Y-%m-%d %H:%M:%S")),
            width = BOX_WIDTH - 1
        ));
        out.push_str(&format!("╠{}╣\n", rule));
        for (label, value) in &self.rows {
            out.push_str(&format!(
                "║  {:<34}{:>width$} ║\n",
                label,
                value,
                width = BOX_WIDTH - 37
            ));
        }
        out.push_str(&format!("╚{}╝\n", rule));

        if !self.errors.is_empty() {
            out.push_str(&format!("\n{}\n", style("❌ Errors encountered:").red().bold()));
            for (path, error) in &self.errors {
                out.push_str(&format!("   {} → {}\n", path.display(), error));
            }
        }
        out
    }

    pub fn print(&self) {
        println!();
        print!("{}", self.render());
    }
}

pub fn print_batch_summary(result: &BatchResult, duration: Duration, operation_name: &str) {
    SummaryReport::new(format!("{} Summary", operation_name))
        .row("📁 Items processed", result.total)
        .row("✅ Succeeded", result.succeeded)
        .row("❌ Failed", result.failed)
        .row("⏭️  Skipped", result.skipped)
        .row("📈 Success rate", format!("{:.1}%", result.success_rate()))
        .row("⏱️  Total time", format_duration(duration))
        .errors(&result.errors)
        .print();
}

pub fn print_section(title: &str) {
    println!("\n{}", style(title).cyan().bold());
    println!("{}", style("─".repeat(BOX_WIDTH)).dim());
}
