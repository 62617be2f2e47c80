use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{
    BatchResult, CheckResult, DownloadReport, FileAction, ListResult, RegisterResult,
    VersionsResult,
};
use crate::progress::{Advisory, ProgressEvent, ProgressSink, ProgressSinkKind};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Machine-readable output: results go to stdout as JSON, advisories to
/// stderr as one JSON object per line.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_download(result: &DownloadReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_batch(result: &BatchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_versions(result: &VersionsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_register(result: &RegisterResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}

    fn advisory(&self, advisory: Advisory) {
        #[derive(Serialize)]
        struct Warning<'a> {
            warning: &'a Advisory,
            message: String,
        }
        let line = Warning {
            message: advisory.to_string(),
            warning: &advisory,
        };
        match serde_json::to_string(&line) {
            Ok(json) => eprintln!("{json}"),
            Err(err) => tracing::warn!(error = %err, "{advisory}"),
        }
    }
}

/// Human output on stderr while an operation runs, summaries on stdout.
pub struct ConsoleOutput {
    kind: ProgressSinkKind,
}

impl ConsoleOutput {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self { kind }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            ProgressSinkKind::Download => "download",
            ProgressSinkKind::Versions => "versions",
            ProgressSinkKind::List => "list",
            ProgressSinkKind::Check => "check",
            ProgressSinkKind::Register => "register",
        }
    }

    pub fn finish_download(&self, report: &DownloadReport) {
        println!(
            "{} {} v{}",
            "Installed".green().bold(),
            report.dataset,
            report.version
        );
        for file in &report.files {
            let action = match file.action {
                FileAction::Download => format!("{:<12}", "downloaded").green(),
                FileAction::Present => format!("{:<12}", "present").dark_grey(),
            };
            println!("  {action} {}", file.path);
        }
    }

    pub fn finish_batch(&self, result: &BatchResult) {
        for report in &result.items {
            self.finish_download(report);
        }
    }

    pub fn finish_versions(&self, result: &VersionsResult) {
        println!("{}", result.dataset.as_str().bold());
        for version in &result.index_versions {
            let mut flags = Vec::new();
            if result.installed_versions.contains(version) {
                flags.push("installed");
            }
            if result.index_latest.as_ref() == Some(version) {
                flags.push("latest");
            }
            if flags.is_empty() {
                println!("  {version}");
            } else {
                println!("  {version} ({})", flags.join(", "));
            }
        }
    }

    pub fn finish_list(&self, result: &ListResult) {
        if result.datasets.is_empty() {
            println!("No datasets found.");
            return;
        }
        for entry in &result.datasets {
            let installed = if entry.installed_versions.is_empty() {
                "not installed".to_string()
            } else {
                entry.installed_versions.join(", ")
            };
            println!("{:<24} {installed}", entry.dataset);
        }
    }

    pub fn finish_check(&self, result: &CheckResult) {
        println!(
            "{} {} v{}: {} file(s) installed",
            "OK".green().bold(),
            result.dataset,
            result.version,
            result.files.len()
        );
    }

    pub fn finish_register(&self, result: &RegisterResult) {
        println!("Registered {} at {}", result.dataset, result.path);
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let label = self.label();
        match event.batch {
            Some((number, total)) => {
                eprintln!("{} [{number}/{total}] {}", label.cyan(), event.message)
            }
            None => eprintln!("{} {}", label.cyan(), event.message),
        }
    }

    fn advisory(&self, advisory: Advisory) {
        eprintln!("{} {advisory}", "warning:".yellow().bold());
    }
}
