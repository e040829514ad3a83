//! Display utilities for the deltaput CLI

use console::style;
use deltaput_engine::RunReport;
use deltaput_types::Verbosity;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Print the end-of-run summary
pub fn display_report(report: &RunReport, verbosity: Verbosity) {
    if !report.rejected.is_empty() {
        display_warning(&format!(
            "{} of {} files failed and will be retried next run:",
            report.rejected.len(),
            report.diff_size
        ));
        for name in &report.rejected {
            eprintln!("    {}", style(name).red());
        }
    }

    if verbosity == Verbosity::Quiet {
        return;
    }

    println!();
    println!("{}", style("Upload Summary:").bold().underlined());
    println!("  Run: {}", style(report.run_id).dim());
    println!("  Changed files: {}", style(report.diff_size).cyan());

    if report.dry_run {
        println!(
            "  Would upload: {}",
            style(report.stats.files_skipped).yellow()
        );
    } else if report.uploaded {
        println!("  Uploaded: {}", style(report.stats.files_uploaded).green());
        println!(
            "  Failed: {}",
            if report.stats.files_rejected > 0 {
                style(report.stats.files_rejected).red()
            } else {
                style(report.stats.files_rejected).green()
            }
        );
        println!("  Retries: {}", style(report.stats.retries).yellow());
        println!(
            "  Bytes sent: {}",
            style(format_bytes(report.stats.bytes_uploaded)).green()
        );
        println!(
            "  Transfer rate: {}",
            style(format!(
                "{:.2} MB/s",
                report.stats.transfer_rate() / 1024.0 / 1024.0
            ))
            .blue()
        );
    } else {
        println!("  Upload: {}", style("skipped").yellow());
    }

    println!(
        "  Cache: {}",
        if report.cache_written {
            style("saved").green()
        } else {
            style("unchanged").yellow()
        }
    );
    println!("  Duration: {}", style(format_duration(report.elapsed)).blue());
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Display a warning message, shown at every verbosity
pub fn display_warning(message: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), style(message).yellow());
}

/// Display an error message
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

/// Display a success message
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), style(message).green());
}

/// Create a spinner for the hashing phase
pub fn create_analysis_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.blue} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
