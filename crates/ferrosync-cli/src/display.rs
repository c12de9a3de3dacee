//! Console output for the ferrosync CLI

use console::style;
use ferrosync_mirror::DriverSummary;
use ferrosync_types::{MirrorStats, TickReport};
use std::time::Duration;

/// Print a short summary after a tick
pub fn print_tick_summary(report: &TickReport) {
    let stats = report.stats();
    let marker = if report.failure_count() > 0 {
        style("✗").red().bold()
    } else {
        style("✓").green().bold()
    };
    let label = if report.dry_run {
        "Dry run finished"
    } else {
        "Sync finished"
    };

    println!(
        "{} {} in {}: {}",
        marker,
        label,
        style(format_duration(report.duration)).cyan(),
        describe_stats(&stats)
    );
}

/// Print totals when the driver stops
pub fn print_driver_summary(summary: &DriverSummary) {
    println!();
    println!("{}", style("Mirror Summary").bold().underlined());
    println!("  Ticks: {}", style(summary.ticks).cyan());
    println!(
        "  Folders created: {}",
        style(summary.stats.directories_created).green()
    );
    println!(
        "  Files copied: {} ({})",
        style(summary.stats.files_copied).green(),
        style(format_bytes(summary.stats.bytes_copied)).cyan()
    );
    println!(
        "  Files removed: {}",
        style(summary.stats.files_removed).yellow()
    );
    println!(
        "  Folders removed: {}",
        style(summary.stats.directories_removed).yellow()
    );
    if summary.stats.entries_skipped > 0 {
        println!(
            "  Entries skipped: {}",
            style(summary.stats.entries_skipped).dim()
        );
    }
    if summary.stats.errors > 0 {
        println!("  Errors: {}", style(summary.stats.errors).red().bold());
    }
    if summary.shut_down {
        println!("  {}", style("Stopped on shutdown request").dim());
    }
}

fn describe_stats(stats: &MirrorStats) -> String {
    if stats.total_actions() == 0 && stats.errors == 0 {
        return "replica up to date".to_string();
    }

    let mut parts = Vec::new();
    if stats.directories_created > 0 {
        parts.push(format!("{} folders created", stats.directories_created));
    }
    if stats.files_copied > 0 {
        parts.push(format!(
            "{} files copied ({})",
            stats.files_copied,
            format_bytes(stats.bytes_copied)
        ));
    }
    if stats.files_removed > 0 {
        parts.push(format!("{} files removed", stats.files_removed));
    }
    if stats.directories_removed > 0 {
        parts.push(format!("{} folders removed", stats.directories_removed));
    }
    if stats.errors > 0 {
        parts.push(format!("{} errors", stats.errors));
    }
    parts.join(", ")
}

/// Human readable byte count
#[allow(clippy::cast_precision_loss)]
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

/// Human readable duration
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
