// ABOUTME: Text formatting for progress snapshots.
// ABOUTME: Bars, byte counts, and transfer rates shared by every sink.

use super::status::{StatusRow, TransferState};
use indicatif::HumanBytes;
use std::time::Duration;

pub const BAR_WIDTH: usize = 40;

/// Bytes moved across all rows of a snapshot.
pub fn total_bytes(rows: &[StatusRow]) -> u64 {
    rows.iter().map(|row| row.offset).sum()
}

/// Fixed-width bar such as `[+++++++             ]`.
pub fn bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0)) * width as f64).round() as usize;
    format!("[{}{}]", "+".repeat(filled), " ".repeat(width - filled))
}

/// Average rate for `bytes` over `elapsed`.
pub fn rate(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let per_sec = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
    format!("{}/s", HumanBytes(per_sec as u64))
}

/// `elapsed: 1.2s  total: 3.00 MiB  (2.50 MiB/s)`
pub fn summary(rows: &[StatusRow], elapsed: Duration) -> String {
    let total = total_bytes(rows);
    format!(
        "elapsed: {:<4.1}s  total: {}  ({})",
        elapsed.as_secs_f64(),
        HumanBytes(total),
        rate(total, elapsed)
    )
}

/// Short label for a row key: digests shrink to twelve hex characters.
pub fn short_key(key: &str) -> &str {
    match key.rsplit_once(':') {
        Some((prefix, hex)) if prefix.ends_with("sha256") && hex.len() > 12 => &hex[..12],
        _ => key,
    }
}

/// Progress detail for one row, without its key.
pub fn row_detail(row: &StatusRow) -> String {
    match row.state {
        TransferState::Downloading | TransferState::Uploading => format!(
            "{} {}/{}",
            bar(row.fraction(), BAR_WIDTH),
            HumanBytes(row.offset),
            HumanBytes(row.total)
        ),
        _ => bar(row.fraction(), BAR_WIDTH),
    }
}

/// A whole row as one plain-text line.
pub fn row_line(row: &StatusRow) -> String {
    format!("{:<16} {:<12} {}", short_key(&row.key), row.state, row_detail(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(bar(0.5, 4), "[++  ]");
        assert_eq!(bar(1.5, 2), "[++]");
        assert_eq!(bar(0.0, 2), "[  ]");
    }

    #[test]
    fn rate_with_zero_elapsed_is_zero() {
        assert_eq!(rate(1024, Duration::ZERO), "0 B/s");
    }

    #[test]
    fn short_key_trims_digests() {
        let key = "layer-sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        assert_eq!(short_key(key), "9f86d081884c");
        assert_eq!(short_key("docker.io/library/nginx:latest"), "docker.io/library/nginx:latest");
    }

    #[test]
    fn active_row_shows_byte_counts() {
        let mut row = StatusRow::new("k", TransferState::Downloading);
        row.offset = 512;
        row.total = 1024;
        let line = row_detail(&row);
        assert!(line.contains("512 B/1.00 KiB"), "{line}");
    }

    #[test]
    fn summary_totals_offsets() {
        let mut a = StatusRow::new("a", TransferState::Done);
        a.offset = 2048;
        let line = summary(&[a], Duration::from_secs(2));
        assert!(line.contains("total: 2.00 KiB"), "{line}");
        assert!(line.contains("1.00 KiB/s"), "{line}");
    }
}
