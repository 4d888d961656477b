//! Human-readable size formatting and the per-resource progress report.

use std::io::{self, Write};

use crate::types::JobResult;

pub const KB: u64 = 2 << 9;
pub const MB: u64 = 2 << 19;
pub const GB: u64 = 2 << 29;

const TAB_WIDTH: usize = 8;

/// Renders a byte count with binary units: `"1023 B"`, `"1.00 KB"`,
/// `"3.50 MB"`, `"1.00 GB"`.
pub fn render_size(bytes: u64) -> String {
    let (unit, divisor) = if bytes >= GB {
        ("GB", GB)
    } else if bytes >= MB {
        ("MB", MB)
    } else if bytes >= KB {
        ("KB", KB)
    } else {
        return format!("{bytes} B");
    };
    format!("{:.2} {unit}", bytes as f64 / divisor as f64)
}

/// Size column for one result, with the compressed size and reduction when
/// the encoder produced a compressed payload.
pub fn describe(result: &JobResult) -> String {
    let size = render_size(result.size);
    if result.compressed_size == 0 {
        return size;
    }

    let reduction = if result.size == 0 {
        "n/a".to_string()
    } else {
        let ratio = result.compressed_size as f64 / result.size as f64;
        format!("{:.2}%", 100.0 * (1.0 - ratio))
    };
    format!(
        "{size} / {} compressed ({reduction})",
        render_size(result.compressed_size)
    )
}

/// Writes one `name:<tabs>size` line per result, in the given order.
///
/// The size column starts at the first 8-column tab stop past the widest
/// `name:` cell. The whole report is built first and written with a single
/// call, then flushed.
pub fn write_report<W>(results: &[JobResult], out: &mut W) -> io::Result<()>
where
    W: Write + ?Sized,
{
    if results.is_empty() {
        return Ok(());
    }

    let widest = results
        .iter()
        .map(|result| label_width(&result.name))
        .max()
        .unwrap_or(0);
    let column = (widest / TAB_WIDTH + 1) * TAB_WIDTH;

    let mut report = String::new();
    for result in results {
        let width = label_width(&result.name);
        report.push_str(&result.name);
        report.push(':');
        for _ in 0..(column / TAB_WIDTH - width / TAB_WIDTH) {
            report.push('\t');
        }
        report.push_str(&describe(result));
        report.push('\n');
    }

    out.write_all(report.as_bytes())?;
    out.flush()
}

fn label_width(name: &str) -> usize {
    name.chars().count() + 1
}
