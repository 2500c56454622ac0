//! Snapshot presenters
//!
//! Presenters only read a finished [`Snapshot`]; nothing here talks to the
//! device.

mod json;
mod text;

use std::io::Write;

use crate::Result;
use crate::snapshot::{Field, Snapshot, Uptime};

pub use json::JsonPresenter;
pub use text::TextPresenter;

/// Renders a snapshot to a writer
pub trait Presenter {
    /// Write the snapshot
    ///
    /// # Errors
    ///
    /// Returns error if writing or serialization fails
    fn present(&self, snapshot: &Snapshot, out: &mut dyn Write) -> Result<()>;
}

/// Placeholder for unavailable values
pub const NOT_AVAILABLE: &str = "N/A";

/// Render an available value, or `N/A`
pub fn or_na<T>(field: &Field<T>, render: impl FnOnce(&T) -> String) -> String {
    field.value().map_or_else(|| NOT_AVAILABLE.to_string(), render)
}

/// Group digits in thousands: `93784` → `93,784`
#[must_use]
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// `1d 2h 3m (93,784 seconds)`
#[must_use]
pub fn format_uptime(uptime: &Uptime) -> String {
    format!(
        "{}d {}h {}m ({} seconds)",
        uptime.days,
        uptime.hours,
        uptime.minutes,
        group_thousands(uptime.seconds)
    )
}

/// Bit rate in Mbps with two decimals
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bit_rate(bits_per_second: u64) -> String {
    format!("{:.2} Mbps", bits_per_second as f64 / 1_000_000.0)
}

/// Byte count in binary units, never smaller than MB
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;

    let value = bytes as f64;
    if value < KIB.powi(3) {
        format!("{:.2} MB", value / KIB.powi(2))
    } else if value < KIB.powi(4) {
        format!("{:.2} GB", value / KIB.powi(3))
    } else {
        format!("{:.2} TB", value / KIB.powi(4))
    }
}

/// Raw count plus its size: `3,000,000,000 (2.79 GB)`
#[must_use]
pub fn format_counter(bytes: u64) -> String {
    format!("{} ({})", group_thousands(bytes), format_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(93_784), "93,784");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn uptime_text() {
        assert_eq!(
            format_uptime(&Uptime::from_seconds(93_784)),
            "1d 2h 3m (93,784 seconds)"
        );
    }

    #[test]
    fn bit_rates() {
        assert_eq!(format_bit_rate(51_200_000), "51.20 Mbps");
        assert_eq!(format_bit_rate(0), "0.00 Mbps");
    }

    #[test]
    fn byte_units() {
        assert_eq!(format_bytes(512), "0.00 MB");
        assert_eq!(format_bytes(2_500_000), "2.38 MB");
        assert_eq!(format_bytes(1 << 30), "1.00 GB");
        assert_eq!(format_bytes(3_000_000_000), "2.79 GB");
        assert_eq!(format_bytes(1_500_000_000_000), "1.36 TB");
    }

    #[test]
    fn counters_show_raw_and_sized() {
        assert_eq!(format_counter(3_000_000_000), "3,000,000,000 (2.79 GB)");
        assert_eq!(format_counter(0), "0 (0.00 MB)");
    }

    #[test]
    fn unavailable_renders_placeholder() {
        let field: Field<u64> = Field::not_offered("x");
        assert_eq!(or_na(&field, |n| n.to_string()), "N/A");
        assert_eq!(or_na(&Field::Available(7_u64), |n| n.to_string()), "7");
    }
}
