//! CLI helpers: wall-clock timing for refresh runs and price/count
//! formatting for the listings and stats tables.

use std::time::Instant;
use tracing::info;

/// Logs how long a named phase took when dropped.
pub struct Stopwatch {
    label: String,
    started: Instant,
}

impl Stopwatch {
    pub fn begin(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        info!("{} finished in {:.2?}", self.label, self.started.elapsed());
    }
}

/// Thousands-grouped count for table output: 1234567 → "1,234,567".
pub fn fmt_count(n: i64) -> String {
    let digits: Vec<char> = n.abs().to_string().chars().collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*ch);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

/// Listing price the way the marketplaces print it: 24500 → "24,500 €".
pub fn fmt_price(price: i64) -> String {
    format!("{} €", fmt_count(price))
}
