//! Field-level regex heuristics for the markdown line scan, plus `<img>`
//! candidate harvesting from the raw HTML.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

// Prices appear as "24.500 €", "24 500€" or "€ 24.500": 1-3 leading digits
// with optional thousands groups, adjacent to the euro sign in either order.
static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"€\s*(\d{1,3}(?:[.,\s]\d{3})*)|(\d{1,3}(?:[.,\s]\d{3})*)\s*€").unwrap()
});

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19\d{2}|20[0-2]\d)\b").unwrap());

static MILEAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:[.,\s]\d{3})*|\d+)\s*km\b").unwrap()
});

fn digits(s: &str) -> i64 {
    s.chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

/// Last euro amount on the line, if any. Zero amounts are ignored.
pub fn price_in(line: &str) -> Option<i64> {
    let caps = PRICE.captures_iter(line).last()?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    let value = digits(raw);
    (value > 0).then_some(value)
}

/// Last plausible model year on the line (1900-2029).
pub fn year_in(line: &str) -> Option<i32> {
    YEAR.find_iter(line)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

/// Last "<number> km" reading on the line.
pub fn mileage_in(line: &str) -> Option<i64> {
    let caps = MILEAGE.captures_iter(line).last()?;
    Some(digits(caps.get(1)?.as_str()))
}

// ── Image candidates ─────────────────────────────────────────────────────────

const IMAGE_HINTS: &[&str] = &["img", "image", "photo", "car"];
const IMAGE_BLOCKLIST: &[&str] = &["icon", "logo", "avatar"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Collect plausible listing photos from the page HTML, in document order.
/// Chrome, branding and tracking pixels are filtered out; relative srcs are
/// resolved against the source's base URL.
pub fn collect_images(html: &str, base_url: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(img_sel) = Selector::parse("img") else {
        return Vec::new();
    };

    let base = Url::parse(base_url).ok();
    let mut out = Vec::new();

    for img in doc.select(&img_sel) {
        let Some(src) = img.value().attr("src") else {
            continue;
        };
        if !looks_like_listing_photo(src) {
            continue;
        }
        let resolved = match (&base, Url::parse(src)) {
            (_, Ok(abs)) => abs.to_string(),
            (Some(base), Err(_)) => match base.join(src) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
            (None, Err(_)) => continue,
        };
        out.push(resolved);
    }

    out
}

fn looks_like_listing_photo(src: &str) -> bool {
    let lower = src.to_lowercase();

    if !IMAGE_HINTS.iter().any(|h| lower.contains(h)) {
        return false;
    }
    if IMAGE_BLOCKLIST.iter().any(|b| lower.contains(b)) {
        return false;
    }

    // Extension check on the path, ignoring any query string.
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
