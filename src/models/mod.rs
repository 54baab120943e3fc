use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Listing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    /// Unique per source — together with `source` this is the upsert key.
    pub external_id: String,
    pub title: String,
    pub brand: String,
    pub model: String,
    pub year: i32,
    /// Whole euro.
    pub price: i64,
    /// Kilometres.
    pub mileage: Option<i64>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub location: Option<String>,
    pub country: String,
    pub source: String,
    pub source_url: String,
    pub listing_url: Option<String>,
    pub image_url: Option<String>,
    pub scraped_at: NaiveDateTime,
}

// ── Source status ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Idle,
    Scraping,
    Completed,
    Error,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Idle => "idle",
            ScrapeStatus::Scraping => "scraping",
            ScrapeStatus::Completed => "completed",
            ScrapeStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scraping" => ScrapeStatus::Scraping,
            "completed" => ScrapeStatus::Completed,
            "error" => ScrapeStatus::Error,
            _ => ScrapeStatus::Idle,
        }
    }
}

/// One row per source; written on every scrape attempt, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceStatus {
    pub source: String,
    pub status: ScrapeStatus,
    pub last_scraped_at: Option<NaiveDateTime>,
    pub last_listing_count: Option<i64>,
    pub last_error: Option<String>,
    pub updated_at: NaiveDateTime,
}

// ── Fetched page ──────────────────────────────────────────────────────────────

/// What the scraping API hands back for one rendered page.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub markdown: String,
    pub html: String,
    pub links: Vec<String>,
}

// ── Refresh response (external interface) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<ListingRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefreshResponse {
    pub fn ok(data: Vec<ListingRecord>, cached: bool) -> Self {
        Self {
            success: true,
            data: Some(data),
            cached: Some(cached),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            cached: None,
            error: Some(message.into()),
        }
    }
}
