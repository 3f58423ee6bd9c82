//! Hotel record sources.
//!
//! Records come either from the hotel JSON API (summary endpoint per
//! hotel, vote endpoint for guest reviews) or from a previously saved
//! snapshot file. Both implement `RecordSource`, so the ingestion
//! pipeline does not care which one it is fed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Reviews fetched per vote-endpoint page (API maximum).
const VOTE_PAGE_SIZE: usize = 50;

// ============================================================================
// Records
// ============================================================================

/// One guest review as scraped or loaded from a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReview {
    pub reviewer: String,
    pub date: String,
    pub rating: Option<f32>,
    pub room_type: String,
    pub main_text: String,
    #[serde(default)]
    pub positive_viewpoints: Vec<String>,
    #[serde(default)]
    pub negative_viewpoints: Vec<String>,
}

/// Descriptive hotel text, one field per information block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptiveInfo {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub internet_and_parking: String,
    #[serde(default)]
    pub distance_information: String,
    #[serde(default)]
    pub faqs: String,
    #[serde(default)]
    pub policies: String,
    #[serde(default)]
    pub hotel_labels: String,
    #[serde(default)]
    pub nearby_info: String,
}

/// A scraped hotel: stable identifier, descriptive text, embedded reviews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelRecord {
    /// Stable identifier from the source system. Dedup, fingerprint keys
    /// and the info/review join all derive from this, never from the
    /// (name, city) pair.
    pub source_id: String,
    pub name: String,
    pub city: String,
    pub url: String,
    pub scraped_at: DateTime<Utc>,
    pub info: DescriptiveInfo,
    #[serde(default)]
    pub reviews: Vec<RawReview>,
}

/// Where records come from.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn records(&self) -> Result<Vec<HotelRecord>>;

    fn name(&self) -> &str;
}

// ============================================================================
// HTML stripping
// ============================================================================

/// Descriptive API fields arrive with embedded markup. Strip tags, keep
/// the text.
pub fn clean_html(raw: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    re.replace_all(raw, "").trim().to_string()
}

// ============================================================================
// API payload shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct HotelPayload {
    #[serde(rename = "HotelId")]
    hotel_id: Option<i64>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "CityName")]
    city_name: Option<String>,
    #[serde(rename = "SupportPhone")]
    support_phone: Option<String>,
    #[serde(rename = "CheckInTime")]
    check_in_time: Option<String>,
    #[serde(rename = "CheckOutTime")]
    check_out_time: Option<String>,
    #[serde(rename = "AboutHotel")]
    about_hotel: Option<AboutPayload>,
    #[serde(rename = "HotelInternetParking")]
    internet_parking: Option<InternetParkingPayload>,
    #[serde(rename = "FAQs", default)]
    faqs: Vec<FaqPayload>,
    #[serde(rename = "Policies")]
    policies: Option<PoliciesPayload>,
    #[serde(rename = "HotelLabels", default)]
    hotel_labels: Vec<serde_json::Value>,
    #[serde(rename = "NearBies", default)]
    nearbies: Vec<NearbyPayload>,
}

#[derive(Debug, Deserialize)]
struct AboutPayload {
    #[serde(rename = "BriefDescription")]
    brief: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InternetParkingPayload {
    #[serde(rename = "HasInternet", default)]
    has_internet: bool,
    #[serde(rename = "HasParking", default)]
    has_parking: bool,
}

#[derive(Debug, Deserialize)]
struct FaqPayload {
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PoliciesPayload {
    #[serde(rename = "PolicyHotelCancellation")]
    cancellation: Option<String>,
    #[serde(rename = "PolicyHotelChild")]
    child: Option<String>,
    #[serde(rename = "PolicyHotelChecking")]
    checking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NearbyPayload {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Distance")]
    distance: Option<serde_json::Value>,
    #[serde(rename = "DistanceUnit")]
    unit: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct VotesPayload {
    #[serde(default)]
    votes: Vec<VotePayload>,
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Deserialize)]
struct VotePayload {
    #[serde(rename = "guestName")]
    guest_name: Option<String>,
    #[serde(rename = "arrivalDatePersian")]
    arrival_date_persian: Option<String>,
    #[serde(rename = "arrivalDate")]
    arrival_date: Option<String>,
    rate: Option<f32>,
    #[serde(rename = "roomName")]
    room_name: Option<String>,
    description: Option<String>,
}

impl VotePayload {
    fn into_review(self) -> RawReview {
        RawReview {
            reviewer: self.guest_name.unwrap_or_default(),
            date: self
                .arrival_date_persian
                .or(self.arrival_date)
                .unwrap_or_default(),
            rating: self.rate,
            room_type: self.room_name.unwrap_or_default(),
            main_text: self.description.map(|d| clean_html(&d)).unwrap_or_default(),
            positive_viewpoints: Vec::new(),
            negative_viewpoints: Vec::new(),
        }
    }
}

// ============================================================================
// Payload -> record
// ============================================================================

fn distance_unit(value: &Option<serde_json::Value>) -> &'static str {
    match value {
        Some(v) if v == &serde_json::json!(1) || v == &serde_json::json!("1") => "متر",
        Some(v) if v == &serde_json::json!(2) || v == &serde_json::json!("2") => "کیلومتر",
        _ => "",
    }
}

fn extract_city_name(url: &str, payload: &HotelPayload) -> String {
    static CITY_RE: OnceLock<Regex> = OnceLock::new();
    let re = CITY_RE.get_or_init(|| Regex::new(r"cityName=([^&]+)").unwrap());

    if let Some(captures) = re.captures(url) {
        if let Some(city) = captures.get(1) {
            return city.as_str().to_string();
        }
    }

    payload
        .city_name
        .clone()
        .unwrap_or_else(|| "نامشخص".to_string())
}

/// Parse one summary-endpoint response into a record (reviews come later
/// from the vote endpoint).
fn parse_hotel(url: &str, body: &str) -> Result<HotelRecord> {
    let payload: HotelPayload = serde_json::from_str(body)
        .map_err(|e| RagError::Formatting(format!("malformed hotel payload from {}: {}", url, e)))?;

    let source_id = payload
        .hotel_id
        .map(|id| id.to_string())
        .ok_or_else(|| RagError::Formatting(format!("hotel payload from {} has no HotelId", url)))?;

    let name = payload
        .name
        .clone()
        .unwrap_or_else(|| "هتل نامشخص".to_string());
    let city = extract_city_name(url, &payload);

    let summary = {
        let mut parts = Vec::new();
        if let Some(phone) = payload.support_phone.as_deref().filter(|p| !p.is_empty()) {
            parts.push(format!("شماره تماس هتل: {}", phone));
        }
        if parts.is_empty() {
            format!("اطلاعاتی برای هتل {} موجود نیست.", name)
        } else {
            format!("هتل {}، {} می‌باشد.", name, parts.join(" و "))
        }
    };

    let about = payload
        .about_hotel
        .as_ref()
        .map(|a| {
            let brief = clean_html(a.brief.as_deref().unwrap_or(""));
            let full = clean_html(a.description.as_deref().unwrap_or(""));
            format!("{} {}", brief, full).trim().to_string()
        })
        .unwrap_or_default();

    let internet_and_parking = payload
        .internet_parking
        .as_ref()
        .map(|ip| {
            let internet = if ip.has_internet {
                "دارای اینترنت"
            } else {
                "فاقد اینترنت"
            };
            let parking = if ip.has_parking {
                "دارای پارکینگ"
            } else {
                "فاقد پارکینگ"
            };
            format!(
                "امکانات اینترنت و پارکینگ هتل: {} و {} می‌باشد.",
                internet, parking
            )
        })
        .unwrap_or_else(|| "امکانات اینترنت و پارکینگ برای هتل یافت نشد".to_string());

    let faqs = payload
        .faqs
        .iter()
        .filter_map(|f| {
            let question = clean_html(f.title.as_deref().unwrap_or(""));
            let answer = clean_html(f.description.as_deref().unwrap_or(""));
            if question.is_empty() && answer.is_empty() {
                None
            } else {
                Some(format!("سوال: {} - پاسخ: {}", question, answer))
            }
        })
        .collect::<Vec<_>>()
        .join("؛ ");

    let policies = {
        let mut sentences = Vec::new();
        let check_in = payload.check_in_time.as_deref().unwrap_or("");
        let check_out = payload.check_out_time.as_deref().unwrap_or("");
        if !check_in.is_empty() || !check_out.is_empty() {
            sentences.push(format!(
                "ساعت ورود هتل {} و ساعت خروج {} می‌باشد.",
                check_in, check_out
            ));
        }
        if let Some(p) = &payload.policies {
            if let Some(c) = p.cancellation.as_deref().filter(|c| !c.is_empty()) {
                sentences.push(format!("قوانین کنسلی به شرح زیر است: {}.", clean_html(c)));
            }
            if let Some(c) = p.child.as_deref().filter(|c| !c.is_empty()) {
                sentences.push(format!(
                    "قوانین مربوط به سن خردسال به شرح زیر است: {}.",
                    clean_html(c)
                ));
            }
            if let Some(c) = p.checking.as_deref().filter(|c| !c.is_empty()) {
                sentences.push(format!(
                    "قوانین عمومی پذیرش به شرح زیر است: {}.",
                    clean_html(c)
                ));
            }
        }
        sentences.join(" ")
    };

    let hotel_labels = {
        let labels: Vec<String> = payload
            .hotel_labels
            .iter()
            .filter_map(|label| match label {
                serde_json::Value::String(s) => Some(clean_html(s)),
                serde_json::Value::Object(map) => {
                    let parts: Vec<String> = map
                        .values()
                        .filter_map(|v| v.as_str())
                        .map(clean_html)
                        .filter(|s| !s.is_empty())
                        .collect();
                    if parts.is_empty() {
                        None
                    } else {
                        Some(parts.join(" "))
                    }
                }
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect();
        if labels.is_empty() {
            String::new()
        } else {
            format!("برچسب‌های هتل: {}", labels.join(", "))
        }
    };

    let nearby_info = payload
        .nearbies
        .iter()
        .filter_map(|item| {
            let nearby_name = clean_html(item.name.as_deref().unwrap_or(""));
            let distance = match &item.distance {
                Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => return None,
            };
            if nearby_name.is_empty() {
                return None;
            }
            Some(format!(
                "فاصله {} تا {} به اندازه {} {}",
                name,
                nearby_name,
                distance,
                distance_unit(&item.unit)
            ))
        })
        .collect::<Vec<_>>()
        .join("؛ ");

    Ok(HotelRecord {
        source_id,
        name,
        city,
        url: url.to_string(),
        scraped_at: Utc::now(),
        info: DescriptiveInfo {
            summary,
            about,
            internet_and_parking,
            distance_information: String::new(),
            faqs,
            policies,
            hotel_labels,
            nearby_info,
        },
        reviews: Vec::new(),
    })
}

// ============================================================================
// HotelApiScraper
// ============================================================================

/// Live scraper against the hotel JSON API.
pub struct HotelApiScraper {
    client: reqwest::Client,
    base_url: String,
    hotel_urls: Vec<String>,
}

impl HotelApiScraper {
    pub fn new(base_url: impl Into<String>, hotel_urls: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("hotel-rag/0.1")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            hotel_urls,
        })
    }

    /// Scrape every configured summary URL. Failed URLs are skipped with a
    /// warning; hotels already seen (by `source_id`) are skipped too.
    pub async fn scrape(&self) -> Result<Vec<HotelRecord>> {
        if self.hotel_urls.is_empty() {
            tracing::warn!("no hotel URLs configured, nothing to scrape");
            return Ok(vec![]);
        }

        let mut records = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for url in &self.hotel_urls {
            tracing::info!(url = %url, "scraping hotel");

            let body = match self.fetch_text(url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to retrieve hotel, skipping");
                    continue;
                }
            };

            let record = match parse_hotel(url, &body) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "unusable hotel payload, skipping");
                    continue;
                }
            };

            if !seen.insert(record.source_id.clone()) {
                tracing::info!(hotel = %record.name, "duplicate hotel entry, skipping");
                continue;
            }

            records.push(record);
        }

        // Votes are fetched after the summary loop, one hotel at a time.
        for record in &mut records {
            match self.fetch_reviews(&record.source_id).await {
                Ok(reviews) => {
                    tracing::info!(
                        hotel = %record.name,
                        count = reviews.len(),
                        "fetched reviews"
                    );
                    record.reviews = reviews;
                }
                Err(e) => {
                    tracing::warn!(hotel = %record.name, error = %e, "review fetch failed");
                }
            }
        }

        Ok(records)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RagError::Formatting(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    async fn fetch_reviews(&self, source_id: &str) -> Result<Vec<RawReview>> {
        let mut reviews = Vec::new();
        let mut page_index = 1;

        loop {
            let url = format!(
                "{}/api/mvc/v1/vote/GetVotes?hotelId={}&pageIndex={}&pageSize={}",
                self.base_url, source_id, page_index, VOTE_PAGE_SIZE
            );
            let body = self.fetch_text(&url).await?;
            let payload: VotesPayload = serde_json::from_str(&body)
                .map_err(|e| RagError::Formatting(format!("malformed votes payload: {}", e)))?;

            // An empty page also ends the loop: the reported count can
            // exceed what the endpoint actually serves.
            let page_votes = payload.votes.len();
            reviews.extend(payload.votes.into_iter().map(VotePayload::into_review));

            if page_votes == 0 || reviews.len() >= payload.count {
                break;
            }
            page_index += 1;
        }

        Ok(reviews)
    }
}

#[async_trait]
impl RecordSource for HotelApiScraper {
    async fn records(&self) -> Result<Vec<HotelRecord>> {
        self.scrape().await
    }

    fn name(&self) -> &str {
        "hotel-api"
    }
}

// ============================================================================
// Snapshot source
// ============================================================================

/// Reads records from a JSON snapshot written by a previous run.
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for SnapshotSource {
    async fn records(&self) -> Result<Vec<HotelRecord>> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            RagError::Config(format!("snapshot {}: {}", self.path.display(), e))
        })?;
        let records: Vec<HotelRecord> = serde_json::from_slice(&raw)
            .map_err(|e| RagError::Config(format!("snapshot {}: {}", self.path.display(), e)))?;
        tracing::info!(
            path = %self.path.display(),
            count = records.len(),
            "loaded records from snapshot"
        );
        Ok(records)
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

/// Write records to a snapshot file for later offline ingestion.
pub async fn save_snapshot(path: &Path, records: &[HotelRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RagError::Config(e.to_string()))?;
    }
    let raw = serde_json::to_vec_pretty(records)?;
    tokio::fs::write(path, raw)
        .await
        .map_err(|e| RagError::Config(format!("snapshot {}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), count = records.len(), "snapshot saved");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_html_strips_tags() {
        assert_eq!(clean_html("<p>hello <b>world</b></p>"), "hello world");
        assert_eq!(clean_html("  no tags  "), "no tags");
        assert_eq!(clean_html(""), "");
    }

    #[test]
    fn test_city_name_from_url_then_payload() {
        let payload: HotelPayload =
            serde_json::from_str(r#"{"HotelId": 1, "CityName": "مشهد"}"#).unwrap();

        let from_url =
            extract_city_name("https://example.com/api/hotel?cityName=tehran&id=1", &payload);
        assert_eq!(from_url, "tehran");

        let from_payload = extract_city_name("https://example.com/api/hotel?id=1", &payload);
        assert_eq!(from_payload, "مشهد");
    }

    #[test]
    fn test_parse_hotel_builds_record() {
        let body = r#"{
            "HotelId": 92,
            "Name": "هتل قصر",
            "CityName": "مشهد",
            "SupportPhone": "051-1234",
            "AboutHotel": {"BriefDescription": "<p>هتلی پنج ستاره</p>", "Description": "نزدیک حرم"},
            "HotelInternetParking": {"HasInternet": true, "HasParking": false},
            "FAQs": [{"Title": "آیا صبحانه دارد؟", "Description": "<b>بله</b>"}],
            "NearBies": [{"Name": "حرم", "Distance": 500, "DistanceUnit": 1}]
        }"#;

        let record = parse_hotel("https://example.com/api/summary?id=92", body).unwrap();

        assert_eq!(record.source_id, "92");
        assert_eq!(record.name, "هتل قصر");
        assert_eq!(record.city, "مشهد");
        assert!(record.info.about.contains("هتلی پنج ستاره"));
        assert!(!record.info.about.contains("<p>"));
        assert!(record.info.internet_and_parking.contains("دارای اینترنت"));
        assert!(record.info.internet_and_parking.contains("فاقد پارکینگ"));
        assert!(record.info.faqs.contains("آیا صبحانه دارد؟"));
        assert!(record.info.nearby_info.contains("500 متر"));
        assert!(record.reviews.is_empty());
    }

    #[test]
    fn test_parse_hotel_requires_hotel_id() {
        let result = parse_hotel("https://example.com/h", r#"{"Name": "بدون شناسه"}"#);
        assert!(matches!(result, Err(RagError::Formatting(_))));
    }

    #[test]
    fn test_vote_into_review() {
        let vote: VotePayload = serde_json::from_str(
            r#"{
                "guestName": "علی",
                "arrivalDatePersian": "1402/05/01",
                "rate": 4.5,
                "roomName": "دو تخته",
                "description": "<p>اتاق تمیز بود</p>"
            }"#,
        )
        .unwrap();

        let review = vote.into_review();
        assert_eq!(review.reviewer, "علی");
        assert_eq!(review.date, "1402/05/01");
        assert_eq!(review.rating, Some(4.5));
        assert_eq!(review.main_text, "اتاق تمیز بود");
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snapshots").join("hotels.json");

        let records = vec![HotelRecord {
            source_id: "92".to_string(),
            name: "هتل قصر".to_string(),
            city: "مشهد".to_string(),
            url: "https://example.com/h/92".to_string(),
            scraped_at: Utc::now(),
            info: DescriptiveInfo {
                summary: "summary".to_string(),
                ..DescriptiveInfo::default()
            },
            reviews: vec![RawReview {
                reviewer: "علی".to_string(),
                date: "1402/05/01".to_string(),
                rating: Some(4.0),
                room_type: "دو تخته".to_string(),
                main_text: "خوب بود".to_string(),
                positive_viewpoints: vec!["تمیزی".to_string()],
                negative_viewpoints: vec![],
            }],
        }];

        save_snapshot(&path, &records).await.unwrap();

        let source = SnapshotSource::new(&path);
        let loaded = source.records().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].source_id, "92");
        assert_eq!(loaded[0].reviews[0].positive_viewpoints, vec!["تمیزی"]);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_config_error() {
        let source = SnapshotSource::new("/nonexistent/snapshot.json");
        assert!(matches!(
            source.records().await,
            Err(RagError::Config(_))
        ));
    }
}
