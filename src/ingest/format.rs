//! Per-category record formatters.
//!
//! A formatter turns one scraped record into the text units a category
//! indexes: the info formatter emits a single labeled block per hotel, the
//! review formatter emits one unit per embedded review. Unit metadata always
//! carries the join key so the combined retriever can group by hotel.

use serde_json::Value;

use crate::error::{RagError, Result};
use crate::knowledge::store::{Category, Metadata, SOURCE_ID_KEY};
use crate::scrape::{HotelRecord, RawReview};

// ============================================================================
// FormattedUnit
// ============================================================================

/// One formatted text unit, ready for fingerprinting and chunking.
#[derive(Debug, Clone)]
pub struct FormattedUnit {
    pub content: String,
    pub metadata: Metadata,
}

// ============================================================================
// Formatter Trait
// ============================================================================

/// Turns a record into zero or more text units for one category.
pub trait Formatter: Send + Sync {
    fn format(&self, record: &HotelRecord) -> Result<Vec<FormattedUnit>>;

    fn name(&self) -> &'static str;
}

/// Formatter selection is a closed match over the category enum.
pub fn formatter_for(category: Category) -> Box<dyn Formatter> {
    match category {
        Category::Info => Box::new(InfoFormatter),
        Category::Review => Box::new(ReviewFormatter),
    }
}

fn base_metadata(record: &HotelRecord) -> Result<Metadata> {
    if record.source_id.trim().is_empty() {
        return Err(RagError::Formatting(format!(
            "record '{}' has no source id",
            record.name
        )));
    }

    let mut meta = Metadata::new();
    meta.insert(
        SOURCE_ID_KEY.to_string(),
        Value::String(record.source_id.clone()),
    );
    meta.insert(
        "hotel_name".to_string(),
        Value::String(record.name.clone()),
    );
    meta.insert("city_name".to_string(), Value::String(record.city.clone()));
    Ok(meta)
}

// ============================================================================
// InfoFormatter
// ============================================================================

/// One labeled text block per hotel record.
pub struct InfoFormatter;

impl Formatter for InfoFormatter {
    fn format(&self, record: &HotelRecord) -> Result<Vec<FormattedUnit>> {
        let metadata = base_metadata(record)?;
        let info = &record.info;

        let mut text = String::new();
        text.push_str(&format!("Hotel Name: {}\n", record.name));
        text.push_str(&format!("Hotel ID: {}\n", record.source_id));
        text.push_str(&format!("Hotel Summary: {}\n", info.summary));
        text.push_str(&format!("About and Cafe: {}\n", info.about));
        text.push_str(&format!(
            "Internet and Parking: {}\n",
            info.internet_and_parking
        ));
        text.push_str(&format!(
            "Distance Information: {}\n",
            info.distance_information
        ));
        text.push_str(&format!("FAQs: {}\n", info.faqs));
        text.push_str(&format!("Policies: {}\n", info.policies));
        text.push_str(&format!("Hotel Labels: {}\n", info.hotel_labels));
        text.push_str(&format!("Nearby Info: {}\n", info.nearby_info));

        Ok(vec![FormattedUnit {
            content: text,
            metadata,
        }])
    }

    fn name(&self) -> &'static str {
        "info"
    }
}

// ============================================================================
// ReviewFormatter
// ============================================================================

/// One text unit per embedded review.
pub struct ReviewFormatter;

impl ReviewFormatter {
    fn format_review(record: &HotelRecord, review: &RawReview) -> String {
        let rating = match review.rating {
            Some(r) => r.to_string(),
            None => "-".to_string(),
        };

        let mut text = format!("Hotel: {} in {}\n", record.name, record.city);
        text.push_str(&format!(
            "Reviewer: {} on {}\n",
            review.reviewer, review.date
        ));
        text.push_str(&format!(
            "Rating: {} - Room Type: {}\n",
            rating, review.room_type
        ));
        text.push_str(&format!("Review: {}\n", review.main_text));
        text.push_str(&format!(
            "Positives: {}\n",
            review.positive_viewpoints.join(", ")
        ));
        text.push_str(&format!(
            "Negatives: {}\n",
            review.negative_viewpoints.join(", ")
        ));
        text
    }
}

impl Formatter for ReviewFormatter {
    fn format(&self, record: &HotelRecord) -> Result<Vec<FormattedUnit>> {
        let metadata = base_metadata(record)?;

        Ok(record
            .reviews
            .iter()
            .map(|review| FormattedUnit {
                content: Self::format_review(record, review),
                metadata: metadata.clone(),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "review"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::DescriptiveInfo;
    use chrono::Utc;

    fn record(source_id: &str, reviews: Vec<RawReview>) -> HotelRecord {
        HotelRecord {
            source_id: source_id.to_string(),
            name: "هتل آزادی".to_string(),
            city: "تهران".to_string(),
            url: "https://example.com/hotel/azadi".to_string(),
            scraped_at: Utc::now(),
            info: DescriptiveInfo {
                summary: "هتل 5 ستاره در تهران".to_string(),
                about: "کافه دارد".to_string(),
                ..Default::default()
            },
            reviews,
        }
    }

    fn review(reviewer: &str, text: &str) -> RawReview {
        RawReview {
            reviewer: reviewer.to_string(),
            date: "1403/01/15".to_string(),
            rating: Some(4.5),
            room_type: "دو تخته".to_string(),
            main_text: text.to_string(),
            positive_viewpoints: vec!["تمیز".to_string()],
            negative_viewpoints: vec![],
        }
    }

    #[test]
    fn test_info_formatter_emits_one_labeled_block() {
        let units = InfoFormatter.format(&record("h42", vec![])).unwrap();

        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert!(unit.content.starts_with("Hotel Name: هتل آزادی\n"));
        assert!(unit.content.contains("Hotel ID: h42\n"));
        assert!(unit.content.contains("Hotel Summary: هتل 5 ستاره در تهران\n"));
        assert!(unit.content.contains("About and Cafe: کافه دارد\n"));
        assert_eq!(
            unit.metadata.get(SOURCE_ID_KEY).and_then(|v| v.as_str()),
            Some("h42")
        );
        assert_eq!(
            unit.metadata.get("city_name").and_then(|v| v.as_str()),
            Some("تهران")
        );
    }

    #[test]
    fn test_review_formatter_emits_one_unit_per_review() {
        let units = ReviewFormatter
            .format(&record(
                "h42",
                vec![review("علی", "اتاق تمیز بود"), review("مریم", "صبحانه خوب بود")],
            ))
            .unwrap();

        assert_eq!(units.len(), 2);
        assert!(units[0].content.starts_with("Hotel: هتل آزادی in تهران\n"));
        assert!(units[0].content.contains("Reviewer: علی on 1403/01/15\n"));
        assert!(units[0].content.contains("Rating: 4.5 - Room Type: دو تخته\n"));
        assert!(units[0].content.contains("Positives: تمیز\n"));
        assert!(units[0].content.contains("Negatives: \n"));
        assert!(units[1].content.contains("Reviewer: مریم"));
        for unit in &units {
            assert_eq!(
                unit.metadata.get(SOURCE_ID_KEY).and_then(|v| v.as_str()),
                Some("h42")
            );
        }
    }

    #[test]
    fn test_review_formatter_no_reviews_no_units() {
        let units = ReviewFormatter.format(&record("h42", vec![])).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_missing_source_id_is_formatting_error() {
        let bad = record("  ", vec![]);
        assert!(matches!(
            InfoFormatter.format(&bad),
            Err(RagError::Formatting(_))
        ));
        assert!(matches!(
            ReviewFormatter.format(&bad),
            Err(RagError::Formatting(_))
        ));
    }

    #[test]
    fn test_formatter_dispatch() {
        assert_eq!(formatter_for(Category::Info).name(), "info");
        assert_eq!(formatter_for(Category::Review).name(), "review");
    }
}
