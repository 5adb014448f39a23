//! Random demo traffic for the mock producer: well-formed events across the
//! three real feeds, and occasionally a malformed frame so consumers exercise
//! their validation path.

use lib_feed::core::Category;
use rand::Rng;
use serde_json::{json, Value};

const NEWS_TITLES: &[&str] = &[
    "Breaking: New AI Model Released",
    "Tech Giant Announces Major Update",
    "Industry Report: Market Trends 2024",
    "Developer Conference Announces Dates",
    "Open Source Project Reaches Milestone",
    "Security Advisory Published",
    "Platform Launches New Features",
];

const MARKET_TITLES: &[&str] = &[
    "Trading Volume Increases",
    "Market Opens Strong",
    "New Exchange Listing Announced",
    "Quarterly Report Released",
    "Partnership Deal Signed",
    "Merger Talks Confirmed",
];

const PRICE_TITLES: &[&str] = &[
    "Price Alert: Significant Movement",
    "New High Reached",
    "Price Correction Observed",
    "Support Level Tested",
    "Resistance Broken",
    "Volume Spike Detected",
];

const BODIES: &[&str] = &[
    "This is an important update that requires immediate attention from all stakeholders.",
    "Further details will be made available in the coming hours.",
    "Analysts are closely monitoring the situation for additional developments.",
    "The announcement has been well-received by the community.",
    "Industry experts predict significant implications.",
];

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items[rng.random_range(0..items.len())]
}

fn titles_for(category: Category) -> &'static [&'static str] {
    match category {
        Category::News => NEWS_TITLES,
        Category::Market => MARKET_TITLES,
        Category::Price => PRICE_TITLES,
        Category::All => &[],
    }
}

/// `<feed>-<millis>-<9 random base36 chars>`.
fn event_id<R: Rng + ?Sized>(rng: &mut R, category: Category, now_ms: i64) -> String {
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", category.as_str(), now_ms, suffix)
}

/// A well-formed event object for a random real feed. About half carry a body.
pub fn random_event<R: Rng + ?Sized>(rng: &mut R) -> Value {
    let category = Category::REAL[rng.random_range(0..Category::REAL.len())];
    let now_ms = chrono::Utc::now().timestamp_millis();

    let mut event = json!({
        "id": event_id(rng, category, now_ms),
        "feed": category.as_str(),
        "ts": now_ms,
        "title": pick(rng, titles_for(category)),
    });
    if rng.random_bool(0.5) {
        event["body"] = Value::from(pick(rng, BODIES));
    }
    event
}

/// One of three malformed shapes, roughly equally likely: a non-JSON string,
/// an object with only an id, or a full event whose id was removed.
pub fn malformed_frame<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.random_range(0..3) {
        0 => "invalid json string".to_string(),
        1 => json!({ "id": "missing-fields" }).to_string(),
        _ => {
            let mut event = random_event(rng);
            if let Some(obj) = event.as_object_mut() {
                obj.remove("id");
            }
            event.to_string()
        }
    }
}

/// The next frame to emit: malformed with probability `malformed_ratio`.
pub fn next_frame<R: Rng + ?Sized>(rng: &mut R, malformed_ratio: f64) -> (String, bool) {
    if rng.random_bool(malformed_ratio.clamp(0.0, 1.0)) {
        (malformed_frame(rng), true)
    } else {
        (random_event(rng).to_string(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_feed::core::{Frame, FrameError};

    #[test]
    fn random_events_pass_validation() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let text = random_event(&mut rng).to_string();
            match Frame::parse(&text) {
                Ok(Frame::Event(event)) => {
                    assert!(!event.category().is_virtual());
                    assert!(event.id().starts_with(event.category().as_str()));
                    assert!(titles_for(event.category()).contains(&event.title()));
                }
                other => panic!("unexpected parse result {:?} for {}", other, text),
            }
        }
    }

    #[test]
    fn malformed_frames_never_parse_as_events() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let text = malformed_frame(&mut rng);
            assert!(Frame::parse(&text).is_err(), "{} should be rejected", text);
        }
    }

    #[test]
    fn ratio_extremes_are_deterministic() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            assert!(!next_frame(&mut rng, 0.0).1);
            let (text, malformed) = next_frame(&mut rng, 1.0);
            assert!(malformed);
            assert!(!matches!(Frame::parse(&text), Ok(Frame::Event(_))));
        }
    }

    #[test]
    fn missing_id_is_reported_as_such() {
        let mut rng = rand::rng();
        let mut event = random_event(&mut rng);
        event.as_object_mut().unwrap().remove("id");
        assert_eq!(Frame::parse(&event.to_string()), Err(FrameError::MissingField("id")));
    }
}
