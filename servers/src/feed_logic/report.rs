//! Terminal rendering of the dashboard: connection status, ingest counters,
//! per-category counts and the newest entries of the filtered view.

use chrono::{Local, TimeZone};
use colored::*;
use lib_feed::core::{Category, ConnectionState, EventStore, FeedEvent, IngestStats, StatusSnapshot};

/// Relative age of a timestamp: `Ns ago`, `Nm ago`, `Nh ago`, then the local
/// date and time once a day or more has passed.
pub fn format_age(now_ms: i64, ts_ms: i64) -> String {
    let secs = now_ms.saturating_sub(ts_ms).max(0) / 1000;
    let mins = secs / 60;
    let hours = mins / 60;

    if secs < 60 {
        format!("{}s ago", secs)
    } else if mins < 60 {
        format!("{}m ago", mins)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else {
        match Local.timestamp_millis_opt(ts_ms).single() {
            Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format!("{}h ago", hours),
        }
    }
}

fn paint_category(category: Category, text: &str) -> ColoredString {
    match category {
        Category::News => text.blue(),
        Category::Market => text.green(),
        Category::Price => text.magenta(),
        Category::All => text.normal(),
    }
}

fn paint_state(state: ConnectionState) -> ColoredString {
    let text = state.to_string().to_uppercase();
    match state {
        ConnectionState::Connected => text.green().bold(),
        ConnectionState::Connecting => text.yellow().bold(),
        ConnectionState::Disconnected => text.red().bold(),
    }
}

fn render_event(event: &FeedEvent, now_ms: i64) -> String {
    let tag = format!("[{}]", event.category().as_str().to_uppercase());
    let mut line = format!(
        "  {} {} {}",
        paint_category(event.category(), &tag),
        event.title().bold(),
        format!("({})", format_age(now_ms, event.timestamp())).truecolor(128, 128, 128)
    );
    if let Some(body) = event.body() {
        line.push_str(&format!("\n      {}", body));
    }
    line
}

/// What a report shows.
#[derive(Debug, Clone)]
pub struct ReportView<'a> {
    pub category: Category,
    pub search: &'a str,
    pub rows: usize,
}

/// Renders one full report as a multi-line string.
pub fn render_report(
    status: &StatusSnapshot,
    stats: &IngestStats,
    store: &EventStore,
    view: &ReportView<'_>,
    now_ms: i64,
) -> String {
    let mut out = Vec::new();

    let mut header = format!("Feed status: {}", paint_state(status.state));
    if let Some(error) = &status.last_error {
        header.push_str(&format!("  {}", format!("last error: {}", error).red()));
    }
    out.push(header);

    out.push(format!(
        "Frames: {}  events: {}  malformed: {}  heartbeats: {}  connects: {}/{}",
        stats.frames_received,
        stats.events_forwarded,
        stats.malformed_frames + stats.non_object_frames,
        stats.heartbeats,
        stats.successful_connects,
        stats.connection_attempts
    ));

    let counts = store.counts_by_category();
    let tally: Vec<String> = counts
        .iter()
        .map(|(category, n)| format!("{} {}", paint_category(category, category.label()), n))
        .collect();
    out.push(format!("Buffer ({}/{}): {}", store.len(), store.capacity(), tally.join("  ")));

    let filtered = store.filtered_view(view.category, view.search);
    let mut title = format!("Showing {} of {} matching", filtered.len().min(view.rows), filtered.len());
    if !view.category.is_virtual() {
        title.push_str(&format!(" in {}", view.category.label()));
    }
    if !view.search.is_empty() {
        title.push_str(&format!(" \"{}\"", view.search));
    }
    out.push(title);

    if filtered.is_empty() {
        out.push(format!("  {}", "No events yet.".italic()));
    }
    for event in filtered.into_iter().take(view.rows) {
        out.push(render_event(event, now_ms));
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ages_are_bucketed() {
        let now = 10_000_000;
        assert_eq!(format_age(now, now), "0s ago");
        assert_eq!(format_age(now, now - 59_999), "59s ago");
        assert_eq!(format_age(now, now - 60_000), "1m ago");
        assert_eq!(format_age(now, now - 3_599_000), "59m ago");
        assert_eq!(format_age(now, now - 7_200_000), "2h ago");
        assert_eq!(format_age(now, now + 5_000), "0s ago");
    }

    #[test]
    fn old_timestamps_fall_back_to_a_date() {
        let ts = 1_700_000_000_000;
        let rendered = format_age(ts + 3 * 86_400_000, ts);
        assert!(!rendered.ends_with("ago"));
        assert_eq!(rendered.len(), "2023-11-14 22:13:20".len());
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let now = 1_700_000_000_000;
        assert_eq!(format_age(now, i64::MAX), "0s ago");
        assert_eq!(format_age(i64::MIN, i64::MAX), "0s ago");

        let ancient = format_age(now, i64::MIN);
        assert!(ancient.ends_with("h ago"), "{}", ancient);
        assert_eq!(ancient, format!("{}h ago", i64::MAX / 1000 / 3600));
    }

    #[test]
    fn report_lists_filtered_rows_newest_first() {
        colored::control::set_override(false);

        let mut store = EventStore::with_capacity(10);
        let now = 1_700_000_000_000;
        for (id, category, title) in [
            ("n1", Category::News, "Security Advisory Published"),
            ("m1", Category::Market, "Merger Talks Confirmed"),
            ("n2", Category::News, "Platform Launches New Features"),
            ("n3", Category::News, "Tech Giant Announces Major Update"),
        ] {
            store.insert(FeedEvent::new(id, category, now - 5_000, title, None).unwrap());
        }

        let status = StatusSnapshot { state: ConnectionState::Connected, last_error: None };
        let view = ReportView { category: Category::News, search: "", rows: 2 };
        let report = render_report(&status, &IngestStats::default(), &store, &view, now);

        assert!(report.contains("CONNECTED"));
        assert!(report.contains("Showing 2 of 3 matching in News Feed"));
        assert!(report.contains("News Feed 3"));
        let newest = report.find("Tech Giant").unwrap();
        let next = report.find("Platform Launches").unwrap();
        assert!(newest < next);
        assert!(!report.contains("Security Advisory"));
        assert!(!report.contains("Merger"));
        assert!(report.contains("(5s ago)"));
    }

    #[test]
    fn report_shows_last_error_and_empty_state() {
        colored::control::set_override(false);

        let status = StatusSnapshot {
            state: ConnectionState::Disconnected,
            last_error: Some("connection failed: refused".into()),
        };
        let view = ReportView { category: Category::All, search: "merger", rows: 10 };
        let report = render_report(&status, &IngestStats::default(), &EventStore::new(), &view, 0);

        assert!(report.contains("DISCONNECTED"));
        assert!(report.contains("last error: connection failed: refused"));
        assert!(report.contains("No events yet."));
        assert!(report.contains("\"merger\""));
    }
}
