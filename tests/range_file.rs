//! Persisted date window: load, save, and fallbacks.

use std::path::PathBuf;

use chrono::NaiveDate;
use spirestats::error::StatsError;
use spirestats::range::{DateWindow, RangeCache, parse_date_range};

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("spirestats-test-range-{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn missing_file_is_all_time() {
    let dir = test_dir("missing");
    let mut range = RangeCache::new(dir.join("range.json"));
    assert!(!range.is_loaded());
    let window = range.load().await;
    assert!(window.is_all_time());
    assert!(range.is_loaded());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn corrupt_file_is_all_time() {
    let dir = test_dir("corrupt");
    let path = dir.join("range.json");
    for content in [
        "not json",
        r#"{"start_date": "2023-01-01", "end_date": null}"#,
        r#"{"start_date": "2024/01/01", "end_date": "2023/01/01"}"#,
        "42",
    ] {
        std::fs::write(&path, content).unwrap();
        let mut range = RangeCache::new(path.clone());
        assert!(range.load().await.is_all_time(), "content: {content}");
        assert!(range.is_loaded());
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn update_persists_calendar_dates() {
    let dir = test_dir("update");
    let path = dir.join("nested").join("range.json");
    let window = parse_date_range("2023/06-2023/08").unwrap();

    let mut range = RangeCache::new(path.clone());
    range.update(window).await.unwrap();
    assert_eq!(range.window(), window);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["start_date"], "2023/06/01");
    assert_eq!(raw["end_date"], "2023/08/31");

    let mut reloaded = RangeCache::new(path);
    assert_eq!(reloaded.load().await, window);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn open_ended_round_trip_keeps_nulls() {
    let dir = test_dir("open");
    let path = dir.join("range.json");
    let window = DateWindow::from_dates(NaiveDate::from_ymd_opt(2022, 3, 4), None);

    let mut range = RangeCache::new(path.clone());
    range.update(window).await.unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["end_date"].is_null());

    let mut reloaded = RangeCache::new(path);
    assert_eq!(reloaded.load().await, window);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn update_rejects_reversed_window() {
    let dir = test_dir("reversed");
    let mut range = RangeCache::new(dir.join("range.json"));
    let reversed = DateWindow {
        start: parse_date_range("2024").unwrap().start,
        end: parse_date_range("2023").unwrap().end,
    };
    assert!(matches!(
        range.update(reversed).await,
        Err(StatsError::RangeOrder { .. })
    ));
    assert!(!range.is_loaded());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn format_and_order_errors_have_distinct_messages() {
    let format = parse_date_range("last tuesday").unwrap_err();
    let order = parse_date_range("2023/05-2023/04").unwrap_err();
    assert!(matches!(format, StatsError::RangeFormat { .. }));
    assert!(matches!(order, StatsError::RangeOrder { .. }));
    assert_ne!(format.user_message(), order.user_message());
    assert!(!format.is_degradable());
    assert!(!order.is_degradable());
}
