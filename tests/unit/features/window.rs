//! Unit tests for the rolling feature window

use candlecast::features::{preprocess_window, RollingWindow, SEQ_LEN};
use candlecast::models::PriceCandle;
use chrono::{Duration, TimeZone, Utc};

fn candle(i: usize) -> PriceCandle {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    PriceCandle::new(
        base + Duration::minutes(i as i64),
        100.0 + i as f64,
        110.0 + i as f64,
        90.0 + i as f64,
        105.0 + i as f64,
        10.0 * (i + 1) as f64,
    )
}

#[test]
fn test_window_fills_at_seq_len() {
    let mut window = RollingWindow::new();
    for i in 0..SEQ_LEN - 1 {
        assert!(window.push(candle(i)));
        assert!(window.feature_vector().is_none());
    }
    assert!(window.push(candle(SEQ_LEN - 1)));

    let features = window.feature_vector().unwrap();
    assert_eq!(features.len(), SEQ_LEN * 5);
    assert!(features.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn test_window_slides() {
    let mut window = RollingWindow::new();
    for i in 0..SEQ_LEN + 10 {
        window.push(candle(i));
    }
    assert_eq!(window.len(), SEQ_LEN);
    assert_eq!(window.latest_time(), Some(candle(SEQ_LEN + 9).open_time));
}

#[test]
fn test_duplicate_batch_is_a_noop() {
    let mut window = RollingWindow::new();
    for i in 0..SEQ_LEN {
        window.push(candle(i));
    }
    let before = window.feature_vector().unwrap();

    // Redelivery of an already-applied batch.
    for i in 0..SEQ_LEN {
        assert!(!window.push(candle(i)));
    }
    assert_eq!(window.feature_vector().unwrap(), before);
}

#[test]
fn test_seed_keeps_newest_tail() {
    let mut window = RollingWindow::new();
    let history: Vec<PriceCandle> = (0..SEQ_LEN * 2).map(candle).collect();
    window.seed(&history);
    assert!(window.is_full());
    assert_eq!(window.latest_time(), Some(candle(SEQ_LEN * 2 - 1).open_time));
}

#[test]
fn test_preprocess_min_max_scaling() {
    let candles: Vec<PriceCandle> = (0..3).map(candle).collect();
    let features = preprocess_window(&candles);
    assert_eq!(features.len(), 15);

    // First row holds every column minimum, last row every maximum.
    assert!(features[..5].iter().all(|v| *v == 0.0));
    assert!(features[10..].iter().all(|v| *v == 1.0));
    // Middle row of a linear series sits halfway.
    assert!(features[5..10].iter().all(|v| (*v - 0.5).abs() < 1e-9));
}

#[test]
fn test_preprocess_constant_column_scales_to_zero() {
    let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let candles = vec![
        PriceCandle::new(t, 1.0, 2.0, 0.5, 1.5, 7.0),
        PriceCandle::new(t + Duration::minutes(1), 2.0, 3.0, 1.5, 2.5, 7.0),
    ];
    let features = preprocess_window(&candles);
    // Volume column (index 4 of each row) is constant.
    assert_eq!(features[4], 0.0);
    assert_eq!(features[9], 0.0);
}
