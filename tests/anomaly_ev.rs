use matchday_edge::anomaly::{AnomalyDetector, PriceQuote};
use matchday_edge::calibration::Prob3;
use matchday_edge::ev::{
    ev_percent, fair_price, implied_probability, no_vig_probabilities, overround,
    priced_with_margin, win_profit,
};
use matchday_edge::match_store::MoneylinePrices;

fn quotes(prices: &[f64]) -> Vec<PriceQuote> {
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| PriceQuote::new(format!("book{i}"), *p))
        .collect()
}

#[test]
fn outlier_price_is_flagged() {
    let a = AnomalyDetector::default()
        .detect(&quotes(&[2.0, 2.0, 2.0, 3.0]))
        .expect("enough quotes");
    assert!((a.avg - 2.25).abs() < 1e-12);
    assert_eq!(a.best, 3.0);
    assert_eq!(a.best_source, "book3");
    assert!((a.pct_better - 100.0 / 3.0).abs() < 1e-9);
    assert!(a.is_anomaly);
    assert_eq!(a.quotes[0].price, 3.0);
}

#[test]
fn tight_market_is_not_an_anomaly() {
    let a = AnomalyDetector::default()
        .detect(&quotes(&[2.0, 2.1]))
        .expect("enough quotes");
    assert!(!a.is_anomaly);
    assert!(a.pct_better < 25.0);
}

#[test]
fn fewer_than_two_usable_quotes_is_no_signal() {
    let detector = AnomalyDetector::default();
    assert!(detector.detect(&[]).is_none());
    assert!(detector.detect(&quotes(&[2.5])).is_none());
    assert!(detector.detect(&quotes(&[2.5, f64::NAN, -1.0])).is_none());
}

#[test]
fn threshold_is_inclusive() {
    // avg 2.0, best 2.5: exactly 25% better.
    let a = AnomalyDetector::new(25.0)
        .detect(&quotes(&[2.5, 1.5]))
        .expect("enough quotes");
    assert!((a.pct_better - 25.0).abs() < 1e-9);
    assert!(a.is_anomaly);
}

#[test]
fn ev_is_zero_at_the_implied_probability_and_grows_with_it() {
    let price = 2.5;
    assert!(ev_percent(implied_probability(price), price).abs() < 1e-9);
    assert!((ev_percent(0.5, 2.5) - 25.0).abs() < 1e-9);
    assert!(ev_percent(0.3, 2.5) < 0.0);

    let mut last = f64::NEG_INFINITY;
    for p in [0.1, 0.2, 0.4, 0.6, 0.8] {
        let ev = ev_percent(p, price);
        assert!(ev > last);
        last = ev;
    }
}

#[test]
fn price_helpers() {
    assert_eq!(implied_probability(0.0), 0.0);
    assert_eq!(fair_price(0.25), Some(4.0));
    assert_eq!(fair_price(0.0), None);
    assert_eq!(fair_price(1.2), None);
    assert!((win_profit(10.0, 2.75) - 17.5).abs() < 1e-12);
    assert!((overround(&[2.0, 2.0]) - 0.0).abs() < 1e-12);
    assert!(overround(&[1.9, 3.4, 4.2]) > 0.0);
}

#[test]
fn margin_round_trips_through_no_vig() {
    let fair = Prob3 {
        home: 0.5,
        draw: 0.3,
        away: 0.2,
    };
    let prices = priced_with_margin(fair, 0.05);
    assert!(prices.is_valid());
    assert!(overround(&[prices.home, prices.draw, prices.away]) > 0.04);
    let back = no_vig_probabilities(&prices);
    assert!((back.home - 0.5).abs() < 1e-9);
    assert!((back.draw - 0.3).abs() < 1e-9);
    assert!((back.away - 0.2).abs() < 1e-9);

    let flat = no_vig_probabilities(&MoneylinePrices {
        home: 3.0,
        draw: 3.0,
        away: 3.0,
    });
    assert!((flat.sum() - 1.0).abs() < 1e-12);
}
