use crate::calibration::Prob3;
use crate::match_store::MoneylinePrices;

/// 1/price, or 0 for a non-positive price.
pub fn implied_probability(price: f64) -> f64 {
    if price > 0.0 { 1.0 / price } else { 0.0 }
}

/// Fair decimal price for a probability; `None` outside (0, 1].
pub fn fair_price(probability: f64) -> Option<f64> {
    (probability > 0.0 && probability <= 1.0).then(|| 1.0 / probability)
}

/// Expected value of a unit stake, as a percentage of the stake.
pub fn ev_percent(probability: f64, price: f64) -> f64 {
    (probability * price - 1.0) * 100.0
}

/// Profit on `stake` if the bet wins (stake excluded).
pub fn win_profit(stake: f64, price: f64) -> f64 {
    stake * (price - 1.0)
}

/// Sum of implied probabilities minus one.
pub fn overround(prices: &[f64]) -> f64 {
    prices.iter().map(|p| implied_probability(*p)).sum::<f64>() - 1.0
}

/// Implied three-way probabilities with the bookmaker margin removed.
pub fn no_vig_probabilities(prices: &MoneylinePrices) -> Prob3 {
    Prob3 {
        home: implied_probability(prices.home),
        draw: implied_probability(prices.draw),
        away: implied_probability(prices.away),
    }
    .normalized()
}

/// Prices a bookmaker with the given margin would quote for `p`.
pub fn priced_with_margin(p: Prob3, margin: f64) -> MoneylinePrices {
    let scale = 1.0 + margin.max(0.0);
    let price = |x: f64| fair_price(x * scale).unwrap_or(1.0).max(1.01);
    MoneylinePrices {
        home: price(p.home),
        draw: price(p.draw),
        away: price(p.away),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_even_at_implied_probability() {
        for price in [1.01, 1.5, 2.0, 3.75, 12.0, 101.0] {
            let ev = ev_percent(implied_probability(price), price);
            assert!(ev.abs() < 1e-9, "price {price} gave {ev}");
        }
    }

    #[test]
    fn ev_increases_with_probability() {
        let price = 2.4;
        let mut last = f64::NEG_INFINITY;
        for i in 1..20 {
            let ev = ev_percent(i as f64 / 20.0, price);
            assert!(ev > last);
            last = ev;
        }
    }

    #[test]
    fn non_positive_price_has_no_implied_probability() {
        assert_eq!(implied_probability(0.0), 0.0);
        assert_eq!(implied_probability(-2.0), 0.0);
    }

    #[test]
    fn removes_margin() {
        let prices = MoneylinePrices {
            home: 1.9,
            draw: 3.4,
            away: 4.2,
        };
        assert!(overround(&[prices.home, prices.draw, prices.away]) > 0.0);
        let p = no_vig_probabilities(&prices);
        assert!((p.sum() - 1.0).abs() < 1e-12);
        assert!(p.home > p.draw && p.draw > p.away);
    }
}
