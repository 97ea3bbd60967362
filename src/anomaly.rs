use serde::Serialize;

/// One bookmaker's decimal price for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub source: String,
    pub price: f64,
}

impl PriceQuote {
    pub fn new(source: impl Into<String>, price: f64) -> Self {
        Self {
            source: source.into(),
            price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAnomaly {
    pub avg: f64,
    pub best: f64,
    pub best_source: String,
    pub pct_better: f64,
    pub is_anomaly: bool,
    /// Best price first.
    pub quotes: Vec<PriceQuote>,
}

#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    pub threshold_pct: f64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            threshold_pct: 25.0,
        }
    }
}

impl AnomalyDetector {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    /// Compare the best quote with the consensus mean. `None` ("no signal")
    /// below two usable quotes.
    pub fn detect(&self, quotes: &[PriceQuote]) -> Option<PriceAnomaly> {
        let mut quotes: Vec<PriceQuote> = quotes
            .iter()
            .filter(|q| q.price.is_finite() && q.price > 0.0)
            .cloned()
            .collect();
        if quotes.len() < 2 {
            return None;
        }
        quotes.sort_by(|a, b| b.price.total_cmp(&a.price));

        let avg = quotes.iter().map(|q| q.price).sum::<f64>() / quotes.len() as f64;
        let best = quotes[0].price;
        let pct_better = (best - avg) / avg * 100.0;
        Some(PriceAnomaly {
            avg,
            best,
            best_source: quotes[0].source.clone(),
            pct_better,
            is_anomaly: pct_better >= self.threshold_pct,
            quotes,
        })
    }
}
