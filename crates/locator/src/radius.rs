//! Search radius and overfetch for a requested number of results.
//!
//! Sparse regions may hold fewer stations than requested inside a tight
//! radius, so larger requests search wider and ask the store for a multiple
//! of the requested rows. The multiple compensates for bounding-box corners
//! that lie outside the radius; it is a heuristic, not a guarantee.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fanout {
    pub radius_km: f64,
    pub overfetch_multiplier: usize,
}

impl Fanout {
    /// Number of candidate rows to request from the prefilter.
    pub fn candidate_limit(&self, limit: usize) -> usize {
        limit.saturating_mul(self.overfetch_multiplier)
    }
}

pub fn radius_km(limit: usize) -> f64 {
    match limit {
        0..=50 => 50.0,
        51..=150 => 120.0,
        _ => 250.0,
    }
}

pub fn overfetch_multiplier(limit: usize) -> usize {
    match limit {
        0..=50 => 5,
        51..=150 => 3,
        _ => 2,
    }
}

pub fn fanout(limit: usize) -> Fanout {
    Fanout {
        radius_km: radius_km(limit),
        overfetch_multiplier: overfetch_multiplier(limit),
    }
}
