//! Profit driver attribution.
//!
//! Splits a scenario's profit delta from expected into yield, price and cost
//! parts. The yield and price terms use the midpoint of the other factor, so
//! the three contributions always sum to the delta exactly.

use agro_core::{DriverFactor, ProfitDriver};

/// Each argument is `(scenario value, expected value)`. Ranked by absolute
/// contribution, largest first; ties keep the order yield, price, cost.
pub fn rank_drivers(yield_pair: (f64, f64), price_pair: (f64, f64), cost_pair: (f64, f64)) -> Vec<ProfitDriver> {
    let (y, ye) = yield_pair;
    let (p, pe) = price_pair;
    let (c, ce) = cost_pair;

    let mut drivers = vec![
        ProfitDriver {
            factor: DriverFactor::Yield,
            contribution: (y - ye) * (p + pe) / 2.0,
        },
        ProfitDriver {
            factor: DriverFactor::Price,
            contribution: (p - pe) * (y + ye) / 2.0,
        },
        ProfitDriver {
            factor: DriverFactor::Cost,
            contribution: -(c - ce),
        },
    ];

    // Stable sort keeps the tie order
    drivers.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    drivers
}
