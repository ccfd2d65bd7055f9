//! Cost Estimator
//!
//! Deterministic season cost: the sum of quantity x unit price over planned
//! operations. Quantities are per hectare, matching yield in t/ha.
//!
//! Unit prices resolve in order: the price agreed on the operation, the
//! season's assumption for its input category, then the category default.

use agro_core::{
    CostEstimate, CostLine, ForecastError, ForecastResult, InputPriceAssumptions, PlannedOperation,
    PriceSource, UnpricedOperation,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn resolve_price(
    operation: &PlannedOperation,
    assumptions: &InputPriceAssumptions,
) -> Option<(Decimal, PriceSource)> {
    operation
        .unit_price
        .map(|p| (p, PriceSource::Operation))
        .or_else(|| {
            assumptions
                .prices
                .get(&operation.category)
                .map(|p| (*p, PriceSource::Assumption))
        })
        .or_else(|| {
            assumptions
                .defaults
                .get(&operation.category)
                .map(|p| (*p, PriceSource::CategoryDefault))
        })
}

/// Cost of every planned operation. Fails listing every operation whose price
/// cannot be resolved, or on a negative quantity or price.
pub fn estimate(
    operations: &[PlannedOperation],
    assumptions: &InputPriceAssumptions,
) -> ForecastResult<CostEstimate> {
    let mut lines = Vec::with_capacity(operations.len());
    let mut unpriced = Vec::new();

    for operation in operations {
        if operation.quantity < Decimal::ZERO {
            return Err(ForecastError::invalid(
                format!("operation.{}.quantity", operation.name),
                format!("{} is negative", operation.quantity),
            ));
        }

        let Some((unit_price, price_source)) = resolve_price(operation, assumptions) else {
            unpriced.push(UnpricedOperation {
                operation: operation.name.clone(),
                category: operation.category.clone(),
            });
            continue;
        };
        if unit_price < Decimal::ZERO {
            return Err(ForecastError::invalid(
                format!("operation.{}.unit_price", operation.name),
                format!("{} is negative", unit_price),
            ));
        }

        lines.push(CostLine {
            operation: operation.name.clone(),
            category: operation.category.clone(),
            quantity: operation.quantity,
            unit_price,
            price_source,
            cost: operation.quantity * unit_price,
        });
    }

    if !unpriced.is_empty() {
        tracing::warn!("{} planned operation(s) have no resolvable unit price", unpriced.len());
        return Err(ForecastError::IncompleteCostInput { operations: unpriced });
    }

    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    for line in &lines {
        *by_category.entry(line.category.clone()).or_insert(Decimal::ZERO) += line.cost;
    }
    let total: Decimal = lines.iter().map(|l| l.cost).sum();

    tracing::debug!("Estimated cost {} over {} operations", total, lines.len());

    Ok(CostEstimate {
        total,
        lines,
        by_category,
    })
}
