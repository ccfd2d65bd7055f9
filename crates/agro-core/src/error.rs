use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A yield sub-model that could not run, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: String,
    pub missing_features: Vec<String>,
    pub reason: String,
}

impl fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.missing_features.is_empty() {
            write!(f, "{} ({})", self.model, self.reason)
        } else {
            write!(
                f,
                "{} ({}; missing {})",
                self.model,
                self.reason,
                self.missing_features.join(", ")
            )
        }
    }
}

/// A planned operation whose unit price could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpricedOperation {
    pub operation: String,
    pub category: String,
}

impl fmt::Display for UnpricedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.operation, self.category)
    }
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data for {}: {detail}", .fields.join(", "))]
    InsufficientData { fields: Vec<String>, detail: String },

    #[error("No yield sub-model could run: {}", join_display(.failures))]
    ModelUnavailable { failures: Vec<ModelFailure> },

    #[error("{operation} exceeded its {budget_ms} ms budget")]
    ForecastTimeout { operation: String, budget_ms: u64 },

    #[error("No unit price for: {}", join_display(.operations))]
    IncompleteCostInput { operations: Vec<UnpricedOperation> },

    #[error(
        "Scenario ordering violated: pessimistic={pessimistic:.2}, expected={expected:.2}, optimistic={optimistic:.2}"
    )]
    ScenarioOrdering {
        pessimistic: f64,
        expected: f64,
        optimistic: f64,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Data source error: {0}")]
    DataSource(String),
}

pub type ForecastResult<T> = Result<T, ForecastError>;

/// Coarse error tag for collaborators that map errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InsufficientData,
    ModelUnavailable,
    ForecastTimeout,
    IncompleteCostInput,
    ScenarioOrdering,
    NotFound,
    DataSource,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::ForecastTimeout => "forecast_timeout",
            ErrorKind::IncompleteCostInput => "incomplete_cost_input",
            ErrorKind::ScenarioOrdering => "scenario_ordering",
            ErrorKind::NotFound => "not_found",
            ErrorKind::DataSource => "data_source",
        }
    }
}

impl ForecastError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ForecastError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn insufficient<S: Into<String>>(
        fields: impl IntoIterator<Item = S>,
        detail: impl Into<String>,
    ) -> Self {
        ForecastError::InsufficientData {
            fields: fields.into_iter().map(Into::into).collect(),
            detail: detail.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ForecastError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::InvalidInput { .. } => ErrorKind::InvalidInput,
            ForecastError::InsufficientData { .. } => ErrorKind::InsufficientData,
            ForecastError::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
            ForecastError::ForecastTimeout { .. } => ErrorKind::ForecastTimeout,
            ForecastError::IncompleteCostInput { .. } => ErrorKind::IncompleteCostInput,
            ForecastError::ScenarioOrdering { .. } => ErrorKind::ScenarioOrdering,
            ForecastError::NotFound { .. } => ErrorKind::NotFound,
            ForecastError::DataSource(_) => ErrorKind::DataSource,
        }
    }

    /// Message suitable for showing to a farm manager, one per error kind.
    pub fn user_message(&self) -> String {
        match self {
            ForecastError::InvalidInput { field, reason } => {
                format!("The value for '{}' is not usable ({}). Correct the record and try again.", field, reason)
            }
            ForecastError::InsufficientData { fields, .. } => format!(
                "Not enough history to forecast. Add more recent records for: {}.",
                fields.join(", ")
            ),
            ForecastError::ModelUnavailable { failures } => {
                let mut missing: Vec<&str> = Vec::new();
                for feature in failures.iter().flat_map(|f| f.missing_features.iter()) {
                    if !missing.contains(&feature.as_str()) {
                        missing.push(feature);
                    }
                }
                if missing.is_empty() {
                    format!(
                        "No yield model could run for this field. Reasons: {}.",
                        failures
                            .iter()
                            .map(|f| format!("{} ({})", f.model, f.reason))
                            .collect::<Vec<_>>()
                            .join("; ")
                    )
                } else {
                    format!(
                        "No yield model could run for this field. Missing inputs: {}.",
                        missing.join(", ")
                    )
                }
            }
            ForecastError::ForecastTimeout { operation, .. } => format!(
                "The {} took too long to compute. Try again, or narrow the request.",
                operation
            ),
            ForecastError::IncompleteCostInput { operations } => format!(
                "Enter a unit price (or a category default) for: {}.",
                join_display(operations)
            ),
            ForecastError::ScenarioOrdering { .. } => {
                "Scenario figures are inconsistent; treat this forecast with caution.".to_string()
            }
            ForecastError::NotFound { entity, id } => {
                format!("No {} with id '{}' exists.", entity, id)
            }
            ForecastError::DataSource(_) => {
                "Reference data could not be loaded right now. Try again later.".to_string()
            }
        }
    }
}
