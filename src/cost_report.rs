use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;

use crate::error::CostNotifierError;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCost {
    pub service: String,
    pub amount: BigDecimal,
}

/// Spend for the month-to-date window plus the provider's forecast to month end.
#[derive(Debug, Clone, PartialEq)]
pub struct CostReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub actual_cost: BigDecimal,
    pub currency: String,
    pub forecast_cost: BigDecimal,
    pub forecast_period_end: NaiveDate,
    /// Largest services first.
    pub services: Vec<ServiceCost>,
    pub estimated: bool,
}

impl CostReport {
    pub fn validate(&self) -> Result<(), CostNotifierError> {
        if self.period_end < self.period_start {
            return Err(CostNotifierError::InvalidReport(format!(
                "period ends {} before it starts {}",
                self.period_end, self.period_start
            )));
        }
        if self.actual_cost < BigDecimal::zero() {
            return Err(CostNotifierError::InvalidReport(format!(
                "negative actual cost {}",
                self.actual_cost
            )));
        }
        if self.forecast_cost < BigDecimal::zero() {
            return Err(CostNotifierError::InvalidReport(format!(
                "negative forecast cost {}",
                self.forecast_cost
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(CostNotifierError::InvalidReport(
                "missing currency".to_string(),
            ));
        }
        Ok(())
    }
}
