use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use rusoto_ce::{
    CostExplorer, CostExplorerClient, DateInterval, GetCostAndUsageRequest,
    GetCostForecastRequest, GroupDefinition, MetricValue, ResultByTime,
};
use rusoto_core::Region;
use tracing::debug;

use crate::cost_report::{CostReport, ServiceCost};
use crate::error::CostNotifierError;
use crate::time_range::{DateRange, ReportWindow};

const DEFAULT_CURRENCY: &str = "USD";
const GRANULARITY: &str = "MONTHLY";
const SERVICE_DIMENSION: &str = "SERVICE";

/// Where cost figures come from. Implementations do not retry.
#[async_trait]
pub trait CostSource: Send + Sync {
    async fn fetch(&self, reference_date: NaiveDate) -> Result<CostReport, CostNotifierError>;
}

/// Cost metric as named by the two Cost Explorer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostMetric {
    Unblended,
    Blended,
    Amortized,
    NetUnblended,
}

impl CostMetric {
    pub fn usage_name(self) -> &'static str {
        match self {
            CostMetric::Unblended => "UnblendedCost",
            CostMetric::Blended => "BlendedCost",
            CostMetric::Amortized => "AmortizedCost",
            CostMetric::NetUnblended => "NetUnblendedCost",
        }
    }

    pub fn forecast_name(self) -> &'static str {
        match self {
            CostMetric::Unblended => "UNBLENDED_COST",
            CostMetric::Blended => "BLENDED_COST",
            CostMetric::Amortized => "AMORTIZED_COST",
            CostMetric::NetUnblended => "NET_UNBLENDED_COST",
        }
    }
}

impl Default for CostMetric {
    fn default() -> Self {
        CostMetric::Unblended
    }
}

impl FromStr for CostMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            CostMetric::Unblended,
            CostMetric::Blended,
            CostMetric::Amortized,
            CostMetric::NetUnblended,
        ]
        .iter()
        .copied()
        .find(|metric| metric.usage_name() == s)
        .ok_or_else(|| format!("unknown cost metric {:?}", s))
    }
}

impl fmt::Display for CostMetric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.usage_name())
    }
}

#[derive(Debug, PartialEq)]
struct UsageSummary {
    total: BigDecimal,
    currency: String,
    services: Vec<ServiceCost>,
    estimated: bool,
}

pub struct CostExplorerSource {
    client: CostExplorerClient,
    metric: CostMetric,
}

#[async_trait]
impl CostSource for CostExplorerSource {
    async fn fetch(&self, reference_date: NaiveDate) -> Result<CostReport, CostNotifierError> {
        let window = ReportWindow::try_from(reference_date)?;
        let results = self.cost_and_usage(&window.month_to_date).await?;
        let usage = self.aggregate_results(results)?;
        let forecast_cost = self.forecast(&window.forecast).await?;

        Ok(CostReport {
            period_start: window.month_to_date.start,
            period_end: window.month_to_date.end,
            actual_cost: usage.total,
            currency: usage.currency,
            forecast_cost,
            forecast_period_end: window.forecast_last_day(),
            services: usage.services,
            estimated: usage.estimated,
        })
    }
}

impl CostExplorerSource {
    /// Cost Explorer is only served from us-east-1.
    pub fn new(metric: CostMetric) -> Self {
        Self::new_with_client(CostExplorerClient::new(Region::UsEast1), metric)
    }

    pub fn new_with_client(client: CostExplorerClient, metric: CostMetric) -> Self {
        CostExplorerSource { client, metric }
    }

    async fn cost_and_usage(
        &self,
        range: &DateRange,
    ) -> Result<Vec<ResultByTime>, CostNotifierError> {
        let mut results = Vec::new();
        let mut next_page_token = None;
        loop {
            let response = self
                .client
                .get_cost_and_usage(GetCostAndUsageRequest {
                    time_period: date_interval(range),
                    granularity: Some(GRANULARITY.to_string()),
                    metrics: vec![self.metric.usage_name().to_string()],
                    group_by: Some(vec![GroupDefinition {
                        key: Some(SERVICE_DIMENSION.to_string()),
                        type_: Some("DIMENSION".to_string()),
                    }]),
                    next_page_token: next_page_token.take(),
                    ..Default::default()
                })
                .await?;
            results.extend(response.results_by_time.unwrap_or_default());
            match response.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }
        debug!(periods = results.len(), "fetched cost and usage");
        Ok(results)
    }

    async fn forecast(&self, range: &DateRange) -> Result<BigDecimal, CostNotifierError> {
        let response = self
            .client
            .get_cost_forecast(GetCostForecastRequest {
                time_period: date_interval(range),
                granularity: GRANULARITY.to_string(),
                metric: self.metric.forecast_name().to_string(),
                ..Default::default()
            })
            .await?;
        let total = response
            .total
            .ok_or_else(|| CostNotifierError::DataUnavailable("forecast has no total".to_string()))?;
        parse_amount(&total, "forecast")
    }

    fn aggregate_results(
        &self,
        results: Vec<ResultByTime>,
    ) -> Result<UsageSummary, CostNotifierError> {
        if results.is_empty() {
            return Err(CostNotifierError::DataUnavailable(
                "no cost and usage results for the period".to_string(),
            ));
        }
        let metric_name = self.metric.usage_name();
        let mut per_service = BTreeMap::<String, BigDecimal>::new();
        let mut currency = None;
        let mut estimated = false;

        for result in results {
            estimated |= result.estimated.unwrap_or(false);
            for group in result.groups.unwrap_or_default() {
                let service = group
                    .keys
                    .and_then(|keys| keys.into_iter().next())
                    .ok_or_else(|| {
                        CostNotifierError::DataUnavailable("group without a service key".to_string())
                    })?;
                let value = group
                    .metrics
                    .and_then(|mut metrics| metrics.remove(metric_name))
                    .ok_or_else(|| {
                        CostNotifierError::DataUnavailable(format!(
                            "{} missing for {}",
                            metric_name, service
                        ))
                    })?;
                let amount = parse_amount(&value, &service)?;
                if currency.is_none() {
                    currency = value.unit;
                }
                let entry = per_service.entry(service).or_insert_with(BigDecimal::zero);
                *entry += amount;
            }
        }

        let total = per_service
            .values()
            .fold(BigDecimal::zero(), |total, amount| total + amount);
        let mut services: Vec<ServiceCost> = per_service
            .into_iter()
            .map(|(service, amount)| ServiceCost { service, amount })
            .collect();
        // BTreeMap order makes ties fall back to the service name.
        services.sort_by(|a, b| b.amount.cmp(&a.amount));

        Ok(UsageSummary {
            total,
            currency: currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            services,
            estimated,
        })
    }
}

fn date_interval(range: &DateRange) -> DateInterval {
    DateInterval {
        start: range.start_param(),
        end: range.end_param(),
    }
}

fn parse_amount(value: &MetricValue, what: &str) -> Result<BigDecimal, CostNotifierError> {
    let amount = value
        .amount
        .as_deref()
        .ok_or_else(|| CostNotifierError::DataUnavailable(format!("no amount for {}", what)))?;
    BigDecimal::from_str(amount).map_err(|_| {
        CostNotifierError::DataUnavailable(format!("unreadable amount {:?} for {}", amount, what))
    })
}
