use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};

use crate::cost_report::CostReport;
use crate::error::CostNotifierError;
use crate::notification::{NotificationMessage, WebhookUrl};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct ReportFormatter {
    destination: WebhookUrl,
    top_services: usize,
    minimum_listed: BigDecimal,
}

impl ReportFormatter {
    pub fn new(destination: WebhookUrl, top_services: usize) -> Self {
        ReportFormatter {
            destination,
            top_services,
            minimum_listed: BigDecimal::new(1.into(), 2),
        }
    }

    pub fn format(&self, report: &CostReport) -> Result<NotificationMessage, CostNotifierError> {
        report.validate()?;
        Ok(NotificationMessage {
            text: self.render(report),
            destination: self.destination.clone(),
        })
    }

    fn render(&self, report: &CostReport) -> String {
        let currency = report.currency.trim();
        let cost_label = if same_month(report.period_start, report.period_end) {
            "Month-to-date cost"
        } else {
            "Previous month cost"
        };

        let mut text = format!(
            "AWS cost report ({})\n",
            report.period_end.format(DATE_FORMAT)
        );
        text.push_str(&format!(
            "Period: {} to {}\n",
            report.period_start.format(DATE_FORMAT),
            last_billed_day(report).format(DATE_FORMAT)
        ));
        text.push_str(&format!(
            "{}: {} {}{}\n",
            cost_label,
            render_amount(&report.actual_cost),
            currency,
            if report.estimated { " (estimated)" } else { "" }
        ));
        text.push_str(&format!(
            "Forecast through {}: {} {}",
            report.forecast_period_end.format(DATE_FORMAT),
            render_amount(&report.forecast_cost),
            currency
        ));

        let listed: Vec<_> = report
            .services
            .iter()
            .filter(|service| service.amount > self.minimum_listed)
            .take(self.top_services)
            .collect();
        if !listed.is_empty() {
            text.push_str("\nTop services:");
            for service in listed {
                text.push_str(&format!(
                    "\n• {}: {} {}",
                    service.service,
                    render_amount(&service.amount),
                    currency
                ));
            }
        }
        text
    }
}

// `period_end` is exclusive.
fn last_billed_day(report: &CostReport) -> NaiveDate {
    report
        .period_end
        .pred_opt()
        .filter(|day| *day >= report.period_start)
        .unwrap_or(report.period_start)
}

fn same_month(start: NaiveDate, end_exclusive: NaiveDate) -> bool {
    start.year() == end_exclusive.year() && start.month() == end_exclusive.month()
}

fn render_amount(amount: &BigDecimal) -> String {
    amount.round(2).with_scale(2).to_string()
}

#[cfg(test)]
mod tests {
    use crate::cost_report::{CostReport, ServiceCost};
    use crate::error::ErrorKind;
    use crate::notification::WebhookUrl;
    use crate::report_formatter::{render_amount, ReportFormatter};
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn decimal(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn formatter(top_services: usize) -> ReportFormatter {
        ReportFormatter::new(
            WebhookUrl::parse("https://hooks.slack.com/services/T/B/X").unwrap(),
            top_services,
        )
    }

    fn march_report() -> CostReport {
        CostReport {
            period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            actual_cost: decimal("120.50"),
            currency: "USD".to_string(),
            forecast_cost: decimal("300.00"),
            forecast_period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            services: vec![
                ServiceCost {
                    service: "Amazon Elastic Compute Cloud - Compute".to_string(),
                    amount: decimal("80.125"),
                },
                ServiceCost {
                    service: "Amazon Simple Storage Service".to_string(),
                    amount: decimal("30.25"),
                },
                ServiceCost {
                    service: "AWS Lambda".to_string(),
                    amount: decimal("10.12"),
                },
                ServiceCost {
                    service: "AWS Key Management Service".to_string(),
                    amount: decimal("0.005"),
                },
            ],
            estimated: false,
        }
    }

    #[test]
    fn test_format() {
        let message = formatter(10).format(&march_report()).unwrap();
        assert_eq!(
            message.text,
            "AWS cost report (2024-03-15)\n\
             Period: 2024-03-01 to 2024-03-14\n\
             Month-to-date cost: 120.50 USD\n\
             Forecast through 2024-03-31: 300.00 USD\n\
             Top services:\n\
             • Amazon Elastic Compute Cloud - Compute: 80.13 USD\n\
             • Amazon Simple Storage Service: 30.25 USD\n\
             • AWS Lambda: 10.12 USD"
        );
        assert_eq!(
            message.destination,
            WebhookUrl::parse("https://hooks.slack.com/services/T/B/X").unwrap()
        );
    }

    #[test]
    fn test_format_is_deterministic() {
        let formatter = formatter(10);
        let first = formatter.format(&march_report()).unwrap();
        let second = formatter.format(&march_report()).unwrap();
        assert_eq!(first.text.as_bytes(), second.text.as_bytes());
    }

    #[test]
    fn test_format_limits_and_omits_services() {
        let text = formatter(1).format(&march_report()).unwrap().text;
        assert!(text.contains("• Amazon Elastic Compute Cloud - Compute"));
        assert!(!text.contains("AWS Lambda"));

        let text = formatter(0).format(&march_report()).unwrap().text;
        assert!(!text.contains("Top services"));
        assert!(text.ends_with("Forecast through 2024-03-31: 300.00 USD"));
    }

    #[test]
    fn test_format_marks_estimated_spend() {
        let report = CostReport {
            estimated: true,
            ..march_report()
        };
        let text = formatter(10).format(&report).unwrap().text;
        assert!(text.contains("Month-to-date cost: 120.50 USD (estimated)"));
    }

    #[test]
    fn test_format_on_first_of_month_reports_previous_month() {
        let report = CostReport {
            period_start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            ..march_report()
        };
        let text = formatter(0).format(&report).unwrap().text;
        assert!(text.starts_with("AWS cost report (2024-03-01)\n"));
        assert!(text.contains("Period: 2024-02-01 to 2024-02-29\n"));
        assert!(text.contains("Previous month cost: 120.50 USD\n"));
        assert!(!text.contains("Month-to-date"));
    }

    #[test]
    fn test_format_single_day_period() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let report = CostReport {
            period_start: day,
            period_end: day,
            ..march_report()
        };
        let text = formatter(0).format(&report).unwrap().text;
        assert!(text.contains("Period: 2024-03-02 to 2024-03-02\n"));
    }

    #[test]
    fn test_minimum_listed_amount_is_one_cent() {
        assert_eq!(formatter(10).minimum_listed, BigDecimal::from_str("0.01").unwrap());
    }

    #[test]
    fn test_format_rejects_inverted_period() {
        let report = CostReport {
            period_start: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            ..march_report()
        };
        let result = formatter(10).format(&report);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidReport);
    }

    #[test]
    fn test_format_rejects_negative_costs() {
        let report = CostReport {
            actual_cost: decimal("-0.01"),
            ..march_report()
        };
        assert_eq!(
            formatter(10).format(&report).unwrap_err().kind(),
            ErrorKind::InvalidReport
        );

        let report = CostReport {
            forecast_cost: decimal("-5"),
            ..march_report()
        };
        assert_eq!(
            formatter(10).format(&report).unwrap_err().kind(),
            ErrorKind::InvalidReport
        );
    }

    #[test]
    fn test_render_amount() {
        assert_eq!(render_amount(&decimal("300")), "300.00");
        assert_eq!(render_amount(&decimal("120.5")), "120.50");
        assert_eq!(render_amount(&decimal("0.004")), "0.00");
        assert_eq!(render_amount(&decimal("12.3456789")), "12.35");
    }
}
