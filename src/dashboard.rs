//! Sales-forecast dashboard data layer.
//!
//! Typed access to the two remote endpoints (forecast retrieval and
//! retrain trigger) plus the pure derivations the dashboard renders: KPI
//! figures, recent-sales rows with day-over-day trend, and forecast rows
//! joined with restock recommendations. Chart and DOM concerns stay with
//! the presentation layer; this module stops at ready-to-render data.
//!
//! Forecast requests carry a monotonic sequence number. A response is only
//! applied if its sequence is the latest issued, so a slow response can
//! never overwrite the result of a newer request.

use chrono::{Duration, NaiveDate};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Forecast rows are suppressed in the UI until this many historical
/// points exist.
pub const MIN_HISTORY_FOR_FORECAST: usize = 30;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("forecast service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("forecast service returned {status}: {message}")]
    Upstream { status: u16, message: String },
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct HistoricalPoint {
    pub date: String,
    #[serde(default)]
    pub actual: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct ForecastPoint {
    pub date: String,
    #[serde(default)]
    pub predicted: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct Restock {
    #[serde(default)]
    pub sku: String,
    pub product_name: String,
}

/// Wire shape of the forecast-retrieval endpoint. Missing sections
/// deserialize as empty rather than failing the whole response.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct ForecastResponse {
    #[serde(default)]
    pub historical: Vec<HistoricalPoint>,
    #[serde(default)]
    pub forecast: Vec<ForecastPoint>,
    #[serde(default)]
    pub restock_recommendations: HashMap<String, Restock>,
}

#[derive(Clone, Debug)]
pub struct ForecastQuery {
    pub horizon: u32,
    pub force: bool,
    pub product_id: Option<String>,
    pub demo: bool,
}

impl Default for ForecastQuery {
    fn default() -> Self {
        ForecastQuery {
            horizon: 7,
            force: true,
            product_id: None,
            demo: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RetrainRequest {
    pub days: u32,
    pub horizon: u32,
}

#[derive(Deserialize, Debug)]
pub struct RetrainResponse {
    pub run_id: Option<String>,
}

/// Error payload shape the forecast service uses; any of the fields may
/// carry the human-readable message.
#[derive(Deserialize)]
struct UpstreamError {
    details: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

/// HTTP client for the forecast service. Requests are independent and are
/// not retried; failures surface to the caller.
pub struct ForecastClient {
    client: reqwest::Client,
    base_url: String,
}

impl ForecastClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        ForecastClient {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_forecast(
        &self,
        query: &ForecastQuery,
    ) -> Result<ForecastResponse, DashboardError> {
        let mut params: Vec<(&str, String)> = vec![("horizon", query.horizon.to_string())];
        if query.force {
            params.push(("force", "1".to_string()));
        }
        if query.demo {
            params.push(("demo", "1".to_string()));
        }
        if let Some(product_id) = &query.product_id {
            params.push(("product_id", product_id.clone()));
        }

        let response = self
            .client
            .get(format!("{}/api/forecast/", self.base_url))
            .query(&params)
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn trigger_retrain(
        &self,
        request: &RetrainRequest,
    ) -> Result<RetrainResponse, DashboardError> {
        let response = self
            .client
            .post(format!("{}/api/forecast/retrain/", self.base_url))
            .json(request)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DashboardError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<UpstreamError>(&body)
                .ok()
                .and_then(|e| e.details.or(e.error).or(e.message))
                .unwrap_or_else(|| status.to_string());
            warn!("forecast service error {}: {}", status.as_u16(), message);
            return Err(DashboardError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

/// Latest applied forecast data plus the request sequence counter.
#[derive(Default)]
pub struct DashboardState {
    issued: u64,
    latest: Option<ForecastResponse>,
}

impl DashboardState {
    /// Allocate the sequence number for a request about to be issued.
    pub fn begin_request(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Apply a response if it belongs to the latest issued request.
    /// Returns false (and leaves state untouched) for stale responses.
    pub fn apply_response(&mut self, seq: u64, response: ForecastResponse) -> bool {
        if seq != self.issued {
            warn!("discarding stale forecast response (seq {} < {})", seq, self.issued);
            return false;
        }
        self.latest = Some(response);
        true
    }

    pub fn latest(&self) -> Option<&ForecastResponse> {
        self.latest.as_ref()
    }
}

#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct Kpis {
    pub last_actual: f64,
    pub next_forecast: f64,
    pub pct_change: f64,
}

/// Headline figures: most recent actual, first predicted value, and the
/// percentage change of the average predicted value over the average of
/// the last 7 actuals (0 when there is no baseline).
pub fn kpis(historical: &[HistoricalPoint], forecast: &[ForecastPoint]) -> Kpis {
    let last_actual = historical.last().map_or(0.0, |h| h.actual);
    let next_forecast = forecast.first().map_or(0.0, |f| f.predicted);

    let tail = &historical[historical.len().saturating_sub(7)..];
    let avg_last7 = if tail.is_empty() {
        0.0
    } else {
        tail.iter().map(|h| h.actual).sum::<f64>() / tail.len() as f64
    };
    let avg_next = if forecast.is_empty() {
        0.0
    } else {
        forecast.iter().map(|f| f.predicted).sum::<f64>() / forecast.len() as f64
    };

    let pct_change = if avg_last7 != 0.0 {
        (avg_next - avg_last7) / avg_last7 * 100.0
    } else {
        0.0
    };

    Kpis {
        last_actual,
        next_forecast,
        pct_change,
    }
}

#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct RecentRow {
    pub date: String,
    pub actual: f64,
    /// Difference from the previous calendar day's actual; 0 when that day
    /// is absent from the series.
    pub trend: f64,
}

/// Truncate a date string to its `YYYY-MM-DD` prefix.
fn iso_date(date: &str) -> &str {
    date.get(..10).unwrap_or(date)
}

/// The last 14 historical points, newest first, each with its
/// day-over-day trend.
pub fn recent_sales(historical: &[HistoricalPoint]) -> Vec<RecentRow> {
    let by_date: HashMap<&str, f64> = historical
        .iter()
        .map(|h| (iso_date(&h.date), h.actual))
        .collect();

    historical
        .iter()
        .rev()
        .take(14)
        .map(|h| {
            let date = iso_date(&h.date);
            let trend = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .ok()
                .map(|d| d - Duration::days(1))
                .and_then(|prev| by_date.get(prev.format("%Y-%m-%d").to_string().as_str()).copied())
                .map_or(0.0, |prev_actual| h.actual - prev_actual);
            RecentRow {
                date: date.to_string(),
                actual: h.actual,
                trend,
            }
        })
        .collect()
}

#[derive(Clone, Serialize, Debug)]
pub struct ForecastRow {
    pub date: String,
    pub predicted: f64,
    pub restock: Option<Restock>,
}

/// One table row per forecast point, joined with the restock
/// recommendation for that date when one exists.
pub fn forecast_rows(
    forecast: &[ForecastPoint],
    restock: &HashMap<String, Restock>,
) -> Vec<ForecastRow> {
    forecast
        .iter()
        .map(|f| {
            let date = iso_date(&f.date).to_string();
            ForecastRow {
                restock: restock.get(&date).cloned(),
                predicted: f.predicted,
                date,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(points: &[(&str, f64)]) -> Vec<HistoricalPoint> {
        points
            .iter()
            .map(|(d, a)| HistoricalPoint {
                date: d.to_string(),
                actual: *a,
            })
            .collect()
    }

    fn fore(points: &[(&str, f64)]) -> Vec<ForecastPoint> {
        points
            .iter()
            .map(|(d, p)| ForecastPoint {
                date: d.to_string(),
                predicted: *p,
            })
            .collect()
    }

    #[test]
    fn kpis_on_empty_data_are_zero() {
        let k = kpis(&[], &[]);
        assert_eq!(k, Kpis { last_actual: 0.0, next_forecast: 0.0, pct_change: 0.0 });
    }

    #[test]
    fn kpis_compare_forecast_average_to_last_week() {
        let historical = hist(&[
            ("2026-08-20", 100.0),
            ("2026-08-21", 100.0),
            ("2026-08-22", 100.0),
            ("2026-08-23", 100.0),
            ("2026-08-24", 100.0),
            ("2026-08-25", 100.0),
            ("2026-08-26", 100.0),
        ]);
        let forecast = fore(&[("2026-08-27", 110.0), ("2026-08-28", 130.0)]);

        let k = kpis(&historical, &forecast);
        assert_eq!(k.last_actual, 100.0);
        assert_eq!(k.next_forecast, 110.0);
        assert!((k.pct_change - 20.0).abs() < 1e-9);
    }

    #[test]
    fn kpis_average_uses_at_most_seven_actuals() {
        // Older points beyond the 7-day window must not affect the baseline.
        let mut historical = hist(&[("2026-08-01", 1_000_000.0)]);
        historical.extend(hist(&[
            ("2026-08-20", 50.0),
            ("2026-08-21", 50.0),
            ("2026-08-22", 50.0),
            ("2026-08-23", 50.0),
            ("2026-08-24", 50.0),
            ("2026-08-25", 50.0),
            ("2026-08-26", 50.0),
        ]));
        let forecast = fore(&[("2026-08-27", 75.0)]);

        let k = kpis(&historical, &forecast);
        assert!((k.pct_change - 50.0).abs() < 1e-9);
    }

    #[test]
    fn recent_sales_are_newest_first_with_trend() {
        let historical = hist(&[
            ("2026-08-24", 10.0),
            ("2026-08-25", 15.0),
            ("2026-08-26", 12.0),
        ]);
        let rows = recent_sales(&historical);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, "2026-08-26");
        assert_eq!(rows[0].trend, -3.0);
        assert_eq!(rows[1].trend, 5.0);
        // No 2026-08-23 entry, so the oldest row has no baseline.
        assert_eq!(rows[2].trend, 0.0);
    }

    #[test]
    fn recent_sales_caps_at_fourteen_rows() {
        let historical: Vec<HistoricalPoint> = (1..=20)
            .map(|day| HistoricalPoint {
                date: format!("2026-08-{day:02}"),
                actual: day as f64,
            })
            .collect();
        let rows = recent_sales(&historical);
        assert_eq!(rows.len(), 14);
        assert_eq!(rows[0].date, "2026-08-20");
    }

    #[test]
    fn recent_sales_truncates_datetime_strings() {
        let historical = hist(&[("2026-08-26T00:00:00Z", 9.0)]);
        let rows = recent_sales(&historical);
        assert_eq!(rows[0].date, "2026-08-26");
    }

    #[test]
    fn forecast_rows_join_restock_recommendations() {
        let forecast = fore(&[("2026-09-01", 120.0), ("2026-09-02", 90.0)]);
        let mut restock = HashMap::new();
        restock.insert(
            "2026-09-01".to_string(),
            Restock {
                sku: "SKU-9".to_string(),
                product_name: "Widget".to_string(),
            },
        );

        let rows = forecast_rows(&forecast, &restock);
        assert_eq!(rows[0].restock.as_ref().unwrap().product_name, "Widget");
        assert!(rows[1].restock.is_none());
    }

    #[test]
    fn stale_responses_are_discarded() {
        let mut state = DashboardState::default();
        let first = state.begin_request();
        let second = state.begin_request();

        // The newer request resolves first.
        let mut newer = ForecastResponse::default();
        newer.forecast = fore(&[("2026-09-01", 5.0)]);
        assert!(state.apply_response(second, newer));

        // The older one arrives late and must not overwrite it.
        let mut older = ForecastResponse::default();
        older.forecast = fore(&[("2026-09-01", 999.0)]);
        assert!(!state.apply_response(first, older));

        assert_eq!(state.latest().unwrap().forecast[0].predicted, 5.0);
    }

    #[test]
    fn latest_response_wins_in_issue_order_too() {
        let mut state = DashboardState::default();
        let first = state.begin_request();
        assert!(state.apply_response(first, ForecastResponse::default()));

        let second = state.begin_request();
        // After a newer request is issued, even the previously-applied seq
        // is stale.
        assert!(!state.apply_response(first, ForecastResponse::default()));
        assert!(state.apply_response(second, ForecastResponse::default()));
    }

    #[test]
    fn forecast_response_tolerates_missing_sections() {
        let resp: ForecastResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.historical.is_empty());
        assert!(resp.forecast.is_empty());
        assert!(resp.restock_recommendations.is_empty());

        let resp: ForecastResponse = serde_json::from_str(
            r#"{"historical":[{"date":"2026-08-26","actual":12.5}],
                "forecast":[{"date":"2026-08-27"}],
                "restock_recommendations":{"2026-08-27":{"product_name":"Widget"}}}"#,
        )
        .unwrap();
        assert_eq!(resp.historical[0].actual, 12.5);
        assert_eq!(resp.forecast[0].predicted, 0.0);
        assert_eq!(resp.restock_recommendations["2026-08-27"].sku, "");
    }
}
