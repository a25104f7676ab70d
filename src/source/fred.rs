//! FRED risk-free rate
//!
//! The 1-year constant-maturity Treasury yield (series `DGS1`) stands in
//! for the risk-free return on a one-year investment. FRED reports
//! holidays as `.`; those days are filled by linear interpolation over
//! calendar days and the percent yield is converted to a fraction.

use crate::data::interpolate_missing;
use crate::error::{IoResultExt, Result, StockPullError};
use crate::net::{HttpRequest, Transport};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// FRED series observations endpoint
pub const FRED_OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// 1-year Treasury constant maturity rate
pub const RISK_FREE_SERIES: &str = "DGS1";

/// One day of the risk-free series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskFreePoint {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    /// Annual yield as a fraction (0.0525 = 5.25%)
    #[serde(rename = "Risk Free Rate")]
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
struct Observations {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct FredError {
    error_message: String,
}

/// Turn an observations payload into the interpolated series
pub fn parse_observations(body: &str) -> Result<Vec<RiskFreePoint>> {
    let payload: Observations =
        serde_json::from_str(body).map_err(|e| StockPullError::parse("FRED observations", e))?;

    let mut dates = Vec::with_capacity(payload.observations.len());
    let mut values = Vec::with_capacity(payload.observations.len());
    for obs in payload.observations {
        let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d")
            .map_err(|e| StockPullError::parse(format!("FRED date '{}'", obs.date), e))?;
        dates.push(date);
        // "." marks a day without an observation
        values.push(obs.value.trim().parse::<f64>().ok());
    }

    let days: Vec<f64> = dates
        .iter()
        .map(|d| d.num_days_from_ce() as f64)
        .collect();
    let filled = interpolate_missing(&days, &values)?;

    let mut dropped = 0usize;
    let series: Vec<RiskFreePoint> = dates
        .into_iter()
        .zip(filled)
        .filter_map(|(date, value)| match value {
            Some(pct) => Some(RiskFreePoint {
                date,
                rate: pct / 100.0,
            }),
            None => {
                dropped += 1;
                None
            }
        })
        .collect();

    if dropped > 0 {
        tracing::warn!(
            "Dropped {} risk-free observations outside the observed range",
            dropped
        );
    }
    if series.is_empty() {
        return Err(StockPullError::NoData(format!(
            "{} has no observations",
            RISK_FREE_SERIES
        )));
    }
    Ok(series)
}

/// Fetch the full DGS1 history
pub async fn risk_free_rate(transport: &dyn Transport, api_key: &str) -> Result<Vec<RiskFreePoint>> {
    let request = HttpRequest::get(FRED_OBSERVATIONS_URL)
        .query("series_id", RISK_FREE_SERIES)
        .query("api_key", api_key)
        .query("file_type", "json");

    let response = transport.get(request).await?;
    if !response.is_success() {
        // FRED explains rejected keys in the body
        if let Ok(err) = serde_json::from_str::<FredError>(&response.body) {
            return Err(StockPullError::http(FRED_OBSERVATIONS_URL, err.error_message));
        }
    }
    let response = response.error_for_status(FRED_OBSERVATIONS_URL)?;

    let series = parse_observations(&response.body)?;
    tracing::info!(
        "Fetched {} risk-free observations ({} to {})",
        series.len(),
        series[0].date,
        series[series.len() - 1].date
    );
    Ok(series)
}

/// Write the series as `Date,Risk Free Rate`
pub fn write_risk_free_csv(path: &Path, series: &[RiskFreePoint]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_path(parent)?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| StockPullError::csv(path, e))?;
    for point in series {
        writer
            .serialize(point)
            .map_err(|e| StockPullError::csv(path, e))?;
    }
    writer.flush().with_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::ScriptedTransport;
    use tempfile::TempDir;

    fn payload(rows: &[(&str, &str)]) -> String {
        let observations: Vec<String> = rows
            .iter()
            .map(|(d, v)| {
                format!(
                    r#"{{"realtime_start":"2023-08-12","realtime_end":"2023-08-12","date":"{}","value":"{}"}}"#,
                    d, v
                )
            })
            .collect();
        format!(r#"{{"units":"lin","observations":[{}]}}"#, observations.join(","))
    }

    #[test]
    fn test_missing_days_are_interpolated_over_calendar_days() {
        // Friday, holiday Monday, Tuesday
        let body = payload(&[
            ("2023-07-28", "5.00"),
            ("2023-07-31", "."),
            ("2023-08-01", "5.40"),
        ]);
        let series = parse_observations(&body).unwrap();

        assert_eq!(series.len(), 3);
        assert!((series[0].rate - 0.05).abs() < 1e-12);
        // Three of four days along the line from 5.00 to 5.40
        assert!((series[1].rate - 0.053).abs() < 1e-12);
        assert_eq!(series[1].date.weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn test_leading_gap_is_dropped() {
        let body = payload(&[("1962-01-01", "."), ("1962-01-02", "3.22"), ("1962-01-03", "3.24")]);
        let series = parse_observations(&body).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(1962, 1, 2).unwrap());
    }

    #[test]
    fn test_all_missing_is_no_data() {
        let body = payload(&[("2023-01-02", ".")]);
        assert!(matches!(
            parse_observations(&body),
            Err(StockPullError::NoData(_))
        ));
    }

    #[tokio::test]
    async fn test_risk_free_rate_request() {
        let transport =
            ScriptedTransport::new().ok(200, payload(&[("2023-08-10", "5.37"), ("2023-08-11", "5.39")]));

        let series = risk_free_rate(&transport, "k3y").await.unwrap();
        assert_eq!(series.len(), 2);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, FRED_OBSERVATIONS_URL);
        assert!(requests[0]
            .query
            .contains(&("series_id".to_string(), "DGS1".to_string())));
        assert!(requests[0].proxy.is_none());
    }

    #[tokio::test]
    async fn test_rejected_key_message() {
        let transport = ScriptedTransport::new().ok(
            400,
            r#"{"error_code":400,"error_message":"Bad Request.  The value for variable api_key is not registered."}"#,
        );
        let err = risk_free_rate(&transport, "bad").await.unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_write_risk_free_csv() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("risk_free_rate.csv");
        let series = vec![RiskFreePoint {
            date: NaiveDate::from_ymd_opt(2023, 8, 11).unwrap(),
            rate: 0.0539,
        }];

        write_risk_free_csv(&path, &series).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Date,Risk Free Rate\n2023-08-11,0.0539\n");
    }
}
