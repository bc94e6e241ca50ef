//! End-to-end collector tests against mock provider servers.
//!
//! Each test points every provider endpoint at an `httpmock` server, runs a
//! collector operation, and checks both the returned table and the Parquet
//! file it left behind.

use chrono::NaiveDate;
use findata_core::config::{CollectRequest, CollectorConfig, Endpoints};
use findata_core::data::frame::{column_dates, column_values, DATE_COLUMN};
use findata_core::data::{CollectError, Dataset, Interval, WorldBankIndicator};
use findata_core::DataCollector;
use httpmock::prelude::*;
use std::io::Write;
use std::path::Path;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn collector(server: &MockServer, dir: &Path, fred_key: Option<&str>) -> DataCollector {
    let config = CollectorConfig::new(d(2010, 1, 1), Some(d(2010, 12, 31)), dir.join("raw"))
        .unwrap()
        .with_fred_api_key(fred_key.map(String::from))
        .with_endpoints(Endpoints::all(&server.base_url()));
    DataCollector::new(config).unwrap()
}

fn column_names(df: &polars::prelude::DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|n| n.to_string()).collect()
}

// ── Fixtures ────────────────────────────────────────────────────────

const SPY_CHART: &str = r#"{
    "chart": {
        "result": [{
            "meta": {"symbol": "SPY", "gmtoffset": -18000},
            "timestamp": [1262615400, 1262701800],
            "events": {
                "dividends": {"1262701800": {"amount": 0.5, "date": 1262701800}}
            },
            "indicators": {
                "quote": [{
                    "open": [112.37, 113.26],
                    "high": [113.39, 113.68],
                    "low": [111.51, 112.85],
                    "close": [113.33, 113.63],
                    "volume": [118944600, 111579900]
                }],
                "adjclose": [{"adjclose": [113.33, 113.63]}]
            }
        }],
        "error": null
    }
}"#;

const NOT_FOUND_CHART: &str = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;

const FF_TEXT: &str = "This file was created by CMPT_ME_BEME_RETS using the 202312 CRSP database.\r\n\
\r\n\
,Mkt-RF,SMB,HML,RF\r\n\
200912,    2.81,    6.03,   -0.14,    0.01\r\n\
201001,   -3.36,    0.40,    0.43,    0.00\r\n\
201002,    3.40,    1.19,    3.23,    0.00\r\n\
\r\n\
 Annual Factors: January-December \r\n\
,Mkt-RF,SMB,HML,RF\r\n\
  2009,   28.26,    8.95,   -5.12,    0.10\r\n\
  2010,   17.37,   13.82,   -4.99,    0.12\r\n\
\r\n\
Copyright 2023 Kenneth R. French\r\n";

fn ff_archive() -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        writer
            .start_file(
                "F-F_Research_Data_Factors.CSV",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(FF_TEXT.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buf
}

fn fred_body(points: &[(&str, &str)]) -> String {
    let observations: Vec<serde_json::Value> = points
        .iter()
        .map(|(date, value)| {
            serde_json::json!({
                "realtime_start": "2024-05-01",
                "realtime_end": "2024-05-01",
                "date": date,
                "value": value,
            })
        })
        .collect();
    serde_json::json!({ "observations": observations }).to_string()
}

fn wb_body(indicator: &str, rows: &[(&str, &str, Option<f64>)]) -> String {
    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|(country, date, value)| {
            serde_json::json!({
                "indicator": {"id": indicator, "value": indicator},
                "country": {"id": "XX", "value": country},
                "countryiso3code": "XXX",
                "date": date,
                "value": value,
            })
        })
        .collect();
    serde_json::json!([{"page": 1, "pages": 1, "per_page": 20000, "total": rows.len()}, data])
        .to_string()
}

fn mock_spy(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path("/v8/finance/chart/SPY")
            .query_param("interval", "1d")
            .query_param("period1", "1262304000")
            .query_param("period2", "1293753600");
        then.status(200)
            .header("content-type", "application/json")
            .body(SPY_CHART);
    })
}

// ── Stocks ──────────────────────────────────────────────────────────

#[test]
fn stock_data_single_ticker_keeps_two_level_columns() {
    let server = MockServer::start();
    let spy = mock_spy(&server);
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    let df = collector.stock_data(&["spy"], Interval::Day, true).unwrap();

    spy.assert();
    assert_eq!(
        column_names(&df),
        vec![
            "date",
            "SPY/open",
            "SPY/high",
            "SPY/low",
            "SPY/close",
            "SPY/volume",
            "SPY/dividends",
            "SPY/stock_splits"
        ]
    );
    assert_eq!(
        column_dates(&df, DATE_COLUMN).unwrap(),
        vec![Some(d(2010, 1, 4)), Some(d(2010, 1, 5))]
    );
    assert_eq!(
        column_values(&df, "SPY/dividends").unwrap(),
        vec![Some(0.0), Some(0.5)]
    );

    let stored = collector.store().read(Dataset::StockPrices).unwrap();
    assert_eq!(stored.shape(), df.shape());
}

fn has_events_param(req: &HttpMockRequest) -> bool {
    req.query_params
        .as_ref()
        .is_some_and(|params| params.iter().any(|(name, _)| name == "events"))
}

#[test]
fn stock_data_without_dividends_skips_events() {
    let server = MockServer::start();
    let with_events = server.mock(|when, then| {
        when.method(GET)
            .path("/v8/finance/chart/SPY")
            .matches(has_events_param);
        then.status(500).body("events requested");
    });
    let without_events = server.mock(|when, then| {
        when.method(GET)
            .path("/v8/finance/chart/SPY")
            .matches(|req| !has_events_param(req));
        then.status(200)
            .header("content-type", "application/json")
            .body(SPY_CHART);
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    let df = collector.stock_data(&["SPY"], Interval::Day, false).unwrap();

    without_events.assert();
    assert_eq!(with_events.hits(), 0);
    assert_eq!(df.width(), 1 + 5);
    assert!(!column_names(&df).iter().any(|c| c.ends_with("/dividends")));
}

#[test]
fn stock_data_tolerates_one_failed_ticker() {
    let server = MockServer::start();
    mock_spy(&server);
    server.mock(|when, then| {
        when.method(GET).path("/v8/finance/chart/NOPE");
        then.status(404)
            .header("content-type", "application/json")
            .body(NOT_FOUND_CHART);
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    let df = collector
        .stock_data(&["SPY", "NOPE"], Interval::Day, false)
        .unwrap();

    assert_eq!(df.width(), 1 + 5 + 5);
    assert_eq!(column_values(&df, "NOPE/close").unwrap(), vec![None, None]);
    assert!(column_values(&df, "SPY/close").unwrap()[0].is_some());
}

#[test]
fn stock_data_fails_when_every_ticker_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v8/finance/chart/NOPE");
        then.status(404).body(NOT_FOUND_CHART);
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    let err = collector
        .stock_data(&["NOPE"], Interval::Day, true)
        .unwrap_err();
    assert!(matches!(err, CollectError::HttpStatus { status: 404, .. }));
    assert!(!collector.store().path(Dataset::StockPrices).exists());
}

// ── FRED ────────────────────────────────────────────────────────────

#[test]
fn economic_indicators_join_series_on_date() {
    let server = MockServer::start();
    let gdp = server.mock(|when, then| {
        when.method(GET)
            .path("/fred/series/observations")
            .query_param("series_id", "GDP")
            .query_param("api_key", "test-key")
            .query_param("observation_start", "2010-01-01")
            .query_param("observation_end", "2010-12-31")
            .query_param("file_type", "json");
        then.status(200)
            .body(fred_body(&[("2010-01-01", "14764.610"), ("2010-04-01", "14980.193")]));
    });
    let t10y2y = server.mock(|when, then| {
        when.method(GET)
            .path("/fred/series/observations")
            .query_param("series_id", "T10Y2Y");
        then.status(200).body(fred_body(&[
            ("2010-01-01", "."),
            ("2010-01-04", "2.76"),
        ]));
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), Some("test-key"));

    let df = collector.economic_indicators(&["GDP", "T10Y2Y"]).unwrap();

    gdp.assert();
    t10y2y.assert();
    assert_eq!(column_names(&df), vec!["date", "GDP", "T10Y2Y"]);
    assert_eq!(df.height(), 3);
    assert_eq!(
        column_values(&df, "T10Y2Y").unwrap(),
        vec![None, Some(2.76), None]
    );

    let meta = collector.store().meta(Dataset::EconomicIndicators).unwrap();
    assert_eq!(meta.rows, 3);
    assert_eq!(meta.end_date, Some(d(2010, 4, 1)));
}

#[test]
fn repeated_fred_ids_are_fetched_once() {
    let server = MockServer::start();
    let gdp = server.mock(|when, then| {
        when.method(GET)
            .path("/fred/series/observations")
            .query_param("series_id", "GDP");
        then.status(200)
            .body(fred_body(&[("2010-01-01", "14764.610")]));
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), Some("test-key"));

    let df = collector.economic_indicators(&["GDP", " GDP", "GDP"]).unwrap();

    gdp.assert_hits(1);
    assert_eq!(column_names(&df), vec!["date", "GDP"]);
}

#[test]
fn fred_rejection_is_reraised_and_nothing_is_written() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/fred/series/observations");
        then.status(400).body(
            r#"{"error_code":400,"error_message":"Bad Request.  Variable api_key is not set."}"#,
        );
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    let err = collector.economic_indicators(&["GDP"]).unwrap_err();
    assert!(matches!(err, CollectError::Provider { .. }));
    assert!(err.to_string().contains("api_key is not set"));
    assert!(!collector
        .store()
        .path(Dataset::EconomicIndicators)
        .exists());
}

// ── World Bank ──────────────────────────────────────────────────────

#[test]
fn world_bank_data_builds_country_date_panel() {
    let server = MockServer::start();
    let growth = server.mock(|when, then| {
        when.method(GET)
            .path_contains("/indicator/NY.GDP.MKTP.KD.ZG")
            .query_param("date", "2010:2010")
            .query_param("format", "json");
        then.status(200).body(wb_body(
            "NY.GDP.MKTP.KD.ZG",
            &[
                ("United States", "2010", Some(2.7)),
                ("China", "2010", Some(10.6)),
            ],
        ));
    });
    server.mock(|when, then| {
        when.method(GET).path_contains("/indicator/FP.CPI.TOTL.ZG");
        then.status(200).body(wb_body(
            "FP.CPI.TOTL.ZG",
            &[("United States", "2010", Some(1.6)), ("China", "2010", None)],
        ));
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    let indicators = [
        WorldBankIndicator::new("NY.GDP.MKTP.KD.ZG", "GDP Growth"),
        WorldBankIndicator::new("FP.CPI.TOTL.ZG", "Inflation"),
    ];
    let df = collector
        .world_bank_data(&indicators, &["USA", "CHN"])
        .unwrap();

    growth.assert();
    assert_eq!(
        column_names(&df),
        vec!["country", "date", "GDP Growth", "Inflation"]
    );
    assert_eq!(df.height(), 2);
    // China sorts first.
    assert_eq!(
        column_values(&df, "GDP Growth").unwrap(),
        vec![Some(10.6), Some(2.7)]
    );
    assert_eq!(
        column_values(&df, "Inflation").unwrap(),
        vec![None, Some(1.6)]
    );
    assert!(collector.store().path(Dataset::WorldBankData).exists());
}

#[test]
fn world_bank_error_payload_fails_the_call() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path_contains("/indicator/");
        then.status(200).body(
            r#"[{"message":[{"id":"120","key":"Invalid value","value":"The provided parameter value is not valid"}]}]"#,
        );
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    let err = collector
        .world_bank_data(&[WorldBankIndicator::new("BAD", "Bad")], &["USA"])
        .unwrap_err();
    assert!(matches!(err, CollectError::Provider { .. }));
}

// ── Fama-French ─────────────────────────────────────────────────────

#[test]
fn fama_french_factors_are_truncated_and_rescaled() {
    let server = MockServer::start();
    let archive = server.mock(|when, then| {
        when.method(GET).path("/F-F_Research_Data_Factors_CSV.zip");
        then.status(200)
            .header("content-type", "application/zip")
            .body(ff_archive());
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    let df = collector
        .fama_french_factors("F-F_Research_Data_Factors")
        .unwrap();

    archive.assert();
    assert_eq!(column_names(&df), vec!["date", "Mkt-RF", "SMB", "HML", "RF"]);
    // 200912 falls before the range; only the monthly table is used.
    assert_eq!(
        column_dates(&df, DATE_COLUMN).unwrap(),
        vec![Some(d(2010, 1, 1)), Some(d(2010, 2, 1))]
    );
    let mkt = column_values(&df, "Mkt-RF").unwrap();
    assert!((mkt[0].unwrap() + 0.0336).abs() < 1e-12);
    assert!((mkt[1].unwrap() - 0.034).abs() < 1e-12);
}

#[test]
fn fama_french_bad_archive_is_an_archive_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/Nope_CSV.zip");
        then.status(200).body("<html>not a zip</html>");
    });
    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), None);

    assert!(matches!(
        collector.fama_french_factors("Nope"),
        Err(CollectError::Archive(_))
    ));
}

// ── Everything ──────────────────────────────────────────────────────

#[test]
fn all_data_runs_every_provider_from_toml() {
    let server = MockServer::start();
    mock_spy(&server);
    server.mock(|when, then| {
        when.method(GET).path("/fred/series/observations");
        then.status(200)
            .body(fred_body(&[("2010-01-01", "9.8"), ("2010-02-01", "9.8")]));
    });
    server.mock(|when, then| {
        when.method(GET).path_contains("/indicator/");
        then.status(200).body(wb_body(
            "NY.GDP.MKTP.KD.ZG",
            &[("Japan", "2010", Some(4.1))],
        ));
    });
    server.mock(|when, then| {
        when.method(GET).path("/F-F_Research_Data_Factors_CSV.zip");
        then.status(200).body(ff_archive());
    });

    let dir = tempfile::tempdir().unwrap();
    let toml = format!(
        r#"
[collector]
start_date = "2010-01-01"
end_date = "2010-12-31"
data_dir = "{data_dir}"

[collector.endpoints]
yahoo = "{base}"
fred = "{base}"
world_bank = "{base}"
fama_french = "{base}"

[stocks]
tickers = ["SPY"]

[economic]
indicators = ["UNRATE"]

[world_bank]
countries = ["JPN"]

[[world_bank.indicators]]
id = "NY.GDP.MKTP.KD.ZG"
name = "GDP Growth"
"#,
        data_dir = dir.path().join("raw").display().to_string().replace('\\', "/"),
        base = server.base_url(),
    );
    let request = CollectRequest::from_toml(&toml).unwrap();
    let collector = DataCollector::new(request.collector_config().unwrap()).unwrap();

    let data = collector.all_data(&request).unwrap();

    let shapes: Vec<(&str, (usize, usize))> =
        data.iter().map(|(name, df)| (name, df.shape())).collect();
    assert_eq!(
        shapes,
        vec![
            ("stocks", (2, 8)),
            ("economic", (2, 2)),
            ("world_bank", (1, 3)),
            ("factors", (2, 5)),
        ]
    );
    for status in collector.store().status() {
        assert!(status.exists(), "{:?} was not written", status.dataset);
    }
}

#[test]
fn all_data_stops_at_first_failure() {
    let server = MockServer::start();
    mock_spy(&server);
    server.mock(|when, then| {
        when.method(GET).path("/fred/series/observations");
        then.status(500).body("upstream down");
    });
    let world_bank = server.mock(|when, then| {
        when.method(GET).path_contains("/indicator/");
        then.status(200).body("[]");
    });

    let dir = tempfile::tempdir().unwrap();
    let collector = collector(&server, dir.path(), Some("k"));

    let mut request = CollectRequest::default();
    request.stocks.tickers = vec!["SPY".into()];

    let err = collector.all_data(&request).unwrap_err();
    assert!(matches!(err, CollectError::HttpStatus { status: 500, .. }));
    assert_eq!(world_bank.hits(), 0);
    assert!(collector.store().path(Dataset::StockPrices).exists());
}
