use chrono::{NaiveDate, NaiveTime};
use std::fs;
use std::path::Path;
use stockpicks::AppCommand;
use stockpicks::store::PriceStore;
use tempfile::TempDir;
use tracing::info;

// Adds automatic logging to test
mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn mount_chart(
        server: &MockServer,
        symbol: &str,
        status: u16,
        body: &str,
        expected_calls: u64,
    ) {
        let url_path = format!("/v8/finance/chart/{symbol}");

        Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    pub fn chart(currency: &str, gmtoffset: i64, timestamps: &[i64], closes: &[f64]) -> String {
        serde_json::json!({
            "chart": {
                "result": [{
                    "meta": { "currency": currency, "gmtoffset": gmtoffset },
                    "timestamp": timestamps,
                    "indicators": { "quote": [{ "close": closes }] }
                }],
                "error": null
            }
        })
        .to_string()
    }
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// UTC timestamp `hours` after midnight of `date`.
fn at(date: &str, hours: i64) -> i64 {
    d(date).and_time(NaiveTime::MIN).and_utc().timestamp() + hours * 3600
}

fn write_config(dir: &Path, base_url: &str, participants: &str) -> String {
    let config_path = dir.join("config.yaml");
    let db_path = dir.join("prices.db");
    let config_content = format!(
        r#"
currency: USD
competition:
  start_date: 2025-01-01
  initial_capital: 1000
database:
  path: "{}"
providers:
  yahoo:
    base_url: "{}"
participants:
{}
"#,
        db_path.display(),
        base_url,
        participants
    );
    fs::write(&config_path, config_content).expect("Failed to write config file");
    config_path.to_str().unwrap().to_string()
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let server = wiremock::MockServer::start().await;
    // New York closes, 16:00 local
    let acme = test_utils::chart(
        "USD",
        -18000,
        &[at("2025-01-02", 21), at("2025-01-03", 21), at("2025-01-06", 21)],
        &[10.0, 10.5, 11.0],
    );
    // Hong Kong bars, 09:30 local
    let tencent = test_utils::chart(
        "HKD",
        28800,
        &[at("2025-01-02", 1), at("2025-01-03", 1), at("2025-01-06", 1)],
        &[400.0, 410.0, 420.0],
    );
    let hkd = test_utils::chart("USD", 0, &[at("2025-01-02", 0)], &[0.125]);
    test_utils::mount_chart(&server, "ACME", 200, &acme, 1).await;
    test_utils::mount_chart(&server, "0700.HK", 200, &tencent, 1).await;
    // The rate series ends before today, so the rerun asks again
    test_utils::mount_chart(&server, "HKDUSD=X", 200, &hkd, 2).await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(
        dir.path(),
        &server.uri(),
        r#"
  - name: Alice
    positions:
      - ticker: ACME
        quantity: 10
  - name: Bob
    positions:
      - ticker: "0700"
        exchange: HKG
        weight: 1.0
"#,
    );
    // Runs the morning after the 01-06 session
    let today = d("2025-01-07");

    let result = stockpicks::run_command_on(AppCommand::Update, Some(&config_path), today).await;
    assert!(result.is_ok(), "Update failed with: {:?}", result.err());

    // Same-day rerun does not refetch price series that reach the settled day
    let result = stockpicks::run_command_on(AppCommand::Update, Some(&config_path), today).await;
    assert!(result.is_ok(), "Rerun failed with: {:?}", result.err());

    for command in [
        AppCommand::Standings,
        AppCommand::Alloc,
        AppCommand::History {
            participant: "Bob".to_string(),
            from: None,
            to: None,
        },
        AppCommand::Prices {
            ticker: "0700.HK".to_string(),
            from: Some(d("2025-01-03")),
            to: None,
        },
    ] {
        let result = stockpicks::run_command_on(command, Some(&config_path), today).await;
        assert!(result.is_ok(), "Report failed with: {:?}", result.err());
    }

    let store = PriceStore::open(dir.path().join("prices.db")).unwrap();
    assert_eq!(store.row_count("ACME").unwrap(), 3);
    assert_eq!(store.row_count("0700.HK").unwrap(), 3);
    assert_eq!(store.latest_stored_date("0700.HK").unwrap(), Some(d("2025-01-06")));

    let bob = store
        .load_positions()
        .unwrap()
        .into_iter()
        .find(|p| p.participant == "Bob")
        .unwrap();
    // 1000 USD = 8000 HKD = 20 shares at 400 HKD
    let quantity = bob.quantity.unwrap();
    info!(quantity, "Bob's resolved position");
    assert!((quantity - 20.0).abs() < 1e-9);
}

#[test_log::test(tokio::test)]
async fn test_failing_ticker_is_skipped() {
    let server = wiremock::MockServer::start().await;
    let acme = test_utils::chart("USD", -18000, &[at("2025-01-02", 21)], &[10.0]);
    test_utils::mount_chart(&server, "ACME", 200, &acme, 1).await;
    test_utils::mount_chart(
        &server,
        "GONE",
        404,
        r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(
        dir.path(),
        &server.uri(),
        r#"
  - name: Alice
    positions:
      - ticker: ACME
        quantity: 10
      - ticker: GONE
        quantity: 1
"#,
    );

    let result =
        stockpicks::run_command_on(AppCommand::Update, Some(&config_path), d("2025-01-06")).await;
    assert!(result.is_ok(), "Update failed with: {:?}", result.err());

    let store = PriceStore::open(dir.path().join("prices.db")).unwrap();
    assert_eq!(store.row_count("ACME").unwrap(), 1);
    assert_eq!(store.latest_stored_date("GONE").unwrap(), None);
}

#[test_log::test(tokio::test)]
async fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(
        dir.path(),
        "http://127.0.0.1:9",
        r#"
  - name: Alice
    positions:
      - ticker: ACME
        quantity: 10
        weight: 0.5
"#,
    );

    let result = stockpicks::run_command(AppCommand::Standings, Some(&config_path)).await;

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("either quantity or weight"));
    assert!(!dir.path().join("prices.db").exists());
}
