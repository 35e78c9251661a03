// tests/config_files.rs
use std::env;
use std::fs;
use std::path::Path;

use filing_monitor::config::monitor::ENV_ALERT_RECIPIENTS;
use filing_monitor::config::{MonitorConfig, ENV_CONFIG_PATH};
use serial_test::serial;

#[test]
#[serial]
fn shipped_cyber_config_loads() {
    env::remove_var(ENV_ALERT_RECIPIENTS);
    let cfg = MonitorConfig::load_from(Path::new("config/cyber.toml")).unwrap();
    assert_eq!(cfg.name, "cyber");
    assert_eq!(cfg.window, 100);
    assert_eq!(cfg.interval_secs, 900);
    assert!(!cfg.alert.enabled);
    assert!(cfg.watchlist.is_empty());
    assert!(cfg.tickers.is_empty());

    let idx = cfg.term_index();
    assert!(idx.trigger.contains("cyber incident"));
    assert!(idx.context.contains("nation-state"));
    // "state-sponsored" and "state sponsored" collapse to one phrase
    assert_eq!(
        idx.context.iter().filter(|p| p.text == "state sponsored").count(),
        1
    );
}

#[test]
#[serial]
fn shipped_trade_config_loads_watchlist_relative_to_itself() {
    env::remove_var(ENV_ALERT_RECIPIENTS);
    let cfg = MonitorConfig::load_from(Path::new("config/trade.toml")).unwrap();
    assert_eq!(cfg.label, "BIS/China");
    assert_eq!(cfg.interval_secs, 300);
    assert!(cfg.alert.enabled);
    assert!(cfg.watchlist.contains(&"0001045810".to_string()));
    assert!(cfg.watchlist.contains(&"0000050863".to_string()));
    assert_eq!(cfg.watchlist.len(), 33);
    assert_eq!(cfg.tickers.get("0001045810").map(String::as_str), Some("NVDA"));
    assert_eq!(cfg.tickers.get("0000707388").map(String::as_str), Some("ONTO"));
    assert_eq!(cfg.forms, vec!["8-K", "10-Q", "10-K", "6-K"]);
}

#[test]
#[serial]
fn env_path_selects_the_config() {
    env::remove_var(ENV_ALERT_RECIPIENTS);
    let dir = tempfile::tempdir().unwrap();
    let wl = dir.path().join("wl.json");
    fs::write(&wl, r#"["804328", "2488"]"#).unwrap();
    let p = dir.path().join("custom.toml");
    fs::write(
        &p,
        r#"
name = "custom"
interval_secs = 60
watchlist_path = "wl.json"
watchlist = ["0000050863"]
trigger_terms = ["export controls"]
context_terms = ["china"]
"#,
    )
    .unwrap();

    env::set_var(ENV_CONFIG_PATH, p.display().to_string());
    let cfg = MonitorConfig::load_default();
    env::remove_var(ENV_CONFIG_PATH);

    let cfg = cfg.unwrap();
    assert_eq!(cfg.name, "custom");
    assert_eq!(
        cfg.watchlist,
        vec!["0000002488", "0000050863", "0000804328"]
    );
}

#[test]
#[serial]
fn missing_file_is_an_error() {
    let err = MonitorConfig::load_from(Path::new("config/does-not-exist.toml")).unwrap_err();
    assert!(err.to_string().contains("does-not-exist.toml"));
}
