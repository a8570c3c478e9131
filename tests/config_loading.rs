// tests/config_loading.rs
use feedrank::config::{EngineConfig, ENV_CONFIG_PATH};
use std::{env, fs};

const OVERRIDES: &[&str] = &[
    "SYNC_INTERVAL_SECS",
    "SYNC_WORKERS",
    "FETCH_TIMEOUT_SECS",
    "EXTERNAL_WEIGHT",
    "STORE_PATH",
    "BIND_ADDR",
    "MODEL_HUB_TOKEN",
    "REPO_HUB_TOKEN",
    "MICROBLOG_TOKEN",
];

fn clear_env() {
    env::remove_var(ENV_CONFIG_PATH);
    for k in OVERRIDES {
        env::remove_var(k);
    }
}

#[test]
fn explicit_paths_pick_format_by_extension() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("engine.toml");
    fs::write(
        &p_toml,
        r#"
workers = 6
external_weight = 0.6

[host_rate_limits_ms]
"hub.test" = 250

[credentials]
microblog_token = "tok"
"#,
    )
    .unwrap();
    let t = EngineConfig::load_from(&p_toml).unwrap();
    assert_eq!(t.workers, 6);
    assert_eq!(t.external_weight, 0.6);
    assert_eq!(t.host_rate_limits_ms.get("hub.test"), Some(&250));
    assert_eq!(t.credentials.microblog_token.as_deref(), Some("tok"));
    assert_eq!(t.sync_interval_secs, 1800);

    let p_json = dir.path().join("engine.json");
    fs::write(&p_json, r#"{"sync_interval_secs": 60, "external_weight": 3.0}"#).unwrap();
    let j = EngineConfig::load_from(&p_json).unwrap();
    assert_eq!(j.sync_interval(), std::time::Duration::from_secs(60));
    assert_eq!(j.external_weight, 1.0, "weight is clamped");

    // JSON content behind a .toml name still loads.
    let mislabeled = dir.path().join("odd.toml");
    fs::write(&mislabeled, r#"{"workers": 2}"#).unwrap();
    assert_eq!(EngineConfig::load_from(&mislabeled).unwrap().workers, 2);

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "workers = [").unwrap();
    assert!(EngineConfig::load_from(&broken).is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_files_then_builtins() {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) Nothing on disk
    let d = EngineConfig::load_default().unwrap();
    assert_eq!(d.workers, 4);
    assert_eq!(d.bind_addr, "127.0.0.1:8080");

    // 2) JSON fallback, then TOML wins over JSON
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("feedrank.json"), r#"{"workers": 3}"#).unwrap();
    assert_eq!(EngineConfig::load_default().unwrap().workers, 3);
    fs::write(cfg_dir.join("feedrank.toml"), "workers = 5\n").unwrap();
    assert_eq!(EngineConfig::load_default().unwrap().workers, 5);

    // 3) Explicit path has priority
    let p_env = tmp.path().join("custom.json");
    fs::write(&p_env, r#"{"workers": 9}"#).unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(EngineConfig::load_default().unwrap().workers, 9);

    // 4) ...and must exist
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(EngineConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn env_overrides_apply_on_top_and_are_sanitized() {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(
        tmp.path().join("config/feedrank.toml"),
        "workers = 5\nsync_interval_secs = 120\n",
    )
    .unwrap();

    env::set_var("SYNC_WORKERS", "0");
    env::set_var("EXTERNAL_WEIGHT", "-2");
    env::set_var("FETCH_TIMEOUT_SECS", "not-a-number");
    env::set_var("STORE_PATH", "/var/lib/feedrank/j.jsonl");
    env::set_var("MICROBLOG_TOKEN", "  ");
    env::set_var("MODEL_HUB_TOKEN", "hf_x");

    let c = EngineConfig::load_default().unwrap();
    assert_eq!(c.sync_interval_secs, 120);
    assert_eq!(c.workers, 1);
    assert_eq!(c.external_weight, 0.0);
    assert_eq!(c.fetch_timeout_secs, 15);
    assert_eq!(c.store_path, std::path::PathBuf::from("/var/lib/feedrank/j.jsonl"));
    assert!(c.credentials.microblog_token.is_none());
    assert_eq!(c.credentials.model_hub_token.as_deref(), Some("hf_x"));

    let summary = serde_json::to_value(c.summary()).unwrap();
    assert_eq!(summary["workers"], 1);
    assert!(summary.get("credentials").is_none());

    clear_env();
    env::set_current_dir(&old).unwrap();
}
