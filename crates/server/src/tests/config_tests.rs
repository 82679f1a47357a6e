use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = env::temp_dir().join(format!("portal_server_config_{suffix}"));
    fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join(name);
    fs::write(&path, contents).expect("write");
    path
}

#[test]
fn file_values_fill_in_over_defaults() {
    let path = temp_file(
        "portal.toml",
        "prefix = \"/minpor\"\ntitle = \"Intranet\"\nrender_timeout_ms = 2500\n",
    );
    let settings = load_settings(Some(&path)).expect("settings");
    assert_eq!(settings.prefix, "/minpor");
    assert_eq!(settings.title, "Intranet");
    assert_eq!(settings.render_timeout_ms, 2500);
    assert_eq!(settings.event_timeout_ms, Settings::default().event_timeout_ms);

    fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
}

#[test]
fn missing_explicit_file_is_an_error() {
    let missing = env::temp_dir().join("portal_server_config_missing/none.toml");
    assert!(load_settings(Some(&missing)).is_err());
}

#[test]
fn environment_overrides_settings() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("PORTAL_BIND", "0.0.0.0:1"),
        ("APP__BIND_ADDR", "0.0.0.0:2"),
        ("PORTAL_TEMPLATES_DIR", "/srv/templates"),
        ("PORTAL_EVENT_TIMEOUT_MS", "not a number"),
    ]);
    let mut settings = Settings::default();
    settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.bind_addr, "0.0.0.0:2");
    assert_eq!(settings.templates_dir, Some(PathBuf::from("/srv/templates")));
    assert_eq!(settings.event_timeout_ms, 10_000);

    let portal = settings.portal_settings();
    assert_eq!(portal.templates_dirs[0], PathBuf::from("/srv/templates"));
}

#[test]
fn prefix_shape_is_validated() {
    let mut settings = Settings::default();
    assert!(settings.validate().is_ok());
    settings.prefix = "minpor".into();
    assert!(settings.validate().is_err());
    settings.prefix = "/minpor/".into();
    assert!(settings.validate().is_err());
    settings.prefix = "/minpor".into();
    assert!(settings.validate().is_ok());
}
