//! Loading and validating bot configuration.

use botmux::{BotConfig, ConfigError};
use botmux::protocol::GroupId;

fn config_with(overrides: &[(&str, &str)]) -> String {
    let mut fields = vec![
        ("baseUrl", r#""ws://127.0.0.1:3001""#),
        ("accessToken", r#""secret""#),
        ("botId", "10001"),
        ("routingKeys", "[123456]"),
    ];
    for &(key, value) in overrides {
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some(field) => field.1 = value,
            None => fields.push((key, value)),
        }
    }
    let mut text: String = fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key} = {value}\n"))
        .collect();
    text.push_str("[reconnection]\nenable = true\nattempts = 3\ndelay = 100\n");
    text
}

fn invalid_field(text: &str) -> &'static str {
    match BotConfig::from_toml_str(text) {
        Err(ConfigError::Invalid { field, .. }) => field,
        other => panic!("expected an invalid field, got {other:?}"),
    }
}

#[test]
fn test_minimal_config_is_valid() {
    let config = BotConfig::from_toml_str(&config_with(&[])).unwrap();
    assert_eq!(config.routing_keys, vec![GroupId(123456)]);
    assert!(config.reconnection.enable);
}

#[test]
fn test_missing_required_field_names_the_field() {
    let err = BotConfig::from_toml_str(&config_with(&[("accessToken", "")])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(err.to_string().contains("accessToken"), "{err}");
}

#[test]
fn test_missing_reconnection_table_is_rejected() {
    let text = "baseUrl = \"ws://gw\"\naccessToken = \"t\"\nbotId = 1\nroutingKeys = [1]\n";
    let err = BotConfig::from_toml_str(text).unwrap_err();
    assert!(err.to_string().contains("reconnection"), "{err}");
}

#[test]
fn test_non_websocket_url_is_rejected() {
    assert_eq!(
        invalid_field(&config_with(&[("baseUrl", r#""http://127.0.0.1:3001""#)])),
        "baseUrl"
    );
    assert_eq!(invalid_field(&config_with(&[("baseUrl", r#""ws://""#)])), "baseUrl");
}

#[test]
fn test_blank_token_is_rejected() {
    assert_eq!(
        invalid_field(&config_with(&[("accessToken", r#""  ""#)])),
        "accessToken"
    );
}

#[test]
fn test_empty_routing_keys_are_rejected() {
    assert_eq!(
        invalid_field(&config_with(&[("routingKeys", "[]")])),
        "routingKeys"
    );
}

#[test]
fn test_duplicate_routing_key_is_rejected() {
    let err = BotConfig::from_toml_str(&config_with(&[("routingKeys", "[1, 2, 1]")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateRoutingKey(GroupId(1))));
}

#[test]
fn test_enabled_reconnection_needs_attempts() {
    let text = config_with(&[]).replace("attempts = 3", "attempts = 0");
    assert_eq!(invalid_field(&text), "reconnection.attempts");

    let disabled = text.replace("enable = true", "enable = false");
    assert!(BotConfig::from_toml_str(&disabled).is_ok());
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("botmux-config-{}.toml", std::process::id()));
    std::fs::write(&path, config_with(&[("historyTurns", "5")])).unwrap();

    let config = BotConfig::load(&path).unwrap();
    assert_eq!(config.history_turns, Some(5));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_load_missing_file_reports_path() {
    let err = BotConfig::load("/definitely/not/here/bot.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().contains("/definitely/not/here/bot.toml"));
}
