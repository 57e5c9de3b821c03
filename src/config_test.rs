use std::collections::HashMap;

use super::*;

fn config(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    ClientConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn defaults_target_local_backend() {
    let config = config(&[]).expect("defaults");

    assert_eq!(config.generate_url(), "ws://127.0.0.1:7001/generate-code");
    assert_eq!(config.live_editor_url(), "ws://127.0.0.1:7001/ws/live-editor");
    assert_eq!(config.http_base_url, "http://127.0.0.1:7001");
    assert_eq!(config.retry, RetryPolicy::default());
    assert_eq!(config.max_selected_elements, 10);
    assert_eq!(config.variant_capacity, 4);
    assert_eq!(config.state_file, PathBuf::from(".pixelforge/state.json"));
    assert_eq!(config.settings.code_generation_model, DEFAULT_MODEL);
    assert_eq!(config.settings.generated_code_config, Stack::HtmlTailwind);
    assert!(config.settings.is_image_generation_enabled);
    assert!(config.settings.open_ai_api_key.is_none());
    assert!(config.settings.anthropic_api_key.is_none());
}

#[test]
fn overrides_are_applied() {
    let config = config(&[
        ("PIXELFORGE_WS_URL", "wss://forge.example.com/"),
        ("PIXELFORGE_SEND_RETRIES", "3"),
        ("PIXELFORGE_SEND_RETRY_DELAY_MS", "250"),
        ("PIXELFORGE_VARIANT_CAPACITY", "2"),
        ("PIXELFORGE_STACK", "react_tailwind"),
        ("PIXELFORGE_IMAGE_GENERATION", "off"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
    ])
    .expect("config");

    assert_eq!(config.generate_url(), "wss://forge.example.com/generate-code");
    assert_eq!(config.retry, RetryPolicy { retries: 3, delay: Duration::from_millis(250) });
    assert_eq!(config.variant_capacity, 2);
    assert_eq!(config.settings.generated_code_config, Stack::ReactTailwind);
    assert!(!config.settings.is_image_generation_enabled);
    assert_eq!(config.settings.anthropic_api_key.as_deref(), Some("sk-ant"));
}

#[test]
fn blank_values_fall_back_to_defaults() {
    let config = config(&[("PIXELFORGE_MODEL", "  "), ("OPENAI_API_KEY", "")]).expect("config");
    assert_eq!(config.settings.code_generation_model, DEFAULT_MODEL);
    assert!(config.settings.open_ai_api_key.is_none());
}

#[test]
fn unparseable_number_is_an_error() {
    let err = config(&[("PIXELFORGE_SEND_RETRIES", "many")]).expect_err("invalid");
    assert!(matches!(err, ConfigError::InvalidValue { key: "PIXELFORGE_SEND_RETRIES", .. }));
}

#[test]
fn zero_capacity_is_an_error() {
    let err = config(&[("PIXELFORGE_MAX_SELECTED_ELEMENTS", "0")]).expect_err("invalid");
    assert!(matches!(err, ConfigError::InvalidValue { key: "PIXELFORGE_MAX_SELECTED_ELEMENTS", .. }));
}

#[test]
fn unknown_stack_is_an_error() {
    let err = config(&[("PIXELFORGE_STACK", "angular")]).expect_err("invalid");
    assert!(matches!(err, ConfigError::UnknownStack(name) if name == "angular"));
}

#[test]
fn bad_flag_is_an_error() {
    assert!(config(&[("PIXELFORGE_IMAGE_GENERATION", "sometimes")]).is_err());
}

#[cfg(unix)]
#[test]
fn non_utf8_variables_do_not_break_env_loading() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let raw = OsStr::from_bytes(b"f\xffo");
    unsafe {
        std::env::set_var("__TEST_PF_UNRELATED_BYTES__", raw);
        std::env::set_var("__TEST_PF_OWN_BYTES__", raw);
    }

    let loaded = ClientConfig::from_env();
    let own = env_var("__TEST_PF_OWN_BYTES__");

    unsafe {
        std::env::remove_var("__TEST_PF_UNRELATED_BYTES__");
        std::env::remove_var("__TEST_PF_OWN_BYTES__");
    }

    assert!(loaded.is_ok(), "an unrelated non-UTF-8 variable must not affect loading");
    assert!(own.is_none());
}

#[test]
fn env_var_reads_a_single_key() {
    unsafe { std::env::set_var("__TEST_PF_SINGLE__", "ws://example.test") };
    let value = env_var("__TEST_PF_SINGLE__");
    unsafe { std::env::remove_var("__TEST_PF_SINGLE__") };
    assert_eq!(value.as_deref(), Some("ws://example.test"));
    assert!(env_var("__TEST_PF_NEVER_SET__").is_none());
}
