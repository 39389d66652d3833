#![no_main]

use libfuzzer_sys::fuzz_target;

use infrastructure::config::AgentConfig;

// Fuzz the configuration loader with arbitrary YAML.
//
// Covers serde_yaml_ng deserialization, the deny_unknown_fields checks and
// every section validator. Must only ever return Ok or Err. A config that
// parses must survive masking and a second validation unchanged.
fuzz_target!(|data: &[u8]| {
    let Ok(yaml) = std::str::from_utf8(data) else {
        return;
    };
    if yaml.len() > 64 * 1024 {
        return;
    }
    if let Ok(mut config) = AgentConfig::from_yaml(yaml) {
        config.apply_store_key("fuzz-key");
        let sanitized = config.sanitized();
        assert!(sanitized.validate().is_ok());
        let _ = config.live_api_key();
    }
});
