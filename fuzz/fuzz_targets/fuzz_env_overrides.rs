#![no_main]
use std::collections::HashMap;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // One KEY=VALUE per line, like an env file.
    let vars: HashMap<&str, &str> = data
        .lines()
        .filter_map(|l| l.split_once('='))
        .collect();
    let mut cfg = ess_config::Config::default();
    if cfg
        .apply_env(|k| vars.get(k).map(|v| (*v).to_string()))
        .is_ok()
        && cfg.validate().is_ok()
    {
        assert!(ess_core::EngineCfg::try_from(&cfg).is_ok());
    }
});
