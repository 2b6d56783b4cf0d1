#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    if let Ok(cfg) = ess_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A validated config must always convert to a runtime config.
            assert!(ess_core::EngineCfg::try_from(&cfg).is_ok());
        }
    }
});
