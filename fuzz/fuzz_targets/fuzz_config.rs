//! Fuzz testing for config file parsing.
//!
//! Checks that variable expansion and YAML decoding return errors instead of
//! panicking on arbitrary text.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_config
//! ```

#![no_main]

use api_skeleton::config::{Config, expand_env};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let expanded = expand_env(text, |name| Some(name.to_lowercase()));
    if let Ok(config) = Config::from_yaml(&expanded) {
        let _ = config.validate();
        let _ = config.server_addr();
        let _ = config.metrics_addr();
    }
});
