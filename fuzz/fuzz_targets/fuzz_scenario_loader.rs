#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use skirmish::config::ScenarioLoader;

fuzz_target!(|data: &[u8]| {
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        let loader = ScenarioLoader::with_defaults();

        // Must never panic, whatever the input
        let _ = loader.load_str(yaml_str, Path::new("fuzz.yaml"));
    }
});
