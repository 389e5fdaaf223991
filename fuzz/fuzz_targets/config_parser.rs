#![no_main]

use libfuzzer_sys::fuzz_target;
use jive::AnalysisConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and validation must reject bad documents without panicking
        if let Ok(config) = AnalysisConfig::from_toml_str(input) {
            let _ = jive::JiveAnalysis::new(config).and_then(|analysis| analysis.moment_query());
        }
    }
});
