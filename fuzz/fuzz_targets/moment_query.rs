#![no_main]

use libfuzzer_sys::fuzz_target;
use jive::MomentQuery;

fuzz_target!(|data: &[u8]| {
    // Split into a table name, one dimension and measures on NUL bytes
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let parts: Vec<&str> = input.split('\0').collect();
    if parts.len() < 3 {
        return;
    }
    if let Ok(query) = MomentQuery::new(parts[0], &parts[1..2], &parts[2..]) {
        let sql = query.moments_query().to_sql();
        assert!(sql.starts_with("SELECT "));
    }
});
