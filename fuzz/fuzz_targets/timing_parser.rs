#![no_main]

use buildmon::report::detailed_report;
use buildmon::timing_parser::parse_build_timings;
use libfuzzer_sys::fuzz_target;
use std::collections::HashSet;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Neither parsing nor aggregating arbitrary build output may panic
        let parsed = parse_build_timings(Some(input), &HashSet::new());
        let (report, _) = detailed_report(&parsed, true);

        if let Some(report) = report {
            for row in report.rows.values() {
                assert_eq!(row.len(), report.columns.len());
            }
        }
    }
});
