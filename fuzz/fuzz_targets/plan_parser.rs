#![no_main]

use libfuzzer_sys::fuzz_target;
use veredicto::config::RunPlan;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing and resolving must reject bad plans with errors, never panic
        if let Ok(plan) = RunPlan::from_toml_str(input) {
            let _ = plan.resolve();
            let _ = plan.budget_scope();
        }
    }
});
