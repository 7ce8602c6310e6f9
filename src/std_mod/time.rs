use std::time::{SystemTime, UNIX_EPOCH};

use crate::objects::object::NativeObject;
use crate::value::{make_number_value, Value};

/// The `clock()` native: seconds since the epoch as a Number, for timing
/// scripts against each other.
pub struct ClockTime;

impl NativeObject for ClockTime {
    fn run(&self, _args: &[Value]) -> Result<Value, String> {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| format!("clock is unavailable: {}", err))?;
        Ok(make_number_value(duration.as_secs_f64()))
    }
}

impl ClockTime {
    pub fn new() -> Self {
        ClockTime {}
    }
}

impl Default for ClockTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::as_number;

    #[test]
    fn clock_reports_monotonic_nonnegative_seconds() {
        let clock = ClockTime::new();
        let args: Vec<Value> = vec![];
        let first = as_number(&clock.run(&args).unwrap());
        let second = as_number(&clock.run(&args).unwrap());
        assert!(first > 0.0);
        assert!(second >= first);
    }
}
