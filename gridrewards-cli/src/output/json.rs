//! JSON output for scripting.
//!
//! Outcome rows are shaped by hand because a period failure is data here,
//! not a serialization error.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};

use gridrewards_core::{Device, Home, HomeId};
use gridrewards_fetch::{DiagnosticsSnapshot, PeriodOutcome};

/// JSON formatter with optional pretty-printing.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Renders any serializable value.
    pub fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        let out = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(out)
    }

    /// Renders reward outcomes as one object per period.
    pub fn render_outcomes(
        &self,
        home_id: &HomeId,
        outcomes: &[PeriodOutcome],
    ) -> Result<String> {
        let periods: Vec<Value> = outcomes.iter().map(outcome_row).collect();
        self.render(&json!({
            "home_id": home_id.as_str(),
            "periods": periods,
        }))
    }

    /// Renders the home list.
    pub fn render_homes(&self, homes: &[Home]) -> Result<String> {
        self.render(&json!({ "homes": homes }))
    }

    /// Renders the device list.
    pub fn render_devices(&self, home_id: &HomeId, devices: &[Device]) -> Result<String> {
        self.render(&json!({
            "home_id": home_id.as_str(),
            "devices": devices,
        }))
    }

    /// Renders an observability snapshot.
    pub fn render_diagnostics(&self, diag: &DiagnosticsSnapshot) -> Result<String> {
        self.render(diag)
    }
}

fn outcome_row(outcome: &PeriodOutcome) -> Value {
    let period: Value = match outcome.request.label {
        Some(label) => json!(label),
        None => json!("custom"),
    };
    let base = json!({
        "period": period,
        "from": outcome.request.bounds.from,
        "to": outcome.request.bounds.to,
    });

    let mut row = base;
    match &outcome.result {
        Ok(rewards) => {
            row["status"] = json!("ok");
            row["rewards"] = json!(rewards);
        }
        Err(e) => {
            row["status"] = json!("error");
            row["error"] = json!({
                "kind": e.kind(),
                "message": e.to_string(),
            });
        }
    }
    row
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gridrewards_core::{GridRewards, RewardPeriodRequest, StandardPeriod};
    use gridrewards_fetch::FetchError;

    fn outcome(ok: bool) -> PeriodOutcome {
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let request = RewardPeriodRequest::standard(
            HomeId::new("96a14971-525a-4420-aae9-e5aedaa129ff").unwrap(),
            StandardPeriod::CurrentMonth,
            now,
        );
        let result = if ok {
            Ok(GridRewards {
                total: Some(15.0),
                currency: Some("SEK".to_string()),
                ..GridRewards::default()
            })
        } else {
            Err(FetchError::Server { status: 502 })
        };
        PeriodOutcome { request, result }
    }

    #[test]
    fn success_row_has_rewards() {
        let formatter = JsonFormatter::new(false);
        let home = HomeId::new("96a14971-525a-4420-aae9-e5aedaa129ff").unwrap();
        let out = formatter.render_outcomes(&home, &[outcome(true)]).unwrap();

        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["periods"][0]["status"], "ok");
        assert_eq!(value["periods"][0]["rewards"]["total"], 15.0);
    }

    #[test]
    fn failure_row_has_error_kind() {
        let formatter = JsonFormatter::new(false);
        let home = HomeId::new("96a14971-525a-4420-aae9-e5aedaa129ff").unwrap();
        let out = formatter.render_outcomes(&home, &[outcome(false)]).unwrap();

        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["periods"][0]["status"], "error");
        assert_eq!(value["periods"][0]["error"]["kind"], "server");
    }

    #[test]
    fn full_home_id_appears_in_json_only() {
        let formatter = JsonFormatter::new(false);
        let home = HomeId::new("96a14971-525a-4420-aae9-e5aedaa129ff").unwrap();
        let out = formatter.render_outcomes(&home, &[]).unwrap();
        assert!(out.contains("96a14971-525a-4420-aae9-e5aedaa129ff"));
    }
}
