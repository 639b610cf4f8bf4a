//! Text output formatting with colors.

use gridrewards_core::{Device, GridRewards, Home, HomeId};
use gridrewards_fetch::{DiagnosticsSnapshot, FetchError, PeriodOutcome};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Formats the reward outcomes for one home.
    pub fn format_outcomes(&self, home_id: &HomeId, outcomes: &[PeriodOutcome]) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{} (home {})",
            self.bold("Grid rewards"),
            self.cyan(home_id.redacted())
        ));

        for outcome in outcomes {
            let label = outcome
                .request
                .label
                .map_or_else(|| "custom period".to_string(), |p| p.display_name().to_string());

            match &outcome.result {
                Ok(rewards) if rewards.is_empty() => {
                    lines.push(format!(
                        "{:<16} {}",
                        label,
                        self.dim("no rewards recorded")
                    ));
                }
                Ok(rewards) => {
                    lines.push(format!(
                        "{:<16} {}{}",
                        label,
                        self.green(&format_money(rewards.total, rewards.currency.as_deref())),
                        format_split(rewards)
                    ));
                }
                Err(e) => {
                    lines.push(format!("{:<16} {}", label, self.red(&short_error(e))));
                }
            }
        }

        lines.join("\n")
    }

    /// Formats the home list.
    pub fn format_homes(&self, homes: &[Home]) -> String {
        if homes.is_empty() {
            return self.dim("No homes on this account.");
        }

        let mut lines = vec![self.bold("Homes")];
        for home in homes {
            let zone = home.time_zone.as_deref().unwrap_or("unknown zone");
            let meter = if home.has_smart_meter_capabilities {
                self.green("smart meter")
            } else {
                self.dim("no smart meter")
            };
            lines.push(format!("{}  {:<22} {}", self.cyan(&home.id), zone, meter));
        }
        lines.join("\n")
    }

    /// Formats the tracked-device list for one home.
    pub fn format_devices(&self, home_id: &HomeId, devices: &[Device]) -> String {
        if devices.is_empty() {
            return format!(
                "{} (home {})",
                self.dim("No reward-bearing devices"),
                self.cyan(home_id.redacted())
            );
        }

        let mut lines = vec![format!(
            "{} (home {})",
            self.bold("Reward devices"),
            self.cyan(home_id.redacted())
        )];
        for device in devices {
            let title = device.title.as_deref().unwrap_or("(untitled)");
            let category = device
                .category
                .map_or_else(|| "unknown".to_string(), |c| c.to_string());
            let hidden = if device.is_hidden {
                self.dim(" (hidden)")
            } else {
                String::new()
            };
            lines.push(format!("{:<28} {}{}", title, category, hidden));
        }
        lines.join("\n")
    }

    /// Formats an observability snapshot.
    pub fn format_diagnostics(&self, diag: &DiagnosticsSnapshot) -> String {
        let mut lines = vec![self.bold("Diagnostics")];

        lines.push(format!(
            "Cache:    {} hits / {} misses ({:.0}% hit rate)",
            diag.cache.hits,
            diag.cache.misses,
            diag.cache.hit_rate()
        ));
        lines.push(format!(
            "Quota:    {}/{} hourly, {}/{} burst",
            diag.limiter.hourly_used,
            diag.limiter.hourly_capacity,
            diag.limiter.burst_used,
            diag.limiter.burst_capacity
        ));
        match diag.last_authenticated {
            Some(at) => lines.push(format!(
                "Auth:     last exchanged {}",
                at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => lines.push(format!("Auth:     {}", self.dim("never"))),
        }
        if !diag.retry_events.is_empty() {
            lines.push(format!("Retries:  {} recent", diag.retry_events.len()));
        }

        lines.join("\n")
    }

    // ------------------------------------------------------------------
    // Color helpers
    // ------------------------------------------------------------------

    fn bold(&self, s: &str) -> String {
        self.wrap(s, BOLD)
    }

    fn dim(&self, s: &str) -> String {
        self.wrap(s, DIM)
    }

    fn green(&self, s: &str) -> String {
        self.wrap(s, GREEN)
    }

    fn red(&self, s: &str) -> String {
        self.wrap(s, RED)
    }

    fn cyan(&self, s: &str) -> String {
        self.wrap(s, CYAN)
    }

    fn wrap(&self, s: &str, code: &str) -> String {
        if self.use_colors {
            format!("{code}{s}{RESET}")
        } else {
            s.to_string()
        }
    }
}

/// "12.34 SEK", or a placeholder when the value is absent.
fn format_money(amount: Option<f64>, currency: Option<&str>) -> String {
    match amount {
        Some(value) => match currency {
            Some(code) => format!("{value:.2} {code}"),
            None => format!("{value:.2}"),
        },
        None => "-".to_string(),
    }
}

/// "(ev 8.00, battery 4.34)" when a breakdown exists.
fn format_split(rewards: &GridRewards) -> String {
    let mut parts = Vec::new();
    if let Some(ev) = rewards.ev {
        parts.push(format!("ev {ev:.2}"));
    }
    if let Some(battery) = rewards.battery {
        parts.push(format!("battery {battery:.2}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("  ({})", parts.join(", "))
    }
}

/// One-line error summary for the table.
fn short_error(e: &FetchError) -> String {
    match e {
        FetchError::RetryExhausted { attempts, source } => {
            format!("failed after {attempts} attempts: {source}")
        }
        other => other.to_string(),
    }
}
