//! Wait-duration computation for delay steps.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{DelayMode, DelayPayload};

/// How long a delay step waits when evaluated at `now`.
///
/// Pure and total: a past instant, a negative or missing amount, a missing
/// unit, or an unknown mode all yield [`Duration::ZERO`].  Amounts too large
/// to represent saturate at [`Duration::MAX`].
pub fn compute_delay(payload: &DelayPayload, now: DateTime<Utc>) -> Duration {
    match &payload.mode {
        DelayMode::Specific => payload
            .specific_instant
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO),

        DelayMode::Relative => match (payload.relative_amount, payload.relative_unit) {
            (Some(amount), Some(unit)) if amount.is_finite() && amount >= 0.0 => {
                let secs = amount * unit.millis() as f64 / 1000.0;
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            }
            _ => Duration::ZERO,
        },

        DelayMode::Other(_) => Duration::ZERO,
    }
}
