// Payload construction - turns a resolved event into the record that is
// sent, as one value, to every sink.
//
// The payload is an internally tagged enum so the `event` wire tag and the
// per-kind field shape are fixed by construction; a kind without a handler
// is a compile error, not a runtime branch miss.

use chrono::NaiveDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::EventKind;
use crate::fabricate;
use crate::resolver::Resolution;

/// Default deposit upper bound: 1000.00.
pub const DEFAULT_DEPOSIT_CAP_CENTS: i64 = 100_000;

/// A fully materialized event record. `event` (the serde tag) and
/// `event_ts` are present on every variant and immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventPayload {
    #[serde(rename = "user sign up")]
    Signup {
        event_ts: String,
        first_name: String,
        last_name: String,
        email: String,
        dob: String,
        state: String,
    },

    #[serde(rename = "user update demographic")]
    DemographicUpdate {
        event_ts: String,
        id: String,
        state: String,
    },

    #[serde(rename = "user application open")]
    ApplicationOpen {
        event_ts: String,
        user_id: String,
        status: String,
    },

    #[serde(rename = "user application reject")]
    ApplicationReject {
        event_ts: String,
        user_id: String,
        status: String,
    },

    #[serde(rename = "user application approve")]
    ApplicationApprove {
        event_ts: String,
        user_id: String,
        status: String,
    },

    #[serde(rename = "user deposit")]
    Deposit {
        event_ts: String,
        user_id: String,
        amount: f64,
    },

    #[serde(rename = "user withdraw")]
    Withdraw {
        event_ts: String,
        user_id: String,
        amount: f64,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Signup { .. } => EventKind::Signup,
            EventPayload::DemographicUpdate { .. } => EventKind::DemographicUpdate,
            EventPayload::ApplicationOpen { .. } => EventKind::ApplicationOpen,
            EventPayload::ApplicationReject { .. } => EventKind::ApplicationReject,
            EventPayload::ApplicationApprove { .. } => EventKind::ApplicationApprove,
            EventPayload::Deposit { .. } => EventKind::Deposit,
            EventPayload::Withdraw { .. } => EventKind::Withdraw,
        }
    }

    pub fn event_ts(&self) -> &str {
        match self {
            EventPayload::Signup { event_ts, .. }
            | EventPayload::DemographicUpdate { event_ts, .. }
            | EventPayload::ApplicationOpen { event_ts, .. }
            | EventPayload::ApplicationReject { event_ts, .. }
            | EventPayload::ApplicationApprove { event_ts, .. }
            | EventPayload::Deposit { event_ts, .. }
            | EventPayload::Withdraw { event_ts, .. } => event_ts,
        }
    }
}

/// Canonical event timestamp: naive UTC, millisecond precision.
/// Example: `2024-01-05T09:30:00.123`.
pub fn format_event_ts(now: NaiveDateTime) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

/// Builds complete payloads from resolved events.
///
/// Clock and RNG are explicit inputs so tests can pin both.
pub struct PayloadBuilder {
    deposit_cap_cents: i64,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        PayloadBuilder {
            deposit_cap_cents: DEFAULT_DEPOSIT_CAP_CENTS,
        }
    }

    /// Override the deposit upper bound (in cents).
    pub fn with_deposit_cap_cents(deposit_cap_cents: i64) -> Self {
        PayloadBuilder { deposit_cap_cents }
    }

    /// Materialize a payload for one resolved event at time `now`.
    ///
    /// The withdraw amount is bounded by the balance captured at
    /// resolution time, not re-queried here.
    pub fn build<R: Rng + ?Sized>(
        &self,
        resolution: Resolution,
        rng: &mut R,
        now: NaiveDateTime,
    ) -> EventPayload {
        let event_ts = format_event_ts(now);

        match resolution {
            Resolution::Signup => {
                let first_name = fabricate::first_name(rng).to_string();
                let last_name = fabricate::last_name(rng).to_string();
                let email = fabricate::email(rng, &first_name, &last_name);
                let dob = fabricate::date_of_birth(rng, now.date())
                    .format("%Y-%m-%d")
                    .to_string();
                let state = fabricate::state_abbr(rng).to_string();

                EventPayload::Signup {
                    event_ts,
                    first_name,
                    last_name,
                    email,
                    dob,
                    state,
                }
            }
            Resolution::DemographicUpdate { user_id, state } => {
                let new_state = fabricate::state_abbr_excluding(rng, &state).to_string();
                EventPayload::DemographicUpdate {
                    event_ts,
                    id: user_id,
                    state: new_state,
                }
            }
            Resolution::ApplicationOpen { user_id } => EventPayload::ApplicationOpen {
                event_ts,
                user_id,
                status: "pending".to_string(),
            },
            Resolution::ApplicationReject { user_id } => EventPayload::ApplicationReject {
                event_ts,
                user_id,
                status: "rejected".to_string(),
            },
            Resolution::ApplicationApprove { user_id } => EventPayload::ApplicationApprove {
                event_ts,
                user_id,
                status: "approved".to_string(),
            },
            Resolution::Deposit { user_id } => EventPayload::Deposit {
                event_ts,
                user_id,
                amount: fabricate::amount(rng, self.deposit_cap_cents),
            },
            Resolution::Withdraw { user_id, balance } => {
                let balance_cents = (balance * 100.0).round() as i64;
                EventPayload::Withdraw {
                    event_ts,
                    user_id,
                    amount: fabricate::amount(rng, balance_cents),
                }
            }
        }
    }
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
