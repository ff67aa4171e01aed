// Dependency resolution - decides whether a valid subject exists for a
// chosen event kind and captures the data the payload needs.
//
// Eligibility filtering is exact; tie-break among eligible subjects is a
// uniform draw with the injected RNG. Signup resolves trivially.

use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::Connection;

use crate::catalog::EventKind;
use crate::error::StreamError;

/// A resolved event: kind plus the dependency context captured from
/// current relational state. Kind and context can never disagree because
/// they travel together.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Signup,
    /// Prior state code; the builder resamples until the new value differs.
    DemographicUpdate { user_id: String, state: String },
    ApplicationOpen { user_id: String },
    ApplicationReject { user_id: String },
    ApplicationApprove { user_id: String },
    Deposit { user_id: String },
    /// Balance captured at resolution time; the withdraw amount is bounded
    /// by this value, not by a fresh read at apply time.
    Withdraw { user_id: String, balance: f64 },
}

impl Resolution {
    pub fn kind(&self) -> EventKind {
        match self {
            Resolution::Signup => EventKind::Signup,
            Resolution::DemographicUpdate { .. } => EventKind::DemographicUpdate,
            Resolution::ApplicationOpen { .. } => EventKind::ApplicationOpen,
            Resolution::ApplicationReject { .. } => EventKind::ApplicationReject,
            Resolution::ApplicationApprove { .. } => EventKind::ApplicationApprove,
            Resolution::Deposit { .. } => EventKind::Deposit,
            Resolution::Withdraw { .. } => EventKind::Withdraw,
        }
    }
}

/// Resolves dependencies against current relational state.
pub struct DependencyResolver<'a> {
    conn: &'a Connection,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        DependencyResolver { conn }
    }

    /// Resolve one event kind. Fails with `NoEligibleSubject` when no
    /// valid subject exists; the driver must not materialize the event.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        kind: EventKind,
        rng: &mut R,
    ) -> Result<Resolution, StreamError> {
        match kind {
            EventKind::Signup => Ok(Resolution::Signup),
            EventKind::DemographicUpdate => self.any_user(rng),
            EventKind::ApplicationOpen => self.user_without_application(rng),
            EventKind::ApplicationReject => self
                .pending_applicants()?
                .choose(rng)
                .map(|user_id| Resolution::ApplicationReject {
                    user_id: user_id.clone(),
                })
                .ok_or(StreamError::NoEligibleSubject(kind)),
            EventKind::ApplicationApprove => self
                .pending_applicants()?
                .choose(rng)
                .map(|user_id| Resolution::ApplicationApprove {
                    user_id: user_id.clone(),
                })
                .ok_or(StreamError::NoEligibleSubject(kind)),
            EventKind::Deposit => self.user_with_balance(rng),
            EventKind::Withdraw => self.user_with_positive_balance(rng),
        }
    }

    fn any_user<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Resolution, StreamError> {
        let mut stmt = self.conn.prepare("SELECT id, state FROM users")?;
        let users = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        users
            .choose(rng)
            .map(|(user_id, state)| Resolution::DemographicUpdate {
                user_id: user_id.clone(),
                state: state.clone().unwrap_or_default(),
            })
            .ok_or(StreamError::NoEligibleSubject(EventKind::DemographicUpdate))
    }

    fn user_without_application<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Resolution, StreamError> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM users
             WHERE id NOT IN (SELECT user_id FROM applications)",
        )?;
        let users = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        users
            .choose(rng)
            .map(|user_id| Resolution::ApplicationOpen {
                user_id: user_id.clone(),
            })
            .ok_or(StreamError::NoEligibleSubject(EventKind::ApplicationOpen))
    }

    fn pending_applicants(&self) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM applications WHERE status = 'pending'")?;
        let users = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect();
        users
    }

    fn user_with_balance<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Resolution, StreamError> {
        let mut stmt = self.conn.prepare("SELECT user_id FROM balances")?;
        let users = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        users
            .choose(rng)
            .map(|user_id| Resolution::Deposit {
                user_id: user_id.clone(),
            })
            .ok_or(StreamError::NoEligibleSubject(EventKind::Deposit))
    }

    fn user_with_positive_balance<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Resolution, StreamError> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, amount FROM balances WHERE amount > 0")?;
        let balances = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        balances
            .choose(rng)
            .map(|(user_id, balance)| Resolution::Withdraw {
                user_id: user_id.clone(),
                balance: *balance,
            })
            .ok_or(StreamError::NoEligibleSubject(EventKind::Withdraw))
    }
}
