//! Transfer saga steps
//!
//! Step IDs are stored in `transfer_sagas.step` as SMALLINT.

use std::fmt;

/// Persisted progress of one internal transfer
///
/// Terminal steps: DONE (40), HALTED (-10), COMMIT_FAILED (-20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum SagaStep {
    /// Balance locked, TRANSFER_OUT row written, pending event published
    Recorded = 10,

    /// TRANSFER_IN row written and OUT row DONE (one atomic unit)
    Materialized = 20,

    /// Credit call issued (persist-before-call)
    /// Outcome unknown if the process dies here
    Crediting = 25,

    /// Recipient credited
    Credited = 30,

    /// Commit call issued (persist-before-call)
    Committing = 35,

    /// Terminal: lock committed, parties notified
    Done = 40,

    /// Terminal: data-integrity violation, needs manual reconciliation
    Halted = -10,

    /// Terminal: ledger pair and credit are final but the source lock was not
    /// committed; left to the balance service to expire or reconcile
    CommitFailed = -20,
}

impl SagaStep {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStep::Done | SagaStep::Halted | SagaStep::CommitFailed
        )
    }

    /// An external call was issued and its outcome was never recorded
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SagaStep::Crediting | SagaStep::Committing)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(SagaStep::Recorded),
            20 => Some(SagaStep::Materialized),
            25 => Some(SagaStep::Crediting),
            30 => Some(SagaStep::Credited),
            35 => Some(SagaStep::Committing),
            40 => Some(SagaStep::Done),
            -10 => Some(SagaStep::Halted),
            -20 => Some(SagaStep::CommitFailed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::Recorded => "RECORDED",
            SagaStep::Materialized => "MATERIALIZED",
            SagaStep::Crediting => "CREDITING",
            SagaStep::Credited => "CREDITED",
            SagaStep::Committing => "COMMITTING",
            SagaStep::Done => "DONE",
            SagaStep::Halted => "HALTED",
            SagaStep::CommitFailed => "COMMIT_FAILED",
        }
    }

    /// Non-terminal step ids, used by the stale scan
    pub fn active_ids() -> [i16; 5] {
        [
            SagaStep::Recorded.id(),
            SagaStep::Materialized.id(),
            SagaStep::Crediting.id(),
            SagaStep::Credited.id(),
            SagaStep::Committing.id(),
        ]
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for SagaStep {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        SagaStep::from_id(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SagaStep; 8] = [
        SagaStep::Recorded,
        SagaStep::Materialized,
        SagaStep::Crediting,
        SagaStep::Credited,
        SagaStep::Committing,
        SagaStep::Done,
        SagaStep::Halted,
        SagaStep::CommitFailed,
    ];

    #[test]
    fn test_terminal_steps() {
        assert!(SagaStep::Done.is_terminal());
        assert!(SagaStep::Halted.is_terminal());
        assert!(SagaStep::CommitFailed.is_terminal());

        assert!(!SagaStep::Recorded.is_terminal());
        assert!(!SagaStep::Crediting.is_terminal());
        assert!(!SagaStep::Committing.is_terminal());
    }

    #[test]
    fn test_in_flight_steps() {
        assert!(SagaStep::Crediting.is_in_flight());
        assert!(SagaStep::Committing.is_in_flight());
        assert!(!SagaStep::Credited.is_in_flight());
        assert!(!SagaStep::Halted.is_in_flight());
    }

    #[test]
    fn test_step_id_roundtrip() {
        for step in ALL {
            assert_eq!(SagaStep::from_id(step.id()), Some(step));
            assert_eq!(SagaStep::try_from(step.id()), Ok(step));
        }
        assert_eq!(SagaStep::from_id(0), None);
        assert!(SagaStep::try_from(99).is_err());
    }

    #[test]
    fn test_active_ids_cover_non_terminal() {
        let active = SagaStep::active_ids();
        for step in ALL {
            assert_eq!(active.contains(&step.id()), !step.is_terminal(), "{}", step);
        }
    }

    #[test]
    fn test_step_ordering_by_id() {
        assert!(SagaStep::Recorded.id() < SagaStep::Materialized.id());
        assert!(SagaStep::Materialized.id() < SagaStep::Crediting.id());
        assert!(SagaStep::Credited.id() < SagaStep::Committing.id());
        assert!(SagaStep::Committing.id() < SagaStep::Done.id());
    }
}
