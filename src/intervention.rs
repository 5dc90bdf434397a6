use crate::error::MasteryError;
use crate::models::{InterventionStatus, Status};

/// Intervention value the caller should see. The stored value is kept when a
/// standard moves to on or above, but it is only surfaced below that.
pub fn visible(effective: Status, stored: Option<InterventionStatus>) -> Option<InterventionStatus> {
    if effective.needs_support() {
        Some(stored.unwrap_or_default())
    } else {
        None
    }
}

/// Checks that `code` may take a new intervention value.
///
/// Any value may be chosen from `none`, and an active intervention may move
/// to another active value or back to `none`.
pub fn check_editable(code: &str, effective: Status) -> Result<(), MasteryError> {
    if effective.needs_support() {
        Ok(())
    } else {
        Err(MasteryError::InterventionLocked {
            code: code.to_string(),
            status: effective,
        })
    }
}

pub fn is_active(status: InterventionStatus) -> bool {
    status != InterventionStatus::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MasteryLevel;

    #[test]
    fn editable_only_below_on() {
        assert!(check_editable("RL.3.1", Status::Level(MasteryLevel::Below)).is_ok());
        assert!(check_editable("RL.3.1", Status::Level(MasteryLevel::Approaching)).is_ok());
        for status in [
            Status::NotStarted,
            Status::Level(MasteryLevel::On),
            Status::Level(MasteryLevel::Above),
        ] {
            assert!(matches!(
                check_editable("RL.3.1", status),
                Err(MasteryError::InterventionLocked { .. })
            ));
        }
    }

    #[test]
    fn stored_value_hidden_once_mastered() {
        let stored = Some(InterventionStatus::Reteaching);
        assert_eq!(
            visible(Status::Level(MasteryLevel::Below), stored),
            Some(InterventionStatus::Reteaching)
        );
        assert_eq!(visible(Status::Level(MasteryLevel::On), stored), None);
        assert_eq!(
            visible(Status::Level(MasteryLevel::Approaching), None),
            Some(InterventionStatus::None)
        );
    }

    #[test]
    fn none_is_inactive() {
        assert!(!is_active(InterventionStatus::None));
        assert!(is_active(InterventionStatus::Reassessing));
    }
}
