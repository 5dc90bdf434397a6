use thiserror::Error;

use crate::models::Status;

#[derive(Debug, Error)]
pub enum MasteryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid thresholds for {class}: {reason}")]
    InvalidThresholds { class: String, reason: String },

    #[error("unknown standard: {0}")]
    UnknownStandard(String),

    #[error("intervention for {code} can only change while below or approaching (currently {status})")]
    InterventionLocked { code: String, status: Status },

    #[error("no class and grade selected")]
    NoSelection,

    #[error("selection changed before the result arrived")]
    StaleSelection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MasteryLevel;

    #[test]
    fn locked_intervention_names_the_status() {
        let err = MasteryError::InterventionLocked {
            code: "RL.3.1".into(),
            status: Status::Level(MasteryLevel::On),
        };
        assert_eq!(
            err.to_string(),
            "intervention for RL.3.1 can only change while below or approaching (currently on)"
        );
    }

    #[test]
    fn json_errors_convert() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: MasteryError = parse.unwrap_err().into();
        assert!(err.to_string().starts_with("malformed JSON document"));
    }
}
