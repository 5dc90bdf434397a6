use crate::models::{MasteryLevel, Status};

/// Next status on the manual ring
/// not_started -> below -> approaching -> on -> above -> not_started.
pub fn next(current: Status) -> Status {
    match current {
        Status::NotStarted => Status::Level(MasteryLevel::Below),
        Status::Level(MasteryLevel::Below) => Status::Level(MasteryLevel::Approaching),
        Status::Level(MasteryLevel::Approaching) => Status::Level(MasteryLevel::On),
        Status::Level(MasteryLevel::On) => Status::Level(MasteryLevel::Above),
        Status::Level(MasteryLevel::Above) => Status::NotStarted,
    }
}

/// What a cycle step does to the persisted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleWrite {
    Upsert(MasteryLevel),
    Delete,
}

pub fn step(current: Status) -> CycleWrite {
    match next(current) {
        Status::NotStarted => CycleWrite::Delete,
        Status::Level(level) => CycleWrite::Upsert(level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_steps_return_to_start() {
        let mut status = Status::NotStarted;
        let mut seen = Vec::new();
        for _ in 0..5 {
            status = next(status);
            seen.push(status);
        }
        assert_eq!(status, Status::NotStarted);
        assert_eq!(
            seen,
            vec![
                Status::Level(MasteryLevel::Below),
                Status::Level(MasteryLevel::Approaching),
                Status::Level(MasteryLevel::On),
                Status::Level(MasteryLevel::Above),
                Status::NotStarted,
            ]
        );
    }

    #[test]
    fn only_leaving_above_deletes() {
        assert_eq!(
            step(Status::Level(MasteryLevel::Above)),
            CycleWrite::Delete
        );
        assert_eq!(
            step(Status::NotStarted),
            CycleWrite::Upsert(MasteryLevel::Below)
        );
        assert_eq!(
            step(Status::Level(MasteryLevel::On)),
            CycleWrite::Upsert(MasteryLevel::Above)
        );
    }
}
