use crate::model::error::FSError;

/// Progress of a multi-step operation that is not atomic.
///
/// Steps run in order and stop at the first failure. Steps listed in `completed` have taken
/// effect on the store and are not rolled back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    pub completed: Vec<String>,
    pub failed: Option<(String, FSError)>,
    pub skipped: Vec<String>,
}

impl StepReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && self.skipped.is_empty()
    }

    pub fn error(&self) -> Option<&FSError> {
        self.failed.as_ref().map(|(_, err)| err)
    }

    /// Runs `step` over `keys` in order, stopping at the first error.
    pub fn run<I, F>(keys: I, mut step: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: FnMut(&str) -> Result<(), FSError>,
    {
        let mut report = StepReport::default();

        for key in keys {
            if report.failed.is_some() {
                report.skipped.push(key);
                continue;
            }

            match step(&key) {
                Ok(()) => report.completed.push(key),
                Err(err) => report.failed = Some((key, err)),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_stops_at_first_failure() {
        let keys = vec!["a", "b", "c", "d"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();

        let mut calls = 0;
        let report = StepReport::run(keys, |key| {
            calls += 1;
            if key == "b" {
                return Err(FSError::not_found("b is gone"));
            }
            Ok(())
        });

        assert_eq!(calls, 2);
        assert_eq!(report.completed, vec!["a".to_string()]);
        assert_eq!(report.failed.as_ref().map(|(k, _)| k.as_str()), Some("b"));
        assert_eq!(report.skipped, vec!["c".to_string(), "d".to_string()]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_run_all_succeed() {
        let report = StepReport::run(vec!["x".to_string()], |_| Ok(()));

        assert!(report.is_complete());
        assert!(report.error().is_none());
    }
}
