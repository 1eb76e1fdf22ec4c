use crate::errors::{BoxError, ContainerError};
use std::collections::HashSet;
use std::sync::Arc;

/// Trait for services that release resources when their owner is disposed
pub trait Disposable: Send + Sync {
    fn dispose(&self) -> Result<(), BoxError>;
}

/// Dispose tracked instances in reverse creation order.
///
/// Every instance is attempted even if an earlier one fails. An instance
/// tracked more than once is disposed only once.
pub(crate) fn dispose_all(
    owner: &str,
    disposables: Vec<Arc<dyn Disposable>>,
) -> Result<(), ContainerError> {
    let mut seen = HashSet::new();
    let mut failures = 0usize;
    let mut first = None;

    for disposable in disposables.into_iter().rev() {
        let address = Arc::as_ptr(&disposable) as *const () as usize;
        if !seen.insert(address) {
            continue;
        }

        if let Err(error) = disposable.dispose() {
            tracing::warn!(owner = owner, error = %error, "Failed to dispose service");
            failures += 1;
            if first.is_none() {
                first = Some(error.to_string());
            }
        }
    }

    match first {
        None => Ok(()),
        Some(first) => Err(ContainerError::DisposalFailed {
            owner: owner.to_string(),
            failures,
            first,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Disposable for Recorder {
        fn dispose(&self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(format!("{} refused", self.name).into());
            }
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Arc<dyn Disposable> {
        Arc::new(Recorder {
            name,
            log: log.clone(),
            fail,
        })
    }

    #[test]
    fn test_dispose_all_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let items = vec![
            recorder("first", &log, false),
            recorder("second", &log, false),
            recorder("third", &log, false),
        ];

        dispose_all("test", items).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_dispose_all_continues_after_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let items = vec![
            recorder("first", &log, true),
            recorder("second", &log, false),
            recorder("third", &log, true),
        ];

        let error = dispose_all("scope", items).unwrap_err();
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
        match error {
            ContainerError::DisposalFailed { failures, first, .. } => {
                assert_eq!(failures, 2);
                assert_eq!(first, "third refused");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_dispose_all_skips_duplicates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = recorder("shared", &log, false);

        dispose_all("root", vec![shared.clone(), shared]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["shared"]);
    }
}
