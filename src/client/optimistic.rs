//! Local edits that are shown before the server confirms them.

use super::ClientError;

/// A value with an optional known-good snapshot. [`Optimistic::begin`]
/// takes the snapshot, [`Optimistic::settle`] keeps or restores it
/// depending on the server's answer.
#[derive(Clone, Debug, Default)]
pub struct Optimistic<T: Clone> {
    current: T,
    snapshot: Option<T>,
}

impl<T: Clone> Optimistic<T> {
    pub fn new(value: T) -> Self { Self { current: value, snapshot: None } }

    pub fn get(&self) -> &T { &self.current }

    pub fn is_pending(&self) -> bool { self.snapshot.is_some() }

    /// Snapshots the current value and hands it out for editing.
    pub fn begin(&mut self) -> &mut T {
        self.snapshot = Some(self.current.clone());
        &mut self.current
    }

    pub fn commit(&mut self) { self.snapshot = None; }

    pub fn revert(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.current = snapshot;
        }
    }

    pub fn settle<R>(&mut self, result: Result<R, ClientError>) -> Result<R, ClientError> {
        match result {
            Ok(value) => { self.commit(); Ok(value) }
            Err(e) => { self.revert(); Err(e) }
        }
    }

    /// Replaces the value with fresh server state and drops any snapshot.
    pub fn replace(&mut self, value: T) {
        self.current = value;
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_mutation_restores_snapshot() {
        let mut names = Optimistic::new(vec!["a".to_string()]);
        names.begin().push("b".into());
        assert_eq!(names.get().len(), 2);
        assert!(names.is_pending());
        let result: Result<(), _> = names.settle(Err(ClientError::Rejected { message: "no".into() }));
        assert!(result.is_err());
        assert_eq!(names.get(), &vec!["a".to_string()]);
        assert!(!names.is_pending());
    }

    #[test]
    fn test_successful_mutation_keeps_edit() {
        let mut count = Optimistic::new(1);
        *count.begin() += 1;
        count.settle(Ok(())).unwrap();
        count.revert();
        assert_eq!(*count.get(), 2);
    }
}
