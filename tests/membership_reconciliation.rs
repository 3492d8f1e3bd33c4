//! Property tests for set reconciliation.

use async_trait::async_trait;
use directory_connector::ConnectorResult;
use directory_connector::membership::{MembershipEditor, MembershipReconciler};
use futures::executor::block_on;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// A relationship held in memory, keyed without regard to case.
#[derive(Default)]
struct SetEditor {
    keys: Mutex<BTreeSet<String>>,
    calls: Mutex<usize>,
}

impl SetEditor {
    fn holding(keys: &[String]) -> Self {
        let editor = Self::default();
        editor
            .keys
            .lock()
            .unwrap()
            .extend(keys.iter().map(|k| k.to_ascii_lowercase()));
        editor
    }

    fn keys(&self) -> BTreeSet<String> {
        self.keys.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MembershipEditor for SetEditor {
    async fn add(&self, key: &str) -> ConnectorResult<()> {
        *self.calls.lock().unwrap() += 1;
        self.keys.lock().unwrap().insert(key.to_ascii_lowercase());
        Ok(())
    }

    async fn remove(&self, key: &str) -> ConnectorResult<()> {
        *self.calls.lock().unwrap() += 1;
        self.keys.lock().unwrap().remove(&key.to_ascii_lowercase());
        Ok(())
    }
}

fn folded(keys: &[String]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_ascii_lowercase()).collect()
}

fn key_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-dA-D]{1,2}@example\\.com", 0..8)
}

proptest! {
    #[test]
    fn reconciling_reaches_the_desired_set(existing in key_list(), desired in key_list()) {
        let reconciler = MembershipReconciler::new(&existing, &desired);
        let editor = SetEditor::holding(&existing);

        block_on(reconciler.apply(&editor)).unwrap();

        prop_assert_eq!(editor.keys(), folded(&desired));
    }

    #[test]
    fn reconciliation_is_minimal(existing in key_list(), desired in key_list()) {
        let reconciler = MembershipReconciler::new(&existing, &desired);
        let before = folded(&existing);
        let after = folded(&desired);

        prop_assert_eq!(reconciler.to_add().len(), after.difference(&before).count());
        prop_assert_eq!(reconciler.to_remove().len(), before.difference(&after).count());
        for key in reconciler.to_add() {
            prop_assert!(!before.contains(&key.to_ascii_lowercase()));
        }
        for key in reconciler.to_remove() {
            prop_assert!(!after.contains(&key.to_ascii_lowercase()));
        }
    }

    #[test]
    fn reconciling_twice_is_a_no_op(existing in key_list(), desired in key_list()) {
        let editor = SetEditor::holding(&existing);
        block_on(MembershipReconciler::new(&existing, &desired).apply(&editor)).unwrap();
        let first_calls = editor.calls();

        let current: Vec<String> = editor.keys().into_iter().collect();
        let again = MembershipReconciler::new(&current, &desired);
        prop_assert!(again.is_empty());
        block_on(again.apply(&editor)).unwrap();
        prop_assert_eq!(editor.calls(), first_calls);
    }
}

#[test]
fn test_caller_spelling_is_kept() {
    let existing = vec!["Staff@Example.com".to_string()];
    let desired = vec!["staff@example.com".to_string(), "Ops@Example.com".to_string()];

    let reconciler = MembershipReconciler::new(&existing, &desired);

    assert_eq!(reconciler.to_add(), &["Ops@Example.com".to_string()]);
    assert!(reconciler.to_remove().is_empty());
}
