//! Property tests for the dependent-object lifecycle tree.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use solder_runtime::{Bean, Container, CreationalContext, InjectableContext, InstancePtr};

type Log = Arc<Mutex<Vec<String>>>;

fn recording_bean(label: String, log: Log) -> Arc<Bean> {
    Arc::new(
        Bean::builder(|_| Ok(()))
            .named(label.clone())
            .pre_destroy(move |_: &Arc<()>| log.lock().push(label.clone()))
            .build(),
    )
}

fn instance() -> InstancePtr {
    Arc::new(())
}

proptest! {
    /// Releasing a two-level accumulator tree destroys every node exactly
    /// once, siblings newest-first, and every parent before its children.
    #[test]
    fn release_tears_down_the_whole_tree(grandchildren in prop::collection::vec(0usize..4, 1..6)) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let root = CreationalContext::root();
        let mut expected_total = 0;

        for (i, count) in grandchildren.iter().enumerate() {
            let child_label = format!("c{i}");
            let child_ctx = root.child();
            for j in 0..*count {
                let label = format!("c{i}.g{j}");
                let bean = recording_bean(label, Arc::clone(&log));
                child_ctx.add_dependent_instance(bean, instance(), child_ctx.child());
                expected_total += 1;
            }
            let bean = recording_bean(child_label, Arc::clone(&log));
            root.add_dependent_instance(bean, instance(), child_ctx);
            expected_total += 1;
        }

        root.release();
        let order = log.lock().clone();

        // Every node destroyed exactly once.
        prop_assert_eq!(order.len(), expected_total);
        let unique: HashSet<&String> = order.iter().collect();
        prop_assert_eq!(unique.len(), expected_total);

        // Children of the root go newest-first.
        let child_positions: Vec<usize> = (0..grandchildren.len())
            .map(|i| order.iter().position(|l| *l == format!("c{i}")).unwrap())
            .collect();
        for window in child_positions.windows(2) {
            prop_assert!(window[0] > window[1], "siblings must be destroyed newest-first");
        }

        // Every parent is destroyed before its grandchildren, and those
        // grandchildren also go newest-first.
        for (i, count) in grandchildren.iter().enumerate() {
            let parent = child_positions[i];
            let mut previous: Option<usize> = None;
            for j in 0..*count {
                let pos = order
                    .iter()
                    .position(|l| *l == format!("c{i}.g{j}"))
                    .unwrap();
                prop_assert!(parent < pos, "parent must be destroyed before its dependents");
                if let Some(prev) = previous {
                    prop_assert!(pos < prev, "grandchildren must go newest-first");
                }
                previous = Some(pos);
            }
        }

        // A second release is a no-op.
        root.release();
        prop_assert_eq!(log.lock().len(), expected_total);
    }

    /// The dependent context never memoizes: `n` lookups produce `n`
    /// distinct instances and `n` records in the accumulator.
    #[test]
    fn dependent_lookups_are_never_cached(n in 1usize..16) {
        #[derive(Debug)]
        struct Widget;

        let container = Container::builder()
            .bean(Bean::builder(|_| Ok(Widget)).named("widget").build())
            .build()
            .unwrap();
        let bean = container
            .beans()
            .into_iter()
            .find(|b| b.name() == Some("widget"))
            .unwrap();
        let ctx = container.dependent_context();
        let cc = CreationalContext::root();

        let mut instances = Vec::new();
        for _ in 0..n {
            instances.push(ctx.get(&bean, Some(&cc)).unwrap().unwrap());
        }
        prop_assert_eq!(cc.dependent_count(), n);
        for a in 0..n {
            for b in (a + 1)..n {
                prop_assert!(!Arc::ptr_eq(&instances[a], &instances[b]));
            }
        }
        container.shutdown().unwrap();
    }
}
