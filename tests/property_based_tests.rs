use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use teardown_core::constants::properties;
use teardown_core::models::ComputeResource;
use teardown_core::services::Predicate;
use teardown_core::state_machine::{RemovalSubStage, TransitionGuard};
use teardown_core::SubTaskCounter;

/// Strategy for per-child outcomes: `true` means the child reported an error
fn child_failures_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(prop::bool::weighted(0.2), 1..48)
}

fn substage_strategy() -> impl Strategy<Value = RemovalSubStage> {
    prop::sample::select(vec![
        RemovalSubStage::Created,
        RemovalSubStage::Suspended,
        RemovalSubStage::RemovingContainerHosts,
        RemovalSubStage::RemovedContainerHosts,
        RemovalSubStage::Deallocating,
        RemovalSubStage::Deallocated,
        RemovalSubStage::RemovingResources,
        RemovalSubStage::Completed,
        RemovalSubStage::Error,
    ])
}

proptest! {
    /// Property: the continuation fires exactly once, after the last report,
    /// with the failure flag set iff any child failed
    #[test]
    fn counter_fires_once_with_aggregate_failure(failures in child_failures_strategy()) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let counter = SubTaskCounter::new(failures.len(), move |has_failure| {
            sink.lock().unwrap().push(has_failure);
        });

        for (i, failed) in failures.iter().enumerate() {
            prop_assert!(fired.lock().unwrap().is_empty());
            let error = failed.then_some("child failed");
            let fired_now = counter.report_completion(error).unwrap();
            prop_assert_eq!(fired_now, i + 1 == failures.len());
        }

        let expected_failure = failures.iter().any(|failed| *failed);
        prop_assert_eq!(fired.lock().unwrap().clone(), vec![expected_failure]);
        prop_assert!(counter.report_completion(None).is_err());
    }

    /// Property: concurrent reports from separate threads still fire once
    #[test]
    fn counter_fires_once_under_concurrency(failures in child_failures_strategy()) {
        let fire_count = Arc::new(AtomicUsize::new(0));
        let saw_failure = Arc::new(Mutex::new(None));
        let (count_sink, failure_sink) = (Arc::clone(&fire_count), Arc::clone(&saw_failure));
        let counter = Arc::new(SubTaskCounter::new(failures.len(), move |has_failure| {
            count_sink.fetch_add(1, Ordering::SeqCst);
            *failure_sink.lock().unwrap() = Some(has_failure);
        }));

        let handles: Vec<_> = failures
            .iter()
            .map(|failed| {
                let counter = Arc::clone(&counter);
                let failed = *failed;
                std::thread::spawn(move || {
                    counter
                        .report_completion(failed.then_some("child failed"))
                        .unwrap()
                })
            })
            .collect();
        let firing_reports = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|fired| *fired)
            .count();

        prop_assert_eq!(firing_reports, 1);
        prop_assert_eq!(fire_count.load(Ordering::SeqCst), 1);
        prop_assert_eq!(
            *saw_failure.lock().unwrap(),
            Some(failures.iter().any(|failed| *failed))
        );
    }

    /// Property: the guard never lets a task leave a terminal substage and
    /// never moves it backwards
    #[test]
    fn guard_is_forward_only(from in substage_strategy(), to in substage_strategy()) {
        let allowed = TransitionGuard::can_transition(from, to).is_ok();
        if from.is_terminal() {
            prop_assert!(!allowed);
        } else if to == RemovalSubStage::Error {
            prop_assert!(allowed);
        } else if to <= from {
            prop_assert!(!allowed);
        }
    }

    /// Property: the container-host filter selects exactly the tagged members
    #[test]
    fn container_host_filter_selects_tagged_members(
        tags in prop::collection::vec(prop::option::of(prop::bool::ANY), 1..32),
        member_mask in prop::collection::vec(prop::bool::ANY, 32),
    ) {
        let documents: Vec<ComputeResource> = tags
            .iter()
            .enumerate()
            .map(|(i, tag)| {
                let resource = ComputeResource::new(format!("/c/{i}"));
                match tag {
                    Some(value) => resource.with_property(properties::CONTAINER_HOST, value.to_string()),
                    None => resource,
                }
            })
            .collect();
        let members: Vec<String> = (0..tags.len())
            .filter(|i| member_mask[*i])
            .map(|i| format!("/c/{i}"))
            .collect();
        let predicate = Predicate::self_link_in(members.iter().cloned())
            .and(Predicate::property_eq(properties::CONTAINER_HOST, properties::TRUE_VALUE));

        for (i, document) in documents.iter().enumerate() {
            let expected = member_mask[i] && tags[i] == Some(true);
            prop_assert_eq!(predicate.matches(document), expected);
        }
    }
}
