mod common;

use common::{brs_description, brs_unique_name, harness, user_identity};

use orchestrion::{
    Clock, OrchestrationInstanceRepository, StepTerminationState, StoreError, UnitOfWork,
};

#[tokio::test]
async fn two_writers_one_success_one_conflict() {
    let h = harness(vec![brs_description()]);
    let id = h
        .manager
        .start_new_orchestration_instance(user_identity(), &brs_unique_name(), None, &[])
        .await
        .unwrap();

    // Two owners load the same committed revision.
    let mut step_writer = OrchestrationInstanceRepository::get(h.store.as_ref(), id)
        .await
        .unwrap();
    let mut lifecycle_writer = OrchestrationInstanceRepository::get(h.store.as_ref(), id)
        .await
        .unwrap();

    // One mutates a step, the other the instance lifecycle.
    step_writer
        .step_mut(1)
        .unwrap()
        .lifecycle_mut()
        .transition_to_running(h.clock.now())
        .unwrap();
    lifecycle_writer
        .lifecycle_mut()
        .transition_to_running(h.clock.now())
        .unwrap();

    let mut first = UnitOfWork::new();
    first.track(step_writer);
    let mut second = UnitOfWork::new();
    second.track(lifecycle_writer);

    let (a, b) = tokio::join!(
        OrchestrationInstanceRepository::commit(h.store.as_ref(), first),
        OrchestrationInstanceRepository::commit(h.store.as_ref(), second),
    );

    let failures: Vec<&StoreError> = [&a, &b].into_iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(
        failures,
        vec![&StoreError::ConcurrencyConflict { id }],
        "exactly one commit must conflict"
    );
    assert_eq!([&a, &b].into_iter().filter(|r| r.is_ok()).count(), 1);
}

#[tokio::test]
async fn conflicted_writer_succeeds_after_reload() {
    let h = harness(vec![brs_description()]);
    let id = h
        .manager
        .start_new_orchestration_instance(user_identity(), &brs_unique_name(), None, &[])
        .await
        .unwrap();

    let mut stale = OrchestrationInstanceRepository::get(h.store.as_ref(), id)
        .await
        .unwrap();

    // Another writer lands first.
    let mut winner = OrchestrationInstanceRepository::get(h.store.as_ref(), id)
        .await
        .unwrap();
    winner
        .lifecycle_mut()
        .transition_to_running(h.clock.now())
        .unwrap();
    let mut unit_of_work = UnitOfWork::new();
    unit_of_work.track(winner);
    OrchestrationInstanceRepository::commit(h.store.as_ref(), unit_of_work)
        .await
        .unwrap();

    // The stale copy conflicts.
    stale
        .step_mut(1)
        .unwrap()
        .lifecycle_mut()
        .transition_to_running(h.clock.now())
        .unwrap();
    let mut unit_of_work = UnitOfWork::new();
    unit_of_work.track(stale);
    let err = OrchestrationInstanceRepository::commit(h.store.as_ref(), unit_of_work)
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::ConcurrencyConflict { id });

    // Reload-and-retry is the caller's move, and it works.
    let mut reloaded = OrchestrationInstanceRepository::get(h.store.as_ref(), id)
        .await
        .unwrap();
    let now = h.clock.now();
    let step = reloaded.step_mut(1).unwrap().lifecycle_mut();
    step.transition_to_running(now).unwrap();
    step.transition_to_terminated(now, StepTerminationState::Succeeded)
        .unwrap();
    let mut unit_of_work = UnitOfWork::new();
    unit_of_work.track(reloaded);
    OrchestrationInstanceRepository::commit(h.store.as_ref(), unit_of_work)
        .await
        .unwrap();
}
