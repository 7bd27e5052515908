//! End-to-end tests for compiled pipelines.

#[cfg(test)]
mod tests {
    use crate::core::{DataflowBlock, LinkOptions, Source, TargetExt};
    use crate::delegates::{ActionDelegate, ItemHandler, StageSpec, TransformDelegate};
    use crate::errors::FlowError;
    use crate::facade::DelegateTarget;
    use crate::pipeline::{PipelineBuilder, QueueFailureRoute};
    use crate::testing::{
        assert_completes, assert_faults, assert_pending, CollectingTarget, ErrorRecorder,
        RecordingAction,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn sorted(mut items: Vec<i32>) -> Vec<i32> {
        items.sort_unstable();
        items
    }

    fn doubling_rejecting_negatives() -> ActionDelegate<i32> {
        ActionDelegate::map_fn(|x: &i32| {
            anyhow::ensure!(*x >= 0, "negative input {x}");
            Ok(x * 2)
        })
    }

    #[derive(Debug, Default)]
    struct CountingHandler {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl ItemHandler<i32> for CountingHandler {
        async fn handle(&self, _item: &i32) -> anyhow::Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_pipeline_drains_everything() {
        let mut builder = PipelineBuilder::<i32>::new("defaults");
        let pipeline = builder.build_target().unwrap();

        for i in 0..100 {
            assert!(pipeline.post(i));
        }
        assert_pending(&pipeline.completion());
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;
    }

    #[tokio::test]
    async fn test_failed_item_reaches_handler_once() {
        let main = RecordingAction::<i32>::new();
        let completion = RecordingAction::<i32>::new();
        let errors = ErrorRecorder::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("failures");
        builder
            .use_action(main.failing_when(|x| *x == 3))
            .unwrap()
            .use_exception_handler(errors.delegate())
            .unwrap()
            .use_completion(completion.delegate())
            .unwrap();
        let pipeline = builder.build_target().unwrap();

        for i in 1..=5 {
            assert!(pipeline.post(i));
        }
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        assert_eq!(errors.inputs(), vec![3]);
        assert_eq!(errors.messages(), vec!["recording action rejected the item".to_string()]);
        assert_eq!(main.calls(), 5);
        assert_eq!(sorted(completion.seen()), vec![1, 2, 3, 4, 5]);
        assert_eq!(completion.calls(), 5);
    }

    #[tokio::test]
    async fn test_branch_maps_matching_items() {
        let main = RecordingAction::<i32>::new();
        let errors = ErrorRecorder::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("even");
        builder
            .use_action(main.delegate())
            .unwrap()
            .use_when(|x| x % 2 == 0, |when| {
                when.use_action(doubling_rejecting_negatives());
            })
            .unwrap()
            .use_exception_handler(errors.delegate())
            .unwrap();
        let pipeline = builder.build_target().unwrap();

        for item in [4, 3, -2] {
            assert!(pipeline.post(item));
        }
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        assert_eq!(sorted(main.seen()), vec![3, 8]);
        assert_eq!(errors.inputs(), vec![-2]);
        assert!(errors.messages()[0].contains("negative input -2"));
    }

    #[tokio::test]
    async fn test_closed_gate_rejoins_main_unchanged() {
        let main = RecordingAction::<i32>::new();
        let action = RecordingAction::<i32>::new();
        let exit = RecordingAction::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("gated");
        builder
            .use_action(main.delegate())
            .unwrap()
            .use_when(|x| *x > 0, |when| {
                when.use_conditional_queue(TransformDelegate::from_fn(|x: &i32| Ok(*x != 5)))
                    .use_action(action.delegate())
                    .use_completion(exit.delegate());
            })
            .unwrap();
        let pipeline = builder.build_target().unwrap();

        assert!(pipeline.post(5));
        assert!(pipeline.post(6));
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        assert_eq!(sorted(main.seen()), vec![5, 6]);
        assert_eq!(action.seen(), vec![6]);
        assert_eq!(exit.seen(), vec![6]);
    }

    #[tokio::test]
    async fn test_gate_failure_reaches_handler() {
        let main = RecordingAction::<i32>::new();
        let errors = ErrorRecorder::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("gate-failure");
        builder
            .use_action(main.delegate())
            .unwrap()
            .use_exception_handler(errors.delegate())
            .unwrap()
            .use_when(|_| true, |when| {
                when.use_conditional_queue(TransformDelegate::from_fn(|x: &i32| {
                    anyhow::ensure!(*x != 7, "gate refused {x}");
                    Ok(true)
                }))
                .use_action(ActionDelegate::from_fn(|_: &i32| Ok(())))
                .use_completion(ActionDelegate::from_fn(|_: &i32| Ok(())));
            })
            .unwrap();
        let pipeline = builder.build_target().unwrap();

        assert!(pipeline.post(7));
        assert!(pipeline.post(8));
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        assert_eq!(errors.inputs(), vec![7]);
        assert_eq!(main.seen(), vec![8]);
    }

    #[tokio::test]
    async fn test_first_matching_branch_wins() {
        let first = RecordingAction::<i32>::new();
        let second = RecordingAction::<i32>::new();
        let main = RecordingAction::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("ordered");
        builder
            .use_action(main.delegate())
            .unwrap()
            .use_when(|x| x % 2 == 0, |when| {
                when.use_action(first.delegate());
            })
            .unwrap()
            .use_when(|x| x % 4 == 0, |when| {
                when.use_action(second.delegate());
            })
            .unwrap();
        let pipeline = builder.build_target().unwrap();

        for i in 1..=8 {
            assert!(pipeline.post(i));
        }
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        assert_eq!(sorted(first.seen()), vec![2, 4, 6, 8]);
        assert!(second.seen().is_empty());
        assert_eq!(sorted(main.seen()), (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_builds_are_independent() {
        let first_action = RecordingAction::<i32>::new();
        let second_action = RecordingAction::<i32>::new();
        let mut builder = PipelineBuilder::<i32>::new("reused");

        builder.use_action(first_action.delegate()).unwrap();
        let first = builder.build_target().unwrap();

        builder
            .use_action(second_action.delegate())
            .unwrap()
            .use_when(|x| *x < 0, |when| {
                when.use_action(ActionDelegate::map_fn(|x: &i32| Ok(-x)));
            })
            .unwrap();
        let second = builder.build_target().unwrap();
        assert_ne!(first.id(), second.id());

        assert!(first.post(1));
        assert!(first.post(-2));
        first.complete();
        assert_completes(&first.completion()).await;
        assert_pending(&second.completion());

        assert!(second.post(-3));
        second.complete();
        assert_completes(&second.completion()).await;

        assert_eq!(sorted(first_action.seen()), vec![-2, 1]);
        assert_eq!(second_action.seen(), vec![3]);
    }

    #[tokio::test]
    async fn test_propagator_emits_completion_output() {
        let mut builder = PipelineBuilder::<i32>::new("propagating");
        builder
            .use_action(ActionDelegate::map_fn(|x: &i32| Ok(x + 1)))
            .unwrap()
            .use_completion(ActionDelegate::map_fn(|x: &i32| Ok(x * 10)))
            .unwrap();
        let pipeline = builder.build_propagator().unwrap();
        let sink = CollectingTarget::<i32>::new();
        pipeline.link_to(sink.clone(), LinkOptions::propagate()).unwrap();

        for i in 1..=3 {
            assert!(pipeline.post(i));
        }
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;
        assert_completes(&sink.completion()).await;
        assert_eq!(sorted(sink.items()), vec![20, 30, 40]);
    }

    #[tokio::test]
    async fn test_auto_complete_target_completes_when_drained() {
        let handler = Arc::new(CountingHandler::default());
        let mut builder = PipelineBuilder::<i32>::new("auto");
        builder
            .use_action(ActionDelegate::from_fn(|x: &i32| {
                anyhow::ensure!(*x != 2, "two is not allowed");
                Ok(())
            }))
            .unwrap()
            .use_completion(ActionDelegate::<i32>::from_handler(handler.clone()))
            .unwrap();
        let pipeline = builder.build_auto_complete_target().unwrap();

        for i in 1..=4 {
            assert!(pipeline.post(i));
        }
        assert_completes(&pipeline.completion()).await;
        assert_eq!(handler.handled.load(Ordering::SeqCst), 4);
        assert_eq!(pipeline.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_queue_failures_skip_handler_without_branches() {
        let main = RecordingAction::<i32>::new();
        let errors = ErrorRecorder::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("queue-topology");
        builder
            .use_queue(RecordingAction::<i32>::new().failing_when(|x| *x == 2))
            .unwrap()
            .use_action(main.delegate())
            .unwrap()
            .use_exception_handler(errors.delegate())
            .unwrap();
        let pipeline = builder.build_target().unwrap();

        for i in 1..=3 {
            assert!(pipeline.post(i));
        }
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        assert_eq!(main.seen(), vec![1, 2, 3]);
        assert_eq!(errors.count(), 0);
    }

    #[tokio::test]
    async fn test_queue_failures_bypass_branches_to_completion() {
        let main = RecordingAction::<i32>::new();
        let branch = RecordingAction::<i32>::new();
        let completion = RecordingAction::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("queue-branches");
        builder
            .use_queue(RecordingAction::<i32>::new().failing_when(|x| *x == 2))
            .unwrap()
            .use_action(main.delegate())
            .unwrap()
            .use_when(|x| x % 2 == 0, |when| {
                when.use_action(branch.delegate());
            })
            .unwrap()
            .use_completion(completion.delegate())
            .unwrap();
        let pipeline = builder.build_target().unwrap();

        for i in 1..=4 {
            assert!(pipeline.post(i));
        }
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        assert_eq!(branch.seen(), vec![4]);
        assert_eq!(sorted(main.seen()), vec![1, 3, 4]);
        assert_eq!(sorted(completion.seen()), vec![1, 2, 3, 4]);
        let plan = pipeline.plan().unwrap();
        assert!(plan
            .upstream_of("completion")
            .is_some_and(|upstream| upstream.iter().any(|stage| stage == "queue")));
    }

    #[tokio::test]
    async fn test_queue_failures_routed_to_handler() {
        let main = RecordingAction::<i32>::new();
        let errors = ErrorRecorder::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("queue-handler");
        builder
            .use_queue(RecordingAction::<i32>::new().failing_when(|x| *x == 2))
            .unwrap()
            .use_action(main.delegate())
            .unwrap()
            .use_exception_handler(errors.delegate())
            .unwrap()
            .queue_failures(QueueFailureRoute::ErrorHandler);
        let pipeline = builder.build_target().unwrap();

        for i in 1..=3 {
            assert!(pipeline.post(i));
        }
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        assert_eq!(main.seen(), vec![1, 3]);
        assert_eq!(errors.inputs(), vec![2]);
    }

    #[tokio::test]
    async fn test_fault_surfaces_in_pipeline_completion() {
        let mut builder = PipelineBuilder::<i32>::new("faulted");
        builder
            .use_action(ActionDelegate::from_fn(|_: &i32| Ok(())))
            .unwrap();
        let pipeline = builder.build_target().unwrap();

        assert!(pipeline.post(1));
        pipeline.fault(FlowError::faulted(anyhow::anyhow!("operator stop")));
        let fault = assert_faults(&pipeline.completion()).await;
        assert!(fault.to_string().contains("operator stop"));
        assert!(!pipeline.post(2));
    }

    #[tokio::test]
    async fn test_half_configured_gate_is_rejected() {
        let mut builder = PipelineBuilder::<i32>::new("invalid");
        let err = builder
            .use_when(|_| true, |when| {
                when.use_conditional_queue(TransformDelegate::from_fn(|_: &i32| Ok(true)))
                    .use_action(ActionDelegate::from_fn(|_: &i32| Ok(())));
            })
            .unwrap_err();
        assert!(err.to_string().contains("exit"));
        assert!(matches!(
            err,
            FlowError::Configuration(ref e) if e.code() == "PIPELINE-003-MISSING-EXIT"
        ));

        let pipeline = builder.build_target().unwrap();
        assert!(pipeline.plan().is_some_and(|plan| !plan.names().contains(&"branch[0].enter")));
    }

    #[tokio::test]
    async fn test_plan_lists_gated_branch_stages() {
        let mut builder = PipelineBuilder::<i32>::new("planned");
        builder
            .use_when(|_| true, |when| {
                when.use_conditional_queue(TransformDelegate::from_fn(|_: &i32| Ok(true)))
                    .use_action(StageSpec::new(ActionDelegate::from_fn(|_: &i32| Ok(()))))
                    .use_completion(ActionDelegate::from_fn(|_: &i32| Ok(())));
            })
            .unwrap();
        let pipeline = builder.build_target().unwrap();
        let plan = pipeline.plan().unwrap();

        assert_eq!(
            plan.names(),
            vec![
                "branch[0].enter",
                "branch[0].action",
                "branch[0].exit",
                "queue",
                "action",
                "error",
                "completion",
            ]
        );
        assert_eq!(
            plan.upstream_of("action").unwrap(),
            ["branch[0].exit", "branch[0].enter", "queue"]
        );
        assert_eq!(
            plan.upstream_of("error").unwrap(),
            ["branch[0].action", "branch[0].exit", "branch[0].enter"]
        );
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;
    }

    fn owned_pipeline(seen: &RecordingAction<i32>) -> Arc<DelegateTarget<i32>> {
        let mut builder = PipelineBuilder::<i32>::new("owned");
        builder
            .use_queue(ActionDelegate::from_fn(|_: &i32| Ok(())))
            .unwrap()
            .use_when(|x| x % 2 == 0, |when| {
                when.use_action(ActionDelegate::map_fn(|x: &i32| Ok(x + 1)));
            })
            .unwrap()
            .use_completion(seen.delegate())
            .unwrap();
        builder.build_target().unwrap()
    }

    #[tokio::test]
    async fn test_facade_alone_keeps_graph_alive() {
        let seen = RecordingAction::<i32>::new();
        let pipeline = owned_pipeline(&seen);

        for i in 0..50 {
            assert!(pipeline.post(i));
        }
        pipeline.complete();
        assert_completes(&pipeline.completion()).await;

        let expected: Vec<i32> = (0..50).map(|x| if x % 2 == 0 { x + 1 } else { x }).collect();
        assert_eq!(sorted(seen.seen()), sorted(expected));
    }

    #[tokio::test]
    async fn test_stages_outlive_a_finished_queue() {
        let gate = Arc::new(Semaphore::new(0));
        let held = Arc::clone(&gate);
        let seen = RecordingAction::<i32>::new();

        let mut builder = PipelineBuilder::<i32>::new("slow");
        builder
            .use_action(ActionDelegate::from_async_fn(move |_: i32| {
                let held = Arc::clone(&held);
                async move {
                    held.acquire().await?.forget();
                    Ok(())
                }
            }))
            .unwrap()
            .use_completion(seen.delegate())
            .unwrap();
        let pipeline = builder.build_target().unwrap();
        drop(builder);

        for i in 1..=3 {
            assert!(pipeline.post(i));
        }
        pipeline.complete();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_pending(&pipeline.completion());
        assert!(seen.seen().is_empty());

        gate.add_permits(3);
        assert_completes(&pipeline.completion()).await;
        assert_eq!(sorted(seen.seen()), vec![1, 2, 3]);
    }
}
