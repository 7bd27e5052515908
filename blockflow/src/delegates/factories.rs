//! Factories turning delegates into engine blocks.
//!
//! Envelope-producing factories never fault on a delegate failure; they emit
//! the failure inside an envelope. Silent factories log it at `debug` and
//! carry on.

use super::{ActionDelegate, ErrorDelegate, StageSpec, TransformDelegate};
use crate::core::{BlockOptions, Message};
use crate::engine::{ActionBlock, TransformBlock};
use crate::envelopes::{ActionResult, ErrorResult, ItemResult, TransformResult};
use crate::errors::FlowError;
use std::sync::Arc;
use tracing::debug;

fn named(options: BlockOptions, fallback: &str) -> (BlockOptions, Arc<str>) {
    let name: Arc<str> = Arc::from(options.name_or(fallback));
    let options = BlockOptions {
        name: Some(name.to_string()),
        ..options
    };
    (options, name)
}

/// Builds a block that runs an action and emits an [`ActionResult`].
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub fn propagator<T: Message>(
    spec: impl Into<StageSpec<ActionDelegate<T>>>,
) -> Result<Arc<TransformBlock<T, ActionResult<T>>>, FlowError> {
    let StageSpec { delegate, options } = spec.into();
    let (options, _) = named(options, "propagator");
    TransformBlock::new(
        move |item: T| {
            let delegate = delegate.clone();
            async move { delegate.apply(item).await }
        },
        options,
    )
}

/// Builds a block that runs an action and passes the item on whatever happens.
///
/// A failed item is forwarded unchanged.
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub fn propagator_silent<T: Message>(
    spec: impl Into<StageSpec<ActionDelegate<T>>>,
) -> Result<Arc<TransformBlock<T, T>>, FlowError> {
    let StageSpec { delegate, options } = spec.into();
    let (options, stage) = named(options, "propagator");
    TransformBlock::new(
        move |item: T| {
            let delegate = delegate.clone();
            let stage = Arc::clone(&stage);
            async move {
                match delegate.apply(item).await {
                    ActionResult::Success(next) => next,
                    ActionResult::Failure { input, error } => {
                        debug!(stage = %stage, error = %error, "Suppressed stage failure");
                        input
                    }
                }
            }
        },
        options,
    )
}

/// Builds a sink that runs an action and discards failures.
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub fn target<T: Message>(
    spec: impl Into<StageSpec<ActionDelegate<T>>>,
) -> Result<Arc<ActionBlock<T>>, FlowError> {
    let StageSpec { delegate, options } = spec.into();
    let (options, stage) = named(options, "target");
    ActionBlock::new(
        move |item: T| {
            let delegate = delegate.clone();
            let stage = Arc::clone(&stage);
            async move {
                if let Err(error) = delegate.run(&item).await {
                    debug!(stage = %stage, error = %error, "Suppressed stage failure");
                }
            }
        },
        options,
    )
}

/// Builds a block that transforms each item and emits a [`TransformResult`].
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub fn transform<I: Message, O: Message>(
    spec: impl Into<StageSpec<TransformDelegate<I, O>>>,
) -> Result<Arc<TransformBlock<I, TransformResult<I, O>>>, FlowError> {
    let StageSpec { delegate, options } = spec.into();
    let (options, _) = named(options, "transform");
    TransformBlock::new(
        move |item: I| {
            let delegate = delegate.clone();
            async move {
                match delegate.apply(&item).await {
                    Ok(output) => TransformResult::success(output),
                    Err(error) => TransformResult::failure(item, error),
                }
            }
        },
        options,
    )
}

/// Like [`transform`], but a success also carries the originating item.
///
/// Used for gates, where the boolean alone cannot route the item onwards.
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub fn transform_with_item<I: Message, V: Message>(
    spec: impl Into<StageSpec<TransformDelegate<I, V>>>,
) -> Result<Arc<TransformBlock<I, TransformResult<I, ItemResult<I, V>>>>, FlowError> {
    let StageSpec { delegate, options } = spec.into();
    let (options, _) = named(options, "gate");
    TransformBlock::new(
        move |item: I| {
            let delegate = delegate.clone();
            async move {
                match delegate.apply(&item).await {
                    Ok(value) => TransformResult::success(ItemResult::new(item, value)),
                    Err(error) => TransformResult::failure(item, error),
                }
            }
        },
        options,
    )
}

/// Builds an error handler block that emits an [`ActionResult`] of the failed item.
///
/// The result is a success when the handler ran cleanly.
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub fn error_propagator<T: Message>(
    spec: impl Into<StageSpec<ErrorDelegate<T>>>,
) -> Result<Arc<TransformBlock<ErrorResult<T>, ActionResult<T>>>, FlowError> {
    let StageSpec { delegate, options } = spec.into();
    let (options, _) = named(options, "error");
    TransformBlock::new(
        move |record: ErrorResult<T>| {
            let delegate = delegate.clone();
            async move {
                let outcome = delegate.apply(&record).await;
                let input = record.into_input();
                match outcome {
                    Ok(()) => ActionResult::success(input),
                    Err(error) => ActionResult::failure(input, error),
                }
            }
        },
        options,
    )
}

/// Builds an error handler block that always forwards the failed item.
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub fn error_propagator_silent<T: Message>(
    spec: impl Into<StageSpec<ErrorDelegate<T>>>,
) -> Result<Arc<TransformBlock<ErrorResult<T>, T>>, FlowError> {
    let StageSpec { delegate, options } = spec.into();
    let (options, stage) = named(options, "error");
    TransformBlock::new(
        move |record: ErrorResult<T>| {
            let delegate = delegate.clone();
            let stage = Arc::clone(&stage);
            async move {
                if let Err(error) = delegate.apply(&record).await {
                    debug!(stage = %stage, error = %error, "Error handler failed");
                }
                record.into_input()
            }
        },
        options,
    )
}

/// Builds a sink for error records.
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub fn error_target<T: Message>(
    spec: impl Into<StageSpec<ErrorDelegate<T>>>,
) -> Result<Arc<ActionBlock<ErrorResult<T>>>, FlowError> {
    let StageSpec { delegate, options } = spec.into();
    let (options, stage) = named(options, "error");
    ActionBlock::new(
        move |record: ErrorResult<T>| {
            let delegate = delegate.clone();
            let stage = Arc::clone(&stage);
            async move {
                if let Err(error) = delegate.apply(&record).await {
                    debug!(stage = %stage, error = %error, "Error handler failed");
                }
            }
        },
        options,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataflowBlock, LinkOptions, Source, TargetExt};
    use crate::errors::StageFailure;
    use crate::testing::{assert_completes, CollectingTarget};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rejects_negative() -> ActionDelegate<i32> {
        ActionDelegate::from_fn(|x: &i32| {
            anyhow::ensure!(*x >= 0, "negative: {x}");
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_propagator_emits_envelopes() {
        let block = propagator(rejects_negative()).unwrap();
        let sink = CollectingTarget::new();
        block.link_to(sink.clone(), LinkOptions::propagate()).unwrap();

        assert!(block.post(1));
        assert!(block.post(-1));
        block.complete();
        assert_completes(&sink.completion()).await;

        let results = sink.items();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert_eq!(*results[1].input(), -1);
        assert!(results[1].error().is_some());
    }

    #[tokio::test]
    async fn test_propagator_silent_forwards_failed_items() {
        let block = propagator_silent(rejects_negative()).unwrap();
        let sink = CollectingTarget::new();
        block.link_to(sink.clone(), LinkOptions::propagate()).unwrap();

        assert!(block.post(-5));
        assert!(block.post(5));
        block.complete();
        assert_completes(&sink.completion()).await;
        assert_eq!(sink.items(), vec![-5, 5]);
    }

    #[tokio::test]
    async fn test_target_survives_failures() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let sink = target(ActionDelegate::from_fn(move |x: &i32| {
            s.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(*x % 2 == 0, "odd");
            Ok(())
        }))
        .unwrap();

        for i in 0..5 {
            assert!(sink.post(i));
        }
        sink.complete();
        assert_completes(&sink.completion()).await;
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_transform_with_item_keeps_input() {
        let gate = transform_with_item(TransformDelegate::from_fn(|x: &i32| {
            anyhow::ensure!(*x != 0, "zero");
            Ok(*x > 10)
        }))
        .unwrap();
        let sink = CollectingTarget::new();
        gate.link_to(sink.clone(), LinkOptions::propagate()).unwrap();

        assert!(gate.post(42));
        assert!(gate.post(0));
        gate.complete();
        assert_completes(&sink.completion()).await;

        let results = sink.items();
        assert_eq!(results[0].output(), Some(&ItemResult::new(42, true)));
        assert_eq!(results[1].input(), Some(&0));
    }

    #[tokio::test]
    async fn test_transform_failure_keeps_input() {
        let parse = transform(
            StageSpec::new(TransformDelegate::from_fn(|s: &String| Ok(s.parse::<u8>()?)))
                .with_name("parse"),
        )
        .unwrap();
        let sink = CollectingTarget::new();
        parse.link_to(sink.clone(), LinkOptions::propagate()).unwrap();

        assert!(parse.post("7".to_string()));
        assert!(parse.post("seven".to_string()));
        parse.complete();
        assert_completes(&sink.completion()).await;

        let results = sink.items();
        assert_eq!(results[0].output(), Some(&7));
        assert_eq!(results[1].input().map(String::as_str), Some("seven"));
    }

    #[tokio::test]
    async fn test_error_propagators() {
        let failing = ErrorDelegate::from_fn(|_: &i32, _: &StageFailure| {
            anyhow::bail!("handler broke")
        });
        let loud = error_propagator(failing.clone()).unwrap();
        let quiet = error_propagator_silent(failing).unwrap();
        let loud_sink = CollectingTarget::new();
        let quiet_sink = CollectingTarget::new();
        loud.link_to(loud_sink.clone(), LinkOptions::propagate()).unwrap();
        quiet.link_to(quiet_sink.clone(), LinkOptions::propagate()).unwrap();

        let record = ErrorResult::new(3, StageFailure::msg("first"));
        assert!(loud.post(record.clone()));
        assert!(quiet.post(record));
        loud.complete();
        quiet.complete();
        assert_completes(&loud_sink.completion()).await;
        assert_completes(&quiet_sink.completion()).await;

        let loud_results = loud_sink.items();
        assert_eq!(*loud_results[0].input(), 3);
        assert_eq!(
            loud_results[0].error().map(ToString::to_string),
            Some("handler broke".to_string())
        );
        assert_eq!(quiet_sink.items(), vec![3]);
    }

    #[tokio::test]
    async fn test_error_target_runs_handler() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let sink = error_target(ErrorDelegate::from_fn(move |_: &i32, _: &StageFailure| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();
        assert!(sink.post(ErrorResult::new(1, StageFailure::msg("x"))));
        sink.complete();
        assert_completes(&sink.completion()).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_options_rejected_at_construction() {
        let spec = StageSpec::new(rejects_negative())
            .with_options(BlockOptions::new().with_max_degree_of_parallelism(0));
        assert!(matches!(propagator(spec), Err(FlowError::InvalidOptions(_))));
    }
}
