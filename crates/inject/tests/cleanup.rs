//! Integration tests for two-phase producers and cleanup unwinding.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use hatch_inject::producer;
use hatch_inject::testing::CallLog;
use hatch_inject::{BoxError, Cleanup, Error, Injector, Inputs, Signature};

fn injector() -> Injector {
    hatch_log::init_test();
    Injector::new()
}

fn ok_body(
    log: &CallLog,
) -> impl FnOnce(hatch_inject::Args) -> std::future::Ready<Result<(), Error>> {
    let log = log.clone();
    move |_| {
        log.record("body");
        std::future::ready(Ok(()))
    }
}

fn failing_body(
    log: &CallLog,
) -> impl FnOnce(hatch_inject::Args) -> std::future::Ready<Result<(), BoxError>> {
    let log = log.clone();
    move |_| {
        log.record("body");
        std::future::ready(Err("handler failed".into()))
    }
}

fn failing_cleanup(name: &'static str, reason: &'static str) -> Arc<dyn hatch_inject::Producer> {
    producer::scoped(Signature::new(name), move |_| async move {
        Ok::<_, Error>((name, Cleanup::blocking(move || Err::<(), _>(reason))))
    })
}

#[tokio::test]
async fn cleanup_runs_in_reverse_after_success() {
    let log = CallLog::new();
    let db = log.scoped(Signature::new("db"), "db");
    let cache = log.scoped(Signature::new("cache").inject("db", Arc::clone(&db)), "cache");
    let entry = Signature::new("handler").inject("db", db).inject("cache", cache);

    injector().invoke(&entry, Inputs::new(), ok_body(&log)).await.unwrap();

    assert_eq!(
        log.entries(),
        vec!["db", "cache", "body", "cache:cleanup", "db:cleanup"]
    );
}

#[tokio::test]
async fn cleanup_runs_in_reverse_after_entry_failure() {
    let log = CallLog::new();
    let first = log.scoped(Signature::new("first"), 1_u8);
    let second = log.scoped(Signature::new("second"), 2_u8);
    let entry = Signature::new("handler").inject("a", first).inject("b", second);

    let err = injector()
        .invoke(&entry, Inputs::new(), failing_body(&log))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Entry { .. }), "got {err:?}");
    assert!(err.cleanup_failures().is_empty());
    assert_eq!(
        log.entries(),
        vec!["first", "second", "body", "second:cleanup", "first:cleanup"]
    );
}

#[tokio::test]
async fn cleanup_runs_after_resolution_failure() {
    let log = CallLog::new();
    let conn = log.scoped(Signature::new("conn"), ());
    let broken = producer::from_fn(Signature::new("broken"), |_| Err::<(), _>("no route to host"));
    let entry = Signature::new("handler").inject("conn", conn).inject("x", broken);

    let err = injector()
        .invoke(&entry, Inputs::new(), ok_body(&log))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Producer { .. }), "got {err:?}");
    assert_eq!(log.entries(), vec!["conn", "conn:cleanup"]);
}

#[tokio::test]
async fn shared_two_phase_producer_cleans_up_once() {
    let log = CallLog::new();
    let session = log.scoped(Signature::new("session"), ());
    let audit = log.producer_with(
        Signature::new("audit").inject("session", Arc::clone(&session)),
        (),
    );
    let entry = Signature::new("handler")
        .inject("session", session)
        .inject("audit", audit);

    injector().invoke(&entry, Inputs::new(), ok_body(&log)).await.unwrap();

    assert_eq!(log.count("session"), 1);
    assert_eq!(log.count("session:cleanup"), 1);
    assert_eq!(log.entries().last().map(String::as_str), Some("session:cleanup"));
}

#[tokio::test]
async fn cleanup_failures_are_aggregated_after_success() {
    let log = CallLog::new();
    let entry = Signature::new("handler")
        .inject("a", failing_cleanup("a", "flush failed"))
        .inject("ok", log.scoped(Signature::new("ok"), ()))
        .inject("b", failing_cleanup("b", "socket already closed"));

    let completion = injector()
        .invoke_completion(&entry, Inputs::new(), ok_body(&log))
        .await;
    assert!(completion.result.is_ok());
    assert!(!completion.cleanup_succeeded());

    let err = completion.into_result().unwrap_err();
    let failed: Vec<_> = err.cleanup_failures().iter().map(|f| f.producer()).collect();
    assert_eq!(failed, vec!["b", "a"]);
    assert_eq!(log.count("ok:cleanup"), 1, "a failing handler must not skip the others");
    assert!(err.to_string().contains("socket already closed"));
}

#[tokio::test]
async fn entry_and_cleanup_failures_are_both_reported() {
    let log = CallLog::new();
    let entry = Signature::new("handler").inject("conn", failing_cleanup("conn", "close failed"));

    let err = injector()
        .invoke(&entry, Inputs::new(), failing_body(&log))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unwound { .. }), "got {err:?}");
    assert!(matches!(err.primary(), Error::Entry { .. }));
    assert_eq!(err.cleanup_failures().len(), 1);
    let message = err.to_string();
    assert!(message.contains("handler failed"));
    assert!(message.contains("close failed"));
}

#[tokio::test]
async fn panicking_cleanup_is_reported() {
    let exploding = producer::scoped(Signature::new("exploding"), |_| async {
        let cleanup = Cleanup::blocking(|| -> Result<(), BoxError> { panic!("handle poisoned") });
        Ok::<_, Error>(((), cleanup))
    });
    let entry = Signature::new("handler").inject("x", exploding);

    let err = injector()
        .invoke(&entry, Inputs::new(), |_| async { Ok::<_, Error>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cleanup(_)), "got {err:?}");
    assert!(err.to_string().contains("handle poisoned"));
}

#[tokio::test]
async fn cancellation_still_unwinds_cleanup() {
    let log = CallLog::new();
    let token = CancellationToken::new();
    let conn = log.scoped(Signature::new("conn"), ());
    let trigger = token.clone();
    let hang = producer::from_async(Signature::new("hang"), move |_| {
        let trigger = trigger.clone();
        async move {
            trigger.cancel();
            std::future::pending::<Result<(), Error>>().await
        }
    });
    let entry = Signature::new("handler").inject("conn", conn).inject("hang", hang);

    let err = injector()
        .invoke(&entry, Inputs::new().with_cancellation(token), ok_body(&log))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { ref entry } if entry == "handler"), "got {err:?}");
    assert_eq!(log.entries(), vec!["conn", "conn:cleanup"]);
}

#[tokio::test]
async fn dropped_invocation_detaches_cleanup() {
    let (resolved_tx, resolved_rx) = oneshot::channel();
    let (cleaned_tx, cleaned_rx) = oneshot::channel();
    let resolved_tx = parking_lot::Mutex::new(Some(resolved_tx));
    let cleaned_tx = parking_lot::Mutex::new(Some(cleaned_tx));

    let conn = producer::scoped(Signature::new("conn"), move |_| {
        let cleaned = cleaned_tx.lock().take();
        async move {
            let cleanup = Cleanup::blocking(move || {
                if let Some(tx) = cleaned {
                    let _ = tx.send(());
                }
                Ok::<_, BoxError>(())
            });
            Ok::<_, Error>(((), cleanup))
        }
    });
    let hang = producer::from_async(Signature::new("hang"), move |_| {
        let resolved = resolved_tx.lock().take();
        async move {
            if let Some(tx) = resolved {
                let _ = tx.send(());
            }
            std::future::pending::<Result<(), Error>>().await
        }
    });
    let entry = Signature::new("handler").inject("conn", conn).inject("hang", hang);

    let injector = injector();
    let task = tokio::spawn(async move {
        injector
            .invoke(&entry, Inputs::new(), |_| async { Ok::<_, Error>(()) })
            .await
    });

    resolved_rx.await.unwrap();
    task.abort();
    tokio::time::timeout(Duration::from_secs(1), cleaned_rx)
        .await
        .expect("cleanup should be detached onto the runtime")
        .unwrap();
}

#[test]
fn blocking_invocation_unwinds() {
    hatch_log::init_test();
    let log = CallLog::new();
    let entry = Signature::new("handler").inject("conn", log.scoped(Signature::new("conn"), 4_u8));

    let out = Injector::new()
        .invoke_blocking(&entry, Inputs::new(), |args| async move {
            Ok::<_, Error>(*args.get::<u8>("conn")? * 2)
        })
        .unwrap();
    assert_eq!(out, 8);
    assert_eq!(log.entries(), vec!["conn", "conn:cleanup"]);
}
