//! Depth-first dependency resolution
//!
//! Resolution walks parameters strictly in declaration order and never
//! reorders them: a parameter satisfied by name only finds values produced by
//! dependencies declared before it.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;

use crate::descriptor::{Caching, Descriptor, ProducerId};
use crate::error::{Error, Result};
use crate::producer::{Produced, Producer};
use crate::scope::Scope;
use crate::signature::{Param, Signature};
use crate::value::{Args, Value};

/// Resolve one descriptor within `scope`.
///
/// A cached value is returned as is. Otherwise the producer's own
/// parameters are resolved first, the producer runs, its cleanup (if any)
/// is registered, and the value is cached and bound in the context under the
/// declared parameter name.
pub(crate) fn resolve<'a>(
    scope: &'a mut Scope,
    descriptor: &'a Descriptor,
) -> BoxFuture<'a, Result<Value>> {
    async move {
        let producer = descriptor.target()?;
        let id = ProducerId::of(&producer);
        let name = Arc::clone(producer.signature().name_arc());
        let param = descriptor.declared_param_arc();
        let cached = descriptor.caching() == Caching::PerInvocation;

        if cached && let Some(value) = scope.cache.get(id) {
            tracing::trace!(producer = %name, param = %param, "Cache hit");
            return Ok(value);
        }

        scope.enter(&producer)?;
        let produced = run_producer(scope, &producer, param).await;
        scope.leave(id);

        let value = match produced? {
            Produced::Value(value) => value,
            Produced::Scoped { value, cleanup } => {
                scope.cleanup.push(Arc::clone(&name), Arc::clone(param), cleanup);
                value
            }
        };

        if cached {
            scope.cache.put(&producer, Arc::clone(&value));
        }
        scope.context.set(Arc::clone(param), Arc::clone(&value));
        Ok(value)
    }
    .boxed()
}

async fn run_producer(
    scope: &mut Scope,
    producer: &Arc<dyn Producer>,
    param: &Arc<str>,
) -> Result<Produced> {
    let signature = producer.signature();
    let args = collect_args(scope, signature).await?;

    tracing::debug!(producer = %signature.name(), param = %param, "Invoking producer");
    producer.produce(args).await.map_err(|source| Error::Producer {
        producer: signature.name().to_string(),
        param: param.to_string(),
        source,
    })
}

/// Build the argument set of a producer.
fn collect_args<'a>(scope: &'a mut Scope, signature: &'a Signature) -> BoxFuture<'a, Result<Args>> {
    async move {
        let mut values = IndexMap::with_capacity(signature.params().len());
        for param in signature.params() {
            let value = match param.descriptor() {
                Some(descriptor) => resolve(scope, descriptor).await?,
                None => lookup(scope, signature, param)?,
            };
            values.insert(Arc::clone(param.name_arc()), value);
        }
        Ok(Args::new(Arc::clone(signature.name_arc()), values))
    }
    .boxed()
}

/// Satisfy a parameter without a descriptor: context first, then default.
fn lookup(scope: &Scope, owner: &Signature, param: &Param) -> Result<Value> {
    if let Some(value) = scope.context.get(param.name()) {
        return Ok(Arc::clone(value));
    }
    if let Some(default) = param.default_value() {
        tracing::trace!(producer = %owner.name(), param = %param.name(), "Using declared default");
        return Ok(Arc::clone(default));
    }
    if let Some(declared_at) = scope.declared_later(param.name()) {
        return Err(Error::OutOfOrder {
            param: param.name().to_string(),
            producer: owner.name().to_string(),
            declared_at,
        });
    }
    Err(missing(scope, owner, param))
}

fn missing(scope: &Scope, owner: &Signature, param: &Param) -> Error {
    Error::MissingDependency {
        param: param.name().to_string(),
        producer: owner.name().to_string(),
        available: scope.context.names(),
    }
}

/// Build the argument set of an entry.
///
/// Parameters are taken in declaration order. A caller-supplied value wins
/// over everything, including a descriptor, whose producer then never runs.
/// Dependency parameters are resolved; plain parameters fall back to their
/// default.
pub(crate) async fn prepare_entry(scope: &mut Scope, entry: &Signature) -> Result<Args> {
    let mut values = IndexMap::with_capacity(entry.params().len());
    for (position, param) in entry.params().iter().enumerate() {
        let value = if let Some(supplied) = scope.supplied(param.name()) {
            if let Some(descriptor) = param.descriptor() {
                tracing::debug!(
                    param = %param.name(),
                    producer = %descriptor.name(),
                    "Caller supplied value, skipping producer"
                );
            }
            supplied
        } else if let Some(descriptor) = param.descriptor() {
            scope.enter_entry_param(entry, position);
            resolve(scope, descriptor).await?
        } else if let Some(default) = param.default_value() {
            Arc::clone(default)
        } else {
            return Err(missing(scope, entry, param));
        };
        values.insert(Arc::clone(param.name_arc()), value);
    }
    scope.leave_entry_params();
    Ok(Args::new(Arc::clone(entry.name_arc()), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::producer;
    use crate::testing::CallLog;
    use crate::value::value;

    fn counted(log: &CallLog, name: &'static str, out: u32) -> Arc<dyn Producer> {
        let log = log.clone();
        producer::from_fn(Signature::new(name), move |_| {
            log.record(name);
            Ok::<_, Error>(out)
        })
    }

    fn scope() -> Scope {
        Scope::new(&Config::default(), IndexMap::new())
    }

    #[tokio::test]
    async fn shared_producer_runs_once() {
        let log = CallLog::new();
        let base = counted(&log, "base", 10);
        let left = producer::from_fn(
            Signature::new("left").inject("base", Arc::clone(&base)),
            |args| Ok::<_, Error>(*args.get::<u32>("base")? + 1),
        );
        let right = producer::from_fn(
            Signature::new("right").inject("other_name", base),
            |args| Ok::<_, Error>(*args.get::<u32>("other_name")? + 2),
        );
        let entry = Signature::new("entry").inject("l", left).inject("r", right);

        let mut scope = scope();
        let args = prepare_entry(&mut scope, &entry).await.unwrap();
        assert_eq!(*args.get::<u32>("l").unwrap(), 11);
        assert_eq!(*args.get::<u32>("r").unwrap(), 12);
        assert_eq!(log.entries(), vec!["base"]);
        assert_eq!(scope.cache.len(), 3);
    }

    #[tokio::test]
    async fn resolved_values_are_bound_by_declared_name() {
        let log = CallLog::new();
        let entry = Signature::new("entry").inject("client", counted(&log, "get_client", 1));
        let mut scope = scope();
        prepare_entry(&mut scope, &entry).await.unwrap();
        assert!(scope.context.contains("client"));
        assert!(!scope.context.contains("get_client"));
    }

    #[tokio::test]
    async fn implicit_param_reads_context() {
        let sig = Signature::new("needs_tenant").arg("tenant_name");
        let needs_tenant = producer::from_fn(sig, |args| {
            Ok::<_, Error>(format!("client for {}", args.get::<&str>("tenant_name")?))
        });
        let entry = Signature::new("entry").arg("tenant_name").inject("client", needs_tenant);

        let mut supplied = IndexMap::new();
        supplied.insert(Arc::from("tenant_name"), value("acme"));
        let mut scope = Scope::new(&Config::default(), supplied);

        let args = prepare_entry(&mut scope, &entry).await.unwrap();
        assert_eq!(args.cloned::<String>("client").unwrap(), "client for acme");
    }

    #[tokio::test]
    async fn missing_implicit_param_names_producer() {
        let sig = Signature::new("needs_param").arg("missing_param");
        let needs = producer::from_fn(sig, |_| Ok::<_, Error>(()));
        let entry = Signature::new("entry").inject("x", needs);
        let err = prepare_entry(&mut scope(), &entry).await.unwrap_err();
        assert!(
            matches!(err, Error::MissingDependency { ref param, ref producer, .. }
                if param == "missing_param" && producer == "needs_param"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn producer_error_is_wrapped_with_context() {
        let broken = producer::from_fn(Signature::new("broken"), |_| {
            Err::<u8, _>("connection refused")
        });
        let entry = Signature::new("entry").inject("conn", broken);
        let mut scope = scope();
        let err = prepare_entry(&mut scope, &entry).await.unwrap_err();
        assert!(
            matches!(err, Error::Producer { ref producer, ref param, .. }
                if producer == "broken" && param == "conn"),
            "got {err:?}"
        );
        assert!(scope.cache.is_empty());
    }
}
