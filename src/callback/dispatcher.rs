//! Signature search across callback targets.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace};

use super::{CallbackTarget, Signature};
use crate::error::CallbackError;
use crate::provider::Provider;

/// Invoke `method` on every target that declares it.
///
/// For each target the first overload in [`Signature::ORDER`] wins. Targets
/// without the method are skipped. Failures and panics are captured and
/// returned; when no target declares the method at all a single
/// [`CallbackError::NotFound`] is returned.
pub fn invoke_callback(
    targets: &[Arc<CallbackTarget>],
    method: &str,
    provider: &Provider,
) -> Vec<CallbackError> {
    let mut errors = Vec::new();
    let mut invoked = false;

    for target in targets {
        let Some(overload) = Signature::ORDER
            .iter()
            .find_map(|sig| target.resolve(method, *sig))
        else {
            trace!(callback = method, target = target.name(), "Target lacks callback");
            continue;
        };

        invoked = true;
        debug!(
            callback = method,
            target = target.name(),
            provider = %provider.id(),
            signature = ?overload.signature(),
            "Invoking callback"
        );

        match catch_unwind(AssertUnwindSafe(|| overload.call(provider))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(CallbackError::Failed {
                method: method.to_string(),
                target: target.name().to_string(),
                message: format!("{:#}", err),
            }),
            Err(payload) => errors.push(CallbackError::Panicked {
                method: method.to_string(),
                target: target.name().to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    if !invoked {
        errors.push(CallbackError::NotFound {
            method: method.to_string(),
        });
    }
    errors
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
