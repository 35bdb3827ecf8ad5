//! Trigger adapters: normalize the serverless platform's calling
//! conventions into one [`Envelope`].
//!
//! Detection is structural, by argument count and shape. The flow
//! reference the embedding deployment passes alongside the arguments
//! plays no part in shape detection; it is only used for resolution.

use serde_json::Value;
use tracing::debug;

use crate::message::{CompletionCallback, Envelope, HttpRequest, HttpResponse};

/// One raw platform argument, loosely typed the way the trigger host
/// hands them over.
#[derive(Debug)]
pub enum TriggerArg {
    Value(Value),
    Request(HttpRequest),
    Response(HttpResponse),
    Callback(CompletionCallback),
}

/// Background/event adapter: `(payload, context, completion callback)`.
/// The three fields pass through untouched.
pub fn background_envelope(payload: Value, context: Value, done: CompletionCallback) -> Envelope {
    Envelope::Background {
        payload,
        context,
        done,
    }
}

/// HTTP adapter: `(request, response)`. The pair is only accepted when
/// both handles belong to the same exchange.
pub fn http_envelope(request: HttpRequest, response: HttpResponse) -> Option<Envelope> {
    if !request.is_linked(&response) {
        debug!(
            request = %request.exchange_id(),
            response = %response.exchange_id(),
            "request and response are not one exchange; ignoring"
        );
        return None;
    }
    Some(Envelope::Http { request, response })
}

/// Coerce one leading argument into its JSON form. Handles serialize to
/// their data representation; a callable has no JSON form.
fn into_value(arg: TriggerArg) -> Option<Value> {
    match arg {
        TriggerArg::Value(v) => Some(v),
        TriggerArg::Request(r) => serde_json::to_value(r).ok(),
        TriggerArg::Response(r) => serde_json::to_value(r).ok(),
        TriggerArg::Callback(_) => None,
    }
}

/// Generic entry point: classify the raw arguments and produce an
/// envelope. Exactly three arguments ending in a callback select the
/// background shape, whatever the first two arguments are; exactly two
/// linked HTTP handles select the HTTP shape. Anything else is a no-op.
pub fn normalize(args: Vec<TriggerArg>) -> Option<Envelope> {
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next(), args.next()) {
        (Some(first), Some(second), Some(TriggerArg::Callback(done)), None) => {
            let payload = into_value(first)?;
            let context = into_value(second)?;
            Some(background_envelope(payload, context, done))
        }
        (Some(TriggerArg::Request(request)), Some(TriggerArg::Response(response)), None, None) => {
            http_envelope(request, response)
        }
        _ => {
            debug!("unrecognized trigger shape; ignoring");
            None
        }
    }
}
