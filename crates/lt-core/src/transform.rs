//! Transformation of raw observations into stored samples.
//!
//! Applications that only care about a subset of an observation (or need to
//! attach context of their own, like an active delivery or trip id) supply a
//! transformer; the tracer runs every raw observation through it before the
//! result is offered to the store. Transformers must be pure: deterministic
//! and side-effect-free from the store's perspective.

/// Maps a raw observation into the store's sample representation.
pub trait LocationTransformer<R, S>: Send + Sync {
    fn transform(&self, raw: R) -> S;
}

/// Any pure closure is a transformer.
impl<R, S, F> LocationTransformer<R, S> for F
where
    F: Fn(R) -> S + Send + Sync,
{
    fn transform(&self, raw: R) -> S {
        self(raw)
    }
}

/// A transformer that stores observations as-is.
pub fn passthrough<R>() -> impl LocationTransformer<R, R> {
    |raw: R| raw
}
