//! Generated values paired with opaque shrink bookkeeping.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque per-value shrink state. Only the arbitrary that attached a context
/// may downcast it; inspecting it generically is a contract violation.
pub type ShrinkContext = Arc<dyn Any + Send + Sync>;

/// An immutable wrapper pairing a generated value with the shrink context of
/// the arbitrary that produced it.
///
/// Two values holding the same `value` may carry different contexts: the
/// context records where in its shrink walk the producing arbitrary stands
/// (a search window bound, a chosen branch index, per-component contexts),
/// not anything about the value itself.
pub struct Value<T> {
    value: T,
    context: Option<ShrinkContext>,
}

impl<T> Value<T> {
    /// Wrap a bare value with no shrink history, e.g. a user-supplied
    /// example. Arbitraries report via `can_shrink_without_context` whether
    /// such a value is still shrinkable.
    pub fn new(value: T) -> Self {
        Self {
            value,
            context: None,
        }
    }

    /// Wrap a value together with its producer's shrink context.
    pub fn with_context(value: T, context: impl Any + Send + Sync) -> Self {
        Self {
            value,
            context: Some(Arc::new(context)),
        }
    }

    /// Wrap a value with an already-shared context.
    pub fn with_shared_context(value: T, context: ShrinkContext) -> Self {
        Self {
            value,
            context: Some(context),
        }
    }

    /// The generated value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the wrapper, yielding the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// The raw context, if any.
    pub fn context(&self) -> Option<&ShrinkContext> {
        self.context.as_ref()
    }

    /// Downcast the context to the concrete type the owning arbitrary
    /// attached. Returns `None` for bare values or foreign contexts.
    pub fn context_as<C: Any>(&self) -> Option<&C> {
        self.context.as_ref().and_then(|c| c.downcast_ref::<C>())
    }
}

impl<T: Clone> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            context: self.context.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("value", &self.value)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}
