//! Macros for building effect descriptors.

/// Build an [`Effect::Call`](crate::Effect::Call) from a [`Func`](crate::Func)
/// and any number of arguments.
///
/// Each argument goes through `serde_json::json!`, so literals, JSON
/// expressions and serializable values can be mixed freely. Anything longer
/// than a single token tree (a method call, say) goes in parentheses.
///
/// # Example
///
/// ```ignore
/// use effectsaga_core::{invoke, sagas::delay};
///
/// let effect = invoke!(delay(), 1000);
/// let fetch_page = invoke!(fetch, (url.clone()), { "page": 2 });
/// ```
#[macro_export]
macro_rules! invoke {
    ($func:expr $(, $arg:tt)* $(,)?) => {
        $crate::invoke($func, [$($crate::serde_json::json!($arg)),*])
    };
}
