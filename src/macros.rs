pub use enclose::*;

/// Declares a memoized derived value. The parenthesized list clones
/// the named handles into the closure, `enclose` style.
#[macro_export]
macro_rules! computed {
    (( $($capture:tt)* ) $cx:ident => $($body:tt)*) => {
        $crate::Computed::new($crate::macros::enclose!(( $($capture)* ) Box::new(move |$cx: &$crate::Evaluation| { $($body)* })))
    };
    ($cx:ident => $($body:tt)*) => {
        $crate::Computed::new(Box::new(move |$cx: &$crate::Evaluation| { $($body)* }))
    };
}

/// Declares a reaction; the body runs once immediately and re-runs
/// whenever a dependency changes.
#[macro_export]
macro_rules! reaction {
    (( $($capture:tt)* ) $cx:ident => $($body:tt)*) => {
        $crate::Reaction::new($crate::macros::enclose!(( $($capture)* ) Box::new(move |$cx: &$crate::Evaluation| { $($body)* })))
    };
    ($cx:ident => $($body:tt)*) => {
        $crate::Reaction::new(Box::new(move |$cx: &$crate::Evaluation| { $($body)* }))
    };
}
