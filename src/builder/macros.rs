//! Macros for declaring transition tables.

/// Build a [`TransitionTable`](crate::core::TransitionTable) of plain edges.
///
/// States listed with an empty body are declared without actions.
///
/// # Example
///
/// ```
/// use stentor::transitions;
///
/// let table = transitions! {
///     idle => { run => running },
///     running => { stop => idle, finish => done },
///     done => {},
/// };
///
/// assert!(table.lookup("idle", "run").is_some());
/// assert!(table.contains_state("done"));
/// assert_eq!(table.uncovered_targets(), vec!["done".to_string()]);
/// ```
#[macro_export]
macro_rules! transitions {
    (
        $(
            $state:ident => {
                $( $action:ident => $target:ident ),* $(,)?
            }
        ),* $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut table = $crate::core::TransitionTable::new();
        $(
            table.declare_state(stringify!($state));
            $(
                table.insert(
                    stringify!($state),
                    stringify!($action),
                    $crate::core::Transition::target(stringify!($target)),
                );
            )*
        )*
        table
    }};
}
