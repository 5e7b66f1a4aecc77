//! # PG Stay Core
//!
//! The functional core of the booking service: the [`Reducer`](reducer::Reducer)
//! trait, the [`Effect`](effect::Effect) values a reducer hands back to the
//! runtime, and the [`Clock`](environment::Clock) dependency injected through
//! the environment.
//!
//! A reducer owns every business rule. It validates an action against the
//! current state, mutates that state in place and describes any I/O it needs
//! (gateway calls, notifications, replies to a waiting caller) as effects. The
//! runtime crate executes those effects and feeds their resulting actions back.
//!
//! ```ignore
//! use pgstay_core::{reducer::Reducer, effect::Effect, smallvec, SmallVec};
//!
//! impl Reducer for LedgerReducer {
//!     type State = LedgerState;
//!     type Action = LedgerAction;
//!     type Environment = LedgerEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut LedgerState,
//!         action: LedgerAction,
//!         env: &LedgerEnvironment,
//!     ) -> SmallVec<[Effect<LedgerAction>; 4]> {
//!         match action {
//!             LedgerAction::Record { amount } => {
//!                 state.total += amount;
//!                 smallvec![Effect::None]
//!             }
//!         }
//!     }
//! }
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

mod effect_macros;

/// The reducer trait: all business logic lives behind it.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// Pure business logic for one feature.
    ///
    /// `reduce` must be deterministic given its inputs: time comes from the
    /// environment's clock and every side effect is returned as an [`Effect`]
    /// rather than performed. Most actions yield at most a handful of effects,
    /// so they are collected in a `SmallVec` that stays on the stack.
    pub trait Reducer {
        /// The state this reducer operates on
        type State;

        /// Every input the reducer accepts (commands and the events effects produce)
        type Action;

        /// Injected dependencies
        type Environment;

        /// Apply `action` to `state`, returning the effects to execute.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect descriptions returned by reducers and executed by the runtime.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// A side effect to be performed by the store.
    ///
    /// Effects are values. Nothing happens until the runtime executes them, which
    /// keeps reducers testable: a test can inspect the effects without running them.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Arbitrary async work.
        ///
        /// If the future resolves to `Some(action)` the action is broadcast to
        /// observers and fed back into the reducer.
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => write!(f, "Effect::None"),
                Self::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }
}

/// Dependencies injected into reducers.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of the current time.
    ///
    /// Reducers never call `Utc::now()` directly; production wires in
    /// [`SystemClock`], tests a fixed clock.
    pub trait Clock: Send + Sync {
        /// Current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
