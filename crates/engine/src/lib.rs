#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Verdict Engine
//!
//! Rule execution for the Verdict validation library.
//!
//! Given a [`Manifest`](verdict_manifest::Manifest) and a root object, the
//! engine:
//! - materializes the [`ValueTree`] of every value under validation
//! - creates one [`ExecutableRule`] per value and applicable manifest rule,
//!   with logic supplied by the [`RuleRegistry`]
//! - resolves structural dependencies into edges between those rules and
//!   rejects cycles before anything runs
//! - runs rules in waves: a bounded parallel phase for parallel-safe rules,
//!   then the remaining ready rules one at a time
//! - collects a [`RuleResult`] per rule into a [`ValidationResult`]
//!
//! Rules whose dependencies did not pass are recorded as
//! [`RuleOutcome::DependencyFailed`] without running. Errors, panics and
//! timeouts in rule logic are contained as [`RuleOutcome::Errored`].
//!
//! The entry point is [`Validator`].

pub mod error;
pub mod graph;
pub mod identifier;
pub mod instantiate;
mod invoker;
pub mod materialize;
pub mod options;
pub mod plan;
pub mod registry;
pub mod resolve;
pub mod result;
pub mod rule;
mod scheduler;
pub mod validator;
pub mod value;

pub use error::EngineError;
pub use identifier::RuleIdentifier;
pub use instantiate::ExecutableRule;
pub use options::{RejectionPolicy, ValidationOptions};
pub use plan::ExecutionPlan;
pub use registry::{RuleFactory, RuleRegistry};
pub use result::{
    ResultAggregator, RuleInstrumentation, RuleOutcome, RuleResult, RuleResultEntry,
    ValidationResult,
};
pub use rule::{
    Ancestor, ParentRule, RuleContext, RuleError, RuleInterface, RuleLogic, RuleOutput, ValueRule,
};
pub use validator::Validator;
pub use value::{ValidatedValue, ValueId, ValueTree};
