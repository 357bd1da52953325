#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Verdict Manifest
//!
//! The declarative description of what gets validated and how, independent
//! of any particular object instance.
//!
//! - [`Manifest`]: an arena-backed tree of [`ManifestItem`]s with structural
//!   queries (depth, lowest common ancestor, paths) used by the engine's
//!   dependency resolver
//! - [`ManifestRule`] and [`DependencyRef`]: rules attached to items and the
//!   absolute references between them
//! - [`MemberAccessor`], [`IdentityAccessor`], [`CollectionEnumerator`] and
//!   [`TypeMatcher`]: pre-resolved functions the engine calls instead of
//!   inspecting types
//!
//! Values under validation are `serde_json::Value`s.

pub mod accessor;
pub mod error;
pub mod ids;
pub mod item;
pub mod manifest;
pub mod rule;

pub use accessor::{
    AccessorError, AccessorExceptionBehavior, CollectionEnumerator, IdentityAccessor,
    MemberAccessor, TypeMatcher,
};
pub use error::ManifestError;
pub use ids::{ItemId, ObjectIdentity, RuleDefId, RuleKey, TypeName};
pub use item::{ItemKind, ManifestItem};
pub use manifest::Manifest;
pub use rule::{DependencyRef, ManifestRule, RuleConfig, RuleDefinition};
