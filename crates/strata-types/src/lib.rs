//! Foundation types for Strata.
//!
//! This crate defines the closed catalog of attribute kinds and the
//! type-erased value that carries them. Every other Strata crate depends on
//! `strata-types`.
//!
//! # Key Types
//!
//! - [`Datatype`] — The kind tag: scalars, their sequences, and a fixed
//!   seven-element double array
//! - [`Attribute`] — Tagged value with exact ([`Attribute::get`]) and
//!   lossless-conversion ([`Attribute::get_optional`]) retrieval
//! - [`AttributeType`] — Maps a Rust type onto its kind tag
//!
//! # Conversion Rules
//!
//! Exact retrieval succeeds only on a matching tag. Lossless retrieval
//! additionally widens integers, turns integers into double precision,
//! promotes single precision to double, lifts a scalar into a one-element
//! sequence and converts sequences element-wise. It never turns floating
//! point into an integer and never returns truncated data.

pub mod attribute;
pub mod datatype;
pub mod error;

pub use attribute::{Attribute, AttributeType, Element, LongDouble};
pub use datatype::Datatype;
pub use error::TypeError;
