//! Domain objects of a Strata hierarchy.
//!
//! A [`Series`] is the root of one stored file. It holds root attributes and
//! a [`Container`] of [`Mesh`]es; each mesh holds schema attributes and
//! [`RecordComponent`]s. Every object pairs an [`Attributable`] with the
//! [`Writable`](strata_io::Writable) that ties it to the backend.
//!
//! Domain objects never perform I/O on their own. Flushing enqueues tasks on
//! the series' [`IoHandler`](strata_io::IoHandler); reading issues the
//! round trips it needs and reconciles local state with storage, dropping
//! children that are gone ([`EraseStaleEntries`]) and skipping children that
//! fail to read.

pub mod attributable;
pub mod config;
pub mod container;
pub mod error;
pub mod mesh;
pub mod record_component;
pub mod series;
pub mod stale;

// Re-export primary types at crate root for ergonomic imports.
pub use attributable::{Attributable, ReadMode};
pub use config::SessionConfig;
pub use container::{Container, Node};
pub use error::{ModelError, ModelResult};
pub use mesh::{DataOrder, FloatingPoint, Geometry, Mesh, MeshState, UnitDimension};
pub use record_component::{Dataset, RecordComponent, SCALAR};
pub use series::{Series, SCHEMA_VERSION};
pub use stale::EraseStaleEntries;
