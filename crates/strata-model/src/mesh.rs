use std::fmt;

use strata_io::parameter::{CreatePath, KeepSynchronous, ListDatasets, ListPaths, OpenPath};
use strata_io::{FilePosition, FlushParams, IoHandler, IoTask, Writable};
use strata_types::{Attribute, Datatype, Element, LongDouble};
use tracing::debug;

use crate::attributable::Attributable;
use crate::container::{Container, Node};
use crate::error::{ModelError, ModelResult};
use crate::record_component::{unexpected, RecordComponent, SCALAR};
use crate::stale::EraseStaleEntries;

/// Attributes every mesh must carry, read one round trip at a time.
const REQUIRED: [&str; 6] = [
    "geometry",
    "dataOrder",
    "axisLabels",
    "gridSpacing",
    "gridGlobalOffset",
    "gridUnitSI",
];

/// Coordinate system of a mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Geometry {
    Cartesian,
    ThetaMode,
    Cylindrical,
    Spherical,
    /// Any other geometry, stored with an `other:` prefix.
    Other(String),
}

impl Geometry {
    /// The stored attribute value.
    pub fn as_attribute(&self) -> String {
        match self {
            Self::Cartesian => "cartesian".into(),
            Self::ThetaMode => "thetaMode".into(),
            Self::Cylindrical => "cylindrical".into(),
            Self::Spherical => "spherical".into(),
            Self::Other(name) => format!("other:{name}"),
        }
    }
}

impl From<&str> for Geometry {
    fn from(value: &str) -> Self {
        match value {
            "cartesian" => Self::Cartesian,
            "thetaMode" => Self::ThetaMode,
            "cylindrical" => Self::Cylindrical,
            "spherical" => Self::Spherical,
            other => Self::Other(other.strip_prefix("other:").unwrap_or(other).to_string()),
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_attribute())
    }
}

/// Memory layout of a mesh's datasets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataOrder {
    /// Row-major.
    C,
    /// Column-major.
    F,
}

impl DataOrder {
    pub fn as_char(self) -> char {
        match self {
            Self::C => 'C',
            Self::F => 'F',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'C' => Some(Self::C),
            'F' => Some(Self::F),
            _ => None,
        }
    }
}

/// The seven SI base dimensions, in `unitDimension` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitDimension {
    /// Length.
    L,
    /// Mass.
    M,
    /// Time.
    T,
    /// Electric current.
    I,
    /// Thermodynamic temperature.
    Theta,
    /// Amount of substance.
    N,
    /// Luminous intensity.
    J,
}

/// Floating point kinds accepted for grid spacing and time offset.
pub trait FloatingPoint: Element {}

impl FloatingPoint for f32 {}
impl FloatingPoint for f64 {}
impl FloatingPoint for LongDouble {}

/// Where a mesh stands with respect to its backend node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshState {
    Unwritten,
    WrittenScalar,
    WrittenNonScalar,
}

/// A physical field on a grid: schema attributes plus its components.
///
/// A scalar mesh has exactly one component, keyed [`SCALAR`], which shares
/// the mesh's backend node.
#[derive(Debug)]
pub struct Mesh {
    attributable: Attributable,
    components: Container<RecordComponent>,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for Mesh {
    fn writable(&self) -> &Writable {
        self.attributable.writable()
    }
}

impl Mesh {
    pub fn new() -> Self {
        let mut attributable = Attributable::new();
        attributable.set_attribute("geometry", Geometry::Cartesian.as_attribute());
        attributable.set_attribute("dataOrder", "C");
        attributable.set_attribute("axisLabels", vec!["x".to_string()]);
        attributable.set_attribute("gridSpacing", vec![1.0f64]);
        attributable.set_attribute("gridGlobalOffset", vec![0.0f64]);
        attributable.set_attribute("gridUnitSI", 1.0f64);
        attributable.set_attribute("timeOffset", 0.0f32);
        attributable.set_attribute("unitDimension", [0.0f64; 7]);
        let components = Container::new(attributable.writable().clone());
        Self {
            attributable,
            components,
        }
    }

    pub fn attributes(&self) -> &Attributable {
        &self.attributable
    }

    pub fn attributes_mut(&mut self) -> &mut Attributable {
        &mut self.attributable
    }

    // ---------------------------------------------------------------
    // Schema attributes
    // ---------------------------------------------------------------

    pub fn geometry(&self) -> ModelResult<Geometry> {
        let name: String = self.attributable.get("geometry")?;
        Ok(Geometry::from(name.as_str()))
    }

    /// Set the geometry. Unknown names are stored with an `other:` prefix.
    pub fn set_geometry(&mut self, geometry: impl Into<Geometry>) -> &mut Self {
        self.attributable
            .set_attribute("geometry", geometry.into().as_attribute());
        self
    }

    pub fn geometry_parameters(&self) -> ModelResult<String> {
        self.attributable.get("geometryParameters")
    }

    pub fn set_geometry_parameters(&mut self, parameters: impl Into<String>) -> &mut Self {
        self.attributable
            .set_attribute("geometryParameters", parameters.into());
        self
    }

    pub fn data_order(&self) -> ModelResult<DataOrder> {
        let order: String = self.attributable.get("dataOrder")?;
        let mut chars = order.chars();
        match (chars.next().and_then(DataOrder::from_char), chars.next()) {
            (Some(order), None) => Ok(order),
            _ => Err(ModelError::WrongApiUsage(format!("invalid dataOrder {order:?}"))),
        }
    }

    pub fn set_data_order(&mut self, order: DataOrder) -> &mut Self {
        self.attributable
            .set_attribute("dataOrder", order.as_char().to_string());
        self
    }

    pub fn axis_labels(&self) -> ModelResult<Vec<String>> {
        self.attributable.get("axisLabels")
    }

    pub fn set_axis_labels<S: Into<String>>(&mut self, labels: impl IntoIterator<Item = S>) -> &mut Self {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        self.attributable.set_attribute("axisLabels", labels);
        self
    }

    pub fn grid_spacing<T: FloatingPoint>(&self) -> ModelResult<Vec<T>> {
        self.attributable.get("gridSpacing")
    }

    pub fn set_grid_spacing<T: FloatingPoint>(&mut self, spacing: Vec<T>) -> &mut Self {
        self.attributable.set_attribute("gridSpacing", spacing);
        self
    }

    pub fn grid_global_offset(&self) -> ModelResult<Vec<f64>> {
        self.attributable.get("gridGlobalOffset")
    }

    pub fn set_grid_global_offset(&mut self, offset: Vec<f64>) -> &mut Self {
        self.attributable.set_attribute("gridGlobalOffset", offset);
        self
    }

    pub fn grid_unit_si(&self) -> ModelResult<f64> {
        self.attributable.get("gridUnitSI")
    }

    pub fn set_grid_unit_si(&mut self, unit_si: f64) -> &mut Self {
        self.attributable.set_attribute("gridUnitSI", unit_si);
        self
    }

    pub fn unit_dimension(&self) -> ModelResult<[f64; 7]> {
        self.attributable.get("unitDimension")
    }

    /// Set the exponents of the given base dimensions, keeping the others.
    pub fn set_unit_dimension(&mut self, exponents: &[(UnitDimension, f64)]) -> ModelResult<&mut Self> {
        let mut dimension = self.unit_dimension()?;
        for &(unit, exponent) in exponents {
            dimension[unit as usize] = exponent;
        }
        self.attributable.set_attribute("unitDimension", dimension);
        Ok(self)
    }

    pub fn time_offset<T: FloatingPoint>(&self) -> ModelResult<T> {
        self.attributable.get("timeOffset")
    }

    pub fn set_time_offset<T: FloatingPoint>(&mut self, offset: T) -> &mut Self {
        self.attributable.set_attribute("timeOffset", offset);
        self
    }

    // ---------------------------------------------------------------
    // Components
    // ---------------------------------------------------------------

    pub fn components(&self) -> &Container<RecordComponent> {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&RecordComponent> {
        self.components.get(name)
    }

    /// The component called `name`, created if absent.
    pub fn component_mut(&mut self, name: &str) -> &mut RecordComponent {
        self.components.entry(name)
    }

    /// The only component of a scalar mesh, created if absent.
    pub fn scalar_mut(&mut self) -> &mut RecordComponent {
        self.components.entry(SCALAR)
    }

    pub fn is_scalar(&self) -> bool {
        self.components.contains(SCALAR)
    }

    pub fn state(&self) -> MeshState {
        match (self.attributable.written(), self.is_scalar()) {
            (false, _) => MeshState::Unwritten,
            (true, true) => MeshState::WrittenScalar,
            (true, false) => MeshState::WrittenNonScalar,
        }
    }

    // ---------------------------------------------------------------
    // Flush
    // ---------------------------------------------------------------

    /// Enqueue the tasks that bring the mesh to storage as `name` below its
    /// parent node.
    pub fn flush(&mut self, handler: &mut IoHandler, name: &str, params: &FlushParams) -> ModelResult<()> {
        let writable = self.attributable.writable().clone();
        let scalar = self.is_scalar();
        if scalar && self.components.len() > 1 {
            return Err(ModelError::WrongApiUsage(format!(
                "mesh {name} mixes the scalar component with named components"
            )));
        }

        if handler.access().is_read_only() {
            for (component_name, component) in self.components.iter_mut() {
                let component_name = if scalar { name } else { component_name };
                component.flush(handler, component_name, params)?;
            }
        } else if scalar {
            if let Some(component) = self.components.get_mut(SCALAR) {
                if let Some(parent) = writable.parent() {
                    component.writable().set_parent(&parent);
                }
                component.flush(handler, name, params)?;
                handler.enqueue(IoTask::new(
                    &writable,
                    KeepSynchronous {
                        other: component.writable().clone(),
                    },
                ));
            }
        } else {
            if !writable.written() {
                handler.enqueue(IoTask::new(&writable, CreatePath { path: name.to_string() }));
            }
            for (component_name, component) in self.components.iter_mut() {
                component.writable().set_parent(&writable);
                component.flush(handler, component_name, params)?;
            }
        }

        self.attributable.flush_attributes(handler, params)
    }

    // ---------------------------------------------------------------
    // Read
    // ---------------------------------------------------------------

    /// Open the group `name` below the parent node.
    pub(crate) fn open_path(&mut self, handler: &mut IoHandler, name: &str) -> ModelResult<()> {
        handler.enqueue(IoTask::new(
            self.attributable.writable(),
            OpenPath { path: name.to_string() },
        ));
        handler.flush(&FlushParams::default())?;
        Ok(())
    }

    /// Open the dataset `name` below `parent` as this mesh's scalar
    /// component, and share its node.
    pub(crate) fn open_scalar_dataset(
        &mut self,
        handler: &mut IoHandler,
        name: &str,
        parent: &Writable,
    ) -> ModelResult<()> {
        let writable = self.attributable.writable().clone();
        let component = self.components.entry(SCALAR);
        component.writable().set_parent(parent);
        component.open_dataset(handler, name)?;
        handler.enqueue(IoTask::new(
            &writable,
            KeepSynchronous {
                other: component.writable().clone(),
            },
        ));
        handler.flush(&FlushParams::default())?;
        Ok(())
    }

    /// Read the mesh's attributes and components. The mesh must be open.
    ///
    /// A component that fails to open or read is reported through the
    /// handler's diagnostics and dropped; the mesh read still succeeds.
    pub fn read(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        self.read_geometry(handler)?;
        self.read_data_order(handler)?;
        self.read_axis_labels(handler)?;
        self.read_grid_spacing(handler)?;
        self.read_grid_global_offset(handler)?;
        self.read_grid_unit_si(handler)?;
        self.attributable.reread(handler, &REQUIRED)?;
        self.read_components(handler)
    }

    fn read_geometry(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        let value = self.attributable.read_attribute(handler, "geometry")?;
        if value.dtype() != Datatype::String {
            return Err(unexpected("geometry", "STRING", value.dtype()).into());
        }
        self.attributable.set_read_attribute("geometry", value);
        Ok(())
    }

    fn read_data_order(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        let value = self.attributable.read_attribute(handler, "dataOrder")?;
        let order = match &value {
            Attribute::Char(c) => *c,
            Attribute::String(s) if s.chars().count() == 1 => s.chars().next().unwrap_or_default(),
            Attribute::String(s) => {
                return Err(content("dataOrder", format!("expected one character, found {s:?}")).into());
            }
            other => return Err(unexpected("dataOrder", "STRING or CHAR", other.dtype()).into()),
        };
        let Some(order) = DataOrder::from_char(order) else {
            return Err(content("dataOrder", format!("expected 'C' or 'F', found {order:?}")).into());
        };
        self.attributable
            .set_read_attribute("dataOrder", Attribute::new(order.as_char().to_string()));
        Ok(())
    }

    fn read_axis_labels(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        let value = self.attributable.read_attribute(handler, "axisLabels")?;
        let labels = match value {
            Attribute::VecString(labels) => labels,
            Attribute::String(label) => vec![label],
            other => return Err(unexpected("axisLabels", "VEC_STRING", other.dtype()).into()),
        };
        self.attributable
            .set_read_attribute("axisLabels", Attribute::new(labels));
        Ok(())
    }

    fn read_grid_spacing(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        let value = self.attributable.read_attribute(handler, "gridSpacing")?;
        let spacing = match value {
            Attribute::VecF32(_) | Attribute::VecF64(_) | Attribute::VecLongDouble(_) => value,
            Attribute::F32(v) => Attribute::new(vec![v]),
            Attribute::F64(v) => Attribute::new(vec![v]),
            Attribute::LongDouble(v) => Attribute::new(vec![v]),
            other => match other.get_optional::<Vec<f64>>() {
                Some(spacing) => Attribute::new(spacing),
                None => return Err(unexpected("gridSpacing", "VEC_DOUBLE", other.dtype()).into()),
            },
        };
        self.attributable.set_read_attribute("gridSpacing", spacing);
        Ok(())
    }

    fn read_grid_global_offset(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        let value = self.attributable.read_attribute(handler, "gridGlobalOffset")?;
        let Some(offset) = value.get_optional::<Vec<f64>>() else {
            return Err(unexpected("gridGlobalOffset", "VEC_F64", value.dtype()).into());
        };
        self.attributable
            .set_read_attribute("gridGlobalOffset", Attribute::new(offset));
        Ok(())
    }

    fn read_grid_unit_si(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        let value = self.attributable.read_attribute(handler, "gridUnitSI")?;
        let Some(unit_si) = value.get_optional::<f64>() else {
            return Err(unexpected("gridUnitSI", "F64", value.dtype()).into());
        };
        self.attributable
            .set_read_attribute("gridUnitSI", Attribute::new(unit_si));
        Ok(())
    }

    fn read_components(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        let writable = self.attributable.writable().clone();

        // Opened through its dataset: the mesh is its scalar component.
        if let Some(component) = self.components.get_mut(SCALAR) {
            return component.read(handler);
        }

        // A constant scalar mesh keeps value and shape on its own group.
        if self.attributable.contains_attribute("value") {
            let component = self.components.entry(SCALAR);
            component.open_constant_at(handler, &writable)?;
            return component.read(handler);
        }

        let paths = ListPaths::default();
        let datasets = ListDatasets::default();
        handler.enqueue(IoTask::new(&writable, paths.clone()));
        handler.enqueue(IoTask::new(&writable, datasets.clone()));
        handler.flush(&FlushParams::default())?;

        let base = writable.position().unwrap_or_else(FilePosition::root);
        let mut tracker = EraseStaleEntries::new(&mut self.components);
        for name in paths.paths.get()? {
            let component = tracker.at(&name);
            let result = component
                .open_constant(handler, &name)
                .and_then(|()| component.read(handler));
            skip_on_read_error(handler, &mut tracker, &base, &name, result)?;
        }
        for name in datasets.datasets.get()? {
            let component = tracker.at(&name);
            let result = component
                .open_dataset(handler, &name)
                .and_then(|()| component.read(handler));
            skip_on_read_error(handler, &mut tracker, &base, &name, result)?;
        }
        tracker.finish();
        debug!(mesh = %base, components = self.components.len(), "mesh read");
        Ok(())
    }
}

/// Turn a recoverable read failure of one child into a diagnostic and drop
/// the child. Other failures are returned.
pub(crate) fn skip_on_read_error<T: Node>(
    handler: &mut IoHandler,
    tracker: &mut EraseStaleEntries<'_, T>,
    base: &FilePosition,
    name: &str,
    result: ModelResult<()>,
) -> ModelResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_recoverable_read() => {
            handler.report(
                base.join(name).to_string(),
                format!("skipping {name} after read error: {err}"),
            );
            tracker.forget(name);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn content(attribute: &str, description: String) -> strata_io::ReadError {
    strata_io::ReadError::unexpected_content(
        strata_io::AffectedObject::Attribute,
        format!("unexpected value for '{attribute}': {description}"),
    )
}
