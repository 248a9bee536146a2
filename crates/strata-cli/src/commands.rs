use anyhow::Context;
use colored::Colorize;
use strata_io::{Access, FlushParams};
use strata_model::{Attributable, Dataset, RecordComponent, Series, SessionConfig, UnitDimension, SCALAR};
use strata_types::Datatype;
use tracing::info;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    match cli.command {
        Command::Inspect(args) => cmd_inspect(args, &config),
        Command::Convert(args) => cmd_convert(args, &config),
        Command::Demo(args) => cmd_demo(args, &config),
    }
}

fn cmd_inspect(args: InspectArgs, config: &SessionConfig) -> anyhow::Result<()> {
    let mut series = Series::open(&args.file, Access::ReadOnly, config)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    println!(
        "{} {} (schema {})",
        "series".bold(),
        series.name().cyan().bold(),
        series.schema_version()?
    );
    if !args.brief {
        print_attributes(series.attributes(), 1);
    }
    for (name, mesh) in series.meshes().iter() {
        let kind = if mesh.is_scalar() { "scalar mesh" } else { "mesh" };
        println!("  {} {}", kind.dimmed(), name.yellow().bold());
        if !args.brief {
            print_attributes(mesh.attributes(), 2);
        }
        for (component, record) in mesh.components().iter() {
            let depth = if component == SCALAR {
                2
            } else {
                println!("    {}", component.green());
                3
            };
            println!("{}{}", "  ".repeat(depth), describe_component(record).blue());
            if !args.brief {
                print_attributes(record.attributes(), depth);
            }
        }
    }
    for diagnostic in series.take_diagnostics() {
        println!("{} {}", "skipped".red(), diagnostic);
    }
    series.close()?;
    Ok(())
}

fn print_attributes(attributes: &Attributable, depth: usize) {
    let indent = "  ".repeat(depth);
    for name in attributes.attribute_names() {
        if let Ok(value) = attributes.get_attribute(name) {
            println!("{indent}{} = {} {}", name, value, value.dtype().to_string().dimmed());
        }
    }
}

fn describe_component(record: &RecordComponent) -> String {
    match (record.dataset(), record.constant_value()) {
        (Some(dataset), Some(value)) => format!("constant {value} over {:?}", dataset.extent),
        (Some(dataset), None) => format!("dataset {} {:?}", dataset.dtype, dataset.extent),
        (None, _) => "no dataset".to_string(),
    }
}

fn cmd_convert(args: ConvertArgs, config: &SessionConfig) -> anyhow::Result<()> {
    // The configured format applies to the output only.
    let input_config = SessionConfig {
        format: None,
        ..config.clone()
    };
    let mut input = Series::open(&args.input, Access::ReadOnly, &input_config)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    let mut output = Series::create(&args.output, config)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let meshes = copy_series(&mut input, &mut output)?;
    output.close()?;
    input.close()?;
    println!(
        "{} Converted {} meshes from {} to {}",
        "✓".green().bold(),
        meshes,
        args.input.display().to_string().bold(),
        args.output.display().to_string().bold()
    );
    Ok(())
}

/// Copy root attributes and every mesh of `input` into `output`.
pub(crate) fn copy_series(input: &mut Series, output: &mut Series) -> anyhow::Result<usize> {
    copy_attributes(input.attributes(), output.attributes_mut())?;
    let names: Vec<String> = input.meshes().names().map(str::to_string).collect();
    for name in &names {
        let (mesh, io) = input
            .mesh_and_handler(name)
            .with_context(|| format!("mesh {name} vanished"))?;

        let mut loads = Vec::new();
        for (component, record) in mesh.components().iter() {
            let Some(dataset) = record.dataset() else {
                continue;
            };
            if record.is_constant() || dataset.element_count() == Some(0) {
                continue;
            }
            let offset = vec![0; dataset.extent.len()];
            let slot = record.load_chunk(io, offset, dataset.extent.clone())?;
            loads.push((component.to_string(), slot));
        }
        io.flush(&FlushParams::default())?;

        let target = output.mesh_mut(name);
        copy_attributes(mesh.attributes(), target.attributes_mut())?;
        for (component, record) in mesh.components().iter() {
            let copy = target.component_mut(component);
            if let Some(dataset) = record.dataset() {
                copy.reset_dataset(dataset.clone())?;
            }
            if let Some(value) = record.constant_value() {
                copy.make_constant(value.clone())?;
            }
            copy_attributes(record.attributes(), copy.attributes_mut())?;
        }
        for (component, slot) in loads {
            let copy = target.component_mut(&component);
            let extent = copy
                .dataset()
                .map(|dataset| dataset.extent.clone())
                .unwrap_or_default();
            copy.store_chunk(vec![0; extent.len()], extent, slot.get()?)?;
        }
        info!(mesh = %name, "mesh copied");
    }
    Ok(names.len())
}

fn copy_attributes(from: &Attributable, to: &mut Attributable) -> anyhow::Result<()> {
    for name in from.attribute_names() {
        to.set_attribute(name, from.get_attribute(name)?.clone());
    }
    Ok(())
}

fn cmd_demo(args: DemoArgs, config: &SessionConfig) -> anyhow::Result<()> {
    let mut series = Series::create(&args.output, config)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    write_demo(&mut series)?;
    series.close()?;
    println!(
        "{} Wrote example series to {}",
        "✓".green().bold(),
        args.output.display().to_string().bold()
    );
    Ok(())
}

/// A vector mesh `E`, a scalar mesh `rho` and a constant mesh `B`.
pub(crate) fn write_demo(series: &mut Series) -> anyhow::Result<()> {
    series.attributes_mut().set_attribute("author", "strata demo");

    let e = series.mesh_mut("E");
    e.set_axis_labels(["x", "y"])
        .set_grid_spacing(vec![0.5f64, 0.5])
        .set_grid_global_offset(vec![0.0, 0.0]);
    e.set_unit_dimension(&[
        (UnitDimension::L, 1.0),
        (UnitDimension::M, 1.0),
        (UnitDimension::T, -3.0),
        (UnitDimension::I, -1.0),
    ])?;
    for (axis, sign) in [("x", 1.0), ("y", -1.0)] {
        let data: Vec<f64> = (0..6).map(|i| sign * f64::from(i)).collect();
        e.component_mut(axis)
            .reset_dataset(Dataset::new(Datatype::F64, vec![2, 3]))?
            .store_chunk(vec![0, 0], vec![2, 3], data)?;
    }

    let rho = series.mesh_mut("rho");
    rho.scalar_mut()
        .set_unit_si(1e3)
        .reset_dataset(Dataset::new(Datatype::F32, vec![4]))?
        .store_chunk(vec![0], vec![4], vec![1.0f32, 0.5, 0.25, 0.125])?;

    let b = series.mesh_mut("B");
    b.set_axis_labels(["x", "y"]);
    for (axis, value) in [("x", 0.0f64), ("y", 1.5)] {
        b.component_mut(axis)
            .reset_dataset(Dataset::new(Datatype::F64, vec![2, 3]))?
            .make_constant(value)?;
    }
    Ok(())
}
