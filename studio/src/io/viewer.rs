//! Self-contained 3Dmol.js pages for a finished structure

use itertools::iproduct;
use nalgebra::Vector3;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use structure::{ConstructionError, StructureState};
use thiserror::Error;
use tracing::info;

pub const MAX_REPEAT: usize = 10;

/// matplotlib's tab10 palette.
const TAB10: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const MAX_SPHERE_SCALE: f64 = 0.5;
const AXIS_ORIGIN: [f64; 3] = [-7.0, 0.0, 0.0];
const LEGEND_START: [f64; 3] = [-15.0, -5.0, 0.0];
const LEGEND_STEP: [f64; 3] = [0.0, 5.0, 0.0];

// Unit-cell box edges as corner index pairs; corners are
// 0, a, b, c, a+b, a+c, b+c, a+b+c.
const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (0, 2),
    (0, 3),
    (1, 4),
    (1, 5),
    (2, 4),
    (2, 6),
    (3, 5),
    (3, 6),
    (4, 7),
    (5, 7),
    (6, 7),
];

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>@TITLE@</title>
<script src="@SCRIPT@"></script>
</head>
<body>
<div id="viewer" style="width: @WIDTH@px; height: @HEIGHT@px; position: relative;"></div>
<script>
const scene = @SCENE@;
const point = (p) => ({ x: p[0], y: p[1], z: p[2] });
const viewer = $3Dmol.createViewer(document.getElementById("viewer"), { backgroundColor: "white" });
viewer.addModel(scene.xyz, "xyz");
for (const s of scene.styles) {
  viewer.setStyle({ serial: s.serial }, { sphere: { scale: s.scale, color: s.color } });
}
for (const l of scene.lines) {
  viewer.addLine({ start: point(l.start), end: point(l.end), color: l.color });
}
for (const a of scene.axes) {
  viewer.addArrow({ start: point(a.start), end: point(a.end), color: a.color, radius: 0.1 });
  viewer.addLabel(a.label, { position: point(a.label_position), fontSize: 17, backgroundColor: "white", fontColor: a.color });
}
for (const e of scene.legend) {
  viewer.addSphere({ center: point(e.sphere), radius: 1, color: e.color });
  viewer.addLabel(e.symbol, { position: point(e.position), fontSize: scene.legend_font_size, backgroundColor: "white", fontColor: e.color });
}
viewer.zoomTo();
viewer.render();
</script>
</body>
</html>
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewOptions {
    pub repeat: usize,
    pub width: u32,
    pub height: u32,
    pub script_url: String,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("repeat count {0} must be between 1 and {MAX_REPEAT}")]
    RepeatOutOfRange(usize),

    #[error("cannot render an empty structure")]
    EmptyStructure,

    #[error("failed to build supercell: {0}")]
    Supercell(#[from] ConstructionError),

    #[error("failed to write view {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Colour of element `index` out of `count`, sampled evenly across the
/// palette.
fn palette_color(index: usize, count: usize) -> &'static str {
    if count <= 1 {
        return TAB10[0];
    }
    let x = index as f64 / (count - 1) as f64;
    let slot = ((x * TAB10.len() as f64).floor() as usize).min(TAB10.len() - 1);
    TAB10[slot]
}

fn point(v: &Vector3<f64>) -> Value {
    json!([v.x, v.y, v.z])
}

pub fn to_xyz(structure: &StructureState, comment: &str) -> String {
    let mut xyz = format!("{}\n{}\n", structure.len(), comment);
    for (symbol, p) in structure.symbols().iter().zip(structure.positions()) {
        // writing to a String cannot fail
        let _ = writeln!(xyz, "{} {:.8} {:.8} {:.8}", symbol, p.x, p.y, p.z);
    }
    xyz
}

/// Scene description consumed by the page script.
pub fn build_scene(structure: &StructureState, repeat: usize) -> Result<Value, RenderError> {
    if !(1..=MAX_REPEAT).contains(&repeat) {
        return Err(RenderError::RepeatOutOfRange(repeat));
    }
    if structure.is_empty() {
        return Err(RenderError::EmptyStructure);
    }

    let supercell = structure.repeat([repeat; 3])?;
    let masses = supercell.masses();
    let max_mass = masses.iter().cloned().fold(0.0, f64::max);
    let scale = |mass: f64| {
        if max_mass > 0.0 {
            mass / max_mass * MAX_SPHERE_SCALE
        } else {
            MAX_SPHERE_SCALE
        }
    };

    // sorted unique symbols -> (colour, mass)
    let mut elements: BTreeMap<&str, f64> = BTreeMap::new();
    for (symbol, &mass) in supercell.symbols().iter().zip(&masses) {
        elements.entry(symbol.as_str()).or_insert(mass);
    }
    let count = elements.len();
    let colors: BTreeMap<&str, &str> = elements
        .keys()
        .enumerate()
        .map(|(i, &symbol)| (symbol, palette_color(i, count)))
        .collect();

    let styles: Vec<Value> = supercell
        .symbols()
        .iter()
        .zip(&masses)
        .enumerate()
        .map(|(serial, (symbol, &mass))| {
            json!({
                "serial": serial,
                "scale": scale(mass),
                "color": colors[symbol.as_str()],
            })
        })
        .collect();

    let lattice = structure.lattice();
    let (a, b, c) = (lattice.vector(0), lattice.vector(1), lattice.vector(2));
    let corners = [
        Vector3::zeros(),
        a,
        b,
        c,
        a + b,
        a + c,
        b + c,
        a + b + c,
    ];
    let mut lines: Vec<Value> = EDGES
        .iter()
        .map(|&(s, e)| json!({"start": point(&corners[s]), "end": point(&corners[e]), "color": "black"}))
        .collect();
    for (nx, ny, nz) in iproduct!(0..repeat, 0..repeat, 0..repeat) {
        let shift = a * nx as f64 + b * ny as f64 + c * nz as f64;
        lines.extend(EDGES.iter().map(|&(s, e)| {
            json!({
                "start": point(&(corners[s] + shift)),
                "end": point(&(corners[e] + shift)),
                "color": "grey",
            })
        }));
    }

    let origin = Vector3::from(AXIS_ORIGIN);
    let axes: Vec<Value> = [(a, "red", "a"), (b, "green", "b"), (c, "blue", "c")]
        .iter()
        .map(|(v, color, label)| {
            let end = v + origin;
            json!({
                "start": point(&origin),
                "end": point(&end),
                "color": color,
                "label": label,
                "label_position": point(&(end * 1.01)),
            })
        })
        .collect();

    let legend_start = Vector3::from(LEGEND_START);
    let legend_step = Vector3::from(LEGEND_STEP);
    let legend: Vec<Value> = elements
        .iter()
        .enumerate()
        .map(|(i, (&symbol, &mass))| {
            let position = legend_start + legend_step * i as f64;
            json!({
                "symbol": symbol,
                "color": colors[symbol],
                "scale": scale(mass),
                "position": point(&position),
                "sphere": point(&(position - Vector3::new(1.0, 0.0, 0.0))),
            })
        })
        .collect();
    let legend_font_size = 18usize.saturating_sub(count).max(12);

    Ok(json!({
        "xyz": to_xyz(&supercell, &format!("{repeat}x{repeat}x{repeat} supercell")),
        "styles": styles,
        "lines": lines,
        "axes": axes,
        "legend": legend,
        "legend_font_size": legend_font_size,
    }))
}

/// Full HTML page for `structure`.
pub fn render_html(
    structure: &StructureState,
    title: &str,
    options: &ViewOptions,
) -> Result<String, RenderError> {
    let scene = build_scene(structure, options.repeat)?;
    Ok(TEMPLATE
        .replace("@TITLE@", title)
        .replace("@SCRIPT@", &options.script_url)
        .replace("@WIDTH@", &options.width.to_string())
        .replace("@HEIGHT@", &options.height.to_string())
        .replace("@SCENE@", &scene.to_string()))
}

/// Render and write `<dir>/<stage>.html`.
pub fn write_view(
    structure: &StructureState,
    stage: &str,
    dir: &Path,
    options: &ViewOptions,
) -> Result<PathBuf, RenderError> {
    let html = render_html(structure, &format!("{stage} structure"), options)?;
    let path = dir.join(format!("{stage}.html"));
    let write_error = |source| RenderError::Write {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(dir).map_err(write_error)?;
    fs::write(&path, html).map_err(write_error)?;
    info!("View of {} structure written to {}", stage, path.display());
    Ok(path)
}
