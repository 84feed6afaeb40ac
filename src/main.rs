use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use csv::{ReaderBuilder, WriterBuilder};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use spheresmooth::{
    ControlPolygon, FitRecord, SplineFitOptions, SplineFitResult, SplineInit,
    cartesian_to_latlon_degrees, lambda_grid, latlon_degrees_to_cartesian,
    penalized_linear_spherical_spline, spherical_to_cartesian,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (build ",
    env!("SPHERESMOOTH_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "spheresmooth")]
#[command(version = VERSION)]
#[command(about = "Penalized piecewise-geodesic smoothing on the sphere", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Fit(FitArgs),
    Curve(CurveArgs),
}

#[derive(Args, Debug)]
struct FitArgs {
    /// CSV with a header row and columns `t`, then two angular coordinates.
    data: PathBuf,
    /// Read the coordinates as (latitude, longitude) instead of
    /// (colatitude, longitude).
    #[arg(long = "latlon", default_value_t = false)]
    latlon: bool,
    /// Angles are in radians rather than degrees.
    #[arg(long = "radians", default_value_t = false)]
    radians: bool,
    /// Initial number of control points.
    #[arg(long = "dimension", default_value_t = 10)]
    dimension: usize,
    #[arg(long = "lambda-min", default_value_t = 1e-5)]
    lambda_min: f64,
    #[arg(long = "lambda-max", default_value_t = 1e-1)]
    lambda_max: f64,
    #[arg(long = "num-lambdas", default_value_t = 20)]
    num_lambdas: usize,
    /// JSON file with optimizer options; missing fields take their defaults.
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Write every fit of the sweep as JSON.
    #[arg(long = "out")]
    out: Option<PathBuf>,
    /// Write the best fit sampled as latitude/longitude CSV.
    #[arg(long = "curve")]
    curve: Option<PathBuf>,
    #[arg(long = "samples", default_value_t = 200)]
    samples: usize,
}

#[derive(Args, Debug)]
struct CurveArgs {
    /// JSON written by `fit --out`.
    model: PathBuf,
    /// Fit to sample; defaults to the minimum-BIC fit.
    #[arg(long = "index")]
    index: Option<usize>,
    #[arg(long = "samples", default_value_t = 200)]
    samples: usize,
    /// Output CSV; standard output when omitted.
    #[arg(long = "out")]
    out: Option<PathBuf>,
}

const MODEL_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SavedSweep {
    version: u32,
    options: SplineFitOptions,
    lambdas: Vec<f64>,
    result: SplineFitResult,
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Fit(args) => run_fit(args),
        Command::Curve(args) => run_curve(args),
    }
}

fn run_fit(args: FitArgs) -> Result<(), String> {
    let (t, y) = load_observations(&args.data, args.latlon, args.radians)?;
    let options = match &args.config {
        Some(path) => load_options(path)?,
        None => SplineFitOptions::default(),
    };
    let lambdas = lambda_grid(args.lambda_min, args.lambda_max, args.num_lambdas)
        .map_err(|e| format!("invalid lambda grid: {e}"))?;

    let result = penalized_linear_spherical_spline(
        t.view(),
        y.view(),
        &SplineInit::with_dimension(args.dimension),
        &lambdas,
        &options,
    )
    .map_err(|e| format!("spline fit failed: {e}"))?;

    print_sweep(&result);

    if let Some(path) = &args.curve {
        let best = result
            .best_fit()
            .ok_or_else(|| "no fit has a finite BIC".to_string())?;
        write_curve(best, args.samples, Some(path))?;
    }
    if let Some(path) = &args.out {
        let saved = SavedSweep {
            version: MODEL_VERSION,
            options,
            lambdas,
            result,
        };
        let payload = serde_json::to_string_pretty(&saved)
            .map_err(|e| format!("failed to serialize fit: {e}"))?;
        fs::write(path, payload)
            .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;
    }
    Ok(())
}

fn run_curve(args: CurveArgs) -> Result<(), String> {
    let payload = fs::read_to_string(&args.model)
        .map_err(|e| format!("failed to read '{}': {e}", args.model.display()))?;
    let saved: SavedSweep =
        serde_json::from_str(&payload).map_err(|e| format!("failed to parse fit json: {e}"))?;
    if saved.version != MODEL_VERSION {
        return Err(format!(
            "unsupported fit file version {} (expected {MODEL_VERSION})",
            saved.version
        ));
    }
    let record = match args.index {
        Some(i) => saved.result.fits.get(i).ok_or_else(|| {
            format!(
                "fit index {i} out of range ({} fits)",
                saved.result.fits.len()
            )
        })?,
        None => saved
            .result
            .best_fit()
            .ok_or_else(|| "no fit has a finite BIC".to_string())?,
    };
    write_curve(record, args.samples, args.out.as_deref())
}

fn load_options(path: &Path) -> Result<SplineFitOptions, String> {
    let payload = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
    let options: SplineFitOptions =
        serde_json::from_str(&payload).map_err(|e| format!("failed to parse config json: {e}"))?;
    options
        .validate()
        .map_err(|e| format!("invalid config: {e}"))?;
    Ok(options)
}

/// Reads `t` and two angle columns, sorts by `t`, and returns unit vectors.
fn load_observations(
    path: &Path,
    latlon: bool,
    radians: bool,
) -> Result<(Array1<f64>, Array2<f64>), String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to open csv '{}': {e}", path.display()))?;

    let headers = rdr
        .headers()
        .map_err(|e| format!("failed to read csv headers: {e}"))?
        .clone();
    if headers.len() < 3 {
        return Err(format!(
            "csv needs at least 3 columns (t and two angles), got {}",
            headers.len()
        ));
    }

    let mut rows: Vec<[f64; 3]> = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let record = rec.map_err(|e| format!("failed reading csv row: {e}"))?;
        let mut values = [0.0; 3];
        for (j, value) in values.iter_mut().enumerate() {
            let raw = record
                .get(j)
                .ok_or_else(|| format!("missing field at row {}, col {}", i + 1, j + 1))?
                .trim();
            *value = raw.parse::<f64>().map_err(|_| {
                format!(
                    "non-numeric value '{raw}' at row {}, column '{}'",
                    i + 1,
                    &headers[j]
                )
            })?;
        }
        rows.push(values);
    }
    if rows.is_empty() {
        return Err("csv has no rows".to_string());
    }
    rows.sort_by(|a, b| a[0].total_cmp(&b[0]));

    let t = Array1::from_iter(rows.iter().map(|r| r[0]));
    let mut angles = Array2::<f64>::zeros((rows.len(), 2));
    for (i, r) in rows.iter().enumerate() {
        angles[[i, 0]] = r[1];
        angles[[i, 1]] = r[2];
    }

    let y = match (latlon, radians) {
        (true, false) => latlon_degrees_to_cartesian(angles.view()),
        (true, true) => latlon_degrees_to_cartesian(angles.mapv(f64::to_degrees).view()),
        (false, false) => spherical_to_cartesian(angles.mapv(f64::to_radians).view()),
        (false, true) => spherical_to_cartesian(angles.view()),
    }
    .map_err(|e| format!("failed to convert coordinates: {e}"))?;
    Ok((t, y))
}

fn print_sweep(result: &SplineFitResult) {
    let best = result.best_index();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "", "lambda", "dimension", "loss", "penalty", "BIC", "iters",
        ]);
    for (i, fit) in result.fits.iter().enumerate() {
        let marker = if Some(i) == best { "*" } else { "" };
        let iters = if fit.converged {
            fit.iterations.to_string()
        } else {
            format!("{} (max)", fit.iterations)
        };
        table.add_row(Row::from(vec![
            Cell::new(marker),
            Cell::new(format!("{:.4e}", fit.lambda)),
            Cell::new(fit.dimension),
            Cell::new(format!("{:.6e}", fit.loss)),
            Cell::new(format!("{:.6e}", fit.penalty)),
            Cell::new(format!("{:.4}", fit.bic)),
            Cell::new(iters),
        ]));
    }
    println!("Lambda sweep (* = minimum BIC):");
    println!("{table}");
}

/// Samples a fit on `samples` equally spaced times across its knot range and
/// writes `t,latitude,longitude` rows.
fn write_curve(record: &FitRecord, samples: usize, path: Option<&Path>) -> Result<(), String> {
    if samples == 0 {
        return Err("--samples must be at least 1".to_string());
    }
    let polygon: ControlPolygon = record
        .polygon()
        .map_err(|e| format!("stored fit is not a valid polygon: {e}"))?;
    let knots = polygon.knots();
    let (lo, hi) = (knots[0], knots[knots.len() - 1]);
    // Half-open range: the final knot itself has no curve point.
    let t = Array1::from_iter((0..samples).map(|i| lo + (hi - lo) * i as f64 / samples as f64));
    let curve = polygon.evaluate(t.view());
    let lat_lon = cartesian_to_latlon_degrees(curve.view())
        .map_err(|e| format!("failed to convert curve: {e}"))?;

    let sink: Box<dyn Write> = match path {
        Some(p) => Box::new(
            fs::File::create(p)
                .map_err(|e| format!("failed to create output csv '{}': {e}", p.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(sink);
    wtr.write_record(["t", "latitude", "longitude"])
        .map_err(|e| format!("failed to write csv header: {e}"))?;
    for (i, row) in lat_lon.axis_iter(Axis(0)).enumerate() {
        wtr.write_record([
            format!("{:.12}", t[i]),
            format!("{:.12}", row[0]),
            format!("{:.12}", row[1]),
        ])
        .map_err(|e| format!("failed to write csv row {i}: {e}"))?;
    }
    wtr.flush()
        .map_err(|e| format!("failed to flush csv output: {e}"))?;
    Ok(())
}
