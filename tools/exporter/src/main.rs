/// Classification exporter: composes labeled source segmentations and writes
/// the land-cover GeoTIFF plus its JSON sidecars.
///
/// Outputs (in `--output`):
///   land-cover.tif           signed 8/16-bit classes, -1 = unlabeled / no data
///   pixel-mapping.json       class id → classification path
///   land-cover-colors.json   class id → [r, g, b] in 0..=1
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use darshan_core::{
    transform, ClassificationExport, ClassificationHierarchy, ClusterId, ClusterLabel, CompositeRules,
    Compositor, GeoKeys, GeoTransform, LabelTable, Priority, ProjectionMetadata, Raster, RasterMetadata,
    SegmentedRaster, NODATA,
};
use serde::de::DeserializeOwned;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "exporter",
    about = "Compose labeled segmentations and export a land-cover GeoTIFF"
)]
struct Args {
    /// Source segmentation as KEY=PATH, repeatable (e.g. k10=data/k10.tif)
    #[arg(short, long = "source", value_parser = parse_source, required = true)]
    sources: Vec<(String, PathBuf)>,

    /// Label tables by segmentation key: {"k10": {"3": "land.forest"}}
    #[arg(long)]
    labels: PathBuf,

    /// Taxonomy tree JSON
    #[arg(long)]
    hierarchy: PathBuf,

    /// Flat classification path → color JSON
    #[arg(long)]
    colors: PathBuf,

    /// Which segmentation wins a pixel several of them label
    #[arg(long, value_enum, default_value = "highest-k")]
    priority: PriorityArg,

    /// Truncate classification paths to this many segments
    #[arg(long)]
    level: Option<usize>,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "export")]
    output: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PriorityArg {
    HighestK,
    LowestK,
    MostSpecific,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::HighestK => Priority::HighestK,
            PriorityArg::LowestK => Priority::LowestK,
            PriorityArg::MostSpecific => Priority::MostSpecific,
        }
    }
}

fn parse_source(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((key, path)) if !key.is_empty() && !path.is_empty() => Ok((key.to_string(), PathBuf::from(path))),
        _ => Err(format!("expected KEY=PATH, got {s:?}")),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

// ── GeoTIFF in ───────────────────────────────────────────────────────────────

fn read_projection<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<ProjectionMetadata> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok();
    if scale.is_none() && tiepoint.is_none() && keys.is_none() {
        return None;
    }
    Some(ProjectionMetadata {
        geo_keys: keys.map(|dir| GeoKeys::from_directory(&dir)),
        model_pixel_scale: scale.unwrap_or_default(),
        model_tiepoint: tiepoint.unwrap_or_default(),
    })
}

fn to_cluster_ids(image: DecodingResult) -> Result<Vec<ClusterId>> {
    let narrow = |v: Vec<u32>| -> Result<Vec<ClusterId>> {
        v.into_iter()
            .map(|x| ClusterId::try_from(x).context("cluster id out of range"))
            .collect()
    };
    Ok(match image {
        DecodingResult::U8(v) => v.into_iter().map(ClusterId::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(ClusterId::from).collect(),
        DecodingResult::U32(v) => narrow(v)?,
        DecodingResult::I8(v) => v.into_iter().map(ClusterId::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(ClusterId::from).collect(),
        DecodingResult::I32(v) => v,
        DecodingResult::F32(v) => v.into_iter().map(|x| x.round() as ClusterId).collect(),
        DecodingResult::F64(v) => v.into_iter().map(|x| x.round() as ClusterId).collect(),
        _ => bail!("unsupported sample type for a segmentation"),
    })
}

/// GDAL writes no-data as ASCII. Values that are not finite or do not fit a
/// cluster id cannot match any cell and are ignored.
fn parse_nodata(raw: &str) -> Option<ClusterId> {
    let text = raw.trim().trim_end_matches('\0');
    let value = text.parse::<f64>().ok()?;
    if !value.is_finite() || value < f64::from(ClusterId::MIN) || value > f64::from(ClusterId::MAX) {
        warn!(nodata = text, "ignoring unusable no-data value");
        return None;
    }
    Some(value.round() as ClusterId)
}

/// Decode one source segmentation. The GDAL no-data value, when declared,
/// is normalized to NODATA; every cluster starts unlabeled.
fn read_segmentation<R: Read + Seek>(reader: R) -> Result<SegmentedRaster> {
    let mut decoder = Decoder::new(reader).context("not a valid TIFF")?;
    let (w, h) = decoder.dimensions().context("missing dimensions")?;
    let (w, h) = (w as usize, h as usize);
    let projection = read_projection(&mut decoder);
    let nodata = decoder.get_tag_ascii_string(Tag::GdalNodata).ok().and_then(|s| parse_nodata(&s));
    let data = to_cluster_ids(decoder.read_image().context("read_image failed")?)?;

    let georef = match projection.as_ref().and_then(|p| p.geo_transform(w, h)) {
        Some(g) => g,
        None => {
            warn!(width = w, height = h, "no usable georeferencing; using pixel coordinates");
            GeoTransform::from_bounds(0.0, 0.0, w as f64, h as f64, w, h)
        }
    };

    let mut raster = Raster::new(w, h, data, georef)?;
    if let Some(nd) = nodata.filter(|&nd| nd != NODATA) {
        raster = transform::remap(&raster, |v| if v == nd { NODATA } else { v });
    }
    let raster = raster.with_metadata(RasterMetadata { nodata_value: nodata, projection });
    Ok(transform::create_segmented(raster, |_| ClusterLabel::unlabeled(None)))
}

// ── GeoTIFF out ──────────────────────────────────────────────────────────────

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    projection: &ProjectionMetadata,
) -> Result<()> {
    dir.write_tag(Tag::ModelPixelScaleTag, projection.model_pixel_scale.as_slice())?;
    dir.write_tag(Tag::ModelTiepointTag, projection.model_tiepoint.as_slice())?;
    let keys = projection.geo_keys.unwrap_or_default().to_directory();
    dir.write_tag(Tag::GeoKeyDirectoryTag, keys.as_slice())?;
    dir.write_tag(Tag::GdalNodata, "-1")?;
    Ok(())
}

fn write_geotiff<W: Write + Seek>(writer: W, export: &ClassificationExport) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let (w, h) = (export.width as u32, export.height as u32);
    match export.values_i8() {
        Some(values) => {
            let mut image = encoder.new_image::<colortype::GrayI8>(w, h)?;
            write_geo_tags(image.encoder(), &export.projection)?;
            image.write_data(&values)?;
        }
        None => {
            let mut image = encoder.new_image::<colortype::GrayI16>(w, h)?;
            write_geo_tags(image.encoder(), &export.projection)?;
            image.write_data(&export.values)?;
        }
    }
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let tree: serde_json::Value = read_json(&args.hierarchy)?;
    let colors: HashMap<String, String> = read_json(&args.colors)?;
    let hierarchy = Arc::new(ClassificationHierarchy::from_parts(&tree, &colors).context("Invalid taxonomy")?);
    let labels: HashMap<String, LabelTable> = read_json(&args.labels)?;

    let mut sources = Vec::with_capacity(args.sources.len());
    for (key, path) in &args.sources {
        let file = fs::File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        let seg = read_segmentation(BufReader::new(file))
            .with_context(|| format!("Cannot decode {}", path.display()))?;
        info!(
            key = key.as_str(),
            width = seg.width(),
            height = seg.height(),
            clusters = seg.registry().len(),
            "loaded segmentation"
        );
        if !labels.contains_key(key) {
            warn!(key = key.as_str(), "no label table; segmentation contributes nothing");
        }
        sources.push((key.as_str(), seg));
    }

    let refs: Vec<(&str, &SegmentedRaster)> = sources.iter().map(|(k, s)| (*k, s)).collect();
    let rules = CompositeRules { priority: args.priority.into() };
    let composite = Compositor::new(Arc::clone(&hierarchy), rules)
        .compose(&refs, &labels)
        .context("Composition failed")?;

    let projection = composite.segmented.raster().metadata().projection.clone();
    let export = ClassificationExport::build(&composite.segmented, &hierarchy, args.level, projection.as_ref())
        .context("Export failed")?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    let tif_path = args.output.join("land-cover.tif");
    let file = fs::File::create(&tif_path).with_context(|| format!("Cannot create {}", tif_path.display()))?;
    write_geotiff(BufWriter::new(file), &export)
        .with_context(|| format!("Write failed: {}", tif_path.display()))?;

    let mapping_path = args.output.join("pixel-mapping.json");
    fs::write(&mapping_path, export.pixel_mapping_json()?)
        .with_context(|| format!("Write failed: {}", mapping_path.display()))?;
    let colors_path = args.output.join("land-cover-colors.json");
    fs::write(&colors_path, export.color_mapping_json()?)
        .with_context(|| format!("Write failed: {}", colors_path.display()))?;

    info!(
        output = %args.output.display(),
        classes = export.pixel_mapping.len(),
        unlabeled_pixels = export.unlabeled_pixels,
        format = ?export.sample_format,
        "export complete"
    );
    Ok(())
}
