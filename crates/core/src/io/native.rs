//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the
//! ModelPixelScale (33550) and ModelTiepoint (33922) tags, the CRS by an
//! EPSG entry in the GeoKeyDirectory (34735) and the no-data value by the
//! GDAL_NODATA (42113) ASCII tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{ChunkType, Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, Gray64Float, Gray8};
use tiff::encoder::{ImageEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Sample type written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplePrecision {
    /// 32-bit float samples
    #[default]
    Float32,
    /// 64-bit float samples
    Float64,
    /// 8-bit unsigned samples for categorical maps; values outside 0..=255
    /// are written as the raster's no-data (or 0)
    UInt8,
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Sample type of the written image
    pub precision: SamplePrecision,
}

/// Decoded image with all bands as f64 plus georeferencing
struct DecodedImage {
    rows: usize,
    cols: usize,
    bands: Vec<Vec<f64>>,
    transform: Option<GeoTransform>,
    crs: Option<CRS>,
    nodata: Option<f64>,
}

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let image = decode_geotiff(BufReader::new(file))?;
    first_band(image)
}

/// Read the first band of an in-memory GeoTIFF buffer
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    first_band(decode_geotiff(Cursor::new(data))?)
}

/// Read every band of a GeoTIFF file.
///
/// Bands come from interleaved samples of a multi-sample image or from
/// successive pages; all share the georeferencing of the first page.
pub fn read_geotiff_bands<P: AsRef<Path>>(path: P) -> Result<Vec<Raster<f64>>> {
    let file = File::open(path.as_ref())?;
    let image = decode_geotiff(BufReader::new(file))?;
    let DecodedImage {
        rows,
        cols,
        bands,
        transform,
        crs,
        nodata,
    } = image;

    bands
        .into_iter()
        .map(|band| {
            let mut raster = Raster::from_vec(band, rows, cols)?;
            if let Some(t) = transform {
                raster.set_transform(t);
            }
            raster.set_crs(crs.clone());
            raster.set_nodata(nodata);
            Ok(raster)
        })
        .collect()
}

fn first_band<T: RasterElement>(image: DecodedImage) -> Result<Raster<T>> {
    let DecodedImage {
        rows,
        cols,
        mut bands,
        transform,
        crs,
        nodata,
    } = image;

    if bands.is_empty() {
        return Err(Error::UnsupportedDataType("TIFF image has no samples".into()));
    }
    let values: Vec<T> = bands
        .swap_remove(0)
        .into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect();

    let mut raster = Raster::from_vec(values, rows, cols)?;
    if let Some(t) = transform {
        raster.set_transform(t);
    }
    raster.set_crs(crs);
    raster.set_nodata(nodata.and_then(num_traits::cast));
    Ok(raster)
}

/// Decode every page and sample of a TIFF from any `Read + Seek` source
fn decode_geotiff<R>(reader: R) -> Result<DecodedImage>
where
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let rows = height as usize;
    let cols = width as usize;

    let transform = read_geotransform(&mut decoder);
    let crs = read_crs(&mut decoder);
    let nodata = read_nodata(&mut decoder);

    let mut bands = Vec::new();
    loop {
        let (w, h) = decoder
            .dimensions()
            .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
        if (w as usize, h as usize) != (cols, rows) {
            return Err(Error::GeometryMismatch(format!(
                "TIFF page is {}x{} but the first page is {}x{}",
                w, h, cols, rows
            )));
        }

        let samples = samples_per_pixel(&mut decoder)?;
        let page = if samples > 1 && is_uncompressed_strips(&mut decoder)? {
            read_sample_planes(&mut decoder, rows * cols, samples)?
        } else {
            let result = decoder
                .read_image()
                .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;
            deinterleave(&decoding_result_to_f64(result)?, samples)
        };
        if page.len() != samples || page.iter().any(|band| band.len() != rows * cols) {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        bands.extend(page);

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| Error::Other(format!("Cannot advance to next TIFF page: {}", e)))?;
    }

    Ok(DecodedImage {
        rows,
        cols,
        bands,
        transform,
        crs,
        nodata,
    })
}

fn tiff_err(context: &'static str) -> impl Fn(tiff::TiffError) -> Error {
    move |e| Error::Other(format!("{}: {}", context, e))
}

/// Samples per pixel from the SamplesPerPixel tag (1 when absent)
fn samples_per_pixel<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<usize> {
    let samples = decoder
        .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)
        .map_err(tiff_err("Cannot read SamplesPerPixel"))?
        .unwrap_or(1);
    if samples == 0 {
        return Err(Error::UnsupportedDataType("TIFF image has no samples".into()));
    }
    Ok(samples as usize)
}

fn is_uncompressed_strips<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<bool> {
    let compression = decoder
        .find_tag_unsigned::<u16>(Tag::Compression)
        .map_err(tiff_err("Cannot read Compression"))?
        .unwrap_or(1);
    Ok(compression == 1 && decoder.get_chunk_type() == ChunkType::Strip)
}

/// Numeric layout of one stored sample
#[derive(Debug, Clone, Copy)]
enum SampleKind {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleKind {
    fn from_tags(format: u16, bits: u16) -> Result<Self> {
        match (format, bits) {
            (1, 8) => Ok(Self::U8),
            (1, 16) => Ok(Self::U16),
            (1, 32) => Ok(Self::U32),
            (2, 8) => Ok(Self::I8),
            (2, 16) => Ok(Self::I16),
            (2, 32) => Ok(Self::I32),
            (3, 32) => Ok(Self::F32),
            (3, 64) => Ok(Self::F64),
            _ => Err(Error::UnsupportedDataType(format!(
                "TIFF sample format {} with {} bits per sample",
                format, bits
            ))),
        }
    }

    fn bytes(self) -> u64 {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    fn read<R: Read + Seek>(self, decoder: &mut Decoder<R>) -> std::io::Result<f64> {
        Ok(match self {
            Self::U8 => f64::from(decoder.read_byte()?),
            Self::U16 => f64::from(decoder.read_short()?),
            Self::U32 => f64::from(decoder.read_long()?),
            Self::I8 => f64::from(decoder.read_byte()? as i8),
            Self::I16 => f64::from(decoder.read_sshort()?),
            Self::I32 => f64::from(decoder.read_slong()?),
            Self::F32 => f64::from(decoder.read_float()?),
            Self::F64 => decoder.read_double()?,
        })
    }
}

/// Read an uncompressed multi-sample strip image one band per sample.
///
/// Strips are read straight from their offsets in the file byte order, so
/// any sample count works regardless of the photometric interpretation.
fn read_sample_planes<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    pixels: usize,
    samples: usize,
) -> Result<Vec<Vec<f64>>> {
    let first_u16 = |values: Option<Vec<u16>>, default: u16| {
        values.and_then(|v| v.first().copied()).unwrap_or(default)
    };
    let bits = decoder
        .find_tag_unsigned_vec::<u16>(Tag::BitsPerSample)
        .map_err(tiff_err("Cannot read BitsPerSample"))?;
    let format = decoder
        .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)
        .map_err(tiff_err("Cannot read SampleFormat"))?;
    let kind = SampleKind::from_tags(first_u16(format, 1), first_u16(bits, 1))?;
    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
        .map_err(tiff_err("Cannot read PlanarConfiguration"))?
        .unwrap_or(1);

    let offsets = decoder
        .get_tag_u64_vec(Tag::StripOffsets)
        .map_err(tiff_err("Cannot read StripOffsets"))?;
    let byte_counts = decoder
        .get_tag_u64_vec(Tag::StripByteCounts)
        .map_err(tiff_err("Cannot read StripByteCounts"))?;

    let total = pixels * samples;
    let mut values = Vec::with_capacity(total);
    for (&offset, &count) in offsets.iter().zip(&byte_counts) {
        decoder.goto_offset_u64(offset)?;
        let stored = (count / kind.bytes()) as usize;
        for _ in 0..stored.min(total - values.len()) {
            values.push(kind.read(decoder)?);
        }
    }
    if values.len() != total {
        return Err(Error::UnsupportedDataType(format!(
            "TIFF strips hold {} samples, expected {}",
            values.len(),
            total
        )));
    }

    if planar == 2 {
        Ok(values.chunks_exact(pixels).map(<[f64]>::to_vec).collect())
    } else {
        Ok(deinterleave(&values, samples))
    }
}

fn decoding_result_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };
    Ok(values)
}

fn deinterleave(values: &[f64], samples: usize) -> Vec<Vec<f64>> {
    if samples == 1 {
        return vec![values.to_vec()];
    }
    let pixels = values.len() / samples;
    let mut bands = vec![Vec::with_capacity(pixels); samples];
    for pixel in values.chunks_exact(samples) {
        for (band, &v) in bands.iter_mut().zip(pixel) {
            band.push(v);
        }
    }
    bands
}

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, or ModelTransformation
fn read_geotransform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok();

    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    let t = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION)).ok()?;
    if t.len() >= 16 {
        return Some(GeoTransform {
            origin_x: t[3],
            origin_y: t[7],
            pixel_width: t[0],
            pixel_height: t[5],
            row_rotation: t[1],
            col_rotation: t[4],
        });
    }
    None
}

/// EPSG code from the GeoKeyDirectory (projected key wins over geographic)
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    if keys.len() < 4 {
        return None;
    }
    let num_keys = keys[3] as usize;

    let mut geographic = None;
    let mut projected = None;
    for entry in keys[4..].chunks_exact(4).take(num_keys) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        // location 0 means the value is stored inline
        if location != 0 || value == 0 || value == 32767 {
            continue;
        }
        match key_id {
            PROJECTED_CS_TYPE_KEY => projected = Some(value as u32),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(value as u32),
            _ => {}
        }
    }
    projected.or(geographic).map(CRS::from_epsg)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    text.trim_end_matches('\0').trim().parse::<f64>().ok()
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file), options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(
    raster: &Raster<T>,
    options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

/// Write rasters as successive pages of one GeoTIFF file.
///
/// All bands must share one shape; [`read_geotiff_bands`] reads them back
/// in order.
pub fn write_geotiff_bands<T, P>(
    bands: &[&Raster<T>],
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let shape = bands
        .first()
        .map(|band| band.shape())
        .ok_or_else(|| Error::UnsupportedDataType("no bands to write".into()))?;
    if let Some(band) = bands.iter().find(|band| band.shape() != shape) {
        let (rows, cols) = band.shape();
        return Err(Error::GeometryMismatch(format!(
            "band is {}x{} but the first band is {}x{}",
            rows, cols, shape.0, shape.1
        )));
    }

    let options = options.unwrap_or_default();
    let file = File::create(path.as_ref())?;
    let mut encoder =
        TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err("TIFF encoder error"))?;
    for band in bands {
        encode_page(&mut encoder, band, &options)?;
    }
    Ok(())
}

/// Encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    encode_page(&mut encoder, raster, &options)
}

fn encode_page<T, W>(
    encoder: &mut TiffEncoder<W>,
    raster: &Raster<T>,
    options: &GeoTiffOptions,
) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let (rows, cols) = raster.shape();

    match options.precision {
        SamplePrecision::Float32 => {
            let data: Vec<f32> = raster
                .data()
                .iter()
                .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
                .collect();
            let mut image = encoder
                .new_image::<Gray32Float>(cols as u32, rows as u32)
                .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
            write_geo_tags(&mut image, raster)?;
            image
                .write_data(&data)
                .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;
        }
        SamplePrecision::Float64 => {
            let data: Vec<f64> = raster
                .data()
                .iter()
                .map(|&v| v.to_f64().unwrap_or(f64::NAN))
                .collect();
            let mut image = encoder
                .new_image::<Gray64Float>(cols as u32, rows as u32)
                .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
            write_geo_tags(&mut image, raster)?;
            image
                .write_data(&data)
                .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;
        }
        SamplePrecision::UInt8 => {
            let fill: u8 = raster.nodata().and_then(|nd| num_traits::cast(nd)).unwrap_or(0);
            let data: Vec<u8> = raster
                .data()
                .iter()
                .map(|&v| num_traits::cast(v).unwrap_or(fill))
                .collect();
            let mut image = encoder
                .new_image::<Gray8>(cols as u32, rows as u32)
                .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
            write_geo_tags(&mut image, raster)?;
            image
                .write_data(&data)
                .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;
        }
    }

    Ok(())
}

fn write_geo_tags<W, C, K, T>(
    image: &mut ImageEncoder<'_, W, C, K>,
    raster: &Raster<T>,
) -> Result<()>
where
    W: Write + Seek,
    C: tiff::encoder::colortype::ColorType,
    K: TiffKind,
    T: RasterElement,
{
    let gt = raster.transform();
    let tag_err = |e: tiff::TiffError| Error::Other(format!("Cannot write GeoTIFF tag: {}", e));

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tag_err)?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tag_err)?;

    let geokeys = geo_key_directory(raster.crs());
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tag_err)?;

    let nodata = match raster.nodata() {
        Some(nd) => nd.to_f64().map(format_nodata),
        None if T::is_float() => Some("nan".to_string()),
        None => None,
    };
    if let Some(text) = nodata {
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())
            .map_err(tag_err)?;
    }
    Ok(())
}

fn format_nodata(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", v)
    }
}

/// GeoKeyDirectory with model type, raster type and the EPSG code when known
fn geo_key_directory(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(|c| c.epsg()).filter(|&code| code <= u16::MAX as u32);
    let geographic = crs.map_or(false, |c| c.is_geographic());

    let model_type = if geographic { 2 } else { 1 };
    let mut keys = vec![
        1, 1, 0, 2, // version 1.1.0, key count patched below
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, 1, // RasterPixelIsArea
    ];
    if let Some(code) = epsg {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        keys.extend_from_slice(&[key, 0, 1, code as u16]);
        keys[3] = 3;
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_raster() -> Raster<f64> {
        let mut r: Raster<f64> = Raster::new(6, 8);
        for row in 0..6 {
            for col in 0..8 {
                r.set(row, col, (row * 8 + col) as f64 * 0.5).unwrap();
            }
        }
        r.set(2, 3, f64::NAN).unwrap();
        r.set_transform(GeoTransform::new(-72.0, -30.0, 0.25, -0.25));
        r.set_crs(Some(CRS::wgs84()));
        r
    }

    #[test]
    fn test_buffer_roundtrip_keeps_georeferencing() {
        let r = make_raster();
        let buf = write_geotiff_to_buffer(&r, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), r.shape());
        assert!(back.transform().approx_eq(r.transform(), 1e-9));
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(4326));
        assert!(back.get(2, 3).unwrap().is_nan());
        assert_eq!(back.get(5, 7).unwrap(), 23.5);
    }

    #[test]
    fn test_file_roundtrip_float64_and_nodata() {
        let mut r = make_raster();
        r.set_nodata(Some(-9999.0));
        r.set_crs(Some(CRS::from_epsg(32719)));
        let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(
            &r,
            tmp.path(),
            Some(GeoTiffOptions {
                precision: SamplePrecision::Float64,
            }),
        )
        .unwrap();

        let bands = read_geotiff_bands(tmp.path()).unwrap();
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].nodata(), Some(-9999.0));
        assert_eq!(bands[0].crs().and_then(|c| c.epsg()), Some(32719));
        assert_eq!(bands[0].get(1, 1).unwrap(), 4.5);
    }

    #[test]
    fn test_categorical_roundtrip() {
        let mut r: Raster<u8> = Raster::filled(3, 3, 2);
        r.set_nodata(Some(0));
        r.set(0, 0, 0).unwrap();
        for precision in [SamplePrecision::Float32, SamplePrecision::UInt8] {
            let buf = write_geotiff_to_buffer(&r, Some(GeoTiffOptions { precision })).unwrap();
            let back: Raster<u8> = read_geotiff_from_buffer(&buf).unwrap();
            assert_eq!(back.nodata(), Some(0));
            assert_eq!(back.get(1, 1).unwrap(), 2);
            assert!(back.is_nodata_at(0, 0).unwrap());
        }
    }

    /// Six interleaved f32 samples per pixel, as written by climate stack exports
    struct Float32x6;

    impl tiff::encoder::colortype::ColorType for Float32x6 {
        type Inner = f32;
        const TIFF_VALUE: tiff::tags::PhotometricInterpretation =
            tiff::tags::PhotometricInterpretation::BlackIsZero;
        const BITS_PER_SAMPLE: &'static [u16] = &[32; 6];
        const SAMPLE_FORMAT: &'static [tiff::tags::SampleFormat] =
            &[tiff::tags::SampleFormat::IEEEFP; 6];
    }

    #[test]
    fn test_six_sample_image_reads_as_six_bands() {
        let (rows, cols) = (3usize, 4usize);
        let data: Vec<f32> = (0..rows * cols)
            .flat_map(|pixel| (0..6).map(move |band| (band * 100 + pixel) as f32))
            .collect();

        let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
        {
            let file = File::create(tmp.path()).unwrap();
            let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
            let mut image = encoder
                .new_image::<Float32x6>(cols as u32, rows as u32)
                .unwrap();
            image
                .encoder()
                .write_tag(Tag::Unknown(GDAL_NODATA), "-9999")
                .unwrap();
            image.write_data(&data).unwrap();
        }

        let bands = read_geotiff_bands(tmp.path()).unwrap();
        assert_eq!(bands.len(), 6);
        for (i, band) in bands.iter().enumerate() {
            assert_eq!(band.shape(), (rows, cols));
            assert_eq!(band.nodata(), Some(-9999.0));
            assert_eq!(band.get(0, 0).unwrap(), (i * 100) as f64);
            assert_eq!(band.get(2, 3).unwrap(), (i * 100 + 11) as f64);
        }
    }

    #[test]
    fn test_pages_roundtrip_as_bands() {
        let first = make_raster();
        let mut second = make_raster();
        second.set(0, 0, -5.0).unwrap();
        let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff_bands(&[&first, &second], tmp.path(), None).unwrap();

        let bands = read_geotiff_bands(tmp.path()).unwrap();
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].get(0, 0).unwrap(), 0.0);
        assert_eq!(bands[1].get(0, 0).unwrap(), -5.0);
        assert!(bands[1].transform().approx_eq(first.transform(), 1e-9));

        let small: Raster<f64> = Raster::new(2, 2);
        let mismatch = write_geotiff_bands(&[&first, &small], tmp.path(), None);
        assert!(matches!(mismatch, Err(Error::GeometryMismatch(_))));
    }

    #[test]
    fn test_deinterleave() {
        let bands = deinterleave(&[1.0, 10.0, 2.0, 20.0, 3.0, 30.0], 2);
        assert_eq!(bands, vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]);
    }
}
