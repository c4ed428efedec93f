#![allow(dead_code)]

use std::sync::Arc;

use boundaries::{
    BoundingBox, ByteSource, Column, ColumnType, DatasetSchema, DatasetWriter, Feature,
    FeatureReader, FeatureStream, GeometryType, MemorySource, MeteredSource, Properties,
    ReaderOptions,
};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use geo_types::{MultiPolygon, polygon};

/// Municipalities are laid out on a grid of `GRID_COLUMNS` × `GRID_ROWS`
/// cells, row by row from the south-west corner.
pub const GRID_COLUMNS: usize = 10;
pub const GRID_ROWS: usize = 6;
const ORIGIN: (f64, f64) = (20.9, 53.9);
const CELL: (f64, f64) = (0.6, 0.4);
const INSET: f64 = 0.001;

/// `(code, name, county_code)` in grid order.
pub const MUNICIPALITIES: [(&str, &str, &str); 60] = [
    ("12", "Akmenės r. sav.", "8"),
    ("11", "Alytaus m. sav.", "1"),
    ("33", "Alytaus r. sav.", "1"),
    ("34", "Anykščių r. sav.", "9"),
    ("35", "Birštono sav.", "2"),
    ("36", "Biržų r. sav.", "5"),
    ("38", "Varėnos r. sav.", "1"),
    ("39", "Elektrėnų sav.", "10"),
    ("41", "Ignalinos r. sav.", "9"),
    ("42", "Jonavos r. sav.", "2"),
    ("43", "Joniškio r. sav.", "6"),
    ("44", "Jurbarko r. sav.", "7"),
    ("45", "Kaišiadorių r. sav.", "2"),
    ("46", "Kalvarijos sav.", "4"),
    ("15", "Kauno m. sav.", "2"),
    ("52", "Kauno r. sav.", "2"),
    ("47", "Kazlų Rūdos sav.", "4"),
    ("13", "Vilniaus m. sav.", "10"),
    ("21", "Klaipėdos m. sav.", "3"),
    ("55", "Klaipėdos r. sav.", "3"),
    ("56", "Kretingos r. sav.", "3"),
    ("57", "Kupiškio r. sav.", "5"),
    ("58", "Kėdainių r. sav.", "2"),
    ("59", "Lazdijų r. sav.", "1"),
    ("25", "Marijampolės sav.", "4"),
    ("61", "Mažeikių r. sav.", "8"),
    ("62", "Molėtų r. sav.", "9"),
    ("23", "Neringos sav.", "3"),
    ("63", "Pagėgių sav.", "7"),
    ("65", "Pakruojo r. sav.", "6"),
    ("24", "Palangos m. sav.", "3"),
    ("27", "Panevėžio m. sav.", "5"),
    ("66", "Panevėžio r. sav.", "5"),
    ("67", "Pasvalio r. sav.", "5"),
    ("68", "Plungės r. sav.", "8"),
    ("69", "Prienų r. sav.", "2"),
    ("71", "Radviliškio r. sav.", "6"),
    ("72", "Raseinių r. sav.", "2"),
    ("73", "Rietavo sav.", "8"),
    ("74", "Rokiškio r. sav.", "5"),
    ("75", "Skuodo r. sav.", "3"),
    ("84", "Šakių r. sav.", "4"),
    ("85", "Šalčininkų r. sav.", "10"),
    ("29", "Šiaulių m. sav.", "6"),
    ("91", "Šiaulių r. sav.", "6"),
    ("87", "Šilalės r. sav.", "7"),
    ("88", "Šilutės r. sav.", "3"),
    ("89", "Širvintų r. sav.", "10"),
    ("86", "Švenčionių r. sav.", "10"),
    ("77", "Tauragės r. sav.", "7"),
    ("78", "Telšių r. sav.", "8"),
    ("79", "Trakų r. sav.", "10"),
    ("81", "Ukmergės r. sav.", "10"),
    ("82", "Utenos r. sav.", "9"),
    ("37", "Druskininkų sav.", "1"),
    ("94", "Vilkaviškio r. sav.", "4"),
    ("53", "Kelmės r. sav.", "6"),
    ("93", "Vilniaus r. sav.", "10"),
    ("30", "Visagino sav.", "9"),
    ("32", "Zarasų r. sav.", "9"),
];

/// Grid position of Varėnos r. sav.
pub const VARENA: usize = 6;
/// Grid position of Vilniaus m. sav.
pub const VILNIUS: usize = 17;

/// A window inside Varėna, away from every other municipality.
pub fn varena_query() -> BoundingBox {
    BoundingBox::new(
        24.565433052071143,
        54.20571892536029,
        24.583090071675088,
        54.215849272239836,
    )
}

/// A window in the centre of Vilnius.
pub fn vilnius_query() -> BoundingBox {
    BoundingBox::new(
        25.287164917098778,
        54.68195119163565,
        25.29894784130272,
        54.68985604215064,
    )
}

/// Cell of the municipality at grid position `index`.
pub fn cell(index: usize) -> BoundingBox {
    let col = (index % GRID_COLUMNS) as f64;
    let row = (index / GRID_COLUMNS) as f64;
    let min_x = ORIGIN.0 + col * CELL.0;
    let min_y = ORIGIN.1 + row * CELL.1;
    BoundingBox::new(min_x, min_y, min_x + CELL.0, min_y + CELL.1)
}

pub fn municipality(index: usize) -> Feature {
    let (code, name, county_code) = MUNICIPALITIES[index];
    let cell = cell(index);
    let (min_x, min_y) = (cell.min_x() + INSET, cell.min_y() + INSET);
    let (max_x, max_y) = (cell.max_x() - INSET, cell.max_y() - INSET);
    let boundary = polygon![
        (x: min_x, y: min_y),
        (x: max_x, y: min_y),
        (x: max_x, y: max_y),
        (x: min_x, y: max_y),
        (x: min_x, y: min_y),
    ];

    let mut properties = Properties::new();
    properties.insert("feature_id", index as i64 + 1);
    properties.insert("code", code);
    properties.insert("name", name);
    properties.insert("county_code", county_code);
    properties.insert("area_ha", 100_000.0 + index as f64 * 1234.5);
    properties.insert(
        "created_at",
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single(),
    );
    Feature::new(MultiPolygon(vec![boundary]), properties)
}

pub fn municipalities_schema() -> DatasetSchema {
    DatasetSchema::new("municipalities", GeometryType::MultiPolygon)
        .with_crs("EPSG:4326")
        .with_column(Column::new("feature_id", ColumnType::Int64))
        .with_column(Column::new("code", ColumnType::String))
        .with_column(Column::new("name", ColumnType::String))
        .with_column(Column::new("county_code", ColumnType::String).nullable())
        .with_column(Column::new("area_ha", ColumnType::Double))
        .with_column(Column::new("created_at", ColumnType::DateTime).nullable())
}

pub fn municipalities_writer() -> anyhow::Result<DatasetWriter> {
    let mut writer = DatasetWriter::new(municipalities_schema())?;
    for index in 0..MUNICIPALITIES.len() {
        writer.add(municipality(index))?;
    }
    Ok(writer)
}

pub fn municipalities_dataset() -> anyhow::Result<Bytes> {
    Ok(municipalities_writer()?.finish()?)
}

/// The municipalities dataset behind a metered in-memory source.
pub fn metered_municipalities() -> anyhow::Result<Arc<MeteredSource>> {
    let data = municipalities_dataset()?;
    Ok(Arc::new(MeteredSource::new(Arc::new(MemorySource::new(
        "municipalities",
        data,
    )))))
}

pub async fn open_metered(
    source: &Arc<MeteredSource>, options: ReaderOptions,
) -> anyhow::Result<FeatureReader> {
    let source: Arc<dyn ByteSource> = source.clone();
    Ok(FeatureReader::open(source, options).await?)
}

pub async fn collect(stream: FeatureStream) -> boundaries::Result<Vec<Feature>> {
    stream.try_collect().await
}

pub fn names(features: &[Feature]) -> Vec<String> {
    features
        .iter()
        .filter_map(|feature| feature.properties.get("name"))
        .filter_map(|name| name.as_str().map(str::to_owned))
        .collect()
}

pub fn feature_ids(features: &[Feature]) -> Vec<i64> {
    let mut ids: Vec<i64> = features
        .iter()
        .filter_map(|feature| feature.properties.get("feature_id"))
        .filter_map(|id| id.as_i64())
        .collect();
    ids.sort_unstable();
    ids
}
