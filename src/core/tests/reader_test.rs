mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use boundaries::{
    BoundariesError, BoundingBox, ByteRange, ByteSource, Column, ColumnType, DatasetSchema,
    DatasetWriter, Feature, FeatureReader, GeometryType, Header, MemorySource, MeteredSource,
    Properties, ReaderOptions,
};
use bytes::Bytes;
use common::*;
use common_telemetry::init_test_logging;
use futures::StreamExt;
use geo_types::{LineString, Point, Rect, coord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EXTENT: f64 = 100.0;
/// Size of one index record on disk.
const NODE_RECORD_SIZE: usize = 48;
/// Offset of `features_count` in the header: magic, body length, geometry tag.
const FEATURES_COUNT_OFFSET: usize = 13;

fn random_box(rng: &mut StdRng, max_size: f64) -> BoundingBox {
    let min_x = rng.random_range(0.0..EXTENT);
    let min_y = rng.random_range(0.0..EXTENT);
    let width = rng.random_range(0.0..max_size);
    let height = rng.random_range(0.0..max_size);
    BoundingBox::new(min_x, min_y, min_x + width, min_y + height)
}

/// Random axis-aligned squares; their exact extent equals their bounding box.
fn random_parcels(count: usize, seed: u64) -> anyhow::Result<(Bytes, Vec<BoundingBox>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let schema = DatasetSchema::new("parcels", GeometryType::Polygon)
        .with_column(Column::new("id", ColumnType::Int64))
        .with_node_size(8);
    let mut writer = DatasetWriter::new(schema)?;
    let mut boxes = Vec::with_capacity(count);
    for id in 0..count {
        let bounds = random_box(&mut rng, 3.0);
        let rect = Rect::new(
            coord! { x: bounds.min_x(), y: bounds.min_y() },
            coord! { x: bounds.max_x(), y: bounds.max_y() },
        );
        writer.add(Feature::new(rect, [("id", id as i64)].into_iter().collect()))?;
        boxes.push(bounds);
    }
    Ok((writer.finish()?, boxes))
}

fn ids(features: &[Feature]) -> Vec<i64> {
    let mut ids: Vec<i64> = features
        .iter()
        .filter_map(|feature| feature.properties.get("id"))
        .filter_map(|id| id.as_i64())
        .collect();
    ids.sort_unstable();
    ids
}

fn brute_force(boxes: &[BoundingBox], query: &BoundingBox) -> Vec<i64> {
    boxes
        .iter()
        .enumerate()
        .filter(|(_, bounds)| bounds.intersects(query))
        .map(|(id, _)| id as i64)
        .collect()
}

fn memory(name: &str, data: Bytes) -> Arc<MeteredSource> {
    Arc::new(MeteredSource::new(Arc::new(MemorySource::new(name, data))))
}

#[tokio::test]
async fn test_matches_brute_force() -> anyhow::Result<()> {
    init_test_logging();

    let (data, boxes) = random_parcels(500, 7)?;
    let source = memory("parcels", data);
    let loaded = open_metered(&source, ReaderOptions::default()).await?;
    let remote = open_metered(&source, ReaderOptions {
        index_prefetch_limit: 0,
        ..Default::default()
    })
    .await?;
    assert!(loaded.is_index_loaded());
    assert!(!remote.is_index_loaded());

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let query = random_box(&mut rng, 20.0);
        let expected = brute_force(&boxes, &query);
        assert_eq!(ids(&collect(loaded.query(&query).await?).await?), expected);
        assert_eq!(ids(&collect(remote.query(&query).await?).await?), expected);
    }
    Ok(())
}

#[tokio::test]
async fn test_remote_index_fetches_nodes_per_query() -> anyhow::Result<()> {
    init_test_logging();

    let source = metered_municipalities()?;
    let reader = open_metered(&source, ReaderOptions {
        index_prefetch_limit: 0,
        ..Default::default()
    })
    .await?;
    assert!(!reader.is_index_loaded());
    source.reset();

    let features = collect(reader.query(&varena_query()).await?).await?;
    assert_eq!(names(&features), vec!["Varėnos r. sav.".to_owned()]);

    // one request per index level plus the feature itself
    let levels = reader.header().index_layout()?.num_levels();
    assert_eq!(source.metrics().requests, levels as u64 + 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_dataset_reads_nothing() -> anyhow::Result<()> {
    init_test_logging();

    let schema = DatasetSchema::new("nothing", GeometryType::Polygon);
    let source = memory("nothing", DatasetWriter::new(schema)?.finish()?);
    let reader = open_metered(&source, ReaderOptions::default()).await?;
    assert_eq!(reader.count(), 0);
    source.reset();

    let stream = reader.query(&BoundingBox::new(-180.0, -90.0, 180.0, 90.0)).await?;
    assert!(collect(stream).await?.is_empty());
    assert_eq!(source.metrics().requests, 0);
    Ok(())
}

#[tokio::test]
async fn test_query_outside_envelope_reads_nothing() -> anyhow::Result<()> {
    init_test_logging();

    let source = metered_municipalities()?;
    let reader = open_metered(&source, ReaderOptions {
        index_prefetch_limit: 0,
        ..Default::default()
    })
    .await?;
    source.reset();

    let stream = reader.query(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)).await?;
    assert!(collect(stream).await?.is_empty());
    assert_eq!(source.metrics().requests, 0);
    Ok(())
}

#[tokio::test]
async fn test_single_feature_single_request() -> anyhow::Result<()> {
    init_test_logging();

    let source = metered_municipalities()?;
    let reader = open_metered(&source, ReaderOptions {
        range_gap_tolerance: 0,
        ..Default::default()
    })
    .await?;
    source.reset();

    let features = collect(reader.query(&varena_query()).await?).await?;
    assert_eq!(features.len(), 1);
    assert_eq!(source.metrics().requests, 1);
    Ok(())
}

#[tokio::test]
async fn test_touching_records_merge() -> anyhow::Result<()> {
    init_test_logging();

    let source = metered_municipalities()?;
    let length = source.length().await?;
    let reader = open_metered(&source, ReaderOptions {
        range_gap_tolerance: 0,
        ..Default::default()
    })
    .await?;
    let envelope = *reader
        .header()
        .envelope()
        .ok_or_else(|| anyhow::anyhow!("no envelope"))?;
    source.reset();

    let features = collect(reader.query(&envelope).await?).await?;
    assert_eq!(features.len(), 60);
    let metrics = source.metrics();
    assert_eq!(metrics.requests, 1);
    assert_eq!(metrics.ranges[0].end(), length);
    Ok(())
}

#[tokio::test]
async fn test_stream_is_lazy() -> anyhow::Result<()> {
    init_test_logging();

    let source = metered_municipalities()?;
    let reader = open_metered(&source, ReaderOptions::default()).await?;
    source.reset();

    let mut stream = reader.query(&vilnius_query()).await?;
    assert_eq!(stream.metrics().candidates, 1);
    assert_eq!(source.metrics().requests, 0);

    let feature = stream.next().await.transpose()?;
    assert!(feature.is_some());
    assert_eq!(source.metrics().requests, 1);
    assert!(stream.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_invalid_query() -> anyhow::Result<()> {
    init_test_logging();

    let source = metered_municipalities()?;
    let reader = open_metered(&source, ReaderOptions::default()).await?;

    for query in [
        BoundingBox::new(25.0, 54.0, 24.0, 55.0),
        BoundingBox::new(f64::NAN, 54.0, 25.0, 55.0),
        BoundingBox::new(24.0, 54.0, f64::INFINITY, 55.0),
    ] {
        assert!(matches!(
            reader.query(&query).await,
            Err(BoundariesError::InvalidQuery(_))
        ));
    }
    Ok(())
}

/// Fails every read while `failing` is set.
#[derive(Debug)]
struct FlakySource {
    inner: MemorySource,
    failing: AtomicBool,
}

#[async_trait]
impl ByteSource for FlakySource {
    async fn read_range(&self, range: ByteRange) -> boundaries::Result<Bytes> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BoundariesError::ByteSourceIo(format!(
                "connection reset while reading {range}"
            )));
        }
        self.inner.read_range(range).await
    }

    async fn length(&self) -> boundaries::Result<u64> {
        self.inner.length().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[tokio::test]
async fn test_source_error_ends_stream() -> anyhow::Result<()> {
    init_test_logging();

    let source = Arc::new(FlakySource {
        inner: MemorySource::new("municipalities", municipalities_dataset()?),
        failing: AtomicBool::new(false),
    });
    let reader = FeatureReader::open(source.clone(), ReaderOptions::default()).await?;

    source.failing.store(true, Ordering::SeqCst);
    let mut stream = reader.query(&varena_query()).await?;
    let err = stream.next().await.and_then(Result::err);
    assert!(matches!(err, Some(BoundariesError::ByteSourceIo(_))));
    assert!(err.is_some_and(|err| err.is_transient()));
    assert!(stream.next().await.is_none());

    // the reader is still usable once the source recovers
    source.failing.store(false, Ordering::SeqCst);
    let features = collect(reader.query(&varena_query()).await?).await?;
    assert_eq!(names(&features), vec!["Varėnos r. sav.".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn test_truncated_feature_section() -> anyhow::Result<()> {
    init_test_logging();

    let data = municipalities_dataset()?;
    let truncated = data.slice(..data.len() - 10);
    let source = memory("truncated", truncated);
    let reader = open_metered(&source, ReaderOptions::default()).await?;
    let envelope = *reader
        .header()
        .envelope()
        .ok_or_else(|| anyhow::anyhow!("no envelope"))?;

    assert!(matches!(
        reader.query(&envelope).await,
        Err(BoundariesError::TruncatedFeature(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_corrupt_leaf_offset() -> anyhow::Result<()> {
    init_test_logging();

    let data = municipalities_dataset()?;
    let header = Header::parse(&data)?;
    let first_leaf = header.index_layout()?.leaf_level().start;
    let field = Header::encoded_size(&data)? + first_leaf * NODE_RECORD_SIZE + 32;
    let mut corrupt = data.to_vec();
    corrupt[field..field + 8].copy_from_slice(&u64::MAX.to_le_bytes());
    let corrupt = Bytes::from(corrupt);
    let envelope = *header
        .envelope()
        .ok_or_else(|| anyhow::anyhow!("no envelope"))?;

    for index_prefetch_limit in [ReaderOptions::default().index_prefetch_limit, 0] {
        let source = memory("corrupt", corrupt.clone());
        let reader = open_metered(&source, ReaderOptions {
            index_prefetch_limit,
            ..Default::default()
        })
        .await?;
        assert!(matches!(
            reader.query(&envelope).await,
            Err(BoundariesError::TruncatedFeature(_))
        ));
    }
    Ok(())
}

#[tokio::test]
async fn test_forged_feature_count() -> anyhow::Result<()> {
    init_test_logging();

    let data = municipalities_dataset()?;
    for count in [1u64 << 60, u64::MAX, 1_000_000] {
        let mut forged = data.to_vec();
        forged[FEATURES_COUNT_OFFSET..FEATURES_COUNT_OFFSET + 8]
            .copy_from_slice(&count.to_le_bytes());
        let source = memory("forged", Bytes::from(forged));
        assert!(matches!(
            open_metered(&source, ReaderOptions::default())
                .await
                .map_err(|err| err.downcast::<BoundariesError>()),
            Err(Ok(BoundariesError::InvalidIndex(_)))
        ));
    }
    Ok(())
}

/// Once `stalling` is set, every read after the first never completes.
#[derive(Debug)]
struct StallingSource {
    inner: MemorySource,
    stalling: AtomicBool,
    reads: AtomicUsize,
}

#[async_trait]
impl ByteSource for StallingSource {
    async fn read_range(&self, range: ByteRange) -> boundaries::Result<Bytes> {
        if self.stalling.load(Ordering::SeqCst) && self.reads.fetch_add(1, Ordering::SeqCst) > 0 {
            futures::future::pending::<()>().await;
        }
        self.inner.read_range(range).await
    }

    async fn length(&self) -> boundaries::Result<u64> {
        self.inner.length().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[tokio::test]
async fn test_first_feature_does_not_wait_for_later_fetches() -> anyhow::Result<()> {
    init_test_logging();

    let source = Arc::new(StallingSource {
        inner: MemorySource::new("municipalities", municipalities_dataset()?),
        stalling: AtomicBool::new(false),
        reads: AtomicUsize::new(0),
    });
    let reader = FeatureReader::open(source.clone(), ReaderOptions {
        range_gap_tolerance: 0,
        ..Default::default()
    })
    .await?;
    source.stalling.store(true, Ordering::SeqCst);

    // the southern row spans several runs of the Hilbert order
    let southern_row = BoundingBox::new(20.95, 53.95, 26.85, 54.05);
    let mut stream = reader.query(&southern_row).await?;
    assert_eq!(stream.metrics().candidates, GRID_COLUMNS);

    let first = tokio::time::timeout(Duration::from_secs(5), stream.next()).await?;
    assert!(first.transpose()?.is_some());
    assert!(source.reads.load(Ordering::SeqCst) > 1);
    drop(stream);

    source.stalling.store(false, Ordering::SeqCst);
    let features = collect(reader.query(&varena_query()).await?).await?;
    assert_eq!(names(&features), vec!["Varėnos r. sav.".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn test_malformed_files() -> anyhow::Result<()> {
    init_test_logging();

    for garbage in [&b"short"[..], &b"this is not a boundaries dataset at all"[..]] {
        let source = memory("garbage", Bytes::copy_from_slice(garbage));
        assert!(matches!(
            open_metered(&source, ReaderOptions::default())
                .await
                .map_err(|err| err.downcast::<BoundariesError>()),
            Err(Ok(BoundariesError::MalformedHeader(_)))
        ));
    }

    let data = municipalities_dataset()?;
    let header_size = Header::encoded_size(&data)?;
    let source = memory("no index", data.slice(..header_size + 10));
    assert!(matches!(
        open_metered(&source, ReaderOptions::default())
            .await
            .map_err(|err| err.downcast::<BoundariesError>()),
        Err(Ok(BoundariesError::InvalidIndex(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_refinement_drops_bounding_box_hits() -> anyhow::Result<()> {
    init_test_logging();

    let schema = DatasetSchema::new("paths", GeometryType::Unknown)
        .with_column(Column::new("kind", ColumnType::String));
    let mut writer = DatasetWriter::new(schema)?;
    let kind = |kind: &str| -> Properties { [("kind", kind)].into_iter().collect() };
    writer.add(Feature::new(
        LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]),
        kind("corner"),
    ))?;
    writer.add(Feature::new(Point::new(2.0, 6.0), kind("well")))?;
    let source = memory("paths", writer.finish()?);
    let reader = open_metered(&source, ReaderOptions::default()).await?;

    // inside the corner's bounding box but away from the line itself
    let mut stream = reader.query(&BoundingBox::new(1.0, 5.0, 4.0, 8.0)).await?;
    let mut kinds = Vec::new();
    while let Some(feature) = stream.next().await {
        let feature = feature?;
        if let Some(kind) = feature.properties.get("kind").and_then(|v| v.as_str()) {
            kinds.push(kind.to_owned());
        }
    }
    assert_eq!(kinds, vec!["well".to_owned()]);

    let metrics = stream.metrics();
    assert_eq!(metrics.candidates, 2);
    assert_eq!(metrics.decoded, 2);
    assert_eq!(metrics.refined_out, 1);
    assert_eq!(metrics.yielded, 1);
    Ok(())
}
