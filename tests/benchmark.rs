mod common;

use std::collections::HashMap;
use std::sync::Arc;

use imretrieval::acquire::ImageSource;
use imretrieval::augment::AugmentPreset;
use imretrieval::benchmark::{BenchmarkRunner, EvalMode, RunOutcome, TestSample};
use imretrieval::embed::ThumbnailEmbedder;
use imretrieval::{Error, IMDBBuilder, Result, SearchService};
use rstest::*;

/// 内存中的图片源
struct MemorySource(HashMap<String, Vec<u8>>);

impl ImageSource for MemorySource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.0.get(location).cloned().ok_or_else(|| Error::Acquisition {
            location: location.to_string(),
            reason: "not found".to_string(),
        })
    }
}

struct Fixture {
    samples: Vec<TestSample>,
    source: Arc<MemorySource>,
}

/// 三个商品，每个商品两张图片
#[fixture]
fn fixture() -> Fixture {
    let mut samples = vec![];
    let mut images = HashMap::new();
    for p in 0..3 {
        for i in 0..2 {
            let url = common::image_name(p, i);
            let image = common::solid_image(common::PALETTE[p], i as u32);
            images.insert(url.clone(), common::png_bytes(image));
            samples.push(TestSample {
                image_id: (p * 2 + i) as i64 + 1,
                image_url: url,
                product_id: p as i64 + 100,
                category: (p != 2).then(|| "shoes".to_string()),
            });
        }
    }
    Fixture { samples, source: Arc::new(MemorySource(images)) }
}

async fn service(fixture: &Fixture) -> SearchService<ThumbnailEmbedder> {
    let embedder = ThumbnailEmbedder::new(8);
    let (imdb, summary) = IMDBBuilder::new(&embedder, fixture.source.as_ref())
        .progress(false)
        .build(&fixture.samples)
        .await
        .unwrap();
    assert_eq!(summary.indexed, 6);
    assert_eq!(summary.failed, 0);
    SearchService::with_index(embedder, imdb)
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn normal_mode_excludes_query(fixture: Fixture) {
    let service = service(&fixture).await;
    let runner = BenchmarkRunner::new(&service, fixture.source.clone(), EvalMode::Normal, 10, 0)
        .unwrap()
        .progress(false);
    let outcome = runner.run(fixture.samples.clone()).await.unwrap();

    assert_eq!(outcome.records.len(), 6);
    assert_eq!(outcome.failures(), 0);
    for record in &outcome.records {
        assert_eq!(record.ranked_results.len(), 5);
        assert!(record.ranked_results.iter().all(|r| r.image_id != Some(record.query_image_id)));
        assert!(record.is_top1_correct);
    }
    assert_eq!(outcome.records[4].category, "Unknown");

    let metrics = outcome.metrics().unwrap();
    assert_eq!(metrics.top1_accuracy, 100.);
    assert_eq!(metrics.mean_reciprocal_rank, 1.);
    assert_eq!(metrics.confusion_matrix.labels, [100, 101, 102]);
}

async fn run_augmented(
    service: &SearchService<ThumbnailEmbedder>,
    fixture: &Fixture,
    seed: u64,
) -> RunOutcome {
    let mode = EvalMode::Augmented(AugmentPreset::Heavy);
    BenchmarkRunner::new(service, fixture.source.clone(), mode, 10, seed)
        .unwrap()
        .progress(false)
        .run(fixture.samples.clone())
        .await
        .unwrap()
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn augmented_mode_is_reproducible(fixture: Fixture) {
    let service = service(&fixture).await;
    let first = run_augmented(&service, &fixture, 7).await;
    let second = run_augmented(&service, &fixture, 7).await;

    assert_eq!(first.records.len(), 6);
    for (a, b) in first.records.iter().zip(&second.records) {
        // 增强后的图片与原图不同，不做排除
        assert_eq!(a.ranked_results.len(), 6);
        assert_eq!(a.ranked_results, b.ranked_results);
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_acquisitions_are_counted(fixture: Fixture) {
    let service = service(&fixture).await;
    let mut samples = fixture.samples.clone();
    samples[0].image_url = "missing.png".to_string();
    let mut images = fixture.source.0.clone();
    images.insert("garbage.png".to_string(), b"not an image".to_vec());
    samples[1].image_url = "garbage.png".to_string();

    let source = Arc::new(MemorySource(images));
    let runner = BenchmarkRunner::new(&service, source, EvalMode::Normal, 10, 0)
        .unwrap()
        .progress(false);
    let outcome = runner.run(samples).await.unwrap();

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(outcome.failure_breakdown.acquisition, 2);
    assert!(outcome.metrics().is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn all_failures_produce_no_metrics(fixture: Fixture) {
    let service = service(&fixture).await;
    let samples = fixture
        .samples
        .iter()
        .map(|s| TestSample { image_url: format!("gone/{}", s.image_url), ..s.clone() })
        .collect();
    let runner = BenchmarkRunner::new(&service, fixture.source.clone(), EvalMode::Normal, 10, 0)
        .unwrap()
        .progress(false);
    let outcome = runner.run(samples).await.unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.failure_breakdown.acquisition, 6);
    assert!(outcome.metrics().is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_rejects_small_top_k(fixture: Fixture) {
    let service = service(&fixture).await;
    let result = BenchmarkRunner::new(&service, fixture.source.clone(), EvalMode::Normal, 9, 0);
    assert!(matches!(result, Err(Error::InvalidTopK { min: 10, actual: 9 })));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_requires_loaded_index(fixture: Fixture) {
    let service = SearchService::new(ThumbnailEmbedder::new(8));
    let runner = BenchmarkRunner::new(&service, fixture.source.clone(), EvalMode::Normal, 10, 0)
        .unwrap()
        .progress(false);
    assert!(matches!(runner.run(fixture.samples).await, Err(Error::IndexUnavailable)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_rejects_mismatched_embedder(fixture: Fixture) {
    let embedder = ThumbnailEmbedder::new(8);
    let (imdb, _) = IMDBBuilder::new(&embedder, fixture.source.as_ref())
        .progress(false)
        .build(&fixture.samples)
        .await
        .unwrap();
    let service = SearchService::with_index(ThumbnailEmbedder::new(4), imdb);
    let runner = BenchmarkRunner::new(&service, fixture.source.clone(), EvalMode::Normal, 10, 0)
        .unwrap()
        .progress(false);
    assert!(matches!(
        runner.run(fixture.samples).await,
        Err(Error::EmbedderDimension { index: 192, embedder: 48 })
    ));
}
