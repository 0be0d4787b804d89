/*!
 * Benchmarks for the CPU-bound pipeline stages.
 *
 * Measures performance of:
 * - Page range parsing and resolution
 * - Segmentation into parts
 * - Merging tickets back into page order
 * - Rendering output variants
 */

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::collections::HashMap;

use pdfdual::document::{ExtractedDocument, TextBlock, TranslationUnit, UnitKey};
use pdfdual::pipeline::assembler::{extract_glossary, merge};
use pdfdual::pipeline::render::{RenderContext, render_variant};
use pdfdual::pipeline::{DispatchTicket, Layout, OutputVariant, PageSelector, segment};

const BLOCKS_PER_PAGE: usize = 12;

/// Generate a document with `pages` pages of paragraphs.
fn generate_document(pages: usize) -> ExtractedDocument {
    let texts = [
        "Abstract",
        "We study the convergence of stochastic gradient methods under heavy-tailed noise.",
        "Related work",
        "Our main result bounds the expected excess risk by a term depending on the tail index.",
        "Proof sketch follows Lemma 3 and Theorem 2.",
        "Table 1 lists the datasets used in the experiments.",
    ];

    let blocks = (1..=pages)
        .flat_map(|page| {
            (0..BLOCKS_PER_PAGE).map(move |i| TextBlock {
                page,
                anchor: format!("p{}-b{}", page, i),
                text: texts[(page + i) % texts.len()].to_string(),
            })
        })
        .collect();
    ExtractedDocument::new("bench.pdf", pages, blocks)
}

/// Succeeded tickets for every unit, as if restored from a checkpoint
fn generate_ledger(units: &[TranslationUnit]) -> HashMap<UnitKey, DispatchTicket> {
    units
        .iter()
        .map(|unit| {
            let ticket = DispatchTicket::restored(unit, format!("[fr] {}", unit.text()));
            (unit.key().clone(), ticket)
        })
        .collect()
}

// ============================================================================
// Segmentation Benchmarks
// ============================================================================

fn bench_page_selector(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_selector");

    for expression in ["1-", "1,2,1-,-3,3-5", "1-10,20-30,40,50-"].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(expression), expression, |b, &expression| {
            b.iter(|| {
                let selector = PageSelector::parse(black_box(expression)).unwrap();
                black_box(selector.resolve(500).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment");

    for pages in [10, 100, 500].iter() {
        let document = generate_document(*pages);
        let units = document.units();
        group.throughput(Throughput::Elements(units.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pages), pages, |b, &pages| {
            b.iter(|| black_box(segment(&units, pages, None, Some(8)).unwrap()));
        });
    }

    group.finish();
}

// ============================================================================
// Assembly Benchmarks
// ============================================================================

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for pages in [10, 100, 500].iter() {
        let document = generate_document(*pages);
        let units = document.units();
        let parts = segment(&units, *pages, None, Some(8)).unwrap();
        let ledger = generate_ledger(&units);
        group.throughput(Throughput::Elements(units.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pages), pages, |b, _| {
            b.iter(|| black_box(merge(&parts, &ledger).unwrap()));
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let ctx = RenderContext {
        source_language: "en",
        target_language: "fr",
    };

    let document = generate_document(100);
    let units = document.units();
    let parts = segment(&units, 100, None, None).unwrap();
    let assembled = merge(&parts, &generate_ledger(&units)).unwrap();

    for (name, layout) in [("mono", Layout::Mono), ("dual", Layout::Dual)] {
        let variant = OutputVariant::new(layout, true);
        group.bench_function(name, |b| {
            b.iter(|| black_box(render_variant(&assembled, variant, &ctx)));
        });
    }

    group.bench_function("glossary", |b| {
        b.iter(|| black_box(extract_glossary(&assembled)));
    });

    group.finish();
}

criterion_group!(segment_benches, bench_page_selector, bench_segment);

criterion_group!(assembly_benches, bench_merge, bench_render);

criterion_main!(segment_benches, assembly_benches);
