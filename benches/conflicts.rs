//! Benchmarks for the checks every sync runs before and after copying:
//! destination conflict validation and tree checksumming.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use git_vendor::config::{PathMapping, RefSpec, VendorConfig, VendorSpec};
use git_vendor::conflict;
use git_vendor::filesystem::compute_tree_checksum;

/// A configuration with `vendors` vendors of two refs and five mappings each.
fn large_config(vendors: usize) -> VendorConfig {
    let vendors = (0..vendors)
        .map(|v| VendorSpec {
            name: format!("vendor{}", v),
            url: format!("https://example.com/vendor{}.git", v),
            license: "MIT".to_string(),
            groups: Vec::new(),
            specs: ["main", "v1"]
                .iter()
                .map(|r| RefSpec {
                    r#ref: r.to_string(),
                    default_target: Some(format!("third_party/vendor{}/{}", v, r)),
                    mapping: (0..5)
                        .map(|m| PathMapping {
                            from: format!("src/module{}", m),
                            to: String::new(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();
    VendorConfig { vendors }
}

fn bench_conflict_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("conflict_validation");
    for size in [10, 100, 1000] {
        let config = large_config(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &config, |b, config| {
            b.iter(|| conflict::validate(black_box(config)))
        });
    }
    group.finish();
}

fn bench_find_conflicts_with_collisions(c: &mut Criterion) {
    let mut claims = conflict::expand_claims(&large_config(200));
    // Every tenth claim collides with the first.
    let first = claims[0].destination.clone();
    for claim in claims.iter_mut().step_by(10) {
        claim.destination = format!("{}/", first);
    }
    c.bench_function("find_conflicts_with_collisions", |b| {
        b.iter(|| conflict::find_conflicts(black_box(&claims)))
    });
}

fn bench_tree_checksum(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("temp dir");
    for m in 0..20 {
        let module = dir.path().join(format!("module{}", m));
        std::fs::create_dir_all(&module).expect("create module dir");
        for f in 0..25 {
            std::fs::write(
                module.join(format!("file{}.rs", f)),
                format!("pub fn f{}_{}() -> usize {{ {} }}\n", m, f, m * f).repeat(20),
            )
            .expect("write file");
        }
    }
    c.bench_function("tree_checksum_500_files", |b| {
        b.iter(|| compute_tree_checksum(black_box(dir.path())))
    });
}

criterion_group!(
    benches,
    bench_conflict_validation,
    bench_find_conflicts_with_collisions,
    bench_tree_checksum
);
criterion_main!(benches);
