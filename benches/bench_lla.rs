use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use penglm::config::{Flavor, NonConvexFlavor, PenaltyConfig};
use penglm::datafits::LossConfig;
use penglm::helpers::test_helpers::generate_random_data;
use penglm::lla::{LlaParams, LlaSolver};
use penglm::param_guard::ParamGuard;
use penglm::penalties::NonConvexKind;
use penglm::solvers::{FistaSolver, GlmSolver};

fn bench_lla(c: &mut Criterion) {
    let mut group = c.benchmark_group("lla");
    group.sample_size(10);

    for n_samples in [50, 200] {
        for n_features in [10, 100] {
            for n_steps in [1, 5] {
                let (x, y) = generate_random_data(n_samples, n_features);

                let pen_max = x
                    .t()
                    .dot(&y)
                    .iter()
                    .fold(0_f64, |acc, v| acc.max(v.abs()))
                    / n_samples as f64;
                let flavor = NonConvexFlavor::new(NonConvexKind::Scad);
                let penalty =
                    PenaltyConfig::lasso(0.1 * pen_max).with_flavor(Flavor::NonConvex(flavor));
                let params = LlaParams::new().n_steps(n_steps).check().unwrap();

                let config = (n_samples, n_features, n_steps);
                let config_string = format!("{}, {}, {}", n_samples, n_features, n_steps);

                group.bench_with_input(
                    BenchmarkId::new("scad", config_string),
                    &config,
                    |b, _| {
                        b.iter(|| {
                            let mut solver = LlaSolver::new(params.clone(), FistaSolver::default());
                            solver
                                .setup(
                                    x.view(),
                                    y.view(),
                                    &LossConfig::LeastSquares,
                                    &penalty,
                                    false,
                                    None,
                                )
                                .unwrap();
                            solver.solve(None, None, None).unwrap()
                        })
                    },
                );
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_lla);
criterion_main!(benches);
