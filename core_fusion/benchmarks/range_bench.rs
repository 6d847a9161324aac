use core_fusion::{
    aggregate_range, allocate_traffic, fuse_grid_metrics, CellCode, CellTable, GridCell, LinkId,
    Metric, PopulationDetail, RangeSelection, RoadAreaDetail, RoadLink, TrafficTable,
};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn cell_code(index: usize) -> String {
    format!("{:09}", 513_300_000 + index)
}

fn synthetic_grid(size: usize) -> Vec<GridCell> {
    (0..size).map(|index| GridCell::new(&cell_code(index))).collect()
}

fn synthetic_population(size: usize) -> CellTable<PopulationDetail> {
    (0..size)
        .filter(|index| index % 7 != 0)
        .filter_map(|index| {
            let total = ((index * 37) % 900) as f64;
            CellCode::parse(&cell_code(index)).map(|code| {
                (
                    code,
                    PopulationDetail {
                        total,
                        pop_0_14: total * 0.12,
                        pop_15_64: total * 0.58,
                        pop_65_over: total * 0.30,
                    },
                )
            })
        })
        .collect()
}

fn synthetic_floor(size: usize) -> CellTable<f64> {
    (0..size)
        .filter_map(|index| {
            CellCode::parse(&cell_code(index)).map(|code| (code, ((index * 53) % 4_000) as f64))
        })
        .collect()
}

fn synthetic_roads(size: usize) -> (Vec<RoadLink>, TrafficTable) {
    let links: Vec<RoadLink> = (0..size / 2)
        .map(|index| {
            let cells = format!("{}_{}", cell_code(index * 2), cell_code(index * 2 + 1));
            RoadLink::new(&format!("L{index}"), &cells)
        })
        .collect();
    let traffic = (0..size / 2)
        .filter_map(|index| {
            LinkId::parse(&format!("L{index}")).map(|id| (id, ((index * 97) % 15_000) as f64))
        })
        .collect();
    (links, traffic)
}

fn selection(size: usize) -> RangeSelection {
    let codes: Vec<String> = (0..size).step_by(3).map(cell_code).collect();
    RangeSelection::from_codes(codes.iter().map(String::as_str))
}

fn bench_range_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_aggregation");

    for size in [1_000usize, 10_000, 50_000] {
        let cells = synthetic_grid(size);
        let grid = fuse_grid_metrics(
            &cells,
            &synthetic_population(size),
            &CellTable::empty(),
            &synthetic_floor(size),
            &CellTable::<RoadAreaDetail>::empty(),
        );
        let (links, traffic) = synthetic_roads(size);
        let grid = grid.with_traffic(&allocate_traffic(&links, &traffic));
        let selected = selection(size);

        group.bench_with_input(BenchmarkId::new("score", size), &size, |b, _| {
            b.iter(|| aggregate_range(black_box(&grid.cells), Metric::Score, Some(&selected)));
        });

        group.bench_with_input(BenchmarkId::new("refresh_traffic", size), &size, |b, _| {
            b.iter_batched(
                || allocate_traffic(&links, &traffic),
                |allocation| grid.with_traffic(&allocation),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(range_benches, bench_range_aggregation);
criterion_main!(range_benches);
