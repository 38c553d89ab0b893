use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use remover::transform_row;
use rows::{Cell, Clustering, ComplexColumn, Expiration, LivenessInfo, Row};

const ROWS: usize = 1_000;
const VAL_SIZE: usize = 100;

fn expiring_rows() -> Vec<Row> {
    let exp = Expiration::new(3600, 1_700_000_000);
    (0..ROWS as i32)
        .map(|i| {
            let mut row = Row::new(Clustering::regular(vec![i.to_be_bytes().to_vec()]));
            row.liveness = LivenessInfo::expiring(1, exp);
            row.push_cell(Cell::expiring("v", 1, vec![b'x'; VAL_SIZE], exp));
            row.push_cell(Cell::tombstone("d", 2, 1_600_000_000));
            let mut tags = ComplexColumn::new("tags");
            tags.cells = (0..4u8)
                .map(|t| Cell::expiring("tags", 1, Vec::new(), exp).with_path(vec![t]))
                .collect();
            row.push_complex(tags);
            row
        })
        .collect()
}

fn transform_expiring(c: &mut Criterion) {
    c.bench_function("transform_expiring_rows_1k", |b| {
        b.iter_batched(
            expiring_rows,
            |rows| rows.into_iter().map(transform_row).count(),
            BatchSize::SmallInput,
        );
    });
}

fn transform_permanent(c: &mut Criterion) {
    let permanent: Vec<Row> = expiring_rows().into_iter().map(transform_row).collect();
    c.bench_function("transform_permanent_rows_1k", |b| {
        b.iter_batched(
            || permanent.clone(),
            |rows| rows.into_iter().map(transform_row).count(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, transform_expiring, transform_permanent);
criterion_main!(benches);
