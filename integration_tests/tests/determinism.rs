mod common;

use common::fixture_context;
use core_fusion::{FusedGrid, Metric};

async fn hydrated_grid() -> FusedGrid {
    let context = fixture_context(None);
    let grid = context.hydrate_grid().await;
    context.hydrate_for(Metric::Traffic, &grid).await
}

#[tokio::test]
async fn repeated_fusion_is_identical() {
    let context = fixture_context(None);
    let first = context.hydrate_grid().await;
    let second = context.hydrate_grid().await;

    assert_eq!(first.digest(), second.digest());
    assert_eq!(first, second);
}

#[tokio::test]
async fn independent_contexts_agree() {
    let grid_a = hydrated_grid().await;
    let grid_b = hydrated_grid().await;

    assert_eq!(grid_a.digest(), grid_b.digest());
    assert_eq!(grid_a.maxima, grid_b.maxima);
    assert_eq!(grid_a.cells, grid_b.cells);
}

#[tokio::test]
async fn traffic_refresh_is_idempotent() {
    let context = fixture_context(None);
    let grid = hydrated_grid().await;
    let refreshed = context.hydrate_traffic(&grid).await;
    let refreshed_again = context.hydrate_traffic(&refreshed).await;

    assert_eq!(grid.digest(), refreshed.digest());
    assert_eq!(refreshed.digest(), refreshed_again.digest());
}

#[tokio::test]
async fn traffic_changes_the_digest() {
    let context = fixture_context(None);
    let plain = context.hydrate_grid().await;
    let hydrated = context.hydrate_traffic(&plain).await;
    assert_ne!(plain.digest(), hydrated.digest());
}
