mod common;

use anyhow::{Context, Result};
use common::fixture_context;

#[tokio::test]
async fn contexts_resolve_their_own_year() -> Result<()> {
    let current = fixture_context(None);
    let earlier = fixture_context(Some(2015));
    assert_eq!(current.year(), Some(2020));
    assert_eq!(earlier.year(), Some(2015));
    assert_eq!(current.catalog().population.location, "population_2020.csv");
    assert_eq!(earlier.catalog().population.location, "population_2015.csv");

    let (current_grid, earlier_grid) = tokio::join!(current.hydrate_grid(), earlier.hydrate_grid());

    let now = current_grid.cell("513100001").context("current cell")?;
    let then = earlier_grid.cell("513100001").context("earlier cell")?;
    assert_eq!(now.population, 1200.0);
    assert_eq!(then.population, 1100.0);

    let dropped = earlier_grid.cell("513100003").context("earlier cell 3")?;
    assert_eq!(dropped.population, 0.0);
    assert_eq!(earlier_grid.maxima.population, 1100.0);
    Ok(())
}

#[tokio::test]
async fn unknown_year_fails_softly() -> Result<()> {
    let context = fixture_context(Some(1990));
    let grid = context.hydrate_grid().await;
    assert_eq!(grid.len(), 5);
    assert!(grid.cells.iter().all(|cell| cell.population == 0.0));
    let cell = grid.cell("513100001").context("cell fused")?;
    assert_eq!(cell.floor, 5000.0);
    Ok(())
}
