mod common;

use anyhow::{Context, Result};
use common::{assert_close, fixture_context};
use core_fusion::{
    aggregate_range, filter_cells, rank_cells, rank_links, CellCode, CellFilter, CellMetrics,
    FeatureCollection, FilterMode, Metric, RangeSelection,
};

const CELL_1: &str = "513100001";
const CELL_2: &str = "513100002";
const CELL_3: &str = "513100003";
const CELL_4: &str = "513100004";

#[tokio::test]
async fn grid_fuses_every_source() -> Result<()> {
    let context = fixture_context(None);
    let grid = context.hydrate_grid().await;
    assert_eq!(grid.len(), 5);

    let first = grid.cell(CELL_1).context("cell 1 fused")?;
    assert_eq!(first.population, 1200.0);
    assert_eq!(first.labor, 600.0);
    assert_eq!(first.floor, 5000.0);
    assert_eq!(first.road_area.pref, 300.0);
    assert_close(first.ratio_0_14, 12.5);
    assert_close(first.ratio_65_over, 22.5);

    let numeric_key = grid.cell(CELL_2).context("numeric key joins")?;
    assert_eq!(numeric_key.population, 800.0);

    let padded_key = grid.cell(CELL_3).context("padded key joins")?;
    assert_eq!(padded_key.floor_norm, 100.0);

    let sparse = grid.cell(CELL_4).context("cell 4 fused")?;
    assert_eq!(sparse.population, 0.0);
    assert_eq!(sparse.floor, 0.0);
    assert_eq!(sparse.labor, 50.0);
    assert_eq!((sparse.ratio_0_14, sparse.ratio_65_over), (0.0, 0.0));

    let anonymous = &grid.cells[4];
    assert!(anonymous.code.is_none());
    assert_eq!(anonymous.population, 0.0);

    assert_eq!(grid.maxima.population, 1200.0);
    assert_eq!(grid.maxima.floor, 10000.0);
    assert_eq!(grid.maxima.traffic, 0.0);
    Ok(())
}

#[tokio::test]
async fn traffic_hydration_spreads_link_volumes() -> Result<()> {
    let context = fixture_context(None);
    let allocation = context.traffic_allocation().await;
    assert_eq!(allocation.get(CELL_1), Some(600.0));
    assert_eq!(allocation.get(CELL_2), Some(600.0));
    assert_eq!(allocation.get(CELL_3), Some(300.0));
    assert_eq!(allocation.get("599999999"), Some(50.0));
    assert_close(allocation.total(), 1200.0 + 300.0 + 50.0);

    let grid = context.hydrate_grid().await;
    let hydrated = context.hydrate_for(Metric::Score, &grid).await;
    assert_eq!(hydrated.maxima.traffic, 600.0);

    let first = hydrated.cell(CELL_1).context("cell 1")?;
    assert_eq!(first.traffic_norm, 100.0);
    assert_close(first.score_norm.context("score")?, (100.0 + 100.0 + 50.0) / 3.0);

    let third = hydrated.cell(CELL_3).context("cell 3")?;
    assert_close(third.traffic_norm, 50.0);
    assert_close(
        third.score_norm.context("score")?,
        (50.0 + 400.0 / 1200.0 * 100.0 + 100.0) / 3.0,
    );

    for cell in &hydrated.cells {
        for norm in [cell.traffic_norm, cell.population_norm, cell.floor_norm, cell.labor_norm] {
            assert!((0.0..=100.0).contains(&norm));
        }
    }
    Ok(())
}

#[tokio::test]
async fn road_rollup_matches_referenced_cells() -> Result<()> {
    let context = fixture_context(None);
    let grid = context.hydrate_grid().await;
    let grid = context.hydrate_traffic(&grid).await;
    let summaries = context.road_summaries(&grid).await;

    let order: Vec<&str> = summaries.iter().map(|s| s.link.as_str()).collect();
    assert_eq!(order, vec!["L1", "L2", "L3", "L4"]);

    let l1 = summaries.get("L1").context("L1")?;
    assert_eq!(l1.traffic_value, 1200.0);
    assert_eq!(l1.population_value, 2000.0);
    assert_eq!(l1.floor_value, 7500.0);
    assert_eq!(l1.matched_cells, 2);
    assert_close(l1.ratio_0_14, 230.0 / 2000.0 * 100.0);

    let l2 = summaries.get("L2").context("L2 falls back to the feature id")?;
    assert_eq!(l2.traffic_value, 300.0);
    assert_eq!(l2.population_value, 400.0);

    let l3 = summaries.get("L3").context("L3")?;
    assert_eq!(l3.traffic_value, 0.0);
    assert_eq!(l3.matched_cells, 1);

    let l4 = summaries.get("L4").context("L4")?;
    assert_eq!(l4.matched_cells, 0);
    assert_eq!(l4.score_norm, 0.0);

    let ranked = rank_links(&summaries, Metric::Traffic, 2);
    assert_eq!(ranked.ids().collect::<Vec<_>>(), vec!["L1", "L2"]);
    Ok(())
}

#[tokio::test]
async fn range_and_ranking_over_fused_grid() -> Result<()> {
    let context = fixture_context(None);
    let grid = context.hydrate_grid().await;

    let selection = RangeSelection::from_codes([CELL_1, CELL_3, CELL_4]);
    let aggregate = aggregate_range(&grid.cells, Metric::Population, Some(&selection));
    let range = aggregate.range.as_ref().context("range computed")?;
    assert_eq!(range.sum, 1600.0);
    assert_eq!(range.count, 2);
    assert_eq!(range.average, Some(800.0));
    let max = range.max.as_ref().context("max")?;
    assert_eq!(max.code, CellCode::parse(CELL_1));
    let min = range.min.as_ref().context("min")?;
    assert_eq!(min.code, CellCode::parse(CELL_3));
    assert_eq!(aggregate.overall_sum, 2400.0);
    assert_eq!(aggregate.overall_count, 3);

    let report = rank_cells(&grid.cells, Metric::Floor, 3);
    assert_eq!(report.ids().collect::<Vec<_>>(), vec![CELL_3, CELL_1, CELL_2]);
    let csv = report.to_csv()?;
    assert!(csv.starts_with("rank,id,metric,value\n1,513100003,Floor area,10000\n"));
    Ok(())
}

#[tokio::test]
async fn filters_select_cells_in_grid_order() -> Result<()> {
    let context = fixture_context(None);
    let grid = context.hydrate_grid().await;
    let filters: Vec<CellFilter> = vec!["population:500:".parse()?, "floor::6000".parse()?];

    let both = filter_cells(&grid.cells, &filters, FilterMode::All);
    assert_eq!(both.iter().map(CellCode::as_str).collect::<Vec<_>>(), vec![CELL_1, CELL_2]);

    let either = filter_cells(&grid.cells, &filters, FilterMode::Any);
    assert_eq!(
        either.iter().map(CellCode::as_str).collect::<Vec<_>>(),
        vec![CELL_1, CELL_2, CELL_4]
    );
    Ok(())
}

#[tokio::test]
async fn enriched_grid_round_trips_through_geojson() -> Result<()> {
    let context = fixture_context(None);
    let grid = context.hydrate_grid().await;
    let enriched = grid.apply_to(context.grid().await);

    let encoded = serde_json::to_string(&enriched)?;
    let decoded = FeatureCollection::from_json_str(&encoded)?;
    assert_eq!(decoded.foreign_members.get("name"), Some(&serde_json::json!("grid_fixture")));

    let bag = &decoded.features[0].properties;
    assert_eq!(bag.get("KEY_CODE"), Some(&serde_json::json!(CELL_1)));
    let restored = CellMetrics::from_properties(CellCode::parse(CELL_1), bag);
    assert_eq!(Some(&restored), grid.cell(CELL_1));
    assert!(decoded.features[0].geometry.is_object());
    Ok(())
}
