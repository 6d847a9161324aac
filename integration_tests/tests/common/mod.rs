#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use core_fusion::{
    load_fusion_config_from_env, DirectoryFetcher, FusionContext, SourceCatalog,
};

static INIT: Once = Once::new();

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixtures_dir().join("test_fusion_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test fusion config at {}",
            config_path.display()
        );

        std::env::set_var("FUSION_CONFIG_PATH", &config_path);
    });
}

pub fn fixture_catalog() -> SourceCatalog {
    ensure_test_config();
    let (config, _) = load_fusion_config_from_env();
    config.sources().clone()
}

pub fn fixture_context(year: Option<u16>) -> FusionContext<DirectoryFetcher> {
    context_for(&fixture_catalog(), year)
}

pub fn context_for(catalog: &SourceCatalog, year: Option<u16>) -> FusionContext<DirectoryFetcher> {
    FusionContext::new(DirectoryFetcher::new(fixtures_dir()), catalog, year)
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
