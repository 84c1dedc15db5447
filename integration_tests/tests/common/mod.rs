#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use substrate_core::{
    load_substrate_config_from_env, Aabb, DomainQueryEngine, FieldProvider, Point3,
    ProviderSample, QueryBudget, Scalar, SeededTerrain, SubstrateConfig, TerrainFields,
    TravelModel,
};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_substrate_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test substrate config at {}",
            config_path.display()
        );

        std::env::set_var("SUBSTRATE_CONFIG_PATH", &config_path);
    });
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> Arc<SubstrateConfig> {
    ensure_test_config();
    init_tracing();
    load_substrate_config_from_env().0
}

pub fn world_bounds() -> Aabb {
    Aabb::new(Point3::from_ints(0, 0, 0), Point3::from_ints(64, 64, 32))
}

/// Flat dry ground at elevation 8 with an impassable ridge along x in
/// `10..=11` for every y below `gap_y`.
#[derive(Debug, Clone)]
pub struct Ridge {
    pub gap_y: i64,
}

impl FieldProvider for Ridge {
    type Fields = TerrainFields;

    fn sample_query(&self, point: &Point3, budget: &mut QueryBudget) -> ProviderSample<TerrainFields> {
        if !budget.consume(1) {
            return ProviderSample::unknown();
        }
        let x = point.x.floor_to_int();
        let y = point.y.floor_to_int();
        ProviderSample::known(TerrainFields {
            elevation: Scalar::from_int(8),
            hardness: Scalar::from_int(40),
            density: Scalar::from_int(2),
            obstruction: (10..=11).contains(&x) && y < self.gap_y,
            ..TerrainFields::default()
        })
    }
}

pub fn ridge_domain(config: &SubstrateConfig, gap_y: i64) -> DomainQueryEngine<TravelModel<Ridge>> {
    let seed = 0xA11CE;
    let model = TravelModel::new(Ridge { gap_y }, seed, config.travel());
    DomainQueryEngine::new(config.domain_desc(7, world_bounds(), seed), model)
}

pub fn seeded_domain(
    config: &SubstrateConfig,
    seed: u64,
) -> DomainQueryEngine<TravelModel<SeededTerrain>> {
    let terrain = SeededTerrain::new(seed, config.terrain());
    let model = TravelModel::new(terrain, seed, config.travel());
    DomainQueryEngine::new(config.domain_desc(11, world_bounds(), seed), model)
}
