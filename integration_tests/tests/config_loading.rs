mod common;

use substrate_core::{load_substrate_config_from_env, Scalar, SubstrateConfig};

#[test]
fn env_override_is_loaded() {
    common::ensure_test_config();
    let (config, metadata) = load_substrate_config_from_env();
    let path = metadata.path().expect("override path recorded");
    assert!(path.ends_with("test_substrate_config.json"));
    assert_eq!(config.tile_cache().capacity, 16);
    assert_eq!(config.domain().tile_size(), Scalar::from_int(8));
    assert_eq!(config.pathfinding().max_nodes(), 2_048);
    // sections absent from the override keep their defaults
    assert_eq!(config.terrain().query_cost, 2);
}

#[test]
fn fixture_file_parses_directly() -> anyhow::Result<()> {
    let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_substrate_config.json");
    let config = SubstrateConfig::from_file(&path)?;
    assert_eq!(config.scheduler().entry_capacity, 20_000);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw["travel"]["obstacle_density"], 0);
    Ok(())
}

#[test]
fn malformed_document_is_a_parse_error() {
    let err = SubstrateConfig::from_json_str("{ \"scheduler\": 3 }").unwrap_err();
    assert!(err.is_data());
}
