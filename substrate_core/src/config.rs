use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{DomainCosts, DomainDesc, DomainPolicy};
use crate::fields::{SeededTerrainParams, StructuralParams, TravelParams};
use crate::geometry::Aabb;
use crate::pathfinding::PathfinderConfig;
use crate::scalar::{scalar_from_f32, Scalar};
use crate::scheduler::SchedulerConfig;

pub const BUILTIN_SUBSTRATE_CONFIG: &str = include_str!("data/substrate_config.json");

#[derive(Debug, Clone, Default, Deserialize, Resource)]
#[serde(default)]
pub struct SubstrateConfig {
    scheduler: SchedulerConfig,
    tile_cache: TileCacheConfig,
    domain: DomainDefaults,
    pathfinding: PathfinderConfig,
    terrain: SeededTerrainParams,
    structure: StructuralParams,
    travel: TravelParams,
}

impl SubstrateConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_SUBSTRATE_CONFIG)
                .expect("builtin substrate config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, SubstrateConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| SubstrateConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = SubstrateConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        self.scheduler
    }

    pub fn tile_cache(&self) -> &TileCacheConfig {
        &self.tile_cache
    }

    pub fn domain(&self) -> &DomainDefaults {
        &self.domain
    }

    pub fn pathfinding(&self) -> &PathfinderConfig {
        &self.pathfinding
    }

    pub fn terrain(&self) -> &SeededTerrainParams {
        &self.terrain
    }

    pub fn structure(&self) -> &StructuralParams {
        &self.structure
    }

    pub fn travel(&self) -> &TravelParams {
        &self.travel
    }

    /// Domain description carrying the configured tile, cost and policy
    /// defaults.
    pub fn domain_desc(&self, domain_id: u64, bounds: Aabb, seed: u64) -> DomainDesc {
        DomainDesc {
            domain_id,
            bounds,
            seed,
            tile_size: self.domain.tile_size(),
            medium_dim: self.domain.medium_dim,
            coarse_dim: self.domain.coarse_dim,
            costs: self.domain.costs,
            policy: self.domain.policy,
            tile_cache_capacity: self.tile_cache.capacity,
            capsule_capacity: self.tile_cache.capsule_capacity,
            ..DomainDesc::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum SubstrateConfigError {
    #[error("failed to parse substrate config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read substrate config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    pub capacity: usize,
    pub capsule_capacity: usize,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            capsule_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DomainDefaults {
    tile_size: f32,
    pub medium_dim: u32,
    pub coarse_dim: u32,
    pub costs: DomainCosts,
    pub policy: DomainPolicy,
}

impl DomainDefaults {
    pub fn tile_size(&self) -> Scalar {
        scalar_from_f32(self.tile_size.max(1.0))
    }
}

impl Default for DomainDefaults {
    fn default() -> Self {
        Self {
            tile_size: 16.0,
            medium_dim: 8,
            coarse_dim: 4,
            costs: DomainCosts::default(),
            policy: DomainPolicy::default(),
        }
    }
}

/// Where the active config came from; `None` means the builtin document.
#[derive(Resource, Debug, Clone, Default)]
pub struct SubstrateConfigMetadata {
    path: Option<PathBuf>,
}

impl SubstrateConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Loads the config named by `SUBSTRATE_CONFIG_PATH`, falling back to the
/// builtin document when the variable is unset or the file is unusable.
pub fn load_substrate_config_from_env() -> (Arc<SubstrateConfig>, SubstrateConfigMetadata) {
    let Some(path) = env::var("SUBSTRATE_CONFIG_PATH").ok().map(PathBuf::from) else {
        tracing::info!(target: "substrate::config", "substrate_config.loaded=builtin");
        return (SubstrateConfig::builtin(), SubstrateConfigMetadata::new(None));
    };

    match SubstrateConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "substrate::config",
                path = %path.display(),
                "substrate_config.loaded=file"
            );
            (Arc::new(config), SubstrateConfigMetadata::new(Some(path)))
        }
        Err(err) => {
            tracing::warn!(
                target: "substrate::config",
                path = %path.display(),
                error = %err,
                "substrate_config.load_failed"
            );
            (SubstrateConfig::builtin(), SubstrateConfigMetadata::new(None))
        }
    }
}
