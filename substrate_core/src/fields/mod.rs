//! Field models evaluated by query domains.

mod provider;
mod structure;
mod travel;

pub use provider::{value_noise, SeededTerrain, SeededTerrainParams, TerrainFields};
pub use structure::{StructuralModel, StructuralParams, StructuralSample};
pub use travel::{
    MovementProfile, TravelMode, TravelModel, TravelParams, TravelSample, TRAVEL_MODE_COUNT,
};
