//! Competition schema.

use super::{FieldValue, ParamDict, ParamValue};
use crate::{Float, Int, Result};

param_schema! {
    /// Parameters of the multi-run competition model, the variant that saves
    /// per-ant data to files addressed by run index.
    pub struct CompetitionParams {
        initial_colonies: Int = 6,
        ants_per_colony: Int = 20,
        food_evaporation: Int = 3,
        scent_evaporation: Float = 0.1,
        diffusion_rate: Int = 50,
        food_val: Float = 1.0,
        energy_decay: Float = 0.1,
        birth_threshold: Float = 700.0,
        birth_cost: Float = 2.7,
        split_threshold: Float = 1400.0,
        split_distance: Float = 40.0,
        max_colony_lifespan: Float = 1500.0,
        fight_mult: Float = 1.0,
        coop_mult: Float = 0.05,
        coop_amt: Float = 0.5,
        chunk_size: Int = 12,
    }
}
