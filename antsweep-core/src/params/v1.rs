//! Colony schema.

use super::{FieldValue, ParamDict, ParamValue};
use crate::{Float, Int, Result};

param_schema! {
    /// Parameters of the colony model.
    ///
    /// Any subset of fields can be given when building from a mapping, the
    /// rest take the defaults below.
    pub struct ColonyParams {
        food_evaporation: Int = 3,
        home_dist_threshold: Float = 5.0,
        proportion_workers: Int = 75,
        initial_ants: Int = 120,
        initial_queens: Int = 6,
        scout_lifespan: Int = 575,
        worker_lifespan: Int = 575,
        /// Name matches the global defined by the model, typo included.
        intitial_nest_energy: Float = 1000.0,
        food_val: Float = 1.0,
        birth_threshold: Float = 700.0,
        birth_cost: Float = 2.7,
        split_threshold: Float = 1400.0,
        split_distance: Float = 40.0,
        max_colony_lifespan: Float = 1500.0,
        fight_mult: Float = 1.0,
        coop_mult: Float = 0.05,
        coop_amt: Float = 0.5,
        chunk_refresh_threshold: Int = 40,
        chunk_refresh_time: Int = 500,
        chunk_size: Int = 12,
    }
}
