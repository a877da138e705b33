//! Versioned simulation parameter schemas.
//!
//! Each schema version is a fixed set of named scalar fields with compiled-in
//! defaults. Field sets of different versions are incompatible, so a
//! [`ParameterSet`] always carries exactly one version, explicitly selected
//! by whoever builds it.
//!
//! [`ParameterSet`]: enum.ParameterSet.html

use std::fmt;
use std::hash::Hasher;
use std::str::FromStr;

use fnv::FnvHasher;
use linked_hash_map::LinkedHashMap;

use crate::engine::Engine;
use crate::error::Error;
use crate::state::MeasureSpec;
use crate::{Fingerprint, Float, Int, Result};

/// Declares a parameter schema struct along with its defaults, declared
/// field order and string mapping conversion.
macro_rules! param_schema {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ident = $default:expr,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $( $field: $default, )*
                }
            }
        }

        impl $name {
            /// Field names in declared order.
            pub const FIELDS: &'static [&'static str] = &[$( stringify!($field), )*];

            /// Field names paired with current values, in declared order.
            pub fn values(&self) -> Vec<(&'static str, ParamValue)> {
                vec![$( (stringify!($field), ParamValue::from(self.$field)), )*]
            }

            /// Parses recognized keys, missing keys take the default value.
            pub fn from_dict(dict: &ParamDict) -> Result<Self> {
                let defaults = Self::default();
                Ok(Self {
                    $(
                        $field: match dict.get(stringify!($field)) {
                            Some(raw) => {
                                <$ty as FieldValue>::parse_field(stringify!($field), raw)?
                            }
                            None => defaults.$field,
                        },
                    )*
                })
            }
        }
    };
}

mod v1;
mod v2;

pub use v1::ColonyParams;
pub use v2::CompetitionParams;

/// String-keyed parameter mapping, preserving insertion order.
pub type ParamDict = LinkedHashMap<String, String>;

/// Terminates every field's string form when fingerprinting.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Parsing of a single field value out of its string form.
trait FieldValue: Sized {
    fn parse_field(field: &str, raw: &str) -> Result<Self>;
}

impl FieldValue for Int {
    fn parse_field(field: &str, raw: &str) -> Result<Self> {
        raw.trim()
            .parse::<Int>()
            .map_err(|e| Error::config(field, raw, e))
    }
}

impl FieldValue for Float {
    fn parse_field(field: &str, raw: &str) -> Result<Self> {
        let f = raw
            .trim()
            .parse::<Float>()
            .map_err(|e| Error::config(field, raw, e))?;
        if !f.is_finite() {
            return Err(Error::config(field, raw, "value must be finite"));
        }
        Ok(f)
    }
}

/// Value of a single parameter field.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ParamValue {
    Int(Int),
    Float(Float),
}

impl From<Int> for ParamValue {
    fn from(i: Int) -> Self {
        ParamValue::Int(i)
    }
}

impl From<Float> for ParamValue {
    fn from(f: Float) -> Self {
        ParamValue::Float(f)
    }
}

impl fmt::Display for ParamValue {
    /// Floats always keep their decimal point, `5.0` not `5`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{:?}", v),
        }
    }
}

/// Parameter schema version.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// Colony schema, sampled as raw counts.
    V1,
    /// Competition schema used by the multi-run model variant, sampled as
    /// counts plus min/avg/max aggregates.
    V2,
}

impl SchemaVersion {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaVersion::V1 => "v1",
            SchemaVersion::V2 => "v2",
        }
    }

    /// Parameter field names in declared order.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            SchemaVersion::V1 => ColonyParams::FIELDS,
            SchemaVersion::V2 => CompetitionParams::FIELDS,
        }
    }

    /// Measurements sampled from the engine for this schema.
    pub fn measures(&self) -> &'static [MeasureSpec] {
        match self {
            SchemaVersion::V1 => crate::state::V1_MEASURES,
            SchemaVersion::V2 => crate::state::V2_MEASURES,
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" | "colony" => Ok(SchemaVersion::V1),
            "v2" | "2" | "competition" => Ok(SchemaVersion::V2),
            _ => Err(Error::UnknownSchema(s.to_string())),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Immutable set of simulation parameters of a single schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSet {
    V1(ColonyParams),
    V2(CompetitionParams),
}

impl From<ColonyParams> for ParameterSet {
    fn from(p: ColonyParams) -> Self {
        ParameterSet::V1(p)
    }
}

impl From<CompetitionParams> for ParameterSet {
    fn from(p: CompetitionParams) -> Self {
        ParameterSet::V2(p)
    }
}

impl ParameterSet {
    /// Creates a parameter set with all the defaults of the given schema.
    pub fn default_for(schema: SchemaVersion) -> Self {
        match schema {
            SchemaVersion::V1 => ParameterSet::V1(ColonyParams::default()),
            SchemaVersion::V2 => ParameterSet::V2(CompetitionParams::default()),
        }
    }

    pub fn schema(&self) -> SchemaVersion {
        match self {
            ParameterSet::V1(_) => SchemaVersion::V1,
            ParameterSet::V2(_) => SchemaVersion::V2,
        }
    }

    /// Field names paired with their values, in declared order.
    pub fn values(&self) -> Vec<(&'static str, ParamValue)> {
        match self {
            ParameterSet::V1(p) => p.values(),
            ParameterSet::V2(p) => p.values(),
        }
    }

    pub fn get(&self, field: &str) -> Option<ParamValue> {
        self.values()
            .into_iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// Stringifies every field, in declared order.
    pub fn as_dict(&self) -> ParamDict {
        self.values()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    /// Builds a parameter set of the given schema from a string mapping.
    ///
    /// Keys missing from the mapping take the schema default. Values that
    /// fail to parse are a configuration error, they never fall back to the
    /// default. Unrecognized keys are ignored.
    pub fn from_dict(schema: SchemaVersion, dict: &ParamDict) -> Result<Self> {
        for key in dict.keys() {
            if !schema.fields().contains(&key.as_str()) {
                warn!("ignoring unknown {} parameter: {}", schema, key);
            }
        }
        Ok(match schema {
            SchemaVersion::V1 => ParameterSet::V1(ColonyParams::from_dict(dict)?),
            SchemaVersion::V2 => ParameterSet::V2(CompetitionParams::from_dict(dict)?),
        })
    }

    /// Deterministic fingerprint of the parameter values.
    ///
    /// String forms of all the fields are hashed in declared order with
    /// 64-bit FNV-1a, each one terminated by a unit separator byte so that
    /// neighbouring values can't trade digits. The result doesn't depend on
    /// the process or platform, so it can serve as a reproducible seed.
    pub fn deterministic_hash(&self) -> Fingerprint {
        let mut hasher = FnvHasher::default();
        for (_, value) in self.values() {
            hasher.write(value.to_string().as_bytes());
            hasher.write_u8(FIELD_SEPARATOR);
        }
        hasher.finish()
    }

    /// Sets every field as an engine global, one `set` command per field.
    ///
    /// There is no rollback, failing midway leaves the engine partially
    /// configured.
    pub fn apply_to_engine<E: Engine + ?Sized>(&self, engine: &mut E) -> Result<()> {
        for (name, value) in self.values() {
            let command = format!("set {} {}", engine_name(name), value);
            debug!("{}", command);
            engine.command(&command)?;
        }
        Ok(())
    }
}

/// Translates a field identifier into engine naming convention.
pub fn engine_name(field: &str) -> String {
    field.replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::synthetic::SyntheticEngine;

    #[test]
    fn as_dict_keeps_declared_order() {
        let params = ParameterSet::default_for(SchemaVersion::V1);
        let dict = params.as_dict();
        let keys: Vec<&str> = dict.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ColonyParams::FIELDS);
        assert_eq!(dict["food_evaporation"], "3");
        assert_eq!(dict["home_dist_threshold"], "5.0");
        assert_eq!(dict["coop_mult"], "0.05");
    }

    #[test]
    fn from_dict_round_trip() {
        for schema in &[SchemaVersion::V1, SchemaVersion::V2] {
            let params = ParameterSet::default_for(*schema);
            assert_eq!(
                ParameterSet::from_dict(*schema, &params.as_dict()).unwrap(),
                params
            );
        }
    }

    #[test]
    fn from_dict_missing_keys_default() {
        let mut dict = ParamDict::new();
        dict.insert("initial_ants".to_string(), "200".to_string());
        let params = ParameterSet::from_dict(SchemaVersion::V1, &dict).unwrap();
        match params {
            ParameterSet::V1(p) => {
                assert_eq!(p.initial_ants, 200);
                assert_eq!(p.food_val, ColonyParams::default().food_val);
                assert_eq!(p.chunk_refresh_time, 500);
            }
            _ => panic!("wrong schema"),
        }
    }

    #[test]
    fn from_dict_malformed_value_fails() {
        let mut dict = ParamDict::new();
        dict.insert("initial_ants".to_string(), "lots".to_string());
        match ParameterSet::from_dict(SchemaVersion::V1, &dict) {
            Err(Error::Configuration { field, value, .. }) => {
                assert_eq!(field, "initial_ants");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let mut dict = ParamDict::new();
        dict.insert("food_val".to_string(), "NaN".to_string());
        assert!(ParameterSet::from_dict(SchemaVersion::V1, &dict).is_err());

        // int fields don't accept floats
        let mut dict = ParamDict::new();
        dict.insert("chunk_size".to_string(), "12.5".to_string());
        assert!(ParameterSet::from_dict(SchemaVersion::V2, &dict).is_err());
    }

    #[test]
    fn schemas_are_distinct() {
        assert_ne!(SchemaVersion::V1.fields(), SchemaVersion::V2.fields());
        let v1 = ParameterSet::default_for(SchemaVersion::V1);
        let v2 = ParameterSet::default_for(SchemaVersion::V2);
        assert_ne!(v1, v2);
        assert_eq!(v1.schema(), SchemaVersion::V1);
        assert_eq!(v2.schema(), SchemaVersion::V2);
        assert_eq!("competition".parse::<SchemaVersion>().unwrap(), SchemaVersion::V2);
        assert!("v3".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn hash_is_stable() {
        let a = ParameterSet::default_for(SchemaVersion::V1);
        let b = ParameterSet::default_for(SchemaVersion::V1);
        assert_eq!(a.deterministic_hash(), b.deterministic_hash());
        let mut dict = a.as_dict();
        dict.insert("fight_mult".to_string(), "1.5".to_string());
        let c = ParameterSet::from_dict(SchemaVersion::V1, &dict).unwrap();
        assert_ne!(a.deterministic_hash(), c.deterministic_hash());
    }

    #[test]
    fn apply_translates_names() {
        let mut engine = SyntheticEngine::new();
        let params = ParameterSet::default_for(SchemaVersion::V1);
        params.apply_to_engine(&mut engine).unwrap();
        assert_eq!(engine.history().len(), ColonyParams::FIELDS.len());
        assert_eq!(engine.history()[0], "set food-evaporation 3");
        assert_eq!(engine.history()[1], "set home-dist-threshold 5.0");
        assert_eq!(engine.global("intitial-nest-energy"), Some("1000.0"));
    }

    #[test]
    fn get_field() {
        let params = ParameterSet::default_for(SchemaVersion::V2);
        assert_eq!(params.get("ants_per_colony"), Some(ParamValue::Int(20)));
        assert_eq!(params.get("scent_evaporation"), Some(ParamValue::Float(0.1)));
        assert_eq!(params.get("initial_ants"), None);
    }
}
