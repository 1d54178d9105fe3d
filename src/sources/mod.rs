// Copyright @yucwang 2026

pub mod blackbody;
pub mod constant;
pub mod noise;

use std::sync::Arc;

use crate::core::sample_source::SampleSource;
use crate::math::constants::Float;

pub use blackbody::BlackbodySource;
pub use constant::ConstantSource;
pub use noise::NoiseSource;

/// Declarative description of a sample source, as read from a session file
/// or the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    Constant { rgba: [Float; 4] },
    Noise { seed: u64 },
    Blackbody { min_kelvin: Float, max_kelvin: Float, seed: u64 },
}

impl SourceSpec {
    /// Default parameters for a source type name, if the name is known.
    pub fn from_kind(kind: &str) -> Option<SourceSpec> {
        match kind {
            "constant" => Some(SourceSpec::Constant { rgba: [0.5, 0.5, 0.5, 1.0] }),
            "noise" => Some(SourceSpec::Noise { seed: 0 }),
            "blackbody" => Some(SourceSpec::Blackbody {
                min_kelvin: BlackbodySource::DEFAULT_MIN_KELVIN,
                max_kelvin: BlackbodySource::DEFAULT_MAX_KELVIN,
                seed: 0,
            }),
            _ => None,
        }
    }

    pub fn with_seed(self, new_seed: u64) -> SourceSpec {
        match self {
            SourceSpec::Noise { .. } => SourceSpec::Noise { seed: new_seed },
            SourceSpec::Blackbody { min_kelvin, max_kelvin, .. } => {
                SourceSpec::Blackbody { min_kelvin, max_kelvin, seed: new_seed }
            }
            constant => constant,
        }
    }

    pub fn build(&self) -> Arc<dyn SampleSource> {
        match *self {
            SourceSpec::Constant { rgba } => Arc::new(ConstantSource::new(rgba)),
            SourceSpec::Noise { seed } => Arc::new(NoiseSource::new(seed)),
            SourceSpec::Blackbody { min_kelvin, max_kelvin, seed } => {
                Arc::new(BlackbodySource::new(min_kelvin, max_kelvin, seed))
            }
        }
    }
}
