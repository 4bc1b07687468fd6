use crate::policies::lrfu::LrfuMode;
use crate::policies::prp::PartWeighting;
use crate::stats::Thresholds;
use crate::units::{self, BytesSize, TimeStamp, MIB};
use serde::Deserialize;

fn default_part_size() -> BytesSize {
    MIB
}

fn default_seed() -> u64 {
    42
}

fn default_ghost_factor() -> f64 {
    1.0
}

fn default_lambda() -> f64 {
    1e-4
}

// Three days of trace time; coarse enough for the histograms to fill up
fn default_age_bin_width() -> TimeStamp {
    3 * units::DAY
}

fn default_ewma_factor() -> f64 {
    0.0088
}

fn default_computation_interval() -> u64 {
    10_000
}

fn default_num_bins() -> usize {
    64
}

/// Eviction policy selection plus its tuning parameters, straight from the JSON config:
/// `{ "kind": "arc", "ghost_factor": 0.5 }`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    #[serde(alias = "LRU")]
    Lru,
    #[serde(alias = "LRUBit", alias = "clock")]
    LruBit,
    #[serde(alias = "ARC")]
    Arc {
        #[serde(default = "default_ghost_factor")]
        ghost_factor: f64,
    },
    #[serde(alias = "ARCBit")]
    ArcBit {
        #[serde(default = "default_ghost_factor")]
        ghost_factor: f64,
    },
    #[serde(alias = "PRP")]
    Prp {
        #[serde(default)]
        weighting: PartWeighting,
    },
    #[serde(alias = "PRPBit")]
    PrpBit {
        #[serde(default)]
        weighting: PartWeighting,
    },
    #[serde(alias = "LRFU")]
    Lrfu {
        #[serde(default = "default_lambda")]
        lambda: f64,
        #[serde(default)]
        mode: LrfuMode,
    },
    #[serde(alias = "EVA")]
    Eva {
        #[serde(default = "default_age_bin_width")]
        age_bin_width: TimeStamp,
        #[serde(default = "default_ewma_factor")]
        ewma_factor: f64,
        #[serde(default = "default_computation_interval")]
        computation_interval: u64,
        #[serde(default = "default_num_bins")]
        num_bins: usize,
    },
    #[serde(alias = "EVABit")]
    EvaBit {
        #[serde(default = "default_ewma_factor")]
        ewma_factor: f64,
        #[serde(default = "default_computation_interval")]
        computation_interval: u64,
        #[serde(default = "default_num_bins")]
        num_bins: usize,
    },
    #[serde(alias = "MIN", alias = "belady")]
    Min,
    #[serde(alias = "random")]
    Rand {
        #[serde(default)]
        weighting: PartWeighting,
    },
}

impl PolicyConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PolicyConfig::Lru => "lru",
            PolicyConfig::LruBit => "lru-bit",
            PolicyConfig::Arc { .. } => "arc",
            PolicyConfig::ArcBit { .. } => "arc-bit",
            PolicyConfig::Prp { .. } => "prp",
            PolicyConfig::PrpBit { .. } => "prp-bit",
            PolicyConfig::Lrfu { .. } => "lrfu",
            PolicyConfig::Eva { .. } => "eva",
            PolicyConfig::EvaBit { .. } => "eva-bit",
            PolicyConfig::Min => "min",
            PolicyConfig::Rand { .. } => "rand",
        }
    }

    /// MIN replays the future; it is the only policy needing the reuse index
    pub fn requires_reuse_index(&self) -> bool {
        matches!(self, PolicyConfig::Min)
    }
}

/// One simulated cache volume: a capacity and the policy managing it
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(deserialize_with = "crate::units::deserialize_byte_size")]
    pub capacity: BytesSize,
    pub policy: PolicyConfig,
}

impl RunConfig {
    pub fn effective_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.policy.kind_name().to_string())
    }
}

/// Top-level simulation configuration, deserialized from a JSON file.
///
/// All runs replay the same trace with the same part size and predicates, so their
/// results are directly comparable.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(
        default = "default_part_size",
        deserialize_with = "crate::units::deserialize_byte_size"
    )]
    pub part_size: BytesSize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub warm_up: Option<Thresholds>,
    #[serde(default)]
    pub stop_early: Option<Thresholds>,
    pub runs: Vec<RunConfig>,
}

impl SimulationConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
