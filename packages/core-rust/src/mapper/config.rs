use serde::{Deserialize, Serialize};

/// Depth limit of the underlying JSON decoder. Larger configured limits are
/// capped to this value when decoding.
pub const DECODER_DEPTH_LIMIT: usize = 128;

/// What reverse mapping emits when it reaches an entity already being
/// expanded higher up the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Drop the association value, or the element for collections.
    Omit,
    /// Emit `{"$ref": <type>, <identifier fields>}` in place of the entity.
    #[default]
    Marker,
}

/// Treatment of decoded keys that match no declared field or association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPropertyPolicy {
    #[default]
    Ignore,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Maximum nesting depth for both decoding and reverse mapping.
    pub max_depth: usize,
    pub cycle_policy: CyclePolicy,
    pub unknown_properties: UnknownPropertyPolicy,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            max_depth: DECODER_DEPTH_LIMIT,
            cycle_policy: CyclePolicy::default(),
            unknown_properties: UnknownPropertyPolicy::default(),
        }
    }
}

impl MapperConfig {
    /// Depth limit actually enforced while decoding.
    #[must_use]
    pub fn decode_depth(&self) -> usize {
        self.max_depth.min(DECODER_DEPTH_LIMIT)
    }
}
