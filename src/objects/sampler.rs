//! Samplers are session-wide and addressed by index from texture bindings.

use crate::backends::{BackendId, Visitor};
use crate::errors::*;

use super::state::Comparison;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureWrap {
    Repeat,
    Mirror,
    Clamp,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerParams {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    /// Filtering between mip levels, `None` samples the base level only.
    pub mip_filter: Option<TextureFilter>,
    pub wrap_u: TextureWrap,
    pub wrap_v: TextureWrap,
    pub wrap_w: TextureWrap,
    pub anisotropy: u32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub lod_bias: f32,
    /// Depth comparison mode for shadow samplers.
    pub compare: Option<Comparison>,
}

impl Default for SamplerParams {
    fn default() -> Self {
        SamplerParams {
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            mip_filter: None,
            wrap_u: TextureWrap::Repeat,
            wrap_v: TextureWrap::Repeat,
            wrap_w: TextureWrap::Repeat,
            anisotropy: 1,
            min_lod: -1000.0,
            max_lod: 1000.0,
            lod_bias: 0.0,
            compare: None,
        }
    }
}

#[derive(Debug)]
struct Entry {
    id: Option<BackendId>,
    rc: u32,
}

/// The sampler set of a session. References are held by parameter values, the set
/// can only be recreated once none of its samplers is referenced.
#[derive(Debug, Default)]
pub struct SamplerTable {
    entries: Vec<Entry>,
}

impl SamplerTable {
    pub fn new() -> Self {
        SamplerTable {
            entries: Vec::new(),
        }
    }

    /// Replaces the whole sampler set.
    pub fn create(&mut self, visitor: &mut dyn Visitor, params: &[SamplerParams]) -> Result<()> {
        if self.entries.iter().any(|v| v.rc > 0) {
            bail_format!(
                InvalidOperation,
                "Samplers could not be recreated while they are referenced."
            );
        }

        self.release_renderer_resources(visitor);
        self.entries.clear();

        for v in params {
            match visitor.create_sampler(v) {
                Ok(id) => self.entries.push(Entry { id: Some(id), rc: 0 }),
                Err(err) => {
                    self.release_renderer_resources(visitor);
                    self.entries.clear();
                    return Err(err);
                }
            }
        }

        info!("{} sampler objects created.", self.entries.len());
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn id(&self, index: usize) -> Option<BackendId> {
        self.entries.get(index).and_then(|v| v.id)
    }

    pub fn ref_count(&self, index: usize) -> Option<u32> {
        self.entries.get(index).map(|v| v.rc)
    }

    pub fn add_ref(&mut self, index: usize) -> Result<()> {
        match self.entries.get_mut(index) {
            Some(v) => {
                v.rc += 1;
                Ok(())
            }
            None => Err(err_format!(InvalidValue, "Sampler {} does not exist.", index)),
        }
    }

    pub fn release(&mut self, index: usize) {
        if let Some(v) = self.entries.get_mut(index) {
            v.rc = v.rc.saturating_sub(1);
        }
    }

    /// Deletes the backend samplers. The entries and their counts are kept.
    pub fn release_renderer_resources(&mut self, visitor: &mut dyn Visitor) {
        for v in &mut self.entries {
            if let Some(id) = v.id.take() {
                if let Err(err) = visitor.delete_sampler(id) {
                    warn!("{}", err);
                }
            }
        }
    }
}
