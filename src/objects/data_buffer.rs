use crate::backends::{BackendId, BufferKind, Capabilities, Visitor};
use crate::errors::*;
use crate::utils::out_of_range;

use super::{Claim, GpuObject, ObjectType};

impl_handle!(DataBufferHandle);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataBufferKind {
    /// Backs uniform blocks.
    Uniform,
    /// Generic storage, e.g. the source of buffer copies.
    Generic,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBufferParams {
    pub kind: DataBufferKind,
    pub size: usize,
    #[serde(default)]
    pub sparse: bool,
}

impl DataBufferParams {
    pub fn validate(&self, caps: &Capabilities) -> Result<()> {
        if self.size == 0 {
            bail_format!(InvalidValue, "Data buffer must not be empty.");
        }

        if self.sparse && !caps.sparse_buffer {
            bail_format!(Incompatible, "Sparse buffers are not supported.");
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct DataBuffer {
    params: DataBufferParams,
    id: Option<BackendId>,
}

impl DataBuffer {
    pub fn allocate(
        visitor: &mut dyn Visitor,
        caps: &Capabilities,
        params: DataBufferParams,
    ) -> Result<Self> {
        params.validate(caps)?;

        let kind = match params.kind {
            DataBufferKind::Uniform => BufferKind::Uniform,
            DataBufferKind::Generic => BufferKind::Storage,
        };

        let id = visitor.create_buffer(kind, params.size)?;
        Ok(DataBuffer {
            params,
            id: Some(id),
        })
    }

    #[inline]
    pub fn params(&self) -> &DataBufferParams {
        &self.params
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.params.size
    }

    #[inline]
    pub fn id(&self) -> Option<BackendId> {
        self.id
    }

    /// Writes `bytes` at `offset`.
    pub fn update(&self, visitor: &mut dyn Visitor, offset: usize, bytes: &[u8]) -> Result<()> {
        if out_of_range(offset, bytes.len(), self.params.size) {
            bail_format!(
                InvalidValue,
                "Out of bounds write of {} bytes at {} into a {} bytes buffer.",
                bytes.len(),
                offset,
                self.params.size
            );
        }

        match self.id {
            Some(id) => visitor.update_buffer(id, offset, bytes),
            None => Err(err_format!(InvalidState, "Data buffer has no renderer resources.")),
        }
    }
}

impl GpuObject for DataBuffer {
    const TYPE: ObjectType = ObjectType::DataBuffer;

    fn release_renderer_resources(&mut self, visitor: &mut dyn Visitor) -> Vec<Claim> {
        if let Some(id) = self.id.take() {
            if let Err(err) = visitor.delete_buffer(id) {
                warn!("{}", err);
            }
        }

        Vec::new()
    }
}
