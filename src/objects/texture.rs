//! Immutable and sparse textures, including buffer textures.

use crate::backends::{BackendId, BufferKind, Capabilities, Visitor};
use crate::errors::*;

use super::{Claim, GpuObject, ObjectType};

impl_handle!(TextureHandle);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    Rgbx8,
    Rgba8,
    SRgbx8,
    SRgba8,
    Rgbx16F,
    Rgba16F,
    Rgbx32F,
    Rgba32F,
    Depth16,
    Depth24,
    Depth24Stencil8,
}

impl TextureFormat {
    pub fn is_srgb(self) -> bool {
        match self {
            TextureFormat::SRgbx8 | TextureFormat::SRgba8 => true,
            _ => false,
        }
    }

    pub fn is_float(self) -> bool {
        match self {
            TextureFormat::Rgbx16F
            | TextureFormat::Rgba16F
            | TextureFormat::Rgbx32F
            | TextureFormat::Rgba32F => true,
            _ => false,
        }
    }

    pub fn is_depth(self) -> bool {
        match self {
            TextureFormat::Depth16 | TextureFormat::Depth24 | TextureFormat::Depth24Stencil8 => {
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn is_color(self) -> bool {
        !self.is_depth()
    }

    pub fn has_stencil(self) -> bool {
        self == TextureFormat::Depth24Stencil8
    }

    pub fn size(self) -> u32 {
        match self {
            TextureFormat::Depth16 => 2,
            TextureFormat::Depth24 => 3,
            TextureFormat::Rgbx16F | TextureFormat::Rgba16F => 8,
            TextureFormat::Rgbx32F | TextureFormat::Rgba32F => 16,
            _ => 4,
        }
    }

    /// Checks if the backend is able to create textures of this format.
    pub fn is_supported(self, caps: &Capabilities) -> bool {
        match self {
            TextureFormat::SRgbx8 | TextureFormat::SRgba8 => caps.texture_srgb,
            TextureFormat::Depth16 | TextureFormat::Depth24 => caps.texture_depth,
            TextureFormat::Depth24Stencil8 => caps.texture_depthstencil,
            v if v.is_float() => caps.texture_float,
            _ => true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureKind {
    Tex1D,
    Tex1DArray,
    Tex2D,
    Tex2DArray,
    Tex2DMultisample,
    Tex3D,
    Cube,
    CubeArray,
    Rect,
    /// A texture view of a data buffer.
    Buffer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureParams {
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layers: u32,
    pub mipmaps: u32,
    pub multisample: u32,
    /// Pages are committed explicitly with `Session::texture_commitment`.
    pub sparse: bool,
}

impl Default for TextureParams {
    fn default() -> Self {
        TextureParams {
            kind: TextureKind::Tex2D,
            format: TextureFormat::Rgba8,
            width: 1,
            height: 1,
            depth: 1,
            layers: 1,
            mipmaps: 1,
            multisample: 0,
            sparse: false,
        }
    }
}

impl TextureParams {
    pub fn validate(&self, caps: &Capabilities) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 || self.layers == 0 {
            bail_format!(InvalidValue, "Texture dimensions must be positive.");
        }

        if self.mipmaps == 0 {
            bail_format!(InvalidValue, "Texture must have at least one mip level.");
        }

        match self.kind {
            TextureKind::Tex2DMultisample => {
                if self.multisample == 0 {
                    bail_format!(InvalidValue, "Multisample texture without sample count.");
                }
            }
            TextureKind::Buffer => {
                if self.height != 1 || self.depth != 1 || self.mipmaps != 1 {
                    bail_format!(InvalidValue, "Buffer textures are one-dimensional.");
                }
            }
            _ => {
                if self.multisample > 0 {
                    bail_format!(
                        InvalidValue,
                        "Only multisample textures take a sample count, got {:?}.",
                        self.kind
                    );
                }
            }
        }

        if self.kind != TextureKind::Tex2DMultisample {
            let maxsize = if self.kind == TextureKind::Tex3D {
                caps.max_3d_texture_size
            } else {
                caps.max_texture_size
            };

            if maxsize > 0 && self.width.max(self.height) > maxsize {
                bail_format!(InvalidValue, "Texture exceeds the {}px limit.", maxsize);
            }
        }

        if !self.format.is_supported(caps) {
            bail_format!(Incompatible, "{:?} textures are not supported.", self.format);
        }

        if self.sparse && !caps.sparse_texture {
            bail_format!(Incompatible, "Sparse textures are not supported.");
        }

        Ok(())
    }

    /// The extent of mip `level`.
    pub fn dimensions(&self, level: u32) -> (u32, u32, u32) {
        let shrink = |v: u32| (v >> level).max(1);
        let depth = if self.kind == TextureKind::Tex3D {
            shrink(self.depth)
        } else {
            self.depth
        };

        (shrink(self.width), shrink(self.height), depth)
    }
}

#[derive(Debug)]
pub struct Texture {
    params: TextureParams,
    id: Option<BackendId>,
    /// The storage of a buffer texture.
    buffer: Option<BackendId>,
}

impl Texture {
    pub fn allocate(
        visitor: &mut dyn Visitor,
        caps: &Capabilities,
        params: TextureParams,
    ) -> Result<Self> {
        params.validate(caps)?;

        let buffer = if params.kind == TextureKind::Buffer {
            let size = params.width as usize * params.format.size() as usize;
            Some(visitor.create_buffer(BufferKind::Storage, size)?)
        } else {
            None
        };

        let mut texture = Texture {
            params,
            id: None,
            buffer,
        };

        match visitor.create_texture(&params) {
            Ok(id) => {
                texture.id = Some(id);
                Ok(texture)
            }
            Err(err) => {
                texture.release_renderer_resources(visitor);
                Err(err)
            }
        }
    }

    #[inline]
    pub fn params(&self) -> &TextureParams {
        &self.params
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.params.format
    }

    #[inline]
    pub fn id(&self) -> Option<BackendId> {
        self.id
    }

    #[inline]
    pub fn buffer(&self) -> Option<BackendId> {
        self.buffer
    }
}

impl GpuObject for Texture {
    const TYPE: ObjectType = ObjectType::Texture;

    fn release_renderer_resources(&mut self, visitor: &mut dyn Visitor) -> Vec<Claim> {
        if let Some(id) = self.id.take() {
            if let Err(err) = visitor.delete_texture(id) {
                warn!("{}", err);
            }
        }

        if let Some(id) = self.buffer.take() {
            if let Err(err) = visitor.delete_buffer(id) {
                warn!("{}", err);
            }
        }

        Vec::new()
    }
}
