//! Off-screen render targets.

use cgmath::Vector2;

use crate::backends::{AttachmentTarget, BackendId, Capabilities, FrameBufferLayout, Visitor};
use crate::errors::*;
use crate::MAX_COLOR_TARGETS;

use super::registry::RefPool;
use super::texture::{Texture, TextureFormat, TextureHandle, TextureKind};
use super::{Claim, GpuObject, Object, ObjectType};

impl_handle!(FrameBufferHandle);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameBufferAttachment {
    /// Renders into a mip level and array slice of a texture.
    Texture {
        texture: TextureHandle,
        #[serde(default)]
        level: u32,
        #[serde(default)]
        slice: u32,
    },
    /// Renders into a private surface of the framebuffer itself, which could not be
    /// sampled later.
    Surface(TextureFormat),
}

impl FrameBufferAttachment {
    #[inline]
    pub fn texture(texture: TextureHandle) -> Self {
        FrameBufferAttachment::Texture {
            texture,
            level: 0,
            slice: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameBufferParams {
    /// The size used when nothing is attached, or for surfaces. Zero takes the size
    /// of the attached textures.
    pub width: u32,
    pub height: u32,
    /// The sample count of surfaces.
    pub multisample: u32,
    pub colors: [Option<FrameBufferAttachment>; MAX_COLOR_TARGETS],
    pub depth_stencil: Option<FrameBufferAttachment>,
}

struct Resolved {
    target: Option<AttachmentTarget>,
    format: TextureFormat,
    samples: u32,
    size: Option<(u32, u32)>,
}

/// Counts what the attachments agree on while they are checked one by one.
#[derive(Default)]
struct Completeness {
    attachments: u32,
    multisample: Option<u32>,
    srgb: u32,
    size: Option<(u32, u32)>,
}

impl Completeness {
    fn check(&mut self, slot: &str, v: &Resolved) -> Result<()> {
        if let Some(samples) = self.multisample {
            if samples != v.samples {
                bail_format!(
                    InvalidValue,
                    "Attachment {} has {} samples while others have {}.",
                    slot,
                    v.samples,
                    samples
                );
            }
        }

        self.multisample = Some(v.samples);
        self.attachments += 1;

        if v.format.is_srgb() {
            self.srgb += 1;
        }

        if let Some((w, h)) = v.size {
            self.size = Some(match self.size {
                Some((sw, sh)) => (sw.min(w), sh.min(h)),
                None => (w, h),
            });
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct FrameBuffer {
    size: Vector2<u32>,
    multisample: u32,
    srgb: bool,
    color_formats: [Option<TextureFormat>; MAX_COLOR_TARGETS],
    depth_stencil_format: Option<TextureFormat>,
    id: Option<BackendId>,
    surfaces: Vec<BackendId>,
    claims: Vec<Claim>,
}

impl FrameBuffer {
    pub fn allocate(
        visitor: &mut dyn Visitor,
        caps: &Capabilities,
        textures: &RefPool<TextureHandle, Texture>,
        params: &FrameBufferParams,
    ) -> Result<Self> {
        if caps.max_draw_buffers > 0 {
            let used = params.colors.iter().rposition(|v| v.is_some()).map(|v| v + 1);
            if used.unwrap_or(0) > caps.max_draw_buffers as usize {
                bail_format!(
                    InvalidValue,
                    "The backend supports only {} color targets.",
                    caps.max_draw_buffers
                );
            }
        }

        let mut fb = FrameBuffer {
            size: Vector2::new(params.width, params.height),
            multisample: 0,
            srgb: false,
            color_formats: [None; MAX_COLOR_TARGETS],
            depth_stencil_format: None,
            id: None,
            surfaces: Vec::new(),
            claims: Vec::new(),
        };

        match fb.attach(visitor, textures, params, caps) {
            Ok(()) => Ok(fb),
            Err(err) => {
                fb.release_renderer_resources(visitor);
                Err(err)
            }
        }
    }

    fn attach(
        &mut self,
        visitor: &mut dyn Visitor,
        textures: &RefPool<TextureHandle, Texture>,
        params: &FrameBufferParams,
        caps: &Capabilities,
    ) -> Result<()> {
        let mut layout = FrameBufferLayout::default();
        let mut completeness = Completeness::default();

        // Textures are checked first, surfaces are only created once those are fine.
        let mut resolved = Vec::new();
        for (i, v) in params.colors.iter().enumerate() {
            if let Some(v) = v {
                let name = format!("color{}", i);
                let item = Self::resolve(textures, params, v, false)?;
                completeness.check(&name, &item)?;
                resolved.push((Some(i), *v, item));
            }
        }

        if let Some(ref v) = params.depth_stencil {
            let item = Self::resolve(textures, params, v, true)?;
            completeness.check("depth_stencil", &item)?;
            resolved.push((None, *v, item));
        }

        if completeness.attachments == 0 && !caps.no_attachments {
            bail_format!(
                InvalidValue,
                "Framebuffers without attachments are not supported."
            );
        }

        let (width, height) = match (params.width, params.height) {
            (0, _) | (_, 0) => completeness.size.unwrap_or((0, 0)),
            (w, h) => (w, h),
        };

        if width == 0 || height == 0 {
            bail_format!(InvalidValue, "Framebuffer dimensions must be positive.");
        }

        self.size = Vector2::new(width, height);
        self.multisample = completeness.multisample.unwrap_or(params.multisample);
        self.srgb = completeness.srgb > 0;
        layout.width = width;
        layout.height = height;

        for (slot, desc, item) in resolved {
            let target = match item.target {
                Some(target) => target,
                None => {
                    let id = visitor.create_renderbuffer(item.format, self.size, item.samples)?;
                    self.surfaces.push(id);
                    AttachmentTarget::Renderbuffer(id)
                }
            };

            if let FrameBufferAttachment::Texture { texture, .. } = desc {
                self.claims.push(Claim::Object(Object::Texture(texture)));
            }

            match slot {
                Some(i) => {
                    layout.colors[i] = Some(target);
                    self.color_formats[i] = Some(item.format);
                }
                None => {
                    layout.depth_stencil = Some(target);
                    self.depth_stencil_format = Some(item.format);
                }
            }
        }

        self.id = Some(visitor.create_framebuffer(&layout)?);
        Ok(())
    }

    fn resolve(
        textures: &RefPool<TextureHandle, Texture>,
        params: &FrameBufferParams,
        attachment: &FrameBufferAttachment,
        depth: bool,
    ) -> Result<Resolved> {
        let check = |format: TextureFormat| -> Result<()> {
            if format.is_depth() != depth {
                bail_format!(
                    InvalidValue,
                    "{:?} could not be attached as a {} target.",
                    format,
                    if depth { "depth-stencil" } else { "color" }
                );
            }

            Ok(())
        };

        match *attachment {
            FrameBufferAttachment::Surface(format) => {
                check(format)?;
                Ok(Resolved {
                    target: None,
                    format,
                    samples: params.multisample,
                    size: None,
                })
            }
            FrameBufferAttachment::Texture {
                texture,
                level,
                slice,
            } => {
                let v = textures
                    .get(texture)
                    .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", texture))?;

                let tp = v.params();
                check(tp.format)?;

                if tp.kind == TextureKind::Buffer {
                    bail_format!(InvalidValue, "Buffer textures could not be attached.");
                }

                if level >= tp.mipmaps {
                    bail_format!(InvalidValue, "Level {} of {} is undefined.", level, texture);
                }

                let slices = match tp.kind {
                    TextureKind::Tex3D => tp.dimensions(level).2,
                    TextureKind::Cube => 6,
                    TextureKind::CubeArray => 6 * tp.layers,
                    _ => tp.layers,
                };

                if slice >= slices {
                    bail_format!(InvalidValue, "Slice {} of {} is undefined.", slice, texture);
                }

                let (w, h, _) = tp.dimensions(level);
                let id = v.id().ok_or_else(|| {
                    err_format!(InvalidObject, "{} has no renderer resources.", texture)
                })?;

                Ok(Resolved {
                    target: Some(AttachmentTarget::Texture { id, level, slice }),
                    format: tp.format,
                    samples: tp.multisample,
                    size: Some((w, h)),
                })
            }
        }
    }

    #[inline]
    pub fn size(&self) -> Vector2<u32> {
        self.size
    }

    #[inline]
    pub fn multisample(&self) -> u32 {
        self.multisample
    }

    #[inline]
    pub fn srgb(&self) -> bool {
        self.srgb
    }

    /// The resolved formats of color targets and the depth-stencil target.
    #[inline]
    pub fn formats(
        &self,
    ) -> ([Option<TextureFormat>; MAX_COLOR_TARGETS], Option<TextureFormat>) {
        (self.color_formats, self.depth_stencil_format)
    }

    #[inline]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Makes this framebuffer current on the backend.
    pub fn bind(&self, visitor: &mut dyn Visitor) -> Result<()> {
        match self.id {
            Some(id) => visitor.bind_framebuffer(Some(id), self.srgb),
            None => Err(err_format!(InvalidObject, "Framebuffer has no renderer resources.")),
        }
    }
}

impl GpuObject for FrameBuffer {
    const TYPE: ObjectType = ObjectType::FrameBuffer;

    fn release_renderer_resources(&mut self, visitor: &mut dyn Visitor) -> Vec<Claim> {
        if let Some(id) = self.id.take() {
            if let Err(err) = visitor.delete_framebuffer(id) {
                warn!("{}", err);
            }
        }

        for id in self.surfaces.drain(..) {
            if let Err(err) = visitor.delete_renderbuffer(id) {
                warn!("{}", err);
            }
        }

        ::std::mem::replace(&mut self.claims, Vec::new())
    }
}
