use crate::backends::{BackendId, ImageRegion};
use crate::errors::*;
use crate::utils::out_of_range;
use crate::objects::data_buffer::DataBufferHandle;
use crate::objects::geometry::GeometryHandle;
use crate::objects::geometry_buffer::GeometryBufferHandle;
use crate::objects::sampler::SamplerParams;
use crate::objects::texture::{Texture, TextureHandle, TextureKind};
use crate::objects::Object;

use super::{Session, RENDERER};

/// Checks that `region` lies inside mip level `region.level` of `texture`.
fn check_region(handle: TextureHandle, texture: &Texture, region: &ImageRegion) -> Result<()> {
    let params = texture.params();
    if region.level >= params.mipmaps {
        bail_format!(InvalidValue, "Level {} of {} is undefined.", region.level, handle);
    }

    let (w, h, d) = params.dimensions(region.level);
    let d = match params.kind {
        TextureKind::Tex1DArray | TextureKind::Tex2DArray => params.layers,
        TextureKind::Cube => 6,
        TextureKind::CubeArray => 6 * params.layers,
        _ => d,
    };

    let fits = |offset: u32, extent: u32, size: u32| {
        extent > 0 && u64::from(offset) + u64::from(extent) <= u64::from(size)
    };

    if !fits(region.x, region.width, w)
        || !fits(region.y, region.height, h)
        || !fits(region.z, region.depth, d)
    {
        bail_format!(InvalidValue, "Region {:?} is out of {}.", region, handle);
    }

    Ok(())
}

/// Rounds `[offset, offset + size)` out to whole pages.
fn page_range(offset: usize, size: usize, page: usize) -> (usize, usize) {
    if page == 0 {
        return (offset, size);
    }

    let start = offset / page * page;
    let end = offset.saturating_add(size).saturating_add(page - 1) / page * page;
    (start, end - start)
}

impl Session {
    /// The storage buffer of a raw-data object, with its size in bytes.
    fn storage(&self, object: Object) -> Result<(BackendId, usize)> {
        let missing = || err_format!(InvalidObject, "{} is not alive.", object);
        let released = || err_format!(InvalidObject, "{} has no renderer resources.", object);

        match object {
            Object::GeometryBuffer(h) => {
                let v = self.objects.geometry_buffers.get(h).ok_or_else(missing)?;
                let id = v.vertex_buffer().ok_or_else(released)?;
                Ok((id, v.params().vertex_buffer_len()))
            }
            Object::DataBuffer(h) => {
                let v = self.objects.data_buffers.get(h).ok_or_else(missing)?;
                let id = v.id().ok_or_else(released)?;
                Ok((id, v.size()))
            }
            Object::Texture(h) => {
                let v = self.objects.textures.get(h).ok_or_else(missing)?;
                if v.params().kind != TextureKind::Buffer {
                    bail_format!(InvalidOperation, "{} is not a buffer texture.", h);
                }

                let id = v.buffer().ok_or_else(released)?;
                Ok((id, v.params().width as usize * v.format().size() as usize))
            }
            _ => Err(err_format!(
                InvalidOperation,
                "{:?} objects hold no raw data.",
                object.object_type()
            )),
        }
    }

    /// Copies `size` bytes between the storage of geometry buffers, data buffers and
    /// buffer textures.
    pub fn copy_data<S, D>(
        &mut self,
        src: S,
        dst: D,
        read_offset: usize,
        write_offset: usize,
        size: usize,
    ) -> Result<()>
    where
        S: Into<Object>,
        D: Into<Object>,
    {
        let (src, dst) = (src.into(), dst.into());
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let (src_id, src_len) = s.storage(src)?;
            let (dst_id, dst_len) = s.storage(dst)?;

            if size == 0
                || out_of_range(read_offset, size, src_len)
                || out_of_range(write_offset, size, dst_len)
            {
                bail_format!(
                    InvalidValue,
                    "Copy of {} bytes is out of range of {} or {}.",
                    size,
                    src,
                    dst
                );
            }

            if src_id == dst_id
                && read_offset < write_offset + size
                && write_offset < read_offset + size
            {
                bail_format!(InvalidValue, "Source and destination ranges overlap.");
            }

            s.visitor
                .copy_buffer(src_id, dst_id, read_offset, write_offset, size)
        })
    }

    /// Copies texels between two regions of the same extent.
    pub fn copy_image(
        &mut self,
        src: TextureHandle,
        src_region: ImageRegion,
        dst: TextureHandle,
        dst_region: ImageRegion,
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            if !s.caps()?.copy_image {
                bail_format!(Incompatible, "The backend could not copy images.");
            }

            let mut ids = [None; 2];
            let pairs = [(src, src_region), (dst, dst_region)];
            for (i, &(handle, region)) in pairs.iter().enumerate() {
                let v = s
                    .objects
                    .textures
                    .get(handle)
                    .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", handle))?;

                if v.params().kind == TextureKind::Buffer {
                    bail_format!(InvalidObject, "{} is a buffer texture.", handle);
                }

                check_region(handle, v, &region)?;
                ids[i] = v.id();
            }

            let formats = (
                s.objects.textures.get(src).map(|v| v.format().size()),
                s.objects.textures.get(dst).map(|v| v.format().size()),
            );

            if formats.0 != formats.1 {
                bail_format!(Incompatible, "Texel sizes of {} and {} differ.", src, dst);
            }

            if (src_region.width, src_region.height, src_region.depth)
                != (dst_region.width, dst_region.height, dst_region.depth)
            {
                bail_format!(InvalidValue, "Regions of a copy must have the same extent.");
            }

            match (ids[0], ids[1]) {
                (Some(a), Some(b)) => s.visitor.copy_image(a, src_region, b, dst_region),
                _ => Err(err_format!(InvalidObject, "Texture has no renderer resources.")),
            }
        })
    }

    /// Commits or decommits the pages of a sparse data buffer covering the range.
    pub fn buffer_commitment(
        &mut self,
        buffer: DataBufferHandle,
        offset: usize,
        size: usize,
        commit: bool,
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let caps = s.caps()?;
            if !caps.sparse_buffer {
                bail_format!(Incompatible, "The backend has no sparse buffers.");
            }

            let v = s
                .objects
                .data_buffers
                .get(buffer)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

            if !v.params().sparse {
                bail_format!(InvalidOperation, "{} is not sparse.", buffer);
            }

            let page = caps.sparse_buffer_page_size as usize;
            if page > 0 && (offset % page != 0 || size % page != 0) {
                bail_format!(
                    InvalidValue,
                    "Commitment range is not aligned to pages of {} bytes.",
                    page
                );
            }

            if size == 0 || out_of_range(offset, size, v.size()) {
                bail_format!(InvalidValue, "Commitment range is out of {}.", buffer);
            }

            let id = v.id().ok_or_else(|| {
                err_format!(InvalidObject, "{} has no renderer resources.", buffer)
            })?;

            s.visitor.commit_buffer_pages(id, offset, size, commit)
        })
    }

    /// Commits or decommits the pages of a sparse geometry buffer used by `geometries`.
    /// Geometries living in other buffers are skipped.
    pub fn geometry_buffer_commitment(
        &mut self,
        buffer: GeometryBufferHandle,
        geometries: &[GeometryHandle],
        commit: bool,
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let caps = s.caps()?;
            if !caps.sparse_buffer {
                bail_format!(Incompatible, "The backend has no sparse buffers.");
            }

            let v = s
                .objects
                .geometry_buffers
                .get(buffer)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

            if !v.params().sparse {
                bail_format!(InvalidOperation, "{} is not sparse.", buffer);
            }

            let stride = v.decl().stride() as usize;
            let index_size = v.index_format().map(|f| f.size()).unwrap_or(0) as usize;
            let page = caps.sparse_buffer_page_size as usize;

            let mut ranges = Vec::new();
            for &g in geometries {
                let geometry = s
                    .objects
                    .geometries
                    .get(g)
                    .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", g))?;

                if geometry.buffer() != buffer {
                    continue;
                }

                if let Some(id) = v.vertex_buffer() {
                    let offset = geometry.first_vertex() as usize * stride;
                    let size = geometry.vertex_count() as usize * stride;
                    let (offset, size) = page_range(offset, size, page);
                    let size = size.min(v.params().vertex_buffer_len() - offset);
                    ranges.push((id, offset, size));
                }

                if let (Some(id), true) = (v.index_buffer(), geometry.index_count() > 0) {
                    let offset = geometry.first_index() as usize * index_size;
                    let size = geometry.index_count() as usize * index_size;
                    let (offset, size) = page_range(offset, size, page);
                    let size = size.min(v.params().index_buffer_len() - offset);
                    ranges.push((id, offset, size));
                }
            }

            for (id, offset, size) in ranges {
                s.visitor.commit_buffer_pages(id, offset, size, commit)?;
            }

            Ok(())
        })
    }

    /// Commits or decommits the pages of a sparse texture covering `region`.
    pub fn texture_commitment(
        &mut self,
        texture: TextureHandle,
        region: ImageRegion,
        commit: bool,
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            if !s.caps()?.sparse_texture {
                bail_format!(Incompatible, "The backend has no sparse textures.");
            }

            let v = s
                .objects
                .textures
                .get(texture)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", texture))?;

            if v.params().kind == TextureKind::Buffer {
                bail_format!(InvalidObject, "{} is a buffer texture.", texture);
            }

            if !v.params().sparse {
                bail_format!(InvalidOperation, "{} is not sparse.", texture);
            }

            check_region(texture, v, &region)?;
            let id = v.id().ok_or_else(|| {
                err_format!(InvalidObject, "{} has no renderer resources.", texture)
            })?;

            s.visitor.commit_texture_pages(id, region, commit)
        })
    }

    /// Generates every mip level of `texture` from its base level.
    pub fn build_mips(&mut self, texture: TextureHandle) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let v = s
                .objects
                .textures
                .get(texture)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", texture))?;

            match v.params().kind {
                TextureKind::Buffer => {
                    bail_format!(InvalidObject, "{} is a buffer texture.", texture);
                }
                TextureKind::Tex2DMultisample | TextureKind::Rect => {
                    bail_format!(
                        InvalidOperation,
                        "{:?} textures have no mip levels.",
                        v.params().kind
                    );
                }
                _ => {}
            }

            let id = v.id().ok_or_else(|| {
                err_format!(InvalidObject, "{} has no renderer resources.", texture)
            })?;

            s.visitor.build_mips(id)
        })
    }

    /// Replaces the sampler set of the session. Texture parameters refer to samplers
    /// by their index in `params`.
    pub fn create_samplers(&mut self, params: &[SamplerParams]) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;
            s.objects.samplers.create(&mut *s.visitor, params)
        })
    }

    #[inline]
    pub fn sampler_count(&self) -> usize {
        self.objects.samplers.len()
    }

    /// Writes raw vertices into `buffer`, starting at vertex `first`.
    pub fn update_vertices(
        &mut self,
        buffer: GeometryBufferHandle,
        first: u32,
        bytes: &[u8],
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let v = s
                .objects
                .geometry_buffers
                .get(buffer)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

            v.update_vertices(&mut *s.visitor, first, bytes)
        })
    }

    /// Writes raw indices into `buffer`, starting at index `first`.
    pub fn update_indices(
        &mut self,
        buffer: GeometryBufferHandle,
        first: u32,
        bytes: &[u8],
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let v = s
                .objects
                .geometry_buffers
                .get(buffer)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

            v.update_indices(&mut *s.visitor, first, bytes)
        })
    }

    /// Writes `bytes` into a data buffer at `offset`.
    pub fn update_data_buffer(
        &mut self,
        buffer: DataBufferHandle,
        offset: usize,
        bytes: &[u8],
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let v = s
                .objects
                .data_buffers
                .get(buffer)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

            v.update(&mut *s.visitor, offset, bytes)
        })
    }
}
