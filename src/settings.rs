//! Functions for loading session settings.

use crate::errors::*;
use crate::objects::texture::TextureFormat;

/// Session-wide configuration, fixed when the `Session` is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The number of timer queries that could be recorded between two gathers.
    pub max_timer_queries: usize,
    /// Dumps the backend capabilities when the renderer is created.
    pub log_capabilities: bool,
    /// Upper bound of polls performed by a blocking query wait. `None` spins until
    /// the result is available.
    pub spin_limit: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_timer_queries: 64,
            log_capabilities: true,
            spin_limit: None,
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Describes the native render target requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererParams {
    pub width: u32,
    pub height: u32,
    pub color_format: TextureFormat,
    /// The depth-stencil format of the native target, `None` for no depth buffer.
    pub depth_stencil_format: Option<TextureFormat>,
    /// Sets the multisampling level to request. A value of 0 indicates that
    /// multisampling must not be enabled.
    pub multisample: u32,
    pub vsync: bool,
}

impl Default for RendererParams {
    fn default() -> Self {
        RendererParams {
            width: 640,
            height: 480,
            color_format: TextureFormat::Rgba8,
            depth_stencil_format: Some(TextureFormat::Depth24Stencil8),
            multisample: 0,
            vsync: false,
        }
    }
}

impl RendererParams {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_json() {
        let settings = Settings::from_json(r#"{ "max_timer_queries": 4 }"#).unwrap();
        assert_eq!(settings.max_timer_queries, 4);
        assert!(settings.log_capabilities);

        let params = RendererParams::from_json(
            r#"{ "width": 32, "height": 16, "depth_stencil_format": null }"#,
        ).unwrap();
        assert_eq!((params.width, params.height), (32, 16));
        assert_eq!(params.depth_stencil_format, None);
        assert_eq!(params.color_format, TextureFormat::Rgba8);

        let err = RendererParams::from_json(r#"{ "color_format": "Rgb565" }"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEnum);
    }
}
