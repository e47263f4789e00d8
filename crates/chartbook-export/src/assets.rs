//! Static assets for an export: template, cover mapping and cover images.
//!
//! Nothing here fails an export. Missing or broken assets are logged and replaced by defaults.

use crate::error::AssetError;
use crate::template::{CoverMapping, TemplateConfig};
use chartbook_render::{ImageFormat, RasterImage, compress};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use url::Url;

pub trait AssetSource: Send + Sync {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>>;
}

/// Reads assets below a base directory.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rel = Path::new(path);
        // Keep lookups inside the asset directory.
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.root.join(rel))
    }
}

impl AssetSource for FsAssetSource {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>> {
        async move {
            let full = self.resolve(path).ok_or_else(|| AssetError::NotFound {
                path: path.to_string(),
            })?;
            match tokio::fs::read(&full).await {
                Ok(bytes) => Ok(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(AssetError::NotFound {
                        path: path.to_string(),
                    })
                }
                Err(source) => Err(AssetError::Io { path: full, source }),
            }
        }
        .boxed()
    }
}

/// Fetches assets relative to a base URL.
#[derive(Clone)]
pub struct HttpAssetSource {
    agent: ureq::Agent,
    base: Url,
}

impl HttpAssetSource {
    pub fn new(base: Url) -> Self {
        Self::with_agent(ureq::Agent::new_with_defaults(), base)
    }

    pub fn with_agent(agent: ureq::Agent, mut base: Url) -> Self {
        // `Url::join` replaces the last segment unless the base ends with a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { agent, base }
    }
}

impl AssetSource for HttpAssetSource {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>> {
        async move {
            let url = self
                .base
                .join(path.trim_start_matches('/'))
                .map_err(|source| AssetError::Url {
                    path: path.to_string(),
                    source,
                })?;
            let agent = self.agent.clone();
            tokio::task::spawn_blocking(move || {
                let mut resp = agent.get(url.as_str()).call().map_err(|err| match err {
                    ureq::Error::StatusCode(404) => AssetError::NotFound {
                        path: url.to_string(),
                    },
                    other => AssetError::Http {
                        url: url.to_string(),
                        message: other.to_string(),
                    },
                })?;
                resp.body_mut()
                    .read_to_vec()
                    .map_err(|err| AssetError::Http {
                        url: url.to_string(),
                        message: err.to_string(),
                    })
            })
            .await
            .map_err(|err| AssetError::Task(err.to_string()))?
        }
        .boxed()
    }
}

/// A cover image ready to embed: always JPEG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub path: String,
    pub image: RasterImage,
}

impl CoverImage {
    /// Decodes `bytes`, re-encoding anything that is not already a three-channel JPEG.
    pub fn decode(path: &str, bytes: Vec<u8>, quality: f32) -> Option<Self> {
        let format = image::guess_format(&bytes).ok()?;
        let decoded = image::load_from_memory(&bytes).ok()?;
        // Embedded as DeviceRGB, so grayscale or CMYK JPEGs are re-encoded too. The decoder
        // converts CMYK to RGB, so only the frame header tells them apart.
        let embeddable = format == image::ImageFormat::Jpeg && jpeg_components(&bytes) == Some(3);
        let mut raster = RasterImage {
            bytes,
            format: ImageFormat::Png,
            width: decoded.width(),
            height: decoded.height(),
        };
        if embeddable {
            raster.format = ImageFormat::Jpeg;
        } else {
            raster = compress(&raster, quality);
        }
        (raster.format == ImageFormat::Jpeg).then(|| Self {
            path: path.to_string(),
            image: raster,
        })
    }
}

/// Number of color components declared in a JPEG's frame header.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        // SOF0..SOF15, minus DHT, JPG and DAC which share the range.
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            return bytes.get(i + 9).copied();
        }
        if marker == 0xDA {
            return None;
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        i += 2 + len;
    }
    None
}

/// Template, mapping and decoded cover images, loaded once per session.
#[derive(Debug, Clone, Default)]
pub struct ExportAssets {
    pub template: TemplateConfig,
    pub covers: CoverMapping,
    images: BTreeMap<String, CoverImage>,
}

impl ExportAssets {
    pub fn new(template: TemplateConfig, covers: CoverMapping) -> Self {
        Self {
            template,
            covers,
            images: BTreeMap::new(),
        }
    }

    pub async fn load(
        source: &dyn AssetSource,
        template_path: &str,
        mapping_path: &str,
    ) -> Self {
        let template = load_json::<TemplateConfig>(source, template_path)
            .await
            .unwrap_or_default();
        let covers = load_json::<CoverMapping>(source, mapping_path)
            .await
            .unwrap_or_default();

        let mut assets = Self::new(template, covers);
        let paths: Vec<String> = assets.covers.image_paths().map(str::to_string).collect();
        for path in paths {
            if assets.images.contains_key(&path) {
                continue;
            }
            match source.fetch(&path).await {
                Ok(bytes) => match CoverImage::decode(&path, bytes, 0.9) {
                    Some(img) => assets.insert_image(img),
                    None => tracing::warn!(path = %path, "cover image could not be decoded"),
                },
                Err(err) => tracing::warn!(path = %path, error = %err, "cover image unavailable"),
            }
        }
        tracing::info!(
            covers = assets.covers.covers.len(),
            images = assets.images.len(),
            "export assets loaded"
        );
        assets
    }

    pub fn insert_image(&mut self, image: CoverImage) {
        self.images.insert(image.path.clone(), image);
    }

    pub fn image(&self, path: &str) -> Option<&CoverImage> {
        self.images.get(path)
    }
}

async fn load_json<T: serde::de::DeserializeOwned>(
    source: &dyn AssetSource,
    path: &str,
) -> Option<T> {
    let bytes = match source.fetch(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path, error = %err, "asset unavailable, using defaults");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(source) => {
            let err = AssetError::Parse {
                path: path.to_string(),
                source,
            };
            tracing::warn!(error = %err, "asset ignored, using defaults");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(6, 4, Rgb([47, 93, 138]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn fs_source_rejects_escaping_paths() {
        let src = FsAssetSource::new("/tmp/assets");
        assert!(src.resolve("../etc/passwd").is_none());
        assert!(src.resolve("/etc/passwd").is_none());
        assert_eq!(
            src.resolve("covers/eng.jpg"),
            Some(PathBuf::from("/tmp/assets/covers/eng.jpg"))
        );
    }

    fn jpeg_bytes(img: image::DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    #[test]
    fn rgb_jpeg_covers_keep_their_bytes() {
        let bytes = jpeg_bytes(RgbImage::from_pixel(6, 4, Rgb([47, 93, 138])).into());
        assert_eq!(jpeg_components(&bytes), Some(3));
        let cover = CoverImage::decode("eng.jpg", bytes.clone(), 0.9).unwrap();
        assert_eq!(cover.image.bytes, bytes);
    }

    #[test]
    fn non_rgb_jpeg_covers_are_re_encoded() {
        let gray = jpeg_bytes(image::GrayImage::from_pixel(6, 4, image::Luma([90])).into());
        assert_eq!(jpeg_components(&gray), Some(1));
        let cover = CoverImage::decode("gray.jpg", gray.clone(), 0.9).unwrap();
        assert_ne!(cover.image.bytes, gray);
        assert_eq!(jpeg_components(&cover.image.bytes), Some(3));

        // Adobe CMYK frame header: SOI, APP14 "Adobe", SOF0 with four components.
        let mut cmyk = vec![0xFF, 0xD8, 0xFF, 0xEE, 0x00, 0x0E];
        cmyk.extend_from_slice(b"Adobe\x00\x64\x00\x00\x00\x00\x02");
        cmyk.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x14, 0x08, 0x00, 0x04, 0x00, 0x06, 0x04]);
        cmyk.extend_from_slice(&[1, 0x11, 0, 2, 0x11, 0, 3, 0x11, 0, 4, 0x11, 0]);
        assert_eq!(jpeg_components(&cmyk), Some(4));
    }

    #[test]
    fn png_covers_are_converted_to_jpeg() {
        let cover = CoverImage::decode("eng.png", png_bytes(), 0.9).unwrap();
        assert_eq!(cover.image.format, ImageFormat::Jpeg);
        assert_eq!((cover.image.width, cover.image.height), (6, 4));
        assert!(CoverImage::decode("junk", b"junk".to_vec(), 0.9).is_none());
    }

    #[tokio::test]
    async fn missing_assets_degrade_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("covers")).unwrap();
        std::fs::write(dir.path().join("covers/eng.png"), png_bytes()).unwrap();
        std::fs::write(
            dir.path().join("covers.json"),
            r#"{ "covers": { "eng": "covers/eng.png", "ops": "covers/missing.jpg" } }"#,
        )
        .unwrap();

        let src = FsAssetSource::new(dir.path());
        let assets = ExportAssets::load(&src, "template.json", "covers.json").await;
        assert_eq!(assets.template, TemplateConfig::default());
        assert!(assets.image("covers/eng.png").is_some());
        assert!(assets.image("covers/missing.jpg").is_none());
    }

    #[test]
    fn http_base_gets_trailing_slash() {
        let src = HttpAssetSource::new(Url::parse("https://cdn.example.com/brand").unwrap());
        assert_eq!(
            src.base.join("covers/eng.jpg").unwrap().as_str(),
            "https://cdn.example.com/brand/covers/eng.jpg"
        );
    }
}
