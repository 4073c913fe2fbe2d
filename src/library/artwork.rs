use anyhow::Result;
use std::{fs::File, path::Path};
use symphonia::core::{
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::{MetadataOptions, StandardVisualKey, Visual},
    probe::Hint,
};
use tracing::debug;

use super::TrackDescriptor;

/// Portadas más grandes no se adjuntan (límite de subida de Discord sin nitro).
const MAX_COVER_BYTES: usize = 8 * 1024 * 1024;

/// Portada embebida en el archivo de audio (APIC, METADATA_BLOCK_PICTURE...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub data: Vec<u8>,
    pub media_type: String,
}

impl Cover {
    pub fn file_name(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/png" => "album_art.png",
            "image/gif" => "album_art.gif",
            "image/webp" => "album_art.webp",
            _ => "album_art.jpg",
        }
    }

    /// URL con la que un embed referencia el adjunto del mismo mensaje.
    pub fn attachment_url(&self) -> String {
        format!("attachment://{}", self.file_name())
    }
}

/// La portada frontal si existe; si no, la primera imagen.
pub fn pick_front_cover<'a>(visuals: impl IntoIterator<Item = &'a Visual>) -> Option<Cover> {
    let visuals: Vec<&Visual> = visuals
        .into_iter()
        .filter(|visual| !visual.data.is_empty() && visual.data.len() <= MAX_COVER_BYTES)
        .collect();

    let chosen = visuals
        .iter()
        .find(|visual| visual.usage == Some(StandardVisualKey::FrontCover))
        .or_else(|| visuals.first())?;

    Some(Cover {
        data: chosen.data.to_vec(),
        media_type: chosen.media_type.clone(),
    })
}

fn read_cover(path: &Path) -> Result<Option<Cover>> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    // ID3v2 va antes del contenedor; si trae portada, gana
    let leading = probed
        .metadata
        .get()
        .and_then(|metadata| metadata.current().and_then(|revision| pick_front_cover(revision.visuals())));
    if leading.is_some() {
        return Ok(leading);
    }

    let container = probed.format.metadata();
    let cover = container.current().and_then(|revision| pick_front_cover(revision.visuals()));
    Ok(cover)
}

/// Lee la portada de la pista fuera del runtime. Sin portada o con error: `None`.
pub async fn load_cover(track: &TrackDescriptor) -> Option<Cover> {
    let path = track.path.clone();
    let result = tokio::task::spawn_blocking(move || read_cover(&path)).await;

    match result {
        Ok(Ok(cover)) => cover,
        Ok(Err(e)) => {
            debug!("Sin portada para {}: {}", track.path.display(), e);
            None
        }
        Err(e) => {
            debug!("Lectura de portada abortada para {}: {}", track.path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn visual(media_type: &str, usage: Option<StandardVisualKey>, data: &[u8]) -> Visual {
        Visual {
            media_type: media_type.to_string(),
            dimensions: None,
            bits_per_pixel: None,
            color_mode: None,
            usage,
            tags: Vec::new(),
            data: data.to_vec().into_boxed_slice(),
        }
    }

    #[test]
    fn test_front_cover_preferred() {
        let visuals = [
            visual("image/jpeg", Some(StandardVisualKey::BackCover), b"back"),
            visual("image/png", Some(StandardVisualKey::FrontCover), b"front"),
        ];

        let cover = pick_front_cover(&visuals).unwrap();
        assert_eq!(cover.data, b"front".to_vec());
        assert_eq!(cover.file_name(), "album_art.png");
        assert_eq!(cover.attachment_url(), "attachment://album_art.png");
    }

    #[test]
    fn test_first_image_without_front_cover() {
        let visuals = [
            visual("image/jpeg", None, b"first"),
            visual("image/png", Some(StandardVisualKey::Media), b"second"),
        ];

        let cover = pick_front_cover(&visuals).unwrap();
        assert_eq!(cover.data, b"first".to_vec());
        assert_eq!(cover.file_name(), "album_art.jpg");
    }

    #[test]
    fn test_empty_images_are_skipped() {
        let visuals = [visual("image/png", Some(StandardVisualKey::FrontCover), b"")];
        assert!(pick_front_cover(&visuals).is_none());
        assert!(pick_front_cover(&Vec::<Visual>::new()).is_none());
    }

    #[tokio::test]
    async fn test_unreadable_file_has_no_cover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ruido.mp3");
        std::fs::write(&path, b"no es audio").unwrap();

        let track = TrackDescriptor::new(path, "Ruido", "Nadie", 0);
        assert!(load_cover(&track).await.is_none());
    }
}
