use anyhow::Result;
use std::{fs::File, path::Path};
use symphonia::core::{
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::{MetadataOptions, MetadataRevision, StandardTagKey},
    probe::Hint,
};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::TrackDescriptor;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a"];
const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Recorre `dir` de forma recursiva y produce un descriptor por archivo de audio.
///
/// Un archivo con etiquetas ilegibles no se descarta: se indexa con el nombre
/// del archivo como título y duración 0.
pub fn scan(dir: &Path) -> Result<Vec<TrackDescriptor>> {
    if !dir.exists() {
        warn!("📁 El directorio de canciones no existe: {}", dir.display());
        return Ok(Vec::new());
    }

    let mut tracks = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("No se pudo leer una entrada de la biblioteca: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }

        tracks.push(describe(entry.path()));
    }

    Ok(tracks)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn describe(path: &Path) -> TrackDescriptor {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match read_tags(path) {
        Ok(tags) => TrackDescriptor::new(
            path,
            tags.title.as_deref().unwrap_or(&stem),
            tags.artist.as_deref().unwrap_or(UNKNOWN_ARTIST),
            tags.duration_secs,
        ),
        Err(e) => {
            warn!("No se pudieron leer metadatos de {}: {}", path.display(), e);
            TrackDescriptor::new(path, &stem, UNKNOWN_ARTIST, 0)
        }
    }
}

#[derive(Debug, Default)]
struct Tags {
    title: Option<String>,
    artist: Option<String>,
    duration_secs: u64,
}

fn read_tags(path: &Path) -> Result<Tags> {
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

    let mut tags = Tags::default();

    // ID3v2 y similares aparecen antes del contenedor
    if let Some(metadata) = probed.metadata.get() {
        if let Some(revision) = metadata.current() {
            absorb_revision(revision, &mut tags);
        }
    }

    {
        let container_metadata = probed.format.metadata();
        if let Some(revision) = container_metadata.current() {
            absorb_revision(revision, &mut tags);
        }
    }

    if let Some(track) = probed.format.default_track() {
        let params = &track.codec_params;
        if let (Some(time_base), Some(frames)) = (params.time_base, params.n_frames) {
            tags.duration_secs = time_base.calc_time(frames).seconds;
        }
    }

    debug!("🏷️ {:?} <- {}", tags, path.display());
    Ok(tags)
}

fn absorb_revision(revision: &MetadataRevision, tags: &mut Tags) {
    for tag in revision.tags() {
        let value = tag.value.to_string();
        if value.trim().is_empty() {
            continue;
        }
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) if tags.title.is_none() => tags.title = Some(value),
            Some(StandardTagKey::Artist) if tags.artist.is_none() => tags.artist = Some(value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_extension_detection() {
        assert!(is_audio_file(Path::new("/songs/a.mp3")));
        assert!(is_audio_file(Path::new("/songs/B.FLAC")));
        assert!(!is_audio_file(Path::new("/songs/cover.jpg")));
        assert!(!is_audio_file(Path::new("/songs/README")));
    }

    #[test]
    fn test_unreadable_file_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Mi Canción.mp3");
        std::fs::write(&path, b"esto no es audio").unwrap();

        let tracks = scan(dir.path()).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Mi Canción");
        assert_eq!(tracks[0].artist, UNKNOWN_ARTIST);
        assert_eq!(tracks[0].duration_secs, 0);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let tracks = scan(Path::new("/definitivamente/no/existe")).unwrap();
        assert!(tracks.is_empty());
    }
}
