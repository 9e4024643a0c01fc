//! Resource warm-up by probing media files with symphonia
//!
//! Warming opens the file, reads the container header and reports duration,
//! sample rate and channel count. Probing is blocking I/O and runs on the
//! tokio blocking pool.

use super::{DeviceError, ResourceLoader, WarmResource};
use async_trait::async_trait;
use onair_common::config::resolve_track_path;
use onair_common::Track;
use std::path::{Path, PathBuf};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Loader that resolves track paths under a root folder and probes them
#[derive(Debug, Clone)]
pub struct ProbeLoader {
    root_folder: PathBuf,
}

impl ProbeLoader {
    pub fn new(root_folder: impl Into<PathBuf>) -> Self {
        Self {
            root_folder: root_folder.into(),
        }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }
}

#[async_trait]
impl ResourceLoader for ProbeLoader {
    async fn warm(&self, track: &Track) -> Result<WarmResource, DeviceError> {
        let path = resolve_track_path(&self.root_folder, &track.path);
        let track_id = track.id.clone();

        tokio::task::spawn_blocking(move || probe_file(track_id, path))
            .await
            .map_err(|e| DeviceError::Resource(format!("probe task failed: {}", e)))?
    }
}

fn probe_file(track_id: String, path: PathBuf) -> Result<WarmResource, DeviceError> {
    let metadata = std::fs::metadata(&path)
        .map_err(|e| DeviceError::Resource(format!("cannot open {}: {}", path.display(), e)))?;

    if metadata.len() == 0 {
        return Err(DeviceError::Resource(format!(
            "{} is empty (zero-length file)",
            path.display()
        )));
    }

    let file = std::fs::File::open(&path)
        .map_err(|e| DeviceError::Resource(format!("cannot open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DeviceError::Resource(format!("failed to probe {}: {}", path.display(), e)))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DeviceError::Resource(format!("no audio track in {}", path.display())))?;

    let params = &track.codec_params;
    let sample_rate = params.sample_rate;
    let channels = params.channels.map(|c| c.count() as u16);
    let duration = match (params.n_frames, sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames as f64 / rate as f64),
        _ => None,
    };

    debug!(
        track_id = %track_id,
        path = %path.display(),
        ?duration,
        ?sample_rate,
        "Probed resource"
    );

    Ok(WarmResource {
        track_id,
        locator: path,
        duration,
        sample_rate,
        channels,
        byte_len: metadata.len(),
    })
}
