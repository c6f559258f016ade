use super::{AdapterContext, AdapterTarget};
use bytes::Bytes;
use std::sync::Arc;
use unity_asset_export_core::{
    AsyncAssetCache, AudioTranscoder, ExportError, ExportItem, PreviewData, Result,
};

/// MIME type for an audio file extension
pub fn audio_mime(extension: &str) -> String {
    match extension {
        "mp3" => "audio/mpeg".to_string(),
        "m4a" => "audio/mp4".to_string(),
        other => format!("audio/{}", other),
    }
}

/// Audio clips: exported in their stored format, FSB banks as MP3
pub struct AudioAdapter {
    target: AdapterTarget,
}

impl AudioAdapter {
    pub fn new(target: AdapterTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &AdapterTarget {
        &self.target
    }

    /// Playable bytes and their format, transcoding FSB on a blocking thread
    async fn playable(&self, ctx: &AdapterContext) -> Result<Option<(Bytes, String)>> {
        let object = Arc::clone(&self.target.object);
        let transcoder = ctx.transcoder().cloned();
        let label = self.target.id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<(Bytes, String)>> {
            let Some(samples) = object.audio()? else {
                return Ok(None);
            };
            if !samples.is_fsb() {
                let format = samples.format.to_ascii_lowercase();
                return Ok(Some((samples.data, format)));
            }

            let transcoder: Arc<dyn AudioTranscoder> = transcoder.ok_or_else(|| {
                ExportError::Unsupported(format!("FSB audio in {} needs a transcoder", label))
            })?;
            let mp3 = transcoder.fsb_to_mp3(&samples)?;
            Ok(Some((mp3, "mp3".to_string())))
        })
        .await?
    }

    pub async fn preview_data(&self, ctx: &AdapterContext) -> Result<Option<PreviewData>> {
        let key = self.target.cache_key();
        if let Some(entry) = ctx.blobs().get(&key).await {
            return Ok(Some(PreviewData::Audio(entry.handle)));
        }

        let Some((data, format)) = self.playable(ctx).await? else {
            return Ok(None);
        };
        let entry = ctx.cache_blob(key, data, &audio_mime(&format), &format).await;
        Ok(Some(PreviewData::Audio(entry.handle)))
    }

    pub async fn export(&self, ctx: &AdapterContext) -> Result<Option<Vec<ExportItem>>> {
        let cached = ctx
            .blobs()
            .get(&self.target.cache_key())
            .await
            .map(|entry| (entry.data, entry.extension));
        let (data, format) = match cached {
            Some(found) => found,
            None => match self.playable(ctx).await? {
                Some(found) => found,
                None => return Ok(None),
            },
        };

        let name = format!("{}.{}", self.target.file_stem(), format);
        Ok(Some(vec![ExportItem::new(name, data)]))
    }
}
