//! Repackaging of matched pairs into the output archive.
//!
//! No audio is transcoded: each pair contributes one entry named after its
//! audio entry with the extension swapped to `mp3`, carrying the audio
//! entry's bytes unchanged. Cover images are not embedded.

use crate::analyzer::{Analysis, MatchedPair};
use crate::error::{Error, Result};
use crate::zip::{Archive, ArchiveWriter, CompressionMethod};

/// File name offered for the generated archive
pub const DEFAULT_OUTPUT_NAME: &str = "converted_mp3_with_covers.zip";

/// Name of the output entry for an audio entry: the original name, casing and
/// folders kept, with its extension replaced by `mp3`.
pub fn output_name(audio_name: &str) -> String {
    let segment_start = audio_name.rfind('/').map_or(0, |i| i + 1);
    let stem = match audio_name[segment_start..].rfind('.') {
        Some(dot) => &audio_name[..segment_start + dot],
        None => audio_name,
    };
    format!("{stem}.mp3")
}

/// Build the output archive for every pair of `analysis`.
pub fn build_output(
    archive: &Archive,
    analysis: &Analysis,
    method: CompressionMethod,
) -> Result<Vec<u8>> {
    build_output_with(archive, analysis, method, |_, _| {})
}

/// Like [`build_output`], calling `on_pair(done, pair)` after each entry is
/// written, `done` counting from 1.
pub fn build_output_with<F>(
    archive: &Archive,
    analysis: &Analysis,
    method: CompressionMethod,
    mut on_pair: F,
) -> Result<Vec<u8>>
where
    F: FnMut(usize, &MatchedPair),
{
    let mut writer = ArchiveWriter::new(method)?;

    for (done, pair) in analysis.pairs.iter().enumerate() {
        let audio = archive
            .get(pair.audio.index)
            .filter(|entry| entry.name == pair.audio.name && !entry.is_directory)
            .ok_or_else(|| {
                Error::output(format!(
                    "{} is not entry {} of the source archive",
                    pair.audio.name, pair.audio.index
                ))
            })?;

        writer.add_entry(&output_name(&audio.name), &audio.data)?;
        on_pair(done + 1, pair);
    }

    let bytes = writer.finish()?;
    tracing::info!(
        entries = analysis.pairs.len(),
        bytes = bytes.len(),
        "built output archive"
    );
    Ok(bytes)
}
