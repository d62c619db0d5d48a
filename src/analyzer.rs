//! Pairing of WAV tracks with JPG covers by base name.
//!
//! Every file entry is classified by its lowercased extension, `wav` as audio
//! and `jpg`/`jpeg` as image; everything else is ignored outright (it is
//! neither counted nor reported as unmatched). Audio and image entries that
//! share a case-insensitive base name form a [`MatchedPair`]. Within one base
//! name only the first audio and the first image entry, in archive order,
//! pair up; any further same-kind entries are reported as unmatched.

use std::collections::{HashMap, HashSet};

use crate::zip::{Archive, ArchiveEntry};

/// Media category derived from an entry's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Image,
}

impl MediaKind {
    /// Classify a lowercased extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "wav" => Some(MediaKind::Audio),
            "jpg" | "jpeg" => Some(MediaKind::Image),
            _ => None,
        }
    }
}

/// Split an entry name into its lowercased base name and lowercased extension.
///
/// The extension is whatever follows the last `.` of the final path segment.
/// A final segment without a `.` has no extension and the base name is the
/// whole (lowercased) name.
pub fn split_name(name: &str) -> (String, Option<String>) {
    let segment_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[segment_start..].rfind('.') {
        Some(dot) => {
            let dot = segment_start + dot;
            (
                name[..dot].to_lowercase(),
                Some(name[dot + 1..].to_lowercase()),
            )
        }
        None => (name.to_lowercase(), None),
    }
}

/// Position and original name of an entry inside the source archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRef {
    /// Index in the archive's entry list, directories included
    pub index: usize,
    pub name: String,
}

/// An audio entry and an image entry sharing a base name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub base_name: String,
    pub audio: EntryRef,
    pub image: EntryRef,
}

/// Result of pairing one archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    /// Audio entries in archive order
    pub audio: Vec<EntryRef>,
    /// Image entries in archive order
    pub images: Vec<EntryRef>,
    pub pairs: Vec<MatchedPair>,
    /// Unpaired entries: audio first, then images, archive order within each
    pub unmatched: Vec<EntryRef>,
}

impl Analysis {
    pub fn audio_count(&self) -> usize {
        self.audio.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn unmatched_names(&self) -> impl Iterator<Item = &str> {
        self.unmatched.iter().map(|e| e.name.as_str())
    }
}

/// Pair the audio and image entries of `entries` in a single pass.
///
/// `entries` is walked once, in order; the position of each item becomes
/// its [`EntryRef::index`].
pub fn analyze<'a, I>(entries: I) -> Analysis
where
    I: IntoIterator<Item = &'a ArchiveEntry>,
{
    let mut audio: Vec<(EntryRef, String)> = Vec::new();
    let mut images: Vec<(EntryRef, String)> = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        if entry.is_directory {
            continue;
        }
        let (base_name, ext) = split_name(&entry.name);
        let Some(kind) = ext.as_deref().and_then(MediaKind::from_extension) else {
            tracing::debug!(name = %entry.name, "ignoring entry");
            continue;
        };
        let entry_ref = EntryRef {
            index,
            name: entry.name.clone(),
        };
        match kind {
            MediaKind::Audio => audio.push((entry_ref, base_name)),
            MediaKind::Image => images.push((entry_ref, base_name)),
        }
    }

    // First image per base name
    let mut first_image: HashMap<&str, usize> = HashMap::new();
    for (pos, (_, base)) in images.iter().enumerate() {
        first_image.entry(base.as_str()).or_insert(pos);
    }

    let mut pairs = Vec::new();
    let mut paired_bases: HashSet<&str> = HashSet::new();
    let mut audio_used = vec![false; audio.len()];
    let mut image_used = vec![false; images.len()];

    for (pos, (audio_ref, base)) in audio.iter().enumerate() {
        if paired_bases.contains(base.as_str()) {
            continue;
        }
        if let Some(&image_pos) = first_image.get(base.as_str()) {
            paired_bases.insert(base.as_str());
            audio_used[pos] = true;
            image_used[image_pos] = true;
            pairs.push(MatchedPair {
                base_name: base.clone(),
                audio: audio_ref.clone(),
                image: images[image_pos].0.clone(),
            });
        }
    }

    let unmatched: Vec<EntryRef> = audio
        .iter()
        .zip(&audio_used)
        .chain(images.iter().zip(&image_used))
        .filter(|(_, used)| !**used)
        .map(|((entry_ref, _), _)| entry_ref.clone())
        .collect();

    let analysis = Analysis {
        audio: audio.into_iter().map(|(e, _)| e).collect(),
        images: images.into_iter().map(|(e, _)| e).collect(),
        pairs,
        unmatched,
    };

    tracing::info!(
        audio = analysis.audio_count(),
        images = analysis.image_count(),
        pairs = analysis.pairs.len(),
        unmatched = analysis.unmatched.len(),
        "analyzed archive"
    );
    analysis
}

/// Convenience wrapper over [`analyze`] for a decoded archive.
pub fn analyze_archive(archive: &Archive) -> Analysis {
    analyze(archive.entries())
}
