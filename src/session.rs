//! Upload → analyze → convert workflow.
//!
//! A [`Session`] moves through `Idle → Analyzing → Ready → Converting → Done`.
//! Any failure drops everything the session held and returns it to `Idle`;
//! [`Session::reset`] does the same on request. Progress is reported from
//! completed work only.

use std::fmt;
use std::sync::Arc;

use crate::analyzer::{self, Analysis};
use crate::convert;
use crate::error::{Error, Result};
use crate::io::ReadAt;
use crate::zip::{Archive, ArchiveReader, CompressionMethod};

/// Workflow stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Analyzing,
    Ready,
    Converting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "idle",
            Stage::Analyzing => "analyzing",
            Stage::Ready => "ready",
            Stage::Converting => "converting",
            Stage::Done => "done",
        })
    }
}

/// Conversion progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// `done` of `total` pairs have been written; `name` is the latest output entry
    Entry {
        done: usize,
        total: usize,
        name: String,
    },
    /// The output archive is complete
    Packaged { entries: usize, bytes: usize },
}

impl Progress {
    pub fn percent(&self) -> u8 {
        match self {
            Progress::Entry { done, total, .. } if *total > 0 => {
                (done * 100 / total).min(100) as u8
            }
            _ => 100,
        }
    }
}

/// One analyze/convert workflow over a single archive
pub struct Session {
    stage: Stage,
    method: CompressionMethod,
    archive: Option<Archive>,
    analysis: Option<Analysis>,
    output: Option<Vec<u8>>,
}

impl Session {
    /// Create an idle session whose output entries use `method`.
    pub fn new(method: CompressionMethod) -> Self {
        Self {
            stage: Stage::Idle,
            method,
            archive: None,
            analysis: None,
            output: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    pub fn output(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    /// Hand the finished output archive to the caller, leaving the session `Done`.
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.output.take()
    }

    /// Drop all state and return to `Idle`.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.archive = None;
        self.analysis = None;
        self.output = None;
    }

    /// Decode the archive behind `reader` and pair its entries.
    ///
    /// Allowed from any stage except `Analyzing` and `Converting`; a previous
    /// result is discarded first.
    pub async fn analyze<R: ReadAt>(&mut self, reader: Arc<R>) -> Result<&Analysis> {
        self.ensure_not_busy("analyze")?;
        self.reset();
        self.stage = Stage::Analyzing;
        tracing::info!("analyzing archive ({} bytes)", reader.size());

        match ArchiveReader::new(reader).load().await {
            Ok(archive) => {
                let analysis = analyzer::analyze_archive(&archive);
                self.archive = Some(archive);
                self.stage = Stage::Ready;
                Ok(self.analysis.insert(analysis))
            }
            Err(e) => {
                tracing::warn!("analysis failed: {e}");
                self.reset();
                Err(e)
            }
        }
    }

    /// Repackage the matched pairs of the analyzed archive.
    ///
    /// Requires `Ready`. `on_progress` receives one event per written pair
    /// followed by a final [`Progress::Packaged`].
    pub fn convert<F>(&mut self, mut on_progress: F) -> Result<&[u8]>
    where
        F: FnMut(Progress),
    {
        if self.stage != Stage::Ready {
            return Err(Error::InvalidTransition {
                action: "convert",
                stage: self.stage,
            });
        }
        let (Some(archive), Some(analysis)) = (self.archive.as_ref(), self.analysis.as_ref())
        else {
            self.reset();
            return Err(Error::output("no analyzed archive to convert"));
        };

        self.stage = Stage::Converting;
        let total = analysis.pairs.len();
        tracing::info!(pairs = total, "converting");

        let result = convert::build_output_with(archive, analysis, self.method, |done, pair| {
            on_progress(Progress::Entry {
                done,
                total,
                name: convert::output_name(&pair.audio.name),
            })
        });

        match result {
            Ok(bytes) => {
                on_progress(Progress::Packaged {
                    entries: total,
                    bytes: bytes.len(),
                });
                // Source bytes are no longer needed once the output exists
                self.archive = None;
                self.stage = Stage::Done;
                Ok(self.output.insert(bytes).as_slice())
            }
            Err(e) => {
                tracing::warn!("conversion failed: {e}");
                self.reset();
                Err(e)
            }
        }
    }

    fn ensure_not_busy(&self, action: &'static str) -> Result<()> {
        match self.stage {
            Stage::Analyzing | Stage::Converting => Err(Error::InvalidTransition {
                action,
                stage: self.stage,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(CompressionMethod::Stored)
    }
}
