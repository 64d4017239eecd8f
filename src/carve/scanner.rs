//! Scanner step protocol shared by the four format state machines.
//!
//! A scanner is called repeatedly by the driver. Each call consumes one
//! structural unit (marker, chunk, subchunk, atom) and reports whether to
//! keep going. On a terminal step the scanner leaves the [`ByteSource`] at
//! the offset where the extent ends and scanning resumes.

use std::io::{Read, Seek};

use crate::error::{Rejection, SourceError};
use crate::source::ByteSource;

use super::signatures::MediaKind;

/// Outcome of one scanner call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// Unit consumed, call again
    Continue,
    /// Container ended. `partial` when it ended early (JPEG interrupted by
    /// the next SOI) and needs a synthetic trailer.
    Complete { partial: bool },
    /// Structural rule violated; the source has been rewound to the last
    /// good boundary
    Rejected { partial: bool, reason: Rejection },
}

/// One format's extent state machine
pub trait FormatScanner {
    const KIND: MediaKind;

    fn step<R: Read + Seek>(&mut self, src: &mut ByteSource<R>) -> Result<ScanStep, SourceError>;
}

/// How a scanner run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub partial: bool,
    pub reason: Option<Rejection>,
    /// Number of scanner calls, terminal one included
    pub steps: u64,
}

/// Call `scanner` until it reports a terminal step.
///
/// Every non-terminal step consumes at least one byte, and the source never
/// seeks past its end, so this always terminates.
pub fn run_to_end<S, R>(scanner: &mut S, src: &mut ByteSource<R>) -> Result<Termination, SourceError>
where
    S: FormatScanner,
    R: Read + Seek,
{
    let mut steps = 0u64;
    loop {
        let before = src.tell();
        let step = scanner.step(src)?;
        steps += 1;

        match step {
            ScanStep::Continue => {
                debug_assert!(
                    src.tell() > before,
                    "{} scanner made no progress at offset {before:#x}",
                    S::KIND
                );
            }
            ScanStep::Complete { partial } => {
                return Ok(Termination {
                    partial,
                    reason: None,
                    steps,
                });
            }
            ScanStep::Rejected { partial, reason } => {
                tracing::info!(
                    kind = %S::KIND,
                    offset = src.tell(),
                    partial,
                    %reason,
                    "Scanner stopped"
                );
                return Ok(Termination {
                    partial,
                    reason: Some(reason),
                    steps,
                });
            }
        }
    }
}
