//! Best-effort text extraction from ESC/POS jobs
//!
//! Walks the job once, dropping formatting commands and keeping printable
//! ASCII and line feeds. Anything it does not understand is skipped rather
//! than rendered as garbage.

use tracing::instrument;

use crate::escpos::{
    CR, ESC, ESC_ALIGN, ESC_BOLD, ESC_PRINT_MODE, ESC_UNDERLINE, GS, GS_CUT, GS_RASTER, LF,
};

/// Bytes consumed by an ESC command, introducer included
///
/// ESC @ and unknown selectors take just the introducer and selector.
fn esc_len(selector: u8) -> usize {
    match selector {
        ESC_ALIGN | ESC_BOLD | ESC_UNDERLINE | ESC_PRINT_MODE => 3,
        _ => 2,
    }
}

/// Decode the readable text of a job, trimmed
#[instrument(skip_all, fields(job_len = job.len()))]
pub fn decode_text(job: &[u8]) -> String {
    let mut out = String::with_capacity(job.len());
    let mut i = 0;

    while i < job.len() {
        match job[i] {
            ESC => {
                let Some(&selector) = job.get(i + 1) else {
                    break;
                };
                i += esc_len(selector);
            }
            GS => {
                let Some(&selector) = job.get(i + 1) else {
                    break;
                };
                i += match selector {
                    // GS V m [n]
                    GS_CUT => 4,
                    // image data runs to the end of the job
                    GS_RASTER => job.len(),
                    _ => 2,
                };
            }
            LF => {
                out.push('\n');
                i += 1;
            }
            CR => i += 1,
            b @ 0x20..=0x7E => {
                out.push(char::from(b));
                i += 1;
            }
            _ => i += 1,
        }
    }

    out.trim().to_string()
}
