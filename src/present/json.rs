//! Machine-readable output

use std::io::Write;

use crate::Result;
use crate::snapshot::Snapshot;

use super::Presenter;

/// Pretty-printed JSON of the whole snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPresenter;

impl Presenter for JsonPresenter {
    fn present(&self, snapshot: &Snapshot, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, snapshot)?;
        writeln!(out)?;
        Ok(())
    }
}
