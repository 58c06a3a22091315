use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use crate::error::Result;

/// Reads whole CSV files as text.
///
/// Station exports are normally UTF-8, but older ones were saved as
/// Windows-1252 (the `°` in unit annotations gives them away), so invalid
/// UTF-8 is decoded as Windows-1252 instead of being rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSource {
    use_mmap: bool,
}

impl CsvSource {
    pub fn new() -> Self {
        Self { use_mmap: false }
    }

    pub fn with_mmap(use_mmap: bool) -> Self {
        Self { use_mmap }
    }

    pub fn read_text(&self, path: &Path) -> Result<String> {
        if self.use_mmap {
            self.read_text_mmap(path)
        } else {
            let bytes = std::fs::read(path)?;
            Ok(decode(&bytes))
        }
    }

    fn read_text_mmap(&self, path: &Path) -> Result<String> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(String::new());
        }
        // SAFETY: the mapping is read-only and dropped before returning;
        // station exports are not modified while a run is in progress.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(decode(&mmap))
    }
}

fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        Err(_) => {
            let (text, _had_errors) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}
