use crate::access::{FileSpec, RawAccess};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// On-disk trace document: the file population and the raw access records replayed
/// against it
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceDoc {
    pub files: Vec<FileSpec>,
    pub accesses: Vec<RawAccess>,
}

/// Memory map the file for speed on unix systems; traces easily reach hundreds of
/// megabytes and are read exactly once, front to back
#[cfg(unix)]
pub fn get_reader(file: File) -> Result<impl Read, String> {
    use memmap2::{Advice, Mmap};
    use std::io::Cursor;
    unsafe {
        let m = Mmap::map(&file).map_err(|e| format!("Couldn't memory map the file: {e}"))?;
        m.advise(Advice::Sequential)
            .map_err(|e| format!("Failed to provide access advice to the OS, {e}"))?;
        Ok(Cursor::new(m))
    }
}

// Compatibility on other systems
#[cfg(not(unix))]
pub fn get_reader(file: File) -> Result<impl Read, String> {
    use std::io::BufReader;
    const BUFFER_SIZE: usize = 1 << 20;
    Ok(BufReader::with_capacity(BUFFER_SIZE, file))
}

pub fn read_trace(path: &Path) -> Result<TraceDoc, String> {
    let file = File::open(path)
        .map_err(|e| format!("Couldn't open the trace file at path {}: {e}", path.display()))?;
    let reader = get_reader(file)?;
    serde_json::from_reader(reader).map_err(|e| format!("Couldn't parse the trace file: {e}"))
}
