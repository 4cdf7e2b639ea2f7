// Mapping cache persistence (CSV, one remembered mapping per line).

use std::path::Path;

use crosswalk_recon::cache::CacheEntry;

/// Load a mapping cache. A missing file is an empty cache.
pub fn load_mapping_cache(path: &Path) -> Result<Vec<CacheEntry>, String> {
    if !path.exists() {
        log::info!("mapping cache {} not found, starting empty", path.display());
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| format!("Failed to open mapping cache '{}': {}", path.display(), e))?;
    let mut entries = Vec::new();
    for (i, row) in reader.deserialize::<CacheEntry>().enumerate() {
        let entry = row.map_err(|e| format!("{}: line {}: {}", path.display(), i + 2, e))?;
        entries.push(entry);
    }
    log::info!("loaded {} cached mappings from {}", entries.len(), path.display());
    Ok(entries)
}

pub fn save_mapping_cache(path: &Path, entries: &[CacheEntry]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| format!("Failed to create mapping cache '{}': {}", path.display(), e))?;
    for entry in entries {
        writer.serialize(entry).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}
