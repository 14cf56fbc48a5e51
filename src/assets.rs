use crate::error::ArenaError;
use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::fs;
use std::path::Path;

#[derive(RustEmbed)]
#[folder = "stages/"]
pub struct Stages;

pub fn get_stage_bytes(name: &str) -> Option<Cow<'static, [u8]>> {
    Stages::get(name).map(|f| f.data)
}

/// Returns the text of an embedded stage descriptor.
pub fn embedded_stage(name: &str) -> Result<String, ArenaError> {
    let bytes = get_stage_bytes(name).ok_or_else(|| ArenaError::MissingDescriptor(name.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads a stage descriptor from disk.
pub fn stage_from_file(path: &Path) -> Result<String, ArenaError> {
    if !path.exists() {
        return Err(ArenaError::MissingDescriptor(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    #[test]
    fn test_default_stage_is_embedded() {
        let text = embedded_stage(config::DEFAULT_STAGE).unwrap();
        assert_eq!(text.lines().count(), config::GRID_TILES);
    }

    #[test]
    fn test_unknown_stage_is_reported() {
        assert!(matches!(
            embedded_stage("stage99.txt"),
            Err(ArenaError::MissingDescriptor(_))
        ));
        assert!(matches!(
            stage_from_file(Path::new("/definitely/not/here.txt")),
            Err(ArenaError::MissingDescriptor(_))
        ));
    }
}
