//! Board identification
//!
//! The board is identified once at startup. An explicit `--board` wins,
//! then the `[board] kind` setting, then the EEPROM location string, and
//! finally the configured fallback.

use swfan_core::config::BoardConfig;
use swfan_core::BoardKind;
use tokio::fs;
use tracing::{info, warn};

/// Determine which board the daemon is running on
pub async fn resolve_board(cli: Option<BoardKind>, config: &BoardConfig) -> BoardKind {
    if let Some(kind) = cli {
        info!("Board type from command line: {}", kind);
        return kind;
    }

    if let Some(kind) = config.kind {
        info!("Board type from configuration: {}", kind);
        return kind;
    }

    if let Some(path) = &config.location_file {
        match fs::read_to_string(path).await {
            Ok(location) => {
                let location = location.trim();
                match BoardKind::from_location(location) {
                    Some(kind) => {
                        info!("Board type from EEPROM location '{}': {}", location, kind);
                        return kind;
                    }
                    None => warn!(
                        "Unrecognised board location '{}' in {}",
                        location,
                        path.display()
                    ),
                }
            }
            Err(e) => warn!(
                "Failed to read board location from {}: {}",
                path.display(),
                e
            ),
        }
    }

    warn!("Could not identify board, assuming {}", config.fallback);
    config.fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cli_wins() {
        let config = BoardConfig {
            kind: Some(BoardKind::Wedge),
            ..BoardConfig::default()
        };
        let kind = resolve_board(Some(BoardKind::Stinson), &config).await;
        assert_eq!(kind, BoardKind::Stinson);
    }

    #[tokio::test]
    async fn test_config_kind_before_location() {
        let temp_dir = TempDir::new().unwrap();
        let location = temp_dir.path().join("location");
        tokio::fs::write(&location, "Newport-EVT\n").await.unwrap();

        let config = BoardConfig {
            kind: Some(BoardKind::Wedge100),
            location_file: Some(location),
            ..BoardConfig::default()
        };
        assert_eq!(resolve_board(None, &config).await, BoardKind::Wedge100);
    }

    #[tokio::test]
    async fn test_location_file() {
        let temp_dir = TempDir::new().unwrap();
        let location = temp_dir.path().join("location");
        tokio::fs::write(&location, "Maverick\n").await.unwrap();

        let config = BoardConfig {
            location_file: Some(location),
            ..BoardConfig::default()
        };
        assert_eq!(resolve_board(None, &config).await, BoardKind::Mavericks);
    }

    #[tokio::test]
    async fn test_unknown_location_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let location = temp_dir.path().join("location");
        tokio::fs::write(&location, "Mystery box").await.unwrap();

        let config = BoardConfig {
            location_file: Some(location),
            fallback: BoardKind::Davenport,
            ..BoardConfig::default()
        };
        assert_eq!(resolve_board(None, &config).await, BoardKind::Davenport);
    }

    #[tokio::test]
    async fn test_unreadable_location_falls_back() {
        let config = BoardConfig {
            location_file: Some("/nonexistent/location".into()),
            ..BoardConfig::default()
        };
        assert_eq!(resolve_board(None, &config).await, BoardKind::Montara);
    }
}
