//! Per-installation identity.

use std::io;
use std::path::Path;

use tracing::{info, warn};

use duka_core::ClientId;

const IDENTITY_FILE: &str = "client_id";

/// Load this installation's client id from the `client_id` file under
/// `dir`, minting and persisting one on first run.
///
/// The file lives next to the database, not in it: wiping the database
/// resets the data while the device keeps the identity its queued
/// mutations are traced by.
pub async fn load_or_create(dir: &Path) -> io::Result<ClientId> {
    let path = dir.join(IDENTITY_FILE);

    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => {
            if let Ok(id) = raw.trim().parse::<ClientId>() {
                return Ok(id);
            }
            warn!(path = %path.display(), "client id file is unreadable; minting a new identity");
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    let id = ClientId::new();
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, id.to_string()).await?;
    info!(client = %id, "minted a new client identity");
    Ok(id)
}
