use crate::api;
use crate::cli::actions::Action;
use crate::core::AuthCore;
use crate::policy::SettingsHandle;
use anyhow::Result;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            issuer,
            backup_pepper,
            settings,
        } => {
            // One handle backs both the core and the settings endpoints.
            let handle = SettingsHandle::new(settings.clone());
            let core = Arc::new(
                AuthCore::new(&issuer, settings)
                    .with_settings(handle.clone())
                    .with_backup_pepper(backup_pepper),
            );

            api::serve(port, core, handle).await?;
        }
    }

    Ok(())
}
