use crate::discord::{Data, Error};

/// Framework-wide error hook: log what we can explain, let poise answer the rest.
pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(command = %ctx.command().name, "Command failed: {error}");
            let _ = ctx
                .say("Something went wrong while running that command.")
                .await;
        }
        poise::FrameworkError::EventHandler { error, .. } => {
            tracing::error!("Error in event handler: {error}");
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {e}");
            }
        }
    }
}
