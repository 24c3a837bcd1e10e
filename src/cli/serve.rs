use crate::{Res, config::Settings, info, server, success, warning};

/// Runs the web server. With `open`, the login page is opened in the
/// default browser once the socket is bound.
pub async fn serve(settings: Settings, open: bool) -> Res<()> {
    let listener = server::bind(&settings.server_addr).await?;
    let base = format!("http://{}", listener.local_addr()?);
    success!("moodmix listening on {}", base);

    if settings.planner.order.is_empty() {
        warning!("PLAN_PROVIDERS is empty, generation will fail");
    }

    if open {
        let login = format!("{base}/api/auth/login");
        info!("Opening {} in your browser", login);
        if let Err(e) = webbrowser::open(&login) {
            warning!("Could not open the browser: {}", e);
        }
    }

    server::serve(listener, &settings).await
}
