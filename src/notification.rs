const APP_NAME: &str = "Nano Imager";

/// Desktop notification for errors the user must see even when the window
/// is in the background.
pub fn send_error(body: impl Into<String>) {
    let body = body.into();
    if let Err(err) = notify_rust::Notification::new()
        .appname(APP_NAME)
        .summary(&format!("{APP_NAME}: error"))
        .body(&body)
        .show()
    {
        tracing::warn!("system notification failed: {err}");
    }
}
