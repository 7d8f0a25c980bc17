use std::path::Path;

use crate::commands::common::load_settings;
use crate::error::CliError;

/// Print the webhook configuration an operator must apply on each endpoint.
pub fn run_setup_webhook(config_path: Option<&Path>) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let base = format!("http://{}", settings.webhook_bind_addr());

    println!("Webhook setup instructions\n");
    println!("1. Start the intake server and worker:");
    println!("   tandem webhook\n");

    for (label, endpoint, path) in [
        ("cloud", &settings.cloud.url, "/webhook/cloud"),
        ("local", &settings.local.url, "/webhook/local"),
    ] {
        println!("2. Configure a webhook on the {label} endpoint ({endpoint}):");
        println!("   - Request URL: {base}{path}");
        println!("   - Signature header: {}", settings.webhook.signature_header);
        println!("   - Secret: the configured webhook secret (HMAC-SHA256 over the raw body)");
        println!("   - Fire on: after insert, after save, after delete");
        println!("   - Repeat for every doctype you sync\n");
    }

    if settings.webhook.secret.is_empty() {
        println!("WARNING: no webhook secret configured; signature checking is disabled.");
    }
    println!("Note: if this machine is behind NAT, expose the intake port with a tunnel.");

    Ok(())
}
