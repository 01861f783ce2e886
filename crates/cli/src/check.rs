use anyhow::Result;

use crate::client::ApiClient;

/// Print liveness and database readiness of the server.
pub async fn run_check(client: &ApiClient) -> Result<()> {
    match client.health().await {
        Ok(resp) => println!("Server: {}  URL: {}  ({})", resp.status, client.base_url(), resp.timestamp),
        Err(e) => {
            println!("Server: offline  URL: {}  Error: {}", client.base_url(), e);
            return Ok(());
        }
    }

    match client.ready().await {
        Ok(resp) => println!("Database: {} ({} ms)", resp.database, resp.duration_ms),
        Err(e) => println!("Database: not ready  Error: {}", e),
    }
    Ok(())
}
