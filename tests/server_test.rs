//! Integration tests for the investigation viewer HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use care_agent::core::{Investigation, Label, Situation};
    use care_agent::events::RawEvent;
    use care_agent::server::{run, ServerConfig};
    use care_agent::store::MemoryStore;
    use care_agent::transparency::create_shared_log;
    use std::time::Duration;
    use tempfile::TempDir;

    fn investigation(start: i64, estimate: Label) -> Investigation {
        Investigation::new(
            Situation {
                situation_description: format!("kitchen activity at {start}"),
                result: Label::Unknown,
                start_timestamp: start,
                end_timestamp: start + 600,
                details: vec![
                    RawEvent::new(start, "kitchen"),
                    RawEvent::new(start + 600, "hall"),
                ],
            },
            estimate,
        )
    }

    /// Memory with two investigations from yesterday.
    fn seeded_memory(dir: &TempDir) -> MemoryStore {
        let memory = MemoryStore::new(dir.path().join("memory.json"), 52);
        let yesterday = chrono::Utc::now().timestamp() - 86_400;
        memory.append(&investigation(yesterday, Label::Normal)).unwrap();
        memory
            .append(&investigation(yesterday + 7 * 3600, Label::Anomalous))
            .unwrap();
        memory
    }

    async fn start(memory: MemoryStore) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let config = ServerConfig::new(0, memory, create_shared_log());
        let started = run(config).await.expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        started
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, shutdown_tx) = start(MemoryStore::new(dir.path().join("memory.json"), 52)).await;

        let response = reqwest::Client::new()
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_list_investigations() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, shutdown_tx) = start(seeded_memory(&dir)).await;

        let body: serde_json::Value = reqwest::get(format!("http://{}/api/investigations", addr))
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        let list = body.as_array().expect("expected an array");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["estimate"], "normal");
        assert_eq!(list[1]["estimate"], "anomalous");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_correction_updates_only_target() {
        let dir = tempfile::tempdir().unwrap();
        let memory = seeded_memory(&dir);
        let before = memory.read_all().unwrap();
        let (addr, shutdown_tx) = start(memory.clone()).await;

        let response = reqwest::Client::new()
            .put(format!("http://{}/api/investigations/1", addr))
            .json(&serde_json::json!({ "estimate": "normal" }))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let after = memory.read_all().unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1].estimate, Label::Normal);
        assert_eq!(after[1].situation, before[1].situation);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_correction_out_of_range_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let memory = seeded_memory(&dir);
        let bytes_before = std::fs::read(dir.path().join("memory.json")).unwrap();
        let (addr, shutdown_tx) = start(memory).await;

        let response = reqwest::Client::new()
            .put(format!("http://{}/api/investigations/7", addr))
            .json(&serde_json::json!({ "estimate": "anomalous" }))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(std::fs::read(dir.path().join("memory.json")).unwrap(), bytes_before);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, shutdown_tx) = start(MemoryStore::new(dir.path().join("memory.json"), 52)).await;

        let body: serde_json::Value = reqwest::get(format!("http://{}/api/stats", addr))
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(body["runs_started"], 0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, shutdown_tx) = start(MemoryStore::new(dir.path().join("memory.json"), 52)).await;

        let response = reqwest::Client::new()
            .request(
                reqwest::Method::OPTIONS,
                format!("http://{}/api/investigations/0", addr),
            )
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "PUT")
            .send()
            .await
            .expect("Failed to send request");

        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
