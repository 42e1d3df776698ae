//! End-to-end tests of the analysis dispatch

mod common;

use dbscope_analysis::{
    AnalysisDepth, AnalysisOperation, AnalyzeDatabaseRequest, ContentAnalyzer, DatabaseAnalyzer,
    HealthStatus,
};
use dbscope_core::DbscopeConfig;
use serde_json::{Value, json};
use sqlx::Connection;

async fn run(request: AnalyzeDatabaseRequest) -> Value {
    DatabaseAnalyzer::default().analyze(&request).await.to_json()
}

#[tokio::test]
async fn test_analyze_clean_bookshop() -> anyhow::Result<()> {
    let fixture = common::bookshop().await?;
    let value = run(AnalyzeDatabaseRequest::new(fixture.path_string())).await;

    assert_eq!(value["success"], true);
    assert_eq!(value["operation"], "analyze");
    assert_eq!(value["database_type"], "sqlite");
    assert_eq!(value["structure"]["summary"]["table_count"], 2);
    assert_eq!(value["health"]["overall_score"], 100.0);
    assert_eq!(value["health"]["health_status"], "excellent");
    assert_eq!(value["health"]["total_issues"], 0);

    // books is created first, so it is sampled
    assert_eq!(value["sample_data"]["table_name"], "books");
    assert_eq!(value["sample_data"]["sample_rows"].as_array().map(Vec::len), Some(2));
    assert_eq!(value["sample_data"]["sample_rows"][0]["title"], "Kindred");

    assert_eq!(value["errors"]["corruption"]["corruption_detected"], false);
    assert_eq!(value["errors"]["logical_errors"], json!([]));
    assert_eq!(value["suggested_fixes"], json!([]));
    Ok(())
}

#[tokio::test]
async fn test_truncated_file_is_reported_not_raised() -> anyhow::Result<()> {
    let fixture = common::bookshop().await?;
    fixture.truncate_to(4096 + 2048)?;

    let errors = run(AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation("errors")).await;
    assert_eq!(errors["success"], true);
    assert_eq!(errors["corruption"]["corruption_detected"], true);
    assert_eq!(errors["corruption"]["severity"], "critical");
    assert_eq!(errors["integrity"]["check_failed"], true);
    assert_eq!(errors["suggested_fixes"][0]["issue"], "corruption");

    let health = run(AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation("health")).await;
    assert_eq!(health["success"], true);
    let status: HealthStatus = serde_json::from_value(health["health"]["health_status"].clone())?;
    assert!(status <= HealthStatus::Poor, "status was {}", status);
    Ok(())
}

#[tokio::test]
async fn test_operations_never_modify_the_file() -> anyhow::Result<()> {
    let fixture = common::bookshop_with_orphans(2).await?;
    let before = fixture.bytes()?;

    for operation in AnalysisOperation::ALL {
        let value = run(AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation(operation.as_str())).await;
        assert_eq!(value["success"], true, "{} failed: {}", operation, value);
    }

    assert_eq!(fixture.bytes()?, before);
    Ok(())
}

#[tokio::test]
async fn test_repeated_calls_agree() -> anyhow::Result<()> {
    let fixture = common::ledger(300).await?;
    let request = AnalyzeDatabaseRequest::new(fixture.path_string()).with_limit(25);

    let first = run(request.clone()).await;
    let second = run(request.clone()).await;
    assert_eq!(first, second);

    let content = request.with_operation("content");
    assert_eq!(run(content.clone()).await, run(content).await);
    Ok(())
}

#[tokio::test]
async fn test_scores_are_bounded_means() -> anyhow::Result<()> {
    for orphans in [0, 1, 4] {
        let fixture = common::bookshop_with_orphans(orphans).await?;
        let value = run(AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation("health")).await;
        let health = &value["health"];

        let subs: Vec<f64> = ["integrity_score", "corruption_score", "logical_score", "performance_score"]
            .iter()
            .map(|key| health[*key].as_f64().unwrap())
            .collect();
        for sub in &subs {
            assert!((0.0..=100.0).contains(sub));
        }

        let mean = subs.iter().sum::<f64>() / 4.0;
        let overall = health["overall_score"].as_f64().unwrap();
        assert!((overall - (mean * 100.0).round() / 100.0).abs() < 1e-9);
    }
    Ok(())
}

#[tokio::test]
async fn test_orphans_never_raise_logical_score() -> anyhow::Result<()> {
    let mut previous = f64::INFINITY;
    for orphans in [0, 1, 5, 25] {
        let fixture = common::bookshop_with_orphans(orphans).await?;
        let value = run(AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation("health")).await;
        let logical = value["health"]["logical_score"].as_f64().unwrap();

        if orphans == 0 {
            assert_eq!(logical, 100.0);
        } else {
            assert!(logical < 100.0);
        }
        assert!(logical <= previous);
        previous = logical;
    }
    Ok(())
}

#[tokio::test]
async fn test_sample_bounds() -> anyhow::Result<()> {
    let fixture = common::ledger(1000).await?;
    let content = ContentAnalyzer::default();

    let sample = content.sample_content(fixture.path(), "entries", 5).await?;
    assert_eq!(sample.sample_rows.len(), 5);
    assert_eq!(sample.row_count, 1000);

    for limit in [0, -1] {
        let sample = content.sample_content(fixture.path(), "entries", limit).await?;
        assert!(sample.sample_rows.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_content_with_unknown_table() -> anyhow::Result<()> {
    let fixture = common::bookshop().await?;
    let value = run(
        AnalyzeDatabaseRequest::new(fixture.path_string())
            .with_operation("content")
            .with_table("publishers"),
    )
    .await;

    assert_eq!(value["success"], true);
    assert_eq!(value["content"]["samples"]["table_name"], "publishers");
    assert_eq!(value["content"]["samples"]["sample_rows"], json!([]));
    assert!(value["warning"].as_str().unwrap().contains("publishers"));
    Ok(())
}

#[tokio::test]
async fn test_content_infers_url_pattern() -> anyhow::Result<()> {
    let fixture = common::bookshop().await?;
    let value = run(
        AnalyzeDatabaseRequest::new(fixture.path_string())
            .with_operation("content")
            .with_table("authors"),
    )
    .await;

    assert_eq!(value["content"]["patterns"]["homepage"]["detected_patterns"], json!(["url"]));
    assert_eq!(value["content"]["distributions"]["homepage"]["null_count"], 1);
    Ok(())
}

#[tokio::test]
async fn test_unknown_operation_and_missing_file() -> anyhow::Result<()> {
    let fixture = common::bookshop().await?;

    let value = run(AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation("compact")).await;
    assert_eq!(value, json!({"success": false, "error": "Unknown operation: compact"}));

    let missing = fixture.dir().join("nowhere.db").display().to_string();
    let value = run(AnalyzeDatabaseRequest::new(missing).with_operation("structure")).await;
    assert_eq!(value["success"], false);
    assert!(value["error"].as_str().unwrap().starts_with("Database file not found"));
    Ok(())
}

#[tokio::test]
async fn test_quick_depth_report() -> anyhow::Result<()> {
    let fixture = common::bookshop().await?;
    let value = run(
        AnalyzeDatabaseRequest::new(fixture.path_string())
            .with_operation("report")
            .with_depth(AnalysisDepth::Quick),
    )
    .await;

    let report = value["report"].as_str().unwrap();
    assert!(report.contains("bookshop.db"));
    assert!(report.contains("#### books"));
    assert!(report.contains("## Content Sample"));
    Ok(())
}

#[tokio::test]
async fn test_locked_file_fails_instead_of_reporting_corruption() -> anyhow::Result<()> {
    let fixture = common::bookshop().await?;
    let mut config = DbscopeConfig::default();
    config.analysis.busy_timeout_ms = 100;
    let analyzer = DatabaseAnalyzer::from_config(config);

    let mut writer = fixture.writer().await?;
    sqlx::query("BEGIN EXCLUSIVE").execute(&mut writer).await?;
    sqlx::query("INSERT INTO authors (name) VALUES ('Ursula K. Le Guin')")
        .execute(&mut writer)
        .await?;

    for operation in AnalysisOperation::ALL {
        let request = AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation(operation.as_str());
        let value = analyzer.analyze(&request).await.to_json();
        tracing::info!(%operation, result = %value, "Analysis under exclusive lock");

        assert_eq!(value["success"], false, "{} succeeded: {}", operation, value);
        let error = value["error"].as_str().unwrap_or_default();
        assert!(error.contains("locked"), "{}: {}", operation, error);
        assert!(value.get("corruption").is_none());
    }

    sqlx::query("ROLLBACK").execute(&mut writer).await?;
    writer.close().await?;

    let request = AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation("errors");
    let value = analyzer.analyze(&request).await.to_json();
    assert_eq!(value["success"], true);
    assert_eq!(value["corruption"]["corruption_detected"], false);
    assert_eq!(value["suggested_fixes"], json!([]));

    let value = analyzer.analyze(&request.with_operation("health")).await.to_json();
    assert_eq!(value["health"]["health_status"], "excellent");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_readers_agree() -> anyhow::Result<()> {
    let fixture = common::bookshop_with_orphans(3).await?;
    let before = fixture.bytes()?;

    // A reader mid-transaction holds a shared lock, which analysis can share
    let mut reader = fixture.writer().await?;
    sqlx::query("BEGIN").execute(&mut reader).await?;
    let books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(&mut reader)
        .await?;
    assert_eq!(books, 5);

    let analyzer = DatabaseAnalyzer::default();
    let request = AnalyzeDatabaseRequest::new(fixture.path_string());
    let (first, second) = tokio::join!(analyzer.analyze(&request), analyzer.analyze(&request));
    let (first, second) = (first.to_json(), second.to_json());

    assert_eq!(first["success"], true, "{}", first);
    assert_eq!(first, second);
    assert_eq!(first["errors"]["logical_errors"][0]["count"], 3);

    sqlx::query("COMMIT").execute(&mut reader).await?;
    reader.close().await?;
    assert_eq!(fixture.bytes()?, before);
    Ok(())
}

#[tokio::test]
async fn test_wal_mode_file_is_read_in_place() -> anyhow::Result<()> {
    let fixture = common::bookshop().await?;
    fixture.execute(&["PRAGMA journal_mode = WAL"]).await?;
    let before = fixture.bytes()?;
    assert_eq!(before[18], 2, "header should record WAL mode");

    let value = run(AnalyzeDatabaseRequest::new(fixture.path_string()).with_operation("errors")).await;
    assert_eq!(value["success"], true, "{}", value);
    assert_eq!(value["corruption"]["corruption_detected"], false);

    // The engine may leave -wal and -shm sidecars; the database file itself is untouched
    assert_eq!(fixture.bytes()?, before);
    Ok(())
}
