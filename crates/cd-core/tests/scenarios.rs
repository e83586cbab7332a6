//! Scenario-driven tests against the scripted backend

use cd_core::TestRuntime;
use cd_test_scenarios::Scenario;

async fn run(json: &str) -> anyhow::Result<TestRuntime> {
    let scenario = Scenario::from_str(json)?;
    let mut runtime = TestRuntime::new(&scenario);
    runtime.run(&scenario).await.map_err(anyhow::Error::msg)?;
    Ok(runtime)
}

#[tokio::test(start_paused = true)]
async fn test_start_then_confirm() -> anyhow::Result<()> {
    run(include_str!("scenarios/start_then_confirm.json")).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalid_inputs() -> anyhow::Result<()> {
    let runtime = run(include_str!("scenarios/invalid_inputs.json")).await?;
    assert_eq!(runtime.channel().sent().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_crew_error() -> anyhow::Result<()> {
    run(include_str!("scenarios/crew_error.json")).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_log_dedup() -> anyhow::Result<()> {
    run(include_str!("scenarios/log_dedup.json")).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_history_replay() -> anyhow::Result<()> {
    let runtime = run(include_str!("scenarios/history_replay.json")).await?;
    assert_eq!(runtime.client().history_fetches(), 1);
    assert_eq!(runtime.dashboard().model().seen_history_len(), 6);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_catalog_and_filter() -> anyhow::Result<()> {
    run(include_str!("scenarios/catalog_and_filter.json")).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_autosave_versions() -> anyhow::Result<()> {
    let runtime = run(include_str!("scenarios/autosave_versions.json")).await?;
    let saved = runtime.client().saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].1, "researcher:\n  role: Lead");
    assert_eq!(runtime.client().content_fetches(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_assertion_names_the_step() -> anyhow::Result<()> {
    let json = r#"{
        "name": "wrong_state",
        "crews": [{ "id": "j1" }],
        "steps": [
            { "type": "loadCatalog" },
            { "type": "assertRunState", "crewId": "j1", "state": "running" }
        ]
    }"#;

    let err = match run(json).await {
        Ok(_) => anyhow::bail!("scenario should fail"),
        Err(err) => err.to_string(),
    };
    assert!(err.contains("wrong_state: step 2 failed"), "{err}");
    assert!(err.contains("expected running, got idle"), "{err}");
    Ok(())
}
