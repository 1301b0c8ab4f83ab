use aos_core::{AcceptanceCriterion, Inputs, Params, TaskSpec};
use aos_outbox::FileOutbox;
use aos_pipeline::rules::{CriticRules, ExecutorSkills, PlannerRules, ReviserRules};
use aos_pipeline::{run, PipelineConfig};
use aos_registry::{AgentRegistry, ImplNames};
use std::sync::Arc;

fn write_csv(dir: &std::path::Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("weekly.csv");
    std::fs::write(&path, content).unwrap();
    path
}

fn registry() -> AgentRegistry {
    let mut reg = AgentRegistry::new();
    reg.register_planner("rules", Arc::new(PlannerRules));
    reg.register_executor("skills", Arc::new(ExecutorSkills));
    reg.register_critic("rules", Arc::new(CriticRules));
    reg.register_reviser("rules", Arc::new(ReviserRules));
    reg
}

fn impls() -> ImplNames {
    ImplNames {
        planner: "rules".to_string(),
        executor: "skills".to_string(),
        critic: "rules".to_string(),
        reviser: "rules".to_string(),
    }
}

#[tokio::test]
async fn happy_path_weekly_report_passes_on_first_review() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = write_csv(&dir, "title,views\nAlpha,100\nBeta,50\nGamma,200\n");
    let out_path = dir.path().join("report.md");
    let episodes_dir = dir.path().join("episodes");

    let spec = TaskSpec {
        goal: "weekly-report".to_string(),
        inputs: Inputs {
            csv_path: csv_path.display().to_string(),
            extra: Default::default(),
        },
        budget_usd: 0.0,
        constraints: vec![],
        params: Params::default(),
        acceptance: vec![AcceptanceCriterion {
            id: "a1".to_string(),
            given: None,
            when: None,
            then: "report has a top items table".to_string(),
        }],
        risks: None,
    };

    let outbox = FileOutbox::new(&episodes_dir);
    let reg = registry();
    let outcome = run(&outbox, &reg, &spec, &out_path, &impls(), &PipelineConfig::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, "success");
    assert!(outcome.reasons.is_empty());
    let written = std::fs::read_to_string(&out_path).unwrap();
    assert!(written.contains("# Weekly Report"));
    assert!(written.contains("Gamma"));

    let episode_path = episodes_dir.join(format!("{}.json", outcome.trace_id));
    assert!(episode_path.exists());
}

#[tokio::test]
async fn forced_revision_path_recovers_a_report_missing_required_sections() {
    use aos_core::ReviewVerdict;
    use aos_registry::{Critic, Executor, ExecOutcome, Planner, PlanOutcome, ReviewOutcome, RunContext};
    use async_trait::async_trait;

    struct BrokenExecutorOnce;
    #[async_trait]
    impl Executor for BrokenExecutorOnce {
        fn name(&self) -> &str {
            "broken-once"
        }
        async fn execute(
            &self,
            _spec: &TaskSpec,
            _plan: &aos_core::Plan,
            _ctx: &RunContext,
        ) -> aos_error::AosResult<ExecOutcome> {
            Ok(ExecOutcome {
                markdown: "no sections here at all".to_string(),
                artifacts: serde_json::json!({}),
                metrics: serde_json::json!({}),
                llm: None,
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let csv_path = write_csv(&dir, "title,views\nAlpha,100\n");
    let out_path = dir.path().join("report.md");
    let episodes_dir = dir.path().join("episodes");

    let spec = TaskSpec {
        goal: "weekly-report".to_string(),
        inputs: Inputs {
            csv_path: csv_path.display().to_string(),
            extra: Default::default(),
        },
        budget_usd: 0.0,
        constraints: vec![],
        params: Params::default(),
        acceptance: vec![],
        risks: None,
    };

    let mut reg = registry();
    reg.register_executor("broken-once", Arc::new(BrokenExecutorOnce));
    let mut names = impls();
    names.executor = "broken-once".to_string();

    let outbox = FileOutbox::new(&episodes_dir);
    let outcome = run(&outbox, &reg, &spec, &out_path, &names, &PipelineConfig::default())
        .await
        .unwrap();

    // The reviser patches in the missing sections, so the second review passes.
    assert_eq!(outcome.status, "success");

    // Sanity check the trait imports above compile against real usage.
    let _ = ReviewVerdict {
        score: 1.0,
        pass: true,
        reasons: vec![],
    };
    let _: &dyn Planner = &PlannerRules;
    let _: &dyn Critic = &CriticRules;
}

#[tokio::test]
async fn guardian_timeout_aborts_the_run_before_planning() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = write_csv(&dir, "title,views\nAlpha,100\n");
    let out_path = dir.path().join("report.md");
    let episodes_dir = dir.path().join("episodes");

    let spec = TaskSpec {
        goal: "weekly-report".to_string(),
        inputs: Inputs {
            csv_path: csv_path.display().to_string(),
            extra: Default::default(),
        },
        budget_usd: 0.0,
        constraints: vec![],
        params: Params::default(),
        acceptance: vec![],
        risks: None,
    };

    let outbox = FileOutbox::new(&episodes_dir);
    let reg = registry();
    let cfg = PipelineConfig {
        timeout_ms: 0,
        ..PipelineConfig::default()
    };
    let err = run(&outbox, &reg, &spec, &out_path, &impls(), &cfg).await.unwrap_err();
    assert_eq!(err.code, aos_error::ErrorCode::Budget);

    // The episode must still be finalized as failed rather than left
    // dangling mid-trace (§4.1, §8 scenario 3).
    let trace_ids = outbox.list_trace_ids_with_prefix("").unwrap();
    assert_eq!(trace_ids.len(), 1);
    let episode = outbox.load_episode(&trace_ids[0]).await.unwrap().expect("episode was recorded");
    assert_eq!(episode.status, aos_core::Status::Failed);
    assert_eq!(episode.events.len(), 1);
    assert_eq!(episode.events[0].event_type, "sense.srs_loaded");
}
