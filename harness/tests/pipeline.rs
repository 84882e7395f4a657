mod common;

use std::sync::Arc;

use abeval_harness::{
    AgentError, AgentPair, Category, ConfigLoader, ExecutionEngine, FileResultStore,
    PersistOptions, QuestionBank, ResultStore, RunCompletion, RunContext, SelectionPolicy,
    SuiteBuilder, Verdict, aggregate,
};
use common::{ScriptedAgent, Step};
use pretty_assertions::assert_eq;

const BANK: &str = r#"
questions:
  - id: fact-1
    text: What port does the service listen on?
    category: factual
  - id: proc-1
    text: How do I rotate the signing key?
    category: procedural
  - id: fact-2
    text: Which storage engine backs the index?
    category: factual
  - id: fact-3
    text: What is the default request timeout?
    category: Factual
  - id: oos-1
    text: What will the weather be tomorrow?
    category: out-of-scope
"#;

#[tokio::test]
async fn test_bank_to_persisted_summary() {
    let dir = tempfile::tempdir().unwrap();
    let bank_path = dir.path().join("bank.yaml");
    std::fs::write(&bank_path, BANK).unwrap();

    let root = dir.path().join("runs");
    let config_path = dir.path().join("abeval.toml");
    std::fs::write(
        &config_path,
        format!(
            "[execution]\nconcurrency_limit = 2\ntimeout_ms = 2000\n\n\
             [retry]\nmax_attempts = 2\ninitial_backoff_ms = 20\njitter_factor = 0.0\n\n\
             [storage]\nroot_dir = {:?}\n",
            root.display().to_string()
        ),
    )
    .unwrap();
    let config = ConfigLoader::new().with_file(&config_path).load().unwrap();
    assert_eq!(config.execution.concurrency_limit, 2);
    assert!(config.storage.journal);

    let bank = QuestionBank::load(&bank_path).unwrap();
    assert_eq!(bank.len(), 5);
    let suite = SuiteBuilder::new("factual-only")
        .build(
            &bank,
            SelectionPolicy::Category {
                category: Category::Factual,
            },
        )
        .unwrap();
    let ids: Vec<&str> = suite.questions().iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["fact-1", "fact-2", "fact-3"]);

    // The variant recovers from one dropped connection on the second question
    let flaky_text = suite.questions()[1].text.clone();
    let baseline = ScriptedAgent::new("baseline");
    let variant = ScriptedAgent::new("variant")
        .with_prompt_tokens(1_600)
        .with_context_tokens(1_500)
        .script(
            &flaky_text,
            vec![Step::Fail(AgentError::connection("connection reset"))],
        );
    let agents = AgentPair::new(Arc::new(baseline), Arc::new(variant));

    let ctx = RunContext::new("pipeline");
    let engine = ExecutionEngine::from_config(&config).unwrap();
    let run = engine.run_suite(&ctx, &suite, &agents).await.unwrap();
    assert_eq!(run.completion, RunCompletion::Complete);
    assert_eq!(run.results.len(), 3);
    assert!(run.results.iter().all(|r| r.both_ok()));
    assert_eq!(run.results[1].variant.attempts, 2);
    assert_eq!(run.suite.question_count, 3);

    let store = FileResultStore::new(&config.storage.root_dir);
    let journal = store.load_journal(run.run_id).unwrap();
    let journaled: Vec<_> = journal.into_iter().map(|e| e.result).collect();
    assert_eq!(journaled.len(), run.results.len());
    for result in &run.results {
        assert!(journaled.contains(result));
    }

    let options = PersistOptions {
        overwrite: false,
        export_csv: config.storage.export_csv,
    };
    store.persist(&ctx, &run, options).unwrap();
    let loaded = store.load(&ctx, run.run_id).unwrap();
    assert_eq!(loaded, run);
    assert_eq!(store.list_runs().unwrap(), vec![run.run_id]);

    let significance = config.statistics.significance();
    let before = aggregate(&ctx, &run, &significance);
    let after = aggregate(&ctx, &loaded, &significance);
    assert_eq!(before, after);

    // Constant 1500-token overhead: zero-variance differences
    let prompt = &after[1];
    assert_eq!(prompt.metric_name, "prompt_tokens");
    assert_eq!(prompt.mean_difference, Some(1_500.0));
    assert_eq!(prompt.verdict, Verdict::InsufficientData);
}
