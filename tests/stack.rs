use async_trait::async_trait;
use futures::StreamExt;
use loomstack::agent::{Agent, Handler, Transition};
use loomstack::llm::decorators::{
    FallbackChain, JsonModelLogger, Logging, RoleRemapper, TwoStageReason,
};
use loomstack::llm::{
    CallContext, DynModel, InMemoryCache, Message, Model, ModelFactory, RetryConfig,
    RoleRemapConfig, Role, StackConfig, UsageCounter,
};
use loomstack::pipeline::{
    EncodeError, Encoder, ErrStringFeedback, FeedbackConfig, FeedbackPipeline, FixedEncoder,
    JsonParser, OneShotPipeline, Pipeline,
};
use loomstack::testing::{CountingModel, ScriptedModel};
use serde::Deserialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, PartialEq, Deserialize)]
struct Sum {
    total: i64,
}

#[tokio::test]
async fn test_cached_retrying_stack_serves_repeats_for_free() {
    init_tracing();
    let base = Arc::new(
        ScriptedModel::new()
            .failing_first(1)
            .on("What is 2+2?", "{\"total\": 4}"),
    );
    let counter = Arc::new(UsageCounter::new());
    let config = StackConfig {
        retry: Some(RetryConfig::immediate(2)),
        ..StackConfig::default()
    };
    let model = ModelFactory::new(config)
        .with_cache(Arc::new(InMemoryCache::new()))
        .with_usage_counter(counter.clone())
        .build(base.clone())
        .unwrap();
    let pipeline = FeedbackPipeline::new(
        FixedEncoder::new("Answer in JSON"),
        JsonParser::<Sum>::new(),
        ErrStringFeedback,
        model,
        FeedbackConfig::default(),
    );
    let ctx = CallContext::background();
    let question = "What is 2+2?".to_string();

    let (sum, usage) = pipeline.call(&ctx, &question).await.unwrap();
    assert_eq!(sum, Sum { total: 4 });
    assert_eq!(usage.failed_calls, 1);
    assert_eq!(usage.successful_calls, 1);

    let (again, repeat_usage) = pipeline.call(&ctx, &question).await.unwrap();
    assert_eq!(again, sum);
    assert!(repeat_usage.is_zero());
    assert_eq!(base.calls(), 2);
    assert_eq!(counter.get(), usage);
}

#[tokio::test]
async fn test_reasoning_reaches_answerer_as_remapped_message() {
    init_tracing();
    let reasoner = Arc::new(
        ScriptedModel::new()
            .on("Add 2 and 2", "two plus two is four")
            .on("Add 2 and 2", "two plus two is four"),
    );
    let answerer = Arc::new(
        ScriptedModel::new()
            .on("Reasoning: two plus two is four", "{\"total\": 4}")
            .on("Reasoning: two plus two is four", "{\"total\": 4}"),
    );
    let remapped = RoleRemapper::with_config(
        answerer.clone(),
        RoleRemapConfig {
            target_role: Role::User,
            prefix: "Reasoning: ".to_string(),
        },
    );
    let model: DynModel = Arc::new(TwoStageReason::new(reasoner.clone(), remapped));

    let direct = model
        .respond(
            &CallContext::background(),
            &[Message::system("Answer in JSON"), Message::user("Add 2 and 2")],
        )
        .await
        .unwrap();
    assert_eq!(direct.auxiliary_messages, vec![Message::reasoning("two plus two is four")]);
    assert_eq!(direct.usage.successful_calls, 2);

    let pipeline = OneShotPipeline::new(
        FixedEncoder::new("Answer in JSON"),
        JsonParser::<Sum>::new(),
        model,
    );
    let (sum, usage) = pipeline
        .call(&CallContext::background(), &"Add 2 and 2".to_string())
        .await
        .unwrap();

    assert_eq!(sum.total, 4);
    assert_eq!(usage.successful_calls, 2);
    let seen = &answerer.conversations()[1];
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2].role, Role::User);
    assert_eq!(reasoner.conversations()[1][0].role, Role::System);
}

#[tokio::test]
async fn test_logged_fallback_chain_records_each_call() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calls.jsonl");
    let logger = Arc::new(JsonModelLogger::new(tokio::fs::File::create(&path).await.unwrap()));

    let candidates: Vec<DynModel> = vec![
        Arc::new(CountingModel::new().always_fail()),
        Arc::new(ScriptedModel::new().on("hello", "hi there")),
    ];
    let chain = FallbackChain::new(candidates).unwrap();
    let model = Logging::new(chain, logger);

    let response = model
        .respond(&CallContext::background(), &[Message::user("hello")])
        .await
        .unwrap();
    assert_eq!(response.primary_message.content, "hi there");
    assert_eq!(response.usage.failed_calls, 1);
    assert_eq!(response.usage.successful_calls, 1);

    let written = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["final_response"]["content"], "hi there");
    assert_eq!(record["messages"][0]["role"], "user");
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Add {
    add: u32,
}

struct CounterEncoder;

impl Encoder<u32> for CounterEncoder {
    fn build_input_messages(&self, input: &u32) -> Result<Vec<Message>, EncodeError> {
        Ok(vec![
            Message::system("Reply with {\"add\": n}"),
            Message::user(format!("counter={input}")),
        ])
    }
}

#[derive(Debug, thiserror::Error)]
#[error("counter went past {0}")]
struct Overshoot(u32);

struct CountTo(u32);

#[async_trait]
impl Handler<u32, Add> for CountTo {
    type Error = Overshoot;

    async fn handle(&self, state: &u32, action: &Add) -> Result<Transition<u32>, Overshoot> {
        let next = state + action.add;
        match next.cmp(&self.0) {
            std::cmp::Ordering::Less => Ok(Transition::next(next)),
            std::cmp::Ordering::Equal => Ok(Transition::finish(next)),
            std::cmp::Ordering::Greater => Err(Overshoot(self.0)),
        }
    }
}

#[tokio::test]
async fn test_agent_recovers_from_invalid_action_through_feedback() {
    init_tracing();
    let base = Arc::new(
        ScriptedModel::new()
            .on("counter=0", "I will add one")
            .on("response did not contain a json object", "{\"add\": 1}")
            .on("counter=1", "{\"add\": 1}"),
    );
    let counter = Arc::new(UsageCounter::new());
    let model = ModelFactory::default()
        .with_usage_counter(counter.clone())
        .build(base.clone())
        .unwrap();
    let pipeline: Arc<dyn Pipeline<u32, Add>> = Arc::new(FeedbackPipeline::new(
        CounterEncoder,
        JsonParser::<Add>::new(),
        ErrStringFeedback,
        model,
        FeedbackConfig::new(Role::User, 1),
    ));
    let agent = Agent::new(pipeline, CountTo(2));

    let steps: Vec<_> = agent.run(CallContext::background(), 0).collect().await;

    assert_eq!(steps.len(), 2);
    let first = steps[0].as_ref().unwrap();
    assert_eq!(first.state, 1);
    assert_eq!(first.usage.successful_calls, 2);
    let last = steps[1].as_ref().unwrap();
    assert_eq!(last.state, 2);
    assert!(last.terminal);
    assert_eq!(counter.get().successful_calls, 3);
    assert_eq!(base.calls(), 3);
}
