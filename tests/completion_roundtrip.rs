//! Incomplete result -> client completion -> fresh turn.

use ai_assist_rust::completion::{decode_marked_payload, CompletionError};
use ai_assist_rust::tools::{builtin_registry_with_customer, CustomerTool};
use ai_assist_rust::{
    Affordance, CompletionRequest, ErrorKind, Message, ModelEvent, Orchestrator, OutboundEvent,
    RuleBasedModel, ScriptedModel, ToolDefinition, ToolRegistry, ToolResult, Transcript,
};
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;

const ALLOWED: [&str; 3] = ["weather", "qrcode", "customer"];

fn registry() -> Arc<ToolRegistry> {
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
    Arc::new(builtin_registry_with_customer(CustomerTool::with_fixed_time(at)).unwrap())
}

fn orchestrator(registry: Arc<ToolRegistry>) -> Orchestrator {
    Orchestrator::builder()
        .shared_registry(registry)
        .model(RuleBasedModel::new())
        .build()
        .unwrap()
}

async fn run(orch: &Orchestrator, transcript: &mut Transcript, user: Message) -> Vec<OutboundEvent> {
    let history = transcript.begin_turn(user);
    let events: Vec<_> = orch.submit_turn(history, &ALLOWED).unwrap().collect().await;
    for event in &events {
        transcript.apply(event);
    }
    events
}

#[tokio::test]
async fn credit_customer_round_trip() {
    let registry = registry();
    let orch = orchestrator(Arc::clone(&registry));
    let mut transcript = Transcript::new().with_registry(Arc::clone(&registry));

    // Turn 1: the customer tool needs a credit status.
    let events = run(&orch, &mut transcript, Message::user("查询客户CREDIT-001")).await;
    assert!(matches!(events.last(), Some(OutboundEvent::TurnDone { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, OutboundEvent::TextDelta { .. })));

    let pending = transcript.completions().to_vec();
    assert_eq!(pending.len(), 1);
    let request = &pending[0];
    assert_eq!(request.tool, "customer");
    assert_eq!(request.affordance, Affordance::CreditStatusForm);
    assert_eq!(request.missing_fields, vec!["creditStatus"]);
    assert_eq!(request.message, "查询授信客户信息需补充授信状态");
    assert_eq!(request.provided["customerId"], "CREDIT-001");
    assert_eq!(request.payload["queryTime"], "2025-03-01T08:00:00.000Z");
    assert_eq!(
        request.choices_for("creditStatus").unwrap(),
        &[json!("已授信"), json!("未授信"), json!("授信未提现"), json!("已提现")][..]
    );

    // Turn 2: restated request with the collected value.
    let follow_up = request.submit_one("creditStatus", json!("授信未提现")).unwrap();
    assert_eq!(follow_up.resumes.as_deref(), Some(request.call_id.as_str()));
    let events = run(&orch, &mut transcript, follow_up).await;

    let result = events
        .iter()
        .find_map(|e| match e {
            OutboundEvent::ToolCallResolved { result, .. } => Some(result.clone()),
            _ => None,
        })
        .expect("customer resolved");
    assert!(!result.is_incomplete());
    assert_eq!(result.payload()["creditStatus"], "授信未提现");
    assert_eq!(result.payload()["creditAmount"], 50000);
    assert_eq!(result.payload()["lastCreditDate"], "2024-11-01");

    let Some(OutboundEvent::TurnDone { final_history }) = events.last() else {
        panic!("expected TurnDone, got {events:#?}");
    };
    assert_eq!(final_history.len(), 4);
    assert!(final_history[3].text().contains("授信额度：50000"));
    assert!(transcript.completions().is_empty());
    assert_eq!(transcript.history(), &final_history[..]);
}

#[tokio::test]
async fn drawn_status_reports_zero_credit() {
    let registry = registry();
    let orch = orchestrator(Arc::clone(&registry));
    let mut transcript = Transcript::new().with_registry(Arc::clone(&registry));

    run(&orch, &mut transcript, Message::user("查询客户CREDIT-9")).await;
    let request = transcript.completions()[0].clone();
    let events = run(
        &orch,
        &mut transcript,
        request.submit_one("creditStatus", json!("已提现")).unwrap(),
    )
    .await;

    let payload = events
        .iter()
        .find_map(|e| match e {
            OutboundEvent::ToolCallResolved { result, .. } => Some(result.payload().clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(payload["creditAmount"], 0);
    assert!(payload["lastCreditDate"].is_null());
}

#[tokio::test]
async fn incomplete_turn_is_deterministic() {
    let registry = registry();
    let mut seen = Vec::new();
    for _ in 0..3 {
        let orch = orchestrator(Arc::clone(&registry));
        let mut transcript = Transcript::new().with_registry(Arc::clone(&registry));
        run(&orch, &mut transcript, Message::user("查询客户CREDIT-001")).await;
        let request = transcript.completions()[0].clone();
        seen.push((
            request.missing_fields,
            request.affordance,
            request.message,
            request.payload,
        ));
    }
    assert!(seen.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn completed_resubmission_is_deterministic() {
    let registry = registry();
    let mut payloads = Vec::new();
    for _ in 0..3 {
        let orch = orchestrator(Arc::clone(&registry));
        let mut transcript = Transcript::new().with_registry(Arc::clone(&registry));
        run(&orch, &mut transcript, Message::user("查询客户CREDIT-001")).await;
        let request = transcript.completions()[0].clone();
        let events = run(
            &orch,
            &mut transcript,
            request.submit_one("creditStatus", json!("授信未提现")).unwrap(),
        )
        .await;

        let resolved: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::ToolCallResolved { result, .. } => Some(result.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(resolved.len(), 1);
        assert!(!resolved[0].is_incomplete());
        payloads.push(resolved[0].payload().clone());
    }
    assert!(payloads.windows(2).all(|w| w[0] == w[1]), "{payloads:#?}");
    assert_eq!(payloads[0]["queryTime"], "2025-03-01T08:00:00.000Z");
}

#[tokio::test]
async fn ordinary_customer_completes_in_one_turn() {
    let registry = registry();
    let orch = orchestrator(Arc::clone(&registry));
    let mut transcript = Transcript::new().with_registry(Arc::clone(&registry));

    let events = run(&orch, &mut transcript, Message::user("查询客户C001的信息")).await;

    assert!(matches!(events.last(), Some(OutboundEvent::TurnDone { .. })));
    assert!(transcript.completions().is_empty());
    let reply = transcript.history().last().unwrap().text();
    assert!(reply.contains("用户_C001"), "{reply}");
}

#[tokio::test]
async fn invalid_choice_is_refused_before_resubmission() {
    let registry = registry();
    let orch = orchestrator(Arc::clone(&registry));
    let mut transcript = Transcript::new().with_registry(Arc::clone(&registry));

    run(&orch, &mut transcript, Message::user("查询客户CREDIT-001")).await;
    let request = &transcript.completions()[0];

    let err = request
        .submit_one("creditStatus", json!("冻结"))
        .unwrap_err();
    assert!(matches!(err, CompletionError::InvalidChoice { ref field, .. } if field == "creditStatus"));
    let err = request.submit_one("creditStatus", json!("  ")).unwrap_err();
    assert!(matches!(err, CompletionError::MissingValue { .. }));
}

#[tokio::test]
async fn out_of_enum_status_from_the_model_is_invalid_input() {
    let model = ScriptedModel::sequence(vec![vec![ModelEvent::tool_call(
        "customer",
        json!({"customerId": "CREDIT-001", "creditStatus": "冻结"}),
    )]
    .into()]);
    let orch = Orchestrator::builder()
        .shared_registry(registry())
        .model(model)
        .build()
        .unwrap();

    let events: Vec<_> = orch
        .submit_turn(vec![Message::user("x")], &["customer"])
        .unwrap()
        .collect()
        .await;
    assert!(events.iter().any(|e| matches!(
        e,
        OutboundEvent::ToolCallFailed { kind: ErrorKind::InvalidInput, detail, .. } if detail.contains("creditStatus")
    )));
    assert!(matches!(events.last(), Some(OutboundEvent::TurnDone { .. })));
}

#[tokio::test]
async fn external_tool_using_the_marker_convention() {
    let lookup = ToolDefinition::from_fn(
        "address",
        "mailing address lookup",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "zip": {"type": "string"}
            },
            "required": ["name"]
        }),
        |input| async move {
            let raw = if input.get("zip").is_some() {
                json!({"name": input["name"], "street": "1 Main St"})
            } else {
                json!({
                    "name": input["name"],
                    "__incomplete__": true,
                    "missingFields": ["zip"],
                    "requiredComponent": "free-text",
                    "message": "need a zip code"
                })
            };
            Ok(decode_marked_payload(raw)?)
        },
    )
    .unwrap();
    let registry = Arc::new(ToolRegistry::new().with(lookup).unwrap());

    let model = ScriptedModel::from_fn(|request, _| {
        let text = request.last_user_text().unwrap_or_default();
        match ai_assist_rust::completion::parse_restatement(&text) {
            Some((tool, args)) if request.trailing_invocations().is_empty() => {
                vec![ModelEvent::tool_call(tool, serde_json::Value::Object(args))].into()
            }
            None if request.trailing_invocations().is_empty() => {
                vec![ModelEvent::tool_call("address", json!({"name": "Ada"}))].into()
            }
            _ => vec![ModelEvent::text("done")].into(),
        }
    });
    let orch = Orchestrator::builder()
        .shared_registry(Arc::clone(&registry))
        .model(model)
        .build()
        .unwrap();

    let mut transcript = Transcript::new().with_registry(Arc::clone(&registry));
    let history = transcript.begin_turn(Message::user("where does Ada live?"));
    let events: Vec<_> = orch.submit_turn(history, &["address"]).unwrap().collect().await;
    events.iter().for_each(|e| transcript.apply(e));

    let request: CompletionRequest = transcript.completions()[0].clone();
    assert_eq!(request.affordance, Affordance::FreeText);
    assert!(request.choices.is_empty());
    assert_eq!(request.payload, json!({"name": "Ada"}));

    let history = transcript.begin_turn(request.submit_one("zip", json!("02139")).unwrap());
    let events: Vec<_> = orch.submit_turn(history, &["address"]).unwrap().collect().await;
    let resolved = events.iter().find_map(|e| match e {
        OutboundEvent::ToolCallResolved { result, .. } => Some(result),
        _ => None,
    });
    assert_eq!(
        resolved,
        Some(&ToolResult::complete(json!({"name": "Ada", "street": "1 Main St"})))
    );
}
