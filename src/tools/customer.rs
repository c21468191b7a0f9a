//! Customer record lookup with a credit-status business rule.
//!
//! `creditStatus` is optional in the schema, but identifiers carrying the
//! credit marker cannot be answered without it. Such lookups come back
//! `Incomplete` and ask the client for the status through the
//! credit-status form.

use crate::registry::ToolHandler;
use crate::types::{Affordance, MissingFields, ToolResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "customer";
pub const DESCRIPTION: &str = "查询指定客户ID的详细信息。如果查询授信相关客户(ID含CREDIT)但未提供授信状态，\
工具将返回不完整标记，需用户补充信息后重新查询。";

/// Identifiers containing this marker belong to credit customers.
pub const CREDIT_MARKER: &str = "CREDIT";
pub const CREDIT_STATUS_FIELD: &str = "creditStatus";
pub const INCOMPLETE_MESSAGE: &str = "查询授信客户信息需补充授信状态";

const UNDRAWN_CREDIT_AMOUNT: i64 = 50_000;
const UNDRAWN_LAST_CREDIT_DATE: &str = "2024-11-01";
const REGISTRATION_DATE: &str = "2024-01-15";

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "customerId": {
                "type": "string",
                "description": "客户ID，如\"C001\"或\"CREDIT-001\""
            },
            "creditStatus": {
                "type": "string",
                "enum": CreditStatus::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                "description": "从用户查询提取的授信状态，如\"授信未提现\""
            }
        },
        "required": ["customerId"]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditStatus {
    #[serde(rename = "已授信")]
    Granted,
    #[serde(rename = "未授信")]
    NotGranted,
    #[serde(rename = "授信未提现")]
    GrantedUndrawn,
    #[serde(rename = "已提现")]
    Drawn,
}

impl CreditStatus {
    pub const ALL: [CreditStatus; 4] = [
        CreditStatus::Granted,
        CreditStatus::NotGranted,
        CreditStatus::GrantedUndrawn,
        CreditStatus::Drawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditStatus::Granted => "已授信",
            CreditStatus::NotGranted => "未授信",
            CreditStatus::GrantedUndrawn => "授信未提现",
            CreditStatus::Drawn => "已提现",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CustomerQuery {
    #[serde(rename = "customerId")]
    customer_id: String,
    #[serde(rename = "creditStatus", default)]
    credit_status: Option<CreditStatus>,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Mock customer directory.
#[derive(Clone)]
pub struct CustomerTool {
    clock: Clock,
}

impl CustomerTool {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(Utc::now),
        }
    }

    /// Stamp every lookup with `at` instead of the wall clock.
    pub fn with_fixed_time(at: DateTime<Utc>) -> Self {
        Self {
            clock: Arc::new(move || at),
        }
    }

    pub fn requires_credit_status(customer_id: &str) -> bool {
        customer_id.contains(CREDIT_MARKER)
    }

    fn base_record(&self, customer_id: &str) -> serde_json::Map<String, Value> {
        let mut record = serde_json::Map::new();
        record.insert("customerId".into(), json!(customer_id));
        record.insert(
            "queryTime".into(),
            json!((self.clock)().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.insert("status".into(), json!("活跃"));
        record.insert("customerName".into(), json!(format!("用户_{}", customer_id)));
        record.insert("registrationDate".into(), json!(REGISTRATION_DATE));
        record
    }
}

impl Default for CustomerTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for CustomerTool {
    async fn call(&self, input: Value) -> anyhow::Result<ToolResult> {
        let query: CustomerQuery = serde_json::from_value(input)?;
        tracing::info!(
            customer_id = %query.customer_id,
            credit_status = ?query.credit_status.map(|s| s.as_str()),
            "customer lookup"
        );

        let mut record = self.base_record(&query.customer_id);

        match query.credit_status {
            None if Self::requires_credit_status(&query.customer_id) => {
                Ok(ToolResult::incomplete(
                    Value::Object(record),
                    MissingFields::one(CREDIT_STATUS_FIELD),
                    Affordance::CreditStatusForm,
                    INCOMPLETE_MESSAGE,
                ))
            }
            None => Ok(ToolResult::complete(Value::Object(record))),
            Some(status) => {
                let undrawn = status == CreditStatus::GrantedUndrawn;
                record.insert(CREDIT_STATUS_FIELD.into(), json!(status.as_str()));
                record.insert(
                    "creditAmount".into(),
                    json!(if undrawn { UNDRAWN_CREDIT_AMOUNT } else { 0 }),
                );
                record.insert(
                    "lastCreditDate".into(),
                    if undrawn {
                        json!(UNDRAWN_LAST_CREDIT_DATE)
                    } else {
                        Value::Null
                    },
                );
                Ok(ToolResult::complete(Value::Object(record)))
            }
        }
    }
}
