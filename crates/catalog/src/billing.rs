//! Tools backed by the billing API.
//!
//! Amounts are accepted and sent in minor currency units. Responses are
//! reshaped into stable records: epoch fields become timestamps and
//! minor-unit amounts become major-unit decimals.

use serde_json::{json, Value};
use toolbridge_core::{
    schema, whole_i64, BridgeError, Conversion, FieldRule, OutputSpec, ParamContract, ParamSpec, ParamType,
    RegisteredTool, RemoteCallPlan, RemoteStep, Shape, ToolDescriptor, ToolPlan, ValidatedArgs,
    ValidationRule,
};

use crate::common::Params;

const DEFAULT_LIMIT: i64 = 10;
const DEFAULT_DAYS_UNTIL_DUE: i64 = 30;
const CUSTOMER_NOT_FOUND: &str = "Customer not found";
const INVOICE_STATUSES: &[&str] = &["draft", "open", "paid", "void", "uncollectible"];

fn limit() -> ParamSpec {
    ParamSpec::integer(format!("Max results (default: {})", DEFAULT_LIMIT))
        .default_value(json!(DEFAULT_LIMIT))
}

fn money(name: &str) -> FieldRule {
    FieldRule::keep(name).converted(Conversion::Money {
        currency_field: Some("currency".to_string()),
    })
}

fn remote(plan: RemoteCallPlan, output: OutputSpec) -> Result<ToolPlan, BridgeError> {
    Ok(ToolPlan::remote(plan, output))
}

fn collection(key: &str, fields: Vec<FieldRule>) -> OutputSpec {
    OutputSpec::json().shaped(Shape::Collection {
        source: Some("/data".to_string()),
        key: Some(key.to_string()),
        fields,
        count: true,
    })
}

fn record(key: Option<&str>, fields: Vec<FieldRule>) -> OutputSpec {
    OutputSpec::json().shaped(Shape::Record {
        source: None,
        key: key.map(str::to_string),
        fields,
        missing: None,
    })
}

fn customer_fields() -> Vec<FieldRule> {
    vec![
        FieldRule::keep("id"),
        FieldRule::keep("email"),
        FieldRule::keep("name"),
        FieldRule::keep("description"),
        FieldRule::timestamp("created"),
        money("balance"),
        FieldRule::keep("metadata"),
    ]
}

pub fn tools(currency: &str) -> Vec<RegisteredTool> {
    let invoice_currency = currency.to_string();
    let link_currency = currency.to_string();

    vec![
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_list_customers",
                "List billing customers",
                ParamContract::new()
                    .param("limit", limit())
                    .param("email", ParamSpec::string("Filter by email")),
            ),
            list_customers,
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_get_customer",
                "Get a specific customer by ID or email",
                ParamContract::new()
                    .param("customer_id", ParamSpec::string("Customer ID (cus_xxx)"))
                    .param(
                        "email",
                        ParamSpec::string("Customer email (alternative to ID)"),
                    ),
            ),
            get_customer,
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_create_customer",
                "Create a new billing customer",
                ParamContract::new()
                    .param("email", ParamSpec::string("Customer email").required())
                    .param("name", ParamSpec::string("Customer name"))
                    .param("description", ParamSpec::string("Description/notes"))
                    .param("metadata", ParamSpec::object("Custom metadata")),
            ),
            create_customer,
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_list_invoices",
                "List invoices",
                ParamContract::new()
                    .param("customer_id", ParamSpec::string("Filter by customer ID"))
                    .param(
                        "status",
                        ParamSpec::string("Filter by status").one_of(INVOICE_STATUSES),
                    )
                    .param("limit", limit()),
            ),
            list_invoices,
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_create_invoice",
                "Create a new invoice with line items (amounts in cents)",
                ParamContract::new()
                    .param("customer_id", ParamSpec::string("Customer ID").required())
                    .param("description", ParamSpec::string("Invoice description"))
                    .param(
                        "days_until_due",
                        ParamSpec::integer(format!(
                            "Days until due (default: {})",
                            DEFAULT_DAYS_UNTIL_DUE
                        ))
                        .default_value(json!(DEFAULT_DAYS_UNTIL_DUE)),
                    )
                    .param(
                        "items",
                        ParamSpec::array_of(
                            ParamType::Object,
                            "Line items: {description, amount (cents), quantity}",
                        )
                        .required(),
                    ),
            ),
            move |args: &ValidatedArgs| create_invoice(args, &invoice_currency),
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_send_invoice",
                "Finalize and send an invoice",
                ParamContract::new().param(
                    "invoice_id",
                    ParamSpec::string("Invoice ID (in_xxx)").required(),
                ),
            ),
            send_invoice,
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_list_payments",
                "List payment intents",
                ParamContract::new()
                    .param("customer_id", ParamSpec::string("Filter by customer"))
                    .param("limit", limit()),
            ),
            list_payments,
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_get_balance",
                "Get current account balance",
                ParamContract::new(),
            ),
            get_balance,
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_create_payment_link",
                "Create a payment link for a one-time amount",
                ParamContract::new()
                    .param(
                        "amount",
                        ParamSpec::integer("Amount in cents (e.g. 5000 for 50.00)").required(),
                    )
                    .param(
                        "description",
                        ParamSpec::string("Description/product name").required(),
                    ),
            ),
            move |args: &ValidatedArgs| create_payment_link(args, &link_currency),
        ),
        RegisteredTool::new(
            ToolDescriptor::new(
                "billing_list_payouts",
                "List payouts to bank account",
                ParamContract::new().param("limit", limit()),
            ),
            list_payouts,
        ),
    ]
}

fn list_limit(args: &ValidatedArgs) -> i64 {
    args.i64("limit").unwrap_or(DEFAULT_LIMIT)
}

fn list_customers(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let params = Params::new()
        .set("limit", list_limit(args))
        .maybe("email", args.str("email"));
    remote(
        RemoteCallPlan::single("customers.list", params.into_map()),
        collection(
            "customers",
            vec![
                FieldRule::keep("id"),
                FieldRule::keep("email"),
                FieldRule::keep("name"),
                FieldRule::timestamp("created"),
                money("balance"),
            ],
        ),
    )
}

fn get_customer(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    if let Some(id) = args.str("customer_id") {
        let params = Params::new().set("id", id);
        return remote(
            RemoteCallPlan::single("customers.retrieve", params.into_map()),
            OutputSpec::json().shaped(Shape::Record {
                source: None,
                key: Some("customer".to_string()),
                fields: customer_fields(),
                missing: Some(CUSTOMER_NOT_FOUND.to_string()),
            }),
        );
    }

    let Some(email) = args.str("email") else {
        return Err(BridgeError::NotFound(CUSTOMER_NOT_FOUND.to_string()));
    };
    let params = Params::new().set("email", email).set("limit", 1);
    remote(
        RemoteCallPlan::single("customers.list", params.into_map()),
        OutputSpec::json().shaped(Shape::Record {
            source: Some("/data/0".to_string()),
            key: Some("customer".to_string()),
            fields: customer_fields(),
            missing: Some(CUSTOMER_NOT_FOUND.to_string()),
        }),
    )
}

fn create_customer(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let params = Params::new()
        .set("email", args.require_str("email")?)
        .maybe("name", args.str("name"))
        .maybe("description", args.str("description"))
        .maybe("metadata", args.get("metadata").cloned());
    remote(
        RemoteCallPlan::single("customers.create", params.into_map()),
        record(
            Some("customer"),
            vec![
                FieldRule::keep("id"),
                FieldRule::keep("email"),
                FieldRule::keep("name"),
            ],
        ),
    )
}

fn list_invoices(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let params = Params::new()
        .set("limit", list_limit(args))
        .maybe("customer", args.str("customer_id"))
        .maybe("status", args.str("status"));
    remote(
        RemoteCallPlan::single("invoices.list", params.into_map()),
        collection(
            "invoices",
            vec![
                FieldRule::keep("id"),
                FieldRule::keep("number"),
                FieldRule::keep("customer"),
                FieldRule::keep("status"),
                money("amount_due"),
                money("amount_paid"),
                FieldRule::timestamp("created"),
                FieldRule::timestamp("due_date"),
                FieldRule::keep("hosted_invoice_url"),
            ],
        ),
    )
}

/// One validated line item of an invoice.
struct LineItem {
    description: Option<String>,
    amount: i64,
    quantity: i64,
}

fn line_items(args: &ValidatedArgs) -> Result<Vec<LineItem>, BridgeError> {
    let items = args
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BridgeError::validation("items", ValidationRule::Missing))?;

    let mut parsed = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let amount = match item.get("amount") {
            None | Some(Value::Null) => {
                return Err(BridgeError::validation(
                    format!("items[{}].amount", i),
                    ValidationRule::Missing,
                ))
            }
            Some(v) => schema::integer(&format!("items[{}].amount", i), v)?,
        };
        let quantity = match item.get("quantity") {
            None | Some(Value::Null) => 1,
            Some(v) => whole_i64(v).filter(|q| *q > 0).ok_or_else(|| {
                BridgeError::validation(
                    format!("items[{}].quantity", i),
                    ValidationRule::BadFormat {
                        expected: "a positive whole number",
                        found: v.to_string(),
                    },
                )
            })?,
        };
        parsed.push(LineItem {
            description: item
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            amount,
            quantity,
        });
    }

    if parsed.is_empty() {
        return Err(BridgeError::validation(
            "items",
            ValidationRule::BadFormat {
                expected: "at least one line item",
                found: "[]".to_string(),
            },
        ));
    }
    Ok(parsed)
}

fn create_invoice(args: &ValidatedArgs, currency: &str) -> Result<ToolPlan, BridgeError> {
    let customer = args.require_str("customer_id")?;
    let items = line_items(args)?;

    let mut plan = RemoteCallPlan::new().step(
        RemoteStep::new("invoice", "invoices.create")
            .literal("customer", json!(customer))
            .maybe("description", args.str("description").map(|d| json!(d)))
            .literal("collection_method", json!("send_invoice"))
            .literal(
                "days_until_due",
                json!(args.i64("days_until_due").unwrap_or(DEFAULT_DAYS_UNTIL_DUE)),
            ),
    );

    for (i, item) in items.iter().enumerate() {
        plan = plan.step(
            RemoteStep::new(format!("item_{}", i + 1), "invoiceitems.create")
                .literal("customer", json!(customer))
                .bind("invoice", "invoice", "/id")
                .maybe("description", item.description.as_ref().map(|d| json!(d)))
                .literal("unit_amount", json!(item.amount))
                .literal("quantity", json!(item.quantity))
                .literal("currency", json!(currency)),
        );
    }

    plan = plan.step(RemoteStep::new("refresh", "invoices.retrieve").bind("id", "invoice", "/id"));

    remote(
        plan,
        record(
            Some("invoice"),
            vec![
                FieldRule::keep("id"),
                FieldRule::keep("status"),
                money("amount_due"),
                FieldRule::keep("description"),
            ],
        )
        .with_note("Invoice created. Use billing_send_invoice to finalize and send."),
    )
}

fn send_invoice(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let params = Params::new().set("id", args.require_str("invoice_id")?);
    remote(
        RemoteCallPlan::single("invoices.send", params.into_map()),
        record(
            Some("invoice"),
            vec![
                FieldRule::keep("id"),
                FieldRule::keep("number"),
                FieldRule::keep("status"),
                money("amount_due"),
                FieldRule::keep("hosted_invoice_url"),
            ],
        )
        .with_note("Invoice sent to customer"),
    )
}

fn list_payments(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let params = Params::new()
        .set("limit", list_limit(args))
        .maybe("customer", args.str("customer_id"));
    remote(
        RemoteCallPlan::single("payment_intents.list", params.into_map()),
        collection(
            "payments",
            vec![
                FieldRule::keep("id"),
                money("amount"),
                FieldRule::keep("status"),
                FieldRule::keep("customer"),
                FieldRule::keep("description"),
                FieldRule::timestamp("created"),
            ],
        ),
    )
}

fn get_balance(_args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let funds = || Conversion::Nested(vec![money("amount"), FieldRule::keep("currency")]);
    remote(
        RemoteCallPlan::single("balance.retrieve", Params::new().into_map()),
        record(
            None,
            vec![
                FieldRule::keep("available").converted(funds()),
                FieldRule::keep("pending").converted(funds()),
            ],
        ),
    )
}

fn create_payment_link(args: &ValidatedArgs, currency: &str) -> Result<ToolPlan, BridgeError> {
    let amount = args.require_i64("amount")?;
    let description = args.require_str("description")?;

    let plan = RemoteCallPlan::new()
        .step(
            RemoteStep::new("price", "prices.create")
                .literal("unit_amount", json!(amount))
                .literal("currency", json!(currency))
                .literal("product_data[name]", json!(description)),
        )
        .step(
            RemoteStep::new("link", "payment_links.create")
                .bind("line_items[0][price]", "price", "/id")
                .literal("line_items[0][quantity]", json!(1)),
        );

    remote(
        plan,
        record(
            Some("payment_link"),
            vec![
                FieldRule::keep("id"),
                FieldRule::keep("url"),
                money("amount"),
                FieldRule::keep("description"),
            ],
        )
        .merging("amount", json!(amount))
        .merging("description", json!(description))
        .merging("currency", json!(currency)),
    )
}

fn list_payouts(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let params = Params::new().set("limit", list_limit(args));
    remote(
        RemoteCallPlan::single("payouts.list", params.into_map()),
        collection(
            "payouts",
            vec![
                FieldRule::keep("id"),
                money("amount"),
                FieldRule::keep("status"),
                FieldRule::timestamp("arrival_date"),
                FieldRule::timestamp("created"),
            ],
        ),
    )
}
